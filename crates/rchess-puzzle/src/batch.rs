//! カテゴリ別の出力バッチ
//!
//! (手数バケット, テーマ) ごとにレコードをメモリ上に貯め、閾値に達した時点で
//! 出力先へ追記する。カテゴリ内の順序は挿入順のまま保たれる。

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::io::open_append;
use crate::tags::LengthBucket;

/// 既定のフラッシュ閾値（レコード数）
pub const DEFAULT_FLUSH_THRESHOLD: usize = 1000;

/// 出力先を識別するカテゴリ
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Category {
    pub bucket: LengthBucket,
    pub tag: String,
}

impl Category {
    pub fn new(bucket: LengthBucket, tag: impl Into<String>) -> Self {
        Self {
            bucket,
            tag: tag.into(),
        }
    }

    /// `<bucket>_<tag>` の小文字表記
    pub fn id(&self) -> String {
        format!("{}_{}", self.bucket, self.tag).to_lowercase()
    }

    pub fn file_name(&self) -> String {
        format!("{}.txt", self.id())
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id())
    }
}

/// バッチの書き出し先
pub trait BatchSink {
    /// `records` を順序どおり `category` の出力先へ追記し、書き出した件数を返す
    fn append(&mut self, category: &Category, records: &[String]) -> Result<usize>;
}

impl<S: BatchSink + ?Sized> BatchSink for &mut S {
    fn append(&mut self, category: &Category, records: &[String]) -> Result<usize> {
        (**self).append(category, records)
    }
}

/// `<dir>/<bucket>_<tag>.txt` へ1行1レコードで追記する
#[derive(Debug, Clone)]
pub struct DirSink {
    dir: PathBuf,
}

impl DirSink {
    /// 出力ディレクトリを作成して開く
    pub fn create<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn path_for(&self, category: &Category) -> PathBuf {
        self.dir.join(category.file_name())
    }
}

impl BatchSink for DirSink {
    fn append(&mut self, category: &Category, records: &[String]) -> Result<usize> {
        let path = self.path_for(category);
        let mut writer = open_append(&path)?;
        for record in records {
            writer.write_all(record.as_bytes())?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        Ok(records.len())
    }
}

/// メモリ上に書き出す（テスト・dry run 用）
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    /// カテゴリID → 追記された行
    pub files: BTreeMap<String, Vec<String>>,
    /// `append` の呼び出し回数
    pub appends: usize,
}

impl MemorySink {
    pub fn lines(&self, category_id: &str) -> &[String] {
        self.files.get(category_id).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn total_lines(&self) -> usize {
        self.files.values().map(Vec::len).sum()
    }
}

impl BatchSink for MemorySink {
    fn append(&mut self, category: &Category, records: &[String]) -> Result<usize> {
        self.files.entry(category.id()).or_default().extend_from_slice(records);
        self.appends += 1;
        Ok(records.len())
    }
}

/// カテゴリ別バッチの蓄積器
///
/// 各バッチの長さは閾値を超えない。閾値ちょうどに達した挿入でそのカテゴリを
/// 即座にフラッシュする。
pub struct BatchAccumulator<S> {
    sink: S,
    threshold: usize,
    batches: HashMap<Category, Vec<String>>,
    /// カテゴリ別の書き出し済みレコード数（出力先が報告した件数）
    written: BTreeMap<Category, u64>,
    flushes: u64,
}

impl<S: BatchSink> BatchAccumulator<S> {
    pub fn new(sink: S) -> Self {
        Self::with_threshold(sink, DEFAULT_FLUSH_THRESHOLD)
    }

    /// `threshold` は 1 以上（0 は 1 として扱う）
    pub fn with_threshold(sink: S, threshold: usize) -> Self {
        Self {
            sink,
            threshold: threshold.max(1),
            batches: HashMap::new(),
            written: BTreeMap::new(),
            flushes: 0,
        }
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// レコードを追加し、閾値に達したらそのカテゴリをフラッシュする
    pub fn insert(&mut self, category: Category, record: String) -> Result<()> {
        let batch = self.batches.entry(category.clone()).or_default();
        batch.push(record);
        if batch.len() >= self.threshold {
            self.flush(&category)?;
        }
        Ok(())
    }

    /// カテゴリのバッチを書き出して空にする。空・未登録なら何もしない
    ///
    /// 書き出しに失敗した場合、バッチはメモリ上に残る。
    pub fn flush(&mut self, category: &Category) -> Result<()> {
        let Some(batch) = self.batches.get_mut(category) else {
            return Ok(());
        };
        if batch.is_empty() {
            return Ok(());
        }

        let stored = self.sink.append(category, batch.as_slice())?;
        if stored != batch.len() {
            log::warn!("{category}: sink stored {stored} of {} records", batch.len());
        } else {
            log::debug!("flushed {stored} records to {category}");
        }

        *self.written.entry(category.clone()).or_insert(0) += stored as u64;
        self.flushes += 1;
        batch.clear();
        Ok(())
    }

    /// 全カテゴリをフラッシュする
    pub fn flush_all(&mut self) -> Result<()> {
        let mut categories: Vec<Category> = self.batches.keys().cloned().collect();
        categories.sort();
        for category in &categories {
            self.flush(category)?;
        }
        Ok(())
    }

    /// メモリ上に残っているレコード数
    pub fn pending(&self, category: &Category) -> usize {
        self.batches.get(category).map_or(0, Vec::len)
    }

    /// 書き出し済みレコード数の合計
    pub fn written(&self) -> u64 {
        self.written.values().sum()
    }

    pub fn written_by_category(&self) -> &BTreeMap<Category, u64> {
        &self.written
    }

    /// 実行したフラッシュ（書き出し）の回数
    pub fn flushes(&self) -> u64 {
        self.flushes
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn short_fork() -> Category {
        Category::new(LengthBucket::Short, "fork")
    }

    #[test]
    fn test_category_id_is_lowercase() {
        let c = Category::new(LengthBucket::VeryLong, "discoveredAttack");
        assert_eq!(c.id(), "verylong_discoveredattack");
        assert_eq!(c.file_name(), "verylong_discoveredattack.txt");
        assert_eq!(Category::new(LengthBucket::NoLength, "mate").id(), "nolength_mate");
    }

    #[test]
    fn test_999_inserts_do_not_flush() {
        let mut acc = BatchAccumulator::new(MemorySink::default());
        assert_eq!(acc.threshold(), DEFAULT_FLUSH_THRESHOLD);
        for i in 0..999 {
            acc.insert(short_fork(), format!("r{i}")).unwrap();
        }
        assert_eq!(acc.flushes(), 0);
        assert_eq!(acc.pending(&short_fork()), 999);
        assert_eq!(acc.sink().total_lines(), 0);
    }

    #[test]
    fn test_1000_inserts_flush_exactly_once() {
        let mut acc = BatchAccumulator::new(MemorySink::default());
        for i in 0..1000 {
            acc.insert(short_fork(), format!("r{i}")).unwrap();
        }
        assert_eq!(acc.flushes(), 1);
        assert_eq!(acc.pending(&short_fork()), 0);
        assert_eq!(acc.written(), 1000);

        let lines = acc.sink().lines("short_fork");
        let expected: Vec<String> = (0..1000).map(|i| format!("r{i}")).collect();
        assert_eq!(lines, expected.as_slice());
    }

    #[test]
    fn test_1001_inserts_leave_one_pending() {
        let mut acc = BatchAccumulator::new(MemorySink::default());
        for i in 0..1001 {
            acc.insert(short_fork(), format!("r{i}")).unwrap();
        }
        assert_eq!(acc.flushes(), 1);
        assert_eq!(acc.pending(&short_fork()), 1);

        acc.flush_all().unwrap();
        assert_eq!(acc.flushes(), 2);
        assert_eq!(acc.sink().lines("short_fork").last().map(String::as_str), Some("r1000"));
    }

    #[test]
    fn test_flush_empty_or_absent_is_noop() {
        let mut acc = BatchAccumulator::new(MemorySink::default());
        acc.flush(&short_fork()).unwrap();
        acc.flush_all().unwrap();
        assert_eq!(acc.sink().appends, 0);

        acc.insert(short_fork(), "x".to_string()).unwrap();
        acc.flush(&short_fork()).unwrap();
        acc.flush(&short_fork()).unwrap();
        assert_eq!(acc.sink().appends, 1);
    }

    #[test]
    fn test_categories_are_independent() {
        let mut acc = BatchAccumulator::with_threshold(MemorySink::default(), 2);
        let pin = Category::new(LengthBucket::Long, "pin");
        acc.insert(short_fork(), "a".to_string()).unwrap();
        acc.insert(pin.clone(), "b".to_string()).unwrap();
        assert_eq!(acc.flushes(), 0);

        acc.insert(pin.clone(), "c".to_string()).unwrap();
        assert_eq!(acc.flushes(), 1);
        assert_eq!(acc.pending(&short_fork()), 1);
        assert_eq!(acc.sink().lines("long_pin"), ["b", "c"]);

        acc.flush_all().unwrap();
        assert_eq!(acc.written_by_category().get(&short_fork()), Some(&1));
        assert_eq!(acc.written_by_category().get(&pin), Some(&2));
    }

    #[test]
    fn test_dir_sink_appends_lines_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DirSink::create(dir.path().join("out")).unwrap();
        let mut acc = BatchAccumulator::with_threshold(sink, 2);
        for r in ["1", "2", "3"] {
            acc.insert(short_fork(), r.to_string()).unwrap();
        }
        acc.flush_all().unwrap();

        let path = acc.sink().path_for(&short_fork());
        assert_eq!(std::fs::read_to_string(path).unwrap(), "1\n2\n3\n");
    }
}
