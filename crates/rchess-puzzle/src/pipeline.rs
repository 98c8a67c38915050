//! パズル取り込みパイプライン
//!
//! 入力を先頭から1回だけ走査し、各行について
//! 局面導出 → タグ分類 → カテゴリ別バッチへの追加 を行う。
//! 最後に残りのバッチをすべて書き出し、集計値を返す。

use std::collections::BTreeMap;
use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;

use crate::batch::{BatchAccumulator, BatchSink, Category};
use crate::config::{MalformedRowPolicy, PipelineConfig, RowLayout};
use crate::error::{PuzzleError, Result};
use crate::position::{RulesOracle, derive};
use crate::tags::TagClassifier;

/// 入力1行分のパズル
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PuzzleRecord {
    pub fen: String,
    pub moves: Vec<String>,
    pub tags: Vec<String>,
}

impl PuzzleRecord {
    /// 列位置に従って1行を読み取る
    pub fn from_row(row: &csv::StringRecord, layout: &RowLayout) -> Result<Self> {
        let min_fields = layout.min_fields();
        if row.len() < min_fields {
            return Err(PuzzleError::MalformedRow(format!(
                "expected at least {min_fields} fields, got {}",
                row.len()
            )));
        }
        let words = |idx: usize| -> Vec<String> {
            row[idx].split_whitespace().map(str::to_string).collect()
        };

        let fen = row[layout.fen_column].trim();
        if fen.is_empty() {
            return Err(PuzzleError::MalformedRow("empty FEN".to_string()));
        }
        let moves = words(layout.moves_column);
        if moves.len() < 2 {
            return Err(PuzzleError::MalformedRow(format!(
                "expected at least 2 moves, got {}",
                moves.len()
            )));
        }
        let tags = words(layout.tags_column);

        Ok(Self {
            fen: fen.to_string(),
            moves,
            tags,
        })
    }
}

/// 実行中の集計値（診断用）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counters {
    /// 処理したパズル数（読み飛ばした行を除く）
    pub seen: u64,
    /// カテゴリへ振り分けたレコード数（パズル数 × 保存対象テーマ数）
    pub routed: u64,
    /// 出力先へ書き出したレコード数
    pub written: u64,
    /// 形式不正で読み飛ばした行数
    pub skipped: u64,
}

impl Counters {
    /// 振り分け数と書き出し数が一致しているか
    pub fn is_consistent(&self) -> bool {
        self.routed == self.written
    }
}

/// 実行結果
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub counters: Counters,
    /// 中断要求で途中終了したか
    pub interrupted: bool,
    /// カテゴリID → 書き出したレコード数
    pub categories: BTreeMap<String, u64>,
}

/// 取り込みパイプライン
///
/// バッチと集計値はこの値が所有する。単一スレッドで逐次処理する。
pub struct Pipeline<'a, O, S> {
    config: PipelineConfig,
    oracle: O,
    classifier: TagClassifier,
    accumulator: BatchAccumulator<S>,
    counters: Counters,
    interrupt: Option<&'a AtomicBool>,
    on_progress: Option<Box<dyn FnMut(&Counters) + 'a>>,
}

impl<'a, O: RulesOracle, S: BatchSink> Pipeline<'a, O, S> {
    pub fn new(config: PipelineConfig, oracle: O, sink: S) -> Result<Self> {
        config.validate()?;
        let classifier = config.classifier();
        let accumulator = BatchAccumulator::with_threshold(sink, config.flush_threshold);
        Ok(Self {
            config,
            oracle,
            classifier,
            accumulator,
            counters: Counters::default(),
            interrupt: None,
            on_progress: None,
        })
    }

    /// レコード間で参照する中断フラグ
    pub fn with_interrupt(mut self, flag: &'a AtomicBool) -> Self {
        self.interrupt = Some(flag);
        self
    }

    /// `progress_interval` 行ごとに呼ばれるコールバック
    pub fn on_progress(mut self, callback: impl FnMut(&Counters) + 'a) -> Self {
        self.on_progress = Some(Box::new(callback));
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn counters(&self) -> Counters {
        Counters {
            written: self.accumulator.written(),
            ..self.counters
        }
    }

    pub fn accumulator(&self) -> &BatchAccumulator<S> {
        &self.accumulator
    }

    pub fn into_sink(self) -> S {
        self.accumulator.into_sink()
    }

    /// パズル1件を処理する
    pub fn process_record(&mut self, record: &PuzzleRecord) -> Result<()> {
        self.counters.seen += 1;

        let derived = derive(&self.oracle, &record.fen, &record.moves)?;
        let classification = self.classifier.classify(&record.tags);
        if classification.savable.is_empty() {
            return Ok(());
        }

        let line = derived.to_line();
        for tag in classification.savable {
            self.counters.routed += 1;
            self.accumulator.insert(Category::new(classification.bucket, tag), line.clone())?;
        }
        Ok(())
    }

    /// ヘッダ1行を読み飛ばして入力全体を処理し、残りのバッチを書き出す
    pub fn run<R: Read>(&mut self, input: R) -> Result<RunReport> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .delimiter(self.config.delimiter)
            .flexible(true)
            .from_reader(input);

        // ヘッダを先に読んでおき、データ行の行番号を正しくする
        reader.byte_headers()?;

        let mut row = csv::StringRecord::new();
        let mut rows: u64 = 0;
        let mut interrupted = false;

        loop {
            if self.config.limit.is_some_and(|limit| rows >= limit) {
                log::info!("row limit reached ({rows})");
                break;
            }
            if self.interrupt.is_some_and(|flag| flag.load(Ordering::SeqCst)) {
                log::warn!("interrupted after {rows} rows");
                interrupted = true;
                break;
            }

            let line = reader.position().line();
            let (result, line) = match reader.read_record(&mut row) {
                Ok(true) => {
                    let result = PuzzleRecord::from_row(&row, &self.config.layout)
                        .and_then(|record| self.process_record(&record));
                    (result, row.position().map_or(line, |p| p.line()))
                }
                Ok(false) => break,
                Err(e) if e.is_io_error() => return Err(e.into()),
                Err(e) => {
                    let line = e.position().map_or(line, |p| p.line());
                    (Err(PuzzleError::MalformedRow(e.to_string())), line)
                }
            };
            rows += 1;
            if let Err(e) = result {
                self.handle_row_error(e, line)?;
            }

            if rows % self.config.progress_interval == 0 {
                self.report_progress();
            }
        }

        self.accumulator.flush_all()?;
        let counters = self.counters();

        log::info!(
            "done: seen={} routed={} written={} skipped={}",
            counters.seen,
            counters.routed,
            counters.written,
            counters.skipped
        );
        if !counters.is_consistent() {
            log::warn!(
                "routed/written mismatch: routed={} written={} (diff {})",
                counters.routed,
                counters.written,
                counters.routed as i64 - counters.written as i64
            );
        }

        let categories = self
            .accumulator
            .written_by_category()
            .iter()
            .map(|(category, n)| (category.id(), *n))
            .collect();

        Ok(RunReport {
            counters,
            interrupted,
            categories,
        })
    }

    /// 形式不正はポリシーに従い読み飛ばす。それ以外は行番号付きで返す
    fn handle_row_error(&mut self, err: PuzzleError, line: u64) -> Result<()> {
        if err.is_malformed_row() && self.config.on_malformed == MalformedRowPolicy::Skip {
            log::warn!("skipping line {line}: {err}");
            self.counters.skipped += 1;
            return Ok(());
        }
        Err(err.at_line(line))
    }

    fn report_progress(&mut self) {
        let counters = self.counters();
        log::info!(
            "{} puzzles processed ({} routed, {} written)",
            counters.seen,
            counters.routed,
            counters.written
        );
        if let Some(callback) = self.on_progress.as_mut() {
            callback(&counters);
        }
    }
}
