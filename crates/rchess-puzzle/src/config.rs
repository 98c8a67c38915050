//! 取り込み設定
//!
//! 既定値 < 設定ファイル（TOML）< コマンドライン の順に上書きする。

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::batch::DEFAULT_FLUSH_THRESHOLD;
use crate::error::{PuzzleError, Result};
use crate::tags::{LengthBucket, REFERENCE_SAVABLE_TAGS, TagClassifier};

/// 既定の進捗表示間隔（レコード数）
pub const DEFAULT_PROGRESS_INTERVAL: u64 = 25_000;

/// 入力の列位置（0始まり）
///
/// 既定値は lichess パズルDB
/// (`PuzzleId,FEN,Moves,Rating,RatingDeviation,Popularity,NbPlays,Themes,GameUrl,OpeningTags`)。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowLayout {
    pub fen_column: usize,
    pub moves_column: usize,
    pub tags_column: usize,
}

impl Default for RowLayout {
    fn default() -> Self {
        Self {
            fen_column: 1,
            moves_column: 2,
            tags_column: 7,
        }
    }
}

impl RowLayout {
    /// 必要な最小列数
    pub fn min_fields(&self) -> usize {
        self.fen_column.max(self.moves_column).max(self.tags_column) + 1
    }
}

/// 形式不正な行の扱い
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MalformedRowPolicy {
    /// 実行を中断する
    #[default]
    Abort,
    /// 警告を出して読み飛ばす
    Skip,
}

impl std::str::FromStr for MalformedRowPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "abort" => Ok(MalformedRowPolicy::Abort),
            "skip" => Ok(MalformedRowPolicy::Skip),
            other => Err(format!("unknown policy `{other}` (expected abort|skip)")),
        }
    }
}

/// パイプライン設定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    pub layout: RowLayout,
    pub delimiter: u8,
    pub flush_threshold: usize,
    pub progress_interval: u64,
    pub on_malformed: MalformedRowPolicy,
    /// 処理するデータ行数の上限
    pub limit: Option<u64>,
    /// 保存対象テーマ語彙
    pub savable_tags: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            layout: RowLayout::default(),
            delimiter: b',',
            flush_threshold: DEFAULT_FLUSH_THRESHOLD,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            on_malformed: MalformedRowPolicy::default(),
            limit: None,
            savable_tags: REFERENCE_SAVABLE_TAGS.iter().map(|t| t.to_string()).collect(),
        }
    }
}

impl PipelineConfig {
    pub fn classifier(&self) -> TagClassifier {
        TagClassifier::new(self.savable_tags.iter().cloned())
    }

    pub fn validate(&self) -> Result<()> {
        if self.flush_threshold == 0 {
            return Err(PuzzleError::Config("flush_threshold must be at least 1".to_string()));
        }
        if self.progress_interval == 0 {
            return Err(PuzzleError::Config("progress_interval must be at least 1".to_string()));
        }
        let RowLayout {
            fen_column,
            moves_column,
            tags_column,
        } = self.layout;
        if fen_column == moves_column || fen_column == tags_column || moves_column == tags_column {
            return Err(PuzzleError::Config(format!(
                "columns must be distinct (fen={fen_column}, moves={moves_column}, tags={tags_column})"
            )));
        }
        if let Some(tag) = self.savable_tags.iter().find(|t| LengthBucket::from_tag(t).is_some()) {
            return Err(PuzzleError::Config(format!(
                "length tag `{tag}` cannot be a savable tag"
            )));
        }
        if self.savable_tags.is_empty() {
            return Err(PuzzleError::Config("savable_tags is empty".to_string()));
        }
        Ok(())
    }

    /// 設定ファイルの値で上書きする
    pub fn apply_file(&mut self, file: ConfigFile) -> Result<()> {
        if let Some(x) = file.fen_column {
            self.layout.fen_column = x;
        }
        if let Some(x) = file.moves_column {
            self.layout.moves_column = x;
        }
        if let Some(x) = file.tags_column {
            self.layout.tags_column = x;
        }
        if let Some(d) = file.delimiter {
            self.delimiter = parse_delimiter(&d)?;
        }
        if let Some(x) = file.flush_threshold {
            self.flush_threshold = x;
        }
        if let Some(x) = file.progress_interval {
            self.progress_interval = x;
        }
        if let Some(x) = file.on_malformed {
            self.on_malformed = x;
        }
        if let Some(x) = file.limit {
            self.limit = Some(x);
        }
        if let Some(tags) = file.savable_tags {
            self.savable_tags = tags;
        }
        Ok(())
    }
}

/// 設定ファイル（TOML）
///
/// ```toml
/// fen_column = 1
/// moves_column = 2
/// tags_column = 7
/// on_malformed = "skip"
/// savable_tags = ["fork", "pin", "skewer"]
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default)]
    pub fen_column: Option<usize>,
    #[serde(default)]
    pub moves_column: Option<usize>,
    #[serde(default)]
    pub tags_column: Option<usize>,
    #[serde(default)]
    pub delimiter: Option<String>,
    #[serde(default)]
    pub flush_threshold: Option<usize>,
    #[serde(default)]
    pub progress_interval: Option<u64>,
    #[serde(default)]
    pub on_malformed: Option<MalformedRowPolicy>,
    #[serde(default)]
    pub limit: Option<u64>,
    #[serde(default)]
    pub savable_tags: Option<Vec<String>>,
}

impl ConfigFile {
    pub fn parse(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| PuzzleError::Config(e.to_string()))
    }
}

/// 設定ファイルを読み込む。構文エラーにはファイルパスを付ける
pub fn load_config_file<P: AsRef<Path>>(path: P) -> Result<ConfigFile> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)?;
    ConfigFile::parse(&text).map_err(|e| match e {
        PuzzleError::Config(msg) => PuzzleError::Config(format!("{}: {msg}", path.display())),
        other => other,
    })
}

/// 区切り文字（1バイト）。`\t` / `tab` はタブ
pub fn parse_delimiter(s: &str) -> Result<u8> {
    match s {
        "\\t" | "tab" | "\t" => Ok(b'\t'),
        _ => match s.as_bytes() {
            [b] => Ok(*b),
            _ => Err(PuzzleError::Config(format!(
                "delimiter must be a single byte, got `{s}`"
            ))),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = PipelineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.flush_threshold, 1000);
        assert_eq!(config.progress_interval, 25_000);
        assert_eq!(config.layout.min_fields(), 8);
        assert_eq!(config.classifier().vocabulary_len(), 40);
    }

    #[test]
    fn test_apply_file() {
        let file = ConfigFile::parse(
            r#"
            fen_column = 0
            moves_column = 1
            tags_column = 2
            delimiter = "tab"
            on_malformed = "skip"
            savable_tags = ["fork"]
            "#,
        )
        .unwrap();

        let mut config = PipelineConfig::default();
        config.apply_file(file).unwrap();
        config.validate().unwrap();
        assert_eq!(
            config.layout,
            RowLayout {
                fen_column: 0,
                moves_column: 1,
                tags_column: 2
            }
        );
        assert_eq!(config.delimiter, b'\t');
        assert_eq!(config.on_malformed, MalformedRowPolicy::Skip);
        assert_eq!(config.savable_tags, vec!["fork".to_string()]);
        assert_eq!(config.flush_threshold, 1000);
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        assert!(ConfigFile::parse("fen_col = 3").is_err());
    }

    #[test]
    fn test_load_config_file_names_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("split.toml");
        std::fs::write(&path, "limit = 10\n").unwrap();
        assert_eq!(load_config_file(&path).unwrap().limit, Some(10));

        std::fs::write(&path, "fen_col = 3\n").unwrap();
        let msg = load_config_file(&path).unwrap_err().to_string();
        assert!(msg.starts_with("invalid configuration: "), "{msg}");
        assert!(msg.contains("split.toml: "), "{msg}");
        assert_eq!(msg.matches("invalid configuration").count(), 1, "{msg}");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = PipelineConfig {
            flush_threshold: 0,
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());

        config.flush_threshold = 10;
        config.layout.tags_column = config.layout.fen_column;
        assert!(config.validate().is_err());

        let config = PipelineConfig {
            savable_tags: vec!["fork".to_string(), "short".to_string()],
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_delimiter() {
        assert_eq!(parse_delimiter(",").unwrap(), b',');
        assert_eq!(parse_delimiter("\\t").unwrap(), b'\t');
        assert_eq!(parse_delimiter(";").unwrap(), b';');
        assert!(parse_delimiter(",,").is_err());
    }

    #[test]
    fn test_policy_from_str() {
        assert_eq!("skip".parse::<MalformedRowPolicy>(), Ok(MalformedRowPolicy::Skip));
        assert_eq!("ABORT".parse::<MalformedRowPolicy>(), Ok(MalformedRowPolicy::Abort));
        assert!("ignore".parse::<MalformedRowPolicy>().is_err());
    }
}
