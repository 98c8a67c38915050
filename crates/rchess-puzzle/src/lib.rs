//! チェスパズルの取り込みライブラリ
//!
//! lichess 形式のパズルCSVを1回走査し、各パズルを
//! (手数バケット, テーマ) ごとのテキストファイルへ振り分ける。
//!
//! - [`position`]: 初手を適用して出題局面と解答手を得る
//! - [`tags`]: 手数バケットと保存対象テーマの判定
//! - [`batch`]: カテゴリ別バッチの蓄積と書き出し
//! - [`pipeline`]: 入力の走査と集計

pub mod batch;
pub mod config;
pub mod error;
pub mod io;
pub mod pipeline;
pub mod position;
pub mod tags;

pub use batch::{BatchAccumulator, BatchSink, Category, DirSink, MemorySink};
pub use config::{ConfigFile, MalformedRowPolicy, PipelineConfig, RowLayout, load_config_file};
pub use error::{PuzzleError, Result};
pub use pipeline::{Counters, Pipeline, PuzzleRecord, RunReport};
pub use position::{DerivedPuzzle, RulesOracle, ShakmatyOracle, derive};
pub use tags::{Classification, LengthBucket, REFERENCE_SAVABLE_TAGS, TagClassifier};
