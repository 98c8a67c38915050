//! split_puzzles - パズルCSVをテーマ別ファイルに振り分ける
//!
//! lichess パズルDB（`lichess_db_puzzle.csv`）の各パズルについて、
//! 初手を適用した局面と解答手を `<出力先>/<手数>_<テーマ>.txt` に追記する。
//!
//! # 使用例
//!
//! ```bash
//! # 基本的な使用法
//! cargo run -p tools --release --bin split_puzzles -- \
//!   --input lichess_db_puzzle.csv.gz --out-dir puzzles
//!
//! # 列位置を指定し、形式不正な行は読み飛ばす
//! cargo run -p tools --release --bin split_puzzles -- \
//!   --input puzzles.tsv --delimiter tab \
//!   --fen-column 0 --moves-column 1 --tags-column 2 --on-malformed skip
//! ```
//!
//! 出力は追記モードのため、再実行する場合は事前に出力先を空にすること。

use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use rchess_puzzle::config::parse_delimiter;
use rchess_puzzle::io::open_reader;
use rchess_puzzle::{
    Counters, DirSink, MalformedRowPolicy, Pipeline, PipelineConfig, RunReport, ShakmatyOracle,
    load_config_file,
};
use serde::Serialize;

#[derive(Parser, Debug)]
#[command(
    name = "split_puzzles",
    version,
    about = "パズルCSVを (手数, テーマ) ごとのテキストファイルに振り分ける"
)]
struct Cli {
    /// 入力CSV（`-` で標準入力、`.gz` は自動展開）
    #[arg(short, long)]
    input: PathBuf,

    /// 出力ディレクトリ（なければ作成）
    #[arg(short, long, default_value = "puzzles")]
    out_dir: PathBuf,

    /// 設定ファイル（TOML）。コマンドライン引数が優先される
    #[arg(long)]
    config: Option<PathBuf>,

    /// FEN の列位置（0始まり）
    #[arg(long)]
    fen_column: Option<usize>,

    /// 手順（UCI、空白区切り）の列位置
    #[arg(long)]
    moves_column: Option<usize>,

    /// テーマ（空白区切り）の列位置
    #[arg(long)]
    tags_column: Option<usize>,

    /// 区切り文字（`tab` でタブ）
    #[arg(long)]
    delimiter: Option<String>,

    /// カテゴリごとのフラッシュ閾値（レコード数）
    #[arg(long)]
    flush_threshold: Option<usize>,

    /// 進捗表示の間隔（行数）
    #[arg(long)]
    progress_interval: Option<u64>,

    /// 形式不正な行の扱い（abort|skip）
    #[arg(long)]
    on_malformed: Option<MalformedRowPolicy>,

    /// 処理する行数の上限
    #[arg(long)]
    limit: Option<u64>,

    /// 実行結果をJSONで保存
    #[arg(long)]
    summary_json: Option<PathBuf>,

    /// 進捗バーを表示しない
    #[arg(long)]
    no_progress: bool,
}

/// 処理中にCtrl-Cが押されたかを追跡
static INTERRUPTED: AtomicBool = AtomicBool::new(false);

#[derive(Serialize)]
struct Summary<'a> {
    input: String,
    out_dir: String,
    elapsed_sec: f64,
    #[serde(flatten)]
    report: &'a RunReport,
}

fn build_config(cli: &Cli) -> Result<PipelineConfig> {
    let mut config = PipelineConfig::default();

    if let Some(path) = &cli.config {
        let file = load_config_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?;
        config.apply_file(file)?;
    }

    if let Some(x) = cli.fen_column {
        config.layout.fen_column = x;
    }
    if let Some(x) = cli.moves_column {
        config.layout.moves_column = x;
    }
    if let Some(x) = cli.tags_column {
        config.layout.tags_column = x;
    }
    if let Some(d) = &cli.delimiter {
        config.delimiter = parse_delimiter(d)?;
    }
    if let Some(x) = cli.flush_threshold {
        config.flush_threshold = x;
    }
    if let Some(x) = cli.progress_interval {
        config.progress_interval = x;
    }
    if let Some(x) = cli.on_malformed {
        config.on_malformed = x;
    }
    if cli.limit.is_some() {
        config.limit = cli.limit;
    }

    config.validate()?;
    Ok(config)
}

fn new_progress_bar(enabled: bool) -> ProgressBar {
    if !enabled {
        return ProgressBar::hidden();
    }
    let progress = ProgressBar::new_spinner();
    progress.set_style(
        ProgressStyle::default_spinner()
            .template("[{elapsed_precise}] {spinner} {pos} puzzles ({per_sec}) {msg}")
            .expect("valid template"),
    );
    progress.enable_steady_tick(Duration::from_millis(200));
    progress
}

fn print_summary(report: &RunReport, elapsed: Duration) {
    let Counters {
        seen,
        routed,
        written,
        skipped,
    } = report.counters;

    eprintln!();
    eprintln!("=== Summary ===");
    eprintln!("Puzzles seen:     {seen}");
    eprintln!("Records routed:   {routed}");
    eprintln!("Records written:  {written}");
    if skipped > 0 {
        eprintln!("Rows skipped:     {skipped}");
    }
    eprintln!("Categories:       {}", report.categories.len());
    eprintln!("Elapsed:          {:.1}s", elapsed.as_secs_f64());
    if report.interrupted {
        eprintln!("Note: Processing was interrupted, output is incomplete");
    }
    if !report.counters.is_consistent() {
        eprintln!("Warning: routed ({routed}) != written ({written})");
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let cli = Cli::parse();
    let config = build_config(&cli)?;

    if cli.input.to_string_lossy() != "-" && !cli.input.exists() {
        bail!("Input file not found: {}", cli.input.display());
    }

    // Ctrl-Cハンドラを設定（レコードの区切りで停止し、処理済み分は書き出す）
    ctrlc::set_handler(|| {
        eprintln!("\nInterrupted! Flushing processed puzzles...");
        INTERRUPTED.store(true, Ordering::SeqCst);
    })
    .context("Failed to set Ctrl-C handler")?;

    let reader = open_reader(&cli.input)
        .with_context(|| format!("Failed to open {}", cli.input.display()))?;
    let sink = DirSink::create(&cli.out_dir)
        .with_context(|| format!("Failed to create {}", cli.out_dir.display()))?;

    log::info!("Input: {}", cli.input.display());
    log::info!("Output: {}", cli.out_dir.display());
    log::info!(
        "Columns: fen={} moves={} tags={}, flush threshold {}",
        config.layout.fen_column,
        config.layout.moves_column,
        config.layout.tags_column,
        config.flush_threshold
    );

    let progress = new_progress_bar(!cli.no_progress);
    let start = Instant::now();

    let mut pipeline = Pipeline::new(config, ShakmatyOracle, sink)?
        .with_interrupt(&INTERRUPTED)
        .on_progress(|counters: &Counters| {
            progress.set_position(counters.seen);
            progress.set_message(format!("{} written", counters.written));
        });

    let report = match pipeline.run(reader) {
        Ok(report) => report,
        Err(e) => {
            progress.abandon_with_message("Aborted");
            return Err(e).context("Puzzle ingestion aborted");
        }
    };
    progress.finish_with_message("Done");

    let elapsed = start.elapsed();
    print_summary(&report, elapsed);

    if let Some(path) = &cli.summary_json {
        let summary = Summary {
            input: cli.input.display().to_string(),
            out_dir: cli.out_dir.display().to_string(),
            elapsed_sec: elapsed.as_secs_f64(),
            report: &report,
        };
        let file = File::create(path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        serde_json::to_writer_pretty(BufWriter::new(file), &summary)
            .context("Failed to write summary JSON")?;
    }

    Ok(())
}
