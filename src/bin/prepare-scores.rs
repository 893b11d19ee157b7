//! Score Dump Preparation Tool
//!
//! Converts extracted score-database dumps into the per-gamemode input files
//! of the ranker.
//!
//! Usage:
//!   # Read the downloaded {date}_performance_{mode}_top_10000.tar.bz2 archives
//!   cargo run --bin prepare-scores -- --archive-dir downloads
//!
//!   # Or extracted dumps, one directory per gamemode holding
//!   # sample_users.sql and scores.sql (dumps/catch/, dumps/taiko/, ...)
//!   cargo run --bin prepare-scores -- --dump-dir dumps --output-dir processed_score_files
//!   cargo run --bin prepare-scores -- --dump-dir dumps --per-player-limit 50

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use score_ranker::prepare::{prepare_all, DumpSource, PrepareOptions, DEFAULT_PER_PLAYER_LIMIT};
use tracing::info;

#[derive(Parser)]
#[command(name = "prepare-scores")]
#[command(about = "Prepare per-gamemode score and user files from score-database dumps")]
struct Cli {
    /// Directory with one subdirectory of extracted dumps per gamemode
    #[arg(long, value_name = "DIR", conflicts_with = "archive_dir", required_unless_present = "archive_dir")]
    dump_dir: Option<PathBuf>,

    /// Directory holding the `.tar.bz2` dump archives; the latest one per gamemode is read
    #[arg(long, value_name = "DIR")]
    archive_dir: Option<PathBuf>,

    /// Directory receiving `{gamemode}.json` and `{gamemode}_users.csv`
    #[arg(long, value_name = "DIR", default_value = "processed_score_files")]
    output_dir: PathBuf,

    /// Best scores kept per player
    #[arg(long, default_value_t = DEFAULT_PER_PLAYER_LIMIT)]
    per_player_limit: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| cli.log_level.as_str().into()),
        )
        .with_target(false)
        .with_thread_ids(true)
        .init();

    if cli.per_player_limit == 0 {
        anyhow::bail!("--per-player-limit must be greater than 0");
    }

    let source = match (cli.dump_dir, cli.archive_dir) {
        (Some(dir), _) => DumpSource::Extracted(dir),
        (None, Some(dir)) => DumpSource::Archives(dir),
        (None, None) => anyhow::bail!("one of --dump-dir or --archive-dir is required"),
    };

    let options = PrepareOptions {
        source,
        output_dir: cli.output_dir,
        per_player_limit: cli.per_player_limit,
    };

    info!(
        "Preparing score files from {} into {}",
        options.source,
        options.output_dir.display()
    );
    let prepared = prepare_all(&options).context("Score preparation failed")?;

    for summary in &prepared {
        info!(
            "{}: {} scores from {} players, {} users listed",
            summary.gamemode, summary.scores, summary.players_with_scores, summary.users
        );
    }
    info!("✅ Prepared {} gamemodes", prepared.len());
    Ok(())
}
