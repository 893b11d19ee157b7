//! Main entry point for the score ranker
//!
//! Loads configuration, then ranks every gamemode in turn and writes one
//! leaderboard per gamemode. A shutdown signal aborts the run without
//! leaving partially written outputs behind.

use anyhow::Result;
use clap::Parser;
use score_ranker::config::{validate_config, AppConfig, EngineKind};
use score_ranker::service::{GamemodeReport, RankingPipeline};
use score_ranker::types::Gamemode;
use std::path::PathBuf;
use tokio::signal;
use tracing::{error, info, warn};

/// Score Ranker - per-gamemode skill leaderboards
#[derive(Parser)]
#[command(
    name = "score-ranker",
    version,
    about = "Estimates per-gamemode player skill rankings from score data",
    long_about = "Score Ranker groups scores into comparison contexts (same beatmap, same \
                 modifiers), fits a Plackett-Luce skill model per gamemode, and writes \
                 calibrated leaderboards for catch, taiko, mania and osu."
)]
struct Args {
    /// Configuration file path
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "Path to configuration file (TOML format)"
    )]
    config: Option<PathBuf>,

    /// Log level override
    #[arg(
        short,
        long,
        value_name = "LEVEL",
        help = "Override log level (trace, debug, info, warn, error)"
    )]
    log_level: Option<String>,

    /// Enable debug mode
    #[arg(short, long, help = "Enable debug mode with verbose logging")]
    debug: bool,

    /// Point estimate instead of posterior sampling
    #[arg(long, help = "Compute a point estimate instead of full posterior sampling")]
    fast: bool,

    /// Reuse persisted draws
    #[arg(long, help = "Reuse persisted draws when they match the assembled dataset")]
    reuse_draws: bool,

    /// Input directory override
    #[arg(long, value_name = "DIR", help = "Directory holding the score and user files")]
    input_dir: Option<PathBuf>,

    /// Output directory override
    #[arg(long, value_name = "DIR", help = "Directory receiving the leaderboards")]
    output_dir: Option<PathBuf>,

    /// Engine override
    #[arg(long, value_name = "ENGINE", help = "Inference engine (native, cmdstan)")]
    engine: Option<String>,

    /// Thread count override
    #[arg(long, value_name = "N", help = "Worker threads for the inference engine")]
    threads: Option<usize>,

    /// Dry run mode (validate config and exit)
    #[arg(long, help = "Validate configuration and exit without ranking")]
    dry_run: bool,
}

/// Initialize structured logging with the configured level
fn init_logging(log_level: &str) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}

/// Wait for shutdown signals (SIGINT, SIGTERM)
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C) signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}

/// Display startup banner with run information
fn display_startup_banner(config: &AppConfig) {
    info!("📊 Score Ranker v{}", score_ranker::VERSION);
    info!("   Service: {}", config.service.name);
    info!("   Log level: {}", config.service.log_level);
    info!("   Input: {}", config.pipeline.input_dir.display());
    info!("   Output: {}", config.pipeline.output_dir.display());
    info!("   Draws: {}", config.pipeline.draws_dir.display());
    info!(
        "   Engine: {} ({}, {} threads)",
        config.inference.engine,
        config.run_mode(),
        config.inference.threads
    );
    info!("   Reuse draws: {}", config.pipeline.reuse_draws);
    info!(
        "   Inference timeout: {}s",
        config.pipeline.inference_timeout_seconds
    );
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
}

/// Load and merge configuration from file or environment and CLI arguments
fn load_config(args: &Args) -> Result<AppConfig> {
    let mut config = if let Some(config_path) = &args.config {
        AppConfig::from_file(config_path)?
    } else {
        AppConfig::from_env()?
    };

    // Apply CLI overrides
    if let Some(log_level) = &args.log_level {
        config.service.log_level = log_level.clone();
    }

    if args.debug {
        config.service.log_level = "debug".to_string();
    }

    if args.fast {
        config.pipeline.fast = true;
    }

    if args.reuse_draws {
        config.pipeline.reuse_draws = true;
    }

    if let Some(input_dir) = &args.input_dir {
        config.pipeline.input_dir = input_dir.clone();
    }

    if let Some(output_dir) = &args.output_dir {
        config.pipeline.output_dir = output_dir.clone();
    }

    if let Some(engine) = &args.engine {
        config.inference.engine = engine.parse::<EngineKind>()?;
    }

    if let Some(threads) = args.threads {
        config.inference.threads = threads;
    }

    validate_config(&config)?;
    Ok(config)
}

fn log_summary(reports: &[GamemodeReport]) {
    for report in reports {
        info!(
            "   {}: {} players, {} contexts, {} scores, {} draws -> {} ({:.2}s)",
            report.gamemode,
            report.players,
            report.contexts,
            report.records,
            report.draws,
            report.leaderboard.display(),
            report.elapsed.as_secs_f64()
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Load configuration (CLI args can override environment/config file)
    let config = load_config(&args).unwrap_or_else(|e| {
        eprintln!("Configuration error: {:#}", e);
        std::process::exit(1);
    });

    // Initialize logging early (before any other operations)
    if let Err(e) = init_logging(&config.service.log_level) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    if args.dry_run {
        info!("Configuration validation successful");
        display_startup_banner(&config);
        info!("Dry run completed - exiting without ranking");
        return Ok(());
    }

    display_startup_banner(&config);

    let pipeline = match RankingPipeline::from_config(config) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            error!("Failed to initialize inference engine: {:#}", e);
            std::process::exit(1);
        }
    };

    info!("Ranking {} gamemodes...", Gamemode::ALL.len());

    // Dropping the run future on a signal cancels any in-flight inference
    tokio::select! {
        result = pipeline.run_all() => match result {
            Ok(reports) => {
                info!("✅ All gamemodes ranked");
                log_summary(&reports);
                Ok(())
            }
            Err(e) => {
                error!("Ranking failed: {}", e);
                std::process::exit(1);
            }
        },
        _ = wait_for_shutdown_signal() => {
            warn!("🛑 Run aborted before completion; finished leaderboards are kept");
            std::process::exit(130);
        }
    }
}
