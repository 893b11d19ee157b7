//! Per-gamemode ranking pipeline
//!
//! Each gamemode runs the stages in order (load inputs, assemble the dataset,
//! estimate skills, post-process, emit the leaderboard) with its own mapping
//! state. Gamemodes run one after another.

use crate::config::{AppConfig, EngineKind, InferenceSettings};
use crate::dataset::{AssembledDataset, RunContext};
use crate::error::Result;
use crate::inference::{CmdStanEngine, InferenceAdapter, InferenceEngine, NativeEngine};
use crate::input::{load_score_events, score_events_path, PlayerDirectory};
use crate::ranking::{postprocess, Leaderboard};
use crate::types::Gamemode;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, info_span, Instrument};

/// Construct the configured inference engine
pub fn build_engine(settings: &InferenceSettings) -> anyhow::Result<Arc<dyn InferenceEngine>> {
    let engine: Arc<dyn InferenceEngine> = match settings.engine {
        EngineKind::Native => Arc::new(NativeEngine::new(settings.native_config())?),
        EngineKind::CmdStan => Arc::new(CmdStanEngine::new(settings.cmdstan_config())?),
    };
    Ok(engine)
}

/// Outcome of one gamemode run
#[derive(Debug, Clone)]
pub struct GamemodeReport {
    pub gamemode: Gamemode,
    pub players: usize,
    pub contexts: usize,
    pub records: usize,
    pub ties: usize,
    pub draws: usize,
    pub leaderboard: PathBuf,
    pub elapsed: Duration,
}

pub struct RankingPipeline {
    config: AppConfig,
    adapter: InferenceAdapter,
}

impl RankingPipeline {
    pub fn new(config: AppConfig, engine: Arc<dyn InferenceEngine>) -> Self {
        let adapter = InferenceAdapter::new(engine, config.adapter_config());
        Self { config, adapter }
    }

    pub fn from_config(config: AppConfig) -> anyhow::Result<Self> {
        let engine = build_engine(&config.inference)?;
        Ok(Self::new(config, engine))
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Rank every gamemode in the fixed order, stopping at the first failure
    pub async fn run_all(&self) -> Result<Vec<GamemodeReport>> {
        self.run(&Gamemode::ALL).await
    }

    pub async fn run(&self, gamemodes: &[Gamemode]) -> Result<Vec<GamemodeReport>> {
        let mut reports = Vec::with_capacity(gamemodes.len());
        for &gamemode in gamemodes {
            reports.push(self.run_gamemode(gamemode).await?);
        }
        Ok(reports)
    }

    pub async fn run_gamemode(&self, gamemode: Gamemode) -> Result<GamemodeReport> {
        let span = info_span!("gamemode", mode = %gamemode);
        self.run_stages(gamemode).instrument(span).await
    }

    async fn run_stages(&self, gamemode: Gamemode) -> Result<GamemodeReport> {
        let started = Instant::now();
        let pipeline = &self.config.pipeline;
        info!(
            "Ranking {} with the {} engine ({})",
            gamemode,
            self.adapter.engine_name(),
            self.adapter.mode()
        );

        let events = load_score_events(&score_events_path(&pipeline.input_dir, gamemode))?;
        let directory =
            PlayerDirectory::load(&PlayerDirectory::path_for(&pipeline.input_dir, gamemode))?;

        let mut run =
            RunContext::new(gamemode).with_canonical_modifiers(pipeline.canonicalize_modifiers);
        let dataset = AssembledDataset::assemble(&mut run, events)?;
        info!(
            "Dataset: {} contexts, {} scores, {} players, {} ties",
            dataset.context_count,
            dataset.record_count,
            dataset.player_count,
            dataset.tie_count()
        );

        let estimate = self.adapter.estimate(gamemode, &dataset).await?;
        let skills = postprocess(&estimate, &run.players, &self.config.calibration)?;
        let leaderboard = Leaderboard::build(gamemode, skills, &directory)?;
        let path = leaderboard.save(&pipeline.output_dir)?;

        let report = GamemodeReport {
            gamemode,
            players: dataset.player_count,
            contexts: dataset.context_count,
            records: dataset.record_count,
            ties: dataset.tie_count(),
            draws: estimate.draw_count(),
            leaderboard: path,
            elapsed: started.elapsed(),
        };
        info!(
            "Finished {} in {:.2}s",
            gamemode,
            report.elapsed.as_secs_f64()
        );
        Ok(report)
    }
}
