//! Inference engine configuration

use crate::inference::{CmdStanConfig, NativeEngineConfig};
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Which backend computes the skill draws
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// In-process Plackett-Luce engine
    #[default]
    Native,
    /// External CmdStan model executable
    CmdStan,
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineKind::Native => write!(f, "native"),
            EngineKind::CmdStan => write!(f, "cmdstan"),
        }
    }
}

impl FromStr for EngineKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "native" => Ok(EngineKind::Native),
            "cmdstan" => Ok(EngineKind::CmdStan),
            _ => Err(anyhow!("Unknown inference engine: {}", s)),
        }
    }
}

/// Engine settings shared by both backends
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceSettings {
    pub engine: EngineKind,
    /// Parallel chains or worker threads
    pub threads: usize,
    /// Retained posterior draws in sampling mode
    pub draws: usize,
    pub warmup: usize,
    pub seed: u64,
    /// Optimizer iteration cap in point-estimate mode
    pub max_iterations: usize,
    pub tolerance: f64,
    /// Fail instead of warning when the optimizer stops unconverged
    pub require_converged: bool,
    pub initial_skill: f64,
    pub prior_shape: f64,
    pub prior_rate: f64,
    /// Report engine progress at info level
    pub show_progress: bool,
    /// Compiled model executable for the CmdStan engine
    pub cmdstan_model: PathBuf,
    /// Scratch location for CmdStan runs, system temp dir when unset
    pub work_dir: Option<PathBuf>,
}

impl Default for InferenceSettings {
    fn default() -> Self {
        let native = NativeEngineConfig::default();
        Self {
            engine: EngineKind::default(),
            threads: native.threads,
            draws: native.draws,
            warmup: native.warmup,
            seed: native.seed,
            max_iterations: native.max_iterations,
            tolerance: native.tolerance,
            require_converged: native.require_converged,
            initial_skill: native.initial_skill,
            prior_shape: native.prior_shape,
            prior_rate: native.prior_rate,
            show_progress: native.show_progress,
            cmdstan_model: CmdStanConfig::default().model,
            work_dir: None,
        }
    }
}

impl InferenceSettings {
    pub fn native_config(&self) -> NativeEngineConfig {
        NativeEngineConfig {
            threads: self.threads,
            draws: self.draws,
            warmup: self.warmup,
            seed: self.seed,
            max_iterations: self.max_iterations,
            tolerance: self.tolerance,
            require_converged: self.require_converged,
            initial_skill: self.initial_skill,
            prior_shape: self.prior_shape,
            prior_rate: self.prior_rate,
            show_progress: self.show_progress,
        }
    }

    pub fn cmdstan_config(&self) -> CmdStanConfig {
        CmdStanConfig {
            model: self.cmdstan_model.clone(),
            work_dir: self.work_dir.clone().unwrap_or_else(std::env::temp_dir),
            threads: self.threads,
            draws: self.draws,
            warmup: self.warmup,
            seed: self.seed,
            max_iterations: self.max_iterations,
            require_converged: self.require_converged,
            initial_skill: self.initial_skill,
            show_progress: self.show_progress,
        }
    }
}
