//! Main application configuration
//!
//! This module defines the primary configuration structures for the ranking
//! run, including TOML and environment variable loading and validation.

use crate::config::inference::{EngineKind, InferenceSettings};
use crate::inference::{AdapterConfig, RunMode};
use crate::ranking::SkillCalibration;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub service: ServiceSettings,
    pub pipeline: PipelineSettings,
    pub inference: InferenceSettings,
    pub calibration: SkillCalibration,
}

/// Service-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Service name for logging
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

/// Input, output and run-mode settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Directory holding `{gamemode}.json` and `{gamemode}_users.csv`
    pub input_dir: PathBuf,
    /// Directory receiving `{gamemode}_ranking.txt`
    pub output_dir: PathBuf,
    /// Directory receiving `{gamemode}.draws.json`
    pub draws_dir: PathBuf,
    /// Point estimate instead of full posterior sampling
    pub fast: bool,
    /// Reuse persisted draws of an identical dataset
    pub reuse_draws: bool,
    /// Treat modifier lists as unordered sets
    pub canonicalize_modifiers: bool,
    pub inference_timeout_seconds: u64,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            name: "score-ranker".to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("processed_score_files"),
            output_dir: PathBuf::from("."),
            draws_dir: PathBuf::from("."),
            fast: false,
            reuse_draws: false,
            canonicalize_modifiers: false,
            inference_timeout_seconds: 6 * 60 * 60, // 6 hours
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables with fallback to defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        validate_config(&config)?;
        Ok(config)
    }

    /// Load configuration from a TOML file; environment variables still
    /// override what the file sets
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config: Self = toml::from_str(&text)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.apply_env()?;
        validate_config(&config)?;
        Ok(config)
    }

    fn apply_env(&mut self) -> Result<()> {
        // Service settings
        if let Ok(log_level) = env::var("LOG_LEVEL") {
            self.service.log_level = log_level;
        }

        // Pipeline settings
        if let Ok(dir) = env::var("RANKER_INPUT_DIR") {
            self.pipeline.input_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = env::var("RANKER_OUTPUT_DIR") {
            self.pipeline.output_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = env::var("RANKER_DRAWS_DIR") {
            self.pipeline.draws_dir = PathBuf::from(dir);
        }
        if let Ok(fast) = env::var("RANKER_FAST") {
            self.pipeline.fast = fast
                .parse()
                .map_err(|_| anyhow!("Invalid RANKER_FAST value: {}", fast))?;
        }
        if let Ok(reuse) = env::var("RANKER_REUSE_DRAWS") {
            self.pipeline.reuse_draws = reuse
                .parse()
                .map_err(|_| anyhow!("Invalid RANKER_REUSE_DRAWS value: {}", reuse))?;
        }
        if let Ok(timeout) = env::var("RANKER_TIMEOUT_SECONDS") {
            self.pipeline.inference_timeout_seconds = timeout
                .parse()
                .map_err(|_| anyhow!("Invalid RANKER_TIMEOUT_SECONDS value: {}", timeout))?;
        }

        // Inference settings
        if let Ok(engine) = env::var("RANKER_ENGINE") {
            self.inference.engine = engine.parse::<EngineKind>()?;
        }
        if let Ok(threads) = env::var("RANKER_THREADS") {
            self.inference.threads = threads
                .parse()
                .map_err(|_| anyhow!("Invalid RANKER_THREADS value: {}", threads))?;
        }
        if let Ok(draws) = env::var("RANKER_DRAWS") {
            self.inference.draws = draws
                .parse()
                .map_err(|_| anyhow!("Invalid RANKER_DRAWS value: {}", draws))?;
        }
        if let Ok(seed) = env::var("RANKER_SEED") {
            self.inference.seed = seed
                .parse()
                .map_err(|_| anyhow!("Invalid RANKER_SEED value: {}", seed))?;
        }
        if let Ok(model) = env::var("RANKER_CMDSTAN_MODEL") {
            self.inference.cmdstan_model = PathBuf::from(model);
        }

        Ok(())
    }

    pub fn run_mode(&self) -> RunMode {
        RunMode::from_fast_flag(self.pipeline.fast)
    }

    /// Get inference timeout as Duration
    pub fn inference_timeout(&self) -> Duration {
        Duration::from_secs(self.pipeline.inference_timeout_seconds)
    }

    pub fn adapter_config(&self) -> AdapterConfig {
        AdapterConfig {
            mode: self.run_mode(),
            draws_dir: self.pipeline.draws_dir.clone(),
            reuse_draws: self.pipeline.reuse_draws,
            timeout: self.inference_timeout(),
        }
    }
}

/// Validate configuration values
pub fn validate_config(config: &AppConfig) -> Result<()> {
    // Validate log level
    match config.service.log_level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        _ => return Err(anyhow!("Invalid log level: {}", config.service.log_level)),
    }

    // Validate pipeline settings
    if config.pipeline.inference_timeout_seconds == 0 {
        return Err(anyhow!("Inference timeout must be greater than 0"));
    }

    // Validate engine settings
    match config.inference.engine {
        EngineKind::Native => config.inference.native_config().validate()?,
        EngineKind::CmdStan => {
            if config.inference.cmdstan_model.as_os_str().is_empty() {
                return Err(anyhow!("CmdStan model path cannot be empty"));
            }
            if config.inference.threads == 0 || config.inference.draws == 0 {
                return Err(anyhow!("CmdStan needs at least one thread and one draw"));
            }
        }
    }

    // Validate calibration
    if !config.calibration.offset.is_finite() {
        return Err(anyhow!("Calibration offset must be finite"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ranking::SpreadDivisor;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(validate_config(&config).is_ok());
        assert_eq!(config.run_mode(), RunMode::Sampling);
        assert_eq!(config.inference_timeout(), Duration::from_secs(21600));
        assert_eq!(config.pipeline.input_dir, PathBuf::from("processed_score_files"));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [pipeline]
            fast = true
            output_dir = "out"

            [inference]
            engine = "cmdstan"
            cmdstan_model = "/opt/models/ranker"

            [calibration]
            divisor = "standard_deviation"
            "#,
        )
        .unwrap();

        assert_eq!(config.run_mode(), RunMode::PointEstimate);
        assert_eq!(config.pipeline.output_dir, PathBuf::from("out"));
        assert_eq!(config.pipeline.draws_dir, PathBuf::from("."));
        assert_eq!(config.inference.engine, EngineKind::CmdStan);
        assert_eq!(config.inference.draws, 1000);
        assert_eq!(config.calibration.divisor, SpreadDivisor::StandardDeviation);
        assert_eq!(config.calibration.offset, 2.0);
        assert_eq!(config.service.log_level, "info");
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.service.log_level = "loud".to_string();
        assert!(validate_config(&config).is_err());

        let mut config = AppConfig::default();
        config.pipeline.inference_timeout_seconds = 0;
        assert!(validate_config(&config).is_err());

        let mut config = AppConfig::default();
        config.inference.threads = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_adapter_config() {
        let mut config = AppConfig::default();
        config.pipeline.reuse_draws = true;
        config.pipeline.draws_dir = PathBuf::from("draws");

        let adapter = config.adapter_config();
        assert!(adapter.reuse_draws);
        assert_eq!(adapter.draws_dir, PathBuf::from("draws"));
        assert_eq!(adapter.mode, RunMode::Sampling);
    }
}
