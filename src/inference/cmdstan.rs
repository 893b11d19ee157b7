//! CmdStan process back end
//!
//! Runs a compiled Stan model executable that declares a positive vector
//! `beta` of player skills and reads the same data keys as
//! [`InferenceRequest`]. The request is handed over as a JSON data file and
//! the draws are read back from the CSV output.

use crate::inference::engine::{
    CancelToken, InferenceEngine, InferenceError, InferenceRequest, RunMode, SkillEstimate,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Configuration for the CmdStan back end
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CmdStanConfig {
    /// Compiled model executable
    pub model: PathBuf,
    /// Directory for per-call scratch directories
    pub work_dir: PathBuf,
    pub threads: usize,
    pub draws: usize,
    pub warmup: usize,
    pub seed: u64,
    pub max_iterations: usize,
    pub require_converged: bool,
    pub initial_skill: f64,
    pub show_progress: bool,
}

impl Default for CmdStanConfig {
    fn default() -> Self {
        Self {
            model: PathBuf::from("models/ranker"),
            work_dir: std::env::temp_dir(),
            threads: 8,
            draws: 1000,
            warmup: 1000,
            seed: 0x5eed,
            max_iterations: 100_000,
            require_converged: false,
            initial_skill: 0.001,
            show_progress: false,
        }
    }
}

/// Inference through an external CmdStan model executable
#[derive(Debug, Clone)]
pub struct CmdStanEngine {
    config: CmdStanConfig,
}

impl CmdStanEngine {
    pub fn new(config: CmdStanConfig) -> anyhow::Result<Self> {
        if config.model.as_os_str().is_empty() {
            anyhow::bail!("CmdStan model path cannot be empty");
        }
        if config.threads == 0 || config.draws == 0 || config.max_iterations == 0 {
            anyhow::bail!("CmdStan threads, draws and iterations must be greater than 0");
        }
        if !(config.initial_skill > 0.0) {
            anyhow::bail!("Initial skill must be positive");
        }
        Ok(Self { config })
    }

    /// Command line arguments after the executable name
    pub fn arguments(&self, mode: RunMode, data: &Path, init: &Path, output: &Path) -> Vec<String> {
        let config = &self.config;
        let mut args = match mode {
            RunMode::PointEstimate => vec![
                "optimize".to_string(),
                format!("iter={}", config.max_iterations),
            ],
            RunMode::Sampling => vec![
                "sample".to_string(),
                format!("num_samples={}", config.draws),
                format!("num_warmup={}", config.warmup),
            ],
        };
        args.push("data".to_string());
        args.push(format!("file={}", data.display()));
        args.push(format!("init={}", init.display()));
        if mode == RunMode::Sampling {
            args.push("random".to_string());
            args.push(format!("seed={}", config.seed));
        }
        args.push("output".to_string());
        args.push(format!("file={}", output.display()));
        args.push("refresh=1".to_string());
        if mode == RunMode::Sampling {
            args.push(format!("num_threads={}", config.threads));
        }
        args
    }

    async fn run(
        &self,
        request: &InferenceRequest,
        mode: RunMode,
    ) -> Result<SkillEstimate, InferenceError> {
        let config = &self.config;
        tokio::fs::create_dir_all(&config.work_dir)
            .await
            .map_err(|e| backend("create work directory", e))?;
        let scratch = tempfile::Builder::new()
            .prefix("cmdstan-")
            .tempdir_in(&config.work_dir)
            .map_err(|e| backend("create scratch directory", e))?;

        let data_path = scratch.path().join("data.json");
        let init_path = scratch.path().join("init.json");
        let output_path = scratch.path().join("output.csv");

        let data = serde_json::to_vec(request).map_err(|e| backend("encode data", e))?;
        tokio::fs::write(&data_path, data)
            .await
            .map_err(|e| backend("write data file", e))?;
        let init = serde_json::json!({ "beta": vec![config.initial_skill; request.players] });
        tokio::fs::write(&init_path, init.to_string())
            .await
            .map_err(|e| backend("write init file", e))?;

        let args = self.arguments(mode, &data_path, &init_path, &output_path);
        debug!("Running {} {}", config.model.display(), args.join(" "));

        let mut child = Command::new(&config.model)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(if config.show_progress {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| backend(&format!("start {}", config.model.display()), e))?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let forward_progress = async {
            if let Some(stdout) = stdout {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    info!("cmdstan: {}", line);
                }
            }
        };
        let collect_diagnostics = async {
            let mut text = String::new();
            if let Some(mut stderr) = stderr {
                let _ = stderr.read_to_string(&mut text).await;
            }
            text
        };
        let (status, (), diagnostics) = tokio::join!(child.wait(), forward_progress, collect_diagnostics);
        let status = status.map_err(|e| backend("wait for model", e))?;

        let failed = !status.success();
        if failed {
            if mode == RunMode::PointEstimate && !config.require_converged {
                warn!(
                    "CmdStan optimize exited with {}; accepting its last estimate: {}",
                    status,
                    diagnostics.trim_end()
                );
            } else {
                return Err(InferenceError::Backend {
                    message: diagnostics.trim_end().to_string(),
                });
            }
        }

        let players = request.players;
        let draws = tokio::task::spawn_blocking(move || read_draws(&output_path, players))
            .await
            .map_err(|e| backend("read output", e))?;
        drop(scratch);

        // A failed optimizer without a usable estimate reports its own diagnostics.
        let draws = match draws {
            Ok(draws) if !(failed && draws.is_empty()) => draws,
            Err(e) if !failed => return Err(e),
            _ => {
                return Err(InferenceError::Backend {
                    message: diagnostics.trim_end().to_string(),
                })
            }
        };

        let estimate = match mode {
            RunMode::PointEstimate => {
                let last = draws.into_iter().last().ok_or_else(|| InferenceError::Backend {
                    message: "optimizer output has no estimate row".to_string(),
                })?;
                SkillEstimate::point(last)
            }
            RunMode::Sampling => SkillEstimate::sampled(draws),
        };
        Ok(estimate)
    }
}

fn backend(action: &str, error: impl std::fmt::Display) -> InferenceError {
    InferenceError::Backend {
        message: format!("failed to {action}: {error}"),
    }
}

/// Read `beta.1 ..= beta.P` from every row of a Stan CSV file
pub fn read_draws(path: &Path, players: usize) -> Result<Vec<Vec<f64>>, InferenceError> {
    let mut reader = csv::ReaderBuilder::new()
        .comment(Some(b'#'))
        .from_path(path)
        .map_err(|e| backend("open model output", e))?;

    let headers = reader
        .headers()
        .map_err(|e| backend("read output header", e))?
        .clone();
    let columns = (1..=players)
        .map(|k| {
            let name = format!("beta.{k}");
            headers
                .iter()
                .position(|header| header == name)
                .ok_or_else(|| InferenceError::Backend {
                    message: format!("model output has no column {name}"),
                })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut draws = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record.map_err(|e| backend("read output row", e))?;
        let draw = columns
            .iter()
            .map(|&column| {
                record
                    .get(column)
                    .and_then(|value| value.trim().parse::<f64>().ok())
                    .ok_or_else(|| InferenceError::Backend {
                        message: format!("unreadable value in output row {} column {}", row + 1, column + 1),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        draws.push(draw);
    }
    Ok(draws)
}

#[async_trait]
impl InferenceEngine for CmdStanEngine {
    fn name(&self) -> &'static str {
        "cmdstan"
    }

    async fn estimate(
        &self,
        request: Arc<InferenceRequest>,
        mode: RunMode,
        cancel: CancelToken,
    ) -> Result<SkillEstimate, InferenceError> {
        if cancel.is_cancelled() {
            return Err(InferenceError::Cancelled);
        }
        // Dropping the call kills the child process.
        self.run(&request, mode).await
    }
}
