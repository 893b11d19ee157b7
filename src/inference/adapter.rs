//! Inference invocation adapter
//!
//! Packages an assembled dataset as an [`InferenceRequest`], runs the
//! configured engine under a timeout, and persists the raw draws. With draw
//! reuse enabled, a persisted artifact of the identical dataset replaces the
//! engine call.

use crate::dataset::AssembledDataset;
use crate::error::{RankerError, Result};
use crate::inference::artifact::DrawArtifact;
use crate::inference::engine::{
    CancelToken, InferenceEngine, InferenceError, InferenceRequest, RunMode, SkillEstimate,
};
use crate::types::Gamemode;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Adapter settings
#[derive(Debug, Clone)]
pub struct AdapterConfig {
    pub mode: RunMode,
    /// Directory holding `{gamemode}.draws.json`
    pub draws_dir: PathBuf,
    pub reuse_draws: bool,
    pub timeout: Duration,
}

/// Cancels the engine when the surrounding call is dropped or finishes
struct CancelOnDrop(CancelToken);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

pub struct InferenceAdapter {
    engine: Arc<dyn InferenceEngine>,
    config: AdapterConfig,
}

impl InferenceAdapter {
    pub fn new(engine: Arc<dyn InferenceEngine>, config: AdapterConfig) -> Self {
        Self { engine, config }
    }

    pub fn mode(&self) -> RunMode {
        self.config.mode
    }

    pub fn engine_name(&self) -> &'static str {
        self.engine.name()
    }

    /// Raw skill draws for `dataset`, from a reusable artifact or the engine
    pub async fn estimate(
        &self,
        gamemode: Gamemode,
        dataset: &AssembledDataset,
    ) -> Result<SkillEstimate> {
        let mode = self.config.mode;
        let request = Arc::new(InferenceRequest::from(dataset));
        request
            .validate()
            .map_err(|source| RankerError::Inference { gamemode, source })?;

        let artifact_path = DrawArtifact::path_for(&self.config.draws_dir, gamemode);
        if self.config.reuse_draws {
            if let Some(artifact) = DrawArtifact::load(&artifact_path)? {
                match artifact.mismatch(gamemode, &request, mode) {
                    None => {
                        info!(
                            "Reusing {} draws from {} (run {})",
                            artifact.estimate.draw_count(),
                            artifact_path.display(),
                            artifact.run_id
                        );
                        return Ok(artifact.estimate);
                    }
                    Some(reason) => warn!(
                        "Ignoring draw artifact {}: {}",
                        artifact_path.display(),
                        reason
                    ),
                }
            }
        }

        info!(
            "Running {} inference with the {} engine (M={}, S={}, P={})",
            mode,
            self.engine.name(),
            request.contexts,
            request.records,
            request.players
        );
        let started = Instant::now();
        let cancel = CancelToken::new();
        let _guard = CancelOnDrop(cancel.clone());

        let call = self.engine.estimate(Arc::clone(&request), mode, cancel.clone());
        let estimate = match tokio::time::timeout(self.config.timeout, call).await {
            Ok(Ok(estimate)) => estimate,
            Ok(Err(source)) => return Err(RankerError::Inference { gamemode, source }),
            Err(_) => {
                cancel.cancel();
                return Err(RankerError::InferenceTimeout {
                    gamemode,
                    seconds: self.config.timeout.as_secs(),
                });
            }
        };

        if estimate.mode != mode {
            return Err(RankerError::Inference {
                gamemode,
                source: InferenceError::Backend {
                    message: format!("engine answered a {mode} request in {} mode", estimate.mode),
                },
            });
        }
        estimate
            .validate_shape(request.players)
            .map_err(|message| RankerError::Inference {
                gamemode,
                source: InferenceError::Backend { message },
            })?;

        info!(
            "Inference for {} produced {} draws in {:.2}s",
            gamemode,
            estimate.draw_count(),
            started.elapsed().as_secs_f64()
        );

        DrawArtifact::new(gamemode, self.engine.name(), &request, estimate.clone())
            .save(&artifact_path)?;
        Ok(estimate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::RunContext;
    use crate::inference::engine::MockInferenceEngine;
    use crate::types::{ModifierSet, ScoreEvent};
    use async_trait::async_trait;

    fn dataset() -> AssembledDataset {
        let mut run = RunContext::new(Gamemode::Osu);
        AssembledDataset::assemble(
            &mut run,
            vec![
                ScoreEvent::new(11, 1, ModifierSet::default(), 100.0),
                ScoreEvent::new(22, 1, ModifierSet::default(), 200.0),
            ],
        )
        .unwrap()
    }

    fn config(dir: &std::path::Path, mode: RunMode, reuse_draws: bool) -> AdapterConfig {
        AdapterConfig {
            mode,
            draws_dir: dir.to_path_buf(),
            reuse_draws,
            timeout: Duration::from_secs(5),
        }
    }

    fn mock_returning(estimate: SkillEstimate, calls: usize) -> MockInferenceEngine {
        let mut engine = MockInferenceEngine::new();
        engine.expect_name().return_const("mock");
        engine
            .expect_estimate()
            .times(calls)
            .returning(move |_, _, _| Ok(estimate.clone()));
        engine
    }

    #[tokio::test]
    async fn test_estimate_persists_draws() {
        let dir = tempfile::tempdir().unwrap();
        let engine = mock_returning(SkillEstimate::point(vec![0.2, 0.8]), 1);
        let adapter = InferenceAdapter::new(
            Arc::new(engine),
            config(dir.path(), RunMode::PointEstimate, false),
        );

        let estimate = adapter.estimate(Gamemode::Osu, &dataset()).await.unwrap();
        assert_eq!(estimate.draws, vec![vec![0.2, 0.8]]);

        let artifact = DrawArtifact::load(&DrawArtifact::path_for(dir.path(), Gamemode::Osu))
            .unwrap()
            .unwrap();
        assert_eq!(artifact.engine, "mock");
        assert_eq!(artifact.estimate, estimate);
    }

    #[tokio::test]
    async fn test_matching_artifact_skips_engine() {
        let dir = tempfile::tempdir().unwrap();
        let first = InferenceAdapter::new(
            Arc::new(mock_returning(SkillEstimate::point(vec![0.2, 0.8]), 1)),
            config(dir.path(), RunMode::PointEstimate, true),
        );
        first.estimate(Gamemode::Osu, &dataset()).await.unwrap();

        let second = InferenceAdapter::new(
            Arc::new(mock_returning(SkillEstimate::point(vec![9.0, 9.0]), 0)),
            config(dir.path(), RunMode::PointEstimate, true),
        );
        let reused = second.estimate(Gamemode::Osu, &dataset()).await.unwrap();
        assert_eq!(reused.draws, vec![vec![0.2, 0.8]]);
    }

    #[tokio::test]
    async fn test_mismatched_artifact_is_recomputed() {
        let dir = tempfile::tempdir().unwrap();
        let point = InferenceAdapter::new(
            Arc::new(mock_returning(SkillEstimate::point(vec![0.2, 0.8]), 1)),
            config(dir.path(), RunMode::PointEstimate, true),
        );
        point.estimate(Gamemode::Osu, &dataset()).await.unwrap();

        let sampled = SkillEstimate::sampled(vec![vec![0.1, 0.9], vec![0.3, 0.7]]);
        let sampling = InferenceAdapter::new(
            Arc::new(mock_returning(sampled.clone(), 1)),
            config(dir.path(), RunMode::Sampling, true),
        );
        let estimate = sampling.estimate(Gamemode::Osu, &dataset()).await.unwrap();
        assert_eq!(estimate, sampled);
    }

    #[tokio::test]
    async fn test_engine_failure_is_forwarded() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = MockInferenceEngine::new();
        engine.expect_name().return_const("mock");
        engine.expect_estimate().returning(|_, _, _| {
            Err(InferenceError::Backend {
                message: "Rejecting initial value".to_string(),
            })
        });
        let adapter = InferenceAdapter::new(
            Arc::new(engine),
            config(dir.path(), RunMode::PointEstimate, false),
        );

        let err = adapter.estimate(Gamemode::Catch, &dataset()).await.unwrap_err();
        match err {
            RankerError::Inference { gamemode, source } => {
                assert_eq!(gamemode, Gamemode::Catch);
                assert_eq!(source.to_string(), "Rejecting initial value");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!DrawArtifact::path_for(dir.path(), Gamemode::Catch).exists());
    }

    #[tokio::test]
    async fn test_wrong_shape_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = InferenceAdapter::new(
            Arc::new(mock_returning(SkillEstimate::point(vec![0.2]), 1)),
            config(dir.path(), RunMode::PointEstimate, false),
        );
        assert!(matches!(
            adapter.estimate(Gamemode::Osu, &dataset()).await,
            Err(RankerError::Inference { .. })
        ));
    }

    struct StalledEngine {
        cancel_seen: Arc<std::sync::Mutex<Option<CancelToken>>>,
    }

    #[async_trait]
    impl InferenceEngine for StalledEngine {
        fn name(&self) -> &'static str {
            "stalled"
        }

        async fn estimate(
            &self,
            _request: Arc<InferenceRequest>,
            _mode: RunMode,
            cancel: CancelToken,
        ) -> std::result::Result<SkillEstimate, InferenceError> {
            if let Ok(mut seen) = self.cancel_seen.lock() {
                *seen = Some(cancel);
            }
            tokio::time::sleep(Duration::from_secs(60)).await;
            Err(InferenceError::Cancelled)
        }
    }

    #[tokio::test]
    async fn test_timeout_cancels_engine() {
        let dir = tempfile::tempdir().unwrap();
        let cancel_seen = Arc::new(std::sync::Mutex::new(None));
        let adapter = InferenceAdapter::new(
            Arc::new(StalledEngine {
                cancel_seen: cancel_seen.clone(),
            }),
            AdapterConfig {
                timeout: Duration::from_millis(50),
                ..config(dir.path(), RunMode::Sampling, false)
            },
        );

        let result = adapter.estimate(Gamemode::Mania, &dataset()).await;
        assert!(matches!(
            result,
            Err(RankerError::InferenceTimeout {
                gamemode: Gamemode::Mania,
                ..
            })
        ));

        let token = cancel_seen.lock().unwrap().clone().unwrap();
        assert!(token.is_cancelled());
        assert!(!DrawArtifact::path_for(dir.path(), Gamemode::Mania).exists());
    }
}
