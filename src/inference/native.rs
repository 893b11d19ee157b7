//! Built-in Plackett-Luce inference engine
//!
//! Within a context, records are ranked best-first by descending score. Each
//! group of exactly tied records is one selection stage whose risk set is the
//! group plus every lower record (Breslow's treatment of ties); the lowest
//! group of a context selects nothing. Raw skills are positive worth
//! parameters with a Gamma(`prior_shape`, `prior_rate`) prior.
//!
//! Point estimates use minorization-maximization for the posterior mode.
//! Sampling is a Gibbs sampler over one Gamma latent variable per stage.

use crate::inference::engine::{
    CancelToken, InferenceEngine, InferenceError, InferenceRequest, RunMode, SkillEstimate,
};
use async_trait::async_trait;
use rand::SeedableRng;
use rand_distr::{Distribution, Gamma};
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Iterations between progress reports
const PROGRESS_INTERVAL: usize = 100;

/// Native engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NativeEngineConfig {
    /// Worker threads for the sampling chain
    pub threads: usize,
    /// Retained posterior draws
    pub draws: usize,
    /// Discarded burn-in iterations
    pub warmup: usize,
    pub seed: u64,
    /// Optimizer iteration cap
    pub max_iterations: usize,
    /// Largest relative skill change accepted as converged
    pub tolerance: f64,
    pub require_converged: bool,
    /// Starting value of every player's skill
    pub initial_skill: f64,
    pub prior_shape: f64,
    pub prior_rate: f64,
    pub show_progress: bool,
}

impl Default for NativeEngineConfig {
    fn default() -> Self {
        Self {
            threads: 8,
            draws: 1000,
            warmup: 1000,
            seed: 0x5eed,
            max_iterations: 100_000,
            tolerance: 1e-9,
            require_converged: false,
            initial_skill: 0.001,
            prior_shape: 2.0,
            prior_rate: 1.0,
            show_progress: false,
        }
    }
}

impl NativeEngineConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.threads == 0 {
            anyhow::bail!("Native engine needs at least one thread");
        }
        if self.draws == 0 {
            anyhow::bail!("Native engine needs at least one draw");
        }
        if self.max_iterations == 0 {
            anyhow::bail!("Native engine needs at least one iteration");
        }
        if !(self.tolerance > 0.0) {
            anyhow::bail!("Tolerance must be positive");
        }
        if !(self.initial_skill > 0.0) || !self.initial_skill.is_finite() {
            anyhow::bail!("Initial skill must be a positive finite value");
        }
        if !(self.prior_shape >= 1.0) || !self.prior_shape.is_finite() {
            anyhow::bail!("Prior shape must be at least 1");
        }
        if !(self.prior_rate > 0.0) || !self.prior_rate.is_finite() {
            anyhow::bail!("Prior rate must be positive");
        }
        Ok(())
    }
}

/// Stage structure of a request, derived once per inference call
#[derive(Debug)]
struct ComparisonModel {
    players: usize,
    /// 0-based player of every record
    record_player: Vec<usize>,
    /// Tie groups of every context, lowest scores first
    groups: Vec<Vec<Range<usize>>>,
    /// Number of stages each player is selected in
    wins: Vec<f64>,
}

impl ComparisonModel {
    fn new(request: &InferenceRequest) -> Result<Self, InferenceError> {
        request.validate()?;

        let record_player: Vec<usize> = request.score_to_player.iter().map(|p| p - 1).collect();
        let mut groups = Vec::with_capacity(request.contexts);
        let mut wins = vec![0.0; request.players];

        for (context, segment) in request.segments().enumerate() {
            let mut context_groups = Vec::new();
            let mut group_start = segment.start;
            for record in segment.clone() {
                if request.tie_flags[record] == 0 {
                    context_groups.push(group_start..record + 1);
                    group_start = record + 1;
                }
            }

            if context_groups.len() == 1 && segment.len() > 1 {
                return Err(InferenceError::Degenerate {
                    reason: format!(
                        "all {} scores of context {} tie",
                        segment.len(),
                        context + 1
                    ),
                });
            }

            for group in context_groups.iter().skip(1) {
                for record in group.clone() {
                    wins[record_player[record]] += 1.0;
                }
            }
            groups.push(context_groups);
        }

        Ok(Self {
            players: request.players,
            record_player,
            groups,
            wins,
        })
    }

    /// Per-player sum of stage weights over every risk set the player is in
    ///
    /// `weigher(context)` yields the weight function of one context, called
    /// with `(stage size, risk set total)` from the top stage down. Contexts
    /// run in parallel; the reduction is sequential so results do not depend
    /// on scheduling.
    fn exposure<F, W>(&self, skills: &[f64], weigher: F) -> Vec<f64>
    where
        F: Fn(usize) -> W + Sync,
        W: FnMut(f64, f64) -> f64,
    {
        let parts: Vec<Vec<(usize, f64)>> = self
            .groups
            .par_iter()
            .enumerate()
            .map(|(context, groups)| {
                let mut weigh = weigher(context);
                self.context_exposure(groups, skills, &mut weigh)
            })
            .collect();

        let mut exposure = vec![0.0; self.players];
        for (player, value) in parts.into_iter().flatten() {
            exposure[player] += value;
        }
        exposure
    }

    fn context_exposure(
        &self,
        groups: &[Range<usize>],
        skills: &[f64],
        weigh: &mut impl FnMut(f64, f64) -> f64,
    ) -> Vec<(usize, f64)> {
        let mut risk_totals = Vec::with_capacity(groups.len());
        let mut running = 0.0;
        for group in groups {
            running += group
                .clone()
                .map(|record| skills[self.record_player[record]])
                .sum::<f64>();
            risk_totals.push(running);
        }

        let mut contributions = Vec::new();
        let mut carried = 0.0;
        for (position, group) in groups.iter().enumerate().rev() {
            if position > 0 {
                carried += weigh(group.len() as f64, risk_totals[position]);
            }
            for record in group.clone() {
                contributions.push((self.record_player[record], carried));
            }
        }
        contributions
    }
}

/// Plackett-Luce engine running in-process
#[derive(Debug, Clone)]
pub struct NativeEngine {
    config: NativeEngineConfig,
}

impl NativeEngine {
    pub fn new(config: NativeEngineConfig) -> anyhow::Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &NativeEngineConfig {
        &self.config
    }

    /// Run inference on the calling thread
    pub fn estimate_blocking(
        &self,
        request: &InferenceRequest,
        mode: RunMode,
        cancel: &CancelToken,
    ) -> Result<SkillEstimate, InferenceError> {
        let model = ComparisonModel::new(request)?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.threads)
            .build()
            .map_err(|e| InferenceError::Backend {
                message: format!("failed to start worker pool: {e}"),
            })?;

        let estimate = pool.install(|| match mode {
            RunMode::PointEstimate => self.optimize(&model, cancel).map(SkillEstimate::point),
            RunMode::Sampling => self.sample(&model, cancel).map(SkillEstimate::sampled),
        })?;

        for draw in &estimate.draws {
            if let Some(player) = draw.iter().position(|s| !s.is_finite() || *s <= 0.0) {
                return Err(InferenceError::Degenerate {
                    reason: format!(
                        "player {} ended with non-positive skill {}",
                        player + 1,
                        draw[player]
                    ),
                });
            }
        }
        Ok(estimate)
    }

    fn optimize(
        &self,
        model: &ComparisonModel,
        cancel: &CancelToken,
    ) -> Result<Vec<f64>, InferenceError> {
        let config = &self.config;
        let started = Instant::now();
        let mut skills = vec![config.initial_skill; model.players];

        for iteration in 1..=config.max_iterations {
            if cancel.is_cancelled() {
                return Err(InferenceError::Cancelled);
            }

            let exposure = model.exposure(&skills, |_| |size: f64, total: f64| size / total);
            let mut max_change: f64 = 0.0;
            for ((skill, wins), exposure) in skills.iter_mut().zip(&model.wins).zip(&exposure) {
                let updated = (config.prior_shape - 1.0 + wins) / (config.prior_rate + exposure);
                max_change = max_change.max((updated - *skill).abs() / *skill);
                *skill = updated;
            }

            if iteration % PROGRESS_INTERVAL == 0 {
                self.progress(format_args!(
                    "optimize iteration {iteration}: max relative change {max_change:.3e}"
                ));
            }

            if max_change < config.tolerance {
                debug!(
                    "Optimizer converged after {} iterations in {:.2}s",
                    iteration,
                    started.elapsed().as_secs_f64()
                );
                return Ok(skills);
            }
        }

        if config.require_converged {
            return Err(InferenceError::NotConverged {
                iterations: config.max_iterations,
            });
        }
        warn!(
            "Optimizer stopped at the {} iteration cap without converging; accepting the current estimate",
            config.max_iterations
        );
        Ok(skills)
    }

    fn sample(
        &self,
        model: &ComparisonModel,
        cancel: &CancelToken,
    ) -> Result<Vec<Vec<f64>>, InferenceError> {
        let config = &self.config;
        let started = Instant::now();
        let total_iterations = config.warmup + config.draws;
        let mut skills = vec![config.initial_skill; model.players];
        let mut draws = Vec::with_capacity(config.draws);

        for iteration in 0..total_iterations {
            if cancel.is_cancelled() {
                return Err(InferenceError::Cancelled);
            }

            let exposure = model.exposure(&skills, |context| {
                let mut rng = stream_rng(config.seed, iteration, context as u64 + 1);
                move |size: f64, total: f64| match Gamma::new(size, 1.0 / total) {
                    Ok(latent) => latent.sample(&mut rng),
                    Err(_) => f64::NAN,
                }
            });

            let mut rng = stream_rng(config.seed, iteration, 0);
            for (player, skill) in skills.iter_mut().enumerate() {
                let shape = config.prior_shape + model.wins[player];
                let rate = config.prior_rate + exposure[player];
                let posterior =
                    Gamma::new(shape, 1.0 / rate).map_err(|e| InferenceError::Degenerate {
                        reason: format!(
                            "invalid conditional for player {} (shape {shape}, rate {rate}): {e}",
                            player + 1
                        ),
                    })?;
                *skill = posterior.sample(&mut rng);
            }

            if iteration >= config.warmup {
                draws.push(skills.clone());
            }
            if (iteration + 1) % PROGRESS_INTERVAL == 0 {
                let phase = if iteration < config.warmup {
                    "warmup"
                } else {
                    "sampling"
                };
                self.progress(format_args!(
                    "iteration {}/{} ({phase})",
                    iteration + 1,
                    total_iterations
                ));
            }
        }

        debug!(
            "Sampler produced {} draws in {:.2}s",
            draws.len(),
            started.elapsed().as_secs_f64()
        );
        Ok(draws)
    }

    fn progress(&self, message: std::fmt::Arguments<'_>) {
        if self.config.show_progress {
            info!("native engine: {}", message);
        } else {
            debug!("native engine: {}", message);
        }
    }
}

/// Independent generator for one `(iteration, stream)` pair of a chain
fn stream_rng(seed: u64, iteration: usize, stream: u64) -> Xoshiro256PlusPlus {
    let mixed = seed
        ^ (iteration as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15)
        ^ stream.wrapping_mul(0xc2b2_ae3d_27d4_eb4f);
    Xoshiro256PlusPlus::seed_from_u64(mixed)
}

#[async_trait]
impl InferenceEngine for NativeEngine {
    fn name(&self) -> &'static str {
        "native"
    }

    async fn estimate(
        &self,
        request: Arc<InferenceRequest>,
        mode: RunMode,
        cancel: CancelToken,
    ) -> Result<SkillEstimate, InferenceError> {
        let engine = self.clone();
        tokio::task::spawn_blocking(move || engine.estimate_blocking(&request, mode, &cancel))
            .await
            .map_err(|e| InferenceError::Backend {
                message: format!("native engine worker failed: {e}"),
            })?
    }
}
