//! Inference engine interface
//!
//! The latent-skill model is a black box behind [`InferenceEngine`]. The
//! request schema is versioned so alternative back ends can be swapped in
//! without touching the pipeline.

use crate::dataset::{check_shape, AssembledDataset};
use async_trait::async_trait;
use rustc_hash::FxHasher;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Version of the request/response schema
pub const SCHEMA_VERSION: u32 = 1;

/// How skills are estimated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Single optimized skill vector
    PointEstimate,
    /// Sequence of posterior draws
    Sampling,
}

impl RunMode {
    pub fn from_fast_flag(fast: bool) -> Self {
        if fast {
            RunMode::PointEstimate
        } else {
            RunMode::Sampling
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::PointEstimate => write!(f, "point-estimate"),
            RunMode::Sampling => write!(f, "sampling"),
        }
    }
}

/// Failures reported by an inference back end
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InferenceError {
    #[error("invalid dataset: {reason}")]
    InvalidDataset { reason: String },

    #[error("optimization did not converge within {iterations} iterations")]
    NotConverged { iterations: usize },

    #[error("degenerate data: {reason}")]
    Degenerate { reason: String },

    #[error("{message}")]
    Backend { message: String },

    #[error("inference was cancelled")]
    Cancelled,
}

/// Dataset in the wire schema `{M, S, P, counts_per_context, score_to_player, tie_flags}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InferenceRequest {
    #[serde(rename = "M")]
    pub contexts: usize,
    #[serde(rename = "S")]
    pub records: usize,
    #[serde(rename = "P")]
    pub players: usize,
    pub counts_per_context: Vec<usize>,
    pub score_to_player: Vec<usize>,
    pub tie_flags: Vec<u8>,
}

impl From<&AssembledDataset> for InferenceRequest {
    fn from(dataset: &AssembledDataset) -> Self {
        Self {
            contexts: dataset.context_count,
            records: dataset.record_count,
            players: dataset.player_count,
            counts_per_context: dataset.counts_per_context.clone(),
            score_to_player: dataset.score_to_player.clone(),
            tie_flags: dataset.tie_flags.iter().map(|&tie| tie as u8).collect(),
        }
    }
}

impl InferenceRequest {
    pub fn validate(&self) -> Result<(), InferenceError> {
        check_shape(
            self.contexts,
            self.records,
            self.players,
            &self.counts_per_context,
            &self.score_to_player,
            &self.tie_flags,
        )
        .map_err(|reason| InferenceError::InvalidDataset { reason })
    }

    /// Stable fingerprint of the request content
    pub fn fingerprint(&self) -> String {
        let mut hasher = FxHasher::default();
        SCHEMA_VERSION.hash(&mut hasher);
        self.hash(&mut hasher);
        format!("{:016x}", hasher.finish())
    }

    /// Record index ranges `[start, end)` of every context segment
    pub fn segments(&self) -> impl Iterator<Item = std::ops::Range<usize>> + '_ {
        self.counts_per_context.iter().scan(0, |start, &count| {
            let range = *start..*start + count;
            *start += count;
            Some(range)
        })
    }
}

impl Hash for InferenceRequest {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.contexts.hash(state);
        self.records.hash(state);
        self.players.hash(state);
        self.counts_per_context.hash(state);
        self.score_to_player.hash(state);
        self.tie_flags.hash(state);
    }
}

/// Raw skill draws produced by an engine
///
/// Point-estimate mode yields exactly one draw. Every draw holds one raw
/// skill per player, in dense index order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillEstimate {
    pub mode: RunMode,
    pub draws: Vec<Vec<f64>>,
}

impl SkillEstimate {
    pub fn point(skills: Vec<f64>) -> Self {
        Self {
            mode: RunMode::PointEstimate,
            draws: vec![skills],
        }
    }

    pub fn sampled(draws: Vec<Vec<f64>>) -> Self {
        Self {
            mode: RunMode::Sampling,
            draws,
        }
    }

    pub fn draw_count(&self) -> usize {
        self.draws.len()
    }

    /// Players per draw, taken from the first draw
    pub fn player_count(&self) -> usize {
        self.draws.first().map_or(0, Vec::len)
    }

    /// Per-player mean of the raw skill over all draws
    pub fn mean_skills(&self) -> Vec<f64> {
        let mut means = vec![0.0; self.player_count()];
        for draw in &self.draws {
            for (mean, value) in means.iter_mut().zip(draw) {
                *mean += value;
            }
        }
        let n = self.draws.len().max(1) as f64;
        means.iter_mut().for_each(|mean| *mean /= n);
        means
    }

    /// Check the estimate against the expected player count
    pub fn validate_shape(&self, players: usize) -> Result<(), String> {
        if self.draws.is_empty() {
            return Err("no draws".to_string());
        }
        if self.mode == RunMode::PointEstimate && self.draws.len() != 1 {
            return Err(format!(
                "point estimate carries {} draws",
                self.draws.len()
            ));
        }
        if let Some((i, draw)) = self
            .draws
            .iter()
            .enumerate()
            .find(|(_, draw)| draw.len() != players)
        {
            return Err(format!(
                "draw {i} has {} skills, expected P={players}",
                draw.len()
            ));
        }
        Ok(())
    }
}

/// Cooperative cancellation flag shared with an engine
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Latent-skill inference back end
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait InferenceEngine: Send + Sync {
    /// Short name recorded in draw artifacts
    fn name(&self) -> &'static str;

    /// Estimate raw player skills for `request`
    ///
    /// Engines should check `cancel` regularly and stop with
    /// [`InferenceError::Cancelled`] once it is set.
    async fn estimate(
        &self,
        request: Arc<InferenceRequest>,
        mode: RunMode,
        cancel: CancelToken,
    ) -> Result<SkillEstimate, InferenceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> InferenceRequest {
        InferenceRequest {
            contexts: 2,
            records: 4,
            players: 3,
            counts_per_context: vec![3, 1],
            score_to_player: vec![2, 3, 1, 2],
            tie_flags: vec![1, 0, 0, 0],
        }
    }

    #[test]
    fn test_request_wire_schema() {
        let json = serde_json::to_value(request()).unwrap();
        assert_eq!(json["M"], 2);
        assert_eq!(json["S"], 4);
        assert_eq!(json["P"], 3);
        assert_eq!(json["counts_per_context"], serde_json::json!([3, 1]));
        assert_eq!(json["tie_flags"], serde_json::json!([1, 0, 0, 0]));
    }

    #[test]
    fn test_segments() {
        let request = request();
        let segments: Vec<_> = request.segments().collect();
        assert_eq!(segments, vec![0..3, 3..4]);
    }

    #[test]
    fn test_fingerprint_tracks_content() {
        let a = request();
        let mut b = request();
        assert_eq!(a.fingerprint(), b.fingerprint());

        b.tie_flags = vec![0, 0, 0, 0];
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_validate_rejects_bad_shape() {
        let mut bad = request();
        bad.score_to_player.pop();
        assert!(matches!(
            bad.validate(),
            Err(InferenceError::InvalidDataset { .. })
        ));
        assert!(request().validate().is_ok());
    }

    #[test]
    fn test_estimate_means_and_shape() {
        let estimate = SkillEstimate::sampled(vec![vec![1.0, 4.0], vec![3.0, 2.0]]);
        assert_eq!(estimate.mean_skills(), vec![2.0, 3.0]);
        assert!(estimate.validate_shape(2).is_ok());
        assert!(estimate.validate_shape(3).is_err());

        let point = SkillEstimate::point(vec![0.5]);
        assert_eq!(point.draw_count(), 1);
        assert_eq!(point.mean_skills(), vec![0.5]);

        let broken = SkillEstimate {
            mode: RunMode::PointEstimate,
            draws: vec![vec![1.0], vec![2.0]],
        };
        assert!(broken.validate_shape(1).is_err());
    }

    #[test]
    fn test_cancel_token_is_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }
}
