//! Raw skill draws to calibrated skill scores and rank metrics
//!
//! Sign convention: the skill score is `-ln(mean raw skill)`, standardized.
//! A larger raw skill therefore gives a *lower* skill score, while the rank
//! metric is oriented the other way: larger raw skill, higher rank metric.

use crate::dataset::IdentityMapper;
use crate::error::{RankerError, Result};
use crate::inference::SkillEstimate;
use crate::types::PlayerId;
use serde::{Deserialize, Serialize};

/// Spread measure the centred log-skills are divided by
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpreadDivisor {
    /// Population variance
    #[default]
    Variance,
    /// Population standard deviation
    StandardDeviation,
}

/// Calibration of the skill score: `offset + (x - mean(x)) / spread(x)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SkillCalibration {
    pub offset: f64,
    pub divisor: SpreadDivisor,
}

impl Default for SkillCalibration {
    fn default() -> Self {
        Self {
            offset: 2.0,
            divisor: SpreadDivisor::Variance,
        }
    }
}

/// Derived skill metrics of one player
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerSkill {
    pub raw_id: PlayerId,
    pub skill_score: f64,
    /// In `[0, 1]`, higher is better
    pub rank_metric: f64,
}

/// Standardized `-ln` of each player's mean raw skill
///
/// A lone player scores the calibration offset. Two or more players with
/// the same transformed value leave nothing to standardize against and are
/// a degenerate estimate.
pub fn skill_scores(mean_raw: &[f64], calibration: &SkillCalibration) -> Result<Vec<f64>> {
    if let Some(player) = mean_raw.iter().position(|&s| !(s > 0.0) || !s.is_finite()) {
        return Err(RankerError::DegenerateEstimate {
            reason: format!(
                "player {} has mean raw skill {}; the log transform needs a positive value",
                player + 1,
                mean_raw[player]
            ),
        });
    }

    let transformed: Vec<f64> = mean_raw.iter().map(|s| -s.ln()).collect();
    let n = transformed.len() as f64;
    let mean = transformed.iter().sum::<f64>() / n;
    let variance = transformed.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
    let spread = match calibration.divisor {
        SpreadDivisor::Variance => variance,
        SpreadDivisor::StandardDeviation => variance.sqrt(),
    };

    if transformed.len() <= 1 {
        return Ok(vec![calibration.offset; transformed.len()]);
    }
    if transformed.iter().all(|&x| x == transformed[0]) || !(spread > 0.0) {
        return Err(RankerError::DegenerateEstimate {
            reason: format!(
                "all {} players share the transformed skill {}, the spread is zero",
                transformed.len(),
                transformed[0]
            ),
        });
    }
    Ok(transformed
        .iter()
        .map(|x| calibration.offset + (x - mean) / spread)
        .collect())
}

/// Draw-averaged normalized rank of every player
///
/// In each draw players are ordered by descending raw skill (stable, so
/// equal values keep dense index order) and rank `r` maps to
/// `(P - 1 - r) / (P - 1)`. A lone player gets 1.
pub fn rank_metrics(draws: &[Vec<f64>]) -> Vec<f64> {
    let players = draws.first().map_or(0, Vec::len);
    if players == 0 {
        return Vec::new();
    }
    if players == 1 {
        return vec![1.0];
    }

    let top = (players - 1) as f64;
    let mut metrics = vec![0.0; players];
    let mut order: Vec<usize> = Vec::with_capacity(players);
    for draw in draws {
        order.clear();
        order.extend(0..players);
        order.sort_by(|&a, &b| draw[b].total_cmp(&draw[a]));
        for (rank, &player) in order.iter().enumerate() {
            metrics[player] += (top - rank as f64) / top;
        }
    }

    let draw_count = draws.len() as f64;
    metrics.iter_mut().for_each(|metric| *metric /= draw_count);
    metrics
}

/// Skill score and rank metric of every player, in dense index order
pub fn postprocess(
    estimate: &SkillEstimate,
    players: &IdentityMapper<PlayerId>,
    calibration: &SkillCalibration,
) -> Result<Vec<PlayerSkill>> {
    estimate
        .validate_shape(players.len())
        .map_err(|reason| RankerError::DegenerateEstimate { reason })?;
    if estimate.draws.iter().flatten().any(|s| !s.is_finite()) {
        return Err(RankerError::DegenerateEstimate {
            reason: "draws contain non-finite skills".to_string(),
        });
    }

    let scores = skill_scores(&estimate.mean_skills(), calibration)?;
    let ranks = rank_metrics(&estimate.draws);

    Ok(players
        .raw_ids()
        .iter()
        .zip(scores)
        .zip(ranks)
        .map(|((&raw_id, skill_score), rank_metric)| PlayerSkill {
            raw_id,
            skill_score,
            rank_metric,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::f64::consts::LN_2;

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-12, "{a} != {b}");
    }

    #[test]
    fn test_higher_raw_skill_ranks_higher() {
        let metrics = rank_metrics(&[vec![0.2, 0.8]]);
        assert_eq!(metrics, vec![0.0, 1.0]);
    }

    #[test]
    fn test_skill_score_divides_by_variance() {
        let scores = skill_scores(&[0.2, 0.8], &SkillCalibration::default()).unwrap();
        // centred log-skills are -/+ ln 2, variance ln^2 2
        assert_close(scores[0], 2.0 + 1.0 / LN_2);
        assert_close(scores[1], 2.0 - 1.0 / LN_2);
        assert!(scores[1] < scores[0]);
    }

    #[test]
    fn test_skill_score_standard_deviation_calibration() {
        let calibration = SkillCalibration {
            offset: 0.0,
            divisor: SpreadDivisor::StandardDeviation,
        };
        let scores = skill_scores(&[0.2, 0.8], &calibration).unwrap();
        assert_close(scores[0], 1.0);
        assert_close(scores[1], -1.0);
    }

    #[test]
    fn test_equal_skills_are_degenerate() {
        assert!(matches!(
            skill_scores(&[0.5, 0.5, 0.5], &SkillCalibration::default()),
            Err(RankerError::DegenerateEstimate { .. })
        ));
    }

    #[test]
    fn test_lone_player_scores_offset() {
        let scores = skill_scores(&[0.5], &SkillCalibration::default()).unwrap();
        assert_eq!(scores, vec![2.0]);
    }

    #[test]
    fn test_non_positive_skill_is_degenerate() {
        assert!(matches!(
            skill_scores(&[0.5, 0.0], &SkillCalibration::default()),
            Err(RankerError::DegenerateEstimate { .. })
        ));
    }

    #[test]
    fn test_rank_metrics_average_over_draws() {
        let metrics = rank_metrics(&[vec![1.0, 2.0, 3.0], vec![3.0, 2.0, 1.0]]);
        assert_eq!(metrics, vec![0.5, 0.5, 0.5]);

        let metrics = rank_metrics(&[vec![1.0, 2.0, 3.0], vec![2.0, 1.0, 3.0]]);
        assert_eq!(metrics, vec![0.25, 0.25, 1.0]);
    }

    #[test]
    fn test_equal_draw_values_keep_index_order() {
        assert_eq!(rank_metrics(&[vec![0.5, 0.5]]), vec![1.0, 0.0]);
    }

    #[test]
    fn test_single_player() {
        assert_eq!(rank_metrics(&[vec![0.3]]), vec![1.0]);
        assert!(rank_metrics(&[]).is_empty());
    }

    #[test]
    fn test_postprocess_keeps_dense_order() {
        let mut players = IdentityMapper::new();
        players.register(500u64);
        players.register(100u64);

        let estimate = SkillEstimate::point(vec![0.2, 0.8]);
        let skills = postprocess(&estimate, &players, &SkillCalibration::default()).unwrap();

        assert_eq!(skills[0].raw_id, 500);
        assert_eq!(skills[0].rank_metric, 0.0);
        assert_eq!(skills[1].raw_id, 100);
        assert_eq!(skills[1].rank_metric, 1.0);
    }

    #[test]
    fn test_postprocess_rejects_wrong_player_count() {
        let mut players = IdentityMapper::new();
        players.register(1u64);
        let estimate = SkillEstimate::point(vec![0.2, 0.8]);
        assert!(matches!(
            postprocess(&estimate, &players, &SkillCalibration::default()),
            Err(RankerError::DegenerateEstimate { .. })
        ));
    }

    proptest! {
        #[test]
        fn prop_distinct_point_estimate_ranks_are_evenly_spaced(
            values in proptest::collection::hash_set(1u32..1_000_000, 2..40)
        ) {
            let draw: Vec<f64> = values.iter().map(|&v| v as f64 / 1000.0).collect();
            let players = draw.len();
            let mut metrics = rank_metrics(&[draw.clone()]);
            metrics.sort_by(f64::total_cmp);

            for (k, metric) in metrics.iter().enumerate() {
                prop_assert!((metric - k as f64 / (players - 1) as f64).abs() < 1e-12);
            }

            let best = (0..players).max_by(|&a, &b| draw[a].total_cmp(&draw[b])).unwrap();
            prop_assert_eq!(rank_metrics(&[draw])[best], 1.0);
        }
    }
}
