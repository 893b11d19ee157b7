//! Skill post-processing and leaderboard emission

pub mod leaderboard;
pub mod postprocess;

pub use leaderboard::{Leaderboard, PlayerSkillResult};
pub use postprocess::{
    postprocess, rank_metrics, skill_scores, PlayerSkill, SkillCalibration, SpreadDivisor,
};
