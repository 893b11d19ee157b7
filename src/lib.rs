//! Score Ranker - per-gamemode skill rankings from competitive score data
//!
//! This crate assembles player scores into comparison contexts, estimates
//! latent skills with a Plackett-Luce model, and writes calibrated
//! leaderboards for every gamemode.

pub mod config;
pub mod dataset;
pub mod error;
pub mod inference;
pub mod input;
pub mod prepare;
pub mod ranking;
pub mod service;
pub mod types;
pub mod utils;

// Re-export commonly used types and traits
pub use error::{RankerError, Result};
pub use types::*;

// Re-export key components
pub use dataset::{AssembledDataset, RunContext};
pub use inference::{InferenceAdapter, InferenceEngine, InferenceRequest, RunMode, SkillEstimate};
pub use ranking::{Leaderboard, PlayerSkillResult};
pub use service::RankingPipeline;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
