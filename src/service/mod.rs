//! Service layer for the ranking run
//!
//! This module wires configuration, the inference engine and the pipeline
//! stages together for the binaries.

pub mod pipeline;

pub use pipeline::{build_engine, GamemodeReport, RankingPipeline};
