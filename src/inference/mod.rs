//! Latent-skill inference
//!
//! This module defines the engine boundary, the built-in and CmdStan back
//! ends, persisted draw artifacts and the adapter the pipeline calls.

pub mod adapter;
pub mod artifact;
pub mod cmdstan;
pub mod engine;
pub mod native;

// Re-export commonly used types
pub use adapter::{AdapterConfig, InferenceAdapter};
pub use artifact::{DatasetShape, DrawArtifact};
pub use cmdstan::{CmdStanConfig, CmdStanEngine};
pub use engine::{
    CancelToken, InferenceEngine, InferenceError, InferenceRequest, RunMode, SkillEstimate,
    SCHEMA_VERSION,
};
pub use native::{NativeEngine, NativeEngineConfig};
