//! Configuration management for the ranking run
//!
//! This module handles configuration loading from TOML files and environment
//! variables, validation, and default values.

pub mod app;
pub mod inference;

// Re-export commonly used types
pub use app::{validate_config, AppConfig, PipelineSettings, ServiceSettings};
pub use inference::{EngineKind, InferenceSettings};
