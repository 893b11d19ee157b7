//! Error types for the ranking pipeline
//!
//! Every failure the pipeline can surface is a variant here; binaries wrap
//! them in `anyhow` at the outermost layer.

use crate::inference::InferenceError;
use crate::types::{Gamemode, PlayerId};
use std::path::PathBuf;

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, RankerError>;

/// Typed failures of a ranking run
#[derive(Debug, thiserror::Error)]
pub enum RankerError {
    #[error("I/O failure on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed input in {}{}: {reason}", .path.display(), .line.map(|l| format!(" line {l}")).unwrap_or_default())]
    MalformedInput {
        path: PathBuf,
        line: Option<usize>,
        reason: String,
    },

    #[error("Invalid dataset: {reason}")]
    InvalidDataset { reason: String },

    #[error("Inference failed for {gamemode}: {source}")]
    Inference {
        gamemode: Gamemode,
        #[source]
        source: InferenceError,
    },

    #[error("Inference for {gamemode} exceeded the {seconds}s timeout")]
    InferenceTimeout { gamemode: Gamemode, seconds: u64 },

    #[error("Unusable draw artifact {}: {reason}", .path.display())]
    DrawArtifact { path: PathBuf, reason: String },

    #[error("Degenerate skill estimate: {reason}")]
    DegenerateEstimate { reason: String },

    #[error("No username known for player {raw_id}")]
    MissingUsername { raw_id: PlayerId },

    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

impl RankerError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RankerError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn malformed(path: impl Into<PathBuf>, line: Option<usize>, reason: impl Into<String>) -> Self {
        RankerError::MalformedInput {
            path: path.into(),
            line,
            reason: reason.into(),
        }
    }
}
