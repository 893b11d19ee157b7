//! Dataset assembly for the latent-skill inference engine
//!
//! Raw score events are mapped to dense indices, sorted into canonical
//! per-context order with exact ties flagged, and flattened into an
//! [`AssembledDataset`].

pub mod aggregate;
pub mod assembly;
pub mod identity;
pub mod ties;

pub use aggregate::counts_per_context;
pub use assembly::{check_shape, AssembledDataset};
pub use identity::{DenseIndex, IdentityMapper, RunContext};
pub use ties::{sort_and_flag_ties, ScoreRecord, SortedScoreRecord};
