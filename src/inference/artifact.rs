//! Persisted raw skill draws
//!
//! Draws are saved per gamemode so post-processing can be rerun without
//! repeating inference. An artifact is only trusted again when it was made
//! from an identical dataset.

use crate::error::{RankerError, Result};
use crate::inference::engine::{InferenceRequest, RunMode, SkillEstimate, SCHEMA_VERSION};
use crate::types::Gamemode;
use crate::utils::{current_timestamp, generate_run_id, write_atomic};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// `M`, `S` and `P` of the dataset a set of draws was produced from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetShape {
    pub contexts: usize,
    pub records: usize,
    pub players: usize,
}

impl From<&InferenceRequest> for DatasetShape {
    fn from(request: &InferenceRequest) -> Self {
        Self {
            contexts: request.contexts,
            records: request.records,
            players: request.players,
        }
    }
}

/// Raw draws of one gamemode together with their provenance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrawArtifact {
    pub run_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub schema_version: u32,
    pub gamemode: Gamemode,
    pub engine: String,
    pub shape: DatasetShape,
    pub fingerprint: String,
    pub estimate: SkillEstimate,
}

impl DrawArtifact {
    pub fn new(
        gamemode: Gamemode,
        engine: &str,
        request: &InferenceRequest,
        estimate: SkillEstimate,
    ) -> Self {
        Self {
            run_id: generate_run_id(),
            created_at: current_timestamp(),
            schema_version: SCHEMA_VERSION,
            gamemode,
            engine: engine.to_string(),
            shape: DatasetShape::from(request),
            fingerprint: request.fingerprint(),
            estimate,
        }
    }

    /// Location of the artifact of `gamemode` inside `dir`
    pub fn path_for(dir: &Path, gamemode: Gamemode) -> PathBuf {
        dir.join(format!("{gamemode}.draws.json"))
    }

    /// Why this artifact cannot stand in for fresh inference, if it cannot
    pub fn mismatch(&self, gamemode: Gamemode, request: &InferenceRequest, mode: RunMode) -> Option<String> {
        if self.schema_version != SCHEMA_VERSION {
            return Some(format!(
                "schema version {} (current {SCHEMA_VERSION})",
                self.schema_version
            ));
        }
        if self.gamemode != gamemode {
            return Some(format!("recorded for {}", self.gamemode));
        }
        if self.estimate.mode != mode {
            return Some(format!("produced in {} mode", self.estimate.mode));
        }
        let shape = DatasetShape::from(request);
        if self.shape != shape {
            return Some(format!(
                "dataset shape M={} S={} P={} differs from M={} S={} P={}",
                self.shape.contexts,
                self.shape.records,
                self.shape.players,
                shape.contexts,
                shape.records,
                shape.players
            ));
        }
        if self.fingerprint != request.fingerprint() {
            return Some("dataset content changed".to_string());
        }
        if let Err(reason) = self.estimate.validate_shape(request.players) {
            return Some(reason);
        }
        None
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        write_atomic(path, |writer| {
            serde_json::to_writer(&mut *writer, self).map_err(std::io::Error::from)?;
            writer.flush()
        })
    }

    /// Load an artifact; `Ok(None)` if there is none at `path`
    pub fn load(path: &Path) -> Result<Option<Self>> {
        let file = match std::fs::File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(RankerError::io(path, e)),
        };
        serde_json::from_reader(BufReader::new(file))
            .map(Some)
            .map_err(|e| RankerError::DrawArtifact {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })
    }
}
