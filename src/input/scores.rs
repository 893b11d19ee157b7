//! Score events file: a JSON array of `[player, subject, modifiers, score]`

use crate::error::{RankerError, Result};
use crate::types::{Gamemode, ScoreEvent};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use tracing::debug;

pub fn score_events_path(dir: &Path, gamemode: Gamemode) -> PathBuf {
    dir.join(format!("{gamemode}.json"))
}

pub fn load_score_events(path: &Path) -> Result<Vec<ScoreEvent>> {
    let file = File::open(path).map_err(|e| RankerError::io(path, e))?;
    let events = read_score_events(BufReader::new(file), path)?;
    debug!("Loaded {} score events from {}", events.len(), path.display());
    Ok(events)
}

/// Parse score events; `origin` only labels errors
pub fn read_score_events(reader: impl Read, origin: &Path) -> Result<Vec<ScoreEvent>> {
    serde_json::from_reader(reader).map_err(|e| {
        if e.is_io() {
            RankerError::io(origin, e.into())
        } else {
            RankerError::malformed(origin, Some(e.line()), e.to_string())
        }
    })
}
