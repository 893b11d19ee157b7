//! Player directory: `raw_id,'username'` rows
//!
//! The username field is wrapped in one marker character on each side,
//! which is stripped positionally.

use crate::error::{RankerError, Result};
use crate::types::{Gamemode, PlayerId};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Raw id to username lookup for one gamemode
#[derive(Debug, Clone, Default)]
pub struct PlayerDirectory {
    names: HashMap<PlayerId, String>,
}

impl PlayerDirectory {
    pub fn path_for(dir: &Path, gamemode: Gamemode) -> PathBuf {
        dir.join(format!("{gamemode}_users.csv"))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| RankerError::io(path, e))?;
        let directory = Self::from_reader(BufReader::new(file), path)?;
        debug!("Loaded {} usernames from {}", directory.len(), path.display());
        Ok(directory)
    }

    /// Parse directory rows; `origin` only labels errors
    pub fn from_reader(reader: impl BufRead, origin: &Path) -> Result<Self> {
        let mut names = HashMap::new();
        for (number, line) in reader.lines().enumerate() {
            let line = line.map_err(|e| RankerError::io(origin, e))?;
            if line.is_empty() {
                continue;
            }
            let (raw_id, username) = parse_player_line(&line)
                .map_err(|reason| RankerError::malformed(origin, Some(number + 1), reason))?;
            names.insert(raw_id, username);
        }
        Ok(Self { names })
    }

    pub fn insert(&mut self, raw_id: PlayerId, username: impl Into<String>) {
        self.names.insert(raw_id, username.into());
    }

    pub fn username(&self, raw_id: PlayerId) -> Option<&str> {
        self.names.get(&raw_id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Split one row into the raw id and the unquoted username
pub fn parse_player_line(line: &str) -> std::result::Result<(PlayerId, String), String> {
    let (raw_id, quoted) = line
        .split_once(',')
        .ok_or_else(|| "missing ',' delimiter".to_string())?;
    let raw_id = raw_id
        .trim()
        .parse::<PlayerId>()
        .map_err(|e| format!("invalid player id {raw_id:?}: {e}"))?;

    let mut chars = quoted.chars();
    if chars.next().is_none() || chars.next_back().is_none() {
        return Err(format!("username field {quoted:?} lacks its quote markers"));
    }
    Ok((raw_id, chars.as_str().to_string()))
}
