//! Published dump archives
//!
//! Each gamemode is published as a dated `{date}_performance_{mode}_top_10000.tar.bz2`
//! holding the dump files under a single directory. The needed entries are
//! streamed out of the compressed tar without extracting it.

use super::{read_candidates_from, read_users_from, CandidateScore};
use crate::error::{RankerError, Result};
use crate::types::{Gamemode, PlayerId};
use bzip2::read::BzDecoder;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const USERS_ENTRY: &str = "sample_users.sql";
pub const SCORES_ENTRY: &str = "scores.sql";

pub fn is_archive_for(file_name: &str, gamemode: Gamemode) -> bool {
    file_name.contains(&format!("{gamemode}_top_10000")) && file_name.ends_with(".tar.bz2")
}

/// Latest archive of `gamemode` in `dir`
///
/// Archive names start with their date, so the greatest name is the newest.
pub fn find_archive(dir: &Path, gamemode: Gamemode) -> Result<PathBuf> {
    let entries = std::fs::read_dir(dir).map_err(|e| RankerError::io(dir, e))?;
    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| RankerError::io(dir, e))?;
        if let Some(name) = entry.file_name().to_str() {
            if is_archive_for(name, gamemode) {
                names.push(name.to_string());
            }
        }
    }
    names.sort();
    names
        .pop()
        .map(|name| dir.join(name))
        .ok_or_else(|| RankerError::Configuration {
            message: format!(
                "no {gamemode}_top_10000 .tar.bz2 archive in {}",
                dir.display()
            ),
        })
}

/// Users and candidate scores read from one archive
pub fn read_archive(path: &Path) -> Result<(BTreeMap<PlayerId, String>, Vec<CandidateScore>)> {
    let file = File::open(path).map_err(|e| RankerError::io(path, e))?;
    let mut archive = tar::Archive::new(BzDecoder::new(BufReader::new(file)));

    let mut users = None;
    let mut candidates = None;
    for entry in archive.entries().map_err(|e| RankerError::io(path, e))? {
        let entry = entry.map_err(|e| RankerError::io(path, e))?;
        let entry_path = entry
            .path()
            .map_err(|e| RankerError::io(path, e))?
            .into_owned();
        let source = path.join(&entry_path);

        if entry_path.ends_with(USERS_ENTRY) {
            debug!("Reading users from {}", source.display());
            users = Some(read_users_from(BufReader::new(entry), &source)?);
        } else if entry_path.ends_with(SCORES_ENTRY) {
            debug!("Reading scores from {}", source.display());
            candidates = Some(read_candidates_from(BufReader::new(entry), &source)?);
        }
    }

    match (users, candidates) {
        (Some(users), Some(candidates)) => Ok((users, candidates)),
        (None, _) => Err(RankerError::malformed(path, None, format!("archive has no {USERS_ENTRY}"))),
        (_, None) => Err(RankerError::malformed(path, None, format!("archive has no {SCORES_ENTRY}"))),
    }
}
