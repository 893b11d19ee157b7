//! Score dump preparation
//!
//! Turns score-database dumps (`sample_users.sql` and `scores.sql`, either
//! extracted or inside the published `.tar.bz2` archives) into the
//! `{gamemode}.json` and `{gamemode}_users.csv` inputs of the ranking pipeline.

pub mod archive;
pub mod dump;
pub mod filter;

pub use archive::{find_archive, read_archive};
pub use dump::{parse_insert, DumpError, SqlValue};
pub use filter::{
    parse_score_row, parse_user_row, CandidateScore, PreparedRow, ScoreSelection, UserRow,
};

use crate::error::{RankerError, Result};
use crate::input::{score_events_path, PlayerDirectory};
use crate::types::{Gamemode, PlayerId};
use crate::utils::write_atomic;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::{info, info_span};

pub const DEFAULT_PER_PLAYER_LIMIT: usize = 100;

/// Where the per-gamemode dumps are read from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DumpSource {
    /// `{dir}/{gamemode}/sample_users.sql` and `{dir}/{gamemode}/scores.sql`
    Extracted(PathBuf),
    /// The latest `*{gamemode}_top_10000*.tar.bz2` archive in the directory
    Archives(PathBuf),
}

impl std::fmt::Display for DumpSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DumpSource::Extracted(dir) => write!(f, "dumps in {}", dir.display()),
            DumpSource::Archives(dir) => write!(f, "archives in {}", dir.display()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PrepareOptions {
    pub source: DumpSource,
    pub output_dir: PathBuf,
    pub per_player_limit: usize,
}

/// Summary of one prepared gamemode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedGamemode {
    pub gamemode: Gamemode,
    pub users: usize,
    pub players_with_scores: usize,
    pub scores: usize,
}

/// Prepare every gamemode in parallel
pub fn prepare_all(options: &PrepareOptions) -> Result<Vec<PreparedGamemode>> {
    Gamemode::ALL
        .par_iter()
        .map(|&gamemode| prepare_gamemode(options, gamemode))
        .collect()
}

pub fn prepare_gamemode(options: &PrepareOptions, gamemode: Gamemode) -> Result<PreparedGamemode> {
    let _span = info_span!("prepare", mode = %gamemode).entered();
    let (users, candidates) = load_dump(&options.source, gamemode)?;
    let candidate_count = candidates.len();

    let mut selection = ScoreSelection::from_candidates(candidates);
    selection.apply_limits(options.per_player_limit);
    info!(
        "Selected {} of {} ranked scores across {} players",
        selection.len(),
        candidate_count,
        selection.player_count()
    );

    write_score_file(&score_events_path(&options.output_dir, gamemode), &selection)?;
    write_users_file(
        &PlayerDirectory::path_for(&options.output_dir, gamemode),
        &users,
    )?;

    Ok(PreparedGamemode {
        gamemode,
        users: users.len(),
        players_with_scores: selection.player_count(),
        scores: selection.len(),
    })
}

/// Users and candidate scores of one gamemode
pub fn load_dump(
    source: &DumpSource,
    gamemode: Gamemode,
) -> Result<(BTreeMap<PlayerId, String>, Vec<CandidateScore>)> {
    match source {
        DumpSource::Extracted(dir) => {
            let mode_dir = dir.join(gamemode.as_str());
            let users = read_users(&mode_dir.join(archive::USERS_ENTRY))?;
            let candidates = read_candidates(&mode_dir.join(archive::SCORES_ENTRY))?;
            Ok((users, candidates))
        }
        DumpSource::Archives(dir) => {
            let path = find_archive(dir, gamemode)?;
            info!("Reading {}", path.display());
            read_archive(&path)
        }
    }
}

/// Visit the rows of every insert into `table`; `path` names the input in errors
fn for_each_row<R, F>(reader: R, path: &Path, table: &str, mut visit: F) -> Result<()>
where
    R: BufRead,
    F: FnMut(&[dump::SqlValue]) -> std::result::Result<(), DumpError>,
{
    for (number, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| RankerError::io(path, e))?;
        let Some(rows) = parse_insert(&line, table) else {
            continue;
        };
        rows.and_then(|rows| rows.iter().try_for_each(|row| visit(row)))
            .map_err(|e| RankerError::malformed(path, Some(number + 1), e.to_string()))?;
    }
    Ok(())
}

fn open_dump(path: &Path) -> Result<BufReader<File>> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|e| RankerError::io(path, e))
}

pub fn read_users(path: &Path) -> Result<BTreeMap<PlayerId, String>> {
    read_users_from(open_dump(path)?, path)
}

pub fn read_users_from<R: BufRead>(reader: R, source: &Path) -> Result<BTreeMap<PlayerId, String>> {
    let mut users = BTreeMap::new();
    for_each_row(reader, source, "sample_users", |row| {
        let user = parse_user_row(row)?;
        users.insert(user.user_id, user.username);
        Ok(())
    })?;
    Ok(users)
}

pub fn read_candidates(path: &Path) -> Result<Vec<CandidateScore>> {
    read_candidates_from(open_dump(path)?, path)
}

pub fn read_candidates_from<R: BufRead>(reader: R, source: &Path) -> Result<Vec<CandidateScore>> {
    let mut candidates = Vec::new();
    for_each_row(reader, source, "scores", |row| {
        if let Some(score) = parse_score_row(row)? {
            candidates.push(score);
        }
        Ok(())
    })?;
    Ok(candidates)
}

pub fn write_score_file(path: &Path, selection: &ScoreSelection) -> Result<()> {
    let rows: Vec<PreparedRow<'_>> = selection.scores().map(PreparedRow::from).collect();
    write_atomic(path, |writer| {
        serde_json::to_writer(&mut *writer, &rows)?;
        Ok(())
    })
}

/// Users file rows are `user_id,'username'`
pub fn write_users_file(path: &Path, users: &BTreeMap<PlayerId, String>) -> Result<()> {
    write_atomic(path, |writer| {
        for (user_id, username) in users {
            writeln!(writer, "{user_id},'{username}'")?;
        }
        Ok(())
    })
}
