//! Final per-gamemode leaderboard
//!
//! One line per player, `raw_id,skill_score,rank_metric,username`, no
//! header, best rank metric first.

use crate::error::{RankerError, Result};
use crate::input::PlayerDirectory;
use crate::ranking::postprocess::PlayerSkill;
use crate::types::{Gamemode, PlayerId};
use crate::utils::write_atomic;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

/// One leaderboard row
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerSkillResult {
    pub raw_id: PlayerId,
    pub skill_score: f64,
    pub rank_metric: f64,
    pub username: String,
}

/// Sorted, username-resolved ranking of one gamemode
#[derive(Debug, Clone)]
pub struct Leaderboard {
    pub gamemode: Gamemode,
    pub rows: Vec<PlayerSkillResult>,
}

impl Leaderboard {
    /// Resolve usernames and order by rank metric, descending
    ///
    /// The sort is stable: players with equal rank metrics stay in the order
    /// they were given.
    pub fn build(
        gamemode: Gamemode,
        skills: Vec<PlayerSkill>,
        directory: &PlayerDirectory,
    ) -> Result<Self> {
        let mut rows = skills
            .into_iter()
            .map(|skill| {
                let username = directory
                    .username(skill.raw_id)
                    .ok_or(RankerError::MissingUsername {
                        raw_id: skill.raw_id,
                    })?;
                Ok(PlayerSkillResult {
                    raw_id: skill.raw_id,
                    skill_score: skill.skill_score,
                    rank_metric: skill.rank_metric,
                    username: username.to_string(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        rows.sort_by(|a, b| b.rank_metric.total_cmp(&a.rank_metric));
        Ok(Self { gamemode, rows })
    }

    pub fn path_for(dir: &Path, gamemode: Gamemode) -> PathBuf {
        dir.join(format!("{gamemode}_ranking.txt"))
    }

    pub fn write_to(&self, writer: &mut dyn Write) -> std::io::Result<()> {
        for row in &self.rows {
            writeln!(
                writer,
                "{},{},{},{}",
                row.raw_id, row.skill_score, row.rank_metric, row.username
            )?;
        }
        Ok(())
    }

    /// Write `{gamemode}_ranking.txt` into `dir`, all or nothing
    pub fn save(&self, dir: &Path) -> Result<PathBuf> {
        let path = Self::path_for(dir, self.gamemode);
        write_atomic(&path, |writer| self.write_to(writer))?;
        info!(
            "Wrote {} leaderboard rows to {}",
            self.rows.len(),
            path.display()
        );
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn skill(raw_id: PlayerId, skill_score: f64, rank_metric: f64) -> PlayerSkill {
        PlayerSkill {
            raw_id,
            skill_score,
            rank_metric,
        }
    }

    fn directory() -> PlayerDirectory {
        let mut directory = PlayerDirectory::default();
        directory.insert(1, "alice");
        directory.insert(2, "bob");
        directory.insert(3, "carol");
        directory
    }

    #[test]
    fn test_sorted_by_rank_metric_with_stable_ties() {
        let board = Leaderboard::build(
            Gamemode::Osu,
            vec![skill(1, 2.5, 0.5), skill(2, 1.0, 1.0), skill(3, 2.5, 0.5)],
            &directory(),
        )
        .unwrap();

        let order: Vec<PlayerId> = board.rows.iter().map(|row| row.raw_id).collect();
        assert_eq!(order, vec![2, 1, 3]);
        assert_eq!(board.rows[0].username, "bob");
    }

    #[test]
    fn test_missing_username_is_an_error() {
        let result = Leaderboard::build(Gamemode::Osu, vec![skill(99, 2.0, 1.0)], &directory());
        assert!(matches!(
            result,
            Err(RankerError::MissingUsername { raw_id: 99 })
        ));
    }

    #[test]
    fn test_line_format() {
        let board = Leaderboard::build(
            Gamemode::Taiko,
            vec![skill(1, 0.5, 0.0), skill(2, 3.5, 1.0)],
            &directory(),
        )
        .unwrap();

        let mut out = Vec::new();
        board.write_to(&mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "2,3.5,1,bob\n1,0.5,0,alice\n");
    }

    #[test]
    fn test_save_to_gamemode_file() {
        let dir = tempfile::tempdir().unwrap();
        let board = Leaderboard::build(Gamemode::Mania, vec![skill(3, 2.0, 1.0)], &directory())
            .unwrap();

        let path = board.save(dir.path()).unwrap();
        assert!(path.ends_with("mania_ranking.txt"));
        assert_eq!(std::fs::read_to_string(path).unwrap(), "3,2,1,carol\n");
    }
}
