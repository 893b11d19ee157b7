//! Row decoding and score selection for dump preparation

use super::dump::{DumpError, SqlValue};
use crate::types::{Modifier, ModifierSet, PlayerId, SubjectId};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

const USER_COLUMNS: usize = 4;
const SCORE_COLUMNS: usize = 20;

// column positions inside a `scores` row
const SCORE_USER_ID: usize = 1;
const SCORE_BEATMAP_ID: usize = 3;
const SCORE_RANKED: usize = 6;
const SCORE_TOTAL: usize = 11;
const SCORE_DATA: usize = 12;
const SCORE_PP: usize = 13;

#[derive(Debug, Clone, PartialEq)]
pub struct UserRow {
    pub user_id: PlayerId,
    pub username: String,
}

/// A ranked score eligible for selection
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateScore {
    pub user_id: PlayerId,
    pub beatmap_id: SubjectId,
    pub modifiers: ModifierSet,
    pub total_score: u64,
    pub pp: f64,
}

#[derive(Deserialize)]
struct ScoreData {
    mods: Vec<Modifier>,
}

/// Serialized form of a selected score: `[user, beatmap, mods, total_score]`
#[derive(Serialize)]
pub struct PreparedRow<'a>(PlayerId, SubjectId, &'a ModifierSet, u64);

impl<'a> From<&'a CandidateScore> for PreparedRow<'a> {
    fn from(score: &'a CandidateScore) -> Self {
        PreparedRow(
            score.user_id,
            score.beatmap_id,
            &score.modifiers,
            score.total_score,
        )
    }
}

fn check_columns(row: &[SqlValue], expected: usize) -> Result<(), DumpError> {
    if row.len() != expected {
        return Err(DumpError::ColumnCount {
            expected,
            found: row.len(),
        });
    }
    Ok(())
}

fn parse_column<T>(row: &[SqlValue], index: usize, column: &'static str) -> Result<T, DumpError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let text = row[index].as_str().ok_or_else(|| DumpError::InvalidValue {
        column,
        reason: "unexpected NULL".to_string(),
    })?;
    text.parse().map_err(|e: T::Err| DumpError::InvalidValue {
        column,
        reason: format!("{text:?}: {e}"),
    })
}

/// Decode a `sample_users` row `(user_id, username, user_warnings, user_type)`
pub fn parse_user_row(row: &[SqlValue]) -> Result<UserRow, DumpError> {
    check_columns(row, USER_COLUMNS)?;
    let user_id = parse_column(row, 0, "user_id")?;
    let username = row[1].as_str().unwrap_or_default().to_string();
    // users file rows are line based
    if username.chars().any(char::is_control) {
        return Err(DumpError::InvalidValue {
            column: "username",
            reason: format!("control character in {username:?}"),
        });
    }
    Ok(UserRow { user_id, username })
}

/// Decode a `scores` row; `None` when the score is unranked or has no pp
pub fn parse_score_row(row: &[SqlValue]) -> Result<Option<CandidateScore>, DumpError> {
    check_columns(row, SCORE_COLUMNS)?;

    let pp = match row[SCORE_PP].as_str().map(str::parse::<f64>) {
        Some(Ok(pp)) if pp.is_finite() => pp,
        _ => return Ok(None),
    };
    if row[SCORE_RANKED].as_str() != Some("1") {
        return Ok(None);
    }

    let data = row[SCORE_DATA].as_str().unwrap_or_default();
    let data: ScoreData = serde_json::from_str(data).map_err(|e| DumpError::InvalidValue {
        column: "data",
        reason: e.to_string(),
    })?;
    let mut mods = data.mods;
    mods.sort_by(|a, b| a.acronym.cmp(&b.acronym));

    Ok(Some(CandidateScore {
        user_id: parse_column(row, SCORE_USER_ID, "user_id")?,
        beatmap_id: parse_column(row, SCORE_BEATMAP_ID, "beatmap_id")?,
        modifiers: ModifierSet::new(mods),
        total_score: parse_column(row, SCORE_TOTAL, "total_score")?,
        pp,
    }))
}

/// Best scores per player, ordered by pp descending
#[derive(Debug, Default)]
pub struct ScoreSelection {
    per_user: BTreeMap<PlayerId, Vec<CandidateScore>>,
}

impl ScoreSelection {
    /// Keep each player's strictly highest-pp score per beatmap
    ///
    /// On equal pp the earlier candidate is kept.
    pub fn from_candidates(candidates: impl IntoIterator<Item = CandidateScore>) -> Self {
        let mut best: FxHashMap<(PlayerId, SubjectId), CandidateScore> = FxHashMap::default();
        for candidate in candidates {
            let key = (candidate.user_id, candidate.beatmap_id);
            match best.get_mut(&key) {
                Some(current) if candidate.pp > current.pp => *current = candidate,
                Some(_) => {}
                None => {
                    best.insert(key, candidate);
                }
            }
        }

        let mut per_user: BTreeMap<PlayerId, Vec<CandidateScore>> = BTreeMap::new();
        for score in best.into_values() {
            per_user.entry(score.user_id).or_default().push(score);
        }
        for scores in per_user.values_mut() {
            scores.sort_by(|a, b| {
                b.pp
                    .total_cmp(&a.pp)
                    .then_with(|| a.beatmap_id.cmp(&b.beatmap_id))
            });
        }
        Self { per_user }
    }

    /// Drop scores whose (beatmap, modifiers) context has fewer than two
    /// scores, repeating until no more are dropped; returns how many went
    pub fn prune(&mut self) -> usize {
        let mut removed = 0;
        loop {
            let mut counts: FxHashMap<(SubjectId, ModifierSet), usize> = FxHashMap::default();
            for score in self.scores() {
                *counts
                    .entry((score.beatmap_id, score.modifiers.clone()))
                    .or_default() += 1;
            }

            let mut dropped = 0;
            for scores in self.per_user.values_mut() {
                let before = scores.len();
                scores.retain(|score| {
                    counts
                        .get(&(score.beatmap_id, score.modifiers.clone()))
                        .is_some_and(|&count| count > 1)
                });
                dropped += before - scores.len();
            }

            if dropped == 0 {
                return removed;
            }
            removed += dropped;
        }
    }

    /// Keep at most `limit` best scores per player
    pub fn truncate(&mut self, limit: usize) {
        for scores in self.per_user.values_mut() {
            scores.truncate(limit);
        }
    }

    /// Prune, truncate to `limit`, then prune again
    pub fn apply_limits(&mut self, limit: usize) {
        self.prune();
        self.truncate(limit);
        self.prune();
        self.per_user.retain(|_, scores| !scores.is_empty());
    }

    /// Selected scores, players ascending and pp descending within a player
    pub fn scores(&self) -> impl Iterator<Item = &CandidateScore> {
        self.per_user.values().flatten()
    }

    pub fn len(&self) -> usize {
        self.per_user.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn player_count(&self) -> usize {
        self.per_user.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(user_id: PlayerId, beatmap_id: SubjectId, mods: &[&str], pp: f64) -> CandidateScore {
        CandidateScore {
            user_id,
            beatmap_id,
            modifiers: ModifierSet::new(mods.iter().map(|m| Modifier::new(*m)).collect()),
            total_score: (pp * 1000.0) as u64,
            pp,
        }
    }

    fn score_row(ranked: &str, data: &str, pp: SqlValue) -> Vec<SqlValue> {
        let mut row: Vec<SqlValue> = (0..SCORE_COLUMNS)
            .map(|i| SqlValue::Literal(i.to_string()))
            .collect();
        row[SCORE_USER_ID] = SqlValue::Literal("42".into());
        row[SCORE_BEATMAP_ID] = SqlValue::Literal("7".into());
        row[SCORE_RANKED] = SqlValue::Literal(ranked.into());
        row[SCORE_TOTAL] = SqlValue::Literal("123456".into());
        row[SCORE_DATA] = SqlValue::Text(data.into());
        row[SCORE_PP] = pp;
        row
    }

    #[test]
    fn test_parse_user_row() {
        let row = vec![
            SqlValue::Literal("2".into()),
            SqlValue::Text("peppy".into()),
            SqlValue::Literal("0".into()),
            SqlValue::Literal("1".into()),
        ];
        assert_eq!(
            parse_user_row(&row).unwrap(),
            UserRow {
                user_id: 2,
                username: "peppy".into()
            }
        );
        assert!(matches!(
            parse_user_row(&row[..3]),
            Err(DumpError::ColumnCount { expected: 4, found: 3 })
        ));
    }

    #[test]
    fn test_username_with_line_break_is_rejected() {
        let row = vec![
            SqlValue::Literal("3".into()),
            SqlValue::Text("two\nlines".into()),
            SqlValue::Literal("0".into()),
            SqlValue::Literal("0".into()),
        ];
        assert!(matches!(
            parse_user_row(&row),
            Err(DumpError::InvalidValue { column: "username", .. })
        ));
    }

    #[test]
    fn test_parse_score_row_sorts_mods() {
        let data = r#"{"mods":[{"acronym":"HD"},{"acronym":"DT","settings":{"speed_change":1.3}}],"statistics":{}}"#;
        let score = parse_score_row(&score_row("1", data, SqlValue::Literal("250.5".into())))
            .unwrap()
            .unwrap();

        assert_eq!(score.user_id, 42);
        assert_eq!(score.beatmap_id, 7);
        assert_eq!(score.total_score, 123456);
        assert_eq!(score.pp, 250.5);
        let acronyms: Vec<&str> = score.modifiers.0.iter().map(|m| m.acronym.as_str()).collect();
        assert_eq!(acronyms, vec!["DT", "HD"]);
        assert_eq!(score.modifiers.0[0].settings(), Some(r#"{"speed_change":1.3}"#));
    }

    #[test]
    fn test_unranked_or_missing_pp_is_skipped() {
        let data = r#"{"mods":[]}"#;
        assert_eq!(
            parse_score_row(&score_row("0", data, SqlValue::Literal("10".into()))).unwrap(),
            None
        );
        assert_eq!(parse_score_row(&score_row("1", data, SqlValue::Null)).unwrap(), None);
    }

    #[test]
    fn test_bad_data_column() {
        let result = parse_score_row(&score_row("1", "not json", SqlValue::Literal("1".into())));
        assert!(matches!(
            result,
            Err(DumpError::InvalidValue { column: "data", .. })
        ));
    }

    #[test]
    fn test_best_score_per_beatmap() {
        let selection = ScoreSelection::from_candidates(vec![
            candidate(1, 10, &[], 100.0),
            candidate(1, 10, &["HD"], 150.0),
            candidate(1, 10, &[], 150.0),
            candidate(1, 11, &[], 90.0),
        ]);

        let kept: Vec<(SubjectId, f64, usize)> = selection
            .scores()
            .map(|s| (s.beatmap_id, s.pp, s.modifiers.0.len()))
            .collect();
        assert_eq!(kept, vec![(10, 150.0, 1), (11, 90.0, 0)]);
    }

    #[test]
    fn test_prune_drops_singleton_contexts() {
        // beatmap 21 is played once plain and once with HR, so neither
        // context has a pair
        let mut selection = ScoreSelection::from_candidates(vec![
            candidate(1, 20, &[], 300.0),
            candidate(2, 20, &[], 250.0),
            candidate(1, 21, &[], 200.0),
            candidate(3, 21, &["HR"], 180.0),
            candidate(3, 22, &[], 170.0),
        ]);
        let removed = selection.prune();

        assert_eq!(removed, 3);
        let kept: Vec<(PlayerId, SubjectId)> =
            selection.scores().map(|s| (s.user_id, s.beatmap_id)).collect();
        assert_eq!(kept, vec![(1, 20), (2, 20)]);
    }

    #[test]
    fn test_limits_truncate_then_prune() {
        let mut selection = ScoreSelection::from_candidates(vec![
            candidate(1, 30, &[], 500.0),
            candidate(1, 31, &[], 400.0),
            candidate(2, 31, &[], 450.0),
            candidate(2, 30, &[], 100.0),
            candidate(3, 30, &[], 50.0),
        ]);
        selection.apply_limits(1);

        // after truncation player 2 is alone on beatmap 31
        let kept: Vec<(PlayerId, SubjectId)> =
            selection.scores().map(|s| (s.user_id, s.beatmap_id)).collect();
        assert_eq!(kept, vec![(1, 30), (3, 30)]);
        assert_eq!(selection.player_count(), 2);
    }

    #[test]
    fn test_prepared_row_uses_integer_score() {
        let score = candidate(5, 6, &["HD"], 1.5);
        let json = serde_json::to_string(&PreparedRow::from(&score)).unwrap();
        assert_eq!(json, r#"[5,6,[{"acronym":"HD","settings":null}],1500]"#);
    }
}
