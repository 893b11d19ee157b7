//! Canonical per-context ordering of score records and exact-tie flagging

use crate::dataset::identity::DenseIndex;

/// A score placed in a comparison context
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreRecord {
    pub context: DenseIndex,
    pub player: DenseIndex,
    pub score: f64,
}

impl ScoreRecord {
    pub fn new(context: DenseIndex, player: DenseIndex, score: f64) -> Self {
        Self {
            context,
            player,
            score,
        }
    }
}

/// A record in canonical order, flagged when the next record of the same
/// context carries the identical score
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SortedScoreRecord {
    pub record: ScoreRecord,
    pub tie_with_next: bool,
}

/// Sort by `(context, score)` ascending and flag exact ties
///
/// The sort is stable, so records with equal keys keep their input order.
/// The last record of every context is never flagged.
pub fn sort_and_flag_ties(mut records: Vec<ScoreRecord>) -> Vec<SortedScoreRecord> {
    records.sort_by(|a, b| {
        a.context
            .cmp(&b.context)
            .then_with(|| a.score.total_cmp(&b.score))
    });

    let mut sorted: Vec<SortedScoreRecord> = records
        .iter()
        .map(|&record| SortedScoreRecord {
            record,
            tie_with_next: false,
        })
        .collect();

    for (current, next) in sorted.iter_mut().zip(records.iter().skip(1)) {
        current.tie_with_next =
            current.record.context == next.context && current.record.score == next.score;
    }

    sorted
}
