//! Assembly of the flattened comparison dataset for one gamemode

use crate::dataset::aggregate::counts_per_context;
use crate::dataset::identity::{DenseIndex, RunContext};
use crate::dataset::ties::{sort_and_flag_ties, ScoreRecord};
use crate::error::{RankerError, Result};
use crate::types::ScoreEvent;
use tracing::debug;

/// Flattened, sorted comparison data consumed by the inference engine
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledDataset {
    /// `M`
    pub context_count: usize,
    /// `S`
    pub record_count: usize,
    /// `P`
    pub player_count: usize,
    pub counts_per_context: Vec<usize>,
    /// Player of every record, in canonical sorted order
    pub score_to_player: Vec<DenseIndex>,
    /// Aligned with `score_to_player`
    pub tie_flags: Vec<bool>,
}

impl AssembledDataset {
    /// Register every event in `run` and build the sorted, tie-flagged dataset
    pub fn assemble<I>(run: &mut RunContext, events: I) -> Result<Self>
    where
        I: IntoIterator<Item = ScoreEvent>,
    {
        let mut records = Vec::new();
        for event in events {
            if !event.score.is_finite() {
                return Err(RankerError::InvalidDataset {
                    reason: format!(
                        "non-finite score {} for player {} on {}",
                        event.score,
                        event.player,
                        event.context_key()
                    ),
                });
            }
            let context = run.register_context(event.subject, &event.modifiers);
            let player = run.register_player(event.player);
            records.push(ScoreRecord::new(context, player, event.score));
        }

        let sorted = sort_and_flag_ties(records);
        let counts = counts_per_context(&sorted, run.contexts.len());

        let dataset = Self {
            context_count: run.contexts.len(),
            record_count: sorted.len(),
            player_count: run.players.len(),
            counts_per_context: counts,
            score_to_player: sorted.iter().map(|entry| entry.record.player).collect(),
            tie_flags: sorted.iter().map(|entry| entry.tie_with_next).collect(),
        };

        debug!(
            "Assembled {} dataset: M={}, S={}, P={}, ties={}",
            run.gamemode,
            dataset.context_count,
            dataset.record_count,
            dataset.player_count,
            dataset.tie_count()
        );

        dataset.validate()?;
        Ok(dataset)
    }

    pub fn tie_count(&self) -> usize {
        self.tie_flags.iter().filter(|&&tie| tie).count()
    }

    /// Check every structural invariant of the dataset
    pub fn validate(&self) -> Result<()> {
        let flags: Vec<u8> = self.tie_flags.iter().map(|&tie| tie as u8).collect();
        check_shape(
            self.context_count,
            self.record_count,
            self.player_count,
            &self.counts_per_context,
            &self.score_to_player,
            &flags,
        )
        .map_err(|reason| RankerError::InvalidDataset { reason })
    }
}

/// Shared shape check for the flattened representation
///
/// Returns a description of the first violated invariant.
pub fn check_shape(
    context_count: usize,
    record_count: usize,
    player_count: usize,
    counts_per_context: &[usize],
    score_to_player: &[DenseIndex],
    tie_flags: &[u8],
) -> std::result::Result<(), String> {
    if record_count == 0 || context_count == 0 || player_count == 0 {
        return Err(format!(
            "empty dataset (M={context_count}, S={record_count}, P={player_count})"
        ));
    }
    if counts_per_context.len() != context_count {
        return Err(format!(
            "counts_per_context has {} entries, expected M={context_count}",
            counts_per_context.len()
        ));
    }
    let total: usize = counts_per_context.iter().sum();
    if total != record_count {
        return Err(format!(
            "counts_per_context sums to {total}, expected S={record_count}"
        ));
    }
    if score_to_player.len() != record_count {
        return Err(format!(
            "score_to_player has {} entries, expected S={record_count}",
            score_to_player.len()
        ));
    }
    if tie_flags.len() != record_count {
        return Err(format!(
            "tie_flags has {} entries, expected S={record_count}",
            tie_flags.len()
        ));
    }
    if let Some(context) = counts_per_context.iter().position(|&count| count == 0) {
        return Err(format!("context {} has no records", context + 1));
    }

    let mut seen = vec![false; player_count];
    for (position, &player) in score_to_player.iter().enumerate() {
        match player.checked_sub(1).and_then(|i| seen.get_mut(i)) {
            Some(slot) => *slot = true,
            None => {
                return Err(format!(
                    "record {position} references player {player} outside 1..={player_count}"
                ))
            }
        }
    }
    if let Some(player) = seen.iter().position(|&present| !present) {
        return Err(format!("player {} has no records", player + 1));
    }

    if let Some(position) = tie_flags.iter().position(|&flag| flag > 1) {
        return Err(format!("tie flag at record {position} is not 0 or 1"));
    }
    let mut end = 0;
    for (context, &count) in counts_per_context.iter().enumerate() {
        end += count;
        if tie_flags[end - 1] != 0 {
            return Err(format!(
                "tie flag crosses the end of context {}",
                context + 1
            ));
        }
    }

    Ok(())
}
