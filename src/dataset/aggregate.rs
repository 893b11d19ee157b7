//! Per-context record counts used to delimit context segments

use crate::dataset::ties::SortedScoreRecord;

/// Number of records per context, indexed by `context - 1`
///
/// `context_count` is the number of registered contexts; contexts with no
/// records keep a count of zero.
pub fn counts_per_context(sorted: &[SortedScoreRecord], context_count: usize) -> Vec<usize> {
    let mut counts = vec![0; context_count];
    for entry in sorted {
        if let Some(count) = entry
            .record
            .context
            .checked_sub(1)
            .and_then(|i| counts.get_mut(i))
        {
            *count += 1;
        }
    }
    counts
}
