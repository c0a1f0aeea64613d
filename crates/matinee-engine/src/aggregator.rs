//! Pure vote aggregation.
//!
//! Given a round's recorded votes, computes per-option totals,
//! percentages, summary statistics, and the winning option. The winner
//! tie-break is deterministic by design: on equal totals the option
//! listed first in the candidate list wins.

use matinee_core::{MediaId, UserId};
use matinee_protocol::{OptionResult, RoundResults, VoteStats};

use crate::model::Vote;

/// Round a value half-up to two decimal places.
///
/// Half-up sends ties toward positive infinity for either sign, so a
/// mean of `-0.125` rounds to `-0.12`, not `-0.13`.
fn round2(x: f64) -> f64 {
    (x * 100.0 + 0.5).floor() / 100.0
}

/// Weighted total for one option: `Σ value × weight`.
fn option_total(media_id: &MediaId, votes: &[Vote]) -> i64 {
    votes
        .iter()
        .filter(|v| &v.media_id == media_id)
        .map(|v| i64::from(v.value) * i64::from(v.weight))
        .sum()
}

/// Aggregate a round's votes into per-option results and a winner.
///
/// The percentage denominator is the sum of all weighted magnitudes when
/// any vote carries a weight other than 1, otherwise the raw vote count.
/// An empty vote set yields all-zero totals and zero percentages —
/// never an error. Returns `None` only when the candidate list itself
/// is empty, which the engine rejects at round creation.
#[must_use]
pub fn aggregate(options: &[MediaId], votes: &[Vote]) -> Option<RoundResults> {
    if options.is_empty() {
        return None;
    }

    let weighted = votes.iter().any(|v| v.weight != 1);
    let denominator: i64 = if weighted {
        votes
            .iter()
            .map(|v| i64::from(v.value) * i64::from(v.weight))
            .sum()
    } else {
        votes.len() as i64
    };

    #[allow(clippy::cast_precision_loss)]
    let all_results: Vec<OptionResult> = options
        .iter()
        .map(|media_id| {
            let total = option_total(media_id, votes);
            let percentage = if denominator == 0 {
                0.0
            } else {
                round2(total as f64 / denominator as f64 * 100.0)
            };
            OptionResult {
                media_id: media_id.clone(),
                total,
                percentage,
            }
        })
        .collect();

    // Strict comparison keeps the first-listed option on ties.
    let mut winner = all_results[0].clone();
    for result in &all_results[1..] {
        if result.total > winner.total {
            winner = result.clone();
        }
    }

    Some(RoundResults {
        winner,
        all_results,
        total_votes: votes.len(),
        stats: statistics(votes),
    })
}

/// Compute summary statistics over a round's votes.
#[must_use]
pub fn statistics(votes: &[Vote]) -> VoteStats {
    let mut unique: Vec<&UserId> = Vec::with_capacity(votes.len());
    for vote in votes {
        if !unique.contains(&&vote.user_id) {
            unique.push(&vote.user_id);
        }
    }

    let sum: i64 = votes.iter().map(|v| i64::from(v.value)).sum();
    #[allow(clippy::cast_precision_loss)]
    let average = if votes.is_empty() {
        0.0
    } else {
        round2(sum as f64 / votes.len() as f64)
    };

    VoteStats {
        total_votes: votes.len(),
        positive_votes: votes.iter().filter(|v| v.value > 0).count(),
        negative_votes: votes.iter().filter(|v| v.value < 0).count(),
        unique_voters: unique.len(),
        average_vote: average,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
