//! Vote counting rules. Pure functions over a dispute's votes.

use std::collections::HashMap;

use crate::config::penalties;
use crate::error::Result;
use crate::types::{DisputeVote, MemberId, VoteOutcome};

/// Majority of the eligible voters, rounded up, never below one.
/// The reporter and the accused settler are not eligible.
pub fn votes_required(members: &[MemberId], reporter: MemberId, accused: Option<MemberId>) -> u32 {
    let eligible = members
        .iter()
        .filter(|m| **m != reporter && Some(**m) != accused)
        .count() as u32;
    eligible.div_ceil(2).max(1)
}

/// Fraud penalty for an identity with `prior_offenses` confirmed frauds.
pub fn fraud_penalty_pct(prior_offenses: u32) -> u32 {
    if prior_offenses == 0 {
        penalties::FRAUD_FIRST_PCT
    } else {
        penalties::FRAUD_REPEAT_PCT
    }
}

/// Vote counts per outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub original_correct: u32,
    pub different_outcome: u32,
    pub not_yet_determinable: u32,
}

impl Tally {
    /// Expiry tie-break order, most conservative first.
    const PRIORITY: [VoteOutcome; 3] = [
        VoteOutcome::OriginalCorrect,
        VoteOutcome::NotYetDeterminable,
        VoteOutcome::DifferentOutcome,
    ];

    pub fn count(votes: &[DisputeVote]) -> Self {
        let mut tally = Self::default();
        for vote in votes {
            match vote.vote_outcome {
                VoteOutcome::OriginalCorrect => tally.original_correct += 1,
                VoteOutcome::DifferentOutcome => tally.different_outcome += 1,
                VoteOutcome::NotYetDeterminable => tally.not_yet_determinable += 1,
            }
        }
        tally
    }

    pub fn get(&self, outcome: VoteOutcome) -> u32 {
        match outcome {
            VoteOutcome::OriginalCorrect => self.original_correct,
            VoteOutcome::DifferentOutcome => self.different_outcome,
            VoteOutcome::NotYetDeterminable => self.not_yet_determinable,
        }
    }

    pub fn total(&self) -> u32 {
        self.original_correct + self.different_outcome + self.not_yet_determinable
    }

    /// The outcome whose count has reached `required`, if any.
    pub fn reached(&self, required: u32) -> Option<VoteOutcome> {
        Self::PRIORITY
            .into_iter()
            .find(|o| self.get(*o) >= required.max(1))
    }

    /// Outcome with the most votes; ties go to the more conservative outcome.
    /// `None` when nobody voted.
    pub fn plurality(&self) -> Option<VoteOutcome> {
        if self.total() == 0 {
            return None;
        }
        let mut best = Self::PRIORITY[0];
        for outcome in Self::PRIORITY.into_iter().skip(1) {
            if self.get(outcome) > self.get(best) {
                best = outcome;
            }
        }
        Some(best)
    }
}

/// Most-selected outcome among different-outcome votes, ties going to the
/// selection that was cast first. Selections sharing a `key` count as one
/// choice, reported in the spelling of its first vote.
pub fn corrected_selection<F>(votes: &[DisputeVote], key: F) -> Result<Option<String>>
where
    F: Fn(&str) -> Result<String>,
{
    // key → (count, first vote index, first spelling)
    let mut counts: HashMap<String, (u32, usize, &str)> = HashMap::new();
    for (i, vote) in votes.iter().enumerate() {
        if vote.vote_outcome != VoteOutcome::DifferentOutcome {
            continue;
        }
        if let Some(selected) = vote.selected_outcome.as_deref() {
            counts.entry(key(selected)?).or_insert((0, i, selected)).0 += 1;
        }
    }
    Ok(counts
        .into_values()
        .max_by(|(ca, fa, _), (cb, fb, _)| ca.cmp(cb).then(fb.cmp(fa)))
        .map(|(_, _, selected)| selected.to_string()))
}
