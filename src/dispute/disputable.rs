//! What the dispute desk needs from a settleable item. The desk only ever talks
//! to this trait, so new disputable kinds plug in without touching it.

use crate::error::Result;
use crate::settlement::WagerBook;
use crate::types::{DisputableRef, DisputeId, GroupId, MemberId, WagerKind};

/// Snapshot of an item at the moment a dispute is opened against it.
#[derive(Debug, Clone)]
pub struct SettledItem {
    pub item: DisputableRef,
    pub group: GroupId,
    pub settler: Option<MemberId>,
    pub outcome: Option<String>,
}

pub trait Disputable: Send + Sync {
    /// `settled → disputed` and link `dispute`. Fails `NotDisputable` unless
    /// the item is settled with no open dispute.
    fn mark_disputed(&self, item: DisputableRef, dispute: DisputeId) -> Result<SettledItem>;

    /// Back to `settled` with the dispute link cleared; the outcome stands.
    fn mark_settled(&self, item: DisputableRef) -> Result<()>;

    fn outcome(&self, item: DisputableRef) -> Result<Option<String>>;

    /// Closed outcome set for voters to pick from; empty for free-form types.
    fn dispute_outcome_options(&self, item: DisputableRef) -> Result<Vec<String>>;

    /// Canonical form of a proposed outcome, or `InvalidAnswer`.
    fn normalize_outcome(&self, item: DisputableRef, raw: &str) -> Result<String>;

    /// Two outcomes share a key exactly when they would settle the item the same way.
    fn outcome_key(&self, item: DisputableRef, raw: &str) -> Result<String>;

    /// Replace the outcome, reversing and redoing the settlement. At most once per dispute.
    fn set_outcome(&self, item: DisputableRef, dispute: DisputeId, corrected: &str) -> Result<()>;

    /// Drop the outcome without moving points, leaving the item awaiting settlement.
    fn clear_outcome(&self, item: DisputableRef) -> Result<()>;
}

impl Disputable for WagerBook {
    fn mark_disputed(&self, item: DisputableRef, dispute: DisputeId) -> Result<SettledItem> {
        let DisputableRef::Wager(id) = item;
        let wager = WagerBook::mark_disputed(self, id, dispute)?;
        Ok(SettledItem {
            item,
            group: wager.group,
            settler: wager.settler,
            outcome: wager.outcome_value,
        })
    }

    fn mark_settled(&self, item: DisputableRef) -> Result<()> {
        let DisputableRef::Wager(id) = item;
        WagerBook::mark_settled(self, id).map(|_| ())
    }

    fn outcome(&self, item: DisputableRef) -> Result<Option<String>> {
        let DisputableRef::Wager(id) = item;
        Ok(self.wager(id)?.outcome_value)
    }

    fn dispute_outcome_options(&self, item: DisputableRef) -> Result<Vec<String>> {
        let DisputableRef::Wager(id) = item;
        let options = match self.wager(id)?.kind {
            WagerKind::Binary { labels } => labels.iter().map(|l| l.trim().to_lowercase()).collect(),
            WagerKind::MultipleChoice { options } => {
                options.iter().map(|o| o.trim().to_string()).collect()
            }
            _ => Vec::new(),
        };
        Ok(options)
    }

    fn normalize_outcome(&self, item: DisputableRef, raw: &str) -> Result<String> {
        let DisputableRef::Wager(id) = item;
        WagerBook::normalize_outcome(self, id, raw)
    }

    fn outcome_key(&self, item: DisputableRef, raw: &str) -> Result<String> {
        let DisputableRef::Wager(id) = item;
        WagerBook::outcome_key(self, id, raw)
    }

    fn set_outcome(&self, item: DisputableRef, dispute: DisputeId, corrected: &str) -> Result<()> {
        let DisputableRef::Wager(id) = item;
        self.reverse_and_resettle(id, dispute, corrected).map(|_| ())
    }

    fn clear_outcome(&self, item: DisputableRef) -> Result<()> {
        let DisputableRef::Wager(id) = item;
        WagerBook::clear_outcome(self, id).map(|_| ())
    }
}
