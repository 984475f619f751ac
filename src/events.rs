//! Post-transition events emitted by the core.
//!
//! Payloads carry the entity's state right after the transition. Delivery is
//! at-least-once from the consumer's point of view, so consumers (audit writer,
//! notification and badge subsystems) must be idempotent and re-derive decisions
//! from current state rather than from the payload alone.

use tokio::sync::mpsc;
use tracing::warn;

use crate::types::{Dispute, DisputeVote, Transaction, Wager};

#[derive(Debug, Clone)]
pub enum CoreEvent {
    Posted(Transaction),
    WagerSettled(Wager),
    WagerCancelled(Wager),
    /// A dispute reversed the settlement and the wager was settled again.
    /// Badge awards derived from the old result must be re-evaluated.
    WagerResettled(Wager),
    /// Status changed by a dispute (disputed, back to settled, or outcome cleared).
    WagerUpdated(Wager),
    DisputeCreated(Dispute),
    VoteCast(DisputeVote),
    DisputeResolved(Dispute),
}

impl CoreEvent {
    pub fn name(&self) -> &'static str {
        match self {
            CoreEvent::Posted(_) => "posted",
            CoreEvent::WagerSettled(_) => "wager_settled",
            CoreEvent::WagerCancelled(_) => "wager_cancelled",
            CoreEvent::WagerResettled(_) => "wager_resettled",
            CoreEvent::WagerUpdated(_) => "wager_updated",
            CoreEvent::DisputeCreated(_) => "dispute_created",
            CoreEvent::VoteCast(_) => "vote_cast",
            CoreEvent::DisputeResolved(_) => "dispute_resolved",
        }
    }
}

/// Non-blocking emission point. Core operations are synchronous, so events are
/// pushed with `try_send` and dropped with a warning if the consumer lags.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::Sender<CoreEvent>>,
}

impl EventSink {
    pub fn new(tx: mpsc::Sender<CoreEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// A sink that discards everything.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn emit(&self, event: CoreEvent) {
        let Some(tx) = &self.tx else {
            return;
        };
        let name = event.name();
        if let Err(e) = tx.try_send(event) {
            warn!(event = name, "Core event channel rejected event: {e}");
        }
    }
}
