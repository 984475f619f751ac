//! Shared fixture: ledger, directory, wager book and dispute desk wired together.

use std::sync::Arc;

use crate::directory::InMemoryDirectory;
use crate::dispute::{DeskSettings, DisputeDesk};
use crate::events::EventSink;
use crate::latency::CoreLatency;
use crate::ledger::Ledger;
use crate::settlement::WagerBook;
use crate::types::{GroupId, MemberId, TransactionType};

pub const GROUP: GroupId = 1;
pub const SEED_BALANCE: i64 = 1000;

pub struct Harness {
    pub ledger: Arc<Ledger>,
    pub wagers: Arc<WagerBook>,
    pub desk: Arc<DisputeDesk>,
    pub directory: Arc<InMemoryDirectory>,
    pub latency: Arc<CoreLatency>,
    members: u64,
}

impl Harness {
    /// Members `1..=members` join `GROUP` with `SEED_BALANCE` points each.
    pub fn new(members: u64) -> Self {
        let events = EventSink::disabled();
        let latency = Arc::new(CoreLatency::default());
        let ledger = Ledger::new(events.clone());
        let wagers = WagerBook::new(Arc::clone(&ledger), events.clone(), Arc::clone(&latency));
        let directory = InMemoryDirectory::new();

        for member in 1..=members as MemberId {
            directory.add_member(GROUP, member);
            ledger
                .credit(member, GROUP, SEED_BALANCE, TransactionType::AdminAdjustment, None)
                .unwrap();
        }

        let desk = DisputeDesk::new(
            wagers.clone(),
            Arc::clone(&ledger),
            directory.clone(),
            directory.clone(),
            events,
            Arc::clone(&latency),
            DeskSettings::default(),
        );

        Self { ledger, wagers, desk, directory, latency, members }
    }

    /// Total points seeded into `GROUP`.
    pub fn seeded_total(&self) -> i64 {
        SEED_BALANCE * self.members as i64
    }
}
