use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{error, info};

use crate::dispute::DisputeDesk;

/// Background task that closes disputes whose voting window has passed.
/// Wakes every `interval` and calls `handle_expired` for each due dispute.
pub struct DisputeSweeper {
    desk: Arc<DisputeDesk>,
    interval: Duration,
}

impl DisputeSweeper {
    pub fn new(desk: Arc<DisputeDesk>, interval: Duration) -> Self {
        Self { desk, interval }
    }

    pub async fn run(self) {
        let mut interval = tokio::time::interval(self.interval);
        interval.tick().await; // consume immediate first tick

        loop {
            interval.tick().await;
            let closed = self.sweep(Utc::now());
            if closed > 0 {
                info!(closed, "Expired disputes closed");
            }
        }
    }

    /// Resolve every dispute due at `now`. Returns how many were closed.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let mut closed = 0;
        for id in self.desk.expired_pending(now) {
            match self.desk.handle_expired(id, now) {
                Ok(Some(_)) => closed += 1,
                Ok(None) => {}
                Err(e) => error!(dispute_id = id, "Sweeper error: {e}"),
            }
        }
        closed
    }
}
