//! Shared health state for the /health endpoint.
//! Updated by AuditWriter, read by the API.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

#[derive(Default)]
pub struct HealthState {
    /// Events persisted since startup.
    pub events_written: AtomicU64,
    /// Events still queued for the audit writer, as of its last receive.
    pub write_queue_pending: AtomicU64,
    /// Unix millisecond timestamp of the last persisted event (0 = none).
    pub last_event_at_ms: AtomicI64,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_event_written(&self, at_ms: i64) {
        self.events_written.fetch_add(1, Ordering::Relaxed);
        self.last_event_at_ms.store(at_ms, Ordering::Relaxed);
    }

    pub fn set_write_queue_pending(&self, n: u64) {
        self.write_queue_pending.store(n, Ordering::Relaxed);
    }

    pub fn events_written(&self) -> u64 {
        self.events_written.load(Ordering::Relaxed)
    }

    pub fn write_queue_pending(&self) -> u64 {
        self.write_queue_pending.load(Ordering::Relaxed)
    }

    pub fn last_event_at_ms(&self) -> i64 {
        self.last_event_at_ms.load(Ordering::Relaxed)
    }
}
