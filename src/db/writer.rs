use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::api::health::HealthState;
use crate::error::Result;
use crate::events::CoreEvent;
use crate::types::{Dispute, DisputeVote, Transaction, Wager};

/// Receives CoreEvents from the ledger, wager book and dispute desk and
/// persists them to SQLite. Runs as a dedicated background task and never
/// blocks a core operation.
///
/// Every write is an insert-or-ignore or an upsert keyed by entity id, so a
/// replayed event leaves the tables unchanged.
pub struct AuditWriter {
    pool: sqlx::SqlitePool,
    rx: mpsc::Receiver<CoreEvent>,
    health: Arc<HealthState>,
}

impl AuditWriter {
    pub fn new(
        pool: sqlx::SqlitePool,
        rx: mpsc::Receiver<CoreEvent>,
        health: Arc<HealthState>,
    ) -> Self {
        Self { pool, rx, health }
    }

    /// Drain events until every sender is dropped.
    pub async fn run(mut self) {
        while let Some(event) = self.rx.recv().await {
            self.health.set_write_queue_pending(self.rx.len() as u64);
            let name = event.name();
            match self.write(&event).await {
                Ok(()) => {
                    self.health.record_event_written(Utc::now().timestamp_millis());
                    debug!(event = name, "Audit row written");
                }
                Err(e) => error!(event = name, "DB write error: {e}"),
            }
        }
    }

    async fn write(&self, event: &CoreEvent) -> Result<()> {
        match event {
            CoreEvent::Posted(tx) => self.write_transaction(tx).await,
            CoreEvent::WagerSettled(w)
            | CoreEvent::WagerCancelled(w)
            | CoreEvent::WagerResettled(w)
            | CoreEvent::WagerUpdated(w) => self.write_wager(w).await,
            CoreEvent::DisputeCreated(d) | CoreEvent::DisputeResolved(d) => {
                self.write_dispute(d).await
            }
            CoreEvent::VoteCast(v) => self.write_vote(v).await,
        }
    }

    async fn write_transaction(&self, t: &Transaction) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO transactions (
                id, member_id, group_id, amount, balance_before, balance_after,
                kind, reference, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(t.id as i64)
        .bind(t.member as i64)
        .bind(t.group as i64)
        .bind(t.amount)
        .bind(t.balance_before)
        .bind(t.balance_after)
        .bind(t.kind.to_string())
        .bind(t.reference.map(|r| r.to_string()))
        .bind(t.created_at.timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn write_wager(&self, w: &Wager) -> Result<()> {
        let type_config = serde_json::to_string(&w.kind)?;

        sqlx::query(
            r#"
            INSERT INTO wagers (
                id, group_id, creator_id, wager_type, type_config, stake_amount,
                status, outcome_value, settlement_note, total_points_wagered,
                participants_count, settler_id, settled_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                status = excluded.status,
                outcome_value = excluded.outcome_value,
                settlement_note = excluded.settlement_note,
                total_points_wagered = excluded.total_points_wagered,
                participants_count = excluded.participants_count,
                settler_id = excluded.settler_id,
                settled_at = excluded.settled_at,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(w.id as i64)
        .bind(w.group as i64)
        .bind(w.creator as i64)
        .bind(w.wager_type().to_string())
        .bind(type_config)
        .bind(w.stake_amount)
        .bind(w.status.to_string())
        .bind(w.outcome_value.as_deref())
        .bind(w.settlement_note.as_deref())
        .bind(w.total_points_wagered)
        .bind(i64::from(w.participants_count))
        .bind(w.settler.map(|s| s as i64))
        .bind(w.settled_at.map(|t| t.timestamp_millis()))
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn write_dispute(&self, d: &Dispute) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO disputes (
                id, group_id, item, reporter_id, accused_id, is_self_report,
                status, resolution, original_outcome, corrected_outcome,
                votes_required, expires_at, resolved_at, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                status = excluded.status,
                resolution = excluded.resolution,
                corrected_outcome = excluded.corrected_outcome,
                resolved_at = excluded.resolved_at
            "#,
        )
        .bind(d.id as i64)
        .bind(d.group as i64)
        .bind(d.item.to_string())
        .bind(d.reporter as i64)
        .bind(d.accused.map(|a| a as i64))
        .bind(d.is_self_report)
        .bind(d.status.to_string())
        .bind(d.resolution.map(|r| r.to_string()))
        .bind(d.original_outcome.as_deref())
        .bind(d.corrected_outcome.as_deref())
        .bind(i64::from(d.votes_required))
        .bind(d.expires_at.timestamp_millis())
        .bind(d.resolved_at.map(|t| t.timestamp_millis()))
        .bind(d.created_at.timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn write_vote(&self, v: &DisputeVote) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO dispute_votes (
                id, dispute_id, voter_id, vote_outcome, selected_outcome, created_at
            ) VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(v.id as i64)
        .bind(v.dispute as i64)
        .bind(v.voter as i64)
        .bind(v.vote_outcome.to_string())
        .bind(v.selected_outcome.as_deref())
        .bind(v.created_at.timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
