use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::health::HealthState;
use crate::db::models::{DisputeRow, DisputeVoteRow, TransactionRow, WagerRow};
use crate::error::AppError;
use crate::latency::{CoreLatency, LatencyStats};

#[derive(Clone)]
pub struct ApiState {
    pub pool: sqlx::SqlitePool,
    pub health: Arc<HealthState>,
    pub latency: Arc<CoreLatency>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route(
            "/groups/:group_id/members/:member_id/transactions",
            get(get_member_transactions),
        )
        .route("/wagers/:id", get(get_wager))
        .route("/disputes", get(get_disputes))
        .route("/disputes/:id/votes", get(get_dispute_votes))
        .route("/health", get(get_health))
        .route("/stats/latency", get(get_stats_latency))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Query param structs
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct TransactionsQuery {
    pub limit: Option<i64>,
}

#[derive(Deserialize)]
pub struct DisputesQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub events_written: u64,
    pub write_queue_pending: u64,
    pub last_event_at_ms: Option<i64>,
}

#[derive(Serialize)]
pub struct PercentilesResponse {
    pub samples: u64,
    pub p50_us: Option<u64>,
    pub p95_us: Option<u64>,
    pub p99_us: Option<u64>,
}

impl From<&LatencyStats> for PercentilesResponse {
    fn from(stats: &LatencyStats) -> Self {
        let (p50_us, p95_us, p99_us) = stats.percentiles();
        Self {
            samples: stats.len(),
            p50_us,
            p95_us,
            p99_us,
        }
    }
}

#[derive(Serialize)]
pub struct LatencyResponse {
    pub settle: PercentilesResponse,
    pub resettle: PercentilesResponse,
    pub resolve: PercentilesResponse,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn get_member_transactions(
    State(state): State<ApiState>,
    Path((group_id, member_id)): Path<(i64, i64)>,
    Query(params): Query<TransactionsQuery>,
) -> Result<Json<Vec<TransactionRow>>, AppError> {
    let limit = params.limit.unwrap_or(100).clamp(1, 1000);

    let rows = sqlx::query_as::<_, TransactionRow>(
        r#"
        SELECT id, member_id, group_id, amount, balance_before, balance_after,
               kind, reference, created_at
        FROM transactions
        WHERE group_id = ? AND member_id = ?
        ORDER BY id DESC
        LIMIT ?
        "#,
    )
    .bind(group_id)
    .bind(member_id)
    .bind(limit)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(rows))
}

async fn get_wager(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
) -> Result<Json<WagerRow>, AppError> {
    let row = sqlx::query_as::<_, WagerRow>(
        r#"
        SELECT id, group_id, creator_id, wager_type, type_config, stake_amount, status,
               outcome_value, settlement_note, total_points_wagered, participants_count,
               settler_id, settled_at, updated_at
        FROM wagers
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("wager {id}")))?;

    Ok(Json(row))
}

async fn get_disputes(
    State(state): State<ApiState>,
    Query(params): Query<DisputesQuery>,
) -> Result<Json<Vec<DisputeRow>>, AppError> {
    let limit = params.limit.unwrap_or(100).clamp(1, 1000);

    let rows = sqlx::query_as::<_, DisputeRow>(
        r#"
        SELECT id, group_id, item, reporter_id, accused_id, is_self_report, status,
               resolution, original_outcome, corrected_outcome, votes_required,
               expires_at, resolved_at, created_at
        FROM disputes
        WHERE (?1 IS NULL OR status = ?1)
        ORDER BY created_at DESC
        LIMIT ?2
        "#,
    )
    .bind(params.status.as_deref())
    .bind(limit)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(rows))
}

async fn get_dispute_votes(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<DisputeVoteRow>>, AppError> {
    let rows = sqlx::query_as::<_, DisputeVoteRow>(
        r#"
        SELECT id, dispute_id, voter_id, vote_outcome, selected_outcome, created_at
        FROM dispute_votes
        WHERE dispute_id = ?
        ORDER BY id
        "#,
    )
    .bind(id)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(rows))
}

async fn get_health(State(state): State<ApiState>) -> Json<HealthResponse> {
    let last = state.health.last_event_at_ms();
    Json(HealthResponse {
        status: "ok",
        events_written: state.health.events_written(),
        write_queue_pending: state.health.write_queue_pending(),
        last_event_at_ms: (last > 0).then_some(last),
    })
}

async fn get_stats_latency(State(state): State<ApiState>) -> Json<LatencyResponse> {
    Json(LatencyResponse {
        settle: (&state.latency.settle).into(),
        resettle: (&state.latency.resettle).into(),
        resolve: (&state.latency.resolve).into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::writer::tests::seeded_pool;

    async fn state() -> ApiState {
        let health = Arc::new(HealthState::new());
        ApiState {
            pool: seeded_pool(Arc::clone(&health)).await,
            health,
            latency: Arc::new(CoreLatency::default()),
        }
    }

    #[tokio::test]
    async fn member_transactions_newest_first() {
        let state = state().await;
        let Json(rows) = get_member_transactions(
            State(state),
            Path((1, 1)),
            Query(TransactionsQuery { limit: Some(10) }),
        )
        .await
        .unwrap();

        let kinds: Vec<&str> = rows.iter().map(|r| r.kind.as_str()).collect();
        assert_eq!(kinds, vec!["wager_win", "wager_placement", "admin_adjustment"]);
        assert_eq!(rows[0].balance_after, 1050);
        assert_eq!(rows[0].reference.as_deref(), Some("wager:1/entry:1"));
    }

    #[tokio::test]
    async fn unknown_wager_is_not_found() {
        let state = state().await;
        assert!(get_wager(State(state.clone()), Path(1)).await.is_ok());
        let err = get_wager(State(state), Path(42)).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn disputes_filter_by_status() {
        let state = state().await;
        let Json(rows) = get_disputes(
            State(state),
            Query(DisputesQuery { status: Some("pending".to_string()), limit: None }),
        )
        .await
        .unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn health_reports_writer_progress() {
        let state = state().await;
        let Json(health) = get_health(State(state)).await;
        assert_eq!(health.events_written, 9);
        assert!(health.last_event_at_ms.is_some());
    }

    #[tokio::test]
    async fn latency_stats_start_empty() {
        let state = state().await;
        state.latency.settle.record_us(250);
        let Json(stats) = get_stats_latency(State(state)).await;
        assert_eq!(stats.settle.samples, 1);
        assert_eq!(stats.resolve.samples, 0);
        assert_eq!(stats.resolve.p50_us, None);
    }
}
