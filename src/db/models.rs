/// Row types for the audit schema in `migrations/0001_audit.sql`.
/// Timestamps are unix milliseconds.
use serde::Serialize;

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct TransactionRow {
    pub id: i64,
    pub member_id: i64,
    pub group_id: i64,
    pub amount: i64,
    pub balance_before: i64,
    pub balance_after: i64,
    pub kind: String,
    pub reference: Option<String>,
    pub created_at: i64,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct WagerRow {
    pub id: i64,
    pub group_id: i64,
    pub creator_id: i64,
    pub wager_type: String,
    /// `WagerKind` as JSON.
    pub type_config: String,
    pub stake_amount: i64,
    pub status: String,
    pub outcome_value: Option<String>,
    pub settlement_note: Option<String>,
    pub total_points_wagered: i64,
    pub participants_count: i64,
    pub settler_id: Option<i64>,
    pub settled_at: Option<i64>,
    pub updated_at: i64,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct DisputeRow {
    pub id: i64,
    pub group_id: i64,
    pub item: String,
    pub reporter_id: i64,
    pub accused_id: Option<i64>,
    pub is_self_report: bool,
    pub status: String,
    pub resolution: Option<String>,
    pub original_outcome: Option<String>,
    pub corrected_outcome: Option<String>,
    pub votes_required: i64,
    pub expires_at: i64,
    pub resolved_at: Option<i64>,
    pub created_at: i64,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct DisputeVoteRow {
    pub id: i64,
    pub dispute_id: i64,
    pub voter_id: i64,
    pub vote_outcome: String,
    pub selected_outcome: Option<String>,
    pub created_at: i64,
}
