use axum::{http::StatusCode, response::IntoResponse};
use thiserror::Error;

use crate::types::{DisputeId, MemberId, WagerId, WagerStatus};

#[derive(Debug, Error)]
pub enum AppError {
    // --- Caller-facing precondition violations. Never retryable as-is. ---
    #[error("Wager {0} is not open for entries")]
    WagerNotOpen(WagerId),

    #[error("Member {member} already joined wager {wager}")]
    UserAlreadyJoined { wager: WagerId, member: MemberId },

    #[error("Invalid stake: expected {expected}, got {got}")]
    InvalidStake { expected: i64, got: i64 },

    #[error("Invalid answer: {0}")]
    InvalidAnswer(String),

    #[error("Invalid wager configuration: {0}")]
    InvalidWagerConfig(String),

    #[error("Wager {wager} is {status}; operation not allowed")]
    InvalidWagerState { wager: WagerId, status: WagerStatus },

    #[error("Amount must be positive, got {0}")]
    InvalidAmount(i64),

    #[error("Insufficient balance: have {balance}, need {required}")]
    InsufficientBalance { balance: i64, required: i64 },

    #[error("Not disputable: {0}")]
    NotDisputable(String),

    #[error("Not eligible to vote: {0}")]
    DisputeNotEligibleVoter(String),

    #[error("A different-outcome vote must select the outcome")]
    DisputeMissingSelection,

    #[error("Dispute {0} is already resolved")]
    DisputeNotPending(DisputeId),

    #[error("Not found: {0}")]
    NotFound(String),

    // --- Infrastructure. ---
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    /// True for precondition violations the caller must fix, as opposed to infrastructure faults.
    pub fn is_domain(&self) -> bool {
        !matches!(
            self,
            AppError::Json(_)
                | AppError::Database(_)
                | AppError::Migration(_)
                | AppError::Config(_)
                | AppError::Io(_)
        )
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::WagerNotOpen(_)
            | AppError::UserAlreadyJoined { .. }
            | AppError::InvalidWagerState { .. }
            | AppError::InsufficientBalance { .. }
            | AppError::NotDisputable(_)
            | AppError::DisputeNotPending(_) => StatusCode::CONFLICT,
            e if e.is_domain() => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}
