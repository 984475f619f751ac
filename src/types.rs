use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub type MemberId = u64;
pub type GroupId = u64;
pub type WagerId = u64;
pub type EntryId = u64;
pub type TransactionId = u64;
pub type DisputeId = u64;
pub type VoteId = u64;

// ---------------------------------------------------------------------------
// Wager type configuration
// ---------------------------------------------------------------------------

/// How distance-based wagers pick winners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    /// Only answers at distance 0 win; no exact hit refunds everyone.
    Exact,
    /// Answers at the minimum distance win, ties share.
    Closest,
}

/// Per-type parameters of a wager. The variant is the wager's type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WagerKind {
    Binary {
        labels: [String; 2],
    },
    MultipleChoice {
        options: Vec<String>,
    },
    Numeric {
        min: Option<i64>,
        max: Option<i64>,
        mode: MatchMode,
    },
    Date {
        earliest: Option<NaiveDate>,
        latest: Option<NaiveDate>,
        mode: MatchMode,
    },
    ShortAnswer {
        max_length: usize,
    },
    TopNRanking {
        options: Vec<String>,
        n: usize,
    },
}

impl WagerKind {
    /// Binary wager with the usual yes/no labels.
    pub fn yes_no() -> Self {
        WagerKind::Binary {
            labels: ["yes".to_string(), "no".to_string()],
        }
    }

    pub fn wager_type(&self) -> WagerType {
        match self {
            WagerKind::Binary { .. } => WagerType::Binary,
            WagerKind::MultipleChoice { .. } => WagerType::MultipleChoice,
            WagerKind::Numeric { .. } => WagerType::Numeric,
            WagerKind::Date { .. } => WagerType::Date,
            WagerKind::ShortAnswer { .. } => WagerType::ShortAnswer,
            WagerKind::TopNRanking { .. } => WagerType::TopNRanking,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WagerType {
    Binary,
    MultipleChoice,
    Numeric,
    Date,
    ShortAnswer,
    TopNRanking,
}

impl std::fmt::Display for WagerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WagerType::Binary => "binary",
            WagerType::MultipleChoice => "multiple_choice",
            WagerType::Numeric => "numeric",
            WagerType::Date => "date",
            WagerType::ShortAnswer => "short_answer",
            WagerType::TopNRanking => "top_n_ranking",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Wager & entries
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WagerStatus {
    Open,
    Locked,
    Settled,
    Disputed,
    Cancelled,
}

impl WagerStatus {
    pub fn is_settleable(self) -> bool {
        matches!(self, WagerStatus::Open | WagerStatus::Locked)
    }
}

impl std::fmt::Display for WagerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WagerStatus::Open => "open",
            WagerStatus::Locked => "locked",
            WagerStatus::Settled => "settled",
            WagerStatus::Disputed => "disputed",
            WagerStatus::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wager {
    pub id: WagerId,
    pub group: GroupId,
    pub creator: MemberId,
    pub kind: WagerKind,
    /// Fixed stake every entry must place.
    pub stake_amount: i64,
    pub status: WagerStatus,
    /// Canonical outcome; JSON-encoded for ranking wagers.
    pub outcome_value: Option<String>,
    pub settlement_note: Option<String>,
    pub total_points_wagered: i64,
    pub participants_count: u32,
    pub settler: Option<MemberId>,
    pub settled_at: Option<DateTime<Utc>>,
    pub deadline: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    /// Open dispute against this wager, if any.
    pub dispute: Option<DisputeId>,
}

impl Wager {
    pub fn wager_type(&self) -> WagerType {
        self.kind.wager_type()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryResult {
    Won,
    Lost,
    Refunded,
}

impl std::fmt::Display for EntryResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EntryResult::Won => "won",
            EntryResult::Lost => "lost",
            EntryResult::Refunded => "refunded",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WagerEntry {
    pub id: EntryId,
    pub wager: WagerId,
    pub member: MemberId,
    /// Normalized answer; JSON-encoded for ranking wagers.
    pub answer_value: String,
    pub points_wagered: i64,
    pub result: Option<EntryResult>,
    pub is_winner: bool,
    pub points_won: i64,
    pub points_lost: i64,
    pub numeric_distance: Option<i64>,
    pub date_distance_days: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl WagerEntry {
    /// Drop everything a settlement wrote onto the entry.
    pub fn clear_result(&mut self) {
        self.result = None;
        self.is_winner = false;
        self.points_won = 0;
        self.points_lost = 0;
        self.numeric_distance = None;
        self.date_distance_days = None;
    }
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    WagerPlacement,
    WagerWin,
    WagerLoss,
    WagerRefund,
    /// Claw-back of an earlier settlement credit when a wager is re-settled.
    WagerReversal,
    Decay,
    DisputeFalseReportPenalty,
    DisputeHonestMistakePenalty,
    DisputeFraudPenalty,
    DisputePrematurePenalty,
    AdminAdjustment,
}

impl std::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TransactionType::WagerPlacement => "wager_placement",
            TransactionType::WagerWin => "wager_win",
            TransactionType::WagerLoss => "wager_loss",
            TransactionType::WagerRefund => "wager_refund",
            TransactionType::WagerReversal => "wager_reversal",
            TransactionType::Decay => "decay",
            TransactionType::DisputeFalseReportPenalty => "dispute_false_report_penalty",
            TransactionType::DisputeHonestMistakePenalty => "dispute_honest_mistake_penalty",
            TransactionType::DisputeFraudPenalty => "dispute_fraud_penalty",
            TransactionType::DisputePrematurePenalty => "dispute_premature_penalty",
            TransactionType::AdminAdjustment => "admin_adjustment",
        };
        write!(f, "{s}")
    }
}

/// What a transaction was caused by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxRef {
    Entry { wager: WagerId, entry: EntryId },
    Wager(WagerId),
    Dispute(DisputeId),
}

impl std::fmt::Display for TxRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TxRef::Entry { wager, entry } => write!(f, "wager:{wager}/entry:{entry}"),
            TxRef::Wager(id) => write!(f, "wager:{id}"),
            TxRef::Dispute(id) => write!(f, "dispute:{id}"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub member: MemberId,
    pub group: GroupId,
    /// Signed: credits positive, debits negative.
    pub amount: i64,
    pub balance_before: i64,
    pub balance_after: i64,
    pub kind: TransactionType,
    pub reference: Option<TxRef>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Disputes
// ---------------------------------------------------------------------------

/// Anything a dispute can be raised against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisputableRef {
    Wager(WagerId),
}

impl std::fmt::Display for DisputableRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DisputableRef::Wager(id) => write!(f, "wager:{id}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisputeStatus {
    Pending,
    Resolved,
}

impl std::fmt::Display for DisputeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DisputeStatus::Pending => write!(f, "pending"),
            DisputeStatus::Resolved => write!(f, "resolved"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisputeResolution {
    OriginalCorrect,
    /// The settled outcome was wrong. Fraud when the settler did not self-report.
    DifferentOutcome,
    PrematureSettlement,
}

impl std::fmt::Display for DisputeResolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DisputeResolution::OriginalCorrect => "original_correct",
            DisputeResolution::DifferentOutcome => "different_outcome",
            DisputeResolution::PrematureSettlement => "premature_settlement",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteOutcome {
    OriginalCorrect,
    DifferentOutcome,
    NotYetDeterminable,
}

impl VoteOutcome {
    pub fn resolution(self) -> DisputeResolution {
        match self {
            VoteOutcome::OriginalCorrect => DisputeResolution::OriginalCorrect,
            VoteOutcome::DifferentOutcome => DisputeResolution::DifferentOutcome,
            VoteOutcome::NotYetDeterminable => DisputeResolution::PrematureSettlement,
        }
    }
}

impl std::fmt::Display for VoteOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            VoteOutcome::OriginalCorrect => "original_correct",
            VoteOutcome::DifferentOutcome => "different_outcome",
            VoteOutcome::NotYetDeterminable => "not_yet_determinable",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dispute {
    pub id: DisputeId,
    pub group: GroupId,
    pub item: DisputableRef,
    pub reporter: MemberId,
    /// The original settler. `None` for automated settlements.
    pub accused: Option<MemberId>,
    pub is_self_report: bool,
    pub status: DisputeStatus,
    pub resolution: Option<DisputeResolution>,
    pub original_outcome: Option<String>,
    pub corrected_outcome: Option<String>,
    pub votes_required: u32,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Dispute {
    pub fn is_pending(&self) -> bool {
        self.status == DisputeStatus::Pending
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisputeVote {
    pub id: VoteId,
    pub dispute: DisputeId,
    pub voter: MemberId,
    pub vote_outcome: VoteOutcome,
    /// Required when `vote_outcome` is `DifferentOutcome`.
    pub selected_outcome: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Confirmed-fraud history of one messaging-platform identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FraudRecord {
    pub identity: String,
    pub member: MemberId,
    pub fraud_offense_count: u32,
    pub last_fraud_at: Option<DateTime<Utc>>,
}
