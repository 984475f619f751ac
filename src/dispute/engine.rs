use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::config::{self, penalties};
use crate::directory::{Membership, PlatformIdentities};
use crate::dispute::disputable::Disputable;
use crate::dispute::quorum::{self, Tally};
use crate::error::{AppError, Result};
use crate::events::{CoreEvent, EventSink};
use crate::latency::CoreLatency;
use crate::ledger::Ledger;
use crate::types::{
    DisputableRef, Dispute, DisputeId, DisputeResolution, DisputeStatus, DisputeVote, FraudRecord,
    GroupId, MemberId, TransactionType, TxRef, VoteOutcome,
};

/// Per-instance dispute tuning.
#[derive(Debug, Clone, Copy)]
pub struct DeskSettings {
    /// How long a dispute stays open for voting.
    pub expiry: Duration,
}

impl Default for DeskSettings {
    fn default() -> Self {
        Self {
            expiry: Duration::hours(config::DISPUTE_EXPIRY_HOURS),
        }
    }
}

struct DisputeSlot {
    dispute: Dispute,
    votes: Vec<DisputeVote>,
}

/// Whether an `original_correct` dismissal charges the reporter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dismissal {
    Penalize,
    Waive,
}

// ---------------------------------------------------------------------------
// DisputeDesk
// ---------------------------------------------------------------------------

/// Owns dispute lifecycle: opening, voting, resolution and the penalties
/// that follow. Talks to disputed items only through [`Disputable`].
///
/// Lock order is dispute → item → ledger. Each dispute has its own mutex,
/// so a vote tally and the resolution it triggers run as one unit.
pub struct DisputeDesk {
    disputes: DashMap<DisputeId, Arc<Mutex<DisputeSlot>>>,
    items: Arc<dyn Disputable>,
    ledger: Arc<Ledger>,
    membership: Arc<dyn Membership>,
    identities: Arc<dyn PlatformIdentities>,
    /// Platform identity → confirmed fraud history.
    fraud: DashMap<String, FraudRecord>,
    events: EventSink,
    latency: Arc<CoreLatency>,
    settings: DeskSettings,
    next_dispute_id: AtomicU64,
    next_vote_id: AtomicU64,
}

impl DisputeDesk {
    pub fn new(
        items: Arc<dyn Disputable>,
        ledger: Arc<Ledger>,
        membership: Arc<dyn Membership>,
        identities: Arc<dyn PlatformIdentities>,
        events: EventSink,
        latency: Arc<CoreLatency>,
        settings: DeskSettings,
    ) -> Arc<Self> {
        Arc::new(Self {
            disputes: DashMap::new(),
            items,
            ledger,
            membership,
            identities,
            fraud: DashMap::new(),
            events,
            latency,
            settings,
            next_dispute_id: AtomicU64::new(1),
            next_vote_id: AtomicU64::new(1),
        })
    }

    // -----------------------------------------------------------------------
    // Readers
    // -----------------------------------------------------------------------

    pub fn dispute(&self, id: DisputeId) -> Result<Dispute> {
        Ok(self.slot(id)?.lock().dispute.clone())
    }

    pub fn votes(&self, id: DisputeId) -> Result<Vec<DisputeVote>> {
        Ok(self.slot(id)?.lock().votes.clone())
    }

    pub fn tally(&self, id: DisputeId) -> Result<Tally> {
        Ok(Tally::count(&self.slot(id)?.lock().votes))
    }

    /// The outcome that has reached `votes_required`, if any.
    pub fn quorum_outcome(&self, id: DisputeId) -> Result<Option<VoteOutcome>> {
        let slot = self.slot(id)?;
        let slot = slot.lock();
        Ok(Tally::count(&slot.votes).reached(slot.dispute.votes_required))
    }

    /// Outcomes voters may select for a `different_outcome` vote.
    /// Empty when the item takes free-form outcomes.
    pub fn outcome_options(&self, id: DisputeId) -> Result<Vec<String>> {
        let item = self.dispute(id)?.item;
        self.items.dispute_outcome_options(item)
    }

    /// Pending disputes whose voting window closed before `now`.
    pub fn expired_pending(&self, now: DateTime<Utc>) -> Vec<DisputeId> {
        let mut ids: Vec<DisputeId> = self
            .disputes
            .iter()
            .filter_map(|e| {
                let slot = e.value().lock();
                (slot.dispute.is_pending() && slot.dispute.expires_at <= now)
                    .then_some(slot.dispute.id)
            })
            .collect();
        ids.sort_unstable();
        ids
    }

    pub fn fraud_record(&self, identity: &str) -> Option<FraudRecord> {
        self.fraud.get(identity).map(|r| r.clone())
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Open a dispute against a settled item and mark it disputed.
    pub fn open(
        &self,
        item: DisputableRef,
        reporter: MemberId,
        now: DateTime<Utc>,
    ) -> Result<Dispute> {
        let id = self.next_dispute_id.fetch_add(1, Ordering::Relaxed);
        let settled = self.items.mark_disputed(item, id)?;

        let members = self.membership.members(settled.group);
        let dispute = Dispute {
            id,
            group: settled.group,
            item,
            reporter,
            accused: settled.settler,
            is_self_report: settled.settler == Some(reporter),
            status: DisputeStatus::Pending,
            resolution: None,
            original_outcome: settled.outcome,
            corrected_outcome: None,
            votes_required: quorum::votes_required(&members, reporter, settled.settler),
            expires_at: now + self.settings.expiry,
            created_at: now,
            resolved_at: None,
        };
        self.disputes.insert(
            id,
            Arc::new(Mutex::new(DisputeSlot {
                dispute: dispute.clone(),
                votes: Vec::new(),
            })),
        );

        info!(
            event = "DISPUTE_OPENED",
            dispute_id = id,
            item = %item,
            reporter,
            accused = ?dispute.accused,
            self_report = dispute.is_self_report,
            votes_required = dispute.votes_required,
            "DISPUTE OPENED | {} by member {} | needs {} votes",
            item,
            reporter,
            dispute.votes_required,
        );
        self.events.emit(CoreEvent::DisputeCreated(dispute.clone()));
        Ok(dispute)
    }

    /// Record one vote. Resolution is left to the caller.
    pub fn cast_vote(
        &self,
        id: DisputeId,
        voter: MemberId,
        outcome: VoteOutcome,
        selected: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<DisputeVote> {
        let slot = self.slot(id)?;
        let mut slot = slot.lock();
        self.record_vote(&mut slot, voter, outcome, selected, now)
    }

    /// Record one vote and resolve the dispute in the same step if it brought
    /// an outcome to quorum. Returns the resolved dispute when that happened.
    pub fn cast_vote_and_tally(
        &self,
        id: DisputeId,
        voter: MemberId,
        outcome: VoteOutcome,
        selected: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(DisputeVote, Option<Dispute>)> {
        let slot = self.slot(id)?;
        let mut slot = slot.lock();
        let vote = self.record_vote(&mut slot, voter, outcome, selected, now)?;

        let reached = Tally::count(&slot.votes).reached(slot.dispute.votes_required);
        let resolved = match reached {
            Some(winning) => Some(self.resolve_locked(&mut slot, winning, Dismissal::Penalize, now)?),
            None => None,
        };
        Ok((vote, resolved))
    }

    /// Resolve a pending dispute with `winning` and apply its penalty.
    pub fn resolve(
        &self,
        id: DisputeId,
        winning: VoteOutcome,
        now: DateTime<Utc>,
    ) -> Result<Dispute> {
        let slot = self.slot(id)?;
        let mut slot = slot.lock();
        if !slot.dispute.is_pending() {
            return Err(AppError::DisputeNotPending(id));
        }
        self.resolve_locked(&mut slot, winning, Dismissal::Penalize, now)
    }

    /// Close a dispute whose voting window has passed. Unvoted disputes are
    /// dismissed without penalty; otherwise the plurality outcome wins.
    /// Returns `None` when the dispute is already resolved or not yet due.
    pub fn handle_expired(&self, id: DisputeId, now: DateTime<Utc>) -> Result<Option<Dispute>> {
        let slot = self.slot(id)?;
        let mut slot = slot.lock();
        if !slot.dispute.is_pending() || slot.dispute.expires_at > now {
            return Ok(None);
        }

        let resolved = match Tally::count(&slot.votes).plurality() {
            None => self.resolve_locked(&mut slot, VoteOutcome::OriginalCorrect, Dismissal::Waive, now)?,
            Some(winning) => self.resolve_locked(&mut slot, winning, Dismissal::Penalize, now)?,
        };
        Ok(Some(resolved))
    }

    /// Dismiss, without penalty, every pending dispute in `group` that accuses
    /// `member`. Disputes they reported carry on.
    pub fn handle_participant_left(
        &self,
        group: GroupId,
        member: MemberId,
        now: DateTime<Utc>,
    ) -> Result<Vec<Dispute>> {
        let slots: Vec<Arc<Mutex<DisputeSlot>>> =
            self.disputes.iter().map(|e| Arc::clone(e.value())).collect();

        let mut dismissed = Vec::new();
        for slot in slots {
            let mut slot = slot.lock();
            let d = &slot.dispute;
            if d.group != group || !d.is_pending() || d.accused != Some(member) {
                continue;
            }
            dismissed.push(self.resolve_locked(
                &mut slot,
                VoteOutcome::OriginalCorrect,
                Dismissal::Waive,
                now,
            )?);
        }
        if !dismissed.is_empty() {
            info!(group, member, count = dismissed.len(), "Accused left group, disputes dismissed");
        }
        Ok(dismissed)
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn slot(&self, id: DisputeId) -> Result<Arc<Mutex<DisputeSlot>>> {
        self.disputes
            .get(&id)
            .map(|s| Arc::clone(&s))
            .ok_or_else(|| AppError::NotFound(format!("dispute {id}")))
    }

    fn record_vote(
        &self,
        slot: &mut DisputeSlot,
        voter: MemberId,
        outcome: VoteOutcome,
        selected: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<DisputeVote> {
        let d = &slot.dispute;
        if !d.is_pending() {
            return Err(AppError::DisputeNotPending(d.id));
        }
        if voter == d.reporter {
            return Err(AppError::DisputeNotEligibleVoter(format!(
                "member {voter} reported dispute {}",
                d.id
            )));
        }
        if d.accused == Some(voter) {
            return Err(AppError::DisputeNotEligibleVoter(format!(
                "member {voter} is accused in dispute {}",
                d.id
            )));
        }
        if !self.membership.is_member(d.group, voter) {
            return Err(AppError::DisputeNotEligibleVoter(format!(
                "member {voter} is not in group {}",
                d.group
            )));
        }
        if slot.votes.iter().any(|v| v.voter == voter) {
            return Err(AppError::DisputeNotEligibleVoter(format!(
                "member {voter} already voted on dispute {}",
                d.id
            )));
        }

        let selected_outcome = match outcome {
            VoteOutcome::DifferentOutcome => {
                let raw = selected
                    .filter(|s| !s.trim().is_empty())
                    .ok_or(AppError::DisputeMissingSelection)?;
                Some(self.items.normalize_outcome(d.item, raw)?)
            }
            _ => None,
        };

        let vote = DisputeVote {
            id: self.next_vote_id.fetch_add(1, Ordering::Relaxed),
            dispute: d.id,
            voter,
            vote_outcome: outcome,
            selected_outcome,
            created_at: now,
        };
        slot.votes.push(vote.clone());

        info!(
            event = "VOTE_CAST",
            dispute_id = vote.dispute,
            voter,
            outcome = %outcome,
            selected = vote.selected_outcome.as_deref().unwrap_or("-"),
            "VOTE | dispute {} | member {} voted {}",
            vote.dispute,
            voter,
            outcome,
        );
        self.events.emit(CoreEvent::VoteCast(vote.clone()));
        Ok(vote)
    }

    /// Apply `winning` to the item first, then charge penalties, so a failed
    /// item transition leaves the ledger untouched.
    fn resolve_locked(
        &self,
        slot: &mut DisputeSlot,
        winning: VoteOutcome,
        dismissal: Dismissal,
        now: DateTime<Utc>,
    ) -> Result<Dispute> {
        let started = Instant::now();
        let id = slot.dispute.id;
        let item = slot.dispute.item;

        let mut resolution = winning.resolution();
        let mut corrected = None;
        if resolution == DisputeResolution::DifferentOutcome {
            let key = |raw: &str| self.items.outcome_key(item, raw);
            let selection = quorum::corrected_selection(&slot.votes, key)?
                .ok_or(AppError::DisputeMissingSelection)?;
            let original_key = match slot.dispute.original_outcome.as_deref() {
                Some(original) => Some(key(original)?),
                None => None,
            };
            if original_key == Some(key(&selection)?) {
                resolution = DisputeResolution::OriginalCorrect;
            } else {
                corrected = Some(selection);
            }
        }

        match (resolution, corrected.as_deref()) {
            (DisputeResolution::DifferentOutcome, Some(outcome)) => {
                self.items.set_outcome(item, id, outcome)?
            }
            (DisputeResolution::PrematureSettlement, _) => self.items.clear_outcome(item)?,
            _ => self.items.mark_settled(item)?,
        }

        let d = &slot.dispute;
        match resolution {
            DisputeResolution::OriginalCorrect => {
                if dismissal == Dismissal::Penalize && !d.is_self_report {
                    self.penalize(
                        d,
                        d.reporter,
                        penalties::FALSE_REPORT_PCT,
                        TransactionType::DisputeFalseReportPenalty,
                    );
                }
            }
            DisputeResolution::DifferentOutcome => match d.accused {
                Some(settler) if d.is_self_report => self.penalize(
                    d,
                    settler,
                    penalties::HONEST_MISTAKE_PCT,
                    TransactionType::DisputeHonestMistakePenalty,
                ),
                Some(settler) => self.penalize_fraud(d, settler, now),
                None => {}
            },
            DisputeResolution::PrematureSettlement => {
                if let Some(settler) = d.accused {
                    self.penalize(
                        d,
                        settler,
                        penalties::PREMATURE_PCT,
                        TransactionType::DisputePrematurePenalty,
                    );
                }
            }
        }

        let d = &mut slot.dispute;
        d.status = DisputeStatus::Resolved;
        d.resolution = Some(resolution);
        d.corrected_outcome = corrected;
        d.resolved_at = Some(now);
        let dispute = d.clone();

        info!(
            event = "DISPUTE_RESOLVED",
            dispute_id = id,
            item = %item,
            resolution = %resolution,
            votes = slot.votes.len(),
            corrected = dispute.corrected_outcome.as_deref().unwrap_or("-"),
            "DISPUTE RESOLVED | {} | {}",
            item,
            resolution,
        );
        self.latency.resolve.record(started.elapsed());
        self.events.emit(CoreEvent::DisputeResolved(dispute.clone()));
        Ok(dispute)
    }

    fn penalize(&self, d: &Dispute, member: MemberId, pct: u32, kind: TransactionType) {
        let tx = self
            .ledger
            .deduct_percentage(member, d.group, pct, kind, Some(TxRef::Dispute(d.id)));
        info!(
            event = "PENALTY_APPLIED",
            dispute_id = d.id,
            member,
            pct,
            amount = tx.amount,
            kind = %kind,
            "PENALTY | member {} | {}% = {} points",
            member,
            pct,
            -tx.amount,
        );
    }

    /// Fraud tier escalates per platform identity. The record entry stays
    /// held across the deduction so concurrent frauds count in order.
    fn penalize_fraud(&self, d: &Dispute, settler: MemberId, now: DateTime<Utc>) {
        let identity = self.identities.platform_identity(settler).unwrap_or_else(|| {
            warn!(member = settler, "No platform identity linked, keying fraud by member id");
            format!("member:{settler}")
        });
        let mut record = self.fraud.entry(identity.clone()).or_insert_with(|| FraudRecord {
            identity,
            member: settler,
            fraud_offense_count: 0,
            last_fraud_at: None,
        });
        let pct = quorum::fraud_penalty_pct(record.fraud_offense_count);
        self.penalize(d, settler, pct, TransactionType::DisputeFraudPenalty);
        record.member = settler;
        record.fraud_offense_count += 1;
        record.last_fraud_at = Some(now);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
