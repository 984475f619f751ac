use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::info;

use crate::error::{AppError, Result};
use crate::events::{CoreEvent, EventSink};
use crate::latency::CoreLatency;
use crate::ledger::{Ledger, Overdraft};
use crate::settlement::answers::{self, Answer, Judgement};
use crate::settlement::payout::split_pot;
use crate::types::{
    DisputeId, EntryId, EntryResult, GroupId, MemberId, TransactionType, TxRef, Wager, WagerEntry,
    WagerId, WagerKind, WagerStatus,
};

/// A settlement credit, kept so a later re-settlement can claw it back.
#[derive(Debug, Clone)]
struct Payment {
    entry: EntryId,
    member: MemberId,
    amount: i64,
}

/// Everything about one wager. Guarded by a single mutex so settlement reads
/// and writes the aggregate (entries, totals, payments) as one unit.
struct WagerSlot {
    wager: Wager,
    entries: Vec<WagerEntry>,
    /// Credits from the settlement currently standing on the ledger.
    paid: Vec<Payment>,
    /// Disputes whose correction already ran against this wager.
    corrected_by: HashSet<DisputeId>,
}

/// Settlement decided up front, before any point moves.
struct SettlementPlan {
    outcome: Answer,
    judgement: Judgement,
    shares: Vec<i64>,
}

// ---------------------------------------------------------------------------
// WagerBook
// ---------------------------------------------------------------------------

/// Owns wager lifecycle: entries, settlement, cancellation and re-settlement.
pub struct WagerBook {
    wagers: DashMap<WagerId, Arc<Mutex<WagerSlot>>>,
    ledger: Arc<Ledger>,
    events: EventSink,
    latency: Arc<CoreLatency>,
    /// (member, group) → last wager placement, read by the decay scheduler.
    activity: DashMap<(MemberId, GroupId), DateTime<Utc>>,
    next_wager_id: AtomicU64,
    next_entry_id: AtomicU64,
}

impl WagerBook {
    pub fn new(ledger: Arc<Ledger>, events: EventSink, latency: Arc<CoreLatency>) -> Arc<Self> {
        Arc::new(Self {
            wagers: DashMap::new(),
            ledger,
            events,
            latency,
            activity: DashMap::new(),
            next_wager_id: AtomicU64::new(1),
            next_entry_id: AtomicU64::new(1),
        })
    }

    pub fn create_wager(
        &self,
        group: GroupId,
        creator: MemberId,
        kind: WagerKind,
        stake_amount: i64,
        deadline: Option<DateTime<Utc>>,
    ) -> Result<Wager> {
        if stake_amount <= 0 {
            return Err(AppError::InvalidWagerConfig(format!(
                "stake must be positive, got {stake_amount}"
            )));
        }
        answers::validate_kind(&kind)?;

        let wager = Wager {
            id: self.next_wager_id.fetch_add(1, Ordering::Relaxed),
            group,
            creator,
            kind,
            stake_amount,
            status: WagerStatus::Open,
            outcome_value: None,
            settlement_note: None,
            total_points_wagered: 0,
            participants_count: 0,
            settler: None,
            settled_at: None,
            deadline,
            created_at: Utc::now(),
            dispute: None,
        };
        self.wagers.insert(
            wager.id,
            Arc::new(Mutex::new(WagerSlot {
                wager: wager.clone(),
                entries: Vec::new(),
                paid: Vec::new(),
                corrected_by: HashSet::new(),
            })),
        );
        info!(
            wager_id = wager.id,
            group,
            wager_type = %wager.wager_type(),
            stake = stake_amount,
            "Wager created",
        );
        Ok(wager)
    }

    pub fn wager(&self, id: WagerId) -> Result<Wager> {
        Ok(self.slot(id)?.lock().wager.clone())
    }

    pub fn entries(&self, id: WagerId) -> Result<Vec<WagerEntry>> {
        Ok(self.slot(id)?.lock().entries.clone())
    }

    pub fn last_activity(&self, member: MemberId, group: GroupId) -> Option<DateTime<Utc>> {
        self.activity.get(&(member, group)).map(|t| *t)
    }

    /// `open → locked`, typically when the deadline passes.
    pub fn lock(&self, id: WagerId) -> Result<Wager> {
        let slot = self.slot(id)?;
        let mut slot = slot.lock();
        if slot.wager.status != WagerStatus::Open {
            return Err(AppError::InvalidWagerState { wager: id, status: slot.wager.status });
        }
        slot.wager.status = WagerStatus::Locked;
        info!(wager_id = id, "Wager locked");
        Ok(slot.wager.clone())
    }

    pub fn place_entry(
        &self,
        wager_id: WagerId,
        member: MemberId,
        answer: &str,
        stake: i64,
    ) -> Result<WagerEntry> {
        let slot = self.slot(wager_id)?;
        let mut slot = slot.lock();
        let wager = &slot.wager;

        if wager.status != WagerStatus::Open {
            return Err(AppError::WagerNotOpen(wager_id));
        }
        if slot.entries.iter().any(|e| e.member == member) {
            return Err(AppError::UserAlreadyJoined { wager: wager_id, member });
        }
        if stake != wager.stake_amount {
            return Err(AppError::InvalidStake { expected: wager.stake_amount, got: stake });
        }
        let normalized = answers::normalize(&wager.kind, answer)?;
        let group = wager.group;

        let entry_id = self.next_entry_id.fetch_add(1, Ordering::Relaxed);
        self.ledger.debit(
            member,
            group,
            stake,
            TransactionType::WagerPlacement,
            Some(TxRef::Entry { wager: wager_id, entry: entry_id }),
            Overdraft::Reject,
        )?;

        let now = Utc::now();
        let entry = WagerEntry {
            id: entry_id,
            wager: wager_id,
            member,
            answer_value: normalized.encode(),
            points_wagered: stake,
            result: None,
            is_winner: false,
            points_won: 0,
            points_lost: 0,
            numeric_distance: None,
            date_distance_days: None,
            created_at: now,
        };
        slot.entries.push(entry.clone());
        slot.wager.total_points_wagered += stake;
        slot.wager.participants_count += 1;
        drop(slot);

        self.activity.insert((member, group), now);
        info!(
            wager_id,
            entry_id,
            member,
            stake,
            answer = %entry.answer_value,
            "Wager entry placed",
        );
        Ok(entry)
    }

    pub fn settle(
        &self,
        wager_id: WagerId,
        outcome: &str,
        note: Option<String>,
        settler: Option<MemberId>,
    ) -> Result<Wager> {
        let started = Instant::now();
        let slot = self.slot(wager_id)?;
        let mut slot = slot.lock();

        if !slot.wager.status.is_settleable() {
            return Err(AppError::InvalidWagerState { wager: wager_id, status: slot.wager.status });
        }
        let plan = plan_settlement(&slot, outcome)?;

        // A premature-settlement ruling leaves the earlier payouts standing
        // until the wager is settled again.
        self.reverse_payments(&mut slot)?;
        self.apply_settlement(&mut slot, plan, note, settler)?;
        let wager = slot.wager.clone();
        drop(slot);

        self.latency.settle.record(started.elapsed());
        self.events.emit(CoreEvent::WagerSettled(wager.clone()));
        Ok(wager)
    }

    pub fn cancel(&self, wager_id: WagerId) -> Result<Wager> {
        let slot = self.slot(wager_id)?;
        let mut slot = slot.lock();

        if !slot.wager.status.is_settleable() {
            return Err(AppError::InvalidWagerState { wager: wager_id, status: slot.wager.status });
        }
        self.reverse_payments(&mut slot)?;

        let group = slot.wager.group;
        let mut refunded = 0_i64;
        for entry in slot.entries.iter_mut() {
            self.ledger.refund(
                entry.member,
                group,
                entry.points_wagered,
                Some(TxRef::Entry { wager: wager_id, entry: entry.id }),
            )?;
            entry.result = Some(EntryResult::Refunded);
            refunded += entry.points_wagered;
        }
        slot.wager.status = WagerStatus::Cancelled;
        slot.wager.outcome_value = None;
        let wager = slot.wager.clone();
        drop(slot);

        info!(
            event = "WAGER_CANCELLED",
            wager_id,
            entries = wager.participants_count,
            refunded,
            "WAGER CANCELLED | refunded {refunded} points to {} entries",
            wager.participants_count,
        );
        self.events.emit(CoreEvent::WagerCancelled(wager.clone()));
        Ok(wager)
    }

    /// Undo the standing settlement and settle again with `corrected`.
    ///
    /// Runs at most once per dispute: a repeat call for the same dispute returns
    /// the wager unchanged.
    pub fn reverse_and_resettle(
        &self,
        wager_id: WagerId,
        dispute: DisputeId,
        corrected: &str,
    ) -> Result<Wager> {
        let started = Instant::now();
        let slot = self.slot(wager_id)?;
        let mut slot = slot.lock();

        if slot.corrected_by.contains(&dispute) {
            return Ok(slot.wager.clone());
        }
        if !matches!(slot.wager.status, WagerStatus::Disputed | WagerStatus::Settled) {
            return Err(AppError::InvalidWagerState { wager: wager_id, status: slot.wager.status });
        }
        let plan = plan_settlement(&slot, corrected)?;
        let previous = slot.wager.outcome_value.clone();

        self.reverse_payments(&mut slot)?;
        let settler = slot.wager.settler;
        let note = Some(format!("corrected by dispute {dispute}"));
        self.apply_settlement(&mut slot, plan, note, settler)?;
        slot.wager.dispute = None;
        slot.corrected_by.insert(dispute);
        let wager = slot.wager.clone();
        drop(slot);

        info!(
            event = "WAGER_RESETTLED",
            wager_id,
            dispute_id = dispute,
            previous = previous.as_deref().unwrap_or("none"),
            corrected = wager.outcome_value.as_deref().unwrap_or("none"),
            "WAGER RESETTLED | {} -> {}",
            previous.as_deref().unwrap_or("none"),
            wager.outcome_value.as_deref().unwrap_or("none"),
        );
        self.latency.resettle.record(started.elapsed());
        self.events.emit(CoreEvent::WagerResettled(wager.clone()));
        Ok(wager)
    }

    // -----------------------------------------------------------------------
    // Dispute-facing state changes (see dispute::disputable)
    // -----------------------------------------------------------------------

    /// `settled → disputed`, linking the dispute. Returns the wager as it was settled.
    pub(crate) fn mark_disputed(&self, wager_id: WagerId, dispute: DisputeId) -> Result<Wager> {
        let slot = self.slot(wager_id)?;
        let mut slot = slot.lock();
        if slot.wager.status != WagerStatus::Settled || slot.wager.dispute.is_some() {
            return Err(AppError::NotDisputable(format!(
                "wager {wager_id} is {}",
                slot.wager.status
            )));
        }
        let settled = slot.wager.clone();
        slot.wager.status = WagerStatus::Disputed;
        slot.wager.dispute = Some(dispute);
        self.events.emit(CoreEvent::WagerUpdated(slot.wager.clone()));
        Ok(settled)
    }

    /// Back to `settled` with the dispute link cleared. No-op when already there.
    pub(crate) fn mark_settled(&self, wager_id: WagerId) -> Result<Wager> {
        let slot = self.slot(wager_id)?;
        let mut slot = slot.lock();
        if slot.wager.status == WagerStatus::Disputed {
            slot.wager.status = WagerStatus::Settled;
        }
        slot.wager.dispute = None;
        let wager = slot.wager.clone();
        drop(slot);

        self.events.emit(CoreEvent::WagerUpdated(wager.clone()));
        Ok(wager)
    }

    /// Drop the outcome and return the wager to `locked` awaiting a new
    /// settlement. Payouts stay on the ledger until that settlement runs.
    pub(crate) fn clear_outcome(&self, wager_id: WagerId) -> Result<Wager> {
        let slot = self.slot(wager_id)?;
        let mut slot = slot.lock();
        if slot.wager.status != WagerStatus::Disputed {
            return Err(AppError::InvalidWagerState { wager: wager_id, status: slot.wager.status });
        }
        slot.wager.status = WagerStatus::Locked;
        slot.wager.outcome_value = None;
        slot.wager.settled_at = None;
        slot.wager.dispute = None;
        let wager = slot.wager.clone();
        drop(slot);

        info!(wager_id, "Wager outcome cleared, awaiting settlement");
        self.events.emit(CoreEvent::WagerUpdated(wager.clone()));
        Ok(wager)
    }

    /// Canonical form of `raw` for this wager's type.
    pub(crate) fn normalize_outcome(&self, wager_id: WagerId, raw: &str) -> Result<String> {
        let slot = self.slot(wager_id)?;
        let slot = slot.lock();
        Ok(answers::normalize(&slot.wager.kind, raw)?.encode())
    }

    /// Key under which two outcomes of this wager compare equal when they
    /// settle the same way.
    pub(crate) fn outcome_key(&self, wager_id: WagerId, raw: &str) -> Result<String> {
        let slot = self.slot(wager_id)?;
        let slot = slot.lock();
        Ok(answers::normalize(&slot.wager.kind, raw)?.comparison_key())
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn slot(&self, id: WagerId) -> Result<Arc<Mutex<WagerSlot>>> {
        self.wagers
            .get(&id)
            .map(|s| Arc::clone(&s))
            .ok_or_else(|| AppError::NotFound(format!("wager {id}")))
    }

    /// Debit back every standing settlement credit and clear entry results.
    fn reverse_payments(&self, slot: &mut WagerSlot) -> Result<()> {
        if slot.paid.is_empty() {
            return Ok(());
        }
        let wager_id = slot.wager.id;
        let group = slot.wager.group;
        for payment in slot.paid.drain(..) {
            // The points may already be spent; the claw-back goes negative if so.
            self.ledger.debit(
                payment.member,
                group,
                payment.amount,
                TransactionType::WagerReversal,
                Some(TxRef::Entry { wager: wager_id, entry: payment.entry }),
                Overdraft::Allow,
            )?;
        }
        for entry in slot.entries.iter_mut() {
            entry.clear_result();
        }
        Ok(())
    }

    fn apply_settlement(
        &self,
        slot: &mut WagerSlot,
        plan: SettlementPlan,
        note: Option<String>,
        settler: Option<MemberId>,
    ) -> Result<()> {
        let wager_id = slot.wager.id;
        let group = slot.wager.group;
        let is_date = matches!(slot.wager.kind, WagerKind::Date { .. });
        let refund_all = plan.judgement.refund_all();
        let mut paid = Vec::with_capacity(slot.entries.len());

        for (i, entry) in slot.entries.iter_mut().enumerate() {
            let distance = plan.judgement.distances.get(i).copied().flatten();
            if is_date {
                entry.date_distance_days = distance;
            } else {
                entry.numeric_distance = distance;
            }

            let reference = Some(TxRef::Entry { wager: wager_id, entry: entry.id });
            if refund_all {
                self.ledger.refund(entry.member, group, entry.points_wagered, reference)?;
                entry.result = Some(EntryResult::Refunded);
                paid.push(Payment { entry: entry.id, member: entry.member, amount: entry.points_wagered });
                continue;
            }

            match plan.judgement.winners.iter().position(|&w| w == i) {
                Some(rank) => {
                    let payout = plan.shares[rank];
                    if payout > 0 {
                        self.ledger.award_points(entry.member, group, payout, reference)?;
                        paid.push(Payment { entry: entry.id, member: entry.member, amount: payout });
                    }
                    entry.result = Some(EntryResult::Won);
                    entry.is_winner = true;
                    entry.points_won = payout;
                }
                None => {
                    entry.result = Some(EntryResult::Lost);
                    entry.points_lost = entry.points_wagered;
                }
            }
        }

        slot.paid = paid;
        slot.wager.status = WagerStatus::Settled;
        slot.wager.outcome_value = Some(plan.outcome.encode());
        slot.wager.settlement_note = note;
        slot.wager.settled_at = Some(Utc::now());
        slot.wager.settler = settler;

        info!(
            event = "WAGER_SETTLED",
            wager_id,
            outcome = slot.wager.outcome_value.as_deref().unwrap_or(""),
            winners = plan.judgement.winners.len(),
            entries = slot.entries.len(),
            pot = slot.wager.total_points_wagered,
            refunded = refund_all,
            "WAGER SETTLED | outcome: {} | winners: {}/{} | pot: {}{}",
            slot.wager.outcome_value.as_deref().unwrap_or(""),
            plan.judgement.winners.len(),
            slot.entries.len(),
            slot.wager.total_points_wagered,
            if refund_all { " | refunded" } else { "" },
        );
        Ok(())
    }
}

/// Decide winners and shares without touching any state.
fn plan_settlement(slot: &WagerSlot, outcome_raw: &str) -> Result<SettlementPlan> {
    let kind = &slot.wager.kind;
    let outcome = answers::normalize(kind, outcome_raw)?;
    let answers = slot
        .entries
        .iter()
        .map(|e| answers::normalize(kind, &e.answer_value))
        .collect::<Result<Vec<_>>>()?;
    let judgement = answers::judge(kind, &answers, &outcome);

    let winner_stakes: Vec<i64> = judgement
        .winners
        .iter()
        .map(|&i| slot.entries[i].points_wagered)
        .collect();
    let shares = split_pot(slot.wager.total_points_wagered, &winner_stakes);

    Ok(SettlementPlan { outcome, judgement, shares })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Harness, GROUP};
    use crate::types::MatchMode;

    fn yes_no_wager(h: &Harness) -> WagerId {
        h.wagers.create_wager(GROUP, 1, WagerKind::yes_no(), 100, None).unwrap().id
    }

    #[test]
    fn proportional_split_scenario() {
        let h = Harness::new(5);
        let id = yes_no_wager(&h);
        h.wagers.place_entry(id, 1, "yes", 100).unwrap();
        h.wagers.place_entry(id, 2, "Yes", 100).unwrap();
        h.wagers.place_entry(id, 3, "no", 100).unwrap();

        let wager = h.wagers.settle(id, "YES", None, Some(4)).unwrap();
        assert_eq!(wager.status, WagerStatus::Settled);
        assert_eq!(wager.outcome_value.as_deref(), Some("yes"));
        assert_eq!(wager.settler, Some(4));

        let entries = h.wagers.entries(id).unwrap();
        let results: Vec<_> = entries.iter().map(|e| e.result).collect();
        assert_eq!(
            results,
            vec![Some(EntryResult::Won), Some(EntryResult::Won), Some(EntryResult::Lost)]
        );
        assert_eq!(entries[0].points_won, 150);
        assert_eq!(entries[1].points_won, 150);
        assert_eq!(entries[2].points_won, 0);
        assert_eq!(entries[2].points_lost, 100);

        assert_eq!(h.ledger.balance(1, GROUP), 1050);
        assert_eq!(h.ledger.balance(3, GROUP), 900);
        assert_eq!(h.ledger.group_total(GROUP), h.seeded_total());
    }

    #[test]
    fn non_ascii_binary_labels_settle() {
        let h = Harness::new(3);
        let kind = WagerKind::Binary { labels: ["Über".into(), "Unter".into()] };
        let id = h.wagers.create_wager(GROUP, 1, kind, 100, None).unwrap().id;
        h.wagers.place_entry(id, 1, "Über", 100).unwrap();
        h.wagers.place_entry(id, 2, "unter", 100).unwrap();
        assert_eq!(h.wagers.entries(id).unwrap()[0].answer_value, "über");

        let wager = h.wagers.settle(id, "ÜBER", None, Some(3)).unwrap();
        assert_eq!(wager.outcome_value.as_deref(), Some("über"));
        assert_eq!(h.ledger.balance(1, GROUP), 1100);
        assert_eq!(h.ledger.balance(2, GROUP), 900);
    }

    #[test]
    fn non_ascii_choice_outcome_ignores_case() {
        let h = Harness::new(3);
        let kind = WagerKind::MultipleChoice {
            options: vec!["Éclair".into(), "Ñandú".into(), "Straße".into()],
        };
        let id = h.wagers.create_wager(GROUP, 1, kind, 50, None).unwrap().id;
        h.wagers.place_entry(id, 1, "éCLAIR", 50).unwrap();
        h.wagers.place_entry(id, 2, "ñandú", 50).unwrap();

        let wager = h.wagers.settle(id, "ÉCLAIR", None, Some(3)).unwrap();
        assert_eq!(wager.outcome_value.as_deref(), Some("Éclair"));
        let results: Vec<_> = h.wagers.entries(id).unwrap().iter().map(|e| e.result).collect();
        assert_eq!(results, vec![Some(EntryResult::Won), Some(EntryResult::Lost)]);
    }

    #[test]
    fn short_answer_outcome_ignores_case() {
        let h = Harness::new(3);
        let kind = WagerKind::ShortAnswer { max_length: 30 };
        let id = h.wagers.create_wager(GROUP, 1, kind, 100, None).unwrap().id;
        h.wagers.place_entry(id, 1, " paris ", 100).unwrap();
        h.wagers.place_entry(id, 2, "Lyon", 100).unwrap();

        h.wagers.settle(id, "PARIS", None, Some(3)).unwrap();
        let entries = h.wagers.entries(id).unwrap();
        assert_eq!(entries[0].result, Some(EntryResult::Won));
        assert_eq!(entries[0].points_won, 200);
        assert_eq!(entries[1].result, Some(EntryResult::Lost));
    }

    #[test]
    fn numeric_closest_scenario() {
        let h = Harness::new(3);
        let kind = WagerKind::Numeric { min: None, max: None, mode: MatchMode::Closest };
        let id = h.wagers.create_wager(GROUP, 1, kind, 100, None).unwrap().id;
        h.wagers.place_entry(id, 1, "48", 100).unwrap();
        h.wagers.place_entry(id, 2, "30", 100).unwrap();

        h.wagers.settle(id, "50", None, Some(3)).unwrap();
        let entries = h.wagers.entries(id).unwrap();
        assert_eq!(entries[0].result, Some(EntryResult::Won));
        assert_eq!(entries[0].points_won, 200);
        assert_eq!(entries[0].numeric_distance, Some(2));
        assert_eq!(entries[1].result, Some(EntryResult::Lost));
        assert_eq!(entries[1].numeric_distance, Some(20));
    }

    #[test]
    fn settled_pot_is_conserved() {
        let h = Harness::new(5);
        let kind = WagerKind::MultipleChoice {
            options: vec!["Red".into(), "Green".into(), "Blue".into()],
        };
        let id = h.wagers.create_wager(GROUP, 1, kind, 70, None).unwrap().id;
        for (member, pick) in [(1, "red"), (2, "green"), (3, "Green"), (4, "GREEN"), (5, "blue")] {
            h.wagers.place_entry(id, member, pick, 70).unwrap();
        }
        let wager = h.wagers.settle(id, "green", None, None).unwrap();

        let won: i64 = h.wagers.entries(id).unwrap().iter().map(|e| e.points_won).sum();
        assert_eq!(won, wager.total_points_wagered);
        assert_eq!(wager.total_points_wagered, 350);
        assert_eq!(h.ledger.group_total(GROUP), h.seeded_total());
    }

    #[test]
    fn no_matching_answer_refunds_everyone() {
        let h = Harness::new(3);
        let id = yes_no_wager(&h);
        h.wagers.place_entry(id, 1, "yes", 100).unwrap();
        h.wagers.place_entry(id, 2, "yes", 100).unwrap();

        h.wagers.settle(id, "no", None, Some(3)).unwrap();
        for e in h.wagers.entries(id).unwrap() {
            assert_eq!(e.result, Some(EntryResult::Refunded));
            assert!(!e.is_winner);
        }
        assert_eq!(h.ledger.balance(1, GROUP), 1000);
        assert_eq!(h.ledger.balance(2, GROUP), 1000);
    }

    #[test]
    fn entry_preconditions() {
        let h = Harness::new(3);
        let id = yes_no_wager(&h);
        h.wagers.place_entry(id, 1, "yes", 100).unwrap();

        assert!(matches!(
            h.wagers.place_entry(id, 1, "no", 100),
            Err(AppError::UserAlreadyJoined { member: 1, .. })
        ));
        assert!(matches!(
            h.wagers.place_entry(id, 2, "no", 50),
            Err(AppError::InvalidStake { expected: 100, got: 50 })
        ));
        assert!(matches!(
            h.wagers.place_entry(id, 2, "perhaps", 100),
            Err(AppError::InvalidAnswer(_))
        ));

        h.wagers.lock(id).unwrap();
        assert!(matches!(h.wagers.place_entry(id, 2, "no", 100), Err(AppError::WagerNotOpen(_))));
        assert_eq!(h.wagers.wager(id).unwrap().participants_count, 1);
    }

    #[test]
    fn insufficient_balance_leaves_no_trace() {
        let h = Harness::new(2);
        let id = h.wagers.create_wager(GROUP, 1, WagerKind::yes_no(), 5000, None).unwrap().id;
        assert!(matches!(
            h.wagers.place_entry(id, 1, "yes", 5000),
            Err(AppError::InsufficientBalance { .. })
        ));
        let wager = h.wagers.wager(id).unwrap();
        assert_eq!(wager.total_points_wagered, 0);
        assert!(h.wagers.entries(id).unwrap().is_empty());
        assert_eq!(h.ledger.history(1, GROUP).len(), 1);
        assert!(h.wagers.last_activity(1, GROUP).is_none());
    }

    #[test]
    fn placement_records_activity_and_totals() {
        let h = Harness::new(2);
        let id = yes_no_wager(&h);
        let entry = h.wagers.place_entry(id, 2, "NO", 100).unwrap();
        assert_eq!(entry.answer_value, "no");
        assert!(h.wagers.last_activity(2, GROUP).is_some());

        let wager = h.wagers.wager(id).unwrap();
        assert_eq!(wager.total_points_wagered, 100);
        assert_eq!(wager.participants_count, 1);

        let last = h.ledger.history(2, GROUP).pop().unwrap();
        assert_eq!(last.kind, TransactionType::WagerPlacement);
        assert_eq!(last.reference, Some(TxRef::Entry { wager: id, entry: entry.id }));
    }

    #[test]
    fn cancel_refunds_every_entry() {
        let h = Harness::new(4);
        let before = h.ledger.group_total(GROUP);
        let id = yes_no_wager(&h);
        for m in 1..=4 {
            h.wagers.place_entry(id, m, if m % 2 == 0 { "yes" } else { "no" }, 100).unwrap();
        }

        let wager = h.wagers.cancel(id).unwrap();
        assert_eq!(wager.status, WagerStatus::Cancelled);

        let refunds: Vec<_> = (1..=4)
            .flat_map(|m| h.ledger.history(m, GROUP))
            .filter(|t| t.kind == TransactionType::WagerRefund)
            .collect();
        assert_eq!(refunds.len(), 4);
        assert!(refunds.iter().all(|t| t.amount == 100));
        assert_eq!(h.ledger.group_total(GROUP), before);
    }

    #[test]
    fn terminal_wagers_reject_settle_and_cancel() {
        let h = Harness::new(2);
        let id = yes_no_wager(&h);
        h.wagers.place_entry(id, 1, "yes", 100).unwrap();
        h.wagers.settle(id, "yes", None, Some(2)).unwrap();

        assert!(matches!(
            h.wagers.settle(id, "no", None, Some(2)),
            Err(AppError::InvalidWagerState { status: WagerStatus::Settled, .. })
        ));
        assert!(matches!(h.wagers.cancel(id), Err(AppError::InvalidWagerState { .. })));
    }

    #[test]
    fn invalid_outcome_changes_nothing() {
        let h = Harness::new(2);
        let id = yes_no_wager(&h);
        h.wagers.place_entry(id, 1, "yes", 100).unwrap();
        assert!(h.wagers.settle(id, "banana", None, None).is_err());
        assert_eq!(h.wagers.wager(id).unwrap().status, WagerStatus::Open);
        assert_eq!(h.ledger.balance(1, GROUP), 900);
    }

    #[test]
    fn locked_wager_can_settle() {
        let h = Harness::new(2);
        let id = yes_no_wager(&h);
        h.wagers.place_entry(id, 1, "yes", 100).unwrap();
        h.wagers.lock(id).unwrap();
        assert!(h.wagers.lock(id).is_err());
        assert_eq!(h.wagers.settle(id, "yes", None, None).unwrap().status, WagerStatus::Settled);
    }

    #[test]
    fn resettle_moves_the_pot_and_runs_once_per_dispute() {
        let h = Harness::new(4);
        let id = yes_no_wager(&h);
        h.wagers.place_entry(id, 1, "yes", 100).unwrap();
        h.wagers.place_entry(id, 2, "no", 100).unwrap();
        h.wagers.settle(id, "yes", None, Some(3)).unwrap();
        h.wagers.mark_disputed(id, 77).unwrap();

        let wager = h.wagers.reverse_and_resettle(id, 77, "no").unwrap();
        assert_eq!(wager.status, WagerStatus::Settled);
        assert_eq!(wager.outcome_value.as_deref(), Some("no"));
        assert_eq!(wager.dispute, None);
        assert_eq!(h.ledger.balance(1, GROUP), 900);
        assert_eq!(h.ledger.balance(2, GROUP), 1100);

        let again = h.wagers.reverse_and_resettle(id, 77, "yes").unwrap();
        assert_eq!(again.outcome_value.as_deref(), Some("no"));
        assert_eq!(h.ledger.balance(2, GROUP), 1100);
        assert_eq!(h.ledger.group_total(GROUP), h.seeded_total());

        let entries = h.wagers.entries(id).unwrap();
        assert_eq!(entries[0].result, Some(EntryResult::Lost));
        assert_eq!(entries[1].result, Some(EntryResult::Won));
    }

    #[test]
    fn cleared_outcome_is_reversed_on_next_settlement() {
        let h = Harness::new(3);
        let id = yes_no_wager(&h);
        h.wagers.place_entry(id, 1, "yes", 100).unwrap();
        h.wagers.place_entry(id, 2, "no", 100).unwrap();
        h.wagers.settle(id, "yes", None, Some(3)).unwrap();
        h.wagers.mark_disputed(id, 5).unwrap();

        let cleared = h.wagers.clear_outcome(id).unwrap();
        assert_eq!(cleared.status, WagerStatus::Locked);
        assert!(cleared.outcome_value.is_none());
        // Payout still standing.
        assert_eq!(h.ledger.balance(1, GROUP), 1100);

        h.wagers.settle(id, "no", None, Some(3)).unwrap();
        assert_eq!(h.ledger.balance(1, GROUP), 900);
        assert_eq!(h.ledger.balance(2, GROUP), 1100);
        assert_eq!(h.ledger.group_total(GROUP), h.seeded_total());
    }

    #[test]
    fn ranking_settlement_pays_best_score() {
        let h = Harness::new(3);
        let kind = WagerKind::TopNRanking {
            options: vec!["A".into(), "B".into(), "C".into()],
            n: 2,
        };
        let id = h.wagers.create_wager(GROUP, 1, kind, 10, None).unwrap().id;
        h.wagers.place_entry(id, 1, r#"["a","b"]"#, 10).unwrap();
        h.wagers.place_entry(id, 2, r#"["a","c"]"#, 10).unwrap();
        h.wagers.place_entry(id, 3, r#"["c","b"]"#, 10).unwrap();

        h.wagers.settle(id, r#"["A","B"]"#, None, None).unwrap();
        let entries = h.wagers.entries(id).unwrap();
        assert_eq!(entries[0].points_won, 30);
        assert!(!entries[1].is_winner);
        assert!(!entries[2].is_winner);
    }

    #[test]
    fn date_settlement_records_day_distance() {
        let h = Harness::new(2);
        let kind = WagerKind::Date { earliest: None, latest: None, mode: MatchMode::Exact };
        let id = h.wagers.create_wager(GROUP, 1, kind, 20, None).unwrap().id;
        h.wagers.place_entry(id, 1, "2026-05-01", 20).unwrap();
        h.wagers.place_entry(id, 2, "2026-05-04", 20).unwrap();

        h.wagers.settle(id, "2026-05-01", None, None).unwrap();
        let entries = h.wagers.entries(id).unwrap();
        assert_eq!(entries[0].date_distance_days, Some(0));
        assert_eq!(entries[1].date_distance_days, Some(3));
        assert_eq!(entries[0].numeric_distance, None);
        assert_eq!(entries[0].points_won, 40);
    }

    #[test]
    fn bad_wager_config_is_rejected() {
        let h = Harness::new(1);
        assert!(h.wagers.create_wager(GROUP, 1, WagerKind::yes_no(), 0, None).is_err());
        assert!(h
            .wagers
            .create_wager(GROUP, 1, WagerKind::ShortAnswer { max_length: 0 }, 10, None)
            .is_err());
        assert!(matches!(h.wagers.wager(999), Err(AppError::NotFound(_))));
    }

    #[test]
    fn concurrent_settlements_pay_once() {
        let h = Harness::new(3);
        let id = yes_no_wager(&h);
        h.wagers.place_entry(id, 1, "yes", 100).unwrap();
        h.wagers.place_entry(id, 2, "no", 100).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let wagers = Arc::clone(&h.wagers);
                std::thread::spawn(move || wagers.settle(id, "yes", None, Some(3)).is_ok())
            })
            .collect();
        let ok = handles.into_iter().map(|t| t.join().unwrap()).filter(|ok| *ok).count();

        assert_eq!(ok, 1);
        assert_eq!(h.ledger.balance(1, GROUP), 1100);
        assert_eq!(h.ledger.group_total(GROUP), h.seeded_total());
    }
}
