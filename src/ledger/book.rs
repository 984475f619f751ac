use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use tracing::debug;

use crate::error::{AppError, Result};
use crate::events::{CoreEvent, EventSink};
use crate::ledger::rules::{calculate_decay_amount, percentage_deduction};
use crate::types::{GroupId, MemberId, Transaction, TransactionType, TxRef};

/// Whether a debit may take a balance below zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Overdraft {
    Reject,
    Allow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct BalanceKey {
    member: MemberId,
    group: GroupId,
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// Append-only points book, one transaction chain per (member, group).
///
/// There is no cached balance: the current balance is the `balance_after` of the
/// chain's last transaction. Every mutation holds the chain's map entry for the
/// whole read-modify-write, which serializes concurrent posts to one balance
/// while leaving other balances free.
pub struct Ledger {
    accounts: DashMap<BalanceKey, Vec<Transaction>>,
    next_id: AtomicU64,
    events: EventSink,
}

impl Ledger {
    pub fn new(events: EventSink) -> Arc<Self> {
        Arc::new(Self {
            accounts: DashMap::new(),
            next_id: AtomicU64::new(1),
            events,
        })
    }

    pub fn balance(&self, member: MemberId, group: GroupId) -> i64 {
        self.accounts
            .get(&BalanceKey { member, group })
            .and_then(|chain| chain.last().map(|t| t.balance_after))
            .unwrap_or(0)
    }

    /// Full transaction history for one balance, oldest first.
    pub fn history(&self, member: MemberId, group: GroupId) -> Vec<Transaction> {
        self.accounts
            .get(&BalanceKey { member, group })
            .map(|chain| chain.clone())
            .unwrap_or_default()
    }

    /// Sum of every member's current balance in `group`.
    pub fn group_total(&self, group: GroupId) -> i64 {
        self.accounts
            .iter()
            .filter(|e| e.key().group == group)
            .filter_map(|e| e.value().last().map(|t| t.balance_after))
            .sum()
    }

    pub fn credit(
        &self,
        member: MemberId,
        group: GroupId,
        amount: i64,
        kind: TransactionType,
        reference: Option<TxRef>,
    ) -> Result<Transaction> {
        if amount <= 0 {
            return Err(AppError::InvalidAmount(amount));
        }
        self.post(member, group, kind, reference, |_| Ok(amount))
    }

    pub fn debit(
        &self,
        member: MemberId,
        group: GroupId,
        amount: i64,
        kind: TransactionType,
        reference: Option<TxRef>,
        overdraft: Overdraft,
    ) -> Result<Transaction> {
        if amount <= 0 {
            return Err(AppError::InvalidAmount(amount));
        }
        self.post(member, group, kind, reference, |balance| {
            if overdraft == Overdraft::Reject && balance < amount {
                return Err(AppError::InsufficientBalance {
                    balance,
                    required: amount,
                });
            }
            Ok(-amount)
        })
    }

    /// Deduct `percent` of the current balance, rounded up, at least 1 point,
    /// and nothing at all from a zero balance. Always records a transaction so
    /// the penalty shows up in the audit trail even when it was 0.
    pub fn deduct_percentage(
        &self,
        member: MemberId,
        group: GroupId,
        percent: u32,
        kind: TransactionType,
        reference: Option<TxRef>,
    ) -> Transaction {
        let mut chain = self.accounts.entry(BalanceKey { member, group }).or_default();
        let balance = chain.last().map_or(0, |t| t.balance_after);
        let amount = -percentage_deduction(balance, percent);
        let tx = self.append(&mut chain, member, group, amount, kind, reference);
        drop(chain);

        self.announce(&tx);
        tx
    }

    /// Charge inactivity decay, capped at the current balance.
    /// Returns `None` when there is nothing to decay.
    pub fn apply_decay(&self, member: MemberId, group: GroupId) -> Option<Transaction> {
        self.post(member, group, TransactionType::Decay, None, |balance| {
            if balance <= 0 {
                return Err(AppError::InsufficientBalance { balance, required: 1 });
            }
            Ok(-calculate_decay_amount(balance).min(balance))
        })
        .ok()
    }

    pub fn refund(
        &self,
        member: MemberId,
        group: GroupId,
        amount: i64,
        reference: Option<TxRef>,
    ) -> Result<Transaction> {
        self.credit(member, group, amount, TransactionType::WagerRefund, reference)
    }

    pub fn award_points(
        &self,
        member: MemberId,
        group: GroupId,
        amount: i64,
        reference: Option<TxRef>,
    ) -> Result<Transaction> {
        self.credit(member, group, amount, TransactionType::WagerWin, reference)
    }

    pub fn record_loss(
        &self,
        member: MemberId,
        group: GroupId,
        amount: i64,
        reference: Option<TxRef>,
    ) -> Result<Transaction> {
        self.debit(
            member,
            group,
            amount,
            TransactionType::WagerLoss,
            reference,
            Overdraft::Reject,
        )
    }

    /// Append one transaction. `amount_for` sees the current balance and returns
    /// the signed amount, or an error that leaves the chain untouched.
    fn post<F>(
        &self,
        member: MemberId,
        group: GroupId,
        kind: TransactionType,
        reference: Option<TxRef>,
        amount_for: F,
    ) -> Result<Transaction>
    where
        F: FnOnce(i64) -> Result<i64>,
    {
        let mut chain = self.accounts.entry(BalanceKey { member, group }).or_default();
        let balance_before = chain.last().map_or(0, |t| t.balance_after);
        let amount = amount_for(balance_before)?;
        let tx = self.append(&mut chain, member, group, amount, kind, reference);
        drop(chain);

        self.announce(&tx);
        Ok(tx)
    }

    fn append(
        &self,
        chain: &mut Vec<Transaction>,
        member: MemberId,
        group: GroupId,
        amount: i64,
        kind: TransactionType,
        reference: Option<TxRef>,
    ) -> Transaction {
        let balance_before = chain.last().map_or(0, |t| t.balance_after);
        let tx = Transaction {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            member,
            group,
            amount,
            balance_before,
            balance_after: balance_before + amount,
            kind,
            reference,
            created_at: Utc::now(),
        };
        chain.push(tx.clone());
        tx
    }

    fn announce(&self, tx: &Transaction) {
        debug!(
            tx_id = tx.id,
            member = tx.member,
            group = tx.group,
            amount = tx.amount,
            balance_after = tx.balance_after,
            kind = %tx.kind,
            "Ledger post",
        );
        self.events.emit(CoreEvent::Posted(tx.clone()));
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger() -> Arc<Ledger> {
        Ledger::new(EventSink::disabled())
    }

    #[test]
    fn balance_identity_holds_for_every_transaction() {
        let l = ledger();
        l.credit(1, 1, 500, TransactionType::AdminAdjustment, None).unwrap();
        l.debit(1, 1, 120, TransactionType::WagerPlacement, None, Overdraft::Reject)
            .unwrap();
        l.deduct_percentage(1, 1, 10, TransactionType::DisputeFalseReportPenalty, None);
        l.credit(1, 1, 7, TransactionType::WagerWin, None).unwrap();

        let history = l.history(1, 1);
        assert_eq!(history.len(), 4);
        for tx in &history {
            assert_eq!(tx.balance_after, tx.balance_before + tx.amount, "tx {}", tx.id);
        }
        for pair in history.windows(2) {
            assert_eq!(pair[1].balance_before, pair[0].balance_after);
        }
        assert_eq!(l.balance(1, 1), history.last().unwrap().balance_after);
        // 500 - 120 = 380, 10% = 38, +7
        assert_eq!(l.balance(1, 1), 349);
    }

    #[test]
    fn non_positive_amounts_are_rejected() {
        let l = ledger();
        assert!(matches!(
            l.credit(1, 1, 0, TransactionType::AdminAdjustment, None),
            Err(AppError::InvalidAmount(0))
        ));
        assert!(matches!(
            l.debit(1, 1, -5, TransactionType::WagerPlacement, None, Overdraft::Allow),
            Err(AppError::InvalidAmount(-5))
        ));
        assert!(l.history(1, 1).is_empty());
    }

    #[test]
    fn enforced_debit_fails_without_side_effect() {
        let l = ledger();
        l.credit(1, 1, 50, TransactionType::AdminAdjustment, None).unwrap();
        let err = l
            .debit(1, 1, 100, TransactionType::WagerPlacement, None, Overdraft::Reject)
            .unwrap_err();
        assert!(matches!(err, AppError::InsufficientBalance { balance: 50, required: 100 }));
        assert_eq!(l.history(1, 1).len(), 1);
        assert_eq!(l.balance(1, 1), 50);
    }

    #[test]
    fn overdraft_debit_may_go_negative() {
        let l = ledger();
        l.credit(1, 1, 50, TransactionType::AdminAdjustment, None).unwrap();
        let tx = l
            .debit(1, 1, 80, TransactionType::WagerReversal, None, Overdraft::Allow)
            .unwrap();
        assert_eq!(tx.balance_after, -30);
    }

    #[test]
    fn named_wrappers_tag_their_type() {
        let l = ledger();
        l.award_points(1, 1, 40, None).unwrap();
        l.refund(1, 1, 10, None).unwrap();
        assert!(matches!(
            l.record_loss(1, 1, 60, None),
            Err(AppError::InsufficientBalance { balance: 50, required: 60 })
        ));
        let loss = l.record_loss(1, 1, 20, Some(TxRef::Wager(3))).unwrap();

        let kinds: Vec<_> = l.history(1, 1).iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![TransactionType::WagerWin, TransactionType::WagerRefund, TransactionType::WagerLoss]
        );
        assert_eq!(loss.amount, -20);
        assert_eq!(loss.reference, Some(TxRef::Wager(3)));
    }

    #[test]
    fn percentage_on_zero_balance_records_zero() {
        let l = ledger();
        let tx = l.deduct_percentage(9, 1, 50, TransactionType::DisputeFraudPenalty, None);
        assert_eq!(tx.amount, 0);
        assert_eq!(tx.balance_after, 0);
    }

    #[test]
    fn balances_are_scoped_per_group() {
        let l = ledger();
        l.credit(1, 1, 100, TransactionType::AdminAdjustment, None).unwrap();
        l.credit(1, 2, 40, TransactionType::AdminAdjustment, None).unwrap();
        l.credit(2, 1, 10, TransactionType::AdminAdjustment, None).unwrap();

        assert_eq!(l.balance(1, 1), 100);
        assert_eq!(l.balance(1, 2), 40);
        assert_eq!(l.group_total(1), 110);
        assert_eq!(l.group_total(2), 40);
    }

    #[test]
    fn decay_is_capped_at_balance() {
        let l = ledger();
        l.credit(1, 1, 30, TransactionType::AdminAdjustment, None).unwrap();
        let tx = l.apply_decay(1, 1).unwrap();
        assert_eq!(tx.amount, -30);
        assert_eq!(l.balance(1, 1), 0);
        assert!(l.apply_decay(1, 1).is_none());
    }

    #[test]
    fn decay_uses_formula_above_minimum() {
        let l = ledger();
        l.credit(1, 1, 3000, TransactionType::AdminAdjustment, None).unwrap();
        let tx = l.apply_decay(1, 1).unwrap();
        assert_eq!(tx.amount, -100);
        assert_eq!(tx.kind, TransactionType::Decay);
    }

    #[test]
    fn concurrent_debits_never_overdraw() {
        let l = ledger();
        l.credit(1, 1, 1000, TransactionType::AdminAdjustment, None).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let l = Arc::clone(&l);
                std::thread::spawn(move || {
                    (0..50)
                        .filter(|_| {
                            l.debit(1, 1, 10, TransactionType::WagerPlacement, None, Overdraft::Reject)
                                .is_ok()
                        })
                        .count()
                })
            })
            .collect();
        let succeeded: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();

        assert_eq!(succeeded, 100);
        assert_eq!(l.balance(1, 1), 0);
    }
}
