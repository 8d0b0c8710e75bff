//! In-process store used by the test-suite and database-less runs.
//!
//! A single async mutex guards the whole state; every operation reads and
//! validates first, then writes, so a failed operation leaves nothing behind.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::error::DatabaseError;
use super::models::{
    AffiliateHistory, CommissionStatus, FinalizeOutcome, NewTransaction, NewWithdrawal,
    PayoutConfirmation, PayoutRecord, Transaction, TransactionStatus, TransitionOutcome,
    UserAccount, Wallet, Withdrawal, WithdrawalOutcome, WithdrawalStatus,
};
use super::store::{chrono_duration, AccountStore, StoreResult, TransactionStore, WithdrawalStore};
use crate::services::ledger::{debit_balance, DepositContext, LedgerPoster};

#[derive(Default)]
struct State {
    transactions: HashMap<String, Transaction>,
    withdrawals: HashMap<Uuid, Withdrawal>,
    withdrawal_index: HashMap<String, Uuid>,
    users: HashMap<i64, UserAccount>,
    wallets: HashMap<i64, Wallet>,
    affiliate_histories: HashMap<Uuid, AffiliateHistory>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_user(&self, user: UserAccount) {
        self.state.lock().await.users.insert(user.id, user);
    }

    pub async fn insert_wallet(&self, wallet: Wallet) {
        self.state.lock().await.wallets.insert(wallet.user_id, wallet);
    }

    pub async fn insert_affiliate_history(&self, history: AffiliateHistory) {
        self.state
            .lock()
            .await
            .affiliate_histories
            .insert(history.id, history);
    }

    pub async fn affiliate_history(&self, id: Uuid) -> Option<AffiliateHistory> {
        self.state.lock().await.affiliate_histories.get(&id).cloned()
    }

    /// Shift a transaction's creation time into the past.
    pub async fn backdate_transaction(&self, external_id: &str, age: chrono::Duration) -> bool {
        let mut state = self.state.lock().await;
        match state.transactions.get_mut(external_id) {
            Some(tx) => {
                tx.created_at = tx.created_at - age;
                true
            }
            None => false,
        }
    }
}

fn invalid_transition(entity: &'static str, id: impl ToString, from: &str, to: &str) -> DatabaseError {
    DatabaseError::InvalidTransition {
        entity,
        id: id.to_string(),
        from: from.to_string(),
        to: to.to_string(),
    }
}

#[async_trait]
impl TransactionStore for MemoryStore {
    async fn create_pending(&self, new: NewTransaction) -> StoreResult<Transaction> {
        let mut state = self.state.lock().await;
        if state.transactions.contains_key(&new.external_id) {
            return Err(DatabaseError::DuplicateExternalId(new.external_id));
        }
        let tx = new.into_pending(Utc::now());
        state.transactions.insert(tx.external_id.clone(), tx.clone());
        Ok(tx)
    }

    async fn find_by_external_id(&self, external_id: &str) -> StoreResult<Option<Transaction>> {
        Ok(self.state.lock().await.transactions.get(external_id).cloned())
    }

    async fn pending_batch(&self, max_age: Duration, limit: i64) -> StoreResult<Vec<Transaction>> {
        let cutoff = Utc::now() - chrono_duration(max_age)?;
        let state = self.state.lock().await;

        let mut pending: Vec<Transaction> = state
            .transactions
            .values()
            .filter(|tx| tx.status == TransactionStatus::Pending && tx.created_at > cutoff)
            .cloned()
            .collect();
        pending.sort_by_key(|tx| tx.created_at);
        pending.truncate(limit.max(0) as usize);
        Ok(pending)
    }

    async fn finalize_deposit(
        &self,
        external_id: &str,
        poster: &LedgerPoster,
    ) -> StoreResult<FinalizeOutcome> {
        let mut state = self.state.lock().await;

        let tx = state
            .transactions
            .get(external_id)
            .cloned()
            .ok_or_else(|| DatabaseError::not_found("transaction", external_id))?;

        match tx.status {
            TransactionStatus::Paid => {
                return Ok(FinalizeOutcome {
                    already_finalized: true,
                    transaction: tx,
                    posting: None,
                })
            }
            TransactionStatus::Failed => {
                return Err(invalid_transition("transaction", external_id, tx.status.as_str(), "paid"))
            }
            TransactionStatus::Pending => {}
        }

        let wallet = state
            .wallets
            .get(&tx.user_id)
            .cloned()
            .ok_or_else(|| DatabaseError::not_found("wallet", tx.user_id))?;

        let prior_paid_deposits = state
            .transactions
            .values()
            .filter(|t| t.user_id == tx.user_id && t.status == TransactionStatus::Paid)
            .count() as i64;

        let pending_cpa = state
            .affiliate_histories
            .values()
            .find(|h| {
                h.user_id == tx.user_id
                    && h.commission_type == "cpa"
                    && h.status == CommissionStatus::Pending
            })
            .cloned();

        let sponsor = pending_cpa
            .as_ref()
            .filter(|h| h.inviter_id != tx.user_id)
            .and_then(|h| state.users.get(&h.inviter_id).cloned());
        let sponsor_wallet = sponsor
            .as_ref()
            .and_then(|s| state.wallets.get(&s.id).cloned());

        let mut ctx = DepositContext {
            wallet,
            prior_paid_deposits,
            pending_cpa,
            sponsor,
            sponsor_wallet,
        };
        let posting = poster.apply_deposit_effects(&tx, &mut ctx);

        if let Some(sponsor_wallet) = ctx.sponsor_wallet {
            state.wallets.insert(sponsor_wallet.user_id, sponsor_wallet);
        }
        state.wallets.insert(ctx.wallet.user_id, ctx.wallet);
        if let Some(history) = ctx.pending_cpa {
            state.affiliate_histories.insert(history.id, history);
        }

        let mut finalized = tx;
        finalized.status = TransactionStatus::Paid;
        finalized.updated_at = Utc::now();
        state
            .transactions
            .insert(finalized.external_id.clone(), finalized.clone());

        Ok(FinalizeOutcome {
            already_finalized: false,
            transaction: finalized,
            posting: Some(posting),
        })
    }

    async fn mark_failed(&self, external_id: &str) -> StoreResult<TransitionOutcome> {
        let mut state = self.state.lock().await;
        let tx = state
            .transactions
            .get_mut(external_id)
            .ok_or_else(|| DatabaseError::not_found("transaction", external_id))?;

        if !tx.status.can_transition_to(&TransactionStatus::Failed) {
            return Ok(TransitionOutcome {
                changed: false,
                transaction: tx.clone(),
            });
        }

        tx.status = TransactionStatus::Failed;
        tx.updated_at = Utc::now();
        Ok(TransitionOutcome {
            changed: true,
            transaction: tx.clone(),
        })
    }
}

#[async_trait]
impl WithdrawalStore for MemoryStore {
    async fn create_withdrawal(&self, new: NewWithdrawal) -> StoreResult<Withdrawal> {
        let mut state = self.state.lock().await;

        let mut wallet = state
            .wallets
            .get(&new.user_id)
            .cloned()
            .ok_or_else(|| DatabaseError::not_found("wallet", new.user_id))?;
        debit_balance(&mut wallet, &new.amount)?;

        let withdrawal = new.into_pending(Utc::now());
        state.wallets.insert(wallet.user_id, wallet);
        state
            .withdrawal_index
            .insert(withdrawal.payout_reference(), withdrawal.id);
        state.withdrawals.insert(withdrawal.id, withdrawal.clone());
        Ok(withdrawal)
    }

    async fn find_withdrawal(&self, id: Uuid) -> StoreResult<Option<Withdrawal>> {
        Ok(self.state.lock().await.withdrawals.get(&id).cloned())
    }

    async fn find_withdrawal_by_external_id(&self, external_id: &str) -> StoreResult<Option<Withdrawal>> {
        let state = self.state.lock().await;
        Ok(state
            .withdrawal_index
            .get(external_id)
            .and_then(|id| state.withdrawals.get(id))
            .cloned())
    }

    async fn claim_payout(&self, id: Uuid, actor: &str, lock_timeout: Duration) -> StoreResult<Withdrawal> {
        let timeout = chrono_duration(lock_timeout)?;
        let now = Utc::now();
        let mut state = self.state.lock().await;

        let withdrawal = state
            .withdrawals
            .get_mut(&id)
            .ok_or_else(|| DatabaseError::not_found("withdrawal", id))?;

        if withdrawal.status != WithdrawalStatus::Pending {
            return Err(invalid_transition("withdrawal", id, withdrawal.status.as_str(), "paid"));
        }
        if withdrawal.metadata.is_locked(now, timeout) {
            return Err(DatabaseError::Locked(id.to_string()));
        }

        withdrawal.metadata.locked_at = Some(now);
        withdrawal.metadata.locked_by = Some(actor.to_string());
        withdrawal.metadata.external_id = Some(withdrawal.payout_reference());
        withdrawal.updated_at = now;
        Ok(withdrawal.clone())
    }

    async fn release_payout_claim(&self, id: Uuid) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        let withdrawal = state
            .withdrawals
            .get_mut(&id)
            .ok_or_else(|| DatabaseError::not_found("withdrawal", id))?;
        withdrawal.metadata.release_lock();
        withdrawal.updated_at = Utc::now();
        Ok(())
    }

    async fn mark_withdrawal_paid(&self, id: Uuid, record: PayoutRecord) -> StoreResult<Withdrawal> {
        let mut state = self.state.lock().await;

        if let Some(owner) = state.withdrawal_index.get(&record.external_id) {
            if *owner != id {
                return Err(DatabaseError::DuplicateExternalId(record.external_id));
            }
        }

        let withdrawal = state
            .withdrawals
            .get_mut(&id)
            .ok_or_else(|| DatabaseError::not_found("withdrawal", id))?;

        if withdrawal.status == WithdrawalStatus::Cancelled {
            return Err(invalid_transition("withdrawal", id, withdrawal.status.as_str(), "paid"));
        }

        // A webhook may have confirmed the payout first; merge rather than fail.
        let now = Utc::now();
        withdrawal.status = WithdrawalStatus::Paid;
        withdrawal.metadata.transaction_id = record.transaction_id;
        withdrawal.metadata.external_id = Some(record.external_id.clone());
        withdrawal.metadata.message = Some(record.message);
        withdrawal.metadata.processed_at = Some(now);
        withdrawal.metadata.processed_by = Some(record.processed_by);
        withdrawal.metadata.release_lock();
        withdrawal.updated_at = now;
        let paid = withdrawal.clone();

        state.withdrawal_index.insert(record.external_id, id);
        Ok(paid)
    }

    async fn confirm_payout(
        &self,
        external_id: &str,
        confirmation: PayoutConfirmation,
    ) -> StoreResult<WithdrawalOutcome> {
        let mut state = self.state.lock().await;

        let id = *state
            .withdrawal_index
            .get(external_id)
            .ok_or_else(|| DatabaseError::not_found("withdrawal", external_id))?;
        let withdrawal = state
            .withdrawals
            .get_mut(&id)
            .ok_or_else(|| DatabaseError::not_found("withdrawal", external_id))?;

        let already_applied = match withdrawal.status {
            WithdrawalStatus::Cancelled => {
                return Err(invalid_transition("withdrawal", id, withdrawal.status.as_str(), "paid"))
            }
            WithdrawalStatus::Paid => true,
            WithdrawalStatus::Pending => false,
        };

        let now = Utc::now();
        withdrawal.status = WithdrawalStatus::Paid;
        withdrawal.metadata.webhook_confirmed_at = Some(now);
        withdrawal.metadata.webhook_transaction_id = confirmation.transaction_id;
        withdrawal.metadata.webhook_status_id = Some(confirmation.status_id);
        withdrawal.updated_at = now;

        Ok(WithdrawalOutcome {
            already_applied,
            withdrawal: withdrawal.clone(),
        })
    }

    async fn cancel_withdrawal(
        &self,
        id: Uuid,
        actor: &str,
        lock_timeout: Duration,
        poster: &LedgerPoster,
    ) -> StoreResult<WithdrawalOutcome> {
        let timeout = chrono_duration(lock_timeout)?;
        let mut state = self.state.lock().await;

        let withdrawal = state
            .withdrawals
            .get(&id)
            .cloned()
            .ok_or_else(|| DatabaseError::not_found("withdrawal", id))?;

        match withdrawal.status {
            WithdrawalStatus::Cancelled => {
                return Ok(WithdrawalOutcome {
                    already_applied: true,
                    withdrawal,
                })
            }
            WithdrawalStatus::Paid => {
                return Err(invalid_transition("withdrawal", id, withdrawal.status.as_str(), "cancelled"))
            }
            WithdrawalStatus::Pending => {}
        }

        let now = Utc::now();
        if withdrawal.metadata.is_locked(now, timeout) {
            return Err(DatabaseError::Locked(id.to_string()));
        }

        let mut wallet = state
            .wallets
            .get(&withdrawal.user_id)
            .cloned()
            .ok_or_else(|| DatabaseError::not_found("wallet", withdrawal.user_id))?;
        let refunded = poster.apply_withdrawal_refund(&withdrawal, &mut wallet);

        let mut cancelled = withdrawal;
        cancelled.status = WithdrawalStatus::Cancelled;
        cancelled.metadata.cancelled_at = Some(now);
        cancelled.metadata.cancelled_by = Some(actor.to_string());
        cancelled.metadata.amount_returned = Some(refunded);
        cancelled.updated_at = now;

        state.wallets.insert(wallet.user_id, wallet);
        state.withdrawals.insert(id, cancelled.clone());

        Ok(WithdrawalOutcome {
            already_applied: false,
            withdrawal: cancelled,
        })
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn find_user(&self, user_id: i64) -> StoreResult<Option<UserAccount>> {
        Ok(self.state.lock().await.users.get(&user_id).cloned())
    }

    async fn find_wallet(&self, user_id: i64) -> StoreResult<Option<Wallet>> {
        Ok(self.state.lock().await.wallets.get(&user_id).cloned())
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}
