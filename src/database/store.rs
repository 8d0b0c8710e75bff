use async_trait::async_trait;
use std::time::Duration;
use uuid::Uuid;

use super::error::DatabaseError;
use super::models::{
    FinalizeOutcome, NewTransaction, NewWithdrawal, PayoutConfirmation, PayoutRecord, Transaction,
    TransitionOutcome, UserAccount, Wallet, Withdrawal, WithdrawalOutcome,
};
use crate::services::ledger::LedgerPoster;

pub type StoreResult<T> = Result<T, DatabaseError>;

/// Deposit records keyed by the gateway's external id.
#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Fails with `DuplicateExternalId` when the id is already known.
    async fn create_pending(&self, new: NewTransaction) -> StoreResult<Transaction>;

    async fn find_by_external_id(&self, external_id: &str) -> StoreResult<Option<Transaction>>;

    /// Oldest pending transactions created within `max_age`.
    async fn pending_batch(&self, max_age: Duration, limit: i64) -> StoreResult<Vec<Transaction>>;

    /// Atomically move a transaction to Paid and apply its ledger effects.
    ///
    /// A transaction that is already Paid is returned untouched with
    /// `already_finalized = true`. A Failed transaction yields
    /// `InvalidTransition`.
    async fn finalize_deposit(
        &self,
        external_id: &str,
        poster: &LedgerPoster,
    ) -> StoreResult<FinalizeOutcome>;

    /// Pending → Failed. Terminal transactions are returned unchanged.
    async fn mark_failed(&self, external_id: &str) -> StoreResult<TransitionOutcome>;
}

#[async_trait]
pub trait WithdrawalStore: Send + Sync {
    /// Debit the user's balance and create a Pending withdrawal atomically.
    async fn create_withdrawal(&self, new: NewWithdrawal) -> StoreResult<Withdrawal>;

    async fn find_withdrawal(&self, id: Uuid) -> StoreResult<Option<Withdrawal>>;

    /// Resolves either our payout reference or the provider's external id.
    async fn find_withdrawal_by_external_id(&self, external_id: &str) -> StoreResult<Option<Withdrawal>>;

    /// Take the payout claim on a Pending withdrawal so only one approver
    /// talks to the gateway. Stale claims older than `lock_timeout` are
    /// taken over.
    async fn claim_payout(&self, id: Uuid, actor: &str, lock_timeout: Duration) -> StoreResult<Withdrawal>;

    async fn release_payout_claim(&self, id: Uuid) -> StoreResult<()>;

    /// Pending → Paid with the gateway's acceptance recorded and indexed.
    async fn mark_withdrawal_paid(&self, id: Uuid, record: PayoutRecord) -> StoreResult<Withdrawal>;

    /// Record a webhook payout confirmation, addressed like
    /// `find_withdrawal_by_external_id`.
    async fn confirm_payout(
        &self,
        external_id: &str,
        confirmation: PayoutConfirmation,
    ) -> StoreResult<WithdrawalOutcome>;

    /// Pending → Cancelled with the amount refunded, atomically.
    /// Cancelling twice is a no-op; a Paid withdrawal cannot be cancelled,
    /// nor can one whose payout claim is younger than `lock_timeout`.
    async fn cancel_withdrawal(
        &self,
        id: Uuid,
        actor: &str,
        lock_timeout: Duration,
        poster: &LedgerPoster,
    ) -> StoreResult<WithdrawalOutcome>;
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn find_user(&self, user_id: i64) -> StoreResult<Option<UserAccount>>;

    async fn find_wallet(&self, user_id: i64) -> StoreResult<Option<Wallet>>;

    /// Cheap reachability check for health reporting.
    async fn ping(&self) -> StoreResult<()>;
}

/// A backend implementing every store.
pub trait Store: TransactionStore + WithdrawalStore + AccountStore {}

impl<T> Store for T where T: TransactionStore + WithdrawalStore + AccountStore {}

pub(crate) fn chrono_duration(duration: Duration) -> StoreResult<chrono::Duration> {
    chrono::Duration::from_std(duration)
        .map_err(|e| DatabaseError::Internal(format!("duration out of range: {}", e)))
}
