//! Postgres implementation of the stores.
//!
//! Every check-and-set runs inside one database transaction holding
//! `SELECT ... FOR UPDATE` row locks, so a webhook and a poll racing on the
//! same external id serialize on the transaction row. Wallet rows are always
//! locked after the record that triggers the change.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgConnection, PgPoolOptions};
use sqlx::{FromRow, PgPool};
use std::str::FromStr;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

use super::error::DatabaseError;
use super::models::{
    AffiliateHistory, CommissionStatus, FinalizeOutcome, NewTransaction, NewWithdrawal,
    PayoutConfirmation, PayoutRecord, Transaction, TransactionStatus, TransitionOutcome,
    UserAccount, Wallet, Withdrawal, WithdrawalMetadata, WithdrawalOutcome, WithdrawalStatus,
};
use super::store::{chrono_duration, AccountStore, StoreResult, TransactionStore, WithdrawalStore};
use crate::middleware::logging::log_database_query;
use crate::payments::PixKeyType;
use crate::services::ledger::{debit_balance, DepositContext, LedgerPoster};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, DatabaseError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await?;
        info!(max_connections, "Database pool created");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<(), DatabaseError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| DatabaseError::Internal(format!("migration failed: {}", e)))
    }
}

// ---------------------------------------------------------------------------
// Rows
// ---------------------------------------------------------------------------

#[derive(Debug, FromRow)]
struct TransactionRow {
    id: Uuid,
    external_id: String,
    payment_id: Option<String>,
    user_id: i64,
    amount: BigDecimal,
    currency: String,
    method: String,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TransactionRow {
    fn into_domain(self) -> StoreResult<Transaction> {
        let status = TransactionStatus::from_str(&self.status)
            .ok_or_else(|| DatabaseError::Internal(format!("unknown transaction status '{}'", self.status)))?;
        Ok(Transaction {
            id: self.id,
            external_id: self.external_id,
            payment_id: self.payment_id,
            user_id: self.user_id,
            amount: self.amount,
            currency: self.currency,
            method: self.method,
            status,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct WithdrawalRow {
    id: Uuid,
    user_id: i64,
    amount: BigDecimal,
    pix_key: String,
    pix_key_type: String,
    currency: String,
    status: String,
    metadata: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl WithdrawalRow {
    fn into_domain(self) -> StoreResult<Withdrawal> {
        let status = WithdrawalStatus::from_str(&self.status)
            .ok_or_else(|| DatabaseError::Internal(format!("unknown withdrawal status '{}'", self.status)))?;
        let pix_key_type = PixKeyType::from_str(&self.pix_key_type).map_err(DatabaseError::Internal)?;
        Ok(Withdrawal {
            id: self.id,
            user_id: self.user_id,
            amount: self.amount,
            pix_key: self.pix_key,
            pix_key_type,
            currency: self.currency,
            status,
            metadata: WithdrawalMetadata::from_json(&self.metadata)?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct UserRow {
    id: i64,
    name: String,
    inviter_id: Option<i64>,
    affiliate_baseline: BigDecimal,
    affiliate_cpa: BigDecimal,
}

impl From<UserRow> for UserAccount {
    fn from(row: UserRow) -> Self {
        UserAccount {
            id: row.id,
            name: row.name,
            inviter_id: row.inviter_id,
            affiliate_baseline: row.affiliate_baseline,
            affiliate_cpa: row.affiliate_cpa,
        }
    }
}

#[derive(Debug, FromRow)]
struct WalletRow {
    user_id: i64,
    currency: String,
    balance: BigDecimal,
    balance_bonus: BigDecimal,
    balance_bonus_rollover: BigDecimal,
    balance_deposit_rollover: BigDecimal,
    vip_points: BigDecimal,
    refer_rewards: BigDecimal,
}

impl From<WalletRow> for Wallet {
    fn from(row: WalletRow) -> Self {
        Wallet {
            user_id: row.user_id,
            currency: row.currency,
            balance: row.balance,
            balance_bonus: row.balance_bonus,
            balance_bonus_rollover: row.balance_bonus_rollover,
            balance_deposit_rollover: row.balance_deposit_rollover,
            vip_points: row.vip_points,
            refer_rewards: row.refer_rewards,
        }
    }
}

#[derive(Debug, FromRow)]
struct AffiliateRow {
    id: Uuid,
    user_id: i64,
    inviter_id: i64,
    commission_type: String,
    status: String,
    deposited_amount: BigDecimal,
    commission_paid: BigDecimal,
}

impl AffiliateRow {
    fn into_domain(self) -> StoreResult<AffiliateHistory> {
        let status = CommissionStatus::from_str(&self.status)
            .ok_or_else(|| DatabaseError::Internal(format!("unknown commission status '{}'", self.status)))?;
        Ok(AffiliateHistory {
            id: self.id,
            user_id: self.user_id,
            inviter_id: self.inviter_id,
            commission_type: self.commission_type,
            status,
            deposited_amount: self.deposited_amount,
            commission_paid: self.commission_paid,
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn unique_violation(err: sqlx::Error, on_unique: impl FnOnce() -> DatabaseError) -> DatabaseError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            return on_unique();
        }
    }
    DatabaseError::Query(err)
}

fn invalid_transition(entity: &'static str, id: impl ToString, from: &str, to: &str) -> DatabaseError {
    DatabaseError::InvalidTransition {
        entity,
        id: id.to_string(),
        from: from.to_string(),
        to: to.to_string(),
    }
}

async fn lock_wallet(conn: &mut PgConnection, user_id: i64) -> StoreResult<Option<Wallet>> {
    let row = sqlx::query_as::<_, WalletRow>("SELECT * FROM wallets WHERE user_id = $1 FOR UPDATE")
        .bind(user_id)
        .fetch_optional(conn)
        .await?;
    Ok(row.map(Wallet::from))
}

async fn save_wallet(conn: &mut PgConnection, wallet: &Wallet) -> StoreResult<()> {
    sqlx::query(
        r#"
        UPDATE wallets
        SET balance = $2,
            balance_bonus = $3,
            balance_bonus_rollover = $4,
            balance_deposit_rollover = $5,
            vip_points = $6,
            refer_rewards = $7,
            updated_at = NOW()
        WHERE user_id = $1
        "#,
    )
    .bind(wallet.user_id)
    .bind(&wallet.balance)
    .bind(&wallet.balance_bonus)
    .bind(&wallet.balance_bonus_rollover)
    .bind(&wallet.balance_deposit_rollover)
    .bind(&wallet.vip_points)
    .bind(&wallet.refer_rewards)
    .execute(conn)
    .await?;
    Ok(())
}

async fn lock_withdrawal(conn: &mut PgConnection, id: Uuid) -> StoreResult<Withdrawal> {
    sqlx::query_as::<_, WithdrawalRow>("SELECT * FROM withdrawals WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| DatabaseError::not_found("withdrawal", id))?
        .into_domain()
}

async fn save_withdrawal(conn: &mut PgConnection, withdrawal: &Withdrawal) -> StoreResult<Withdrawal> {
    let external_id = withdrawal.metadata.external_id.clone();
    sqlx::query_as::<_, WithdrawalRow>(
        r#"
        UPDATE withdrawals
        SET status = $2,
            metadata = $3,
            gateway_external_id = $4,
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(withdrawal.id)
    .bind(withdrawal.status.as_str())
    .bind(withdrawal.metadata.to_json())
    .bind(&external_id)
    .fetch_one(conn)
    .await
    .map_err(|e| {
        unique_violation(e, || {
            DatabaseError::DuplicateExternalId(external_id.clone().unwrap_or_default())
        })
    })?
    .into_domain()
}

// ---------------------------------------------------------------------------
// TransactionStore
// ---------------------------------------------------------------------------

#[async_trait]
impl TransactionStore for PgStore {
    async fn create_pending(&self, new: NewTransaction) -> StoreResult<Transaction> {
        let tx = new.into_pending(Utc::now());

        let row = log_database_query(
            "INSERT INTO transactions",
            sqlx::query_as::<_, TransactionRow>(
                r#"
                INSERT INTO transactions (
                    id, external_id, payment_id, user_id, amount, currency,
                    method, status, created_at, updated_at
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                RETURNING *
                "#,
            )
            .bind(tx.id)
            .bind(&tx.external_id)
            .bind(&tx.payment_id)
            .bind(tx.user_id)
            .bind(&tx.amount)
            .bind(&tx.currency)
            .bind(&tx.method)
            .bind(tx.status.as_str())
            .bind(tx.created_at)
            .bind(tx.updated_at)
            .fetch_one(&self.pool),
        )
        .await
        .map_err(|e| unique_violation(e, || DatabaseError::DuplicateExternalId(tx.external_id.clone())))?;

        row.into_domain()
    }

    async fn find_by_external_id(&self, external_id: &str) -> StoreResult<Option<Transaction>> {
        sqlx::query_as::<_, TransactionRow>("SELECT * FROM transactions WHERE external_id = $1")
            .bind(external_id)
            .fetch_optional(&self.pool)
            .await?
            .map(TransactionRow::into_domain)
            .transpose()
    }

    async fn pending_batch(&self, max_age: Duration, limit: i64) -> StoreResult<Vec<Transaction>> {
        let cutoff = Utc::now() - chrono_duration(max_age)?;

        let rows = log_database_query(
            "SELECT pending transactions",
            sqlx::query_as::<_, TransactionRow>(
                r#"
                SELECT * FROM transactions
                WHERE status = 'pending'
                AND created_at > $1
                ORDER BY created_at ASC
                LIMIT $2
                "#,
            )
            .bind(cutoff)
            .bind(limit)
            .fetch_all(&self.pool),
        )
        .await?;

        rows.into_iter().map(TransactionRow::into_domain).collect()
    }

    async fn finalize_deposit(
        &self,
        external_id: &str,
        poster: &LedgerPoster,
    ) -> StoreResult<FinalizeOutcome> {
        let mut db_tx = self.pool.begin().await?;

        let tx = sqlx::query_as::<_, TransactionRow>(
            "SELECT * FROM transactions WHERE external_id = $1 FOR UPDATE",
        )
        .bind(external_id)
        .fetch_optional(&mut *db_tx)
        .await?
        .ok_or_else(|| DatabaseError::not_found("transaction", external_id))?
        .into_domain()?;

        match tx.status {
            TransactionStatus::Paid => {
                db_tx.rollback().await?;
                return Ok(FinalizeOutcome {
                    already_finalized: true,
                    transaction: tx,
                    posting: None,
                });
            }
            TransactionStatus::Failed => {
                return Err(invalid_transition("transaction", external_id, tx.status.as_str(), "paid"));
            }
            TransactionStatus::Pending => {}
        }

        let wallet = lock_wallet(&mut db_tx, tx.user_id)
            .await?
            .ok_or_else(|| DatabaseError::not_found("wallet", tx.user_id))?;

        let prior_paid_deposits: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM transactions WHERE user_id = $1 AND status = 'paid'",
        )
        .bind(tx.user_id)
        .fetch_one(&mut *db_tx)
        .await?;

        let pending_cpa = sqlx::query_as::<_, AffiliateRow>(
            r#"
            SELECT * FROM affiliate_histories
            WHERE user_id = $1
            AND commission_type = 'cpa'
            AND status = 'pending'
            ORDER BY created_at ASC
            LIMIT 1
            FOR UPDATE
            "#,
        )
        .bind(tx.user_id)
        .fetch_optional(&mut *db_tx)
        .await?
        .map(AffiliateRow::into_domain)
        .transpose()?;

        let (sponsor, sponsor_wallet) = match &pending_cpa {
            Some(history) if history.inviter_id != tx.user_id => {
                let sponsor = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE id = $1")
                    .bind(history.inviter_id)
                    .fetch_optional(&mut *db_tx)
                    .await?
                    .map(UserAccount::from);
                let sponsor_wallet = match &sponsor {
                    Some(s) => lock_wallet(&mut db_tx, s.id).await?,
                    None => None,
                };
                (sponsor, sponsor_wallet)
            }
            _ => (None, None),
        };

        let mut ctx = DepositContext {
            wallet,
            prior_paid_deposits,
            pending_cpa,
            sponsor,
            sponsor_wallet,
        };
        let posting = poster.apply_deposit_effects(&tx, &mut ctx);

        save_wallet(&mut db_tx, &ctx.wallet).await?;
        if let Some(sponsor_wallet) = &ctx.sponsor_wallet {
            save_wallet(&mut db_tx, sponsor_wallet).await?;
        }
        if let Some(history) = &ctx.pending_cpa {
            sqlx::query(
                r#"
                UPDATE affiliate_histories
                SET status = $2, deposited_amount = $3, commission_paid = $4, updated_at = NOW()
                WHERE id = $1
                "#,
            )
            .bind(history.id)
            .bind(history.status.as_str())
            .bind(&history.deposited_amount)
            .bind(&history.commission_paid)
            .execute(&mut *db_tx)
            .await?;
        }

        let finalized = sqlx::query_as::<_, TransactionRow>(
            "UPDATE transactions SET status = 'paid', updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(tx.id)
        .fetch_one(&mut *db_tx)
        .await?
        .into_domain()?;

        db_tx.commit().await?;

        Ok(FinalizeOutcome {
            already_finalized: false,
            transaction: finalized,
            posting: Some(posting),
        })
    }

    async fn mark_failed(&self, external_id: &str) -> StoreResult<TransitionOutcome> {
        let updated = sqlx::query_as::<_, TransactionRow>(
            r#"
            UPDATE transactions
            SET status = 'failed', updated_at = NOW()
            WHERE external_id = $1 AND status = 'pending'
            RETURNING *
            "#,
        )
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = updated {
            return Ok(TransitionOutcome {
                changed: true,
                transaction: row.into_domain()?,
            });
        }

        let current = self
            .find_by_external_id(external_id)
            .await?
            .ok_or_else(|| DatabaseError::not_found("transaction", external_id))?;
        Ok(TransitionOutcome {
            changed: false,
            transaction: current,
        })
    }
}

// ---------------------------------------------------------------------------
// WithdrawalStore
// ---------------------------------------------------------------------------

#[async_trait]
impl WithdrawalStore for PgStore {
    async fn create_withdrawal(&self, new: NewWithdrawal) -> StoreResult<Withdrawal> {
        let mut db_tx = self.pool.begin().await?;

        let mut wallet = lock_wallet(&mut db_tx, new.user_id)
            .await?
            .ok_or_else(|| DatabaseError::not_found("wallet", new.user_id))?;
        debit_balance(&mut wallet, &new.amount)?;
        save_wallet(&mut db_tx, &wallet).await?;

        let withdrawal = new.into_pending(Utc::now());
        let row = sqlx::query_as::<_, WithdrawalRow>(
            r#"
            INSERT INTO withdrawals (
                id, user_id, amount, pix_key, pix_key_type, currency,
                status, metadata, created_at, updated_at, payout_reference
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING *
            "#,
        )
        .bind(withdrawal.id)
        .bind(withdrawal.user_id)
        .bind(&withdrawal.amount)
        .bind(&withdrawal.pix_key)
        .bind(withdrawal.pix_key_type.as_str())
        .bind(&withdrawal.currency)
        .bind(withdrawal.status.as_str())
        .bind(withdrawal.metadata.to_json())
        .bind(withdrawal.created_at)
        .bind(withdrawal.updated_at)
        .bind(withdrawal.payout_reference())
        .fetch_one(&mut *db_tx)
        .await?;

        db_tx.commit().await?;
        row.into_domain()
    }

    async fn find_withdrawal(&self, id: Uuid) -> StoreResult<Option<Withdrawal>> {
        sqlx::query_as::<_, WithdrawalRow>("SELECT * FROM withdrawals WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(WithdrawalRow::into_domain)
            .transpose()
    }

    async fn find_withdrawal_by_external_id(&self, external_id: &str) -> StoreResult<Option<Withdrawal>> {
        sqlx::query_as::<_, WithdrawalRow>(
            "SELECT * FROM withdrawals WHERE gateway_external_id = $1 OR payout_reference = $1",
        )
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await?
        .map(WithdrawalRow::into_domain)
        .transpose()
    }

    async fn claim_payout(&self, id: Uuid, actor: &str, lock_timeout: Duration) -> StoreResult<Withdrawal> {
        let timeout = chrono_duration(lock_timeout)?;
        let mut db_tx = self.pool.begin().await?;

        let mut withdrawal = lock_withdrawal(&mut db_tx, id).await?;
        if withdrawal.status != WithdrawalStatus::Pending {
            return Err(invalid_transition("withdrawal", id, withdrawal.status.as_str(), "paid"));
        }
        let now = Utc::now();
        if withdrawal.metadata.is_locked(now, timeout) {
            return Err(DatabaseError::Locked(id.to_string()));
        }

        withdrawal.metadata.locked_at = Some(now);
        withdrawal.metadata.locked_by = Some(actor.to_string());
        withdrawal.metadata.external_id = Some(withdrawal.payout_reference());
        let claimed = save_withdrawal(&mut db_tx, &withdrawal).await?;

        db_tx.commit().await?;
        Ok(claimed)
    }

    async fn release_payout_claim(&self, id: Uuid) -> StoreResult<()> {
        let mut db_tx = self.pool.begin().await?;
        let mut withdrawal = lock_withdrawal(&mut db_tx, id).await?;
        withdrawal.metadata.release_lock();
        save_withdrawal(&mut db_tx, &withdrawal).await?;
        db_tx.commit().await?;
        Ok(())
    }

    async fn mark_withdrawal_paid(&self, id: Uuid, record: PayoutRecord) -> StoreResult<Withdrawal> {
        let mut db_tx = self.pool.begin().await?;

        let mut withdrawal = lock_withdrawal(&mut db_tx, id).await?;
        if withdrawal.status == WithdrawalStatus::Cancelled {
            return Err(invalid_transition("withdrawal", id, withdrawal.status.as_str(), "paid"));
        }

        // A webhook may have confirmed the payout first; merge rather than fail.
        withdrawal.status = WithdrawalStatus::Paid;
        withdrawal.metadata.transaction_id = record.transaction_id;
        withdrawal.metadata.external_id = Some(record.external_id);
        withdrawal.metadata.message = Some(record.message);
        withdrawal.metadata.processed_at = Some(Utc::now());
        withdrawal.metadata.processed_by = Some(record.processed_by);
        withdrawal.metadata.release_lock();
        let paid = save_withdrawal(&mut db_tx, &withdrawal).await?;

        db_tx.commit().await?;
        Ok(paid)
    }

    async fn confirm_payout(
        &self,
        external_id: &str,
        confirmation: PayoutConfirmation,
    ) -> StoreResult<WithdrawalOutcome> {
        let mut db_tx = self.pool.begin().await?;

        let mut withdrawal = sqlx::query_as::<_, WithdrawalRow>(
            "SELECT * FROM withdrawals WHERE gateway_external_id = $1 OR payout_reference = $1 FOR UPDATE",
        )
        .bind(external_id)
        .fetch_optional(&mut *db_tx)
        .await?
        .ok_or_else(|| DatabaseError::not_found("withdrawal", external_id))?
        .into_domain()?;

        let already_applied = match withdrawal.status {
            WithdrawalStatus::Cancelled => {
                return Err(invalid_transition(
                    "withdrawal",
                    withdrawal.id,
                    withdrawal.status.as_str(),
                    "paid",
                ))
            }
            WithdrawalStatus::Paid => true,
            WithdrawalStatus::Pending => false,
        };

        withdrawal.status = WithdrawalStatus::Paid;
        withdrawal.metadata.webhook_confirmed_at = Some(Utc::now());
        withdrawal.metadata.webhook_transaction_id = confirmation.transaction_id;
        withdrawal.metadata.webhook_status_id = Some(confirmation.status_id);
        let confirmed = save_withdrawal(&mut db_tx, &withdrawal).await?;

        db_tx.commit().await?;
        Ok(WithdrawalOutcome {
            already_applied,
            withdrawal: confirmed,
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
        let mut db_tx = self.pool.begin().await?;

        let mut withdrawal = lock_withdrawal(&mut db_tx, id).await?;
        match withdrawal.status {
            WithdrawalStatus::Cancelled => {
                db_tx.rollback().await?;
                return Ok(WithdrawalOutcome {
                    already_applied: true,
                    withdrawal,
                });
            }
            WithdrawalStatus::Paid => {
                return Err(invalid_transition("withdrawal", id, withdrawal.status.as_str(), "cancelled"));
            }
            WithdrawalStatus::Pending => {}
        }

        let now = Utc::now();
        if withdrawal.metadata.is_locked(now, timeout) {
            return Err(DatabaseError::Locked(id.to_string()));
        }

        let mut wallet = lock_wallet(&mut db_tx, withdrawal.user_id)
            .await?
            .ok_or_else(|| DatabaseError::not_found("wallet", withdrawal.user_id))?;
        let refunded = poster.apply_withdrawal_refund(&withdrawal, &mut wallet);
        save_wallet(&mut db_tx, &wallet).await?;

        withdrawal.status = WithdrawalStatus::Cancelled;
        withdrawal.metadata.cancelled_at = Some(now);
        withdrawal.metadata.cancelled_by = Some(actor.to_string());
        withdrawal.metadata.amount_returned = Some(refunded);
        let cancelled = save_withdrawal(&mut db_tx, &withdrawal).await?;

        db_tx.commit().await?;
        Ok(WithdrawalOutcome {
            already_applied: false,
            withdrawal: cancelled,
        })
    }
}

// ---------------------------------------------------------------------------
// AccountStore
// ---------------------------------------------------------------------------

#[async_trait]
impl AccountStore for PgStore {
    async fn find_user(&self, user_id: i64) -> StoreResult<Option<UserAccount>> {
        let row = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(UserAccount::from))
    }

    async fn find_wallet(&self, user_id: i64) -> StoreResult<Option<Wallet>> {
        let row = sqlx::query_as::<_, WalletRow>("SELECT * FROM wallets WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Wallet::from))
    }

    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
