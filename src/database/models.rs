//! Records persisted by the stores and the outcomes of their atomic
//! operations.

use bigdecimal::{BigDecimal, Zero};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use super::error::DatabaseError;
use crate::payments::PixKeyType;
use crate::services::ledger::DepositPosting;

// ---------------------------------------------------------------------------
// Deposits
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Paid,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Paid => "paid",
            TransactionStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TransactionStatus::Pending),
            "paid" => Some(TransactionStatus::Paid),
            "failed" => Some(TransactionStatus::Failed),
            _ => None,
        }
    }

    /// Only a pending transaction moves, and only to a terminal state.
    pub fn can_transition_to(&self, next: &TransactionStatus) -> bool {
        matches!(
            (self, next),
            (TransactionStatus::Pending, TransactionStatus::Paid)
                | (TransactionStatus::Pending, TransactionStatus::Failed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }
}

/// A PIX deposit, keyed by the gateway's external id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub external_id: String,
    /// Gateway-side transaction id returned with the QR code
    pub payment_id: Option<String>,
    pub user_id: i64,
    pub amount: BigDecimal,
    pub currency: String,
    pub method: String,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub external_id: String,
    pub payment_id: Option<String>,
    pub user_id: i64,
    pub amount: BigDecimal,
    pub currency: String,
}

impl NewTransaction {
    pub fn into_pending(self, now: DateTime<Utc>) -> Transaction {
        Transaction {
            id: Uuid::new_v4(),
            external_id: self.external_id,
            payment_id: self.payment_id,
            user_id: self.user_id,
            amount: self.amount,
            currency: self.currency,
            method: "pix".to_string(),
            status: TransactionStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }
}

// ---------------------------------------------------------------------------
// Withdrawals
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WithdrawalStatus {
    Pending,
    Paid,
    Cancelled,
}

impl WithdrawalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WithdrawalStatus::Pending => "pending",
            WithdrawalStatus::Paid => "paid",
            WithdrawalStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(WithdrawalStatus::Pending),
            "paid" => Some(WithdrawalStatus::Paid),
            "cancelled" => Some(WithdrawalStatus::Cancelled),
            _ => None,
        }
    }

    pub fn can_transition_to(&self, next: &WithdrawalStatus) -> bool {
        matches!(
            (self, next),
            (WithdrawalStatus::Pending, WithdrawalStatus::Paid)
                | (WithdrawalStatus::Pending, WithdrawalStatus::Cancelled)
        )
    }
}

/// Gateway bookkeeping stored alongside a withdrawal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WithdrawalMetadata {
    // Payout acceptance
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_by: Option<String>,

    // Webhook confirmation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_confirmed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_transaction_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_status_id: Option<i64>,

    // Cancellation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancelled_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount_returned: Option<BigDecimal>,

    // Payout claim
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locked_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locked_by: Option<String>,
}

impl WithdrawalMetadata {
    pub fn to_json(&self) -> JsonValue {
        serde_json::to_value(self).unwrap_or_else(|_| serde_json::json!({}))
    }

    pub fn from_json(value: &JsonValue) -> Result<Self, DatabaseError> {
        if value.is_null() {
            return Ok(Self::default());
        }
        serde_json::from_value(value.clone())
            .map_err(|e| DatabaseError::Internal(format!("failed to parse withdrawal metadata: {}", e)))
    }

    /// Whether a payout claim is held and younger than `timeout`.
    pub fn is_locked(&self, now: DateTime<Utc>, timeout: chrono::Duration) -> bool {
        match self.locked_at {
            Some(locked_at) => now - locked_at < timeout,
            None => false,
        }
    }

    pub fn release_lock(&mut self) {
        self.locked_at = None;
        self.locked_by = None;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Withdrawal {
    pub id: Uuid,
    pub user_id: i64,
    pub amount: BigDecimal,
    pub pix_key: String,
    pub pix_key_type: PixKeyType,
    pub currency: String,
    pub status: WithdrawalStatus,
    pub metadata: WithdrawalMetadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Withdrawal {
    /// Correlation reference sent to the gateway with the payout.
    pub fn payout_reference(&self) -> String {
        self.id.simple().to_string()
    }
}

#[derive(Debug, Clone)]
pub struct NewWithdrawal {
    pub user_id: i64,
    pub amount: BigDecimal,
    pub pix_key: String,
    pub pix_key_type: PixKeyType,
    pub currency: String,
}

impl NewWithdrawal {
    pub fn into_pending(self, now: DateTime<Utc>) -> Withdrawal {
        Withdrawal {
            id: Uuid::new_v4(),
            user_id: self.user_id,
            amount: self.amount,
            pix_key: self.pix_key,
            pix_key_type: self.pix_key_type,
            currency: self.currency,
            status: WithdrawalStatus::Pending,
            metadata: WithdrawalMetadata::default(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// What the gateway told us when it accepted a payout.
#[derive(Debug, Clone)]
pub struct PayoutRecord {
    pub transaction_id: Option<String>,
    pub external_id: String,
    pub message: String,
    pub processed_by: String,
}

/// Payout confirmation delivered by webhook.
#[derive(Debug, Clone)]
pub struct PayoutConfirmation {
    pub transaction_id: Option<String>,
    pub status_id: i64,
}

// ---------------------------------------------------------------------------
// Accounts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserAccount {
    pub id: i64,
    pub name: String,
    /// Sponsor who referred this user
    pub inviter_id: Option<i64>,
    /// CPA terms this user offers to the people they refer
    pub affiliate_baseline: BigDecimal,
    pub affiliate_cpa: BigDecimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wallet {
    pub user_id: i64,
    pub currency: String,
    pub balance: BigDecimal,
    pub balance_bonus: BigDecimal,
    pub balance_bonus_rollover: BigDecimal,
    pub balance_deposit_rollover: BigDecimal,
    pub vip_points: BigDecimal,
    pub refer_rewards: BigDecimal,
}

impl Wallet {
    pub fn new(user_id: i64, currency: impl Into<String>) -> Self {
        Self {
            user_id,
            currency: currency.into(),
            balance: BigDecimal::zero(),
            balance_bonus: BigDecimal::zero(),
            balance_bonus_rollover: BigDecimal::zero(),
            balance_deposit_rollover: BigDecimal::zero(),
            vip_points: BigDecimal::zero(),
            refer_rewards: BigDecimal::zero(),
        }
    }

    pub fn with_balance(mut self, balance: BigDecimal) -> Self {
        self.balance = balance;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommissionStatus {
    Pending,
    Paid,
}

impl CommissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommissionStatus::Pending => "pending",
            CommissionStatus::Paid => "paid",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(CommissionStatus::Pending),
            "paid" => Some(CommissionStatus::Paid),
            _ => None,
        }
    }
}

/// Affiliate commission tracking for a referred user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AffiliateHistory {
    pub id: Uuid,
    pub user_id: i64,
    pub inviter_id: i64,
    pub commission_type: String,
    pub status: CommissionStatus,
    /// Deposits accumulated towards the sponsor's baseline
    pub deposited_amount: BigDecimal,
    pub commission_paid: BigDecimal,
}

impl AffiliateHistory {
    pub fn pending_cpa(user_id: i64, inviter_id: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            inviter_id,
            commission_type: "cpa".to_string(),
            status: CommissionStatus::Pending,
            deposited_amount: BigDecimal::zero(),
            commission_paid: BigDecimal::zero(),
        }
    }
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Result of an idempotent deposit finalization.
#[derive(Debug, Clone)]
pub struct FinalizeOutcome {
    /// The transaction was already paid; nothing was applied
    pub already_finalized: bool,
    pub transaction: Transaction,
    /// Ledger effects applied by this call
    pub posting: Option<DepositPosting>,
}

/// Result of a withdrawal state change that may already have happened.
#[derive(Debug, Clone)]
pub struct WithdrawalOutcome {
    pub already_applied: bool,
    pub withdrawal: Withdrawal,
}

/// Result of moving a deposit to a non-paid terminal state.
#[derive(Debug, Clone)]
pub struct TransitionOutcome {
    pub changed: bool,
    pub transaction: Transaction,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transaction_transitions() {
        let pending = TransactionStatus::Pending;
        assert!(pending.can_transition_to(&TransactionStatus::Paid));
        assert!(pending.can_transition_to(&TransactionStatus::Failed));
        assert!(!TransactionStatus::Paid.can_transition_to(&TransactionStatus::Failed));
        assert!(!TransactionStatus::Failed.can_transition_to(&TransactionStatus::Paid));
        assert_eq!(TransactionStatus::from_str("paid"), Some(TransactionStatus::Paid));
        assert_eq!(TransactionStatus::from_str("PAID"), None);
    }

    #[test]
    fn paid_withdrawal_is_terminal() {
        assert!(!WithdrawalStatus::Paid.can_transition_to(&WithdrawalStatus::Cancelled));
        assert!(!WithdrawalStatus::Cancelled.can_transition_to(&WithdrawalStatus::Paid));
        assert!(WithdrawalStatus::Pending.can_transition_to(&WithdrawalStatus::Cancelled));
    }

    #[test]
    fn metadata_round_trips_and_skips_empty_fields() {
        let mut metadata = WithdrawalMetadata::default();
        assert_eq!(metadata.to_json(), serde_json::json!({}));

        metadata.external_id = Some("wd-1".to_string());
        metadata.webhook_status_id = Some(1);
        let parsed = WithdrawalMetadata::from_json(&metadata.to_json()).unwrap();
        assert_eq!(parsed, metadata);

        assert_eq!(
            WithdrawalMetadata::from_json(&JsonValue::Null).unwrap(),
            WithdrawalMetadata::default()
        );
    }

    #[test]
    fn payout_claim_expires() {
        let now = Utc::now();
        let mut metadata = WithdrawalMetadata {
            locked_at: Some(now - chrono::Duration::seconds(30)),
            locked_by: Some("admin".to_string()),
            ..Default::default()
        };
        assert!(metadata.is_locked(now, chrono::Duration::seconds(60)));
        assert!(!metadata.is_locked(now, chrono::Duration::seconds(10)));

        metadata.release_lock();
        assert!(!metadata.is_locked(now, chrono::Duration::seconds(60)));
    }
}
