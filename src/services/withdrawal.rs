//! Withdrawal requests, admin approval (payout) and cancellation (refund).

use bigdecimal::{BigDecimal, Zero};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::PlatformSettings;
use crate::database::models::{NewWithdrawal, PayoutRecord, Withdrawal};
use crate::database::Store;
use crate::error::AppError;
use crate::log_transaction;
use crate::logging::mask_pix_key;
use crate::payments::{PaymentGateway, PayoutRequest, PixKeyType};
use crate::services::ledger::LedgerPoster;
use crate::services::notification::{AdminNotification, NotificationType, Notifier};

#[derive(Debug, Clone, Deserialize)]
pub struct WithdrawalRequest {
    pub amount: BigDecimal,
    pub pix_key: String,
    pub pix_key_type: PixKeyType,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WithdrawalResponse {
    pub already_applied: bool,
    pub withdrawal: Withdrawal,
}

pub struct WithdrawalService {
    store: Arc<dyn Store>,
    gateway: Arc<dyn PaymentGateway>,
    poster: LedgerPoster,
    notifier: Arc<dyn Notifier>,
    lock_timeout: Duration,
}

impl WithdrawalService {
    pub fn new(
        store: Arc<dyn Store>,
        gateway: Arc<dyn PaymentGateway>,
        poster: LedgerPoster,
        notifier: Arc<dyn Notifier>,
        lock_timeout: Duration,
    ) -> Self {
        Self {
            store,
            gateway,
            poster,
            notifier,
            lock_timeout,
        }
    }

    fn settings(&self) -> &PlatformSettings {
        self.poster.settings()
    }

    /// Reserve the user's funds and queue a withdrawal for approval.
    pub async fn request(&self, user_id: i64, request: WithdrawalRequest) -> Result<Withdrawal, AppError> {
        let pix_key = request.pix_key.trim().to_string();
        if pix_key.is_empty() {
            return Err(AppError::Validation("pix_key is required".to_string()));
        }
        if request.amount <= BigDecimal::zero() {
            return Err(AppError::Validation("amount must be positive".to_string()));
        }
        let limits = self.settings().withdrawal_limits();
        if !limits.contains(&request.amount) {
            return Err(AppError::Validation(format!(
                "amount must be between {} and {}",
                limits.min, limits.max
            )));
        }

        let withdrawal = self
            .store
            .create_withdrawal(NewWithdrawal {
                user_id,
                amount: request.amount,
                pix_key,
                pix_key_type: request.pix_key_type,
                currency: self.settings().currency_code.clone(),
            })
            .await?;

        log_transaction!(
            action = "withdrawal_requested",
            withdrawal_id = withdrawal.id,
            user_id = withdrawal.user_id,
            amount = withdrawal.amount,
            pix_key = mask_pix_key(&withdrawal.pix_key),
        );

        self.notifier
            .notify_admins(AdminNotification {
                kind: NotificationType::NewWithdrawal,
                user_id: withdrawal.user_id,
                amount: withdrawal.amount.clone(),
                reference: withdrawal.id.to_string(),
            })
            .await;

        Ok(withdrawal)
    }

    /// Send the payout and record the provider's acceptance.
    ///
    /// The payout claim keeps a second approver, or a cancel, away while the
    /// gateway call is in flight. A transient gateway failure keeps the claim
    /// until it expires because the payout may have gone through.
    pub async fn approve(&self, id: Uuid, actor: &str) -> Result<Withdrawal, AppError> {
        let claimed = self.store.claim_payout(id, actor, self.lock_timeout).await?;
        let reference = claimed.payout_reference();

        info!(
            withdrawal_id = %id,
            actor,
            amount = %claimed.amount,
            pix_key = %mask_pix_key(&claimed.pix_key),
            "Requesting payout"
        );

        let receipt = match self
            .gateway
            .request_payout(PayoutRequest {
                reference: reference.clone(),
                pix_key: claimed.pix_key.clone(),
                key_type: claimed.pix_key_type,
                amount: claimed.amount.clone(),
            })
            .await
        {
            Ok(receipt) => receipt,
            Err(e) if e.is_transient() => {
                warn!(
                    withdrawal_id = %id,
                    error = %e,
                    "Payout outcome unknown, claim kept until it expires"
                );
                return Err(e.into());
            }
            Err(e) => {
                if let Err(release_err) = self.store.release_payout_claim(id).await {
                    error!(withdrawal_id = %id, error = %release_err, "Failed to release payout claim");
                }
                warn!(withdrawal_id = %id, error = %e, "Payout rejected, withdrawal stays pending");
                return Err(e.into());
            }
        };

        let paid = match self
            .store
            .mark_withdrawal_paid(
                id,
                PayoutRecord {
                    transaction_id: receipt.provider_tx_id.clone(),
                    external_id: receipt.external_id.clone(),
                    message: receipt.message.clone(),
                    processed_by: actor.to_string(),
                },
            )
            .await
        {
            Ok(paid) => paid,
            Err(e) => {
                // Money left through the gateway but our record did not move.
                error!(
                    withdrawal_id = %id,
                    external_id = %receipt.external_id,
                    error = %e,
                    "Payout accepted by gateway but not recorded, manual reconciliation required"
                );
                return Err(e.into());
            }
        };

        log_transaction!(
            action = "withdrawal_paid",
            withdrawal_id = paid.id,
            user_id = paid.user_id,
            amount = paid.amount,
            external_id = receipt.external_id,
            processed_by = actor,
        );

        Ok(paid)
    }

    /// Cancel a pending withdrawal and give the money back.
    pub async fn cancel(&self, id: Uuid, actor: &str) -> Result<WithdrawalResponse, AppError> {
        let outcome = self
            .store
            .cancel_withdrawal(id, actor, self.lock_timeout, &self.poster)
            .await?;

        if outcome.already_applied {
            info!(withdrawal_id = %id, "Withdrawal already cancelled, nothing refunded");
        } else {
            log_transaction!(
                action = "withdrawal_cancelled",
                withdrawal_id = outcome.withdrawal.id,
                user_id = outcome.withdrawal.user_id,
                amount_returned = outcome.withdrawal.metadata.amount_returned,
                cancelled_by = actor,
            );
        }

        Ok(WithdrawalResponse {
            already_applied: outcome.already_applied,
            withdrawal: outcome.withdrawal,
        })
    }
}
