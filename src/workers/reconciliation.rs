//! Deposit and payout reconciliation.
//!
//! Two independent triggers drive a transaction to its terminal state: the
//! provider's webhook and the periodic status poll. Both end in the store's
//! atomic finalize, so whichever arrives second observes
//! `already_finalized` and applies nothing.

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::interval;
use tracing::{debug, error, info, instrument, warn};

use crate::config::ReconcilerConfig;
use crate::database::error::DatabaseError;
use crate::database::models::{FinalizeOutcome, PayoutConfirmation, TransitionOutcome, WithdrawalOutcome};
use crate::database::Store;
use crate::log_transaction;
use crate::payments::webhook::{self, DepositNotification, PayoutNotification, WebhookError, WebhookEvent};
use crate::payments::{GatewayError, PaymentGateway, ProviderStatus};
use crate::services::ledger::LedgerPoster;
use crate::services::notification::{AdminNotification, NotificationType, Notifier};

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Webhook(#[from] WebhookError),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

impl ReconcileError {
    /// Errors about the event itself rather than about our ability to
    /// process it. The webhook acknowledges these so the provider does not
    /// keep redelivering an event that can never succeed.
    pub fn is_ignorable(&self) -> bool {
        match self {
            ReconcileError::Webhook(e) => !e.is_unreadable(),
            ReconcileError::Database(DatabaseError::NotFound { entity, .. }) => {
                matches!(*entity, "transaction" | "withdrawal")
            }
            ReconcileError::Database(DatabaseError::InvalidTransition { .. }) => true,
            _ => false,
        }
    }
}

/// What a webhook event led to.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "disposition", rename_all = "snake_case")]
pub enum WebhookDisposition {
    DepositFinalized { external_id: String, already_finalized: bool },
    DepositFailed { external_id: String, changed: bool },
    DepositPending { external_id: String, status: ProviderStatus },
    PayoutConfirmed { external_id: String, already_applied: bool },
    PayoutIgnored { external_id: String, status_id: i64 },
}

/// Summary of one polling pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PollReport {
    pub checked: usize,
    pub finalized: usize,
    pub already_finalized: usize,
    pub failed: usize,
    pub pending: usize,
    pub unknown: usize,
    pub errors: usize,
    /// Provider status per external id
    pub statuses: BTreeMap<String, ProviderStatus>,
    /// Depositor per checked external id
    #[serde(skip)]
    pub owners: BTreeMap<String, i64>,
}

impl PollReport {
    /// The checked deposits that belong to `user_id`.
    pub fn statuses_for(&self, user_id: i64) -> BTreeMap<String, ProviderStatus> {
        self.statuses
            .iter()
            .filter(|(external_id, _)| self.owners.get(*external_id) == Some(&user_id))
            .map(|(external_id, status)| (external_id.clone(), *status))
            .collect()
    }
}

pub struct ReconciliationEngine {
    store: Arc<dyn Store>,
    gateway: Arc<dyn PaymentGateway>,
    poster: LedgerPoster,
    notifier: Arc<dyn Notifier>,
    config: ReconcilerConfig,
}

impl ReconciliationEngine {
    pub fn new(
        store: Arc<dyn Store>,
        gateway: Arc<dyn PaymentGateway>,
        poster: LedgerPoster,
        notifier: Arc<dyn Notifier>,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            store,
            gateway,
            poster,
            notifier,
            config,
        }
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    /// Poll until the shutdown signal flips.
    pub async fn run(&self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(
            poll_interval_secs = self.config.poll_interval.as_secs(),
            max_age_secs = self.config.max_age.as_secs(),
            batch_size = self.config.batch_size,
            gateway = self.gateway.name(),
            "Reconciliation worker started"
        );

        let mut poll_ticker = interval(self.config.poll_interval);

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    info!("Shutdown signal received, stopping reconciliation worker");
                    break;
                }
                _ = poll_ticker.tick() => {
                    match self.poll_once().await {
                        Ok(report) if report.checked > 0 => info!(
                            checked = report.checked,
                            finalized = report.finalized,
                            failed = report.failed,
                            pending = report.pending,
                            unknown = report.unknown,
                            errors = report.errors,
                            "Reconciliation cycle complete"
                        ),
                        Ok(_) => debug!("Reconciliation cycle found nothing pending"),
                        Err(e) => error!(error = %e, "Error in reconciliation cycle"),
                    }
                }
            }
        }

        info!("Reconciliation worker stopped");
    }

    /// One polling pass with the configured window and batch size.
    pub async fn poll_once(&self) -> Result<PollReport, ReconcileError> {
        self.poll_pending(self.config.max_age, self.config.batch_size).await
    }

    /// Ask the provider about up to `batch` of the oldest pending deposits
    /// younger than `max_age`. Older ones are left alone, never failed.
    #[instrument(skip(self), fields(worker = "reconciliation"))]
    pub async fn poll_pending(&self, max_age: Duration, batch: i64) -> Result<PollReport, ReconcileError> {
        let pending = self.store.pending_batch(max_age, batch).await?;
        let mut report = PollReport::default();

        for tx in pending {
            report.checked += 1;
            let status = self.gateway.query_status(&tx.external_id).await;
            report.statuses.insert(tx.external_id.clone(), status);
            report.owners.insert(tx.external_id.clone(), tx.user_id);

            match status {
                ProviderStatus::Paid => match self.finalize(&tx.external_id).await {
                    Ok(outcome) if outcome.already_finalized => report.already_finalized += 1,
                    Ok(_) => report.finalized += 1,
                    Err(e) => {
                        report.errors += 1;
                        error!(external_id = %tx.external_id, error = %e, "Poll could not finalize deposit");
                    }
                },
                ProviderStatus::Failed => match self.fail(&tx.external_id).await {
                    Ok(_) => report.failed += 1,
                    Err(e) => {
                        report.errors += 1;
                        error!(external_id = %tx.external_id, error = %e, "Poll could not fail deposit");
                    }
                },
                ProviderStatus::Pending => report.pending += 1,
                ProviderStatus::Unknown => {
                    report.unknown += 1;
                    debug!(external_id = %tx.external_id, "Provider status unknown, will retry next cycle");
                }
            }
        }

        Ok(report)
    }

    /// Entry point for a decoded webhook body.
    pub async fn on_webhook_event(&self, payload: Value) -> Result<WebhookDisposition, ReconcileError> {
        let event = webhook::normalize(payload)?;
        self.handle_event(event).await
    }

    #[instrument(skip(self, event), fields(external_id = %event.external_id()))]
    pub async fn handle_event(&self, event: WebhookEvent) -> Result<WebhookDisposition, ReconcileError> {
        match event {
            WebhookEvent::Deposit(notification) => self.handle_deposit(notification).await,
            WebhookEvent::Payout(notification) => self.handle_payout(notification).await,
        }
    }

    async fn handle_deposit(&self, notification: DepositNotification) -> Result<WebhookDisposition, ReconcileError> {
        let external_id = notification.external_id.clone();

        match notification.status {
            ProviderStatus::Paid => {
                if let Some(reported) = &notification.amount {
                    if let Some(tx) = self.store.find_by_external_id(&external_id).await? {
                        if &tx.amount != reported {
                            warn!(
                                external_id = %external_id,
                                expected = %tx.amount,
                                reported = %reported,
                                "Webhook amount differs from the requested amount"
                            );
                        }
                    }
                }
                let outcome = self.finalize(&external_id).await?;
                Ok(WebhookDisposition::DepositFinalized {
                    external_id,
                    already_finalized: outcome.already_finalized,
                })
            }
            ProviderStatus::Failed => {
                let outcome = self.fail(&external_id).await?;
                Ok(WebhookDisposition::DepositFailed {
                    external_id,
                    changed: outcome.changed,
                })
            }
            status => {
                debug!(external_id = %external_id, raw_status = %notification.raw_status, "Deposit not paid yet");
                Ok(WebhookDisposition::DepositPending { external_id, status })
            }
        }
    }

    async fn handle_payout(&self, notification: PayoutNotification) -> Result<WebhookDisposition, ReconcileError> {
        if !notification.is_confirmed() {
            info!(
                external_id = %notification.external_id,
                status_id = notification.status_id,
                "Payout webhook without confirmation ignored"
            );
            return Ok(WebhookDisposition::PayoutIgnored {
                external_id: notification.external_id,
                status_id: notification.status_id,
            });
        }

        let outcome = self.confirm_payout(&notification).await?;
        Ok(WebhookDisposition::PayoutConfirmed {
            external_id: notification.external_id,
            already_applied: outcome.already_applied,
        })
    }

    /// Move a deposit to Paid and post its ledger effects, exactly once.
    pub async fn finalize(&self, external_id: &str) -> Result<FinalizeOutcome, ReconcileError> {
        let outcome = match self.store.finalize_deposit(external_id, &self.poster).await {
            Ok(outcome) => outcome,
            Err(e) => {
                // Status and ledger share one atomic unit, so the deposit is still pending.
                error!(
                    external_id = %external_id,
                    error = %e,
                    "Deposit finalization rolled back, transaction remains pending"
                );
                return Err(e.into());
            }
        };

        if outcome.already_finalized {
            debug!(external_id = %external_id, "Deposit already finalized, nothing applied");
            return Ok(outcome);
        }

        let tx = &outcome.transaction;
        log_transaction!(
            action = "deposit_finalized",
            external_id = tx.external_id,
            user_id = tx.user_id,
            amount = tx.amount,
            posting = outcome.posting,
        );

        self.notifier
            .notify_admins(AdminNotification {
                kind: NotificationType::NewDeposit,
                user_id: tx.user_id,
                amount: tx.amount.clone(),
                reference: tx.external_id.clone(),
            })
            .await;

        Ok(outcome)
    }

    /// Pending → Failed on an explicit provider failure.
    pub async fn fail(&self, external_id: &str) -> Result<TransitionOutcome, ReconcileError> {
        let outcome = self.store.mark_failed(external_id).await?;
        if outcome.changed {
            log_transaction!(
                action = "deposit_failed",
                external_id = outcome.transaction.external_id,
                user_id = outcome.transaction.user_id,
            );
        } else {
            debug!(
                external_id = %external_id,
                status = outcome.transaction.status.as_str(),
                "Failure report for a settled deposit ignored"
            );
        }
        Ok(outcome)
    }

    pub async fn confirm_payout(&self, notification: &PayoutNotification) -> Result<WithdrawalOutcome, ReconcileError> {
        let outcome = self
            .store
            .confirm_payout(
                &notification.external_id,
                PayoutConfirmation {
                    transaction_id: notification.transaction_id.clone(),
                    status_id: notification.status_id,
                },
            )
            .await?;

        log_transaction!(
            action = "payout_confirmed",
            withdrawal_id = outcome.withdrawal.id,
            external_id = notification.external_id,
            already_applied = outcome.already_applied,
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_events_are_ignorable_but_faults_are_not() {
        assert!(ReconcileError::Webhook(WebhookError::MissingField("external_id")).is_ignorable());
        assert!(!ReconcileError::Webhook(WebhookError::EmptyPayload).is_ignorable());
        assert!(ReconcileError::Database(DatabaseError::not_found("transaction", "x")).is_ignorable());
        assert!(!ReconcileError::Database(DatabaseError::Internal("boom".into())).is_ignorable());
    }

    #[test]
    fn missing_wallet_is_a_fault() {
        assert!(ReconcileError::Database(DatabaseError::not_found("withdrawal", "w")).is_ignorable());
        assert!(!ReconcileError::Database(DatabaseError::not_found("wallet", 7)).is_ignorable());
    }
}
