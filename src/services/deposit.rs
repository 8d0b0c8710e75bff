//! Deposit requests and their status view.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::config::PlatformSettings;
use crate::database::models::{NewTransaction, Transaction, TransactionStatus};
use crate::database::Store;
use crate::error::AppError;
use crate::logging::mask_tax_id;
use crate::payments::{PaymentGateway, QrCodeRequest};

const MAX_TAX_ID_LEN: usize = 255;

#[derive(Debug, Clone, Deserialize)]
pub struct DepositRequest {
    pub amount: BigDecimal,
    pub cpf: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DepositResponse {
    pub status: bool,
    pub transaction_id: String,
    pub qrcode: Option<String>,
    pub external_id: String,
}

/// Deposit stage for UI rendering
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DepositStage {
    AwaitingPayment,
    Credited,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimelineEntry {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub note: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DepositStatusResponse {
    pub external_id: String,
    pub status: TransactionStatus,
    pub stage: DepositStage,
    pub message: String,
    pub amount: BigDecimal,
    pub currency: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub timeline: Vec<TimelineEntry>,
}

pub struct DepositService {
    store: Arc<dyn Store>,
    gateway: Arc<dyn PaymentGateway>,
    settings: Arc<PlatformSettings>,
}

impl DepositService {
    pub fn new(store: Arc<dyn Store>, gateway: Arc<dyn PaymentGateway>, settings: Arc<PlatformSettings>) -> Self {
        Self {
            store,
            gateway,
            settings,
        }
    }

    /// Create a PIX charge and record it as a pending deposit.
    pub async fn request_deposit(&self, user_id: i64, request: DepositRequest) -> Result<DepositResponse, AppError> {
        let cpf = request.cpf.trim();
        if cpf.is_empty() {
            return Err(AppError::Validation("cpf is required".to_string()));
        }
        if cpf.len() > MAX_TAX_ID_LEN {
            return Err(AppError::Validation(format!(
                "cpf must be at most {} characters",
                MAX_TAX_ID_LEN
            )));
        }

        let user = self
            .store
            .find_user(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("user '{}'", user_id)))?;

        let qr = self
            .gateway
            .request_qr_code(QrCodeRequest {
                user_id,
                payer_name: user.name.clone(),
                tax_id: cpf.to_string(),
                amount: request.amount.clone(),
            })
            .await?;

        let tx = self
            .store
            .create_pending(NewTransaction {
                external_id: qr.external_id.clone(),
                payment_id: Some(qr.transaction_id.clone()),
                user_id,
                amount: request.amount,
                currency: self.settings.currency_code.clone(),
            })
            .await?;

        info!(
            user_id,
            external_id = %tx.external_id,
            amount = %tx.amount,
            cpf = %mask_tax_id(cpf),
            "Deposit requested"
        );

        Ok(DepositResponse {
            status: true,
            transaction_id: qr.transaction_id,
            qrcode: qr.payload,
            external_id: tx.external_id,
        })
    }

    /// Status of one of the caller's deposits. Deposits of other users are
    /// reported as missing.
    pub async fn status(&self, user_id: i64, external_id: &str) -> Result<DepositStatusResponse, AppError> {
        let tx = self
            .store
            .find_by_external_id(external_id)
            .await?
            .filter(|tx| tx.user_id == user_id)
            .ok_or_else(|| AppError::NotFound(format!("deposit '{}'", external_id)))?;

        Ok(DepositStatusResponse {
            stage: stage(tx.status),
            message: message(&tx),
            timeline: build_timeline(&tx),
            external_id: tx.external_id,
            status: tx.status,
            amount: tx.amount,
            currency: tx.currency,
            created_at: tx.created_at,
            updated_at: tx.updated_at,
        })
    }
}

fn stage(status: TransactionStatus) -> DepositStage {
    match status {
        TransactionStatus::Pending => DepositStage::AwaitingPayment,
        TransactionStatus::Paid => DepositStage::Credited,
        TransactionStatus::Failed => DepositStage::Failed,
    }
}

fn message(tx: &Transaction) -> String {
    match tx.status {
        TransactionStatus::Pending => "Waiting for your PIX payment to be confirmed.".to_string(),
        TransactionStatus::Paid => format!("{} {} has been credited to your balance.", tx.amount, tx.currency),
        TransactionStatus::Failed => "The payment was not completed. No funds were credited.".to_string(),
    }
}

fn build_timeline(tx: &Transaction) -> Vec<TimelineEntry> {
    let mut timeline = vec![TimelineEntry {
        status: "pending".to_string(),
        timestamp: tx.created_at,
        note: "QR code issued".to_string(),
    }];

    match tx.status {
        TransactionStatus::Paid => timeline.push(TimelineEntry {
            status: "paid".to_string(),
            timestamp: tx.updated_at,
            note: "Payment confirmed and balance credited".to_string(),
        }),
        TransactionStatus::Failed => timeline.push(TimelineEntry {
            status: "failed".to_string(),
            timestamp: tx.updated_at,
            note: "Payment reported as failed by the provider".to_string(),
        }),
        TransactionStatus::Pending => {}
    }

    timeline
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::NewTransaction;

    fn sample(status: TransactionStatus) -> Transaction {
        let mut tx = NewTransaction {
            external_id: "ext-1".to_string(),
            payment_id: None,
            user_id: 7,
            amount: BigDecimal::from(50),
            currency: "BRL".to_string(),
        }
        .into_pending(Utc::now());
        tx.status = status;
        tx
    }

    #[test]
    fn timeline_follows_status() {
        assert_eq!(build_timeline(&sample(TransactionStatus::Pending)).len(), 1);

        let paid = build_timeline(&sample(TransactionStatus::Paid));
        assert_eq!(paid.len(), 2);
        assert_eq!(paid[1].status, "paid");

        assert_eq!(stage(TransactionStatus::Failed), DepositStage::Failed);
    }

    #[test]
    fn response_uses_camel_case() {
        let response = DepositResponse {
            status: true,
            transaction_id: "tx".to_string(),
            qrcode: Some("000201".to_string()),
            external_id: "ext".to_string(),
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["transactionId"], "tx");
        assert_eq!(json["externalId"], "ext");
    }
}
