//! Admin notifications. Delivery is owned elsewhere; the shipped notifier
//! emits a structured log event that downstream tooling picks up.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use serde::Serialize;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    NewDeposit,
    NewWithdrawal,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::NewDeposit => "new_deposit",
            NotificationType::NewWithdrawal => "new_withdrawal",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdminNotification {
    pub kind: NotificationType,
    pub user_id: i64,
    pub amount: BigDecimal,
    /// External id of the deposit or id of the withdrawal
    pub reference: String,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_admins(&self, notification: AdminNotification);
}

#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify_admins(&self, notification: AdminNotification) {
        info!(
            event_type = "admin_notification",
            kind = notification.kind.as_str(),
            user_id = notification.user_id,
            amount = %notification.amount,
            reference = %notification.reference,
            "Admin notification emitted"
        );
    }
}
