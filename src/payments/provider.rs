use async_trait::async_trait;

use super::error::GatewayError;
use super::types::{PayoutReceipt, PayoutRequest, ProviderStatus, QrCode, QrCodeRequest};

/// Outbound operations against a PIX provider.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    fn name(&self) -> &'static str;

    /// Create a PIX charge for a deposit.
    async fn request_qr_code(&self, request: QrCodeRequest) -> Result<QrCode, GatewayError>;

    /// Send money to a PIX key.
    async fn request_payout(&self, request: PayoutRequest) -> Result<PayoutReceipt, GatewayError>;

    /// Best effort: failures are reported as [`ProviderStatus::Unknown`].
    async fn query_status(&self, external_id: &str) -> ProviderStatus;
}
