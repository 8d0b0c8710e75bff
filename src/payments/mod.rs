//! PIX payment gateway integration
//!
//! The [`PaymentGateway`] trait is the seam between the reconciliation core
//! and the provider; [`DivpagClient`] is the HTTP implementation.

pub mod divpag;
pub mod error;
pub mod provider;
pub mod types;
pub mod webhook;

pub use divpag::DivpagClient;
pub use error::GatewayError;
pub use provider::PaymentGateway;
pub use types::{PayoutReceipt, PayoutRequest, PixKeyType, ProviderStatus, QrCode, QrCodeRequest};
pub use webhook::{DepositNotification, PayoutNotification, WebhookError, WebhookEvent};
