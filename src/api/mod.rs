//! HTTP surface: webhook receiver, wallet endpoints, admin withdrawal
//! actions and health.

pub mod auth;
pub mod deposit;
pub mod health;
pub mod webhook;
pub mod withdrawal;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Instant;
use tower::ServiceBuilder;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::database::Store;
use crate::middleware::logging::{request_logging_middleware, UuidRequestId};
use crate::services::{DepositService, WithdrawalService};
use crate::workers::ReconciliationEngine;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ReconciliationEngine>,
    pub deposits: Arc<DepositService>,
    pub withdrawals: Arc<WithdrawalService>,
    pub store: Arc<dyn Store>,
    /// Shared secret for webhook signatures; unsigned webhooks are accepted when unset
    pub webhook_secret: Option<String>,
    pub started_at: Instant,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/api/divpag/webhook", post(webhook::divpag_webhook))
        .route("/api/wallet/deposit/payment", post(deposit::request_deposit))
        .route("/api/wallet/deposit/consult", post(deposit::consult_pending))
        .route("/api/wallet/deposit/{external_id}", get(deposit::deposit_status))
        .route("/api/wallet/withdrawal", post(withdrawal::request_withdrawal))
        .route("/api/admin/withdrawals/{id}/approve", post(withdrawal::approve_withdrawal))
        .route("/api/admin/withdrawals/{id}/cancel", post(withdrawal::cancel_withdrawal))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
                .layer(axum::middleware::from_fn(request_logging_middleware))
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(TraceLayer::new_for_http()),
        )
        .with_state(state)
}
