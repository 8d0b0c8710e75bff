//! Divpag webhook receiver.
//!
//! Recognized events are always acknowledged, even when their content is
//! unusable, so the provider does not retry them forever. Only empty or
//! unreadable bodies (400), bad signatures (401) and internal faults (500)
//! are refused.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use serde_json::{json, Value};
use tracing::{error, info, warn};

use super::AppState;
use crate::middleware::logging::extract_client_ip;
use crate::payments::webhook::{decode_body, verify_signature, SIGNATURE_HEADER};

fn reply(status: StatusCode, outcome: &str) -> (StatusCode, Json<Value>) {
    (status, Json(json!({ "status": outcome })))
}

/// POST /api/divpag/webhook
pub async fn divpag_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<Value>) {
    let client_ip = extract_client_ip(&headers).unwrap_or_else(|| "unknown".to_string());

    if let Some(secret) = &state.webhook_secret {
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if !verify_signature(secret, &body, signature) {
            warn!(client_ip = %client_ip, "Webhook signature rejected");
            return reply(StatusCode::UNAUTHORIZED, "error");
        }
    }

    let payload = match decode_body(&body) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(client_ip = %client_ip, error = %e, "Unreadable webhook body");
            return reply(StatusCode::BAD_REQUEST, "error");
        }
    };

    match state.engine.on_webhook_event(payload).await {
        Ok(disposition) => {
            info!(client_ip = %client_ip, disposition = ?disposition, "Webhook processed");
            reply(StatusCode::OK, "success")
        }
        Err(e) if e.is_ignorable() => {
            warn!(client_ip = %client_ip, error = %e, "Webhook acknowledged without effect");
            reply(StatusCode::OK, "success")
        }
        Err(e) => {
            error!(client_ip = %client_ip, error = %e, "Webhook processing failed");
            reply(StatusCode::INTERNAL_SERVER_ERROR, "error")
        }
    }
}
