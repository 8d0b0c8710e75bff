use axum::{
    extract::{Path, State},
    Json,
};
use std::collections::BTreeMap;
use tracing::info;

use super::auth::CurrentUser;
use super::AppState;
use crate::error::AppError;
use crate::payments::ProviderStatus;
use crate::services::deposit::{DepositRequest, DepositResponse, DepositStatusResponse};

/// POST /api/wallet/deposit/payment
pub async fn request_deposit(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Json(request): Json<DepositRequest>,
) -> Result<Json<DepositResponse>, AppError> {
    let response = state.deposits.request_deposit(user_id, request).await?;
    Ok(Json(response))
}

/// GET /api/wallet/deposit/{external_id}
pub async fn deposit_status(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(external_id): Path<String>,
) -> Result<Json<DepositStatusResponse>, AppError> {
    let response = state.deposits.status(user_id, &external_id).await?;
    Ok(Json(response))
}

/// POST /api/wallet/deposit/consult
///
/// Runs the polling fallback right away over every pending deposit and
/// returns what the provider said about the caller's own ones.
pub async fn consult_pending(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
) -> Result<Json<BTreeMap<String, ProviderStatus>>, AppError> {
    let report = state.engine.poll_once().await?;
    info!(
        user_id,
        checked = report.checked,
        finalized = report.finalized,
        "Manual deposit consult"
    );
    Ok(Json(report.statuses_for(user_id)))
}
