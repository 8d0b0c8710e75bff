use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use super::auth::{AdminActor, CurrentUser};
use super::AppState;
use crate::database::models::Withdrawal;
use crate::error::AppError;
use crate::services::withdrawal::{WithdrawalRequest, WithdrawalResponse};

/// POST /api/wallet/withdrawal
pub async fn request_withdrawal(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Json(request): Json<WithdrawalRequest>,
) -> Result<(StatusCode, Json<Withdrawal>), AppError> {
    let withdrawal = state.withdrawals.request(user_id, request).await?;
    Ok((StatusCode::CREATED, Json(withdrawal)))
}

/// POST /api/admin/withdrawals/{id}/approve
pub async fn approve_withdrawal(
    State(state): State<AppState>,
    AdminActor(actor): AdminActor,
    Path(id): Path<Uuid>,
) -> Result<Json<Withdrawal>, AppError> {
    let withdrawal = state.withdrawals.approve(id, &actor).await?;
    Ok(Json(withdrawal))
}

/// POST /api/admin/withdrawals/{id}/cancel
pub async fn cancel_withdrawal(
    State(state): State<AppState>,
    AdminActor(actor): AdminActor,
    Path(id): Path<Uuid>,
) -> Result<Json<WithdrawalResponse>, AppError> {
    let response = state.withdrawals.cancel(id, &actor).await?;
    Ok(Json(response))
}
