//! Application error type for the HTTP surface
//!
//! Every lower layer error is folded into [`AppError`], which knows its
//! stable [`ErrorCode`], HTTP status, user-facing message and whether the
//! caller should retry.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::database::DatabaseError;
use crate::payments::GatewayError;
use crate::workers::reconciliation::ReconcileError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ValidationError,
    NotFound,
    InvalidState,
    DuplicateExternalId,
    PayoutInProgress,
    Unauthorized,
    GatewayRejected,
    GatewayUnavailable,
    GatewayTimeout,
    InternalError,
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("external id '{0}' already exists")]
    DuplicateExternalId(String),

    #[error("payout already in progress: {0}")]
    PayoutInProgress(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn error_code(&self) -> ErrorCode {
        match self {
            AppError::Validation(_) => ErrorCode::ValidationError,
            AppError::NotFound(_) => ErrorCode::NotFound,
            AppError::InvalidState(_) => ErrorCode::InvalidState,
            AppError::DuplicateExternalId(_) => ErrorCode::DuplicateExternalId,
            AppError::PayoutInProgress(_) => ErrorCode::PayoutInProgress,
            AppError::Unauthorized(_) => ErrorCode::Unauthorized,
            AppError::Gateway(GatewayError::Validation(_)) => ErrorCode::ValidationError,
            AppError::Gateway(GatewayError::Rejected(_)) => ErrorCode::GatewayRejected,
            AppError::Gateway(GatewayError::Unavailable(_)) => ErrorCode::GatewayUnavailable,
            AppError::Gateway(GatewayError::Timeout(_)) => ErrorCode::GatewayTimeout,
            AppError::Internal(_) => ErrorCode::InternalError,
        }
    }

    pub fn status_code(&self) -> u16 {
        match self.error_code() {
            ErrorCode::ValidationError => 400,
            ErrorCode::Unauthorized => 401,
            ErrorCode::NotFound => 404,
            ErrorCode::InvalidState | ErrorCode::DuplicateExternalId | ErrorCode::PayoutInProgress => 409,
            ErrorCode::GatewayRejected => 422,
            ErrorCode::GatewayUnavailable => 502,
            ErrorCode::GatewayTimeout => 504,
            ErrorCode::InternalError => 500,
        }
    }

    /// Message safe to show to the end user.
    pub fn user_message(&self) -> String {
        match self {
            AppError::Validation(msg) => msg.clone(),
            AppError::NotFound(what) => format!("{} not found", what),
            AppError::InvalidState(msg) => msg.clone(),
            AppError::DuplicateExternalId(_) => "This payment was already registered.".to_string(),
            AppError::PayoutInProgress(_) => {
                "This withdrawal is already being processed. Try again shortly.".to_string()
            }
            AppError::Unauthorized(_) => "Authentication required.".to_string(),
            AppError::Gateway(GatewayError::Validation(msg)) => msg.clone(),
            AppError::Gateway(GatewayError::Rejected(msg)) => {
                format!("The payment provider rejected the request: {}", msg)
            }
            AppError::Gateway(GatewayError::Unavailable(_)) => {
                "The payment provider is unavailable. Please try again later.".to_string()
            }
            AppError::Gateway(GatewayError::Timeout(_)) => {
                "The payment provider did not respond in time. Please try again later.".to_string()
            }
            AppError::Internal(_) => "An internal error occurred.".to_string(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::Gateway(err) => err.is_transient(),
            AppError::PayoutInProgress(_) => true,
            _ => false,
        }
    }

    /// Seconds a client should wait before retrying.
    pub fn retry_after(&self) -> Option<u64> {
        if self.is_retryable() {
            Some(10)
        } else {
            None
        }
    }
}

impl From<DatabaseError> for AppError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::NotFound { entity, id } => AppError::NotFound(format!("{} '{}'", entity, id)),
            DatabaseError::DuplicateExternalId(id) => AppError::DuplicateExternalId(id),
            DatabaseError::InvalidTransition { entity, from, to, .. } => {
                AppError::InvalidState(format!("{} is {} and cannot become {}", entity, from, to))
            }
            DatabaseError::InsufficientFunds { available, requested } => AppError::Validation(format!(
                "insufficient balance: available {}, requested {}",
                available, requested
            )),
            DatabaseError::Locked(id) => AppError::PayoutInProgress(id),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<ReconcileError> for AppError {
    fn from(err: ReconcileError) -> Self {
        match err {
            ReconcileError::Database(e) => e.into(),
            ReconcileError::Gateway(e) => e.into(),
            ReconcileError::Webhook(e) => AppError::Validation(e.to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            tracing::error!(code = ?self.error_code(), error = %self, "Request failed");
        } else {
            tracing::debug!(code = ?self.error_code(), error = %self, "Request rejected");
        }

        let body = ErrorResponse {
            error: ErrorDetail {
                code: self.error_code(),
                message: self.user_message(),
                retry_after: self.retry_after(),
            },
        };
        (status, Json(body)).into_response()
    }
}
