//! Caller identity handed over by the upstream authentication layer.
//!
//! Authentication itself happens in front of this service; these
//! extractors only read the identity it forwards.

use axum::{extract::FromRequestParts, http::request::Parts};

use crate::error::AppError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const ADMIN_HEADER: &str = "x-admin-name";

/// The authenticated end user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentUser(pub i64);

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized(format!("missing {} header", USER_ID_HEADER)))?;

        raw.trim()
            .parse::<i64>()
            .map(CurrentUser)
            .map_err(|_| AppError::Unauthorized(format!("invalid {} header", USER_ID_HEADER)))
    }
}

/// The administrator acting on a withdrawal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminActor(pub String);

impl<S> FromRequestParts<S> for AdminActor
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(ADMIN_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(|name| AdminActor(name.to_string()))
            .ok_or_else(|| AppError::Unauthorized(format!("missing {} header", ADMIN_HEADER)))
    }
}
