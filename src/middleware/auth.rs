//! Shared-secret authentication for internal callers
//!
//! Billing hooks and the expiry cron authenticate with
//! `Authorization: Bearer <internal.secret>`. When no secret is configured
//! every internal call is rejected.

use crate::{
    app_state::AppState,
    error::{ApiError, Result},
    middleware::jwt_auth::bearer_token,
};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

/// Compare without short-circuiting on the first differing byte
fn secrets_match(expected: &str, provided: &str) -> bool {
    let (expected, provided) = (expected.as_bytes(), provided.as_bytes());
    if expected.len() != provided.len() {
        return false;
    }
    expected
        .iter()
        .zip(provided)
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

pub async fn internal_auth_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response> {
    let expected = state
        .config
        .internal
        .secret
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            tracing::warn!("Internal call rejected: internal.secret is not configured");
            ApiError::Unauthorized("Internal access is not configured".to_string())
        })?;

    let provided = bearer_token(request.headers())?;

    if !secrets_match(expected, provided) {
        tracing::warn!(uri = %request.uri(), "Internal call rejected: bad secret");
        return Err(ApiError::Unauthorized("Invalid internal secret".to_string()));
    }

    Ok(next.run(request).await)
}
