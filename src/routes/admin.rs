use axum::{
    extract::{Path, State},
    Json,
};
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::{
    app_state::AppState,
    error::{AppJson, Result},
    middleware::UserIdentity,
    models::{
        common::SuccessResponse,
        credits::{AdminGrantRequest, CreditsBalanceData, CreditsBalanceResponse, GrantCreditsResponse},
    },
};

/// POST /api/v1/admin/credits/grant
#[instrument(skip(state, identity, request), fields(admin_id = %identity.user_id))]
pub async fn grant(
    State(state): State<AppState>,
    identity: UserIdentity,
    AppJson(request): AppJson<AdminGrantRequest>,
) -> Result<Json<GrantCreditsResponse>> {
    request.validate()?;

    let granted = state
        .billing_credits_service
        .admin_grant(
            identity.user_id,
            request.user_id,
            request.amount,
            request.reason.trim(),
        )
        .await?;

    Ok(Json(SuccessResponse::new(granted)))
}

/// POST /api/v1/admin/credits/{user_id}/freeze
#[instrument(skip(state, identity), fields(admin_id = %identity.user_id))]
pub async fn freeze(
    State(state): State<AppState>,
    identity: UserIdentity,
    Path(user_id): Path<Uuid>,
) -> Result<Json<CreditsBalanceResponse>> {
    let balance = state.credits_service.freeze_account(user_id).await?;

    info!(admin_id = %identity.user_id, user_id = %user_id, "Credits account frozen");

    Ok(Json(SuccessResponse::new(CreditsBalanceData::from(balance))))
}

/// POST /api/v1/admin/credits/{user_id}/unfreeze
#[instrument(skip(state, identity), fields(admin_id = %identity.user_id))]
pub async fn unfreeze(
    State(state): State<AppState>,
    identity: UserIdentity,
    Path(user_id): Path<Uuid>,
) -> Result<Json<CreditsBalanceResponse>> {
    let balance = state.credits_service.unfreeze_account(user_id).await?;

    info!(admin_id = %identity.user_id, user_id = %user_id, "Credits account unfrozen");

    Ok(Json(SuccessResponse::new(CreditsBalanceData::from(balance))))
}
