//! Hooks called by the billing integration once a payment has settled

use axum::{extract::State, Json};
use tracing::instrument;
use validator::Validate;

use crate::{
    app_state::AppState,
    error::{AppJson, Result},
    models::{
        common::SuccessResponse,
        credits::{
            GrantCreditsResponse, PurchaseGrantRequest, SubscriptionGrantRequest,
            SubscriptionGrantResponse,
        },
    },
    services::billing_credits_service::SubscriptionPeriod,
};

/// POST /api/v1/internal/credits/purchase
#[instrument(skip(state, request), fields(user_id = %request.user_id, payment_id = %request.payment_id))]
pub async fn purchase(
    State(state): State<AppState>,
    AppJson(request): AppJson<PurchaseGrantRequest>,
) -> Result<Json<GrantCreditsResponse>> {
    request.validate()?;

    let granted = state
        .billing_credits_service
        .grant_purchase(
            request.user_id,
            request.credits,
            &request.payment_id,
            request.package_id.as_deref(),
        )
        .await?;

    Ok(Json(SuccessResponse::new(granted)))
}

/// POST /api/v1/internal/credits/subscription
#[instrument(skip(state, request), fields(user_id = %request.user_id, subscription_id = %request.subscription_id))]
pub async fn subscription(
    State(state): State<AppState>,
    AppJson(request): AppJson<SubscriptionGrantRequest>,
) -> Result<Json<SubscriptionGrantResponse>> {
    request.validate()?;

    let outcome = state
        .billing_credits_service
        .grant_subscription_period(SubscriptionPeriod {
            user_id: request.user_id,
            subscription_id: request.subscription_id,
            plan: request.plan,
            period_start: request.period_start,
            period_end: request.period_end,
            billing_reason: request.billing_reason,
        })
        .await?;

    Ok(Json(SuccessResponse::new(outcome)))
}
