use axum::{
    extract::{Query, State},
    Json,
};
use tracing::instrument;
use validator::Validate;

use crate::{
    app_state::AppState,
    error::{ApiError, AppJson, Result},
    middleware::UserIdentity,
    models::{
        common::SuccessResponse,
        credits::{
            ActiveBatchesResponse, CheckCreditsData, CheckCreditsRequest, CheckCreditsResponse,
            ConsumeCreditsRequest, ConsumeCreditsResponse, CreditsBalanceData,
            CreditsBalanceResponse, PackagesResponse, TransactionsQuery, TransactionsResponse,
        },
    },
    services::credits_service::ConsumeCredits,
};

/// GET /api/v1/credits/balance
#[instrument(skip(state, identity), fields(user_id = %identity.user_id))]
pub async fn get_balance(
    State(state): State<AppState>,
    identity: UserIdentity,
) -> Result<Json<CreditsBalanceResponse>> {
    let bonus = state
        .registration_bonus_service
        .ensure_registration_bonus(identity.user_id)
        .await?;

    let balance = state
        .credits_service
        .get_credits_balance(identity.user_id)
        .await?;

    let mut data = CreditsBalanceData::from(balance);
    if bonus.is_some() {
        data.registration_bonus_granted = Some(true);
    }

    Ok(Json(SuccessResponse::new(data)))
}

/// GET /api/v1/credits/batches
#[instrument(skip(state, identity), fields(user_id = %identity.user_id))]
pub async fn get_batches(
    State(state): State<AppState>,
    identity: UserIdentity,
) -> Result<Json<ActiveBatchesResponse>> {
    let batches = state
        .credits_service
        .get_user_active_batches(identity.user_id)
        .await?;

    Ok(Json(SuccessResponse::new(
        batches.into_iter().map(Into::into).collect(),
    )))
}

/// GET /api/v1/credits/transactions
#[instrument(skip(state, identity), fields(user_id = %identity.user_id))]
pub async fn get_transactions(
    State(state): State<AppState>,
    identity: UserIdentity,
    Query(query): Query<TransactionsQuery>,
) -> Result<Json<TransactionsResponse>> {
    query.validate()?;

    let transactions = state
        .credits_service
        .get_user_transactions(identity.user_id, query.limit, query.offset)
        .await?;

    Ok(Json(SuccessResponse::new(
        transactions.into_iter().map(Into::into).collect(),
    )))
}

/// POST /api/v1/credits/consume
#[instrument(skip(state, identity, request), fields(user_id = %identity.user_id))]
pub async fn consume(
    State(state): State<AppState>,
    identity: UserIdentity,
    AppJson(request): AppJson<ConsumeCreditsRequest>,
) -> Result<Json<ConsumeCreditsResponse>> {
    request.validate()?;

    if request.service_name.contains(':') {
        return Err(ApiError::BadRequest(
            "serviceName must not contain ':'".to_string(),
        ));
    }

    let consumed = state
        .credits_service
        .consume_credits(ConsumeCredits {
            user_id: identity.user_id,
            amount: request.amount,
            service_name: request.service_name,
            description: request.description,
            metadata: request.metadata,
            idempotency_key: request.idempotency_key,
        })
        .await?;

    Ok(Json(SuccessResponse::new(consumed)))
}

/// POST /api/v1/credits/check
#[instrument(skip(state, identity, request), fields(user_id = %identity.user_id))]
pub async fn check(
    State(state): State<AppState>,
    identity: UserIdentity,
    AppJson(request): AppJson<CheckCreditsRequest>,
) -> Result<Json<CheckCreditsResponse>> {
    request.validate()?;

    let (available, balance) = state
        .credits_service
        .check_credits_available(identity.user_id, request.amount)
        .await?;

    Ok(Json(SuccessResponse::new(CheckCreditsData {
        available,
        current_balance: balance.balance,
        required: request.amount,
        status: balance.status,
    })))
}

/// GET /api/v1/credits/packages
pub async fn get_packages(State(state): State<AppState>) -> Json<PackagesResponse> {
    Json(SuccessResponse::new(state.config.credits.packages.clone()))
}
