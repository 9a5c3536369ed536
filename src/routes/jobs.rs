use axum::{extract::State, Json};
use serde_json::{json, Value};
use time::OffsetDateTime;
use tracing::{info, instrument};

use crate::{
    app_state::AppState,
    error::Result,
    models::{
        common::SuccessResponse,
        credits::{ExpireBatchesData, ExpireBatchesResponse},
    },
};

/// POST /api/v1/jobs/credits/expire
#[instrument(skip(state))]
pub async fn expire_credits(State(state): State<AppState>) -> Result<Json<ExpireBatchesResponse>> {
    let details = state.credits_service.process_expired_batches().await?;

    info!(processed = details.len(), "Expiry job finished");

    Ok(Json(SuccessResponse::new(ExpireBatchesData {
        processed: details.len(),
        details,
        timestamp: OffsetDateTime::now_utc(),
    })))
}

/// GET /api/v1/jobs/credits/expire
pub async fn describe_expire_job() -> Json<Value> {
    Json(json!({
        "job": "credits-expire",
        "description": "Expires credit batches whose expiry time has passed",
        "method": "POST",
        "auth": "Bearer <internal secret>",
    }))
}
