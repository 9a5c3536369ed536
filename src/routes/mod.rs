// Route modules
pub mod admin;
pub mod credits;
pub mod internal;
pub mod jobs;

use crate::{
    app_state::AppState,
    error::ApiError,
    middleware::{internal_auth_middleware, jwt_auth_middleware, logging_middleware, require_admin},
};
use axum::{
    handler::Handler,
    http::StatusCode,
    middleware,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
};

/// Create the main API router
pub fn create_router(state: AppState) -> Router {
    let timeout = Duration::from_secs(state.config.server.request_timeout_secs);

    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api_v1_routes(state.clone()))
        .fallback(not_found)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(middleware::from_fn(logging_middleware))
                .layer(TimeoutLayer::with_status_code(
                    StatusCode::REQUEST_TIMEOUT,
                    timeout,
                )),
        )
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn not_found() -> ApiError {
    ApiError::NotFound("Route not found".to_string())
}

/// API v1 routes
fn api_v1_routes(state: AppState) -> Router<AppState> {
    // Account owner routes (JWT)
    let user_routes = Router::new()
        .route("/credits/balance", get(credits::get_balance))
        .route("/credits/batches", get(credits::get_batches))
        .route("/credits/transactions", get(credits::get_transactions))
        .route("/credits/consume", post(credits::consume))
        .route("/credits/check", post(credits::check))
        .route("/credits/packages", get(credits::get_packages))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            jwt_auth_middleware,
        ));

    // Admin routes (JWT with admin role)
    let admin_routes = Router::new()
        .route("/admin/credits/grant", post(admin::grant))
        .route("/admin/credits/{user_id}/freeze", post(admin::freeze))
        .route("/admin/credits/{user_id}/unfreeze", post(admin::unfreeze))
        .layer(middleware::from_fn(require_admin))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            jwt_auth_middleware,
        ));

    // Billing hooks (shared secret)
    let internal_routes = Router::new()
        .route("/internal/credits/purchase", post(internal::purchase))
        .route("/internal/credits/subscription", post(internal::subscription))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            internal_auth_middleware,
        ));

    // Cron jobs: POST runs the job behind the shared secret, GET describes it
    let job_routes = Router::new().route(
        "/jobs/credits/expire",
        get(jobs::describe_expire_job).post(jobs::expire_credits.layer(
            middleware::from_fn_with_state(state.clone(), internal_auth_middleware),
        )),
    );

    Router::new()
        .merge(user_routes)
        .merge(admin_routes)
        .merge(internal_routes)
        .merge(job_routes)
}
