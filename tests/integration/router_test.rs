//! Router behaviour that resolves before any storage access

use crate::common::{offline_state, token_for, INTERNAL_SECRET};
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use credits_ledger::{models::common::UserRole, routes::create_router};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

fn app(internal_secret: Option<&str>) -> Router {
    create_router(offline_state(internal_secret))
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn get(uri: &str, bearer: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(Method::GET).uri(uri);
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::empty()).unwrap()
}

fn post_json(uri: &str, bearer: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

#[tokio::test]
async fn test_health() {
    let (status, body) = send(app(None), get("/health", None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_request_id_is_returned() {
    let response = app(None).oneshot(get("/health", None)).await.unwrap();

    assert!(response.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn test_unknown_route_uses_error_envelope() {
    let (status, body) = send(app(None), get("/does-not-exist", None)).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_balance_requires_token() {
    let (status, body) = send(app(None), get("/api/v1/credits/balance", None)).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_balance_rejects_bad_token() {
    let (status, body) = send(
        app(None),
        get("/api/v1/credits/balance", Some("not.a.token")),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "INVALID_TOKEN");
}

#[tokio::test]
async fn test_packages_listed() {
    let token = token_for(Uuid::new_v4(), UserRole::User);
    let (status, body) = send(app(None), get("/api/v1/credits/packages", Some(&token))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let packages = body["data"].as_array().unwrap();
    assert_eq!(packages.len(), 3);
    assert_eq!(packages[1]["id"], "standard");
    assert_eq!(packages[1]["credits"], 8000);
    assert_eq!(packages[1]["priceCents"], 800);
    assert_eq!(packages[1]["popular"], true);
}

#[tokio::test]
async fn test_consume_validates_amount() {
    let token = token_for(Uuid::new_v4(), UserRole::User);
    let (status, body) = send(
        app(None),
        post_json(
            "/api/v1/credits/consume",
            Some(&token),
            json!({ "amount": 0, "serviceName": "chat" }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_transactions_rejects_huge_offset() {
    let token = token_for(Uuid::new_v4(), UserRole::User);
    let (status, body) = send(
        app(None),
        get(
            "/api/v1/credits/transactions?offset=9223372036854775808",
            Some(&token),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_consume_rejects_account_separator_in_service_name() {
    let token = token_for(Uuid::new_v4(), UserRole::User);
    let (status, _) = send(
        app(None),
        post_json(
            "/api/v1/credits/consume",
            Some(&token),
            json!({ "amount": 5, "serviceName": "chat:gpt" }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_malformed_json_uses_error_envelope() {
    let token = token_for(Uuid::new_v4(), UserRole::User);
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/v1/credits/check")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::from("{\"amount\":"))
        .unwrap();

    let (status, body) = send(app(None), request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_admin_routes_require_admin_role() {
    let token = token_for(Uuid::new_v4(), UserRole::User);
    let (status, body) = send(
        app(None),
        post_json(
            "/api/v1/admin/credits/grant",
            Some(&token),
            json!({ "userId": Uuid::new_v4(), "amount": 100, "reason": "support" }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "FORBIDDEN");

    let uri = format!("/api/v1/admin/credits/{}/freeze", Uuid::new_v4());
    let (status, _) = send(app(None), post_json(&uri, Some(&token), json!({}))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_admin_grant_validates_body() {
    let token = token_for(Uuid::new_v4(), UserRole::Admin);
    let (status, _) = send(
        app(None),
        post_json(
            "/api/v1/admin/credits/grant",
            Some(&token),
            json!({ "userId": Uuid::new_v4(), "amount": 0, "reason": "support" }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_internal_routes_reject_without_configured_secret() {
    let (status, _) = send(
        app(None),
        post_json(
            "/api/v1/internal/credits/purchase",
            Some(INTERNAL_SECRET),
            json!({ "userId": Uuid::new_v4(), "paymentId": "pay_1", "packageId": "starter" }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_internal_routes_reject_wrong_secret() {
    let (status, body) = send(
        app(Some(INTERNAL_SECRET)),
        post_json(
            "/api/v1/internal/credits/purchase",
            Some("wrong-secret"),
            json!({ "userId": Uuid::new_v4(), "paymentId": "pay_1", "packageId": "starter" }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_purchase_with_unknown_package() {
    let (status, body) = send(
        app(Some(INTERNAL_SECRET)),
        post_json(
            "/api/v1/internal/credits/purchase",
            Some(INTERNAL_SECRET),
            json!({ "userId": Uuid::new_v4(), "paymentId": "pay_1", "packageId": "mega" }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("Unknown credit package"));
}

#[tokio::test]
async fn test_subscription_with_inverted_period() {
    let (status, _) = send(
        app(Some(INTERNAL_SECRET)),
        post_json(
            "/api/v1/internal/credits/subscription",
            Some(INTERNAL_SECRET),
            json!({
                "userId": Uuid::new_v4(),
                "subscriptionId": "sub_1",
                "plan": "starter",
                "periodStart": "2025-02-01T00:00:00Z",
                "periodEnd": "2025-01-01T00:00:00Z"
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_subscription_with_unknown_plan() {
    let (status, _) = send(
        app(Some(INTERNAL_SECRET)),
        post_json(
            "/api/v1/internal/credits/subscription",
            Some(INTERNAL_SECRET),
            json!({
                "userId": Uuid::new_v4(),
                "subscriptionId": "sub_1",
                "plan": "enterprise",
                "periodStart": "2025-01-01T00:00:00Z",
                "periodEnd": "2025-02-01T00:00:00Z"
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_expire_job_describe_is_public() {
    let (status, body) = send(app(None), get("/api/v1/jobs/credits/expire", None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["method"], "POST");
}

#[tokio::test]
async fn test_expire_job_requires_secret() {
    let (status, _) = send(
        app(Some(INTERNAL_SECRET)),
        post_json("/api/v1/jobs/credits/expire", None, json!({})),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
