//! Probe endpoints and general HTTP behaviour.

mod common;

use axum::http::StatusCode;
use common::{body_json, deferred_app, get};

#[tokio::test]
async fn health_returns_version() {
    let app = deferred_app();
    let response = get(&app, "/health").await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn ready_reports_broker_check() {
    let app = deferred_app();
    let response = get(&app, "/ready").await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "ready");
    assert_eq!(json["checks"]["broker"]["status"], "ok");
}

#[tokio::test]
async fn responses_carry_request_id() {
    let app = deferred_app();
    let response = get(&app, "/health").await;

    let id = response.headers().get("x-request-id").unwrap().to_str().unwrap();
    assert_eq!(id.len(), 36);
    assert_eq!(response.headers().get("x-frame-options").unwrap(), "DENY");
}

#[tokio::test]
async fn unknown_route_returns_404() {
    let app = deferred_app();
    let response = get(&app, "/nope").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
