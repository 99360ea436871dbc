//! Shared helpers for API integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use tower::ServiceExt;

use gifsync_api::{create_router, ApiConfig, AppState};
use gifsync_models::QUEUE_NAME;
use gifsync_queue::{DispatchMode, HandlerResult, JobHandler, JobQueue, MemoryBroker, QueueJob};

/// Handler returning a fixed job result.
pub struct FixedHandler(pub bool);

#[async_trait]
impl JobHandler for FixedHandler {
    async fn handle(&self, _job: &QueueJob) -> HandlerResult {
        Ok(self.0)
    }
}

/// App whose jobs stay queued until cancelled.
pub fn deferred_app() -> Router {
    let queue = JobQueue::new(QUEUE_NAME, Arc::new(MemoryBroker::new()), DispatchMode::Deferred);
    create_router(AppState::with_queue(ApiConfig::default(), queue), None)
}

/// App that runs each job during the request with a handler returning `result`.
pub fn inline_app(result: bool) -> Router {
    let queue = JobQueue::new(
        QUEUE_NAME,
        Arc::new(MemoryBroker::new()),
        DispatchMode::Inline(Arc::new(FixedHandler(result))),
    );
    create_router(AppState::with_queue(ApiConfig::default(), queue), None)
}

pub async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    body: Option<serde_json::Value>,
) -> Response<Body> {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    app.clone().oneshot(request).await.unwrap()
}

pub async fn get(app: &Router, uri: &str) -> Response<Body> {
    send(app, Method::GET, uri, None).await
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Submit a sync request and return the new task id.
pub async fn submit(app: &Router, gif: &str) -> String {
    let response = send(
        app,
        Method::POST,
        &format!("/gifs/{}/sync", gif),
        Some(serde_json::json!({"tempo": 120.0, "beats_per_loop": 4.0})),
    )
    .await;
    assert_eq!(response.status(), axum::http::StatusCode::ACCEPTED);
    body_json(response).await["task_id"]
        .as_str()
        .unwrap()
        .to_string()
}
