//! Health check handlers.

use std::collections::HashMap;
use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub timestamp: String,
}

/// Liveness probe.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

#[derive(Serialize)]
pub struct CheckStatus {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

#[derive(Serialize)]
pub struct ReadyResponse {
    pub status: &'static str,
    pub checks: HashMap<&'static str, CheckStatus>,
}

/// Readiness probe. Fails while the broker is unreachable.
pub async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    let mut checks = HashMap::new();

    let started = Instant::now();
    let broker = match state.queue.ping().await {
        Ok(()) => CheckStatus {
            status: "ok",
            error: None,
            latency_ms: Some(started.elapsed().as_millis() as u64),
        },
        Err(e) => CheckStatus {
            status: "error",
            error: Some(e.to_string()),
            latency_ms: None,
        },
    };
    let healthy = broker.error.is_none();
    checks.insert("broker", broker);

    let (code, status) = if healthy {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    (code, Json(ReadyResponse { status, checks }))
}
