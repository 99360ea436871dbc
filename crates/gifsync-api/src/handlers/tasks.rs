//! Task status, listing and cancellation.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use gifsync_models::{JobId, TaskFilter, TaskStatus};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct TaskQuery {
    /// Restrict to queued or started tasks
    pub status: Option<TaskFilter>,
}

#[derive(Debug, Serialize)]
pub struct TaskListResponse {
    pub queued: Vec<JobId>,
    pub started: Vec<JobId>,
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub cancelled: Vec<JobId>,
}

/// Simplified status of one task.
///
/// The body is always the projection; the response code carries whether the task
/// ended well (200) or not (500).
pub async fn get_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> ApiResult<(StatusCode, Json<TaskStatus>)> {
    let id = JobId::from(task_id);
    let status = state
        .queue
        .status(&id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("task {}", id)))?;

    let code = StatusCode::from_u16(status.status_code())
        .map_err(|e| ApiError::internal(e.to_string()))?;
    Ok((code, Json(status)))
}

/// Ids of pending tasks, optionally restricted to one state.
pub async fn list_tasks(
    State(state): State<AppState>,
    Query(query): Query<TaskQuery>,
) -> ApiResult<Json<TaskListResponse>> {
    let queued = state.queue.list(TaskFilter::Queued, query.status).await?;
    let started = state.queue.list(TaskFilter::Started, query.status).await?;
    Ok(Json(TaskListResponse { queued, started }))
}

/// Cancel every pending task matching the filter.
pub async fn cancel_tasks(
    State(state): State<AppState>,
    Query(query): Query<TaskQuery>,
) -> ApiResult<Json<CancelResponse>> {
    let cancelled = state.queue.cancel_matching(query.status).await?;
    info!(
        "Cancelled {} tasks (filter: {})",
        cancelled.len(),
        query.status.map(|f| f.as_str()).unwrap_or("all")
    );
    Ok(Json(CancelResponse { cancelled }))
}
