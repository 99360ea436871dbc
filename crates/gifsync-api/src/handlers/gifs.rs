//! Gif retiming submission.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use gifsync_models::{JobId, RetimeRequest};
use serde::{Deserialize, Serialize};
use tracing::info;
use validator::Validate;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Body of a sync request.
#[derive(Debug, Deserialize, Validate)]
pub struct SyncRequest {
    /// Beats per minute
    #[validate(range(exclusive_min = 0.0, max = 1000.0))]
    pub tempo: f64,
    /// Beats covered by one loop of the gif
    #[validate(range(exclusive_min = 0.0, max = 1000.0))]
    pub beats_per_loop: f64,
}

#[derive(Debug, Serialize)]
pub struct SyncResponse {
    pub task_id: JobId,
}

/// Queue a retiming job for a stored gif.
pub async fn sync_gif(
    State(state): State<AppState>,
    Path(gif_name): Path<String>,
    Json(request): Json<SyncRequest>,
) -> ApiResult<(StatusCode, Json<SyncResponse>)> {
    request.validate()?;
    if gif_name.trim().is_empty() {
        return Err(ApiError::bad_request("gif name must not be empty"));
    }

    let record = state
        .queue
        .enqueue_retime(RetimeRequest::new(
            gif_name.as_str(),
            request.tempo,
            request.beats_per_loop,
        ))
        .await?;

    info!(
        task_id = %record.id,
        gif = %gif_name,
        "Queued sync at {} bpm over {} beats",
        request.tempo, request.beats_per_loop
    );

    Ok((StatusCode::ACCEPTED, Json(SyncResponse { task_id: record.id })))
}
