//! Job payloads carried through the queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use gifsync_models::{JobId, RetimeRequest};

/// Job to re-time a stored gif to a tempo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetimeGifJob {
    /// Unique job ID
    pub job_id: JobId,
    /// Blob identifier of the gif
    pub gif_name: String,
    /// Tempo in beats per minute
    pub tempo: f64,
    /// Beats spanned by one loop
    pub beats_per_loop: f64,
    /// When the job was created
    pub created_at: DateTime<Utc>,
}

impl RetimeGifJob {
    pub fn new(request: RetimeRequest) -> Self {
        Self {
            job_id: JobId::new(),
            gif_name: request.gif_name,
            tempo: request.tempo,
            beats_per_loop: request.beats_per_loop,
            created_at: Utc::now(),
        }
    }

    /// The request this job was created from.
    pub fn request(&self) -> RetimeRequest {
        RetimeRequest::new(self.gif_name.clone(), self.tempo, self.beats_per_loop)
    }
}

/// Generic job wrapper for queue storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueueJob {
    /// Re-time a gif's frame delays to a tempo
    RetimeGif(RetimeGifJob),
}

impl QueueJob {
    pub fn job_id(&self) -> &JobId {
        match self {
            QueueJob::RetimeGif(j) => &j.job_id,
        }
    }

    /// Short name used in logs and metrics labels.
    pub fn kind(&self) -> &'static str {
        match self {
            QueueJob::RetimeGif(_) => "retime_gif",
        }
    }
}

impl From<RetimeGifJob> for QueueJob {
    fn from(job: RetimeGifJob) -> Self {
        QueueJob::RetimeGif(job)
    }
}
