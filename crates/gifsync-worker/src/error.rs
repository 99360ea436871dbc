//! Worker error types.

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Job failed: {0}")]
    JobFailed(String),

    #[error("Storage error: {0}")]
    Storage(#[from] gifsync_storage::StorageError),

    #[error("Media error: {0}")]
    Media(#[from] gifsync_media::MediaError),

    #[error("Queue error: {0}")]
    Queue(#[from] gifsync_queue::QueueError),
}

impl WorkerError {
    pub fn job_failed(msg: impl Into<String>) -> Self {
        Self::JobFailed(msg.into())
    }
}
