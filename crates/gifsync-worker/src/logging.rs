//! Structured job logging.

use std::time::Instant;

use gifsync_models::JobId;
use tracing::{error, info, warn, Span};

/// Logs job lifecycle events with `job_id`, `operation` and elapsed time attached.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    operation: &'static str,
    started: Instant,
}

impl JobLogger {
    pub fn new(job_id: &JobId, operation: &'static str) -> Self {
        Self {
            job_id: job_id.to_string(),
            operation,
            started: Instant::now(),
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(job_id = %self.job_id, operation = self.operation, "Job started: {}", message);
    }

    pub fn log_progress(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            operation = self.operation,
            elapsed_ms = self.elapsed_ms(),
            "Job progress: {}", message
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(job_id = %self.job_id, operation = self.operation, "Job warning: {}", message);
    }

    pub fn log_error(&self, message: &str) {
        error!(
            job_id = %self.job_id,
            operation = self.operation,
            elapsed_ms = self.elapsed_ms(),
            "Job error: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            operation = self.operation,
            elapsed_ms = self.elapsed_ms(),
            "Job completed: {}", message
        );
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn operation(&self) -> &'static str {
        self.operation
    }

    /// Milliseconds since the logger was created.
    pub fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    /// Span carrying the job fields, for instrumenting the job future.
    pub fn span(&self) -> Span {
        tracing::info_span!("job", job_id = %self.job_id, operation = self.operation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_logger_fields() {
        let job_id = JobId::new();
        let logger = JobLogger::new(&job_id, "retime_gif");

        assert_eq!(logger.job_id(), job_id.as_str());
        assert_eq!(logger.operation(), "retime_gif");
        assert!(logger.elapsed_ms() < 60_000);
    }
}
