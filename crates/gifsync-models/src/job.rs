//! Job definitions shared by the API, queue and worker.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Name of the single shared queue.
pub const QUEUE_NAME: &str = "GifSync";

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Lifecycle state of a job as reported by the broker.
///
/// `queued -> started -> {finished, failed, stopped}`. The last three are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Waiting in the queue for a worker
    #[default]
    Queued,
    /// Claimed by a worker and executing
    Started,
    /// Job body returned (either `true` or `false`)
    Finished,
    /// Job body returned an error
    Failed,
    /// Cancelled before or during execution
    Stopped,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::Started => "started",
            JobState::Finished => "finished",
            JobState::Failed => "failed",
            JobState::Stopped => "stopped",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Finished | JobState::Failed | JobState::Stopped)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raised when the broker reports a status string outside the known set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown job state: {0}")]
pub struct ParseJobStateError(pub String);

impl FromStr for JobState {
    type Err = ParseJobStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "queued" => Ok(JobState::Queued),
            "started" => Ok(JobState::Started),
            "finished" => Ok(JobState::Finished),
            "failed" => Ok(JobState::Failed),
            "stopped" => Ok(JobState::Stopped),
            _ => Err(ParseJobStateError(s.to_string())),
        }
    }
}

/// Parameters of a retiming request: which gif, and what tempo to sync it to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetimeRequest {
    /// Blob identifier of the gif in storage
    pub gif_name: String,
    /// Tempo in beats per minute
    pub tempo: f64,
    /// Number of beats one loop of the gif should span
    pub beats_per_loop: f64,
}

impl RetimeRequest {
    pub fn new(gif_name: impl Into<String>, tempo: f64, beats_per_loop: f64) -> Self {
        Self {
            gif_name: gif_name.into(),
            tempo,
            beats_per_loop,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_state_parse_is_case_insensitive() {
        assert_eq!("FINISHED".parse::<JobState>().unwrap(), JobState::Finished);
        assert_eq!(" started ".parse::<JobState>().unwrap(), JobState::Started);
        assert_eq!("stopped".parse::<JobState>().unwrap(), JobState::Stopped);
    }

    #[test]
    fn test_job_state_rejects_unknown() {
        let err = "deferred".parse::<JobState>().unwrap_err();
        assert_eq!(err, ParseJobStateError("deferred".to_string()));
    }

    #[test]
    fn test_terminal_states() {
        assert!(!JobState::Queued.is_terminal());
        assert!(!JobState::Started.is_terminal());
        assert!(JobState::Finished.is_terminal());
        assert!(JobState::Failed.is_terminal());
        assert!(JobState::Stopped.is_terminal());
    }

    #[test]
    fn test_job_state_display_matches_parse() {
        for state in [
            JobState::Queued,
            JobState::Started,
            JobState::Finished,
            JobState::Failed,
            JobState::Stopped,
        ] {
            assert_eq!(state.to_string().parse::<JobState>().unwrap(), state);
        }
    }

    #[test]
    fn test_job_id_unique() {
        assert_ne!(JobId::new(), JobId::new());
    }
}
