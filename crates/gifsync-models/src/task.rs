//! Simplified task view exposed to API callers.
//!
//! The broker tracks five states plus the job's return value. Callers only see
//! whether the task is complete and whether it ended well. A job that finished but
//! returned `false` (nothing to do, e.g. the gif is gone) is reported as an error.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::job::{JobId, JobState, ParseJobStateError};

/// Outcome of a task as seen by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskOutcome {
    #[default]
    Ok,
    Error,
}

impl TaskOutcome {
    /// HTTP-style status code associated with the outcome.
    pub fn status_code(&self) -> u16 {
        match self {
            TaskOutcome::Ok => 200,
            TaskOutcome::Error => 500,
        }
    }
}

/// Projection of a job's broker state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStatus {
    pub task_id: JobId,
    pub complete: bool,
    /// Not serialized; carried to callers as the response status code
    #[serde(skip)]
    pub outcome: TaskOutcome,
    /// Raw broker state
    pub state: JobState,
}

impl TaskStatus {
    /// Project a broker state and job result onto the caller-facing view.
    pub fn project(task_id: JobId, state: JobState, result: Option<bool>) -> Self {
        let complete = state == JobState::Finished;
        let outcome = match state {
            JobState::Failed | JobState::Stopped => TaskOutcome::Error,
            JobState::Finished if result == Some(false) => TaskOutcome::Error,
            _ => TaskOutcome::Ok,
        };

        Self {
            task_id,
            complete,
            outcome,
            state,
        }
    }

    pub fn status_code(&self) -> u16 {
        self.outcome.status_code()
    }
}

/// Filter for bulk listing and cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskFilter {
    Queued,
    Started,
}

impl TaskFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskFilter::Queued => "queued",
            TaskFilter::Started => "started",
        }
    }

    /// Whether a filter selection includes this filter. No selection includes everything.
    pub fn selected_by(&self, selection: Option<TaskFilter>) -> bool {
        selection.map_or(true, |f| f == *self)
    }
}

impl fmt::Display for TaskFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskFilter {
    type Err = ParseJobStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "queued" => Ok(TaskFilter::Queued),
            "started" => Ok(TaskFilter::Started),
            _ => Err(ParseJobStateError(s.to_string())),
        }
    }
}
