//! Broker-side job records.
//!
//! A record is the broker's view of one job: its payload, lifecycle state, return
//! value and timestamps. Records are stored as flat string hashes so they can be
//! inspected with plain Redis tooling.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use gifsync_models::{JobId, JobState, TaskStatus};

use crate::error::{QueueError, QueueResult};
use crate::job::QueueJob;

/// How a job run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// Job body returned a value
    Finished(bool),
    /// Job body returned an error
    Failed(String),
    /// Job was cancelled
    Stopped,
}

impl JobOutcome {
    pub fn state(&self) -> JobState {
        match self {
            JobOutcome::Finished(_) => JobState::Finished,
            JobOutcome::Failed(_) => JobState::Failed,
            JobOutcome::Stopped => JobState::Stopped,
        }
    }

    pub fn result(&self) -> Option<bool> {
        match self {
            JobOutcome::Finished(value) => Some(*value),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            JobOutcome::Failed(message) => Some(message),
            _ => None,
        }
    }

    /// Count the outcome in the job metrics.
    pub fn record_metric(&self, kind: &'static str) {
        match self {
            JobOutcome::Finished(_) => {
                metrics::counter!("gifsync_jobs_completed_total", "job" => kind).increment(1)
            }
            JobOutcome::Failed(_) => {
                metrics::counter!("gifsync_jobs_failed_total", "job" => kind).increment(1)
            }
            JobOutcome::Stopped => {
                metrics::counter!("gifsync_jobs_stopped_total", "job" => kind).increment(1)
            }
        }
    }
}

/// A job as tracked by the broker.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRecord {
    pub id: JobId,
    /// Owning queue
    pub queue: String,
    pub job: QueueJob,
    pub state: JobState,
    /// Return value, set once finished
    pub result: Option<bool>,
    /// Failure message, set once failed
    pub error: Option<String>,
    pub enqueued_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Name of the worker that claimed the job
    pub worker: Option<String>,
}

impl JobRecord {
    /// New queued record for a job.
    pub fn queued(queue: impl Into<String>, job: QueueJob) -> Self {
        Self {
            id: job.job_id().clone(),
            queue: queue.into(),
            job,
            state: JobState::Queued,
            result: None,
            error: None,
            enqueued_at: Utc::now(),
            started_at: None,
            ended_at: None,
            worker: None,
        }
    }

    /// Mark the record as claimed by a worker.
    pub fn start(&mut self, worker: &str, at: DateTime<Utc>) {
        self.state = JobState::Started;
        self.started_at = Some(at);
        self.worker = Some(worker.to_string());
    }

    /// Record how the run ended.
    pub fn finish(&mut self, outcome: &JobOutcome, at: DateTime<Utc>) {
        self.state = outcome.state();
        self.result = outcome.result();
        self.error = outcome.error().map(str::to_string);
        self.ended_at = Some(at);
    }

    /// Caller-facing projection of this record.
    pub fn status(&self) -> TaskStatus {
        TaskStatus::project(self.id.clone(), self.state, self.result)
    }

    /// Flatten into hash fields.
    pub fn to_fields(&self) -> QueueResult<Vec<(&'static str, String)>> {
        let mut fields = vec![
            ("payload", serde_json::to_string(&self.job)?),
            ("origin", self.queue.clone()),
            ("status", self.state.as_str().to_string()),
            ("enqueued_at", self.enqueued_at.to_rfc3339()),
        ];
        if let Some(result) = self.result {
            fields.push(("result", encode_bool(result).to_string()));
        }
        if let Some(error) = &self.error {
            fields.push(("error", error.clone()));
        }
        if let Some(at) = self.started_at {
            fields.push(("started_at", at.to_rfc3339()));
        }
        if let Some(at) = self.ended_at {
            fields.push(("ended_at", at.to_rfc3339()));
        }
        if let Some(worker) = &self.worker {
            fields.push(("worker", worker.clone()));
        }
        Ok(fields)
    }

    /// Rebuild from hash fields. The status string is validated here.
    pub fn from_fields(id: &JobId, fields: &HashMap<String, String>) -> QueueResult<Self> {
        let required = |name: &str| {
            fields.get(name).ok_or_else(|| {
                QueueError::corrupt_record(id.as_str(), format!("missing field '{}'", name))
            })
        };

        let job: QueueJob = serde_json::from_str(required("payload")?)?;
        let state = required("status")?.parse::<JobState>()?;
        let enqueued_at = parse_time(id, required("enqueued_at")?)?;

        let result = match fields.get("result") {
            Some(raw) => Some(decode_bool(raw).ok_or_else(|| {
                QueueError::corrupt_record(id.as_str(), format!("bad result '{}'", raw))
            })?),
            None => None,
        };

        Ok(Self {
            id: id.clone(),
            queue: fields.get("origin").cloned().unwrap_or_default(),
            job,
            state,
            result,
            error: fields.get("error").cloned(),
            enqueued_at,
            started_at: fields.get("started_at").map(|s| parse_time(id, s)).transpose()?,
            ended_at: fields.get("ended_at").map(|s| parse_time(id, s)).transpose()?,
            worker: fields.get("worker").cloned(),
        })
    }
}

pub(crate) fn encode_bool(value: bool) -> &'static str {
    if value {
        "1"
    } else {
        "0"
    }
}

fn decode_bool(raw: &str) -> Option<bool> {
    match raw {
        "1" | "true" => Some(true),
        "0" | "false" => Some(false),
        _ => None,
    }
}

fn parse_time(id: &JobId, raw: &str) -> QueueResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| {
            QueueError::corrupt_record(id.as_str(), format!("bad timestamp '{}': {}", raw, e))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::RetimeGifJob;
    use gifsync_models::{RetimeRequest, TaskOutcome};

    fn record() -> JobRecord {
        JobRecord::queued(
            "GifSync",
            RetimeGifJob::new(RetimeRequest::new("loop", 128.0, 4.0)).into(),
        )
    }

    fn field_map(record: &JobRecord) -> HashMap<String, String> {
        record
            .to_fields()
            .unwrap()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect()
    }

    #[test]
    fn test_fields_preserve_lifecycle() {
        let mut rec = record();
        rec.start("worker-1", Utc::now());
        rec.finish(&JobOutcome::Finished(false), Utc::now());

        let decoded = JobRecord::from_fields(&rec.id, &field_map(&rec)).unwrap();
        assert_eq!(decoded.state, JobState::Finished);
        assert_eq!(decoded.result, Some(false));
        assert_eq!(decoded.worker.as_deref(), Some("worker-1"));
        assert!(decoded.started_at.is_some());
        assert!(decoded.ended_at.is_some());
        assert_eq!(decoded.queue, "GifSync");
    }

    #[test]
    fn test_failed_outcome_clears_result() {
        let mut rec = record();
        rec.finish(&JobOutcome::Failed("gifsicle exited with 1".into()), Utc::now());
        assert_eq!(rec.state, JobState::Failed);
        assert_eq!(rec.result, None);
        assert_eq!(rec.error.as_deref(), Some("gifsicle exited with 1"));
        assert_eq!(rec.status().outcome, TaskOutcome::Error);
    }

    #[test]
    fn test_unknown_status_is_rejected() {
        let rec = record();
        let mut fields = field_map(&rec);
        fields.insert("status".into(), "deferred".into());
        assert!(matches!(
            JobRecord::from_fields(&rec.id, &fields),
            Err(QueueError::State(_))
        ));
    }

    #[test]
    fn test_missing_payload_is_corrupt() {
        let rec = record();
        let mut fields = field_map(&rec);
        fields.remove("payload");
        assert!(matches!(
            JobRecord::from_fields(&rec.id, &fields),
            Err(QueueError::CorruptRecord { .. })
        ));
    }
}
