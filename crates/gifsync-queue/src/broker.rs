//! Broker seam.

use std::time::Duration;

use async_trait::async_trait;
use gifsync_models::JobId;

use crate::error::QueueResult;
use crate::record::{JobOutcome, JobRecord};

/// Error recorded on started jobs whose worker stopped reporting.
pub const ABANDONED_ERROR: &str = "job abandoned: started longer ago than the visibility timeout";

/// Durable store of job records for one named queue.
///
/// Implementations must hand each queued job to at most one `claim_next` caller and
/// keep the record state consistent with queue and started-registry membership.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Store a queued record and append it to the queue.
    async fn enqueue(&self, record: &JobRecord) -> QueueResult<()>;

    /// Store a record without queueing it (inline dispatch).
    async fn save(&self, record: &JobRecord) -> QueueResult<()>;

    async fn fetch(&self, id: &JobId) -> QueueResult<Option<JobRecord>>;

    /// Ids waiting in the queue, oldest first.
    async fn queued_ids(&self) -> QueueResult<Vec<JobId>>;

    /// Ids currently executing, in claim order.
    async fn started_ids(&self) -> QueueResult<Vec<JobId>>;

    /// Remove a job from the queue. Returns whether it was there.
    async fn remove_queued(&self, id: &JobId) -> QueueResult<bool>;

    /// Pop the oldest queued job and mark it started by `worker`.
    async fn claim_next(&self, worker: &str) -> QueueResult<Option<JobRecord>>;

    /// Record how a job ended and drop it from the started registry.
    async fn finish(&self, id: &JobId, outcome: &JobOutcome) -> QueueResult<()>;

    /// Ask the worker running a job to stop it.
    async fn send_stop(&self, id: &JobId) -> QueueResult<()>;

    async fn stop_requested(&self, id: &JobId) -> QueueResult<bool>;

    /// Mark started jobs claimed at least `visibility_timeout` ago as failed with
    /// [`ABANDONED_ERROR`] and drop them from the started registry. Returns their ids.
    async fn fail_abandoned(&self, visibility_timeout: Duration) -> QueueResult<Vec<JobId>>;

    /// Check that the broker is reachable.
    async fn ping(&self) -> QueueResult<()>;
}
