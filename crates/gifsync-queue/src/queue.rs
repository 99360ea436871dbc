//! Task queue adapter.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use gifsync_models::{JobId, JobState, RetimeRequest, TaskFilter, TaskStatus, QUEUE_NAME};
use tracing::{debug, info, warn};

use crate::broker::Broker;
use crate::error::{QueueError, QueueResult};
use crate::job::{QueueJob, RetimeGifJob};
use crate::memory::MemoryBroker;
use crate::record::{JobOutcome, JobRecord};
use crate::redis_broker::RedisBroker;

/// Worker name recorded on jobs executed at enqueue time.
const INLINE_WORKER: &str = "inline";

/// How enqueued jobs get executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchKind {
    /// Stored in the broker and run later by a worker process
    #[default]
    Deferred,
    /// Run to completion before `enqueue` returns
    Inline,
}

impl DispatchKind {
    fn parse(raw: &str) -> QueueResult<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "deferred" => Ok(DispatchKind::Deferred),
            "inline" => Ok(DispatchKind::Inline),
            other => Err(QueueError::config(format!(
                "QUEUE_MODE must be 'deferred' or 'inline', got '{}'",
                other
            ))),
        }
    }
}

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Redis URL
    pub redis_url: String,
    /// Name of the queue
    pub queue_name: String,
    /// Prefix for every broker key
    pub key_prefix: String,
    /// Dispatch strategy
    pub mode: DispatchKind,
    /// How long finished jobs are kept
    pub result_ttl: Duration,
    /// How long failed and stopped jobs are kept
    pub failure_ttl: Duration,
    /// How long a job may stay started before it is considered abandoned
    pub visibility_timeout: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379/0".to_string(),
            queue_name: QUEUE_NAME.to_string(),
            key_prefix: "gifsync".to_string(),
            mode: DispatchKind::Deferred,
            result_ttl: Duration::from_secs(500),
            failure_ttl: Duration::from_secs(365 * 24 * 3600),
            visibility_timeout: Duration::from_secs(3600),
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> QueueResult<Self> {
        let defaults = Self::default();
        Ok(Self {
            redis_url: std::env::var("REDIS_URL").unwrap_or(defaults.redis_url),
            queue_name: std::env::var("QUEUE_NAME").unwrap_or(defaults.queue_name),
            key_prefix: std::env::var("QUEUE_KEY_PREFIX").unwrap_or(defaults.key_prefix),
            mode: match std::env::var("QUEUE_MODE") {
                Ok(raw) => DispatchKind::parse(&raw)?,
                Err(_) => defaults.mode,
            },
            result_ttl: std::env::var("QUEUE_RESULT_TTL")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.result_ttl),
            failure_ttl: std::env::var("QUEUE_FAILURE_TTL")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.failure_ttl),
            visibility_timeout: std::env::var("QUEUE_VISIBILITY_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.visibility_timeout),
        })
    }
}

pub type HandlerResult = Result<bool, Box<dyn std::error::Error + Send + Sync>>;

/// Executes job bodies.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: &QueueJob) -> HandlerResult;
}

/// Dispatch strategy with its runtime dependencies.
#[derive(Clone)]
pub enum DispatchMode {
    Deferred,
    Inline(Arc<dyn JobHandler>),
}

/// Client for the shared job queue.
///
/// Holds only the broker handle; every operation goes to the broker.
#[derive(Clone)]
pub struct JobQueue {
    name: String,
    broker: Arc<dyn Broker>,
    mode: DispatchMode,
}

impl JobQueue {
    pub fn new(name: impl Into<String>, broker: Arc<dyn Broker>, mode: DispatchMode) -> Self {
        Self {
            name: name.into(),
            broker,
            mode,
        }
    }

    /// Build the queue for a configuration.
    ///
    /// Deferred mode talks to Redis. Inline mode runs jobs through `handler` on an
    /// in-process broker and fails without one.
    pub fn connect(
        config: &QueueConfig,
        handler: Option<Arc<dyn JobHandler>>,
    ) -> QueueResult<Self> {
        match config.mode {
            DispatchKind::Deferred => {
                let broker = RedisBroker::new(config)?;
                info!("Queue {} using Redis broker", config.queue_name);
                Ok(Self::new(&config.queue_name, Arc::new(broker), DispatchMode::Deferred))
            }
            DispatchKind::Inline => {
                let handler = handler
                    .ok_or_else(|| QueueError::config("inline dispatch requires a job handler"))?;
                info!("Queue {} running jobs inline", config.queue_name);
                Ok(Self::new(
                    &config.queue_name,
                    Arc::new(MemoryBroker::new()),
                    DispatchMode::Inline(handler),
                ))
            }
        }
    }

    /// Create from environment variables.
    pub fn from_env(handler: Option<Arc<dyn JobHandler>>) -> QueueResult<Self> {
        Self::connect(&QueueConfig::from_env()?, handler)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn broker(&self) -> Arc<dyn Broker> {
        Arc::clone(&self.broker)
    }

    pub fn is_inline(&self) -> bool {
        matches!(self.mode, DispatchMode::Inline(_))
    }

    /// Submit a job. In inline mode the job has already run when this returns.
    pub async fn enqueue(&self, job: impl Into<QueueJob>) -> QueueResult<JobRecord> {
        let record = JobRecord::queued(&self.name, job.into());

        let record = match &self.mode {
            DispatchMode::Deferred => {
                self.broker.enqueue(&record).await?;
                record
            }
            DispatchMode::Inline(handler) => self.run_inline(handler.as_ref(), record).await?,
        };

        metrics::counter!("gifsync_jobs_enqueued_total", "queue" => self.name.clone())
            .increment(1);
        info!("Enqueued {} job {} on {}", record.job.kind(), record.id, self.name);
        Ok(record)
    }

    /// Submit a retiming job.
    pub async fn enqueue_retime(&self, request: RetimeRequest) -> QueueResult<JobRecord> {
        self.enqueue(RetimeGifJob::new(request)).await
    }

    async fn run_inline(
        &self,
        handler: &dyn JobHandler,
        mut record: JobRecord,
    ) -> QueueResult<JobRecord> {
        record.start(INLINE_WORKER, Utc::now());
        self.broker.save(&record).await?;

        let outcome = match handler.handle(&record.job).await {
            Ok(value) => JobOutcome::Finished(value),
            Err(e) => {
                warn!("Inline job {} failed: {}", record.id, e);
                JobOutcome::Failed(e.to_string())
            }
        };
        outcome.record_metric(record.job.kind());

        self.broker.finish(&record.id, &outcome).await?;
        record.finish(&outcome, Utc::now());
        Ok(record)
    }

    pub async fn get(&self, id: &JobId) -> QueueResult<Option<JobRecord>> {
        self.broker.fetch(id).await
    }

    /// Caller-facing status of a job, `None` if the broker does not know it.
    pub async fn status(&self, id: &JobId) -> QueueResult<Option<TaskStatus>> {
        Ok(self.get(id).await?.map(|record| record.status()))
    }

    pub async fn list_queued(&self) -> QueueResult<Vec<JobId>> {
        self.broker.queued_ids().await
    }

    pub async fn list_started(&self) -> QueueResult<Vec<JobId>> {
        self.broker.started_ids().await
    }

    /// Ids matching a filter. No filter selects both groups.
    pub async fn list(
        &self,
        filter: TaskFilter,
        selection: Option<TaskFilter>,
    ) -> QueueResult<Vec<JobId>> {
        if !filter.selected_by(selection) {
            return Ok(Vec::new());
        }
        match filter {
            TaskFilter::Queued => self.list_queued().await,
            TaskFilter::Started => self.list_started().await,
        }
    }

    /// Cancel a job.
    ///
    /// A started job is sent a stop signal; a queued job is removed from the queue and
    /// marked stopped. Returns `false` for finished or unknown jobs, including a queued
    /// job that a worker claimed and completed while it was being cancelled.
    pub async fn cancel(&self, id: &JobId) -> QueueResult<bool> {
        let Some(record) = self.broker.fetch(id).await? else {
            debug!("Cancel of unknown job {}", id);
            return Ok(false);
        };

        let cancelled = match record.state {
            JobState::Started => {
                self.broker.send_stop(id).await?;
                info!("Sent stop signal to job {}", id);
                true
            }
            JobState::Queued => {
                if self.broker.remove_queued(id).await? {
                    self.broker.finish(id, &JobOutcome::Stopped).await?;
                    info!("Removed job {} from {}", id, self.name);
                    true
                } else {
                    // Claimed between the lookup and the removal.
                    self.stop_claimed(id).await?
                }
            }
            JobState::Finished | JobState::Failed | JobState::Stopped => false,
        };

        if cancelled {
            metrics::counter!("gifsync_jobs_cancelled_total", "queue" => self.name.clone())
                .increment(1);
        }
        Ok(cancelled)
    }

    /// Stop a job that left the queue after it was looked up, unless it already ended.
    async fn stop_claimed(&self, id: &JobId) -> QueueResult<bool> {
        match self.broker.fetch(id).await? {
            Some(record) if record.state == JobState::Started => {
                self.broker.send_stop(id).await?;
                info!("Sent stop signal to just-claimed job {}", id);
                Ok(true)
            }
            Some(record) => {
                debug!("Job {} ended as {} before it could be cancelled", id, record.state);
                Ok(false)
            }
            None => Ok(false),
        }
    }

    /// Cancel every job matching the selection. Returns the ids actually cancelled.
    pub async fn cancel_matching(&self, selection: Option<TaskFilter>) -> QueueResult<Vec<JobId>> {
        let mut cancelled = Vec::new();
        for filter in [TaskFilter::Queued, TaskFilter::Started] {
            for id in self.list(filter, selection).await? {
                if self.cancel(&id).await? {
                    cancelled.push(id);
                }
            }
        }
        Ok(cancelled)
    }

    pub async fn ping(&self) -> QueueResult<()> {
        self.broker.ping().await
    }
}
