//! Job executor.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use gifsync_models::JobId;
use gifsync_queue::{Broker, JobHandler, JobOutcome, JobRecord, QueueConfig};
use tokio::sync::{watch, Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::task::AbortHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};

/// Error recorded on a job whose body panicked.
pub const JOB_PANICKED: &str = "job panicked";

/// Error recorded on jobs still running when the shutdown timeout ran out.
pub const JOB_INTERRUPTED: &str = "worker shut down before the job finished";

struct RunningJob {
    abort: AbortHandle,
    kind: &'static str,
}

/// Claims jobs from the broker and runs them with bounded concurrency.
pub struct JobExecutor {
    config: WorkerConfig,
    broker: Arc<dyn Broker>,
    handler: Arc<dyn JobHandler>,
    job_semaphore: Arc<Semaphore>,
    shutdown: watch::Sender<bool>,
    worker_name: String,
    visibility_timeout: Duration,
    running: Arc<Mutex<HashMap<JobId, RunningJob>>>,
}

impl JobExecutor {
    pub fn new(
        config: WorkerConfig,
        broker: Arc<dyn Broker>,
        handler: Arc<dyn JobHandler>,
    ) -> Self {
        let job_semaphore = Arc::new(Semaphore::new(config.max_concurrent_jobs));
        let (shutdown, _) = watch::channel(false);
        let worker_name = format!("worker-{}", Uuid::new_v4());

        Self {
            config,
            broker,
            handler,
            job_semaphore,
            shutdown,
            worker_name,
            visibility_timeout: QueueConfig::default().visibility_timeout,
            running: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Age after which another worker's started job is considered abandoned.
    pub fn with_visibility_timeout(mut self, timeout: Duration) -> Self {
        self.visibility_timeout = timeout;
        self
    }

    pub fn worker_name(&self) -> &str {
        &self.worker_name
    }

    /// Run until `shutdown` is called, then wait for in-flight jobs.
    ///
    /// Jobs still running after the shutdown timeout are aborted and recorded as failed.
    pub async fn run(&self) -> WorkerResult<()> {
        info!(
            "Starting job executor '{}' with {} max concurrent jobs",
            self.worker_name, self.config.max_concurrent_jobs
        );

        let mut shutdown_rx = self.shutdown.subscribe();

        while !*shutdown_rx.borrow() {
            let permit = tokio::select! {
                _ = shutdown_rx.changed() => continue,
                permit = Arc::clone(&self.job_semaphore).acquire_owned() => {
                    permit.map_err(|_| WorkerError::job_failed("Semaphore closed"))?
                }
            };

            match self.broker.claim_next(&self.worker_name).await {
                Ok(Some(record)) => self.spawn_job(record, permit).await,
                Ok(None) => {
                    drop(permit);
                    self.sweep_abandoned().await;
                    Self::idle(&mut shutdown_rx, self.config.poll_interval).await;
                }
                Err(e) => {
                    drop(permit);
                    error!("Failed to claim job: {}", e);
                    // Back off on error
                    Self::idle(&mut shutdown_rx, self.config.poll_interval * 5).await;
                }
            }
        }

        info!("Waiting for in-flight jobs to complete...");
        if tokio::time::timeout(self.config.shutdown_timeout, self.wait_for_jobs())
            .await
            .is_err()
        {
            warn!(
                "{} jobs still running after {:?}, aborting them",
                self.in_flight(),
                self.config.shutdown_timeout
            );
            self.abort_running().await;
        }

        info!("Job executor stopped");
        Ok(())
    }

    /// Run a claimed job in its own task. A watcher task records a panic as a failure
    /// and releases the permit once the job is gone.
    async fn spawn_job(&self, record: JobRecord, permit: OwnedSemaphorePermit) {
        let id = record.id.clone();
        let kind = record.job.kind();
        let job = tokio::spawn(Self::execute_job(
            Arc::clone(&self.broker),
            Arc::clone(&self.handler),
            record,
            self.config.stop_poll_interval,
        ));
        self.running.lock().await.insert(
            id.clone(),
            RunningJob {
                abort: job.abort_handle(),
                kind,
            },
        );

        let broker = Arc::clone(&self.broker);
        let running = Arc::clone(&self.running);
        tokio::spawn(async move {
            let _permit = permit;
            if let Err(e) = job.await {
                if e.is_panic() {
                    error!("Job {} panicked", id);
                    Self::fail_unfinished(broker.as_ref(), &id, kind, JOB_PANICKED).await;
                }
            }
            running.lock().await.remove(&id);
        });
    }

    /// Abort every job still running and record it as failed.
    async fn abort_running(&self) {
        let running: Vec<_> = self.running.lock().await.drain().collect();
        for (id, job) in running {
            job.abort.abort();
            Self::fail_unfinished(self.broker.as_ref(), &id, job.kind, JOB_INTERRUPTED).await;
        }
    }

    /// Fail jobs other workers started and never finished.
    async fn sweep_abandoned(&self) {
        match self.broker.fail_abandoned(self.visibility_timeout).await {
            Ok(failed) if !failed.is_empty() => {
                warn!("Marked {} abandoned jobs as failed", failed.len());
            }
            Ok(_) => {}
            Err(e) => debug!("Abandoned job sweep failed: {}", e),
        }
    }

    /// Record a failure unless the job already reached a terminal state.
    async fn fail_unfinished(broker: &dyn Broker, id: &JobId, kind: &'static str, reason: &str) {
        match broker.fetch(id).await {
            Ok(Some(record)) if !record.state.is_terminal() => {
                let outcome = JobOutcome::Failed(reason.to_string());
                outcome.record_metric(kind);
                if let Err(e) = broker.finish(id, &outcome).await {
                    error!("Failed to record failure of job {}: {}", id, e);
                }
            }
            Ok(_) => {}
            Err(e) => error!("Failed to look up job {}: {}", id, e),
        }
    }

    /// Sleep for `period` or until shutdown is signalled.
    async fn idle(shutdown_rx: &mut watch::Receiver<bool>, period: Duration) {
        tokio::select! {
            _ = shutdown_rx.changed() => {}
            _ = tokio::time::sleep(period) => {}
        }
    }

    /// Run one claimed job and record its outcome.
    ///
    /// The job future is dropped when a stop signal arrives, which kills any
    /// running encoder process.
    pub(crate) async fn execute_job(
        broker: Arc<dyn Broker>,
        handler: Arc<dyn JobHandler>,
        record: JobRecord,
        stop_poll: Duration,
    ) -> JobOutcome {
        let kind = record.job.kind();
        info!("Executing job {}", record.id);

        let outcome = tokio::select! {
            result = handler.handle(&record.job) => match result {
                Ok(value) => {
                    info!("Job {} finished with {}", record.id, value);
                    JobOutcome::Finished(value)
                }
                Err(e) => {
                    error!("Job {} failed: {}", record.id, e);
                    JobOutcome::Failed(e.to_string())
                }
            },
            _ = Self::wait_for_stop(broker.as_ref(), &record.id, stop_poll) => {
                info!("Job {} stopped", record.id);
                JobOutcome::Stopped
            }
        };

        outcome.record_metric(kind);
        if let Err(e) = broker.finish(&record.id, &outcome).await {
            error!("Failed to record outcome of job {}: {}", record.id, e);
        }
        outcome
    }

    /// Resolve once a stop signal for `id` is seen.
    async fn wait_for_stop(broker: &dyn Broker, id: &JobId, period: Duration) {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            match broker.stop_requested(id).await {
                Ok(true) => return,
                Ok(false) => {}
                Err(e) => debug!("Stop check for job {} failed: {}", id, e),
            }
        }
    }

    fn in_flight(&self) -> usize {
        self.config.max_concurrent_jobs - self.job_semaphore.available_permits()
    }

    /// Wait for all in-flight jobs to complete.
    async fn wait_for_jobs(&self) {
        while self.in_flight() > 0 {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}
