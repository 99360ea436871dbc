//! Application state.

use std::sync::Arc;

use gifsync_media::Gifsicle;
use gifsync_queue::{DispatchKind, JobHandler, JobQueue, QueueConfig};
use gifsync_storage::store_from_env;
use gifsync_worker::RetimeHandler;
use tracing::info;

use crate::config::ApiConfig;
use crate::error::ApiResult;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub queue: Arc<JobQueue>,
}

impl AppState {
    /// Create new application state from the environment.
    ///
    /// In inline mode jobs run inside the API process, so the storage backend and
    /// encoder are wired up here instead of in a worker.
    pub async fn new(config: ApiConfig) -> ApiResult<Self> {
        let queue_config = QueueConfig::from_env()?;

        let handler: Option<Arc<dyn JobHandler>> = match queue_config.mode {
            DispatchKind::Inline => {
                info!("Queue running inline, jobs execute in the API process");
                let store = store_from_env().await?;
                Some(Arc::new(RetimeHandler::new(store, Arc::new(Gifsicle::from_env()))))
            }
            DispatchKind::Deferred => None,
        };

        let queue = JobQueue::connect(&queue_config, handler)?;
        info!("Connected to queue '{}'", queue.name());

        Ok(Self::with_queue(config, queue))
    }

    pub fn with_queue(config: ApiConfig, queue: JobQueue) -> Self {
        Self {
            config,
            queue: Arc::new(queue),
        }
    }
}
