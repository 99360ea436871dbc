//! GifSync worker binary.

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use gifsync_media::Gifsicle;
use gifsync_queue::{QueueConfig, RedisBroker};
use gifsync_worker::{JobExecutor, RetimeHandler, WorkerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(
            "gifsync_worker=info,gifsync_queue=info,gifsync_media=info,gifsync_storage=info",
        )
    });

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(true).with_target(true))
            .with(env_filter)
            .init();
    }

    info!("Starting gifsync-worker");

    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    let queue_config = QueueConfig::from_env()?;
    let broker = Arc::new(RedisBroker::new(&queue_config)?);

    let store = gifsync_storage::store_from_env().await?;
    let handler = Arc::new(RetimeHandler::new(store, Arc::new(Gifsicle::from_env())));

    let executor = Arc::new(
        JobExecutor::new(config, broker, handler)
            .with_visibility_timeout(queue_config.visibility_timeout),
    );

    let runner = {
        let executor = Arc::clone(&executor);
        tokio::spawn(async move { executor.run().await })
    };

    tokio::signal::ctrl_c().await.ok();
    info!("Received shutdown signal");
    executor.shutdown();

    match runner.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            error!("Executor error: {}", e);
            return Err(e.into());
        }
        Err(e) => return Err(e.into()),
    }

    info!("Worker shutdown complete");
    Ok(())
}
