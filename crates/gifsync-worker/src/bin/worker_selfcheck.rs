use gifsync_media::{check_gifsicle, GifsicleConfig};
use gifsync_queue::{DispatchKind, QueueConfig};
use gifsync_storage::BlobStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let gifsicle = GifsicleConfig::from_env();
    println!("worker-selfcheck: starting with gifsicle={}", gifsicle.binary);

    let path = check_gifsicle(&gifsicle.binary)?;
    println!("worker-selfcheck: gifsicle at {}", path.display());

    let queue = QueueConfig::from_env()?;
    if queue.mode == DispatchKind::Deferred {
        ensure_env_present(&["REDIS_URL"])?;
    }

    let store = gifsync_storage::store_from_env().await?;
    store.check().await?;
    println!("worker-selfcheck: storage reachable");

    println!("worker-selfcheck: ok");
    Ok(())
}

fn ensure_env_present(vars: &[&str]) -> anyhow::Result<()> {
    for var in vars {
        if std::env::var(var).is_err() {
            return Err(anyhow::anyhow!("missing required env var {}", var));
        }
    }
    Ok(())
}
