//! Broker tests against a live Redis (`REDIS_URL`, default localhost).

use std::sync::Arc;
use std::time::Duration;

use gifsync_models::{JobId, JobState, RetimeRequest, TaskFilter};
use gifsync_queue::{
    Broker, DispatchMode, JobOutcome, JobQueue, QueueConfig, RedisBroker, ABANDONED_ERROR,
};

fn isolated_queue() -> (JobQueue, Arc<RedisBroker>) {
    let config = QueueConfig {
        redis_url: std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379/0".into()),
        key_prefix: format!("gifsync-test-{}", JobId::new()),
        ..QueueConfig::default()
    };
    let broker = Arc::new(RedisBroker::new(&config).unwrap());
    let queue = JobQueue::new(&config.queue_name, broker.clone(), DispatchMode::Deferred);
    (queue, broker)
}

fn request(name: &str) -> RetimeRequest {
    RetimeRequest::new(name, 120.0, 4.0)
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn enqueue_claim_finish_lifecycle() {
    let (queue, broker) = isolated_queue();
    let first = queue.enqueue_retime(request("a")).await.unwrap();
    let second = queue.enqueue_retime(request("b")).await.unwrap();

    assert_eq!(
        queue.list_queued().await.unwrap(),
        vec![first.id.clone(), second.id.clone()]
    );

    let claimed = broker.claim_next("worker-1").await.unwrap().unwrap();
    assert_eq!(claimed.id, first.id);
    assert_eq!(claimed.state, JobState::Started);
    assert_eq!(claimed.worker.as_deref(), Some("worker-1"));
    assert_eq!(queue.list_started().await.unwrap(), vec![first.id.clone()]);
    assert_eq!(queue.list_queued().await.unwrap(), vec![second.id.clone()]);

    broker.finish(&first.id, &JobOutcome::Finished(true)).await.unwrap();

    let status = queue.status(&first.id).await.unwrap().unwrap();
    assert!(status.complete);
    assert_eq!(status.status_code(), 200);
    assert!(queue.list_started().await.unwrap().is_empty());
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn cancel_queued_and_started() {
    let (queue, broker) = isolated_queue();
    let running = queue.enqueue_retime(request("a")).await.unwrap();
    let waiting = queue.enqueue_retime(request("b")).await.unwrap();
    broker.claim_next("worker-1").await.unwrap();

    assert!(queue.cancel(&waiting.id).await.unwrap());
    assert!(queue.list_queued().await.unwrap().is_empty());
    assert_eq!(
        queue.get(&waiting.id).await.unwrap().unwrap().state,
        JobState::Stopped
    );

    assert!(queue.cancel(&running.id).await.unwrap());
    assert!(broker.stop_requested(&running.id).await.unwrap());

    broker.finish(&running.id, &JobOutcome::Stopped).await.unwrap();
    assert!(!broker.stop_requested(&running.id).await.unwrap());
    assert!(!queue.cancel(&running.id).await.unwrap());
    assert!(!queue.cancel(&JobId::new()).await.unwrap());
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn failed_job_keeps_error() {
    let (queue, broker) = isolated_queue();
    let record = queue.enqueue_retime(request("a")).await.unwrap();
    broker.claim_next("worker-1").await.unwrap();
    broker
        .finish(&record.id, &JobOutcome::Failed("exit status 1".into()))
        .await
        .unwrap();

    let stored = queue.get(&record.id).await.unwrap().unwrap();
    assert_eq!(stored.state, JobState::Failed);
    assert_eq!(stored.error.as_deref(), Some("exit status 1"));
    assert_eq!(stored.status().status_code(), 500);
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn cancel_matching_started_only() {
    let (queue, broker) = isolated_queue();
    let running = queue.enqueue_retime(request("a")).await.unwrap();
    let waiting = queue.enqueue_retime(request("b")).await.unwrap();
    broker.claim_next("worker-1").await.unwrap();

    let cancelled = queue.cancel_matching(Some(TaskFilter::Started)).await.unwrap();
    assert_eq!(cancelled, vec![running.id]);
    assert_eq!(queue.list_queued().await.unwrap(), vec![waiting.id]);
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn abandoned_started_jobs_are_failed() {
    let (queue, broker) = isolated_queue();
    let record = queue.enqueue_retime(request("a")).await.unwrap();
    broker.claim_next("worker-1").await.unwrap();

    assert!(broker.fail_abandoned(Duration::from_secs(3600)).await.unwrap().is_empty());

    tokio::time::sleep(Duration::from_millis(20)).await;
    let failed = broker.fail_abandoned(Duration::from_millis(10)).await.unwrap();
    assert_eq!(failed, vec![record.id.clone()]);
    assert!(queue.list_started().await.unwrap().is_empty());

    let stored = queue.get(&record.id).await.unwrap().unwrap();
    assert_eq!(stored.state, JobState::Failed);
    assert_eq!(stored.error.as_deref(), Some(ABANDONED_ERROR));
}

#[tokio::test]
async fn unreachable_broker_is_reported() {
    let config = QueueConfig {
        redis_url: "redis://127.0.0.1:1/0".into(),
        ..QueueConfig::default()
    };
    let broker = RedisBroker::new(&config).unwrap();
    let err = broker.ping().await.unwrap_err();
    assert!(err.is_unavailable());
}
