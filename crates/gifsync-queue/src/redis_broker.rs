//! Redis broker.
//!
//! Key layout, with `p` the key prefix and `q` the queue name:
//! - `p:queue:q` list of queued job ids (RPUSH / LPOP)
//! - `p:wip:q` sorted set of started job ids scored by claim time
//! - `p:job:<id>` hash holding the job record
//! - `p:stop:<id>` stop signal for a running job

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use gifsync_models::JobId;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Script};
use tracing::{debug, warn};

use crate::broker::{Broker, ABANDONED_ERROR};
use crate::error::{QueueError, QueueResult};
use crate::queue::QueueConfig;
use crate::record::{encode_bool, JobOutcome, JobRecord};

/// Lifetime of an unanswered stop signal.
const STOP_SIGNAL_TTL_SECS: u64 = 3600;

/// Pops ids until one still has a record, then marks it started.
/// KEYS: queue, wip. ARGV: job key prefix, started_at, worker, score.
const CLAIM_SCRIPT: &str = r#"
while true do
  local id = redis.call('LPOP', KEYS[1])
  if not id then return false end
  local job_key = ARGV[1] .. id
  if redis.call('EXISTS', job_key) == 1 then
    redis.call('HSET', job_key, 'status', 'started', 'started_at', ARGV[2], 'worker', ARGV[3])
    redis.call('ZADD', KEYS[2], ARGV[4], id)
    return id
  end
end
"#;

/// KEYS: job, wip, stop. ARGV: id, status, ended_at, result, error, ttl.
const FINISH_SCRIPT: &str = r#"
redis.call('ZREM', KEYS[2], ARGV[1])
redis.call('DEL', KEYS[3])
if redis.call('EXISTS', KEYS[1]) == 0 then return 0 end
redis.call('HSET', KEYS[1], 'status', ARGV[2], 'ended_at', ARGV[3])
if ARGV[4] ~= '' then redis.call('HSET', KEYS[1], 'result', ARGV[4]) end
if ARGV[5] ~= '' then redis.call('HSET', KEYS[1], 'error', ARGV[5]) end
redis.call('EXPIRE', KEYS[1], ARGV[6])
return 1
"#;

/// Broker backed by a Redis server.
pub struct RedisBroker {
    client: redis::Client,
    prefix: String,
    queue_name: String,
    result_ttl: Duration,
    failure_ttl: Duration,
    claim_script: Script,
    finish_script: Script,
}

impl RedisBroker {
    /// Create a broker. No connection is made until the first operation.
    pub fn new(config: &QueueConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())
            .map_err(|e| QueueError::config(format!("invalid REDIS_URL: {}", e)))?;
        Ok(Self {
            client,
            prefix: config.key_prefix.clone(),
            queue_name: config.queue_name.clone(),
            result_ttl: config.result_ttl,
            failure_ttl: config.failure_ttl,
            claim_script: Script::new(CLAIM_SCRIPT),
            finish_script: Script::new(FINISH_SCRIPT),
        })
    }

    async fn connection(&self) -> QueueResult<MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| QueueError::broker_unavailable(e.to_string()))
    }

    fn queue_key(&self) -> String {
        format!("{}:queue:{}", self.prefix, self.queue_name)
    }

    fn started_key(&self) -> String {
        format!("{}:wip:{}", self.prefix, self.queue_name)
    }

    fn job_key_prefix(&self) -> String {
        format!("{}:job:", self.prefix)
    }

    fn job_key(&self, id: &JobId) -> String {
        format!("{}{}", self.job_key_prefix(), id)
    }

    fn stop_key(&self, id: &JobId) -> String {
        format!("{}:stop:{}", self.prefix, id)
    }

    fn retention(&self, outcome: &JobOutcome) -> Duration {
        match outcome {
            JobOutcome::Finished(_) => self.result_ttl,
            JobOutcome::Failed(_) | JobOutcome::Stopped => self.failure_ttl,
        }
    }
}

#[async_trait]
impl Broker for RedisBroker {
    async fn enqueue(&self, record: &JobRecord) -> QueueResult<()> {
        let mut conn = self.connection().await?;
        let fields = record.to_fields()?;

        redis::pipe()
            .atomic()
            .hset_multiple(self.job_key(&record.id), &fields)
            .ignore()
            .rpush(self.queue_key(), record.id.as_str())
            .ignore()
            .query_async::<()>(&mut conn)
            .await?;

        debug!("Pushed job {} to {}", record.id, self.queue_key());
        Ok(())
    }

    async fn save(&self, record: &JobRecord) -> QueueResult<()> {
        let mut conn = self.connection().await?;
        let fields = record.to_fields()?;

        let mut pipe = redis::pipe();
        pipe.atomic().hset_multiple(self.job_key(&record.id), &fields).ignore();
        if let Some(started_at) = record.started_at.filter(|_| !record.state.is_terminal()) {
            pipe.zadd(self.started_key(), record.id.as_str(), started_at.timestamp_millis())
                .ignore();
        }
        pipe.query_async::<()>(&mut conn).await?;
        Ok(())
    }

    async fn fetch(&self, id: &JobId) -> QueueResult<Option<JobRecord>> {
        let mut conn = self.connection().await?;
        let fields: HashMap<String, String> = conn.hgetall(self.job_key(id)).await?;
        if fields.is_empty() {
            return Ok(None);
        }
        JobRecord::from_fields(id, &fields).map(Some)
    }

    async fn queued_ids(&self) -> QueueResult<Vec<JobId>> {
        let mut conn = self.connection().await?;
        let ids: Vec<String> = conn.lrange(self.queue_key(), 0, -1).await?;
        Ok(ids.into_iter().map(JobId::from).collect())
    }

    async fn started_ids(&self) -> QueueResult<Vec<JobId>> {
        let mut conn = self.connection().await?;
        let ids: Vec<String> = conn.zrange(self.started_key(), 0, -1).await?;
        Ok(ids.into_iter().map(JobId::from).collect())
    }

    async fn remove_queued(&self, id: &JobId) -> QueueResult<bool> {
        let mut conn = self.connection().await?;
        let removed: i64 = conn.lrem(self.queue_key(), 0, id.as_str()).await?;
        Ok(removed > 0)
    }

    async fn claim_next(&self, worker: &str) -> QueueResult<Option<JobRecord>> {
        let mut conn = self.connection().await?;
        let now = Utc::now();

        let claimed: Option<String> = self
            .claim_script
            .key(self.queue_key())
            .key(self.started_key())
            .arg(self.job_key_prefix())
            .arg(now.to_rfc3339())
            .arg(worker)
            .arg(now.timestamp_millis())
            .invoke_async(&mut conn)
            .await?;

        let Some(id) = claimed else {
            return Ok(None);
        };
        let id = JobId::from(id);
        debug!("Worker {} claimed job {}", worker, id);
        self.fetch(&id).await
    }

    async fn finish(&self, id: &JobId, outcome: &JobOutcome) -> QueueResult<()> {
        let mut conn = self.connection().await?;

        let updated: i64 = self
            .finish_script
            .key(self.job_key(id))
            .key(self.started_key())
            .key(self.stop_key(id))
            .arg(id.as_str())
            .arg(outcome.state().as_str())
            .arg(Utc::now().to_rfc3339())
            .arg(outcome.result().map(encode_bool).unwrap_or(""))
            .arg(outcome.error().unwrap_or(""))
            .arg(self.retention(outcome).as_secs())
            .invoke_async(&mut conn)
            .await?;

        if updated == 0 {
            warn!("Job {} expired before its outcome was recorded", id);
        }
        Ok(())
    }

    async fn send_stop(&self, id: &JobId) -> QueueResult<()> {
        let mut conn = self.connection().await?;
        conn.set_ex::<_, _, ()>(self.stop_key(id), "1", STOP_SIGNAL_TTL_SECS)
            .await?;
        Ok(())
    }

    async fn stop_requested(&self, id: &JobId) -> QueueResult<bool> {
        let mut conn = self.connection().await?;
        let exists: bool = conn.exists(self.stop_key(id)).await?;
        Ok(exists)
    }

    async fn fail_abandoned(&self, visibility_timeout: Duration) -> QueueResult<Vec<JobId>> {
        let mut conn = self.connection().await?;
        let timeout_ms = i64::try_from(visibility_timeout.as_millis()).unwrap_or(i64::MAX);
        let cutoff = Utc::now().timestamp_millis().saturating_sub(timeout_ms);

        let ids: Vec<String> = conn.zrangebyscore(self.started_key(), "-inf", cutoff).await?;
        let outcome = JobOutcome::Failed(ABANDONED_ERROR.to_string());

        let mut failed = Vec::with_capacity(ids.len());
        for id in ids.into_iter().map(JobId::from) {
            self.finish(&id, &outcome).await?;
            warn!("Job {} abandoned by its worker, marked failed", id);
            failed.push(id);
        }
        Ok(failed)
    }

    async fn ping(&self) -> QueueResult<()> {
        let mut conn = self.connection().await?;
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }
}
