//! In-process broker for tests and single-process development.

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use gifsync_models::{JobId, JobState};
use tokio::sync::Mutex;

use crate::broker::{Broker, ABANDONED_ERROR};
use crate::error::QueueResult;
use crate::record::{JobOutcome, JobRecord};

#[derive(Debug, Default)]
struct State {
    records: HashMap<JobId, JobRecord>,
    queue: VecDeque<JobId>,
    started: Vec<JobId>,
    stops: HashSet<JobId>,
}

/// Broker keeping everything in memory. Records never expire.
#[derive(Debug, Default)]
pub struct MemoryBroker {
    state: Mutex<State>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn enqueue(&self, record: &JobRecord) -> QueueResult<()> {
        let mut state = self.state.lock().await;
        state.records.insert(record.id.clone(), record.clone());
        state.queue.push_back(record.id.clone());
        Ok(())
    }

    async fn save(&self, record: &JobRecord) -> QueueResult<()> {
        let mut state = self.state.lock().await;
        if record.state == JobState::Started && !state.started.contains(&record.id) {
            state.started.push(record.id.clone());
        }
        state.records.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn fetch(&self, id: &JobId) -> QueueResult<Option<JobRecord>> {
        Ok(self.state.lock().await.records.get(id).cloned())
    }

    async fn queued_ids(&self) -> QueueResult<Vec<JobId>> {
        Ok(self.state.lock().await.queue.iter().cloned().collect())
    }

    async fn started_ids(&self) -> QueueResult<Vec<JobId>> {
        Ok(self.state.lock().await.started.clone())
    }

    async fn remove_queued(&self, id: &JobId) -> QueueResult<bool> {
        let mut state = self.state.lock().await;
        let before = state.queue.len();
        state.queue.retain(|queued| queued != id);
        Ok(state.queue.len() != before)
    }

    async fn claim_next(&self, worker: &str) -> QueueResult<Option<JobRecord>> {
        let mut state = self.state.lock().await;
        while let Some(id) = state.queue.pop_front() {
            let Some(record) = state.records.get_mut(&id) else {
                continue;
            };
            record.start(worker, Utc::now());
            let claimed = record.clone();
            state.started.push(id);
            return Ok(Some(claimed));
        }
        Ok(None)
    }

    async fn finish(&self, id: &JobId, outcome: &JobOutcome) -> QueueResult<()> {
        let mut state = self.state.lock().await;
        if let Some(record) = state.records.get_mut(id) {
            record.finish(outcome, Utc::now());
        }
        state.started.retain(|started| started != id);
        state.stops.remove(id);
        Ok(())
    }

    async fn send_stop(&self, id: &JobId) -> QueueResult<()> {
        self.state.lock().await.stops.insert(id.clone());
        Ok(())
    }

    async fn stop_requested(&self, id: &JobId) -> QueueResult<bool> {
        Ok(self.state.lock().await.stops.contains(id))
    }

    async fn fail_abandoned(&self, visibility_timeout: Duration) -> QueueResult<Vec<JobId>> {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let outcome = JobOutcome::Failed(ABANDONED_ERROR.to_string());

        let State {
            records,
            started,
            stops,
            ..
        } = &mut *state;
        let mut failed = Vec::new();
        started.retain(|id| {
            let Some(record) = records.get_mut(id) else {
                return false;
            };
            let expired = record
                .started_at
                .and_then(|at| (now - at).to_std().ok())
                .is_some_and(|age| age >= visibility_timeout);
            if expired {
                record.finish(&outcome, now);
                stops.remove(id);
                failed.push(id.clone());
            }
            !expired
        });
        Ok(failed)
    }

    async fn ping(&self) -> QueueResult<()> {
        Ok(())
    }
}
