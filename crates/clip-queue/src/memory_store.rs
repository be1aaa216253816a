//! In-process job store.
//!
//! Mirrors the Redis store's semantics (states, retention, backoff) without a
//! server. Time follows `tokio::time`, so paused-clock tests can advance
//! delayed jobs deterministically.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use clip_models::{JobId, JobPolicy, JobState, QueueName};
use tokio::time::Instant;
use tracing::debug;

use crate::error::QueueResult;
use crate::store::{EnqueueOptions, JobCounts, JobStore, StoreConnector, StoredJob};

#[derive(Debug, Default)]
struct Inner {
    next_id: u64,
    jobs: HashMap<String, StoredJob>,
    wait: VecDeque<String>,
    active: Vec<String>,
    /// (process_at, id)
    delayed: BTreeSet<(i64, String)>,
    /// (finished_at, id)
    completed: BTreeSet<(i64, String)>,
    failed: BTreeSet<(i64, String)>,
}

impl Inner {
    fn ids_in(&self, state: JobState) -> Vec<String> {
        match state {
            JobState::Waiting => self.wait.iter().cloned().collect(),
            JobState::Active => self.active.clone(),
            JobState::Delayed => self.delayed.iter().map(|(_, id)| id.clone()).collect(),
            JobState::Completed => self.completed.iter().map(|(_, id)| id.clone()).collect(),
            JobState::Failed => self.failed.iter().map(|(_, id)| id.clone()).collect(),
        }
    }

    fn take_active(&mut self, id: &str) -> Option<&mut StoredJob> {
        if self.jobs.get(id)?.state != JobState::Active {
            return None;
        }
        self.active.retain(|a| a != id);
        self.jobs.get_mut(id)
    }

    fn finish(&mut self, id: &str, state: JobState, now: i64, keep: u64) {
        let set = match state {
            JobState::Completed => &mut self.completed,
            _ => &mut self.failed,
        };
        set.insert((now, id.to_string()));
        while set.len() as u64 > keep {
            let Some(oldest) = set.pop_first() else { break };
            self.jobs.remove(&oldest.1);
        }
    }

    fn promote_due(&mut self, now: i64) {
        while let Some((at, _)) = self.delayed.first() {
            if *at > now {
                break;
            }
            let Some((_, id)) = self.delayed.pop_first() else { break };
            if let Some(job) = self.jobs.get_mut(&id) {
                job.state = JobState::Waiting;
                self.wait.push_back(id);
            }
        }
    }
}

/// Job store kept in process memory.
#[derive(Debug)]
pub struct InMemoryJobStore {
    queue: QueueName,
    inner: Mutex<Inner>,
    base_ms: i64,
    epoch: Instant,
}

impl InMemoryJobStore {
    pub fn new(queue: QueueName) -> Self {
        Self {
            queue,
            inner: Mutex::new(Inner::default()),
            base_ms: chrono::Utc::now().timestamp_millis(),
            epoch: Instant::now(),
        }
    }

    fn now_ms(&self) -> i64 {
        self.base_ms + i64::try_from(self.epoch.elapsed().as_millis()).unwrap_or(i64::MAX)
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    fn queue(&self) -> QueueName {
        self.queue
    }

    async fn add(
        &self,
        data: &serde_json::Value,
        policy: &JobPolicy,
        options: &EnqueueOptions,
    ) -> QueueResult<JobId> {
        let now = self.now_ms();
        let mut inner = self.lock();

        let id = match &options.job_id {
            Some(id) if inner.jobs.contains_key(id.as_str()) => {
                debug!(queue = %self.queue, job_id = %id, "Job id already present, not duplicating");
                return Ok(id.clone());
            }
            Some(id) => id.clone(),
            None => {
                inner.next_id += 1;
                JobId::from_string(inner.next_id.to_string())
            }
        };

        let delay = options.delay_ms();
        let state = if delay > 0 {
            JobState::Delayed
        } else {
            JobState::Waiting
        };
        let job = StoredJob {
            id: id.clone(),
            queue: self.queue,
            data: data.clone(),
            state,
            attempts_allowed: policy.attempts,
            attempts_made: 0,
            backoff: policy.backoff,
            keep_completed: policy.keep_completed,
            keep_failed: policy.keep_failed,
            failed_reason: None,
            cancelled: false,
            created_at: now,
            process_at: now.saturating_add(delay),
        };

        if delay > 0 {
            inner.delayed.insert((job.process_at, id.to_string()));
        } else {
            inner.wait.push_back(id.to_string());
        }
        inner.jobs.insert(id.to_string(), job);
        Ok(id)
    }

    async fn get_jobs(&self, states: &[JobState]) -> QueueResult<Vec<StoredJob>> {
        let inner = self.lock();
        let jobs = states
            .iter()
            .flat_map(|state| inner.ids_in(*state))
            .filter_map(|id| inner.jobs.get(&id).cloned())
            .collect();
        Ok(jobs)
    }

    async fn get_job(&self, id: &JobId) -> QueueResult<Option<StoredJob>> {
        Ok(self.lock().jobs.get(id.as_str()).cloned())
    }

    async fn remove(&self, id: &JobId) -> QueueResult<bool> {
        let mut inner = self.lock();
        let Some(job) = inner.jobs.get(id.as_str()) else {
            return Ok(false);
        };
        let (state, process_at) = (job.state, job.process_at);

        match state {
            JobState::Active => return Ok(false),
            JobState::Waiting => inner.wait.retain(|w| w != id.as_str()),
            JobState::Delayed => {
                inner.delayed.remove(&(process_at, id.to_string()));
            }
            JobState::Completed => inner.completed.retain(|(_, c)| c != id.as_str()),
            JobState::Failed => inner.failed.retain(|(_, f)| f != id.as_str()),
        }
        inner.jobs.remove(id.as_str());
        Ok(true)
    }

    async fn move_to_failed(&self, id: &JobId, reason: &str, cancelled: bool) -> QueueResult<bool> {
        let now = self.now_ms();
        let mut inner = self.lock();
        let Some(job) = inner.take_active(id.as_str()) else {
            return Ok(false);
        };
        job.state = JobState::Failed;
        job.failed_reason = Some(reason.to_string());
        job.cancelled = cancelled;
        let keep = job.keep_failed;
        inner.finish(id.as_str(), JobState::Failed, now, keep);
        Ok(true)
    }

    async fn claim_next(&self) -> QueueResult<Option<StoredJob>> {
        let now = self.now_ms();
        let mut inner = self.lock();
        inner.promote_due(now);

        let Some(id) = inner.wait.pop_front() else {
            return Ok(None);
        };
        inner.active.push(id.clone());
        let claimed = inner.jobs.get_mut(&id).map(|job| {
            job.state = JobState::Active;
            job.clone()
        });
        Ok(claimed)
    }

    async fn complete(&self, id: &JobId) -> QueueResult<bool> {
        let now = self.now_ms();
        let mut inner = self.lock();
        let Some(job) = inner.take_active(id.as_str()) else {
            return Ok(false);
        };
        job.state = JobState::Completed;
        job.attempts_made += 1;
        let keep = job.keep_completed;
        inner.finish(id.as_str(), JobState::Completed, now, keep);
        Ok(true)
    }

    async fn fail(&self, id: &JobId, reason: &str) -> QueueResult<Option<JobState>> {
        let now = self.now_ms();
        let mut inner = self.lock();
        let Some(job) = inner.take_active(id.as_str()) else {
            return Ok(None);
        };
        job.attempts_made += 1;
        job.failed_reason = Some(reason.to_string());

        if job.attempts_made < job.attempts_allowed {
            let delay = job.backoff.delay_for_attempt(job.attempts_made);
            job.state = JobState::Delayed;
            job.process_at = now.saturating_add(i64::try_from(delay.as_millis()).unwrap_or(i64::MAX));
            let entry = (job.process_at, id.to_string());
            inner.delayed.insert(entry);
            Ok(Some(JobState::Delayed))
        } else {
            job.state = JobState::Failed;
            let keep = job.keep_failed;
            inner.finish(id.as_str(), JobState::Failed, now, keep);
            Ok(Some(JobState::Failed))
        }
    }

    async fn counts(&self) -> QueueResult<JobCounts> {
        let inner = self.lock();
        Ok(JobCounts {
            waiting: inner.wait.len() as u64,
            active: inner.active.len() as u64,
            delayed: inner.delayed.len() as u64,
            completed: inner.completed.len() as u64,
            failed: inner.failed.len() as u64,
        })
    }

    async fn ping(&self) -> QueueResult<()> {
        Ok(())
    }
}

/// Connector handing out fresh in-memory stores; counts how often it was asked.
#[derive(Debug, Default)]
pub struct InMemoryConnector {
    opened: AtomicUsize,
}

impl InMemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stores opened so far.
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StoreConnector for InMemoryConnector {
    async fn connect(&self, queue: QueueName) -> QueueResult<Arc<dyn JobStore>> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(InMemoryJobStore::new(queue)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clip_models::DEFAULT_JOB_POLICY;
    use serde_json::json;
    use std::time::Duration;

    fn store() -> InMemoryJobStore {
        InMemoryJobStore::new(QueueName::Stt)
    }

    async fn add(store: &InMemoryJobStore, video: &str) -> JobId {
        store
            .add(&json!({"videoId": video}), &DEFAULT_JOB_POLICY, &EnqueueOptions::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_fifo_claim() {
        let store = store();
        let first = add(&store, "a").await;
        let second = add(&store, "b").await;

        assert_eq!(store.claim_next().await.unwrap().unwrap().id, first);
        assert_eq!(store.claim_next().await.unwrap().unwrap().id, second);
        assert!(store.claim_next().await.unwrap().is_none());
        assert_eq!(store.counts().await.unwrap().active, 2);
    }

    #[tokio::test]
    async fn test_custom_job_id_not_duplicated() {
        let store = store();
        let options = EnqueueOptions::default().with_job_id(JobId::from("pub-1"));
        let a = store.add(&json!({}), &DEFAULT_JOB_POLICY, &options).await.unwrap();
        let b = store.add(&json!({}), &DEFAULT_JOB_POLICY, &options).await.unwrap();

        assert_eq!(a, b);
        assert_eq!(store.counts().await.unwrap().waiting, 1);
    }

    #[tokio::test]
    async fn test_remove_skips_active() {
        let store = store();
        let id = add(&store, "a").await;
        store.claim_next().await.unwrap();

        assert!(!store.remove(&id).await.unwrap());
        assert!(store.move_to_failed(&id, "Cancelled by user", true).await.unwrap());

        let job = store.get_job(&id).await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Failed);
        assert!(job.cancelled);
        assert!(!store.move_to_failed(&id, "again", true).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_backoff_then_exhaustion() {
        let store = store();
        let id = add(&store, "a").await;

        store.claim_next().await.unwrap();
        assert_eq!(store.fail(&id, "boom").await.unwrap(), Some(JobState::Delayed));
        assert!(store.claim_next().await.unwrap().is_none());

        tokio::time::advance(Duration::from_millis(5000)).await;
        assert_eq!(store.claim_next().await.unwrap().unwrap().id, id);
        assert_eq!(store.fail(&id, "boom").await.unwrap(), Some(JobState::Delayed));

        // second retry waits 10s
        tokio::time::advance(Duration::from_millis(9000)).await;
        assert!(store.claim_next().await.unwrap().is_none());
        tokio::time::advance(Duration::from_millis(1000)).await;
        store.claim_next().await.unwrap().unwrap();

        assert_eq!(store.fail(&id, "boom").await.unwrap(), Some(JobState::Failed));
        let job = store.get_job(&id).await.unwrap().unwrap();
        assert_eq!(job.attempts_made, 3);
        assert!(!job.cancelled);
        assert_eq!(job.failed_reason.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn test_completed_retention() {
        let store = store();
        let policy = JobPolicy {
            keep_completed: 2,
            ..DEFAULT_JOB_POLICY
        };
        let mut ids = Vec::new();
        for _ in 0..3 {
            let id = store
                .add(&json!({}), &policy, &EnqueueOptions::default())
                .await
                .unwrap();
            store.claim_next().await.unwrap();
            assert!(store.complete(&id).await.unwrap());
            ids.push(id);
            // distinct finish timestamps
            tokio::time::sleep(Duration::from_millis(2)).await;
        }

        assert_eq!(store.counts().await.unwrap().completed, 2);
        assert!(store.get_job(&ids[0]).await.unwrap().is_none());
        assert!(store.get_job(&ids[2]).await.unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_delayed_job_becomes_waiting() {
        let store = store();
        let options = EnqueueOptions::default().with_delay(Duration::from_secs(60));
        let id = store.add(&json!({}), &DEFAULT_JOB_POLICY, &options).await.unwrap();

        let delayed = store.get_jobs(&[JobState::Delayed]).await.unwrap();
        assert_eq!(delayed.len(), 1);
        assert!(store.claim_next().await.unwrap().is_none());

        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(store.claim_next().await.unwrap().unwrap().id, id);
    }

    #[tokio::test]
    async fn test_connector_counts_opens() {
        let connector = InMemoryConnector::new();
        connector.connect(QueueName::Stt).await.unwrap();
        connector.connect(QueueName::Llm).await.unwrap();
        assert_eq!(connector.opened(), 2);
    }
}
