//! Job store abstraction shared by the Redis and in-memory backends.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use clip_models::{BackoffPolicy, JobId, JobPolicy, JobState, QueueName, VIDEO_ID_FIELD};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::QueueResult;

/// Per-call enqueue options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnqueueOptions {
    /// Caller-chosen job id; an existing job with this id is never duplicated
    pub job_id: Option<JobId>,
    /// Keep the job `delayed` for this long before it becomes claimable
    pub delay: Option<Duration>,
}

impl EnqueueOptions {
    pub fn with_job_id(mut self, job_id: JobId) -> Self {
        self.job_id = Some(job_id);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn delay_ms(&self) -> i64 {
        self.delay
            .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
            .unwrap_or(0)
    }
}

/// A job as read back from the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredJob {
    pub id: JobId,
    pub queue: QueueName,
    /// Payload as enqueued
    pub data: serde_json::Value,
    pub state: JobState,
    pub attempts_allowed: u32,
    pub attempts_made: u32,
    pub backoff: BackoffPolicy,
    pub keep_completed: u64,
    pub keep_failed: u64,
    pub failed_reason: Option<String>,
    /// Set when an active job was failed by a cancellation request
    pub cancelled: bool,
    /// Milliseconds since the Unix epoch
    pub created_at: i64,
    /// Earliest time the job may run, milliseconds since the Unix epoch
    pub process_at: i64,
}

impl StoredJob {
    /// Owning video from the payload's `videoId` field.
    pub fn video_id(&self) -> Option<&str> {
        self.data.get(VIDEO_ID_FIELD)?.as_str()
    }

    /// Decode the payload.
    pub fn payload<T: DeserializeOwned>(&self) -> QueueResult<T> {
        Ok(serde_json::from_value(self.data.clone())?)
    }
}

/// Number of jobs in each state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct JobCounts {
    pub waiting: u64,
    pub active: u64,
    pub delayed: u64,
    pub completed: u64,
    pub failed: u64,
}

impl JobCounts {
    pub fn get(&self, state: JobState) -> u64 {
        match state {
            JobState::Waiting => self.waiting,
            JobState::Active => self.active,
            JobState::Delayed => self.delayed,
            JobState::Completed => self.completed,
            JobState::Failed => self.failed,
        }
    }
}

/// Durable storage of one named queue.
///
/// Every state transition is atomic inside the store. Transitions that find
/// the job in an unexpected state (already claimed, already gone) report
/// `false`/`None` instead of failing, so concurrent workers and cancellation
/// never turn a lost race into an error.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Queue this store is bound to.
    fn queue(&self) -> QueueName;

    /// Add a job; returns its id (the existing id when `options.job_id` is taken).
    async fn add(
        &self,
        data: &serde_json::Value,
        policy: &JobPolicy,
        options: &EnqueueOptions,
    ) -> QueueResult<JobId>;

    /// All jobs currently in any of `states`.
    async fn get_jobs(&self, states: &[JobState]) -> QueueResult<Vec<StoredJob>>;

    async fn get_job(&self, id: &JobId) -> QueueResult<Option<StoredJob>>;

    /// Delete a job that is not active. Returns whether it was removed.
    async fn remove(&self, id: &JobId) -> QueueResult<bool>;

    /// Force an active job to `failed`. Returns whether it was active.
    async fn move_to_failed(&self, id: &JobId, reason: &str, cancelled: bool) -> QueueResult<bool>;

    /// Promote due delayed jobs and claim the oldest waiting job.
    async fn claim_next(&self) -> QueueResult<Option<StoredJob>>;

    /// Mark an active job completed. Returns whether it was active.
    async fn complete(&self, id: &JobId) -> QueueResult<bool>;

    /// Record a failed attempt of an active job.
    ///
    /// Returns `Delayed` when a retry was scheduled, `Failed` when attempts
    /// are exhausted, `None` when the job was not active.
    async fn fail(&self, id: &JobId, reason: &str) -> QueueResult<Option<JobState>>;

    async fn counts(&self) -> QueueResult<JobCounts>;

    /// Cheap liveness probe.
    async fn ping(&self) -> QueueResult<()>;
}

/// Opens the store of a queue. Opening is expensive; the registry calls it
/// at most once per queue.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StoreConnector: Send + Sync {
    async fn connect(&self, queue: QueueName) -> QueueResult<Arc<dyn JobStore>>;
}
