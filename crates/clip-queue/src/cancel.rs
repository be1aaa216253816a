//! Cancellation of every job belonging to a video, and of single publications.

use std::sync::Arc;

use clip_models::{JobId, JobState, PublicationId, QueueName, VideoId};
use futures_util::future::join_all;
use tracing::{debug, info, warn};

use crate::error::{QueueError, QueueResult};
use crate::metrics;
use crate::registry::QueueRegistry;
use crate::store::{JobStore, StoredJob};

/// Failure reason recorded on active jobs stopped by a user.
pub const CANCELLED_REASON: &str = "Cancelled by user";

/// Removes or fails the jobs of a cancelled video across queues.
///
/// Best effort: a job that changes state between the scan and the action
/// (e.g. claimed by a worker right after being read as waiting) may be
/// missed. Calling again converges on no remaining matching jobs.
#[derive(Clone)]
pub struct CancellationCoordinator {
    registry: Arc<QueueRegistry>,
}

impl CancellationCoordinator {
    pub fn new(registry: Arc<QueueRegistry>) -> Self {
        Self { registry }
    }

    /// Cancel every waiting, delayed or active job whose payload `videoId`
    /// equals `video_id` in the given queues.
    ///
    /// Waiting and delayed jobs are removed; active jobs are moved to
    /// `failed` with [`CANCELLED_REASON`] and flagged as cancelled. Returns
    /// the number of jobs acted on.
    ///
    /// A store failure on one job or queue does not stop the scan: every
    /// queue is still visited, and the first error is returned once the
    /// scan is over. Jobs cancelled before that error stay cancelled.
    pub async fn cancel_by_owner(&self, video_id: &VideoId, queues: &[QueueName]) -> QueueResult<usize> {
        let mut total = 0;
        let mut first_error: Option<QueueError> = None;

        for name in queues {
            match self.cancel_in_queue(video_id, *name).await {
                Ok(ScanOutcome { cancelled, error }) => {
                    total += cancelled;
                    if let Some(e) = error {
                        first_error.get_or_insert(e);
                    }
                }
                Err(e) => {
                    warn!(video_id = %video_id, queue = %name, error = %e, "Queue scan failed during cancellation");
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => {
                warn!(video_id = %video_id, cancelled = total, "Video cancellation incomplete");
                Err(e)
            }
            None => Ok(total),
        }
    }

    async fn cancel_in_queue(&self, video_id: &VideoId, name: QueueName) -> QueueResult<ScanOutcome> {
        let queue = self.registry.get_or_create(name).await?;
        let store = queue.store();

        let jobs = store.get_jobs(JobState::CANCELLABLE).await?;
        let matching: Vec<&StoredJob> = jobs
            .iter()
            .filter(|job| job.video_id() == Some(video_id.as_str()))
            .collect();
        if matching.is_empty() {
            return Ok(ScanOutcome::default());
        }

        let outcomes = join_all(matching.iter().map(|job| cancel_job(store, job))).await;

        let mut result = ScanOutcome::default();
        for (job, outcome) in matching.iter().zip(outcomes) {
            match outcome {
                Ok(true) => result.cancelled += 1,
                Ok(false) => debug!(
                    queue = %name,
                    job_id = %job.id,
                    "Job changed state during cancellation, skipped"
                ),
                Err(e) => {
                    warn!(queue = %name, job_id = %job.id, error = %e, "Failed to cancel job");
                    result.error.get_or_insert(e);
                }
            }
        }

        info!(
            video_id = %video_id,
            queue = %name,
            found = matching.len(),
            cancelled = result.cancelled,
            "Cancelled video jobs"
        );
        Ok(result)
    }

    /// Cancel the pipeline queues that carry a `videoId`.
    pub async fn cancel_video(&self, video_id: &VideoId) -> QueueResult<usize> {
        self.cancel_by_owner(video_id, QueueName::VIDEO_SCOPED).await
    }

    /// Remove the publish job of a publication if it has not started.
    ///
    /// Returns whether a job was removed. Active publish jobs are left alone.
    pub async fn cancel_publication(&self, publication_id: &PublicationId) -> QueueResult<bool> {
        let queue = self.registry.get_or_create(QueueName::Publish).await?;
        let store = queue.store();
        let job_id = JobId::for_publication(publication_id);

        let Some(job) = store.get_job(&job_id).await? else {
            return Ok(false);
        };
        if !job.state.is_pending() {
            debug!(job_id = %job_id, state = %job.state, "Publish job not pending, not cancelled");
            return Ok(false);
        }

        let removed = store.remove(&job_id).await?;
        if removed {
            metrics::record_cancelled(QueueName::Publish, "removed");
            info!(publication_id = %publication_id, job_id = %job_id, "Cancelled publication job");
        }
        Ok(removed)
    }
}

#[derive(Default)]
struct ScanOutcome {
    cancelled: usize,
    error: Option<QueueError>,
}

async fn cancel_job(store: &dyn JobStore, job: &StoredJob) -> QueueResult<bool> {
    let (done, action) = match job.state {
        JobState::Waiting | JobState::Delayed => (store.remove(&job.id).await?, "removed"),
        JobState::Active => (
            store.move_to_failed(&job.id, CANCELLED_REASON, true).await?,
            "failed",
        ),
        JobState::Completed | JobState::Failed => (false, "none"),
    };
    if done {
        metrics::record_cancelled(store.queue(), action);
    }
    Ok(done)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_store::{InMemoryConnector, InMemoryJobStore};
    use crate::store::{EnqueueOptions, MockJobStore, MockStoreConnector};
    use clip_models::{BackoffPolicy, DEFAULT_JOB_POLICY};
    use serde_json::json;
    use std::time::Duration;

    struct Fixture {
        registry: Arc<QueueRegistry>,
        coordinator: CancellationCoordinator,
    }

    fn fixture() -> Fixture {
        let registry = Arc::new(QueueRegistry::new(Arc::new(InMemoryConnector::new())));
        Fixture {
            coordinator: CancellationCoordinator::new(Arc::clone(&registry)),
            registry,
        }
    }

    impl Fixture {
        async fn add(&self, queue: QueueName, video: &str, options: EnqueueOptions) -> JobId {
            let handle = self.registry.get_or_create(queue).await.unwrap();
            handle
                .store()
                .add(&json!({"videoId": video}), &DEFAULT_JOB_POLICY, &options)
                .await
                .unwrap()
        }

        async fn job(&self, queue: QueueName, id: &JobId) -> Option<StoredJob> {
            let handle = self.registry.get_or_create(queue).await.unwrap();
            handle.store().get_job(id).await.unwrap()
        }

        async fn claim(&self, queue: QueueName) -> StoredJob {
            let handle = self.registry.get_or_create(queue).await.unwrap();
            handle.store().claim_next().await.unwrap().unwrap()
        }
    }

    fn delayed() -> EnqueueOptions {
        EnqueueOptions::default().with_delay(Duration::from_secs(600))
    }

    #[tokio::test]
    async fn test_cancels_only_target_video() {
        let f = fixture();

        // active jobs first so claim_next picks them
        let a_active = f.add(QueueName::Stt, "A", EnqueueOptions::default()).await;
        let b_active = f.add(QueueName::Llm, "B", EnqueueOptions::default()).await;
        f.claim(QueueName::Stt).await;
        f.claim(QueueName::Llm).await;

        let a_waiting = f.add(QueueName::Llm, "A", EnqueueOptions::default()).await;
        let a_delayed = f.add(QueueName::VideoRender, "A", delayed()).await;
        let b_waiting = f.add(QueueName::Stt, "B", EnqueueOptions::default()).await;
        let b_delayed = f.add(QueueName::VideoRender, "B", delayed()).await;

        let count = f
            .coordinator
            .cancel_by_owner(&VideoId::from("A"), QueueName::VIDEO_SCOPED)
            .await
            .unwrap();
        assert_eq!(count, 3);

        // waiting/delayed A jobs are gone, the active one is failed
        assert!(f.job(QueueName::Llm, &a_waiting).await.is_none());
        assert!(f.job(QueueName::VideoRender, &a_delayed).await.is_none());
        let failed = f.job(QueueName::Stt, &a_active).await.unwrap();
        assert_eq!(failed.state, JobState::Failed);
        assert_eq!(failed.failed_reason.as_deref(), Some(CANCELLED_REASON));
        assert!(failed.cancelled);

        // B untouched
        assert_eq!(f.job(QueueName::Llm, &b_active).await.unwrap().state, JobState::Active);
        assert_eq!(f.job(QueueName::Stt, &b_waiting).await.unwrap().state, JobState::Waiting);
        assert_eq!(
            f.job(QueueName::VideoRender, &b_delayed).await.unwrap().state,
            JobState::Delayed
        );
    }

    #[tokio::test]
    async fn test_enqueue_then_cancel_before_claim() {
        let f = fixture();
        f.add(QueueName::Stt, "v1", EnqueueOptions::default()).await;

        let count = f
            .coordinator
            .cancel_by_owner(&VideoId::from("v1"), &[QueueName::Stt])
            .await
            .unwrap();
        assert_eq!(count, 1);

        let queue = f.registry.get_or_create(QueueName::Stt).await.unwrap();
        let waiting = queue.store().get_jobs(&[JobState::Waiting]).await.unwrap();
        assert!(waiting.iter().all(|job| job.video_id() != Some("v1")));
    }

    #[tokio::test]
    async fn test_repeat_cancel_converges() {
        let f = fixture();
        f.add(QueueName::Stt, "v1", EnqueueOptions::default()).await;
        f.claim(QueueName::Stt).await;
        f.add(QueueName::Stt, "v1", EnqueueOptions::default()).await;

        let first = f.coordinator.cancel_video(&VideoId::from("v1")).await.unwrap();
        let second = f.coordinator.cancel_video(&VideoId::from("v1")).await.unwrap();
        assert_eq!(first, 2);
        assert_eq!(second, 0);
    }

    #[tokio::test]
    async fn test_completed_and_unrelated_jobs_ignored() {
        let f = fixture();
        let done = f.add(QueueName::Stt, "v1", EnqueueOptions::default()).await;
        f.claim(QueueName::Stt).await;
        let queue = f.registry.get_or_create(QueueName::Stt).await.unwrap();
        queue.store().complete(&done).await.unwrap();

        let handle = f.registry.get_or_create(QueueName::Llm).await.unwrap();
        handle
            .store()
            .add(&json!({"task": "title_generation"}), &DEFAULT_JOB_POLICY, &EnqueueOptions::default())
            .await
            .unwrap();

        let count = f.coordinator.cancel_video(&VideoId::from("v1")).await.unwrap();
        assert_eq!(count, 0);
        assert_eq!(
            f.job(QueueName::Stt, &done).await.unwrap().state,
            JobState::Completed
        );
    }

    fn stored(id: &str, video: &str, state: JobState) -> StoredJob {
        StoredJob {
            id: JobId::from(id),
            queue: QueueName::Stt,
            data: json!({"videoId": video}),
            state,
            attempts_allowed: 3,
            attempts_made: 0,
            backoff: BackoffPolicy::Exponential { delay_ms: 5000 },
            keep_completed: 1000,
            keep_failed: 5000,
            failed_reason: None,
            cancelled: false,
            created_at: 0,
            process_at: 0,
        }
    }

    fn registry_with(store: MockJobStore) -> Arc<QueueRegistry> {
        let store: Arc<dyn JobStore> = Arc::new(store);
        let mut connector = MockStoreConnector::new();
        connector
            .expect_connect()
            .returning(move |_| Ok(Arc::clone(&store)));
        Arc::new(QueueRegistry::new(Arc::new(connector)))
    }

    #[tokio::test]
    async fn test_job_moving_mid_scan_is_tolerated() {
        let mut store = MockJobStore::new();
        store.expect_queue().return_const(QueueName::Stt);
        store.expect_get_jobs().returning(|_| {
            Ok(vec![
                stored("1", "v1", JobState::Waiting),
                stored("2", "v1", JobState::Active),
                stored("3", "v1", JobState::Waiting),
            ])
        });
        // job 1 was claimed by a worker after the scan
        store
            .expect_remove()
            .withf(|id| id.as_str() == "1")
            .returning(|_| Ok(false));
        store
            .expect_remove()
            .withf(|id| id.as_str() == "3")
            .returning(|_| Ok(true));
        // job 2 finished before the fail landed
        store
            .expect_move_to_failed()
            .withf(|id, reason, cancelled| id.as_str() == "2" && reason.to_string() == CANCELLED_REASON && *cancelled)
            .returning(|_, _, _| Ok(false));

        let coordinator = CancellationCoordinator::new(registry_with(store));
        let count = coordinator
            .cancel_by_owner(&VideoId::from("v1"), &[QueueName::Stt])
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_store_failure_propagates() {
        let mut store = MockJobStore::new();
        store.expect_queue().return_const(QueueName::Stt);
        store
            .expect_get_jobs()
            .returning(|_| Err(QueueError::store_unavailable("connection reset")));

        let coordinator = CancellationCoordinator::new(registry_with(store));
        let err = coordinator
            .cancel_by_owner(&VideoId::from("v1"), &[QueueName::Stt])
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_failed_remove_does_not_stop_the_rest() {
        let mut store = MockJobStore::new();
        store.expect_queue().return_const(QueueName::Stt);
        store.expect_get_jobs().returning(|_| {
            Ok(vec![
                stored("1", "v1", JobState::Waiting),
                stored("2", "v1", JobState::Waiting),
                stored("3", "v1", JobState::Active),
            ])
        });
        store
            .expect_remove()
            .withf(|id| id.as_str() == "1")
            .times(1)
            .returning(|_| Err(QueueError::store_unavailable("connection reset")));
        store
            .expect_remove()
            .withf(|id| id.as_str() == "2")
            .times(1)
            .returning(|_| Ok(true));
        store
            .expect_move_to_failed()
            .withf(|id, _, cancelled| id.as_str() == "3" && *cancelled)
            .times(1)
            .returning(|_, _, _| Ok(true));

        let coordinator = CancellationCoordinator::new(registry_with(store));
        let err = coordinator
            .cancel_by_owner(&VideoId::from("v1"), &[QueueName::Stt])
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_failing_queue_does_not_skip_later_queues() {
        let mut failing = MockJobStore::new();
        failing.expect_queue().return_const(QueueName::Stt);
        failing
            .expect_get_jobs()
            .returning(|_| Err(QueueError::store_unavailable("connection reset")));
        let failing: Arc<dyn JobStore> = Arc::new(failing);

        let llm = Arc::new(InMemoryJobStore::new(QueueName::Llm));
        let llm_job = llm
            .add(&json!({"videoId": "v1"}), &DEFAULT_JOB_POLICY, &EnqueueOptions::default())
            .await
            .unwrap();
        let llm_store: Arc<dyn JobStore> = llm.clone();

        let mut connector = MockStoreConnector::new();
        connector.expect_connect().returning(move |name| match name {
            QueueName::Stt => Ok(Arc::clone(&failing)),
            _ => Ok(Arc::clone(&llm_store)),
        });
        let coordinator =
            CancellationCoordinator::new(Arc::new(QueueRegistry::new(Arc::new(connector))));

        let result = coordinator
            .cancel_by_owner(&VideoId::from("v1"), &[QueueName::Stt, QueueName::Llm])
            .await;
        assert!(result.is_err());
        assert!(llm.get_job(&llm_job).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cancel_publication() {
        let f = fixture();
        let handle = f.registry.get_or_create(QueueName::Publish).await.unwrap();
        let options = EnqueueOptions::default()
            .with_job_id(JobId::for_publication(&PublicationId::from("p1")))
            .with_delay(Duration::from_secs(3600));
        handle
            .store()
            .add(&json!({"publicationId": "p1"}), &DEFAULT_JOB_POLICY, &options)
            .await
            .unwrap();

        let publication = PublicationId::from("p1");
        assert!(f.coordinator.cancel_publication(&publication).await.unwrap());
        assert!(!f.coordinator.cancel_publication(&publication).await.unwrap());
    }

    #[tokio::test]
    async fn test_active_publication_not_cancelled() {
        let store = InMemoryJobStore::new(QueueName::Publish);
        let options =
            EnqueueOptions::default().with_job_id(JobId::for_publication(&PublicationId::from("p2")));
        store
            .add(&json!({"publicationId": "p2"}), &DEFAULT_JOB_POLICY, &options)
            .await
            .unwrap();
        store.claim_next().await.unwrap();

        let store: Arc<dyn JobStore> = Arc::new(store);
        let mut connector = MockStoreConnector::new();
        connector
            .expect_connect()
            .returning(move |_| Ok(Arc::clone(&store)));
        let registry = Arc::new(QueueRegistry::new(Arc::new(connector)));
        let coordinator = CancellationCoordinator::new(registry);

        let removed = coordinator
            .cancel_publication(&PublicationId::from("p2"))
            .await
            .unwrap();
        assert!(!removed);
    }
}
