//! Job dispatcher: typed enqueue with the standard job policy.

use std::sync::Arc;
use std::time::Duration;

use clip_models::{
    JobId, JobPayload, JobPolicy, PublishJob, QueueName, StatsCollectJob, DEFAULT_JOB_POLICY,
};
use tracing::{debug, info};

use crate::error::{QueueError, QueueResult};
use crate::metrics;
use crate::registry::QueueRegistry;
use crate::store::EnqueueOptions;

/// Submits jobs to the registry's queues.
///
/// Every job gets the same retry/backoff/retention policy. No idempotency is
/// enforced beyond caller-chosen job ids; producers must not double-enqueue
/// the same step.
#[derive(Clone)]
pub struct JobDispatcher {
    registry: Arc<QueueRegistry>,
    policy: JobPolicy,
}

impl JobDispatcher {
    pub fn new(registry: Arc<QueueRegistry>) -> Self {
        Self {
            registry,
            policy: DEFAULT_JOB_POLICY,
        }
    }

    /// Override the job policy.
    pub fn with_policy(mut self, policy: JobPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> &JobPolicy {
        &self.policy
    }

    pub fn registry(&self) -> &Arc<QueueRegistry> {
        &self.registry
    }

    /// Enqueue a payload on its own queue.
    pub async fn enqueue<P: JobPayload>(&self, payload: &P) -> QueueResult<JobId> {
        self.enqueue_with(payload, EnqueueOptions::default()).await
    }

    /// Enqueue a payload with a job id and/or delay.
    pub async fn enqueue_with<P: JobPayload>(
        &self,
        payload: &P,
        options: EnqueueOptions,
    ) -> QueueResult<JobId> {
        payload.validate().map_err(QueueError::invalid_payload)?;

        // cancellation finds video-scoped jobs by their videoId
        let video_id = payload.video_id().filter(|id| !id.as_str().is_empty());
        if video_id.is_none() && QueueName::VIDEO_SCOPED.contains(&P::QUEUE) {
            return Err(QueueError::invalid_payload(format!(
                "{} job requires a videoId",
                P::QUEUE
            )));
        }
        if let Some(video_id) = video_id {
            debug!(queue = %P::QUEUE, video_id = %video_id, "Enqueueing video job");
        }

        let data = serde_json::to_value(payload)?;
        self.enqueue_raw(P::QUEUE, data, options).await
    }

    /// Enqueue an already-serialized payload.
    pub async fn enqueue_raw(
        &self,
        queue: QueueName,
        data: serde_json::Value,
        options: EnqueueOptions,
    ) -> QueueResult<JobId> {
        if !data.is_object() {
            return Err(QueueError::invalid_payload("job payload must be a JSON object"));
        }

        let handle = self.registry.get_or_create(queue).await?;
        let job_id = handle.store().add(&data, &self.policy, &options).await?;

        metrics::record_enqueued(queue);
        info!(
            queue = %queue,
            job_id = %job_id,
            delay_ms = options.delay_ms(),
            "Enqueued job"
        );

        Ok(job_id)
    }

    /// Enqueue the publish job of a publication under `pub-<publicationId>`.
    pub async fn enqueue_publish(
        &self,
        job: &PublishJob,
        delay: Option<Duration>,
    ) -> QueueResult<JobId> {
        let mut options =
            EnqueueOptions::default().with_job_id(JobId::for_publication(&job.publication_id));
        options.delay = delay;
        self.enqueue_with(job, options).await
    }

    /// Enqueue a stats poll to run after `delay`.
    pub async fn enqueue_stats(&self, job: &StatsCollectJob, delay: Duration) -> QueueResult<JobId> {
        self.enqueue_with(job, EnqueueOptions::default().with_delay(delay))
            .await
    }
}
