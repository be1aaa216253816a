//! Pipeline service: the request tier's entry points into the job pipeline.

use std::sync::Arc;
use std::time::Duration;

use clip_crypto::SecretCodec;
use clip_llm::{fallback_tier, select_tier, ByokKeys, ResolvedModel, Resolver, RoutingContext};
use clip_models::{
    AnalysisTask, ClipId, JobId, LlmJob, LlmTier, Platform, PublicationId, PublishJob,
    StatsCollectJob, Strategy, SttJob, VideoId, VideoRenderJob,
};
use clip_queue::{CancellationCoordinator, JobDispatcher};
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{ApiError, ApiResult};
use crate::services::ByokCache;

/// Delays after publication at which stats are polled; no poll after the last.
pub const STATS_SCHEDULE: [Duration; 4] = [
    Duration::from_secs(60 * 60),
    Duration::from_secs(6 * 60 * 60),
    Duration::from_secs(24 * 60 * 60),
    Duration::from_secs(72 * 60 * 60),
];

/// Platform credential supplied with a publication request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum PlatformToken {
    /// Plain OAuth token, encrypted before it is queued
    Plain(String),
    /// Already in `iv:ciphertext:authTag` form
    Encrypted(String),
}

/// One platform a clip should be published to.
#[derive(Debug, Clone)]
pub struct PublicationTarget {
    pub publication_id: PublicationId,
    pub platform: Platform,
    pub token: PlatformToken,
    /// Publish later instead of immediately
    pub delay: Option<Duration>,
}

/// Clip-level fields shared by every publication of the clip.
#[derive(Debug, Clone)]
pub struct ClipPublication {
    pub clip_id: ClipId,
    pub source_file_path: String,
    pub title: String,
    pub description: Option<String>,
}

#[derive(Clone)]
pub struct PipelineService {
    dispatcher: JobDispatcher,
    cancellation: CancellationCoordinator,
    byok: ByokCache,
    codec: Arc<SecretCodec>,
    resolver: Resolver,
}

impl PipelineService {
    pub fn new(
        dispatcher: JobDispatcher,
        cancellation: CancellationCoordinator,
        byok: ByokCache,
        codec: Arc<SecretCodec>,
    ) -> Self {
        Self {
            dispatcher,
            cancellation,
            byok,
            codec,
            resolver: Resolver::default(),
        }
    }

    pub fn byok(&self) -> &ByokCache {
        &self.byok
    }

    /// First pipeline step for a video.
    ///
    /// BYOK keys handed over with the request are cached before the job is
    /// queued so the analysis workers can find them.
    pub async fn start_transcription(
        &self,
        user_id: &str,
        job: SttJob,
        byok: Option<&ByokKeys>,
    ) -> ApiResult<JobId> {
        if let Some(keys) = byok.filter(|keys| !keys.is_empty()) {
            self.byok.cache_keys(user_id, keys).await?;
        }

        let job_id = self.dispatcher.enqueue(&job).await?;
        info!(
            user_id,
            video_id = %job.video_id,
            strategy = %job.strategy,
            job_id = %job_id,
            "Transcription queued"
        );
        Ok(job_id)
    }

    /// One `llm` job per analysis task.
    pub async fn enqueue_analysis(
        &self,
        video_id: &VideoId,
        strategy: Strategy,
        tasks: &[AnalysisTask],
        input: serde_json::Map<String, serde_json::Value>,
        tier: Option<LlmTier>,
    ) -> ApiResult<Vec<JobId>> {
        let mut ids = Vec::with_capacity(tasks.len());
        for task in tasks {
            let mut job = LlmJob::new(video_id.clone(), *task, strategy).with_input(input.clone());
            if let Some(tier) = tier {
                job = job.with_tier(tier);
            }
            ids.push(self.dispatcher.enqueue(&job).await?);
        }
        info!(video_id = %video_id, jobs = ids.len(), "Analysis queued");
        Ok(ids)
    }

    /// One `video-render` job per clip.
    pub async fn enqueue_renders(&self, jobs: &[VideoRenderJob]) -> ApiResult<Vec<JobId>> {
        let mut ids = Vec::with_capacity(jobs.len());
        for job in jobs {
            ids.push(self.dispatcher.enqueue(job).await?);
        }
        debug!(jobs = ids.len(), "Renders queued");
        Ok(ids)
    }

    /// One `publish` job per target platform, keyed `pub-<publicationId>`.
    ///
    /// Plain tokens are encrypted with the platform secret; the queue never
    /// holds a plaintext credential.
    pub async fn enqueue_publications(
        &self,
        clip: &ClipPublication,
        targets: &[PublicationTarget],
    ) -> ApiResult<Vec<JobId>> {
        let mut ids = Vec::with_capacity(targets.len());
        for target in targets {
            let token = match &target.token {
                PlatformToken::Plain(token) => self.codec.encrypt(token)?,
                PlatformToken::Encrypted(token) => token.clone(),
            };
            let job = PublishJob::new(
                clip.clip_id.clone(),
                target.publication_id.clone(),
                target.platform,
                token,
                clip.source_file_path.clone(),
                clip.title.clone(),
            )
            .with_description(clip.description.clone());

            let job_id = self.dispatcher.enqueue_publish(&job, target.delay).await?;
            info!(
                clip_id = %clip.clip_id,
                publication_id = %target.publication_id,
                platform = %target.platform,
                scheduled = target.delay.is_some(),
                "Publication queued"
            );
            ids.push(job_id);
        }
        Ok(ids)
    }

    /// Schedule the `attempt`-th stats poll (0-based) of a publication.
    ///
    /// Returns `None` past the last step of [`STATS_SCHEDULE`] and for
    /// platforms without statistics.
    pub async fn schedule_stats(&self, job: &StatsCollectJob, attempt: usize) -> ApiResult<Option<JobId>> {
        if !job.platform.supports_stats() {
            return Ok(None);
        }
        let Some(delay) = STATS_SCHEDULE.get(attempt) else {
            debug!(publication_id = %job.publication_id, attempt, "Stats polling finished");
            return Ok(None);
        };

        let job_id = self.dispatcher.enqueue_stats(job, *delay).await?;
        Ok(Some(job_id))
    }

    /// Cancel every queued or running stage of a video.
    pub async fn cancel_video(&self, video_id: &VideoId) -> ApiResult<usize> {
        Ok(self.cancellation.cancel_video(video_id).await?)
    }

    /// Drop a publication that has not started yet.
    pub async fn cancel_publication(&self, publication_id: &PublicationId) -> ApiResult<bool> {
        Ok(self.cancellation.cancel_publication(publication_id).await?)
    }

    /// Model for a call, with the tier chosen by the routing heuristic and
    /// the user's cached BYOK keys applied.
    pub async fn resolve_model(&self, user_id: &str, ctx: &RoutingContext) -> ApiResult<ResolvedModel> {
        let tier = select_tier(ctx);
        self.resolve_at(user_id, ctx, tier).await
    }

    /// Model to retry with after `failed` errored, if the tier has a fallback.
    pub async fn fallback_model(
        &self,
        user_id: &str,
        ctx: &RoutingContext,
        failed: &ResolvedModel,
    ) -> ApiResult<Option<ResolvedModel>> {
        let Some(tier) = failed.tier.and_then(fallback_tier) else {
            return Ok(None);
        };
        self.resolve_at(user_id, ctx, tier).await.map(Some)
    }

    async fn resolve_at(&self, user_id: &str, ctx: &RoutingContext, tier: LlmTier) -> ApiResult<ResolvedModel> {
        let keys = self.byok.peek_all(user_id).await;
        let byok = (!keys.is_empty()).then_some(&keys);
        self.resolver
            .resolve(ctx.strategy, ctx.task, tier.value(), byok)
            .map_err(ApiError::from)
    }
}
