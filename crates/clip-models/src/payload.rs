//! Stage-specific job payloads.
//!
//! Every payload serializes with camelCase field names; the queue core only
//! ever inspects the `videoId` field of a stored payload.

use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::{
    AnalysisTask, ClipFormat, ClipId, Cta, LlmTier, Platform, PublicationId, QueueName, Strategy,
    SubtitleSegment, VideoId,
};

/// Wire name of the payload field used to correlate jobs with their video.
pub const VIDEO_ID_FIELD: &str = "videoId";

/// A payload that belongs on exactly one pipeline queue.
pub trait JobPayload: Serialize + DeserializeOwned + Send + Sync {
    /// Queue this payload is enqueued on.
    const QUEUE: QueueName;

    /// Owning video, if the payload is video-scoped.
    fn video_id(&self) -> Option<&VideoId> {
        None
    }

    /// Reject payloads a worker could never process.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

/// Transcribe the audio track of an uploaded video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SttJob {
    pub video_id: VideoId,
    pub source_file_path: String,
    pub strategy: Strategy,
    /// ISO 639-1 language hint
    pub language: String,
}

impl SttJob {
    pub fn new(video_id: VideoId, source_file_path: impl Into<String>, strategy: Strategy) -> Self {
        Self {
            video_id,
            source_file_path: source_file_path.into(),
            strategy,
            language: "ru".to_string(),
        }
    }

    /// Set the language hint.
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }
}

impl JobPayload for SttJob {
    const QUEUE: QueueName = QueueName::Stt;

    fn video_id(&self) -> Option<&VideoId> {
        Some(&self.video_id)
    }

    fn validate(&self) -> Result<(), String> {
        if self.source_file_path.trim().is_empty() {
            return Err("sourceFilePath must not be empty".to_string());
        }
        if self.language.is_empty() || self.language.len() > 8 {
            return Err(format!("Invalid language code: {:?}", self.language));
        }
        Ok(())
    }
}

/// Run one analysis task over a transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LlmJob {
    pub video_id: VideoId,
    pub task: AnalysisTask,
    pub strategy: Strategy,
    /// Task input, opaque to the pipeline core
    #[serde(default)]
    pub input: serde_json::Map<String, serde_json::Value>,
    /// Explicit tier; when absent the worker selects one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier: Option<LlmTier>,
}

impl LlmJob {
    pub fn new(video_id: VideoId, task: AnalysisTask, strategy: Strategy) -> Self {
        Self {
            video_id,
            task,
            strategy,
            input: serde_json::Map::new(),
            tier: None,
        }
    }

    /// Set the task input.
    pub fn with_input(mut self, input: serde_json::Map<String, serde_json::Value>) -> Self {
        self.input = input;
        self
    }

    /// Pin the job to a tier.
    pub fn with_tier(mut self, tier: LlmTier) -> Self {
        self.tier = Some(tier);
        self
    }
}

impl JobPayload for LlmJob {
    const QUEUE: QueueName = QueueName::Llm;

    fn video_id(&self) -> Option<&VideoId> {
        Some(&self.video_id)
    }
}

/// Render one clip with subtitles and optional CTA.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VideoRenderJob {
    pub clip_id: ClipId,
    pub video_id: VideoId,
    pub source_file_path: String,
    /// Clip start in the source, seconds
    pub start_time: f64,
    /// Clip end in the source, seconds
    pub end_time: f64,
    #[serde(default)]
    pub format: ClipFormat,
    #[serde(default)]
    pub subtitle_segments: Vec<SubtitleSegment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cta: Option<Cta>,
    #[serde(default)]
    pub watermark: bool,
}

impl VideoRenderJob {
    pub fn new(
        clip_id: ClipId,
        video_id: VideoId,
        source_file_path: impl Into<String>,
        start_time: f64,
        end_time: f64,
    ) -> Self {
        Self {
            clip_id,
            video_id,
            source_file_path: source_file_path.into(),
            start_time,
            end_time,
            format: ClipFormat::default(),
            subtitle_segments: Vec::new(),
            cta: None,
            watermark: false,
        }
    }

    /// Set the output format.
    pub fn with_format(mut self, format: ClipFormat) -> Self {
        self.format = format;
        self
    }

    /// Set subtitle segments.
    pub fn with_subtitles(mut self, segments: Vec<SubtitleSegment>) -> Self {
        self.subtitle_segments = segments;
        self
    }

    /// Set the call-to-action.
    pub fn with_cta(mut self, cta: Option<Cta>) -> Self {
        self.cta = cta;
        self
    }

    /// Burn in the free-plan watermark.
    pub fn with_watermark(mut self, watermark: bool) -> Self {
        self.watermark = watermark;
        self
    }

    /// Clip duration in seconds.
    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }
}

impl JobPayload for VideoRenderJob {
    const QUEUE: QueueName = QueueName::VideoRender;

    fn video_id(&self) -> Option<&VideoId> {
        Some(&self.video_id)
    }

    fn validate(&self) -> Result<(), String> {
        if !self.start_time.is_finite() || !self.end_time.is_finite() || self.start_time < 0.0 {
            return Err("Clip bounds must be finite and non-negative".to_string());
        }
        if self.end_time <= self.start_time {
            return Err(format!(
                "Clip end ({}) must be after start ({})",
                self.end_time, self.start_time
            ));
        }
        if self.subtitle_segments.iter().any(|s| s.end < s.start) {
            return Err("Subtitle segment ends before it starts".to_string());
        }
        Ok(())
    }
}

/// Upload a rendered clip to one platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PublishJob {
    pub clip_id: ClipId,
    pub publication_id: PublicationId,
    pub platform: Platform,
    /// Platform OAuth token in `iv:ciphertext:authTag` form
    pub access_token_encrypted: String,
    pub source_file_path: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl PublishJob {
    pub fn new(
        clip_id: ClipId,
        publication_id: PublicationId,
        platform: Platform,
        access_token_encrypted: impl Into<String>,
        source_file_path: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        Self {
            clip_id,
            publication_id,
            platform,
            access_token_encrypted: access_token_encrypted.into(),
            source_file_path: source_file_path.into(),
            title: title.into(),
            description: None,
        }
    }

    /// Set the description.
    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }
}

impl JobPayload for PublishJob {
    const QUEUE: QueueName = QueueName::Publish;

    fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("title must not be empty".to_string());
        }
        if self.access_token_encrypted.split(':').count() != 3 {
            return Err("accessTokenEncrypted is not an encrypted secret".to_string());
        }
        Ok(())
    }
}

/// Poll view/like counters of a published post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatsCollectJob {
    pub publication_id: PublicationId,
    pub platform: Platform,
    pub platform_post_id: String,
}

impl StatsCollectJob {
    pub fn new(
        publication_id: PublicationId,
        platform: Platform,
        platform_post_id: impl Into<String>,
    ) -> Self {
        Self {
            publication_id,
            platform,
            platform_post_id: platform_post_id.into(),
        }
    }
}

impl JobPayload for StatsCollectJob {
    const QUEUE: QueueName = QueueName::StatsCollect;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stt_payload_wire_shape() {
        let job = SttJob::new(VideoId::from("v1"), "uploads/v1.mp4", Strategy::Global)
            .with_language("en");
        let value = serde_json::to_value(&job).unwrap();

        assert_eq!(value[VIDEO_ID_FIELD], "v1");
        assert_eq!(value["sourceFilePath"], "uploads/v1.mp4");
        assert_eq!(value["strategy"], "global");
        assert_eq!(value["language"], "en");
        assert_eq!(SttJob::QUEUE, QueueName::Stt);
    }

    #[test]
    fn test_llm_payload_omits_missing_tier() {
        let job = LlmJob::new(VideoId::from("v1"), AnalysisTask::ViralityScoring, Strategy::Ru);
        let value = serde_json::to_value(&job).unwrap();
        assert_eq!(value["task"], "virality_scoring");
        assert!(value.get("tier").is_none());

        let pinned = job.with_tier(LlmTier::TIER_2);
        let value = serde_json::to_value(&pinned).unwrap();
        assert_eq!(value["tier"], 2);
    }

    #[test]
    fn test_render_validation() {
        let job = VideoRenderJob::new(ClipId::from("c1"), VideoId::from("v1"), "src.mp4", 10.0, 40.0)
            .with_format(ClipFormat::Square);
        assert!(job.validate().is_ok());
        assert_eq!(job.duration(), 30.0);

        let inverted = VideoRenderJob::new(ClipId::from("c1"), VideoId::from("v1"), "src.mp4", 40.0, 10.0);
        assert!(inverted.validate().is_err());
    }

    #[test]
    fn test_publish_and_stats_are_not_video_scoped() {
        let publish = PublishJob::new(
            ClipId::from("c1"),
            PublicationId::from("p1"),
            Platform::Vk,
            "aa:bb:cc",
            "clips/c1.mp4",
            "Title",
        );
        assert!(publish.video_id().is_none());
        assert!(publish.validate().is_ok());

        let value = serde_json::to_value(&publish).unwrap();
        assert_eq!(value["platform"], "vk");
        assert!(value.get(VIDEO_ID_FIELD).is_none());

        let stats = StatsCollectJob::new(PublicationId::from("p1"), Platform::Dzen, "post-9");
        assert!(stats.video_id().is_none());
    }
}
