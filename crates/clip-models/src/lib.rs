//! Shared data models for the ClipMaker pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Entity identifiers (videos, clips, publications, jobs)
//! - Pipeline queue names and job lifecycle states
//! - The default job retry/retention policy
//! - Stage-specific job payloads
//! - Language-model strategy, task and tier enums

pub mod clip;
pub mod job;
pub mod llm;
pub mod payload;
pub mod platform;
pub mod queue;
pub mod video;

// Re-export common types
pub use clip::{ClipFormat, ClipId, Cta, CtaPosition, SubtitleSegment};
pub use job::{BackoffPolicy, JobId, JobPolicy, JobState, JobStateParseError, DEFAULT_JOB_POLICY};
pub use llm::{AnalysisTask, LlmParseError, LlmTask, LlmTier, Strategy};
pub use payload::{
    JobPayload, LlmJob, PublishJob, StatsCollectJob, SttJob, VideoRenderJob, VIDEO_ID_FIELD,
};
pub use platform::{Platform, PublicationId};
pub use queue::{QueueName, QueueNameParseError};
pub use video::VideoId;
