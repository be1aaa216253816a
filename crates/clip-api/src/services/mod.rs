//! Business logic services.

pub mod byok_cache;
pub mod pipeline;

pub use byok_cache::ByokCache;
pub use pipeline::{ClipPublication, PipelineService, PlatformToken, PublicationTarget, STATS_SCHEDULE};
