//! Axum control plane for the clip pipeline.
//!
//! This crate provides:
//! - Job dispatch and cancellation over the pipeline queues
//! - Shared fixed-window rate limiting that fails open
//! - Short-lived encrypted BYOK key cache
//! - Prometheus metrics

pub mod auth;
pub mod config;
pub mod counter_store;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod rate_limit;
pub mod routes;
pub mod services;
pub mod state;

pub use config::{ApiConfig, ProviderKeys};
pub use counter_store::{CounterStore, InMemoryCounterStore, RedisCounterStore};
pub use error::{ApiError, ApiResult};
pub use rate_limit::{RateLimitDecision, RateLimitRule, RateLimiter};
pub use routes::create_router;
pub use services::PipelineService;
pub use state::AppState;
