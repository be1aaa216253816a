//! Durable job queues for the clip pipeline.
//!
//! This crate provides:
//! - The `JobStore` abstraction with Redis and in-memory backends
//! - A constructor-injected registry that opens each queue once per process
//! - The job dispatcher applying the standard retry/retention policy
//! - The cancellation coordinator for videos and publications

pub mod cancel;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod memory_store;
pub mod metrics;
pub mod redis_store;
pub mod registry;
pub mod store;

pub use cancel::{CancellationCoordinator, CANCELLED_REASON};
pub use config::QueueConfig;
pub use dispatcher::JobDispatcher;
pub use error::{QueueError, QueueResult};
pub use memory_store::{InMemoryConnector, InMemoryJobStore};
pub use redis_store::{RedisConnector, RedisJobStore};
pub use registry::{Queue, QueueRegistry};
pub use store::{EnqueueOptions, JobCounts, JobStore, StoreConnector, StoredJob};
