//! Queue metrics.
//!
//! Provides counters for:
//! - Jobs enqueued per queue
//! - Jobs cancelled per queue and action
//! - Store errors per queue and operation

use clip_models::QueueName;
use metrics::counter;

/// Metric name constants for consistency.
pub mod names {
    /// Jobs enqueued by queue.
    pub const JOBS_ENQUEUED_TOTAL: &str = "clip_jobs_enqueued_total";

    /// Jobs cancelled by queue and action (`removed` or `failed`).
    pub const JOBS_CANCELLED_TOTAL: &str = "clip_jobs_cancelled_total";

    /// Store errors by queue and operation.
    pub const STORE_ERRORS_TOTAL: &str = "clip_queue_store_errors_total";
}

pub fn record_enqueued(queue: QueueName) {
    counter!(names::JOBS_ENQUEUED_TOTAL, "queue" => queue.as_str()).increment(1);
}

pub fn record_cancelled(queue: QueueName, action: &'static str) {
    counter!(
        names::JOBS_CANCELLED_TOTAL,
        "queue" => queue.as_str(),
        "action" => action
    )
    .increment(1);
}

pub fn record_store_error(queue: QueueName, operation: &'static str) {
    counter!(
        names::STORE_ERRORS_TOTAL,
        "queue" => queue.as_str(),
        "operation" => operation
    )
    .increment(1);
}
