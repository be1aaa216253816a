//! Queue error types.

use std::time::Duration;

use thiserror::Error;

pub type QueueResult<T> = Result<T, QueueError>;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Queue store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Queue store timed out during {operation} after {elapsed:?}")]
    Timeout {
        operation: &'static str,
        elapsed: Duration,
    },

    #[error("Invalid job payload: {0}")]
    InvalidPayload(String),

    #[error("Corrupt job record {id}: {reason}")]
    CorruptJob { id: String, reason: String },

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl QueueError {
    pub fn store_unavailable(msg: impl Into<String>) -> Self {
        Self::StoreUnavailable(msg.into())
    }

    pub fn invalid_payload(msg: impl Into<String>) -> Self {
        Self::InvalidPayload(msg.into())
    }

    pub fn corrupt_job(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::CorruptJob {
            id: id.into(),
            reason: reason.into(),
        }
    }

    /// Transient errors are worth retrying by the caller.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::StoreUnavailable(_) | Self::Timeout { .. } => true,
            Self::Redis(e) => {
                e.is_io_error() || e.is_timeout() || e.is_connection_dropped() || e.is_connection_refusal()
            }
            Self::InvalidPayload(_) | Self::CorruptJob { .. } | Self::Json(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(QueueError::store_unavailable("down").is_transient());
        assert!(QueueError::Timeout {
            operation: "add",
            elapsed: Duration::from_secs(2)
        }
        .is_transient());
        assert!(!QueueError::invalid_payload("bad").is_transient());
    }
}
