//! Job identity, lifecycle states and the default retry/retention policy.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::PublicationId;

/// Identifier of a job inside one queue.
///
/// Generated by the store (a per-queue counter) unless the producer supplies
/// its own, e.g. `pub-<publicationId>` for publish jobs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Deterministic job ID for the publish job of a publication.
    pub fn for_publication(publication_id: &PublicationId) -> Self {
        Self(format!("pub-{}", publication_id))
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Job state in a queue.
///
/// `Delayed` precedes `Waiting` (scheduled jobs and retry backoff).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Scheduled for later (delay or retry backoff)
    Delayed,
    /// Ready to be claimed by a worker
    Waiting,
    /// Held by a worker
    Active,
    /// Finished successfully
    Completed,
    /// Failed after exhausting attempts, or cancelled while active
    Failed,
}

impl JobState {
    pub const ALL: &'static [JobState] = &[
        JobState::Delayed,
        JobState::Waiting,
        JobState::Active,
        JobState::Completed,
        JobState::Failed,
    ];

    /// States a cancellation request acts on.
    pub const CANCELLABLE: &'static [JobState] =
        &[JobState::Waiting, JobState::Delayed, JobState::Active];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Delayed => "delayed",
            JobState::Waiting => "waiting",
            JobState::Active => "active",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }

    /// Pending jobs have not started and can be removed outright.
    pub fn is_pending(&self) -> bool {
        matches!(self, JobState::Waiting | JobState::Delayed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for JobState {
    type Err = JobStateParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "delayed" => Ok(JobState::Delayed),
            "waiting" | "wait" => Ok(JobState::Waiting),
            "active" => Ok(JobState::Active),
            "completed" => Ok(JobState::Completed),
            "failed" => Ok(JobState::Failed),
            _ => Err(JobStateParseError(s.to_string())),
        }
    }
}

#[derive(Debug, Error)]
#[error("Unknown job state: {0}")]
pub struct JobStateParseError(String);

/// Retry backoff between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackoffPolicy {
    /// `delay_ms * 2^(attempt - 1)`
    Exponential { delay_ms: u64 },
    /// Same delay before every retry
    Fixed { delay_ms: u64 },
}

impl BackoffPolicy {
    /// Delay before the retry that follows the given (1-based) failed attempt.
    pub fn delay_for_attempt(&self, attempts_made: u32) -> Duration {
        match *self {
            BackoffPolicy::Exponential { delay_ms } => {
                let exponent = attempts_made.saturating_sub(1).min(32);
                Duration::from_millis(delay_ms.saturating_mul(1u64 << exponent))
            }
            BackoffPolicy::Fixed { delay_ms } => Duration::from_millis(delay_ms),
        }
    }

    pub fn base_delay_ms(&self) -> u64 {
        match *self {
            BackoffPolicy::Exponential { delay_ms } | BackoffPolicy::Fixed { delay_ms } => delay_ms,
        }
    }
}

/// Retry and retention policy applied to every enqueued job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct JobPolicy {
    /// Total attempts including the first run
    pub attempts: u32,
    pub backoff: BackoffPolicy,
    /// Completed jobs kept by the store (oldest pruned first)
    pub keep_completed: u64,
    /// Failed jobs kept by the store (oldest pruned first)
    pub keep_failed: u64,
}

/// Default policy: 3 attempts, exponential backoff from 5s, keep the last
/// 1000 completed and 5000 failed jobs.
pub const DEFAULT_JOB_POLICY: JobPolicy = JobPolicy {
    attempts: 3,
    backoff: BackoffPolicy::Exponential { delay_ms: 5000 },
    keep_completed: 1000,
    keep_failed: 5000,
};

impl Default for JobPolicy {
    fn default() -> Self {
        DEFAULT_JOB_POLICY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = JobPolicy::default();
        assert_eq!(policy.attempts, 3);
        assert_eq!(policy.backoff, BackoffPolicy::Exponential { delay_ms: 5000 });
        assert_eq!(policy.keep_completed, 1000);
        assert_eq!(policy.keep_failed, 5000);
    }

    #[test]
    fn test_exponential_backoff() {
        let backoff = DEFAULT_JOB_POLICY.backoff;
        assert_eq!(backoff.delay_for_attempt(1), Duration::from_secs(5));
        assert_eq!(backoff.delay_for_attempt(2), Duration::from_secs(10));
        assert_eq!(backoff.delay_for_attempt(3), Duration::from_secs(20));
    }

    #[test]
    fn test_state_classification() {
        assert!(JobState::Waiting.is_pending());
        assert!(JobState::Delayed.is_pending());
        assert!(!JobState::Active.is_pending());
        assert!(JobState::Failed.is_terminal());
        assert!(!JobState::CANCELLABLE.contains(&JobState::Completed));
        assert_eq!("wait".parse::<JobState>().unwrap(), JobState::Waiting);
    }

    #[test]
    fn test_publication_job_id() {
        let id = JobId::for_publication(&PublicationId::from("abc"));
        assert_eq!(id.as_str(), "pub-abc");
    }
}
