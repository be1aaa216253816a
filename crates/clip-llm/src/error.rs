//! Resolver error types.

use clip_models::LlmParseError;
use thiserror::Error;

pub type LlmResult<T> = Result<T, LlmError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LlmError {
    #[error("Unknown tier: {0} (expected 0-3)")]
    UnknownTier(u8),

    #[error("Unknown task: {0}")]
    UnknownTask(String),

    #[error("Unknown strategy: {0}")]
    UnknownStrategy(String),

    #[error("Unknown provider: {0}")]
    UnknownProvider(String),
}

impl From<LlmParseError> for LlmError {
    fn from(err: LlmParseError) -> Self {
        match err {
            LlmParseError::UnknownTier(tier) => Self::UnknownTier(tier),
            LlmParseError::UnknownTask(task) => Self::UnknownTask(task),
            LlmParseError::UnknownStrategy(strategy) => Self::UnknownStrategy(strategy),
        }
    }
}
