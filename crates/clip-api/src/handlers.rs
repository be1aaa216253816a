//! Request handlers.

pub mod byok;
pub mod health;
pub mod publications;
pub mod queues;
pub mod rate_limits;
pub mod videos;

pub use byok::*;
pub use health::*;
pub use publications::*;
pub use queues::*;
pub use rate_limits::*;
pub use videos::*;

use std::collections::HashMap;

use clip_llm::{ByokKeys, ByokProvider};
use serde::Serialize;

use crate::error::{ApiError, ApiResult};

const MAX_ID_LEN: usize = 128;
const MAX_BYOK_KEY_LEN: usize = 512;

/// Check an id taken from the URL path.
pub(crate) fn validate_path_id<'a>(kind: &str, id: &'a str) -> ApiResult<&'a str> {
    let valid = !id.is_empty()
        && id.len() <= MAX_ID_LEN
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'));
    if valid {
        Ok(id)
    } else {
        Err(ApiError::bad_request(format!("Invalid {kind} id")))
    }
}

/// BYOK keys from a request body. Empty values are dropped.
pub(crate) fn byok_keys_from(raw: HashMap<ByokProvider, String>) -> ApiResult<ByokKeys> {
    let mut keys = ByokKeys::new();
    for (provider, key) in raw {
        if key.len() > MAX_BYOK_KEY_LEN {
            return Err(ApiError::validation(format!("{provider} key is too long")));
        }
        keys.insert(provider, key);
    }
    Ok(keys)
}

/// Response for endpoints that queue a single job.
#[derive(Debug, Serialize)]
pub struct EnqueuedResponse {
    pub job_id: String,
    pub queue: clip_models::QueueName,
}
