//! Queue store configuration.

use std::time::Duration;

/// Queue store configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Redis URL
    pub redis_url: String,
    /// Key prefix; queue `stt` lives under `{<prefix>:stt}`
    pub prefix: String,
    /// Upper bound for every store round trip
    pub store_timeout: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            prefix: "clip".to_string(),
            store_timeout: Duration::from_millis(2000),
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            redis_url: std::env::var("REDIS_URL").unwrap_or(defaults.redis_url),
            prefix: std::env::var("QUEUE_PREFIX")
                .ok()
                .filter(|p| !p.is_empty())
                .unwrap_or(defaults.prefix),
            store_timeout: std::env::var("STORE_TIMEOUT_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.store_timeout),
        }
    }
}
