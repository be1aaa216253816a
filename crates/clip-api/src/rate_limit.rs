//! Fixed-window rate limiting against the shared counter store.
//!
//! A check either allows, denies with a retry-after, or reports the store as
//! unavailable. [`RateLimiter::enforce`] is the request-path policy: denial
//! becomes `ApiError::RateLimited`, an unavailable store lets the call
//! through.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::counter_store::CounterStore;
use crate::error::{ApiError, ApiResult};
use crate::metrics;

/// Limit applied to one scope, counted per caller key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitRule {
    pub scope: &'static str,
    pub limit: u64,
    pub window_secs: u64,
}

impl RateLimitRule {
    pub const fn new(scope: &'static str, limit: u64, window_secs: u64) -> Self {
        Self {
            scope,
            limit,
            window_secs,
        }
    }

    pub const AUTH_LOGIN: Self = Self::new("auth:login", 5, 60);
    pub const AUTH_RESET: Self = Self::new("auth:reset", 3, 3600);
    pub const VIDEO_PROCESS: Self = Self::new("video:process", 10, 60);
    pub const VIDEO_CANCEL: Self = Self::new("video:cancel", 20, 60);
    pub const CLIP_PUBLISH: Self = Self::new("clip:publish", 20, 60);
    pub const PLATFORM_CONNECT: Self = Self::new("platform:connect", 5, 3600);

    /// Rules upstream callers may check by scope name.
    pub const ALL: &'static [RateLimitRule] = &[
        Self::AUTH_LOGIN,
        Self::AUTH_RESET,
        Self::VIDEO_PROCESS,
        Self::VIDEO_CANCEL,
        Self::CLIP_PUBLISH,
        Self::PLATFORM_CONNECT,
    ];

    pub fn by_scope(scope: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|rule| rule.scope == scope)
    }
}

/// Outcome of one rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    /// Within the limit; `count` is this call's position in the window
    Allowed { count: u64 },
    /// Over the limit until the bucket expires
    Denied { retry_after_secs: u64 },
    /// Counter store unreachable or timed out
    Unavailable,
}

/// Counter key of a `(scope, key)` bucket.
pub fn bucket_key(scope: &str, key: &str) -> String {
    format!("rate_limit:{scope}:{key}")
}

/// Rate limiter over a shared counter store.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn CounterStore>) -> Self {
        Self { store }
    }

    /// Count one call against `(scope, key)`.
    ///
    /// Increment and expiry happen in a single atomic store call, so
    /// concurrent callers each see their own post-increment count.
    pub async fn check(&self, scope: &str, key: &str, limit: u64, window_secs: u64) -> RateLimitDecision {
        let bucket = bucket_key(scope, key);
        let (count, ttl) = match self.store.increment(&bucket, window_secs).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(scope, error = %e, "Rate limit store unavailable");
                return RateLimitDecision::Unavailable;
            }
        };

        if count > limit {
            let retry_after_secs = match u64::try_from(ttl) {
                Ok(secs) if secs > 0 => secs,
                _ => window_secs,
            };
            debug!(scope, count, limit, retry_after_secs, "Rate limit exceeded");
            return RateLimitDecision::Denied { retry_after_secs };
        }

        RateLimitDecision::Allowed { count }
    }

    pub async fn check_rule(&self, rule: RateLimitRule, key: &str) -> RateLimitDecision {
        self.check(rule.scope, key, rule.limit, rule.window_secs).await
    }

    /// Apply `rule` to `key` on the request path.
    ///
    /// Fails open: when the store cannot be reached the call is allowed and
    /// the returned decision is `Unavailable`. A denial is an error.
    pub async fn enforce(&self, rule: RateLimitRule, key: &str) -> ApiResult<RateLimitDecision> {
        let decision = self.check_rule(rule, key).await;
        match decision {
            RateLimitDecision::Allowed { .. } => {}
            RateLimitDecision::Denied { retry_after_secs } => {
                metrics::record_rate_limit_denied(rule.scope);
                return Err(ApiError::RateLimited { retry_after_secs });
            }
            RateLimitDecision::Unavailable => metrics::record_rate_limit_fail_open(rule.scope),
        }
        Ok(decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counter_store::{InMemoryCounterStore, MockCounterStore};
    use crate::error::CounterStoreError;
    use std::time::Duration;

    fn limiter() -> (Arc<InMemoryCounterStore>, RateLimiter) {
        let store = Arc::new(InMemoryCounterStore::new());
        (store.clone(), RateLimiter::new(store))
    }

    #[tokio::test(start_paused = true)]
    async fn test_sixth_call_denied_within_window() {
        let (_, limiter) = limiter();

        for expected in 1..=5 {
            assert_eq!(
                limiter.check("auth:login", "1.2.3.4", 5, 60).await,
                RateLimitDecision::Allowed { count: expected }
            );
        }

        match limiter.check("auth:login", "1.2.3.4", 5, 60).await {
            RateLimitDecision::Denied { retry_after_secs } => {
                assert!(retry_after_secs > 0 && retry_after_secs <= 60);
            }
            other => panic!("expected denial, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_expiry_resets_count() {
        let (_, limiter) = limiter();
        for _ in 0..6 {
            limiter.check("auth:login", "k", 5, 60).await;
        }

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(
            limiter.check("auth:login", "k", 5, 60).await,
            RateLimitDecision::Allowed { count: 1 }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_tracks_remaining_ttl() {
        let (_, limiter) = limiter();
        limiter.check("s", "k", 1, 60).await;
        tokio::time::advance(Duration::from_secs(45)).await;
        assert_eq!(
            limiter.check("s", "k", 1, 60).await,
            RateLimitDecision::Denied { retry_after_secs: 15 }
        );
    }

    #[tokio::test]
    async fn test_keys_and_scopes_are_independent() {
        let (_, limiter) = limiter();
        assert!(matches!(
            limiter.check("s", "a", 1, 60).await,
            RateLimitDecision::Allowed { .. }
        ));
        assert!(matches!(
            limiter.check("s", "b", 1, 60).await,
            RateLimitDecision::Allowed { .. }
        ));
        assert!(matches!(
            limiter.check("other", "a", 1, 60).await,
            RateLimitDecision::Allowed { .. }
        ));
        assert!(matches!(
            limiter.check("s", "a", 1, 60).await,
            RateLimitDecision::Denied { .. }
        ));
    }

    #[tokio::test]
    async fn test_unreachable_store_always_allows() {
        let (store, limiter) = limiter();
        store.set_unreachable(true);

        for _ in 0..100 {
            assert_eq!(
                limiter.check("auth:login", "k", 5, 60).await,
                RateLimitDecision::Unavailable
            );
            assert_eq!(
                limiter.enforce(RateLimitRule::AUTH_LOGIN, "k").await.unwrap(),
                RateLimitDecision::Unavailable
            );
        }
    }

    #[tokio::test]
    async fn test_missing_ttl_falls_back_to_window() {
        let mut store = MockCounterStore::new();
        store
            .expect_increment()
            .withf(|key, window| key.to_string() == "rate_limit:s:k" && *window == 30)
            .returning(|_, _| Ok((2, -2)));

        let limiter = RateLimiter::new(Arc::new(store));
        assert_eq!(
            limiter.check("s", "k", 1, 30).await,
            RateLimitDecision::Denied { retry_after_secs: 30 }
        );
    }

    #[tokio::test]
    async fn test_store_timeout_fails_open() {
        let mut store = MockCounterStore::new();
        store.expect_increment().returning(|_, _| {
            Err(CounterStoreError::Timeout {
                operation: "increment",
                elapsed: Duration::from_secs(2),
            })
        });

        let limiter = RateLimiter::new(Arc::new(store));
        assert!(limiter.enforce(RateLimitRule::VIDEO_PROCESS, "u1").await.is_ok());
    }

    #[tokio::test]
    async fn test_enforce_denial_is_rate_limited_error() {
        let (_, limiter) = limiter();
        let rule = RateLimitRule::new("test:enforce", 1, 60);
        limiter.enforce(rule, "u1").await.unwrap();

        let err = limiter.enforce(rule, "u1").await.unwrap_err();
        assert!(matches!(err, ApiError::RateLimited { retry_after_secs } if retry_after_secs <= 60));
    }

    #[test]
    fn test_rule_lookup() {
        assert_eq!(RateLimitRule::by_scope("video:cancel"), Some(RateLimitRule::VIDEO_CANCEL));
        assert_eq!(RateLimitRule::by_scope("nope"), None);
        assert_eq!(bucket_key("auth:login", "1.2.3.4"), "rate_limit:auth:login:1.2.3.4");
    }
}
