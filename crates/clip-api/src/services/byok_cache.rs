//! Short-lived server-side cache of users' BYOK keys.
//!
//! Keys live under `byok:<userId>:<provider>` in the counter store, encrypted
//! with the platform secret and expiring after five minutes, so a crashed
//! pipeline never leaves plaintext or long-lived copies behind. Key material
//! is never logged.

use std::sync::Arc;
use std::time::Duration;

use clip_crypto::SecretCodec;
use clip_llm::{ByokKeys, ByokProvider};
use tracing::{info, warn};

use crate::counter_store::CounterStore;
use crate::error::{ApiError, ApiResult};
use crate::metrics;

pub const BYOK_KEY_PREFIX: &str = "byok:";
pub const BYOK_TTL: Duration = Duration::from_secs(300);

#[derive(Clone)]
pub struct ByokCache {
    store: Arc<dyn CounterStore>,
    codec: Arc<SecretCodec>,
}

impl ByokCache {
    pub fn new(store: Arc<dyn CounterStore>, codec: Arc<SecretCodec>) -> Self {
        Self { store, codec }
    }

    fn key(user_id: &str, provider: ByokProvider) -> String {
        format!("{BYOK_KEY_PREFIX}{user_id}:{provider}")
    }

    fn all_keys(user_id: &str) -> Vec<String> {
        ByokProvider::ALL
            .iter()
            .map(|provider| Self::key(user_id, *provider))
            .collect()
    }

    /// Cache one key.
    pub async fn cache_key(&self, user_id: &str, provider: ByokProvider, plaintext: &str) -> ApiResult<()> {
        self.cache_keys(user_id, &ByokKeys::new().with_key(provider, plaintext))
            .await
            .map(|_| ())
    }

    /// Cache every key in one round trip; returns the cached providers.
    pub async fn cache_keys(&self, user_id: &str, keys: &ByokKeys) -> ApiResult<Vec<ByokProvider>> {
        let mut entries = Vec::new();
        let mut cached = Vec::new();
        for (provider, plaintext) in keys.iter() {
            entries.push((Self::key(user_id, provider), self.codec.encrypt(plaintext)?));
            cached.push(provider);
        }
        cached.sort_by_key(|p| p.as_str());

        self.store
            .set_many(&entries, BYOK_TTL.as_secs())
            .await
            .map_err(|e| ApiError::unavailable(format!("BYOK cache: {e}")))?;

        info!(
            user_id,
            providers = ?cached.iter().map(|p| p.as_str()).collect::<Vec<_>>(),
            ttl_secs = BYOK_TTL.as_secs(),
            "Cached BYOK keys"
        );
        Ok(cached)
    }

    /// Read a cached key without removing it.
    ///
    /// Any failure (store down, expired, undecryptable) reads as "no key".
    pub async fn peek(&self, user_id: &str, provider: ByokProvider) -> Option<String> {
        let encrypted = match self.store.get(&Self::key(user_id, provider)).await {
            Ok(Some(value)) => value,
            Ok(None) => return None,
            Err(e) => {
                warn!(user_id, provider = %provider, error = %e, "BYOK key lookup failed");
                metrics::record_byok_cache_miss(provider.as_str());
                return None;
            }
        };

        match self.codec.decrypt(&encrypted) {
            Ok(plaintext) => Some(plaintext),
            Err(e) => {
                warn!(user_id, provider = %provider, error = %e, "BYOK key could not be decrypted");
                metrics::record_byok_cache_miss(provider.as_str());
                None
            }
        }
    }

    /// Every cached key of the user.
    pub async fn peek_all(&self, user_id: &str) -> ByokKeys {
        let mut keys = ByokKeys::new();
        for provider in ByokProvider::ALL {
            if let Some(key) = self.peek(user_id, *provider).await {
                keys.insert(*provider, key);
            }
        }
        keys
    }

    /// Drop every cached key of the user.
    pub async fn clear(&self, user_id: &str) -> ApiResult<()> {
        let removed = self
            .store
            .delete(&Self::all_keys(user_id))
            .await
            .map_err(|e| ApiError::unavailable(format!("BYOK cache: {e}")))?;
        info!(user_id, removed, "Cleared BYOK keys");
        Ok(())
    }

    pub async fn has_any(&self, user_id: &str) -> ApiResult<bool> {
        let present = self
            .store
            .exists(&Self::all_keys(user_id))
            .await
            .map_err(|e| ApiError::unavailable(format!("BYOK cache: {e}")))?;
        Ok(present > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counter_store::InMemoryCounterStore;

    const SECRET: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

    fn cache() -> (Arc<InMemoryCounterStore>, ByokCache) {
        let store = Arc::new(InMemoryCounterStore::new());
        let codec = Arc::new(SecretCodec::from_hex_key(SECRET).unwrap());
        (store.clone(), ByokCache::new(store, codec))
    }

    #[tokio::test]
    async fn test_cached_key_is_encrypted_at_rest() {
        let (store, cache) = cache();
        cache.cache_key("u1", ByokProvider::Gemini, "AIza-secret").await.unwrap();

        let raw = store.get("byok:u1:gemini").await.unwrap().unwrap();
        assert!(!raw.contains("AIza-secret"));
        assert_eq!(raw.split(':').count(), 3);

        assert_eq!(
            cache.peek("u1", ByokProvider::Gemini).await.as_deref(),
            Some("AIza-secret")
        );
        // peek does not consume
        assert!(cache.peek("u1", ByokProvider::Gemini).await.is_some());
    }

    #[tokio::test]
    async fn test_cache_many_and_clear() {
        let (_, cache) = cache();
        let keys = ByokKeys::new()
            .with_key(ByokProvider::OpenAi, "sk-1")
            .with_key(ByokProvider::Anthropic, "sk-ant-1");

        let cached = cache.cache_keys("u1", &keys).await.unwrap();
        assert_eq!(cached, vec![ByokProvider::Anthropic, ByokProvider::OpenAi]);
        assert!(cache.has_any("u1").await.unwrap());
        assert!(!cache.has_any("u2").await.unwrap());

        let all = cache.peek_all("u1").await;
        assert_eq!(all.get(ByokProvider::OpenAi), Some("sk-1"));
        assert_eq!(all.get(ByokProvider::Gemini), None);

        cache.clear("u1").await.unwrap();
        assert!(!cache.has_any("u1").await.unwrap());
        assert!(cache.peek_all("u1").await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_keys_expire_after_ttl() {
        let (_, cache) = cache();
        cache.cache_key("u1", ByokProvider::OpenAi, "sk-1").await.unwrap();

        tokio::time::advance(BYOK_TTL + Duration::from_secs(1)).await;
        assert_eq!(cache.peek("u1", ByokProvider::OpenAi).await, None);
    }

    #[tokio::test]
    async fn test_peek_swallows_failures() {
        let (store, cache) = cache();
        store
            .set_many(&[("byok:u1:openai".into(), "not:a:secret".into())], 60)
            .await
            .unwrap();
        assert_eq!(cache.peek("u1", ByokProvider::OpenAi).await, None);

        store.set_unreachable(true);
        assert_eq!(cache.peek("u1", ByokProvider::OpenAi).await, None);
        assert!(cache.has_any("u1").await.is_err());
    }
}
