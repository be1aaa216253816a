//! Application state and composition root.

use std::sync::Arc;

use anyhow::Context;
use clip_crypto::SecretCodec;
use clip_queue::{
    CancellationCoordinator, JobDispatcher, QueueRegistry, RedisConnector, StoreConnector,
};
use tracing::{info, warn};

use crate::config::{ApiConfig, ProviderKeys};
use crate::counter_store::{CounterStore, RedisCounterStore};
use crate::rate_limit::RateLimiter;
use crate::services::{ByokCache, PipelineService};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub registry: Arc<QueueRegistry>,
    pub counter_store: Arc<dyn CounterStore>,
    pub rate_limiter: RateLimiter,
    pub pipeline: PipelineService,
    pub provider_keys: ProviderKeys,
}

impl AppState {
    /// Wire the production stores from the environment.
    ///
    /// Neither Redis connection is opened here: queues open on first use and
    /// the counter store on its first call.
    pub fn new(config: ApiConfig) -> anyhow::Result<Self> {
        let secret = std::env::var("PLATFORM_TOKEN_SECRET")
            .context("PLATFORM_TOKEN_SECRET must be set")?;
        let codec = SecretCodec::from_hex_key(secret.trim())
            .context("PLATFORM_TOKEN_SECRET must be 64 hex chars (32 bytes)")?;

        let connector = RedisConnector::from_env().context("invalid queue store URL")?;
        let counter_store = RedisCounterStore::new(&config.counter_store)
            .context("invalid counter store URL")?;

        let provider_keys = ProviderKeys::from_env();
        let missing = provider_keys.missing();
        if !missing.is_empty() {
            warn!(
                providers = ?missing.iter().map(|p| p.as_str()).collect::<Vec<_>>(),
                "No platform API key for some providers"
            );
        }
        if config.internal_api_token.is_none() {
            warn!("INTERNAL_API_TOKEN not set; bearer check disabled");
        }

        info!(environment = %config.environment, "Application state ready");

        Ok(Self::from_parts(
            config,
            Arc::new(connector),
            Arc::new(counter_store),
            codec,
            provider_keys,
        ))
    }

    /// Wire state from explicit stores.
    pub fn from_parts(
        config: ApiConfig,
        connector: Arc<dyn StoreConnector>,
        counter_store: Arc<dyn CounterStore>,
        codec: SecretCodec,
        provider_keys: ProviderKeys,
    ) -> Self {
        let registry = Arc::new(QueueRegistry::new(connector));
        let codec = Arc::new(codec);
        let byok = ByokCache::new(Arc::clone(&counter_store), Arc::clone(&codec));
        let pipeline = PipelineService::new(
            JobDispatcher::new(Arc::clone(&registry)),
            CancellationCoordinator::new(Arc::clone(&registry)),
            byok,
            codec,
        );

        Self {
            config,
            registry,
            rate_limiter: RateLimiter::new(Arc::clone(&counter_store)),
            counter_store,
            pipeline,
            provider_keys,
        }
    }
}
