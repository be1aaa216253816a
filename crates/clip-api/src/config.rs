//! API configuration.

use std::collections::HashMap;
use std::time::Duration;

use clip_llm::{Credential, Provider, ResolvedModel};

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// CORS origins
    pub cors_origins: Vec<String>,
    /// Max request body size
    pub max_body_size: usize,
    /// Environment (development/production)
    pub environment: String,
    /// Bearer token expected from upstream callers; `None` disables the check
    pub internal_api_token: Option<String>,
    /// Counter store (rate limits, BYOK cache) settings
    pub counter_store: CounterStoreConfig,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_origins: vec!["*".to_string()],
            max_body_size: 1024 * 1024, // 1MB
            environment: "development".to_string(),
            internal_api_token: None,
            counter_store: CounterStoreConfig::default(),
        }
    }
}

impl ApiConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("API_HOST").unwrap_or(defaults.host),
            port: std::env::var("API_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.port),
            cors_origins: std::env::var("CORS_ORIGINS")
                .map(|s| s.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or(defaults.cors_origins),
            max_body_size: std::env::var("MAX_BODY_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_body_size),
            environment: std::env::var("ENVIRONMENT").unwrap_or(defaults.environment),
            internal_api_token: non_empty_var("INTERNAL_API_TOKEN"),
            counter_store: CounterStoreConfig::from_env(),
        }
    }

    /// Check if running in production mode.
    pub fn is_production(&self) -> bool {
        self.environment.to_lowercase() == "production"
    }
}

/// Counter store connection settings.
#[derive(Debug, Clone)]
pub struct CounterStoreConfig {
    /// Redis URL
    pub redis_url: String,
    /// Upper bound for every counter store round trip
    pub timeout: Duration,
}

impl Default for CounterStoreConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            timeout: Duration::from_millis(2000),
        }
    }
}

impl CounterStoreConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            redis_url: std::env::var("REDIS_URL").unwrap_or(defaults.redis_url),
            timeout: std::env::var("STORE_TIMEOUT_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.timeout),
        }
    }
}

/// Platform-owned provider API keys.
///
/// Used whenever a resolved model carries the platform credential rather
/// than a user's BYOK key.
#[derive(Clone, Default)]
pub struct ProviderKeys(HashMap<Provider, String>);

impl ProviderKeys {
    /// Read `CLOUDRU_API_KEY`, `GEMINI_API_KEY`, `ANTHROPIC_API_KEY`, `OPENAI_API_KEY`.
    pub fn from_env() -> Self {
        let mut keys = HashMap::new();
        for (provider, var) in [
            (Provider::CloudRu, "CLOUDRU_API_KEY"),
            (Provider::Google, "GEMINI_API_KEY"),
            (Provider::Anthropic, "ANTHROPIC_API_KEY"),
            (Provider::OpenAi, "OPENAI_API_KEY"),
        ] {
            if let Some(key) = non_empty_var(var) {
                keys.insert(provider, key);
            }
        }
        Self(keys)
    }

    pub fn with_key(mut self, provider: Provider, key: impl Into<String>) -> Self {
        self.0.insert(provider, key.into());
        self
    }

    pub fn get(&self, provider: Provider) -> Option<&str> {
        self.0.get(&provider).map(String::as_str)
    }

    /// Providers without a platform key, in a stable order.
    pub fn missing(&self) -> Vec<Provider> {
        let mut missing: Vec<_> = [
            Provider::CloudRu,
            Provider::Google,
            Provider::Anthropic,
            Provider::OpenAi,
        ]
        .into_iter()
        .filter(|p| !self.0.contains_key(p))
        .collect();
        missing.sort_by_key(|p| p.as_str());
        missing
    }

    /// The key a call to `model` should authenticate with.
    pub fn api_key_for<'a>(&'a self, model: &'a ResolvedModel) -> Option<&'a str> {
        match &model.credential {
            Credential::Byok(_, key) => Some(key.as_str()),
            Credential::Platform => self.get(model.provider),
        }
    }
}

impl std::fmt::Debug for ProviderKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut configured: Vec<_> = self.0.keys().map(|p| p.as_str()).collect();
        configured.sort_unstable();
        f.debug_struct("ProviderKeys")
            .field("configured", &configured)
            .finish()
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
