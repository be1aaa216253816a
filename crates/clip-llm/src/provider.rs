//! External model providers and user-supplied (BYOK) keys.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::error::LlmError;

/// Provider hosting a model endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Cloud.ru foundation models (RU residency only)
    #[serde(rename = "cloudru")]
    CloudRu,
    Google,
    Anthropic,
    #[serde(rename = "openai")]
    OpenAi,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::CloudRu => "cloudru",
            Provider::Google => "google",
            Provider::Anthropic => "anthropic",
            Provider::OpenAi => "openai",
        }
    }

    /// OpenAI-compatible base URL of the provider.
    pub fn base_url(&self) -> &'static str {
        match self {
            Provider::CloudRu => "https://foundation-models.api.cloud.ru/v1",
            Provider::Google => "https://generativelanguage.googleapis.com/v1beta/openai/",
            Provider::Anthropic => "https://api.anthropic.com/v1/",
            Provider::OpenAi => "https://api.openai.com/v1",
        }
    }

    /// Whether the provider only serves the domestic strategy.
    pub fn is_ru_only(&self) -> bool {
        matches!(self, Provider::CloudRu)
    }

    /// BYOK slot that can pay for this provider, if any.
    pub fn byok_provider(&self) -> Option<ByokProvider> {
        match self {
            Provider::Google => Some(ByokProvider::Gemini),
            Provider::OpenAi => Some(ByokProvider::OpenAi),
            Provider::Anthropic => Some(ByokProvider::Anthropic),
            Provider::CloudRu => None,
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Provider {
    type Err = LlmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cloudru" => Ok(Provider::CloudRu),
            "google" => Ok(Provider::Google),
            "anthropic" => Ok(Provider::Anthropic),
            "openai" => Ok(Provider::OpenAi),
            _ => Err(LlmError::UnknownProvider(s.to_string())),
        }
    }
}

/// Provider slot a user can bring their own key for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ByokProvider {
    Gemini,
    #[serde(rename = "openai")]
    OpenAi,
    Anthropic,
}

impl ByokProvider {
    pub const ALL: &'static [ByokProvider] =
        &[ByokProvider::Gemini, ByokProvider::OpenAi, ByokProvider::Anthropic];

    pub fn as_str(&self) -> &'static str {
        match self {
            ByokProvider::Gemini => "gemini",
            ByokProvider::OpenAi => "openai",
            ByokProvider::Anthropic => "anthropic",
        }
    }
}

impl fmt::Display for ByokProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ByokProvider {
    type Err = LlmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gemini" => Ok(ByokProvider::Gemini),
            "openai" => Ok(ByokProvider::OpenAi),
            "anthropic" => Ok(ByokProvider::Anthropic),
            _ => Err(LlmError::UnknownProvider(s.to_string())),
        }
    }
}

/// Plaintext BYOK keys of one user, keyed by provider slot.
///
/// `Debug` never prints the keys.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ByokKeys(HashMap<ByokProvider, String>);

impl ByokKeys {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a key, ignoring empty strings.
    pub fn with_key(mut self, provider: ByokProvider, key: impl Into<String>) -> Self {
        self.insert(provider, key);
        self
    }

    pub fn insert(&mut self, provider: ByokProvider, key: impl Into<String>) {
        let key = key.into();
        if !key.is_empty() {
            self.0.insert(provider, key);
        }
    }

    pub fn get(&self, provider: ByokProvider) -> Option<&str> {
        self.0.get(&provider).map(String::as_str)
    }

    pub fn providers(&self) -> Vec<ByokProvider> {
        let mut providers: Vec<_> = self.0.keys().copied().collect();
        providers.sort();
        providers
    }

    pub fn iter(&self) -> impl Iterator<Item = (ByokProvider, &str)> {
        self.0.iter().map(|(p, k)| (*p, k.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for ByokKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByokKeys")
            .field("providers", &self.providers())
            .finish()
    }
}
