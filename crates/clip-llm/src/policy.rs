//! Static provider policy: which model serves each strategy and tier.
//!
//! Costs are per one million tokens in kopecks for tiered models and per
//! audio second for speech models.

use clip_models::{LlmTier, Strategy};
use serde::Serialize;

use crate::provider::Provider;

/// A tiered chat model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ModelConfig {
    pub provider: Provider,
    pub model: &'static str,
    pub cost_input: f64,
    pub cost_output: f64,
}

/// The speech-to-text model of a strategy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SttConfig {
    pub provider: Provider,
    pub model: &'static str,
    pub cost_per_unit: f64,
}

/// Models available under one strategy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StrategyPolicy {
    pub stt: SttConfig,
    /// Indexed by tier value
    pub tiers: [ModelConfig; 4],
    pub data_residency: &'static str,
}

impl StrategyPolicy {
    pub fn tier(&self, tier: LlmTier) -> &ModelConfig {
        &self.tiers[tier.index()]
    }
}

/// Full policy table, one entry per strategy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProviderPolicy {
    pub ru: StrategyPolicy,
    pub global: StrategyPolicy,
}

impl ProviderPolicy {
    pub fn for_strategy(&self, strategy: Strategy) -> &StrategyPolicy {
        match strategy {
            Strategy::Ru => &self.ru,
            Strategy::Global => &self.global,
        }
    }
}

const fn model(provider: Provider, model: &'static str, cost_input: f64, cost_output: f64) -> ModelConfig {
    ModelConfig {
        provider,
        model,
        cost_input,
        cost_output,
    }
}

/// Process-wide policy, never mutated at runtime.
pub static PROVIDER_POLICY: ProviderPolicy = ProviderPolicy {
    ru: StrategyPolicy {
        stt: SttConfig {
            provider: Provider::CloudRu,
            model: "openai/whisper-large-v3",
            cost_per_unit: 0.005,
        },
        tiers: [
            model(Provider::CloudRu, "GigaChat3-10B-A1.8B", 10.0, 10.0),
            model(Provider::CloudRu, "t-tech/T-pro-it-2.1", 35.0, 70.0),
            model(Provider::CloudRu, "Qwen3-235B-A22B-Instruct-2507", 17.0, 70.0),
            model(Provider::CloudRu, "zai-org/GLM-4.6", 55.0, 220.0),
        ],
        data_residency: "RU",
    },
    global: StrategyPolicy {
        stt: SttConfig {
            provider: Provider::OpenAi,
            model: "whisper-1",
            cost_per_unit: 0.006,
        },
        tiers: [
            model(Provider::Google, "gemini-2.0-flash-lite", 0.075, 0.30),
            model(Provider::Google, "gemini-2.0-flash", 0.10, 0.40),
            model(Provider::Anthropic, "claude-haiku-4.5", 0.80, 4.00),
            model(Provider::Google, "gemini-2.5-pro", 1.25, 10.00),
        ],
        data_residency: "US/EU",
    },
};
