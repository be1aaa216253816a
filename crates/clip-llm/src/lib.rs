//! Language-model provider selection.
//!
//! This crate provides:
//! - The static provider policy table per strategy and tier
//! - Resolution of (strategy, task, tier, BYOK keys) to a model endpoint
//! - The tier-selection heuristic, fallback tier and cost accounting

pub mod error;
pub mod policy;
pub mod provider;
pub mod resolver;
pub mod routing;

pub use error::{LlmError, LlmResult};
pub use policy::{ModelConfig, ProviderPolicy, StrategyPolicy, SttConfig, PROVIDER_POLICY};
pub use provider::{ByokKeys, ByokProvider, Provider};
pub use resolver::{resolve, Credential, ResolvedModel, Resolver};
pub use routing::{cost_kopecks, fallback_tier, select_tier, RoutingContext, LONG_CONTEXT_TOKENS};
