//! Resolution of a routing request to a concrete model endpoint.

use clip_models::{LlmTask, LlmTier, Strategy};
use serde::{Serialize, Serializer};
use std::fmt;
use tracing::debug;

use crate::error::LlmResult;
use crate::policy::{ProviderPolicy, PROVIDER_POLICY};
use crate::provider::{ByokKeys, ByokProvider, Provider};

/// Who pays for a call.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    /// The platform's own provider key
    Platform,
    /// The user's key for the given slot
    Byok(ByokProvider, String),
}

impl Credential {
    pub fn is_byok(&self) -> bool {
        matches!(self, Credential::Byok(..))
    }

    /// User key to send instead of the platform key.
    pub fn byok_key(&self) -> Option<&str> {
        match self {
            Credential::Byok(_, key) => Some(key),
            Credential::Platform => None,
        }
    }
}

// Serialized as the payer only, never the key.
impl Serialize for Credential {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Credential::Platform => serializer.serialize_str("platform"),
            Credential::Byok(provider, _) => {
                serializer.serialize_str(&format!("byok:{}", provider))
            }
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::Platform => write!(f, "Platform"),
            Credential::Byok(provider, _) => write!(f, "Byok({})", provider),
        }
    }
}

/// A model endpoint chosen for one call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedModel {
    pub provider: Provider,
    pub model: &'static str,
    /// Per-unit input cost (per 1M tokens, or per audio second for speech)
    pub cost_input: f64,
    /// Per-unit output cost; zero for speech
    pub cost_output: f64,
    pub base_url: &'static str,
    /// Tier used, `None` for transcription
    pub tier: Option<LlmTier>,
    pub credential: Credential,
}

/// Resolver over a policy table.
#[derive(Debug, Clone, Copy)]
pub struct Resolver {
    policy: &'static ProviderPolicy,
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new(&PROVIDER_POLICY)
    }
}

impl Resolver {
    pub fn new(policy: &'static ProviderPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &'static ProviderPolicy {
        self.policy
    }

    /// Pick the model for `(strategy, task, tier)`.
    ///
    /// The tier is validated for every task; transcription then ignores it and
    /// uses the strategy's speech model. A BYOK key replaces the platform key
    /// only when the chosen provider has a BYOK slot; it never changes which
    /// model is chosen.
    pub fn resolve(
        &self,
        strategy: Strategy,
        task: LlmTask,
        tier: u8,
        byok: Option<&ByokKeys>,
    ) -> LlmResult<ResolvedModel> {
        let tier = LlmTier::new(tier)?;
        let policy = self.policy.for_strategy(strategy);

        let mut resolved = if task.is_tier_routed() {
            let config = policy.tier(tier);
            ResolvedModel {
                provider: config.provider,
                model: config.model,
                cost_input: config.cost_input,
                cost_output: config.cost_output,
                base_url: config.provider.base_url(),
                tier: Some(tier),
                credential: Credential::Platform,
            }
        } else {
            let stt = &policy.stt;
            ResolvedModel {
                provider: stt.provider,
                model: stt.model,
                cost_input: stt.cost_per_unit,
                cost_output: 0.0,
                base_url: stt.provider.base_url(),
                tier: None,
                credential: Credential::Platform,
            }
        };

        if let Some(slot) = resolved.provider.byok_provider() {
            if let Some(key) = byok.and_then(|keys| keys.get(slot)) {
                resolved.credential = Credential::Byok(slot, key.to_string());
            }
        }

        debug!(
            strategy = %strategy,
            task = %task,
            provider = %resolved.provider,
            model = resolved.model,
            byok = resolved.credential.is_byok(),
            "Resolved model"
        );

        Ok(resolved)
    }

    /// Same as [`Resolver::resolve`] with wire-format strategy and task names.
    pub fn resolve_named(
        &self,
        strategy: &str,
        task: &str,
        tier: u8,
        byok: Option<&ByokKeys>,
    ) -> LlmResult<ResolvedModel> {
        let strategy: Strategy = strategy.parse()?;
        let task: LlmTask = task.parse()?;
        self.resolve(strategy, task, tier, byok)
    }
}

/// Resolve against the process-wide policy.
pub fn resolve(
    strategy: Strategy,
    task: LlmTask,
    tier: u8,
    byok: Option<&ByokKeys>,
) -> LlmResult<ResolvedModel> {
    Resolver::default().resolve(strategy, task, tier, byok)
}
