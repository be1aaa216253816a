//! Tier selection heuristic, provider-failure fallback and cost accounting.

use clip_models::{LlmTask, LlmTier, Strategy};

use crate::resolver::ResolvedModel;

/// Prompts above this many tokens go to the long-context tier.
pub const LONG_CONTEXT_TOKENS: u64 = 100_000;

/// Previous virality scores below this retry on a stronger tier.
const QUALITY_RETRY_SCORE: f64 = 50.0;

const PREMIUM_PLAN: &str = "business";

/// Inputs to the tier heuristic.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutingContext {
    pub task: LlmTask,
    pub strategy: Strategy,
    pub token_count: Option<u64>,
    pub plan_id: Option<String>,
    pub previous_score: Option<f64>,
}

impl RoutingContext {
    pub fn new(task: LlmTask, strategy: Strategy) -> Self {
        Self {
            task,
            strategy,
            token_count: None,
            plan_id: None,
            previous_score: None,
        }
    }

    pub fn with_token_count(mut self, tokens: u64) -> Self {
        self.token_count = Some(tokens);
        self
    }

    pub fn with_plan(mut self, plan_id: impl Into<String>) -> Self {
        self.plan_id = Some(plan_id.into());
        self
    }

    pub fn with_previous_score(mut self, score: f64) -> Self {
        self.previous_score = Some(score);
        self
    }
}

/// Choose a tier for a task.
///
/// Titles and CTAs always use tier 0, long prompts tier 3, business plans
/// and quality retries tier 2, everything else tier 1. Transcription is not
/// tier-routed and gets the default.
pub fn select_tier(ctx: &RoutingContext) -> LlmTier {
    match ctx.task {
        LlmTask::Transcription => return LlmTier::default(),
        LlmTask::TitleGeneration | LlmTask::CtaSuggestion => return LlmTier::TIER_0,
        _ => {}
    }

    if ctx.token_count.is_some_and(|tokens| tokens > LONG_CONTEXT_TOKENS) {
        return LlmTier::TIER_3;
    }

    let premium = ctx.plan_id.as_deref() == Some(PREMIUM_PLAN);
    let low_score = ctx
        .previous_score
        .is_some_and(|score| score < QUALITY_RETRY_SCORE);
    if premium || low_score {
        return LlmTier::TIER_2;
    }

    LlmTier::TIER_1
}

/// Tier to retry on after a provider failure, if any.
pub fn fallback_tier(tier: LlmTier) -> Option<LlmTier> {
    (tier < LlmTier::TIER_2).then_some(LlmTier::TIER_2)
}

/// Cost of a completed call in kopecks, rounded up.
pub fn cost_kopecks(model: &ResolvedModel, input_tokens: u64, output_tokens: u64) -> u64 {
    let micro = input_tokens as f64 * model.cost_input + output_tokens as f64 * model.cost_output;
    (micro / 1_000_000.0).ceil() as u64
}
