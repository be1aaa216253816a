//! Language-model routing vocabulary: strategy, task and tier.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LlmParseError {
    #[error("Unknown tier: {0} (expected 0-3)")]
    UnknownTier(u8),

    #[error("Unknown task: {0}")]
    UnknownTask(String),

    #[error("Unknown strategy: {0}")]
    UnknownStrategy(String),
}

/// Data-residency / provider posture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Domestically hosted model bundle (data stays in RU)
    #[default]
    Ru,
    /// International providers (US/EU)
    Global,
}

impl Strategy {
    pub const ALL: &'static [Strategy] = &[Strategy::Ru, Strategy::Global];

    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Ru => "ru",
            Strategy::Global => "global",
        }
    }

    /// Data residency label of the providers this strategy may use.
    pub fn data_residency(&self) -> &'static str {
        match self {
            Strategy::Ru => "RU",
            Strategy::Global => "US/EU",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = LlmParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ru" => Ok(Strategy::Ru),
            "global" => Ok(Strategy::Global),
            _ => Err(LlmParseError::UnknownStrategy(s.to_string())),
        }
    }
}

/// Every task routed to an external model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum LlmTask {
    Transcription,
    MomentSelection,
    ViralityScoring,
    TitleGeneration,
    CtaSuggestion,
}

impl LlmTask {
    pub const ALL: &'static [LlmTask] = &[
        LlmTask::Transcription,
        LlmTask::MomentSelection,
        LlmTask::ViralityScoring,
        LlmTask::TitleGeneration,
        LlmTask::CtaSuggestion,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LlmTask::Transcription => "transcription",
            LlmTask::MomentSelection => "moment_selection",
            LlmTask::ViralityScoring => "virality_scoring",
            LlmTask::TitleGeneration => "title_generation",
            LlmTask::CtaSuggestion => "cta_suggestion",
        }
    }

    /// Transcription runs on the strategy's speech model, never tier-routed.
    pub fn is_tier_routed(&self) -> bool {
        !matches!(self, LlmTask::Transcription)
    }
}

impl fmt::Display for LlmTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for LlmTask {
    type Err = LlmParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "transcription" => Ok(LlmTask::Transcription),
            "moment_selection" => Ok(LlmTask::MomentSelection),
            "virality_scoring" => Ok(LlmTask::ViralityScoring),
            "title_generation" => Ok(LlmTask::TitleGeneration),
            "cta_suggestion" => Ok(LlmTask::CtaSuggestion),
            _ => Err(LlmParseError::UnknownTask(s.to_string())),
        }
    }
}

/// Analysis tasks carried by `llm` queue jobs (transcription has its own queue).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisTask {
    MomentSelection,
    ViralityScoring,
    TitleGeneration,
    CtaSuggestion,
}

impl AnalysisTask {
    pub const ALL: &'static [AnalysisTask] = &[
        AnalysisTask::MomentSelection,
        AnalysisTask::ViralityScoring,
        AnalysisTask::TitleGeneration,
        AnalysisTask::CtaSuggestion,
    ];
}

impl From<AnalysisTask> for LlmTask {
    fn from(task: AnalysisTask) -> Self {
        match task {
            AnalysisTask::MomentSelection => LlmTask::MomentSelection,
            AnalysisTask::ViralityScoring => LlmTask::ViralityScoring,
            AnalysisTask::TitleGeneration => LlmTask::TitleGeneration,
            AnalysisTask::CtaSuggestion => LlmTask::CtaSuggestion,
        }
    }
}

impl TryFrom<LlmTask> for AnalysisTask {
    type Error = LlmParseError;

    fn try_from(task: LlmTask) -> Result<Self, Self::Error> {
        match task {
            LlmTask::MomentSelection => Ok(AnalysisTask::MomentSelection),
            LlmTask::ViralityScoring => Ok(AnalysisTask::ViralityScoring),
            LlmTask::TitleGeneration => Ok(AnalysisTask::TitleGeneration),
            LlmTask::CtaSuggestion => Ok(AnalysisTask::CtaSuggestion),
            LlmTask::Transcription => Err(LlmParseError::UnknownTask(task.to_string())),
        }
    }
}

impl fmt::Display for AnalysisTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", LlmTask::from(*self))
    }
}

/// Quality/cost level for language-model stages, 0 (lightest) to 3 (heaviest).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(try_from = "u8", into = "u8")]
#[schemars(transparent)]
pub struct LlmTier(u8);

impl LlmTier {
    pub const TIER_0: LlmTier = LlmTier(0);
    pub const TIER_1: LlmTier = LlmTier(1);
    pub const TIER_2: LlmTier = LlmTier(2);
    pub const TIER_3: LlmTier = LlmTier(3);

    pub const ALL: &'static [LlmTier] = &[
        LlmTier::TIER_0,
        LlmTier::TIER_1,
        LlmTier::TIER_2,
        LlmTier::TIER_3,
    ];

    pub fn new(tier: u8) -> Result<Self, LlmParseError> {
        Self::try_from(tier)
    }

    pub fn value(&self) -> u8 {
        self.0
    }

    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl Default for LlmTier {
    fn default() -> Self {
        LlmTier::TIER_1
    }
}

impl TryFrom<u8> for LlmTier {
    type Error = LlmParseError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        if value <= 3 {
            Ok(LlmTier(value))
        } else {
            Err(LlmParseError::UnknownTier(value))
        }
    }
}

impl From<LlmTier> for u8 {
    fn from(tier: LlmTier) -> Self {
        tier.0
    }
}

impl fmt::Display for LlmTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tier{}", self.0)
    }
}
