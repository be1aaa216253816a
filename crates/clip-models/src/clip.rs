//! Clip identifiers and render parameters.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Unique identifier for a clip cut from a video.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct ClipId(pub String);

impl ClipId {
    /// Generate a new random clip ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ClipId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ClipId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Output frame format of a rendered clip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
pub enum ClipFormat {
    /// Vertical 9:16 (shorts, reels, stories)
    #[default]
    #[serde(rename = "9:16", alias = "portrait")]
    Portrait,
    /// Square 1:1
    #[serde(rename = "1:1", alias = "square")]
    Square,
    /// Horizontal 16:9
    #[serde(rename = "16:9", alias = "landscape")]
    Landscape,
}

impl ClipFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClipFormat::Portrait => "9:16",
            ClipFormat::Square => "1:1",
            ClipFormat::Landscape => "16:9",
        }
    }

    /// Output frame dimensions (width, height).
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            ClipFormat::Portrait => (1080, 1920),
            ClipFormat::Square => (1080, 1080),
            ClipFormat::Landscape => (1920, 1080),
        }
    }
}

impl fmt::Display for ClipFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ClipFormat {
    type Err = ClipFormatParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "9:16" | "portrait" => Ok(ClipFormat::Portrait),
            "1:1" | "square" => Ok(ClipFormat::Square),
            "16:9" | "landscape" => Ok(ClipFormat::Landscape),
            _ => Err(ClipFormatParseError(s.to_string())),
        }
    }
}

#[derive(Debug, Error)]
#[error("Unknown clip format: {0}")]
pub struct ClipFormatParseError(String);

/// A timed subtitle line, relative to the clip start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SubtitleSegment {
    /// Start offset in seconds
    pub start: f64,
    /// End offset in seconds
    pub end: f64,
    /// Subtitle text
    pub text: String,
}

impl SubtitleSegment {
    pub fn new(start: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            text: text.into(),
        }
    }
}

/// Where the call-to-action is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum CtaPosition {
    /// Appended as an end card
    #[default]
    End,
    /// Overlaid on top of the clip
    Overlay,
}

/// Call-to-action overlay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Cta {
    pub text: String,
    #[serde(default)]
    pub position: CtaPosition,
    /// Display duration in seconds
    pub duration: f64,
}
