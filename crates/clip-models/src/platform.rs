//! Publishing platforms.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// External platform a clip is published to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Vk,
    Rutube,
    Dzen,
    Telegram,
}

impl Platform {
    pub const ALL: &'static [Platform] =
        &[Platform::Vk, Platform::Rutube, Platform::Dzen, Platform::Telegram];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Vk => "vk",
            Platform::Rutube => "rutube",
            Platform::Dzen => "dzen",
            Platform::Telegram => "telegram",
        }
    }

    /// Whether the platform exposes view/like statistics for polling.
    pub fn supports_stats(&self) -> bool {
        !matches!(self, Platform::Telegram)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Platform {
    type Err = PlatformParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "vk" => Ok(Platform::Vk),
            "rutube" => Ok(Platform::Rutube),
            "dzen" => Ok(Platform::Dzen),
            "telegram" => Ok(Platform::Telegram),
            _ => Err(PlatformParseError(s.to_string())),
        }
    }
}

#[derive(Debug, Error)]
#[error("Unknown platform: {0}")]
pub struct PlatformParseError(String);

/// Identifier of one publication of a clip on one platform.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct PublicationId(pub String);

impl PublicationId {
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PublicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PublicationId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}
