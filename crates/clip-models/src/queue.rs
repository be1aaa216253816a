//! Pipeline queue names.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// One durable queue per pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
pub enum QueueName {
    #[serde(rename = "stt")]
    Stt,
    #[serde(rename = "llm")]
    Llm,
    #[serde(rename = "video-render")]
    VideoRender,
    #[serde(rename = "publish")]
    Publish,
    #[serde(rename = "stats-collect")]
    StatsCollect,
}

impl QueueName {
    pub const ALL: &'static [QueueName] = &[
        QueueName::Stt,
        QueueName::Llm,
        QueueName::VideoRender,
        QueueName::Publish,
        QueueName::StatsCollect,
    ];

    /// Queues whose payloads carry a `videoId` and are scanned when a video
    /// is cancelled.
    pub const VIDEO_SCOPED: &'static [QueueName] =
        &[QueueName::Stt, QueueName::Llm, QueueName::VideoRender];

    pub fn as_str(&self) -> &'static str {
        match self {
            QueueName::Stt => "stt",
            QueueName::Llm => "llm",
            QueueName::VideoRender => "video-render",
            QueueName::Publish => "publish",
            QueueName::StatsCollect => "stats-collect",
        }
    }
}

impl fmt::Display for QueueName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for QueueName {
    type Err = QueueNameParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stt" => Ok(QueueName::Stt),
            "llm" => Ok(QueueName::Llm),
            "video-render" => Ok(QueueName::VideoRender),
            "publish" => Ok(QueueName::Publish),
            "stats-collect" => Ok(QueueName::StatsCollect),
            _ => Err(QueueNameParseError(s.to_string())),
        }
    }
}

#[derive(Debug, Error)]
#[error("Unknown queue: {0}")]
pub struct QueueNameParseError(String);
