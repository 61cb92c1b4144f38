//! Capability tags, endpoint operations and model tiers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::LlmError;

/// A named feature a model may or may not support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Chat,
    Tools,
    Vision,
    Json,
    Structured,
    Streaming,
    Reasoning,
    Image,
    /// Audio output (text-to-speech).
    Audio,
    /// Audio input (speech-to-text, audio parts in chat).
    Hearing,
    Embedding,
    /// Zero data retention.
    Zdr,
}

impl Capability {
    pub const ALL: [Capability; 12] = [
        Capability::Chat,
        Capability::Tools,
        Capability::Vision,
        Capability::Json,
        Capability::Structured,
        Capability::Streaming,
        Capability::Reasoning,
        Capability::Image,
        Capability::Audio,
        Capability::Hearing,
        Capability::Embedding,
        Capability::Zdr,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Tools => "tools",
            Self::Vision => "vision",
            Self::Json => "json",
            Self::Structured => "structured",
            Self::Streaming => "streaming",
            Self::Reasoning => "reasoning",
            Self::Image => "image",
            Self::Audio => "audio",
            Self::Hearing => "hearing",
            Self::Embedding => "embedding",
            Self::Zdr => "zdr",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Capability {
    type Err = LlmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Capability::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| LlmError::InvalidParameter(format!("Unknown capability: {s}")))
    }
}

/// Endpoint family a request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Chat,
    Image,
    ImageEdit,
    Speech,
    Transcribe,
    Embed,
}

impl Operation {
    pub const ALL: [Operation; 6] = [
        Operation::Chat,
        Operation::Image,
        Operation::ImageEdit,
        Operation::Speech,
        Operation::Transcribe,
        Operation::Embed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Image => "image",
            Self::ImageEdit => "image_edit",
            Self::Speech => "speech",
            Self::Transcribe => "transcribe",
            Self::Embed => "embed",
        }
    }

    /// Whether a streaming call can be synthesized from a request/response
    /// implementation.
    ///
    /// Speech and embedding results have no incremental form, so they only
    /// stream when the target streams natively.
    pub fn can_synthesize_stream(&self) -> bool {
        !matches!(self, Self::Speech | Self::Embed)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse quality/cost bucket, used as an accuracy proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelTier {
    Flagship,
    Efficient,
    Legacy,
    Experimental,
}

impl ModelTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Flagship => "flagship",
            Self::Efficient => "efficient",
            Self::Legacy => "legacy",
            Self::Experimental => "experimental",
        }
    }
}

impl fmt::Display for ModelTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelTier {
    type Err = LlmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "flagship" => Ok(Self::Flagship),
            "efficient" => Ok(Self::Efficient),
            "legacy" => Ok(Self::Legacy),
            "experimental" => Ok(Self::Experimental),
            other => Err(LlmError::InvalidParameter(format!(
                "Unknown model tier: {other}"
            ))),
        }
    }
}
