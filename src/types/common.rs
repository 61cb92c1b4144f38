//! Enums shared by every endpoint's responses.

use serde::{Deserialize, Serialize};

/// Reason why the model stopped generating.
///
/// Provider adapters map their vendor-specific strings onto these values
/// (`end_turn` → `Stop`, `max_tokens` → `Length`, `tool_use` → `ToolCalls`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
    StopSequence,
    Error,
    Other(String),
    Unknown,
}

/// Provider and model that produced a response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseMetadata {
    pub id: Option<String>,
    pub model: Option<String>,
    pub provider: String,
    pub created: Option<chrono::DateTime<chrono::Utc>>,
}
