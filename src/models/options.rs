// Per-call chat options passed through to the translators

use super::ThinkingConfig;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A tool the model may call, with its JSON-Schema parameter description.
/// Schemas are cleaned per vendor before they reach the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub input_schema: Value,
}

/// Caller-supplied knobs for one chat call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Explicit system prompt, prepended ahead of any system-role messages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    #[serde(default)]
    pub tools: Vec<ToolDefinition>,

    #[serde(default)]
    pub thinking: ThinkingConfig,
}
