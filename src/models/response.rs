//! Unified response and streaming chunk model.

use serde::{Deserialize, Serialize};

/// Token usage counters reported by the vendor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// One typed part of a complete response, in output order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponsePart {
    Text { text: String },
    Thinking { text: String },
    InlineData { data: Vec<u8>, mime_type: String },
    ToolCall { id: String, function: String, args: serde_json::Value },
}

/// A complete chat response, either buffered from the vendor or aggregated
/// from a stream.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UnifiedResponse {
    pub parts: Vec<ResponsePart>,
    pub usage: Usage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

impl UnifiedResponse {
    /// Concatenation of all text parts, order preserved.
    pub fn full_text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                ResponsePart::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }
}

/// Part kind carried by a streaming chunk. Mirrors the content variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartType {
    Text,
    Thinking,
    InlineData,
    ToolCall,
}

/// One incremental unit of a streaming response.
///
/// A stream is a finite, non-restartable ordered sequence of chunks,
/// terminated by end-of-stream or an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatChunk {
    /// Response id as reported by the vendor, empty until known.
    pub id: String,
    pub part_type: PartType,
    /// Text delta, thinking delta, partial tool-call JSON, or base64 payload
    /// for inline data.
    pub delta: String,
    /// MIME type for inline-data chunks.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// Tool id/name for tool-call chunks.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    /// Usage counters, carried on the final usage-bearing chunk.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl ChatChunk {
    pub fn text(id: impl Into<String>, delta: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            part_type: PartType::Text,
            delta: delta.into(),
            mime_type: None,
            tool_id: None,
            tool_name: None,
            usage: None,
        }
    }

    pub fn thinking(id: impl Into<String>, delta: impl Into<String>) -> Self {
        Self {
            part_type: PartType::Thinking,
            ..Self::text(id, delta)
        }
    }
}
