//! Provider-agnostic message and content model.
//!
//! Callers always supply full conversation history; nothing here is
//! persisted. Per-vendor ordering rules are enforced by the translators,
//! not by this model.

use serde::{Deserialize, Serialize};

/// Role of a message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single message in the conversation history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: Vec<Content>,
}

impl Message {
    pub fn text(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            content: vec![Content::Text { text: text.into() }],
        }
    }
}

/// One ordered unit of message content.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Content {
    /// Plain text.
    Text { text: String },

    /// A reasoning block from a prior assistant turn. The signature, when
    /// present, is the vendor's opaque token required to resubmit it.
    Thinking {
        text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        signature: Option<String>,
    },

    /// Raw binary content (images, audio) with its MIME type.
    InlineData {
        #[serde(with = "base64_bytes")]
        data: Vec<u8>,
        mime_type: String,
    },

    /// A tool invocation requested by the assistant.
    ToolCall {
        id: String,
        function: String,
        args: serde_json::Value,
    },
}

/// Reasoning-effort knobs passed through to vendors that support them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThinkingConfig {
    /// Whether extended thinking is requested at all.
    #[serde(default)]
    pub enabled: bool,

    /// Vendor-specific thinking token budget, when configurable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub budget_tokens: Option<u32>,
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(de)?;
        STANDARD.decode(s).map_err(serde::de::Error::custom)
    }
}
