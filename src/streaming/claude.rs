// Stateful parser for the Claude SSE event protocol

use super::{SseEvent, StreamParser};
use crate::error::{CoreError, Result};
use crate::models::{ChatChunk, PartType, Usage};
use crate::session::SignatureCache;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq)]
enum ActiveBlock {
    Text,
    Thinking,
    ToolUse,
}

/// Event-driven state machine over the `message_start` .. `message_stop`
/// protocol. One active content block at a time; deltas are typed by it.
pub struct ClaudeStreamParser {
    model: String,
    signatures: Arc<SignatureCache>,

    message_id: String,
    input_tokens: u32,
    done: bool,

    active_block: Option<ActiveBlock>,
    active_tool_id: Option<String>,
    active_tool_name: Option<String>,

    // Accumulated across one thinking block, for the signature cache.
    thinking_text: String,
    thinking_signature: String,
}

impl ClaudeStreamParser {
    pub fn new(model: impl Into<String>, signatures: Arc<SignatureCache>) -> Self {
        Self {
            model: model.into(),
            signatures,
            message_id: String::new(),
            input_tokens: 0,
            done: false,
            active_block: None,
            active_tool_id: None,
            active_tool_name: None,
            thinking_text: String::new(),
            thinking_signature: String::new(),
        }
    }

    fn parse_data(event: &SseEvent) -> Result<Value> {
        serde_json::from_str(&event.data).map_err(|e| {
            CoreError::InvalidResponse(format!("Malformed Claude stream event: {e}"))
        })
    }

    fn on_block_start(&mut self, data: &Value) -> Result<()> {
        let block = data.get("content_block").ok_or_else(|| {
            CoreError::InvalidResponse("content_block_start without content_block".to_string())
        })?;
        match block.get("type").and_then(|t| t.as_str()) {
            Some("text") => self.active_block = Some(ActiveBlock::Text),
            Some("thinking") => {
                self.active_block = Some(ActiveBlock::Thinking);
                self.thinking_text.clear();
                self.thinking_signature.clear();
            }
            Some("tool_use") => {
                self.active_block = Some(ActiveBlock::ToolUse);
                self.active_tool_id = block
                    .get("id")
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string());
                self.active_tool_name = block
                    .get("name")
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string());
            }
            other => {
                return Err(CoreError::InvalidResponse(format!(
                    "Unknown content block type in stream: {:?}",
                    other
                )));
            }
        }
        Ok(())
    }

    fn on_delta(&mut self, data: &Value) -> Result<Vec<ChatChunk>> {
        let delta = data.get("delta").ok_or_else(|| {
            CoreError::InvalidResponse("content_block_delta without delta".to_string())
        })?;
        let chunk = match delta.get("type").and_then(|t| t.as_str()) {
            Some("text_delta") => {
                let text = delta.get("text").and_then(|t| t.as_str()).unwrap_or("");
                ChatChunk::text(&self.message_id, text)
            }
            Some("thinking_delta") => {
                let text = delta
                    .get("thinking")
                    .and_then(|t| t.as_str())
                    .unwrap_or("");
                self.thinking_text.push_str(text);
                ChatChunk::thinking(&self.message_id, text)
            }
            Some("signature_delta") => {
                // Signatures are collected, never surfaced as chunks.
                if let Some(sig) = delta.get("signature").and_then(|s| s.as_str()) {
                    self.thinking_signature.push_str(sig);
                }
                return Ok(Vec::new());
            }
            Some("input_json_delta") => {
                let json = delta
                    .get("partial_json")
                    .and_then(|t| t.as_str())
                    .unwrap_or("");
                let mut chunk = ChatChunk::text(&self.message_id, json);
                chunk.part_type = PartType::ToolCall;
                chunk.tool_id = self.active_tool_id.clone();
                chunk.tool_name = self.active_tool_name.clone();
                chunk
            }
            other => {
                return Err(CoreError::InvalidResponse(format!(
                    "Unknown delta type in stream: {:?}",
                    other
                )));
            }
        };
        Ok(vec![chunk])
    }

    fn on_block_stop(&mut self) {
        if self.active_block == Some(ActiveBlock::Thinking) && !self.thinking_signature.is_empty()
        {
            self.signatures
                .store(&self.model, &self.thinking_text, &self.thinking_signature);
        }
        self.active_block = None;
        self.active_tool_id = None;
        self.active_tool_name = None;
    }
}

impl StreamParser for ClaudeStreamParser {
    fn parse_event(&mut self, event: &SseEvent) -> Result<Vec<ChatChunk>> {
        // Events are named via the `event:` field; the data object repeats
        // the name in its `type` field as a fallback.
        let name = match &event.event {
            Some(name) => name.clone(),
            None => {
                let data = Self::parse_data(event)?;
                data.get("type")
                    .and_then(|t| t.as_str())
                    .unwrap_or_default()
                    .to_string()
            }
        };

        match name.as_str() {
            "message_start" => {
                let data = Self::parse_data(event)?;
                if let Some(id) = data.pointer("/message/id").and_then(|v| v.as_str()) {
                    self.message_id = id.to_string();
                }
                self.input_tokens = data
                    .pointer("/message/usage/input_tokens")
                    .and_then(|v| v.as_u64())
                    .unwrap_or(0) as u32;
                Ok(Vec::new())
            }
            "content_block_start" => {
                let data = Self::parse_data(event)?;
                self.on_block_start(&data)?;
                Ok(Vec::new())
            }
            "content_block_delta" => {
                let data = Self::parse_data(event)?;
                self.on_delta(&data)
            }
            "content_block_stop" => {
                self.on_block_stop();
                Ok(Vec::new())
            }
            "message_delta" => {
                let data = Self::parse_data(event)?;
                let output_tokens = data
                    .pointer("/usage/output_tokens")
                    .and_then(|v| v.as_u64())
                    .unwrap_or(0) as u32;
                let mut chunk = ChatChunk::text(&self.message_id, "");
                chunk.usage = Some(Usage {
                    input_tokens: self.input_tokens,
                    output_tokens,
                });
                Ok(vec![chunk])
            }
            "message_stop" => {
                debug!(id = self.message_id.as_str(), "claude stream complete");
                self.done = true;
                Ok(Vec::new())
            }
            // Errors surface through the transport status, not here.
            "ping" | "error" => Ok(Vec::new()),
            other => {
                warn!(event = other, "ignoring unknown claude stream event");
                Ok(Vec::new())
            }
        }
    }

    fn is_done(&self) -> bool {
        self.done
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(name: &str, data: &str) -> SseEvent {
        SseEvent {
            event: Some(name.to_string()),
            data: data.to_string(),
        }
    }

    fn parser() -> ClaudeStreamParser {
        ClaudeStreamParser::new("claude-sonnet-4-5", Arc::new(SignatureCache::new()))
    }

    #[test]
    fn test_text_deltas_become_text_chunks() {
        let mut p = parser();
        p.parse_event(&event(
            "message_start",
            r#"{"message":{"id":"msg_1","usage":{"input_tokens":10}}}"#,
        ))
        .unwrap();
        p.parse_event(&event(
            "content_block_start",
            r#"{"index":0,"content_block":{"type":"text"}}"#,
        ))
        .unwrap();

        let chunks = p
            .parse_event(&event(
                "content_block_delta",
                r#"{"index":0,"delta":{"type":"text_delta","text":"Hello"}}"#,
            ))
            .unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].id, "msg_1");
        assert_eq!(chunks[0].delta, "Hello");
        assert_eq!(chunks[0].part_type, PartType::Text);
    }

    #[test]
    fn test_message_delta_emits_usage_chunk() {
        let mut p = parser();
        p.parse_event(&event(
            "message_start",
            r#"{"message":{"id":"msg_1","usage":{"input_tokens":10}}}"#,
        ))
        .unwrap();

        let chunks = p
            .parse_event(&event(
                "message_delta",
                r#"{"delta":{"stop_reason":"end_turn"},"usage":{"output_tokens":42}}"#,
            ))
            .unwrap();
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].delta.is_empty());
        let usage = chunks[0].usage.unwrap();
        assert_eq!(usage.input_tokens, 10);
        assert_eq!(usage.output_tokens, 42);
    }

    #[test]
    fn test_thinking_signature_cached_on_block_stop() {
        let signatures = Arc::new(SignatureCache::new());
        let mut p = ClaudeStreamParser::new("claude-sonnet-4-5", signatures.clone());
        p.parse_event(&event(
            "content_block_start",
            r#"{"index":0,"content_block":{"type":"thinking"}}"#,
        ))
        .unwrap();
        p.parse_event(&event(
            "content_block_delta",
            r#"{"index":0,"delta":{"type":"thinking_delta","thinking":"step one"}}"#,
        ))
        .unwrap();
        let silent = p
            .parse_event(&event(
                "content_block_delta",
                r#"{"index":0,"delta":{"type":"signature_delta","signature":"sig_s1"}}"#,
            ))
            .unwrap();
        assert!(silent.is_empty());
        p.parse_event(&event("content_block_stop", r#"{"index":0}"#))
            .unwrap();

        assert_eq!(
            signatures.get("claude-opus-4-1", "step one"),
            Some("sig_s1".to_string())
        );
    }

    #[test]
    fn test_tool_deltas_carry_tool_identity() {
        let mut p = parser();
        p.parse_event(&event(
            "content_block_start",
            r#"{"index":0,"content_block":{"type":"tool_use","id":"toolu_1","name":"ls"}}"#,
        ))
        .unwrap();
        let chunks = p
            .parse_event(&event(
                "content_block_delta",
                r#"{"index":0,"delta":{"type":"input_json_delta","partial_json":"{\"pa"}}"#,
            ))
            .unwrap();
        assert_eq!(chunks[0].part_type, PartType::ToolCall);
        assert_eq!(chunks[0].tool_id.as_deref(), Some("toolu_1"));
        assert_eq!(chunks[0].tool_name.as_deref(), Some("ls"));
        assert_eq!(chunks[0].delta, "{\"pa");
    }

    #[test]
    fn test_ping_and_stop_emit_nothing() {
        let mut p = parser();
        assert!(p.parse_event(&event("ping", r#"{"type":"ping"}"#)).unwrap().is_empty());
        assert!(p
            .parse_event(&event("message_stop", r#"{"type":"message_stop"}"#))
            .unwrap()
            .is_empty());
        assert!(p.is_done());
    }

    #[test]
    fn test_malformed_event_is_invalid_response() {
        let mut p = parser();
        assert!(matches!(
            p.parse_event(&event("message_start", "not json")),
            Err(CoreError::InvalidResponse(_))
        ));
    }
}
