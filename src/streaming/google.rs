// Parser for Google Code Assist SSE streams
//
// Every data line is a self-contained generateContent response (optionally
// wrapped in a `response` envelope). Termination is transport close; a
// `[DONE]` sentinel, when the backend sends one, just ends parsing early.

use super::{SseEvent, StreamParser};
use crate::error::{CoreError, Result};
use crate::models::{ChatChunk, PartType, Usage};
use crate::session::SignatureCache;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

pub struct GoogleStreamParser {
    model: String,
    signatures: Arc<SignatureCache>,
    message_id: String,
    done: bool,
}

impl GoogleStreamParser {
    pub fn new(model: impl Into<String>, signatures: Arc<SignatureCache>) -> Self {
        Self {
            model: model.into(),
            signatures,
            message_id: format!("msg_{}", Uuid::new_v4().simple()),
            done: false,
        }
    }

    fn parse_part(&mut self, part: &Value) -> Option<ChatChunk> {
        if let Some(inline) = part.get("inlineData").or_else(|| part.get("inline_data")) {
            let encoded = inline
                .get("data")
                .and_then(|v| v.as_str())
                .unwrap_or_default();
            if encoded.is_empty() {
                return None;
            }
            let mut chunk = ChatChunk::text(&self.message_id, encoded);
            chunk.part_type = PartType::InlineData;
            chunk.mime_type = inline
                .get("mimeType")
                .or_else(|| inline.get("mime_type"))
                .and_then(|v| v.as_str())
                .map(|s| s.to_string());
            return Some(chunk);
        }
        if let Some(call) = part.get("functionCall") {
            // Missing or null args still mean "no arguments", i.e. `{}`.
            let args = match call.get("args") {
                Some(v) if !v.is_null() => v.to_string(),
                _ => "{}".to_string(),
            };
            let mut chunk = ChatChunk::text(&self.message_id, args);
            chunk.part_type = PartType::ToolCall;
            chunk.tool_id = Some(
                call.get("id")
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| Uuid::new_v4().to_string()),
            );
            chunk.tool_name = call
                .get("name")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string());
            return Some(chunk);
        }
        let text = part.get("text").and_then(|v| v.as_str())?;
        if part.get("thought").and_then(|v| v.as_bool()).unwrap_or(false) {
            if let Some(sig) = part.get("thoughtSignature").and_then(|v| v.as_str()) {
                self.signatures.store(&self.model, text, sig);
            }
            Some(ChatChunk::thinking(&self.message_id, text))
        } else {
            Some(ChatChunk::text(&self.message_id, text))
        }
    }
}

impl StreamParser for GoogleStreamParser {
    fn parse_event(&mut self, event: &SseEvent) -> Result<Vec<ChatChunk>> {
        if self.done || event.data.is_empty() {
            return Ok(Vec::new());
        }
        if event.data.trim() == "[DONE]" {
            debug!(id = self.message_id.as_str(), "code assist stream sentinel");
            self.done = true;
            return Ok(Vec::new());
        }

        let data: Value = serde_json::from_str(&event.data).map_err(|e| {
            CoreError::InvalidResponse(format!("Malformed Code Assist stream chunk: {e}"))
        })?;
        let payload = data.get("response").unwrap_or(&data);

        let mut chunks = Vec::new();
        if let Some(parts) = payload
            .pointer("/candidates/0/content/parts")
            .and_then(|v| v.as_array())
        {
            for part in parts {
                if let Some(chunk) = self.parse_part(part) {
                    chunks.push(chunk);
                }
            }
        }

        if let Some(meta) = payload.get("usageMetadata") {
            let mut chunk = ChatChunk::text(&self.message_id, "");
            chunk.usage = Some(Usage {
                input_tokens: meta
                    .get("promptTokenCount")
                    .and_then(|v| v.as_u64())
                    .unwrap_or(0) as u32,
                output_tokens: meta
                    .get("candidatesTokenCount")
                    .and_then(|v| v.as_u64())
                    .unwrap_or(0) as u32,
            });
            chunks.push(chunk);
        }

        Ok(chunks)
    }

    fn is_done(&self) -> bool {
        self.done
    }
}
