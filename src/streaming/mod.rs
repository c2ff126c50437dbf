// Streaming protocol decoding
//
// An [`SseDecoder`] turns raw bytes into framed server-sent events; a
// per-vendor [`StreamParser`] turns those events into unified chunks;
// [`aggregate_chunks`] folds a finished chunk sequence back into one
// complete response for callers that asked for a buffered answer.

mod claude;
mod google;

pub use claude::ClaudeStreamParser;
pub use google::GoogleStreamParser;

use crate::error::{CoreError, Result};
use crate::models::{ChatChunk, PartType, ResponsePart, UnifiedResponse, Usage};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// One framed server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// The `event:` field, when the vendor names its events.
    pub event: Option<String>,
    /// Joined `data:` lines.
    pub data: String,
}

/// Incremental SSE framer. Bytes go in via [`push`](Self::push) in whatever
/// read sizes the transport produces; complete events come out. Framing is
/// byte-size independent, so chunk aggregation downstream is deterministic.
#[derive(Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    event_name: Option<String>,
    data_lines: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes, returning every event completed by this read.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(bytes);

        let mut events = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=newline).collect();
            let line = String::from_utf8_lossy(&raw[..newline]);
            let line = line.strip_suffix('\r').unwrap_or(&line);
            if let Some(event) = self.take_line(line) {
                events.push(event);
            }
        }
        events
    }

    /// Flush any event left unterminated when the stream closes.
    pub fn finish(&mut self) -> Option<SseEvent> {
        if !self.buffer.is_empty() {
            let raw = std::mem::take(&mut self.buffer);
            let line = String::from_utf8_lossy(&raw).to_string();
            let line = line.strip_suffix('\r').unwrap_or(&line).to_string();
            if let Some(event) = self.take_line(&line) {
                return Some(event);
            }
        }
        self.dispatch()
    }

    fn take_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }
        if let Some(value) = line.strip_prefix("event:") {
            self.event_name = Some(value.trim_start_matches(' ').to_string());
        } else if let Some(value) = line.strip_prefix("data:") {
            self.data_lines
                .push(value.strip_prefix(' ').unwrap_or(value).to_string());
        }
        // Unknown fields (id:, retry:) are ignored.
        None
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        if self.event_name.is_none() && self.data_lines.is_empty() {
            return None;
        }
        Some(SseEvent {
            event: self.event_name.take(),
            data: std::mem::take(&mut self.data_lines).join("\n"),
        })
    }
}

/// A stateful vendor-specific decoder from SSE events to unified chunks.
pub trait StreamParser: Send {
    /// Consume one event, emitting zero or more chunks.
    fn parse_event(&mut self, event: &SseEvent) -> Result<Vec<ChatChunk>>;

    /// Whether the parser observed an explicit end-of-stream signal.
    /// Transport close remains the primary termination; this is advisory.
    fn is_done(&self) -> bool {
        false
    }
}

/// Fold a finished stream into a complete response.
///
/// Consecutive chunks of the same part type extend the current part; a
/// type change opens a new one. Inline-data chunks are base64-decoded.
/// The last usage-bearing chunk wins. Fails when the stream produced no
/// content at all.
pub fn aggregate_chunks(chunks: &[ChatChunk]) -> Result<UnifiedResponse> {
    let mut parts: Vec<ResponsePart> = Vec::new();
    let mut usage: Option<Usage> = None;

    for chunk in chunks {
        if let Some(u) = chunk.usage {
            usage = Some(u);
        }
        if chunk.delta.is_empty() {
            continue;
        }
        match chunk.part_type {
            PartType::Text => match parts.last_mut() {
                Some(ResponsePart::Text { text }) => text.push_str(&chunk.delta),
                _ => parts.push(ResponsePart::Text {
                    text: chunk.delta.clone(),
                }),
            },
            PartType::Thinking => match parts.last_mut() {
                Some(ResponsePart::Thinking { text }) => text.push_str(&chunk.delta),
                _ => parts.push(ResponsePart::Thinking {
                    text: chunk.delta.clone(),
                }),
            },
            PartType::InlineData => {
                let data = STANDARD.decode(&chunk.delta).map_err(|e| {
                    CoreError::InvalidResponse(format!("Invalid inline data in stream: {e}"))
                })?;
                parts.push(ResponsePart::InlineData {
                    data,
                    mime_type: chunk
                        .mime_type
                        .clone()
                        .unwrap_or_else(|| "application/octet-stream".to_string()),
                });
            }
            PartType::ToolCall => {
                let same_call = matches!(
                    (parts.last(), chunk.tool_id.as_deref()),
                    (Some(ResponsePart::ToolCall { id, .. }), Some(tool_id)) if id == tool_id
                );
                if same_call {
                    // Argument JSON arrives in fragments; buffer as a raw
                    // string until the call is complete.
                    if let Some(ResponsePart::ToolCall { args, .. }) = parts.last_mut() {
                        let mut buffer = args.as_str().unwrap_or_default().to_string();
                        buffer.push_str(&chunk.delta);
                        *args = serde_json::Value::String(buffer);
                    }
                } else {
                    parts.push(ResponsePart::ToolCall {
                        id: chunk.tool_id.clone().unwrap_or_default(),
                        function: chunk.tool_name.clone().unwrap_or_default(),
                        args: serde_json::Value::String(chunk.delta.clone()),
                    });
                }
            }
        }
    }

    // Completed tool calls parse their buffered argument text into JSON.
    for part in &mut parts {
        if let ResponsePart::ToolCall { args, .. } = part {
            if let Some(raw) = args.as_str() {
                let parsed: serde_json::Value = if raw.trim().is_empty() {
                    serde_json::json!({})
                } else {
                    serde_json::from_str(raw).map_err(|e| {
                        CoreError::InvalidResponse(format!(
                            "Malformed streamed tool arguments: {e}"
                        ))
                    })?
                };
                *args = parsed;
            }
        }
    }

    if parts.is_empty() {
        return Err(CoreError::InvalidResponse(
            "Stream produced no content".to_string(),
        ));
    }

    Ok(UnifiedResponse {
        parts,
        usage: usage.unwrap_or_default(),
        finish_reason: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decoder_frames_events_across_reads() {
        let mut decoder = SseDecoder::new();
        // Split mid-line and mid-event.
        assert!(decoder.push(b"event: message_st").is_empty());
        assert!(decoder.push(b"art\ndata: {\"a\":1}\n").is_empty());
        let events = decoder.push(b"\n");
        assert_eq!(
            events,
            vec![SseEvent {
                event: Some("message_start".to_string()),
                data: "{\"a\":1}".to_string(),
            }]
        );
    }

    #[test]
    fn test_decoder_joins_multiple_data_lines() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(b"data: one\ndata: two\n\n");
        assert_eq!(events[0].data, "one\ntwo");
    }

    #[test]
    fn test_decoder_ignores_comments_and_crlf() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(b": keepalive\r\ndata: x\r\n\r\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "x");
    }

    #[test]
    fn test_decoder_finish_flushes_trailing_event() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: tail\n").is_empty());
        let event = decoder.finish().unwrap();
        assert_eq!(event.data, "tail");
        assert!(decoder.finish().is_none());
    }

    #[test]
    fn test_aggregate_merges_same_type_runs() {
        let chunks = vec![
            ChatChunk::thinking("m1", "plan"),
            ChatChunk::text("m1", "Hello"),
            ChatChunk::text("m1", " world"),
        ];
        let response = aggregate_chunks(&chunks).unwrap();
        assert_eq!(response.parts.len(), 2);
        assert_eq!(response.full_text(), "Hello world");
    }

    #[test]
    fn test_aggregate_carries_last_usage() {
        let mut usage_chunk = ChatChunk::text("m1", "");
        usage_chunk.usage = Some(Usage {
            input_tokens: 3,
            output_tokens: 8,
        });
        let chunks = vec![ChatChunk::text("m1", "hi"), usage_chunk];
        let response = aggregate_chunks(&chunks).unwrap();
        assert_eq!(response.usage.output_tokens, 8);
    }

    #[test]
    fn test_aggregate_reassembles_tool_arguments() {
        let mut a = ChatChunk::text("m1", "{\"pa");
        a.part_type = PartType::ToolCall;
        a.tool_id = Some("toolu_1".to_string());
        a.tool_name = Some("ls".to_string());
        let mut b = ChatChunk::text("m1", "th\":\".\"}");
        b.part_type = PartType::ToolCall;
        b.tool_id = Some("toolu_1".to_string());
        b.tool_name = Some("ls".to_string());

        let response = aggregate_chunks(&[a, b]).unwrap();
        match &response.parts[0] {
            ResponsePart::ToolCall { id, args, .. } => {
                assert_eq!(id, "toolu_1");
                assert_eq!(args["path"], ".");
            }
            other => panic!("unexpected part: {:?}", other),
        }
    }

    #[test]
    fn test_aggregate_empty_stream_is_invalid() {
        assert!(matches!(
            aggregate_chunks(&[]),
            Err(CoreError::InvalidResponse(_))
        ));
        // Usage-only streams carry no content either.
        let mut usage_only = ChatChunk::text("m1", "");
        usage_only.usage = Some(Usage::default());
        assert!(matches!(
            aggregate_chunks(&[usage_only]),
            Err(CoreError::InvalidResponse(_))
        ));
    }
}
