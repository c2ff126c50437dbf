// Request/response translation for the Claude Messages dialect

use super::{has_inline_data, inject_cache_breakpoints, BuiltRequest, RequestTranslator};
use crate::config::ClientConfig;
use crate::error::{CoreError, Result};
use crate::models::{
    ChatOptions, Content, Message, Provider, ResponsePart, Role, UnifiedResponse, Usage,
};
use crate::session::SignatureCache;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const OAUTH_BETA: &str = "oauth-2025-04-20";
const DEFAULT_MAX_TOKENS: u32 = 8192;

pub struct ClaudeTranslator {
    base_url: String,
    signatures: Arc<SignatureCache>,
}

impl ClaudeTranslator {
    pub fn new(config: &ClientConfig, signatures: Arc<SignatureCache>) -> Self {
        Self {
            base_url: config.endpoints.claude_base_url.clone(),
            signatures,
        }
    }

    fn render_content(&self, model: &str, content: &Content) -> Value {
        match content {
            Content::Text { text } => json!({ "type": "text", "text": text }),
            Content::Thinking { text, signature } => {
                // Resubmitted reasoning needs the signature the vendor
                // issued with it; fall back to the cache when the caller
                // did not carry it through.
                let signature = signature
                    .clone()
                    .or_else(|| self.signatures.get(model, text));
                let mut block = json!({ "type": "thinking", "thinking": text });
                if let Some(sig) = signature {
                    block["signature"] = json!(sig);
                }
                block
            }
            Content::InlineData { data, mime_type } => json!({
                "type": "image",
                "source": {
                    "type": "base64",
                    "media_type": mime_type,
                    "data": STANDARD.encode(data),
                },
            }),
            Content::ToolCall { id, function, args } => json!({
                "type": "tool_use",
                "id": id,
                "name": function,
                "input": args,
            }),
        }
    }
}

impl RequestTranslator for ClaudeTranslator {
    fn provider(&self) -> Provider {
        Provider::Claude
    }

    fn build(
        &self,
        model: &str,
        messages: &[Message],
        options: &ChatOptions,
        _project_id: Option<&str>,
        stream: bool,
    ) -> Result<BuiltRequest> {
        let mut system: Vec<Value> = Vec::new();
        if let Some(prompt) = &options.system_prompt {
            system.push(json!({ "type": "text", "text": prompt }));
        }

        let mut rendered: Vec<Value> = Vec::new();
        for message in messages {
            match message.role {
                Role::System => {
                    for content in &message.content {
                        if let Content::Text { text } = content {
                            system.push(json!({ "type": "text", "text": text }));
                        }
                    }
                }
                Role::User | Role::Assistant => {
                    let role = match message.role {
                        Role::User => "user",
                        _ => "assistant",
                    };
                    let blocks: Vec<Value> = message
                        .content
                        .iter()
                        .map(|c| self.render_content(model, c))
                        .collect();
                    rendered.push(json!({ "role": role, "content": blocks }));
                }
            }
        }

        let mut body = json!({
            "model": model,
            "max_tokens": options.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            "stream": stream,
            "messages": rendered,
        });

        if !system.is_empty() {
            body["system"] = Value::Array(system);
        }
        if let Some(temperature) = options.temperature {
            body["temperature"] = json!(temperature);
        }
        if !options.tools.is_empty() {
            // Claude accepts standard JSON Schema, so tool schemas go out
            // unmodified.
            let tools: Vec<Value> = options
                .tools
                .iter()
                .map(|t| {
                    json!({
                        "name": t.name,
                        "description": t.description.clone().unwrap_or_default(),
                        "input_schema": t.input_schema,
                    })
                })
                .collect();
            body["tools"] = Value::Array(tools);
        }
        if options.thinking.enabled {
            let mut thinking = json!({ "type": "enabled" });
            if let Some(budget) = options.thinking.budget_tokens {
                thinking["budget_tokens"] = json!(budget);
            }
            body["thinking"] = thinking;
        }

        inject_cache_breakpoints(&mut body);

        debug!(model, messages = rendered.len(), "built claude request");

        Ok(BuiltRequest {
            url: format!("{}/v1/messages", self.base_url),
            headers: vec![
                ("anthropic-version".to_string(), ANTHROPIC_VERSION.to_string()),
                ("anthropic-beta".to_string(), OAUTH_BETA.to_string()),
            ],
            body,
            has_attachments: has_inline_data(messages),
        })
    }

    fn parse_response(&self, model: &str, body: &Value) -> Result<UnifiedResponse> {
        let blocks = body
            .get("content")
            .and_then(|v| v.as_array())
            .ok_or_else(|| {
                CoreError::InvalidResponse("Claude response missing content array".to_string())
            })?;

        let mut parts = Vec::new();
        for block in blocks {
            match block.get("type").and_then(|t| t.as_str()) {
                Some("text") => {
                    let text = block
                        .get("text")
                        .and_then(|t| t.as_str())
                        .unwrap_or_default();
                    parts.push(ResponsePart::Text {
                        text: text.to_string(),
                    });
                }
                Some("thinking") => {
                    let text = block
                        .get("thinking")
                        .and_then(|t| t.as_str())
                        .unwrap_or_default();
                    if let Some(sig) = block.get("signature").and_then(|s| s.as_str()) {
                        self.signatures.store(model, text, sig);
                    }
                    parts.push(ResponsePart::Thinking {
                        text: text.to_string(),
                    });
                }
                Some("tool_use") => {
                    parts.push(ResponsePart::ToolCall {
                        id: block
                            .get("id")
                            .and_then(|v| v.as_str())
                            .unwrap_or_default()
                            .to_string(),
                        function: block
                            .get("name")
                            .and_then(|v| v.as_str())
                            .unwrap_or_default()
                            .to_string(),
                        args: block.get("input").cloned().unwrap_or(json!({})),
                    });
                }
                other => {
                    return Err(CoreError::InvalidResponse(format!(
                        "Unexpected Claude content block type: {:?}",
                        other
                    )));
                }
            }
        }

        let usage = Usage {
            input_tokens: body
                .pointer("/usage/input_tokens")
                .and_then(|v| v.as_u64())
                .unwrap_or(0) as u32,
            output_tokens: body
                .pointer("/usage/output_tokens")
                .and_then(|v| v.as_u64())
                .unwrap_or(0) as u32,
        };

        Ok(UnifiedResponse {
            parts,
            usage,
            finish_reason: body
                .get("stop_reason")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ToolDefinition;

    fn translator() -> ClaudeTranslator {
        ClaudeTranslator::new(&ClientConfig::default(), Arc::new(SignatureCache::new()))
    }

    #[test]
    fn test_system_rendered_iff_present() {
        let t = translator();
        let without = t
            .build(
                "claude-sonnet-4-5",
                &[Message::text(Role::User, "hi")],
                &ChatOptions::default(),
                None,
                true,
            )
            .unwrap();
        assert!(without.body.get("system").is_none());

        let with = t
            .build(
                "claude-sonnet-4-5",
                &[
                    Message::text(Role::System, "be brief"),
                    Message::text(Role::User, "hi"),
                ],
                &ChatOptions::default(),
                None,
                true,
            )
            .unwrap();
        assert_eq!(with.body["system"][0]["text"], "be brief");
    }

    #[test]
    fn test_override_prompt_renders_system() {
        let t = translator();
        let options = ChatOptions {
            system_prompt: Some("override".to_string()),
            ..Default::default()
        };
        let built = t
            .build(
                "claude-sonnet-4-5",
                &[Message::text(Role::User, "hi")],
                &options,
                None,
                true,
            )
            .unwrap();
        assert_eq!(built.body["system"][0]["text"], "override");
    }

    #[test]
    fn test_cached_signature_attached_to_thinking() {
        let signatures = Arc::new(SignatureCache::new());
        signatures.store("claude-sonnet-4-5", "prior reasoning", "sig_xyz");
        let t = ClaudeTranslator::new(&ClientConfig::default(), signatures);

        let messages = vec![Message {
            role: Role::Assistant,
            content: vec![Content::Thinking {
                text: "prior reasoning".to_string(),
                signature: None,
            }],
        }];
        let built = t
            .build("claude-sonnet-4-5", &messages, &ChatOptions::default(), None, true)
            .unwrap();

        let block = &built.body["messages"][0]["content"][0];
        assert_eq!(block["type"], "thinking");
        assert_eq!(block["signature"], "sig_xyz");
    }

    #[test]
    fn test_tools_pass_schema_through() {
        let t = translator();
        let options = ChatOptions {
            tools: vec![ToolDefinition {
                name: "ls".to_string(),
                description: None,
                input_schema: json!({ "type": "object", "const": "kept" }),
            }],
            ..Default::default()
        };
        let built = t
            .build(
                "claude-sonnet-4-5",
                &[Message::text(Role::User, "hi")],
                &options,
                None,
                true,
            )
            .unwrap();
        // No schema cleaning for this dialect.
        assert_eq!(built.body["tools"][0]["input_schema"]["const"], "kept");
    }

    #[test]
    fn test_parse_response_collects_parts_and_usage() {
        let t = translator();
        let body = json!({
            "content": [
                { "type": "text", "text": "Hello" },
                { "type": "tool_use", "id": "toolu_1", "name": "ls", "input": { "path": "." } },
            ],
            "usage": { "input_tokens": 12, "output_tokens": 7 },
            "stop_reason": "tool_use",
        });
        let response = t.parse_response("claude-sonnet-4-5", &body).unwrap();

        assert_eq!(response.full_text(), "Hello");
        assert_eq!(response.usage.input_tokens, 12);
        assert_eq!(response.usage.output_tokens, 7);
        assert_eq!(response.finish_reason.as_deref(), Some("tool_use"));
    }

    #[test]
    fn test_parse_response_rejects_unknown_block() {
        let t = translator();
        let body = json!({ "content": [{ "type": "mystery" }] });
        assert!(matches!(
            t.parse_response("claude-sonnet-4-5", &body),
            Err(CoreError::InvalidResponse(_))
        ));
    }
}
