// Request/response translation for the OpenAI Responses dialect

use super::{clean_schema, has_inline_data, BuiltRequest, CleanMode, RequestTranslator};
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

pub struct ResponsesTranslator {
    base_url: String,
    signatures: Arc<SignatureCache>,
}

impl ResponsesTranslator {
    pub fn new(config: &ClientConfig, signatures: Arc<SignatureCache>) -> Self {
        Self {
            base_url: config.endpoints.openai_base_url.clone(),
            signatures,
        }
    }
}

impl RequestTranslator for ResponsesTranslator {
    fn provider(&self) -> Provider {
        Provider::OpenAi
    }

    fn build(
        &self,
        model: &str,
        messages: &[Message],
        options: &ChatOptions,
        _project_id: Option<&str>,
        stream: bool,
    ) -> Result<BuiltRequest> {
        let mut instructions: Vec<String> = Vec::new();
        if let Some(prompt) = &options.system_prompt {
            instructions.push(prompt.clone());
        }

        let mut input: Vec<Value> = Vec::new();
        for message in messages {
            match message.role {
                Role::System => {
                    for content in &message.content {
                        if let Content::Text { text } = content {
                            instructions.push(text.clone());
                        }
                    }
                }
                Role::User | Role::Assistant => {
                    let (role, text_type) = match message.role {
                        Role::User => ("user", "input_text"),
                        _ => ("assistant", "output_text"),
                    };
                    let mut blocks: Vec<Value> = Vec::new();
                    for content in &message.content {
                        match content {
                            Content::Text { text } => {
                                blocks.push(json!({ "type": text_type, "text": text }));
                            }
                            Content::InlineData { data, mime_type } => {
                                blocks.push(json!({
                                    "type": "input_image",
                                    "image_url": format!(
                                        "data:{};base64,{}",
                                        mime_type,
                                        STANDARD.encode(data)
                                    ),
                                }));
                            }
                            Content::Thinking { text, signature } => {
                                // Reasoning can only be replayed with the
                                // opaque payload the vendor issued; without
                                // one the item is dropped.
                                let encrypted = signature
                                    .clone()
                                    .or_else(|| self.signatures.get(model, text));
                                if let Some(payload) = encrypted {
                                    input.push(json!({
                                        "type": "reasoning",
                                        "encrypted_content": payload,
                                        "summary": [
                                            { "type": "summary_text", "text": text },
                                        ],
                                    }));
                                }
                            }
                            Content::ToolCall { id, function, args } => {
                                input.push(json!({
                                    "type": "function_call",
                                    "call_id": id,
                                    "name": function,
                                    "arguments": args.to_string(),
                                }));
                            }
                        }
                    }
                    if !blocks.is_empty() {
                        input.push(json!({
                            "type": "message",
                            "role": role,
                            "content": blocks,
                        }));
                    }
                }
            }
        }

        let mut body = json!({
            "model": model,
            "stream": stream,
            "input": input,
        });

        if !instructions.is_empty() {
            body["instructions"] = json!(instructions.join("\n\n"));
        }
        if let Some(max_tokens) = options.max_tokens {
            body["max_output_tokens"] = json!(max_tokens);
        }
        if let Some(temperature) = options.temperature {
            body["temperature"] = json!(temperature);
        }
        if !options.tools.is_empty() {
            let tools: Vec<Value> = options
                .tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "name": t.name,
                        "description": t.description.clone().unwrap_or_default(),
                        "parameters": clean_schema(&t.input_schema, CleanMode::Light),
                    })
                })
                .collect();
            body["tools"] = Value::Array(tools);
        }
        if options.thinking.enabled {
            body["reasoning"] = json!({ "summary": "auto" });
            body["include"] = json!(["reasoning.encrypted_content"]);
        }

        debug!(model, items = input.len(), "built responses request");

        Ok(BuiltRequest {
            url: format!("{}/responses", self.base_url),
            headers: Vec::new(),
            body,
            has_attachments: has_inline_data(messages),
        })
    }

    fn parse_response(&self, model: &str, body: &Value) -> Result<UnifiedResponse> {
        let output = body
            .get("output")
            .and_then(|v| v.as_array())
            .ok_or_else(|| {
                CoreError::InvalidResponse("Responses body missing output array".to_string())
            })?;

        let mut parts = Vec::new();
        for item in output {
            match item.get("type").and_then(|t| t.as_str()) {
                Some("message") => {
                    let blocks = item
                        .get("content")
                        .and_then(|v| v.as_array())
                        .cloned()
                        .unwrap_or_default();
                    for block in blocks {
                        if block.get("type").and_then(|t| t.as_str()) == Some("output_text") {
                            let text = block
                                .get("text")
                                .and_then(|t| t.as_str())
                                .unwrap_or_default();
                            parts.push(ResponsePart::Text {
                                text: text.to_string(),
                            });
                        }
                    }
                }
                Some("reasoning") => {
                    let text: String = item
                        .pointer("/summary")
                        .and_then(|v| v.as_array())
                        .map(|summaries| {
                            summaries
                                .iter()
                                .filter_map(|s| s.get("text").and_then(|t| t.as_str()))
                                .collect::<Vec<_>>()
                                .join("")
                        })
                        .unwrap_or_default();
                    if let Some(payload) =
                        item.get("encrypted_content").and_then(|v| v.as_str())
                    {
                        self.signatures.store(model, &text, payload);
                    }
                    if !text.is_empty() {
                        parts.push(ResponsePart::Thinking { text });
                    }
                }
                Some("function_call") => {
                    let arguments = item
                        .get("arguments")
                        .and_then(|v| v.as_str())
                        .unwrap_or("{}");
                    let args: Value = serde_json::from_str(arguments).map_err(|e| {
                        CoreError::InvalidResponse(format!(
                            "Malformed function_call arguments: {e}"
                        ))
                    })?;
                    parts.push(ResponsePart::ToolCall {
                        id: item
                            .get("call_id")
                            .and_then(|v| v.as_str())
                            .unwrap_or_default()
                            .to_string(),
                        function: item
                            .get("name")
                            .and_then(|v| v.as_str())
                            .unwrap_or_default()
                            .to_string(),
                        args,
                    });
                }
                // web_search_call and friends carry no chat content.
                _ => {}
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
                .get("status")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string()),
        })
    }
}
