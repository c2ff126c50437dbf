// Per-vendor request/response translation

mod cache_control;
mod claude;
mod gemini;
mod responses;
pub mod schema;

pub use cache_control::inject_cache_breakpoints;
pub use claude::ClaudeTranslator;
pub use gemini::GeminiTranslator;
pub use responses::ResponsesTranslator;
pub use schema::{clean_schema, CleanMode};

use crate::error::Result;
use crate::models::{ChatOptions, Message, Provider, UnifiedResponse};
use serde_json::Value;

/// A fully built vendor request, ready for the execution core to attach
/// authentication and submit.
#[derive(Debug, Clone)]
pub struct BuiltRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Value,
    /// Whether any message carries inline binary data; such requests get
    /// the extended timeout.
    pub has_attachments: bool,
}

/// One vendor dialect's request builder and buffered-response decoder.
///
/// Translators are pure with respect to the conversation: all state they
/// consult (the signature cache) is injected.
pub trait RequestTranslator: Send + Sync {
    fn provider(&self) -> Provider;

    /// Build the wire request for a chat call.
    fn build(
        &self,
        model: &str,
        messages: &[Message],
        options: &ChatOptions,
        project_id: Option<&str>,
        stream: bool,
    ) -> Result<BuiltRequest>;

    /// Decode a buffered (non-streaming) response body.
    fn parse_response(&self, model: &str, body: &Value) -> Result<UnifiedResponse>;
}

/// Whether any message carries inline binary content.
pub(crate) fn has_inline_data(messages: &[Message]) -> bool {
    messages.iter().any(|m| {
        m.content
            .iter()
            .any(|c| matches!(c, crate::models::Content::InlineData { .. }))
    })
}
