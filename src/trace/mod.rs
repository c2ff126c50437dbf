// HAR-style trace records and secret redaction
//
// The core only produces records and hands them to an injected sink; it
// never decides how or whether they are persisted. Everything sensitive is
// redacted before a record leaves this module.

use crate::models::Provider;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Header names and JSON field names whose values never leave the process
/// in clear text.
const SENSITIVE_KEYS: &[&str] = &[
    "authorization",
    "access_token",
    "refresh_token",
    "id_token",
    "api_key",
    "api-key",
    "x-api-key",
    "client_secret",
    "code_verifier",
];

/// One side of an HTTP exchange as captured for tracing.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TraceHttp {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
    pub status: Option<u16>,
}

/// A complete record of one logical call, emitted after it finishes.
#[derive(Debug, Clone, Serialize)]
pub struct TraceRecord {
    pub trace_id: String,
    pub provider: Provider,
    /// Account identifier (email or org id), when known.
    pub account: Option<String>,
    /// The orchestrator method: `chat`, `chat_stream`, `chat_non_stream`,
    /// `login`, `refresh`.
    pub method: String,
    pub request: TraceHttp,
    pub response: TraceHttp,
    pub duration_ms: u64,
    pub error: Option<String>,
}

/// Consumer of trace records. Production wires this to the tracing
/// subsystem; tests collect records in memory.
pub trait TraceSink: Send + Sync {
    fn record(&self, record: TraceRecord);
}

/// Sink that drops every record.
pub struct NoopTraceSink;

impl TraceSink for NoopTraceSink {
    fn record(&self, _record: TraceRecord) {}
}

/// Replace a secret with a deterministic token. Identical secrets redact
/// identically across records without revealing the value.
pub fn redact_token(secret: &str) -> String {
    let digest = Sha256::digest(secret.as_bytes());
    format!("REDACTED ({})", &hex::encode(digest)[..8])
}

fn is_sensitive(key: &str) -> bool {
    let lower = key.to_ascii_lowercase();
    SENSITIVE_KEYS.contains(&lower.as_str())
}

/// Redact sensitive header values, preserving order and casing of names.
pub fn redact_headers(headers: &[(String, String)]) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            if is_sensitive(name) {
                (name.clone(), redact_token(value))
            } else {
                (name.clone(), value.clone())
            }
        })
        .collect()
}

/// Redact sensitive string fields anywhere in a JSON tree.
pub fn redact_json(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = serde_json::Map::new();
            for (key, val) in map {
                if is_sensitive(key) {
                    if let Some(s) = val.as_str() {
                        out.insert(key.clone(), Value::String(redact_token(s)));
                        continue;
                    }
                }
                out.insert(key.clone(), redact_json(val));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(redact_json).collect()),
        other => other.clone(),
    }
}

/// Capture buffer for raw streaming response text.
///
/// Capped to keep records bounded, but the segment that crosses the cap is
/// kept whole so the tail of the stream stays readable.
pub struct StreamCapture {
    cap: usize,
    buffer: String,
    truncated: bool,
}

impl StreamCapture {
    pub fn new(cap: usize) -> Self {
        Self {
            cap,
            buffer: String::new(),
            truncated: false,
        }
    }

    pub fn push(&mut self, segment: &str) {
        if self.truncated {
            return;
        }
        self.buffer.push_str(segment);
        if self.buffer.len() >= self.cap {
            self.truncated = true;
        }
    }

    pub fn into_text(self) -> String {
        if self.truncated {
            format!("{}\n[capture truncated]", self.buffer)
        } else {
            self.buffer
        }
    }
}
