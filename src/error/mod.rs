// Error types for the unichat core

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Authentication failed: {message} (trace {trace_id})")]
    AuthenticationFailed { message: String, trace_id: String },

    #[error("Token refresh failed: HTTP {status}: {body} (trace {trace_id})")]
    TokenRefreshFailed {
        status: u16,
        body: String,
        trace_id: String,
    },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("API error: HTTP {status}: {body} (trace {trace_id})")]
    ApiError {
        status: u16,
        body: String,
        /// Retry-After hint, seconds. Only populated for 429 responses.
        retry_after: Option<u64>,
        trace_id: String,
    },

    #[error("Network error: {message} (trace {trace_id})")]
    NetworkError { message: String, trace_id: String },

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CoreError {
    /// Trace id of the logical call that produced this error, if any.
    pub fn trace_id(&self) -> Option<&str> {
        match self {
            CoreError::ApiError { trace_id, .. }
            | CoreError::NetworkError { trace_id, .. }
            | CoreError::AuthenticationFailed { trace_id, .. }
            | CoreError::TokenRefreshFailed { trace_id, .. } => Some(trace_id),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
