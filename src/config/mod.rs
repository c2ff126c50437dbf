//! Configuration data structures for the unichat core.
//!
//! The core is a library and never reads files or the environment itself;
//! callers deserialize a [`ClientConfig`] from wherever they keep settings
//! and hand it to the orchestrator.

use serde::{Deserialize, Serialize};

/// The root configuration object for a chat client.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ClientConfig {
    /// HTTP timeout settings.
    #[serde(default)]
    pub http: HttpConfig,

    /// OAuth2 authentication settings.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Per-provider endpoint overrides.
    #[serde(default)]
    pub endpoints: EndpointConfig,

    /// Trace capture settings.
    #[serde(default)]
    pub trace: TraceConfig,
}

/// Settings for upstream HTTP requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Request timeout in seconds for ordinary chat calls.
    /// Default: `120`
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Request timeout in seconds for requests carrying file attachments
    /// or targeting providers that hold long-lived connections.
    /// Default: `600`
    #[serde(default = "default_long_timeout")]
    pub long_timeout_seconds: u64,
}

/// Settings for OAuth2 token lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Number of seconds before expiration at which a token counts as expired.
    /// Default: `300` (5 minutes)
    #[serde(default = "default_refresh_margin")]
    pub refresh_margin_seconds: i64,

    /// Maximum attempts when polling the Code Assist onboarding endpoint.
    /// Default: `20`
    #[serde(default = "default_onboard_attempts")]
    pub onboard_max_attempts: u32,

    /// Delay between onboarding poll attempts, in seconds.
    /// Default: `3`
    #[serde(default = "default_onboard_interval")]
    pub onboard_interval_seconds: u64,
}

/// Base URLs for the vendor APIs. Overridable for testing against mocks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Anthropic Messages API base.
    #[serde(default = "default_claude_base")]
    pub claude_base_url: String,

    /// Anthropic OAuth token endpoint.
    #[serde(default = "default_claude_token_url")]
    pub claude_token_url: String,

    /// OpenAI Responses API base.
    #[serde(default = "default_openai_base")]
    pub openai_base_url: String,

    /// Google Cloud Code internal API base (Gemini CLI variant).
    #[serde(default = "default_code_assist_base")]
    pub code_assist_base_url: String,

    /// Google Cloud Code internal API base (Antigravity variant).
    #[serde(default = "default_antigravity_base")]
    pub antigravity_base_url: String,

    /// Google OAuth2 token endpoint (shared by both Code Assist variants).
    #[serde(default = "default_google_token_url")]
    pub google_token_url: String,
}

/// Settings for the HAR-style trace side channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceConfig {
    /// Cap on captured raw streaming response text, in bytes. The final
    /// in-flight segment is appended even if it crosses the cap.
    /// Default: `524288` (512 KiB)
    #[serde(default = "default_stream_capture_cap")]
    pub stream_capture_cap: usize,
}

// Default trait implementations linking to custom logic

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout(),
            long_timeout_seconds: default_long_timeout(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            refresh_margin_seconds: default_refresh_margin(),
            onboard_max_attempts: default_onboard_attempts(),
            onboard_interval_seconds: default_onboard_interval(),
        }
    }
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            claude_base_url: default_claude_base(),
            claude_token_url: default_claude_token_url(),
            openai_base_url: default_openai_base(),
            code_assist_base_url: default_code_assist_base(),
            antigravity_base_url: default_antigravity_base(),
            google_token_url: default_google_token_url(),
        }
    }
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            stream_capture_cap: default_stream_capture_cap(),
        }
    }
}

// Helper functions for serde defaults and shared constants

fn default_timeout() -> u64 {
    120
}

fn default_long_timeout() -> u64 {
    600
}

fn default_refresh_margin() -> i64 {
    300 // 5 minutes
}

fn default_onboard_attempts() -> u32 {
    20
}

fn default_onboard_interval() -> u64 {
    3
}

fn default_claude_base() -> String {
    "https://api.anthropic.com".to_string()
}

fn default_claude_token_url() -> String {
    "https://console.anthropic.com/v1/oauth/token".to_string()
}

fn default_openai_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_code_assist_base() -> String {
    "https://cloudcode-pa.googleapis.com/v1internal".to_string()
}

fn default_antigravity_base() -> String {
    "https://cloudcode-pa.googleapis.com/v1internal".to_string()
}

fn default_google_token_url() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

fn default_stream_capture_cap() -> usize {
    512 * 1024
}
