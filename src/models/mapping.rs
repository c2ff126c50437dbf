// Provider dialects and model-family grouping

use serde::{Deserialize, Serialize};

/// The closed set of vendor dialects the core speaks.
///
/// Adding a vendor means adding a variant here plus its auth provider,
/// translator, and stream parser; dispatch everywhere else is by this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    /// Anthropic API via the PKCE OAuth flow.
    Claude,
    /// OpenAI-style Responses API.
    OpenAi,
    /// Google Cloud Code Assist, Gemini CLI variant.
    GeminiCli,
    /// Google Cloud Code Assist, Antigravity variant.
    Antigravity,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Claude => "claude",
            Provider::OpenAi => "openai",
            Provider::GeminiCli => "gemini_cli",
            Provider::Antigravity => "antigravity",
        }
    }

    /// Whether the vendor exposes a buffered (non-streaming) endpoint.
    /// The Antigravity dialect is stream-only.
    pub fn supports_non_streaming(&self) -> bool {
        !matches!(self, Provider::Antigravity)
    }

    /// Whether the vendor holds long-lived connections and therefore gets
    /// the extended request timeout.
    pub fn long_lived_connections(&self) -> bool {
        matches!(self, Provider::Antigravity)
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse model-family bucket used for thought-signature cache keying.
///
/// All Gemini variants share one bucket, all Claude variants another.
/// Unrecognized names map to `"unknown"` and never share cache entries
/// with either family.
pub fn model_group(model: &str) -> &'static str {
    let lower = model.to_ascii_lowercase();
    if lower.starts_with("gemini") || lower.contains("-gemini-") {
        "gemini"
    } else if lower.starts_with("claude") {
        "claude"
    } else {
        "unknown"
    }
}
