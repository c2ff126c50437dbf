// Authentication providers and the OAuth token lifecycle

pub mod pkce;

mod api_key;
mod claude;
mod google;

pub use api_key::ApiKeyAuthProvider;
pub use claude::ClaudeAuthProvider;
pub use google::GoogleAuthProvider;
pub use pkce::PkceCodes;

use crate::error::{CoreError, Result};
use crate::http::Transport;
use crate::models::{AccountIdentity, Credentials, Provider};
use async_trait::async_trait;

/// Injected boundary that gets the user through the browser/redirect flow.
///
/// Takes the authorization URL plus the callback scheme and path the
/// provider expects, and resolves with the full callback URL. The core
/// never embeds a UI.
#[async_trait]
pub trait AuthorizationLauncher: Send + Sync {
    async fn authorize(
        &self,
        authorization_url: &str,
        callback_scheme: &str,
        callback_path: &str,
    ) -> Result<String>;
}

/// One vendor family's authentication lifecycle.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    fn provider(&self) -> Provider;

    /// Whether logging in requires the browser/redirect flow.
    fn interactive(&self) -> bool {
        true
    }

    /// Callback scheme/path this provider registers its redirect URI under.
    fn callback(&self) -> (&str, &str);

    /// Build the authorization URL for the browser step.
    fn authorization_url(&self, codes: &PkceCodes, redirect_uri: &str) -> String;

    /// Exchange the authorization callback for credentials. Must verify the
    /// CSRF state before any token exchange. For Code Assist providers this
    /// also runs project discovery.
    async fn exchange_code(
        &self,
        transport: &dyn Transport,
        callback_url: &str,
        codes: &PkceCodes,
        redirect_uri: &str,
        trace_id: &str,
    ) -> Result<(AccountIdentity, Credentials)>;

    /// Exchange a refresh token for new credentials. When the vendor omits
    /// a new refresh token, the previous one is retained.
    async fn refresh(
        &self,
        transport: &dyn Transport,
        credentials: &Credentials,
        trace_id: &str,
    ) -> Result<Credentials>;
}

/// Extract and CSRF-check the authorization code from a callback URL.
///
/// The code may arrive as `code#state` (inline suffix) or as a plain `code`
/// with a separate `state` query parameter. When both are present, the
/// query parameter wins only if non-empty. Returns the bare code.
pub(crate) fn extract_callback_code(
    callback_url: &str,
    expected_state: &str,
    trace_id: &str,
) -> Result<String> {
    let failed = |message: String| CoreError::AuthenticationFailed {
        message,
        trace_id: trace_id.to_string(),
    };

    let query = callback_url
        .split_once('?')
        .map(|(_, q)| q)
        .unwrap_or_default();
    // Anything after a raw '#' is a URL fragment; keep it attached to the
    // last parameter value so the inline-state form survives.
    let mut code_raw = String::new();
    let mut state_param = String::new();

    for param in query.split('&') {
        if let Some((key, value)) = param.split_once('=') {
            let value = urlencoding::decode(value)
                .map_err(|e| failed(format!("Malformed callback: {}", e)))?
                .into_owned();
            match key {
                "code" => code_raw = value,
                "state" => state_param = value,
                "error" => return Err(failed(format!("Authorization denied: {}", value))),
                _ => {}
            }
        }
    }

    if code_raw.is_empty() {
        return Err(failed("Missing code in callback".to_string()));
    }

    let (code, inline_state) = match code_raw.split_once('#') {
        Some((code, suffix)) => (code.to_string(), suffix.to_string()),
        None => (code_raw, String::new()),
    };

    let returned_state = if !state_param.is_empty() {
        state_param
    } else {
        inline_state
    };

    if returned_state != expected_state {
        return Err(failed("CSRF state mismatch".to_string()));
    }

    Ok(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_code_with_matching_state() {
        let code = extract_callback_code(
            "http://localhost/cb?code=abc123&state=expected",
            "expected",
            "tr",
        )
        .unwrap();
        assert_eq!(code, "abc123");
    }

    #[test]
    fn test_state_mismatch_rejected() {
        let err =
            extract_callback_code("http://localhost/cb?code=abc&state=wrong", "expected", "tr")
                .unwrap_err();
        assert!(err.to_string().contains("state mismatch"));
        assert_eq!(err.trace_id(), Some("tr"));
    }

    #[test]
    fn test_inline_state_suffix() {
        let code =
            extract_callback_code("http://localhost/cb?code=abc%23expected", "expected", "tr")
                .unwrap();
        assert_eq!(code, "abc");
    }

    #[test]
    fn test_nonempty_query_state_wins_over_inline() {
        // Query param carries the real state; the inline suffix is stale.
        let err = extract_callback_code(
            "http://localhost/cb?code=abc%23expected&state=other",
            "expected",
            "tr",
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::AuthenticationFailed { .. }));

        let code = extract_callback_code(
            "http://localhost/cb?code=abc%23stale&state=expected",
            "expected",
            "tr",
        )
        .unwrap();
        assert_eq!(code, "abc");
    }

    #[test]
    fn test_empty_query_state_falls_back_to_inline() {
        let code = extract_callback_code(
            "http://localhost/cb?code=abc%23expected&state=",
            "expected",
            "tr",
        )
        .unwrap();
        assert_eq!(code, "abc");
    }

    #[test]
    fn test_vendor_error_param() {
        let err =
            extract_callback_code("http://localhost/cb?error=access_denied", "expected", "tr")
                .unwrap_err();
        assert!(err.to_string().contains("access_denied"));
    }
}
