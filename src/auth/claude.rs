// PKCE-family authentication for the Claude Code OAuth API

use super::{extract_callback_code, AuthProvider, PkceCodes};
use crate::config::ClientConfig;
use crate::error::{CoreError, Result};
use crate::http::{HttpRequest, Transport};
use crate::models::{AccountIdentity, Credentials, Provider};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

/// Public client id of the Claude Code installed-app flow.
const CLIENT_ID: &str = "9d1c250a-e61b-44d9-88ed-5944d1962f5e";

const AUTHORIZE_URL: &str = "https://claude.ai/oauth/authorize";

/// Scopes required for chat inference plus profile lookup.
const SCOPES: &str = "org:create_api_key user:profile user:inference";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    account: Option<TokenAccount>,
    organization: Option<TokenOrganization>,
}

#[derive(Debug, Deserialize)]
struct TokenAccount {
    email_address: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenOrganization {
    name: Option<String>,
}

/// PKCE + authorization-code provider for the Claude API.
pub struct ClaudeAuthProvider {
    token_url: String,
}

impl ClaudeAuthProvider {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            token_url: config.endpoints.claude_token_url.clone(),
        }
    }

    fn credentials_from(&self, token: TokenResponse, previous_refresh: Option<&str>) -> Credentials {
        let expires_at = chrono::Utc::now().timestamp_millis()
            + token.expires_in.unwrap_or(3600) * 1000;

        Credentials {
            api_key: None,
            access_token: Some(token.access_token),
            // The vendor may omit the refresh token on rotation; keep the
            // one we already hold.
            refresh_token: token
                .refresh_token
                .or_else(|| previous_refresh.map(|s| s.to_string())),
            expires_at: Some(expires_at),
        }
    }
}

#[async_trait]
impl AuthProvider for ClaudeAuthProvider {
    fn provider(&self) -> Provider {
        Provider::Claude
    }

    fn callback(&self) -> (&str, &str) {
        ("http", "/callback")
    }

    fn authorization_url(&self, codes: &PkceCodes, redirect_uri: &str) -> String {
        format!(
            "{}?code=true&client_id={}&response_type=code&redirect_uri={}&scope={}&state={}&code_challenge={}&code_challenge_method=S256",
            AUTHORIZE_URL,
            urlencoding::encode(CLIENT_ID),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(SCOPES),
            urlencoding::encode(&codes.state),
            urlencoding::encode(&codes.challenge),
        )
    }

    async fn exchange_code(
        &self,
        transport: &dyn Transport,
        callback_url: &str,
        codes: &PkceCodes,
        redirect_uri: &str,
        trace_id: &str,
    ) -> Result<(AccountIdentity, Credentials)> {
        let failed = |message: String| CoreError::AuthenticationFailed {
            message,
            trace_id: trace_id.to_string(),
        };

        // CSRF check happens here, before any token exchange.
        let code = extract_callback_code(callback_url, &codes.state, trace_id)?;

        debug!("exchanging authorization code for tokens");

        let request = HttpRequest::post(&self.token_url).json(&json!({
            "grant_type": "authorization_code",
            "code": code,
            "state": codes.state,
            "client_id": CLIENT_ID,
            "redirect_uri": redirect_uri,
            "code_verifier": codes.verifier,
        }));

        let response = transport
            .execute(request)
            .await
            .map_err(|e| failed(format!("Token request failed: {}", e)))?;

        if !response.is_success() {
            return Err(failed(format!(
                "Token exchange failed: HTTP {}: {}",
                response.status,
                response.text()
            )));
        }

        let token: TokenResponse = response
            .json()
            .map_err(|e| failed(format!("Malformed token response: {}", e)))?;

        let mut identity = AccountIdentity::new(Provider::Claude);
        identity.identifier = token
            .account
            .as_ref()
            .and_then(|a| a.email_address.clone());
        identity.display_name = token.organization.as_ref().and_then(|o| o.name.clone());

        let credentials = self.credentials_from(token, None);
        info!("claude login complete");

        Ok((identity, credentials))
    }

    async fn refresh(
        &self,
        transport: &dyn Transport,
        credentials: &Credentials,
        trace_id: &str,
    ) -> Result<Credentials> {
        let failed = |status: u16, body: String| CoreError::TokenRefreshFailed {
            status,
            body,
            trace_id: trace_id.to_string(),
        };

        let refresh_token = credentials
            .refresh_token
            .as_deref()
            .ok_or_else(|| failed(0, "no refresh token held".to_string()))?;

        debug!("refreshing claude access token");

        let request = HttpRequest::post(&self.token_url).json(&json!({
            "grant_type": "refresh_token",
            "refresh_token": refresh_token,
            "client_id": CLIENT_ID,
        }));

        let response = transport
            .execute(request)
            .await
            .map_err(|e| failed(0, format!("Refresh request failed: {}", e)))?;

        if !response.is_success() {
            return Err(failed(response.status, response.text()));
        }

        let token: TokenResponse = response
            .json()
            .map_err(|e| failed(0, format!("Malformed refresh response: {}", e)))?;

        Ok(self.credentials_from(token, credentials.refresh_token.as_deref()))
    }
}
