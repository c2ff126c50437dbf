// Client-secret family authentication for the Google Code Assist variants
//
// No PKCE here: the token exchange uses the fixed installed-app client
// secret, which is not confidential (documented Google pattern for
// installed applications). After the exchange a cloud project id must be
// discovered via loadCodeAssist, onboarding the account when none is
// provisioned yet.

use super::{extract_callback_code, AuthProvider, PkceCodes};
use crate::config::ClientConfig;
use crate::error::{CoreError, Result};
use crate::http::{HttpRequest, Transport};
use crate::models::{AccountIdentity, Credentials, Provider};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Public Client ID for the Gemini CLI installed-app flow.
const OAUTH_CLIENT_ID: &str =
    "681255809395-oo8ft2oprdrnp9e3aqf6av3hmdib135j.apps.googleusercontent.com";

/// Public Client Secret for the Gemini CLI. Both Code Assist variants share
/// the same installed-app client.
const OAUTH_CLIENT_SECRET: &str = "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";

const AUTHORIZE_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";

/// OAuth scopes required for Cloud Code API access.
const OAUTH_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/cloud-platform",
    "https://www.googleapis.com/auth/userinfo.email",
    "https://www.googleapis.com/auth/userinfo.profile",
];

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoadCodeAssistResponse {
    cloudaicompanion_project: Option<String>,
    #[serde(default)]
    allowed_tiers: Vec<Tier>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Tier {
    id: Option<String>,
    #[serde(default)]
    is_default: bool,
}

/// Authentication provider for both Code Assist dialects.
pub struct GoogleAuthProvider {
    variant: Provider,
    token_url: String,
    api_base_url: String,
    onboard_max_attempts: u32,
    onboard_interval: Duration,
}

impl GoogleAuthProvider {
    pub fn new(variant: Provider, config: &ClientConfig) -> Self {
        debug_assert!(matches!(
            variant,
            Provider::GeminiCli | Provider::Antigravity
        ));
        let api_base_url = match variant {
            Provider::Antigravity => config.endpoints.antigravity_base_url.clone(),
            _ => config.endpoints.code_assist_base_url.clone(),
        };
        Self {
            variant,
            token_url: config.endpoints.google_token_url.clone(),
            api_base_url,
            onboard_max_attempts: config.auth.onboard_max_attempts,
            onboard_interval: Duration::from_secs(config.auth.onboard_interval_seconds),
        }
    }

    fn client_metadata(&self) -> Value {
        let plugin_type = match self.variant {
            Provider::Antigravity => "ANTIGRAVITY",
            _ => "GEMINI",
        };
        json!({
            "ideType": "IDE_UNSPECIFIED",
            "platform": "PLATFORM_UNSPECIFIED",
            "pluginType": plugin_type,
        })
    }

    /// Resolve the Cloud AI Companion project for this account, onboarding
    /// it onto the default tier when none is provisioned yet.
    async fn discover_project(
        &self,
        transport: &dyn Transport,
        access_token: &str,
        trace_id: &str,
    ) -> Result<String> {
        let url = format!("{}:loadCodeAssist", self.api_base_url);
        debug!(%url, "resolving project id");

        let request = HttpRequest::post(&url)
            .bearer(access_token)
            .json(&json!({ "metadata": self.client_metadata() }));

        let response = transport
            .execute(request)
            .await
            .map_err(|e| CoreError::NetworkError {
                message: e.message,
                trace_id: trace_id.to_string(),
            })?;

        if !response.is_success() {
            return Err(CoreError::ApiError {
                status: response.status,
                body: response.text(),
                retry_after: None,
                trace_id: trace_id.to_string(),
            });
        }

        let load: LoadCodeAssistResponse = response.json().map_err(|e| {
            CoreError::InvalidResponse(format!("Malformed loadCodeAssist response: {}", e))
        })?;

        if let Some(project) = load.cloudaicompanion_project {
            info!("project already provisioned");
            return Ok(project);
        }

        // No project yet: onboard onto the default tier and poll until done.
        let tier_id = load
            .allowed_tiers
            .iter()
            .find(|t| t.is_default)
            .and_then(|t| t.id.clone())
            .unwrap_or_else(|| "free-tier".to_string());

        self.onboard(transport, access_token, &tier_id, trace_id)
            .await
    }

    async fn onboard(
        &self,
        transport: &dyn Transport,
        access_token: &str,
        tier_id: &str,
        trace_id: &str,
    ) -> Result<String> {
        let url = format!("{}:onboardUser", self.api_base_url);
        info!(tier_id, "onboarding account");

        let body = json!({
            "tierId": tier_id,
            "metadata": self.client_metadata(),
        });

        for attempt in 1..=self.onboard_max_attempts {
            let request = HttpRequest::post(&url).bearer(access_token).json(&body);
            let response =
                transport
                    .execute(request)
                    .await
                    .map_err(|e| CoreError::NetworkError {
                        message: e.message,
                        trace_id: trace_id.to_string(),
                    })?;

            if !response.is_success() {
                return Err(CoreError::ApiError {
                    status: response.status,
                    body: response.text(),
                    retry_after: None,
                    trace_id: trace_id.to_string(),
                });
            }

            let operation: Value = response.json().map_err(|e| {
                CoreError::InvalidResponse(format!("Malformed onboardUser response: {}", e))
            })?;

            if operation.get("done").and_then(|v| v.as_bool()) == Some(true) {
                return extract_project_id(&operation);
            }

            debug!(attempt, "onboarding not complete yet");
            if attempt < self.onboard_max_attempts {
                tokio::time::sleep(self.onboard_interval).await;
            }
        }

        warn!("onboarding polling exhausted");
        Err(CoreError::ApiError {
            status: 0,
            body: format!(
                "Onboarding did not complete after {} attempts",
                self.onboard_max_attempts
            ),
            retry_after: None,
            trace_id: trace_id.to_string(),
        })
    }

    fn credentials_from(&self, token: TokenResponse, previous_refresh: Option<&str>) -> Credentials {
        let expires_at =
            chrono::Utc::now().timestamp_millis() + token.expires_in.unwrap_or(3600) * 1000;

        Credentials {
            api_key: None,
            access_token: Some(token.access_token),
            refresh_token: token
                .refresh_token
                .or_else(|| previous_refresh.map(|s| s.to_string())),
            expires_at: Some(expires_at),
        }
    }
}

/// Project id from a completed onboarding operation: accepts either a bare
/// string or an object with an `id` field.
fn extract_project_id(operation: &Value) -> Result<String> {
    let project = operation
        .get("response")
        .and_then(|r| r.get("cloudaicompanionProject"));

    match project {
        Some(Value::String(id)) => Ok(id.clone()),
        Some(Value::Object(obj)) => obj
            .get("id")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| {
                CoreError::InvalidResponse(
                    "Onboarding response project object missing id".to_string(),
                )
            }),
        _ => Err(CoreError::InvalidResponse(
            "Onboarding response missing cloudaicompanionProject".to_string(),
        )),
    }
}

#[async_trait]
impl AuthProvider for GoogleAuthProvider {
    fn provider(&self) -> Provider {
        self.variant
    }

    fn callback(&self) -> (&str, &str) {
        ("http", "/oauth2callback")
    }

    fn authorization_url(&self, codes: &PkceCodes, redirect_uri: &str) -> String {
        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&access_type=offline&prompt=consent&state={}",
            AUTHORIZE_URL,
            urlencoding::encode(OAUTH_CLIENT_ID),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(&OAUTH_SCOPES.join(" ")),
            urlencoding::encode(&codes.state),
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

        let code = extract_callback_code(callback_url, &codes.state, trace_id)?;

        debug!("exchanging authorization code for tokens");

        let request = HttpRequest::post(&self.token_url).form(&[
            ("client_id", OAUTH_CLIENT_ID),
            ("client_secret", OAUTH_CLIENT_SECRET),
            ("code", &code),
            ("redirect_uri", redirect_uri),
            ("grant_type", "authorization_code"),
        ]);

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

        let credentials = self.credentials_from(token, None);

        let access_token = credentials
            .access_token
            .as_deref()
            .unwrap_or_default()
            .to_string();
        let project_id = self
            .discover_project(transport, &access_token, trace_id)
            .await?;

        let mut identity = AccountIdentity::new(self.variant);
        identity
            .metadata
            .insert("project_id".to_string(), project_id);

        info!(provider = %self.variant, "login complete");
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

        debug!(provider = %self.variant, "refreshing access token");

        let request = HttpRequest::post(&self.token_url).form(&[
            ("client_id", OAUTH_CLIENT_ID),
            ("client_secret", OAUTH_CLIENT_SECRET),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ]);

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
