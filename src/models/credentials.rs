//! Credential and account-identity value objects.
//!
//! These are transient: the core reads them from and writes them back
//! through the external session collaborator, and never caches them
//! across logical calls.

use super::Provider;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Credential set for one provider account.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Credentials {
    /// Static API key, for providers authenticated without OAuth.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Unix epoch milliseconds when the access token expires.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
}

impl Credentials {
    /// Whether the access token is expired or within `margin_seconds` of
    /// expiring. API-key-only credential sets (no expiry) never expire.
    pub fn is_expired(&self, margin_seconds: i64) -> bool {
        match self.expires_at {
            Some(expires_at) => {
                let now_ms = chrono::Utc::now().timestamp_millis();
                expires_at - margin_seconds * 1000 <= now_ms
            }
            None => false,
        }
    }

    /// Bearer token for request headers: the access token when present,
    /// otherwise the API key.
    pub fn bearer(&self) -> Option<&str> {
        self.access_token
            .as_deref()
            .or(self.api_key.as_deref())
    }
}

/// Identity of the authenticated account, plus vendor-specific extras the
/// core does not need typed fields for (`project_id`, `client_secret`, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountIdentity {
    pub provider: Provider,

    /// Email address or organization id, when the vendor reports one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl AccountIdentity {
    pub fn new(provider: Provider) -> Self {
        Self {
            provider,
            identifier: None,
            display_name: None,
            metadata: HashMap::new(),
        }
    }

    /// Cloud project id discovered during Code Assist onboarding, if any.
    pub fn project_id(&self) -> Option<&str> {
        self.metadata.get("project_id").map(|s| s.as_str())
    }
}
