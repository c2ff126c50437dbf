// Static API-key authentication
//
// Providers authenticated by a plain key have no browser flow and nothing
// to refresh; this keeps the execution core's auth seam uniform.

use super::{AuthProvider, PkceCodes};
use crate::error::{CoreError, Result};
use crate::http::Transport;
use crate::models::{AccountIdentity, Credentials, Provider};
use async_trait::async_trait;

pub struct ApiKeyAuthProvider {
    provider: Provider,
}

impl ApiKeyAuthProvider {
    pub fn new(provider: Provider) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl AuthProvider for ApiKeyAuthProvider {
    fn provider(&self) -> Provider {
        self.provider
    }

    fn interactive(&self) -> bool {
        false
    }

    fn callback(&self) -> (&str, &str) {
        ("http", "/callback")
    }

    fn authorization_url(&self, _codes: &PkceCodes, _redirect_uri: &str) -> String {
        String::new()
    }

    async fn exchange_code(
        &self,
        _transport: &dyn Transport,
        _callback_url: &str,
        _codes: &PkceCodes,
        _redirect_uri: &str,
        _trace_id: &str,
    ) -> Result<(AccountIdentity, Credentials)> {
        Err(CoreError::Unsupported(format!(
            "{} authenticates with a static API key, not OAuth",
            self.provider
        )))
    }

    async fn refresh(
        &self,
        _transport: &dyn Transport,
        _credentials: &Credentials,
        trace_id: &str,
    ) -> Result<Credentials> {
        Err(CoreError::TokenRefreshFailed {
            status: 0,
            body: "API-key credentials cannot be refreshed".to_string(),
            trace_id: trace_id.to_string(),
        })
    }
}
