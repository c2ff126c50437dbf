// Login and token lifecycle flows against a scripted transport.

mod support;

use std::sync::Arc;
use support::{fresh_credentials, CollectingSink, EchoLauncher, MemorySession, MockTransport, Scripted, TamperedLauncher};
use unichat::config::ClientConfig;
use unichat::models::Credentials;
use unichat::{AccountIdentity, ChatClient, CoreError, Provider};

fn client_with_launcher(
    provider: Provider,
    transport: Arc<MockTransport>,
    session: Arc<MemorySession>,
    launcher: Arc<dyn unichat::auth::AuthorizationLauncher>,
    config: ClientConfig,
) -> ChatClient {
    ChatClient::new(
        AccountIdentity::new(provider),
        config,
        transport,
        session,
        launcher,
        Arc::new(CollectingSink::new()),
    )
}

#[tokio::test]
async fn claude_login_exchanges_code_and_persists_account() {
    let transport = Arc::new(MockTransport::new(vec![Scripted::Buffered {
        status: 200,
        body: r#"{"access_token":"at-1","refresh_token":"rt-1","expires_in":3600,"account":{"email_address":"dev@example.com"},"organization":{"name":"Example Org"}}"#,
    }]));
    let session = Arc::new(MemorySession::new(Credentials::default()));
    let mut client = client_with_launcher(
        Provider::Claude,
        transport.clone(),
        session.clone(),
        Arc::new(EchoLauncher { code: "authcode" }),
        ClientConfig::default(),
    );

    let identity = client.login().await.unwrap();

    assert_eq!(identity.identifier.as_deref(), Some("dev@example.com"));
    assert_eq!(identity.display_name.as_deref(), Some("Example Org"));
    assert_eq!(session.save_count(), 1);
    assert_eq!(session.current().access_token.as_deref(), Some("at-1"));
    assert_eq!(session.current().refresh_token.as_deref(), Some("rt-1"));

    // The exchange carried the PKCE verifier, not the challenge.
    let body = String::from_utf8(transport.request(0).body.unwrap()).unwrap();
    assert!(body.contains("code_verifier"));
    assert!(body.contains("\"code\":\"authcode\""));
}

#[tokio::test]
async fn tampered_state_fails_before_token_exchange() {
    let transport = Arc::new(MockTransport::new(Vec::new()));
    let session = Arc::new(MemorySession::new(Credentials::default()));
    let mut client = client_with_launcher(
        Provider::Claude,
        transport.clone(),
        session.clone(),
        Arc::new(TamperedLauncher),
        ClientConfig::default(),
    );

    let err = client.login().await.unwrap_err();

    assert!(matches!(err, CoreError::AuthenticationFailed { .. }));
    assert!(err.to_string().contains("state mismatch"));
    assert!(err.trace_id().is_some());
    // The CSRF rejection happens before any network traffic.
    assert_eq!(transport.request_count(), 0);
    assert_eq!(session.save_count(), 0);
}

#[tokio::test]
async fn google_login_onboards_account_without_project() {
    let transport = Arc::new(MockTransport::new(vec![
        Scripted::Buffered {
            status: 200,
            body: r#"{"access_token":"ya29.tok","refresh_token":"1//rt","expires_in":3600}"#,
        },
        // No project provisioned yet: default tier, then poll until done.
        Scripted::Buffered {
            status: 200,
            body: r#"{"allowedTiers":[{"id":"legacy-tier","isDefault":false},{"id":"free-tier","isDefault":true}]}"#,
        },
        Scripted::Buffered {
            status: 200,
            body: r#"{"done":false}"#,
        },
        Scripted::Buffered {
            status: 200,
            body: r#"{"done":true,"response":{"cloudaicompanionProject":{"id":"proj-9"}}}"#,
        },
    ]));
    let session = Arc::new(MemorySession::new(Credentials::default()));
    let mut config = ClientConfig::default();
    config.auth.onboard_interval_seconds = 0;
    let mut client = client_with_launcher(
        Provider::GeminiCli,
        transport.clone(),
        session.clone(),
        Arc::new(EchoLauncher { code: "gcode" }),
        config,
    );

    let identity = client.login().await.unwrap();

    assert_eq!(identity.project_id(), Some("proj-9"));
    assert_eq!(transport.request_count(), 4);
    assert!(transport.request(1).url.ends_with(":loadCodeAssist"));
    assert!(transport.request(2).url.ends_with(":onboardUser"));
    assert_eq!(session.current().access_token.as_deref(), Some("ya29.tok"));
}

#[tokio::test]
async fn google_login_uses_existing_project() {
    let transport = Arc::new(MockTransport::new(vec![
        Scripted::Buffered {
            status: 200,
            body: r#"{"access_token":"ya29.tok","refresh_token":"1//rt","expires_in":3600}"#,
        },
        Scripted::Buffered {
            status: 200,
            body: r#"{"cloudaicompanionProject":"proj-existing","allowedTiers":[]}"#,
        },
    ]));
    let session = Arc::new(MemorySession::new(Credentials::default()));
    let mut client = client_with_launcher(
        Provider::GeminiCli,
        transport.clone(),
        session.clone(),
        Arc::new(EchoLauncher { code: "gcode" }),
        ClientConfig::default(),
    );

    let identity = client.login().await.unwrap();
    assert_eq!(identity.project_id(), Some("proj-existing"));
    assert_eq!(transport.request_count(), 2);
}

#[tokio::test]
async fn refresh_persists_new_credentials_and_keeps_refresh_token() {
    let transport = Arc::new(MockTransport::new(vec![Scripted::Buffered {
        status: 200,
        // Vendor omits the refresh token on rotation.
        body: r#"{"access_token":"at-2","expires_in":3600}"#,
    }]));
    let session = Arc::new(MemorySession::new(fresh_credentials("at-1", "rt-1")));
    let client = client_with_launcher(
        Provider::Claude,
        transport.clone(),
        session.clone(),
        Arc::new(EchoLauncher { code: "unused" }),
        ClientConfig::default(),
    );

    let refreshed = client.refresh().await.unwrap();

    assert_eq!(refreshed.access_token.as_deref(), Some("at-2"));
    assert_eq!(refreshed.refresh_token.as_deref(), Some("rt-1"));
    assert_eq!(session.save_count(), 1);
}

#[tokio::test]
async fn failed_refresh_surfaces_status_and_body() {
    let transport = Arc::new(MockTransport::new(vec![Scripted::Buffered {
        status: 400,
        body: r#"{"error":"invalid_grant"}"#,
    }]));
    let session = Arc::new(MemorySession::new(fresh_credentials("at-1", "rt-1")));
    let client = client_with_launcher(
        Provider::Claude,
        transport,
        session.clone(),
        Arc::new(EchoLauncher { code: "unused" }),
        ClientConfig::default(),
    );

    let err = client.refresh().await.unwrap_err();
    match err {
        CoreError::TokenRefreshFailed { status, body, trace_id } => {
            assert_eq!(status, 400);
            assert!(body.contains("invalid_grant"));
            assert!(!trace_id.is_empty());
        }
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(session.save_count(), 0);
}

#[tokio::test]
async fn api_key_provider_has_no_interactive_login() {
    let transport = Arc::new(MockTransport::new(Vec::new()));
    let session = Arc::new(MemorySession::new(Credentials {
        api_key: Some("sk-test".to_string()),
        ..Default::default()
    }));
    let mut client = client_with_launcher(
        Provider::OpenAi,
        transport.clone(),
        session,
        Arc::new(EchoLauncher { code: "unused" }),
        ClientConfig::default(),
    );

    let err = client.login().await.unwrap_err();
    assert!(matches!(err, CoreError::Unsupported(_)));
    assert_eq!(transport.request_count(), 0);
}
