//! The single execution path used by both streaming and buffered calls.
//!
//! Classifies transport results, drives the unauthorized-triggered refresh,
//! and retries the original request exactly once with the new bearer token.
//! A second 401 is a hard failure; nothing else is ever silently retried
//! at this layer.

use super::transport::{HttpRequest, HttpResponse, StreamingResponse, Transport};
use crate::auth::AuthProvider;
use crate::error::{CoreError, Result};
use crate::models::{AccountIdentity, Credentials};
use crate::session::AccountSession;
use futures::StreamExt;
use serde_json::Value;
use tracing::{debug, warn};

/// Execute a buffered request, refreshing credentials on the first 401.
///
/// `build` is invoked once per attempt so the retried request carries the
/// refreshed bearer token.
pub async fn execute_with_auth<F>(
    transport: &dyn Transport,
    session: &dyn AccountSession,
    auth: &dyn AuthProvider,
    identity: &AccountIdentity,
    trace_id: &str,
    build: F,
) -> Result<HttpResponse>
where
    F: Fn(&Credentials) -> Result<HttpRequest>,
{
    let credentials = session.get_credentials().await?;
    let response = submit(transport, build(&credentials)?, trace_id).await?;

    if response.status != 401 {
        return classify_response(response, trace_id);
    }

    let refreshed =
        refresh_and_save(transport, session, auth, identity, &credentials, trace_id).await?;
    let retried = submit(transport, build(&refreshed)?, trace_id).await?;

    if retried.status == 401 {
        // Refresh succeeded but the vendor still rejects the token. Stop
        // here rather than loop.
        warn!(trace_id, "request unauthorized after token refresh");
        return Err(CoreError::ApiError {
            status: 401,
            body: retried.text(),
            retry_after: None,
            trace_id: trace_id.to_string(),
        });
    }

    classify_response(retried, trace_id)
}

/// Streaming twin of [`execute_with_auth`]. Non-2xx responses have their
/// body drained and surfaced as errors before any chunk is parsed.
pub async fn execute_stream_with_auth<F>(
    transport: &dyn Transport,
    session: &dyn AccountSession,
    auth: &dyn AuthProvider,
    identity: &AccountIdentity,
    trace_id: &str,
    build: F,
) -> Result<StreamingResponse>
where
    F: Fn(&Credentials) -> Result<HttpRequest>,
{
    let credentials = session.get_credentials().await?;
    let response = submit_stream(transport, build(&credentials)?, trace_id).await?;

    if response.status != 401 {
        return classify_stream(response, trace_id).await;
    }

    // Drop the 401 body stream before refreshing.
    drop(response);

    let refreshed =
        refresh_and_save(transport, session, auth, identity, &credentials, trace_id).await?;
    let retried = submit_stream(transport, build(&refreshed)?, trace_id).await?;

    if retried.status == 401 {
        warn!(trace_id, "stream request unauthorized after token refresh");
        let body = drain(retried).await;
        return Err(CoreError::ApiError {
            status: 401,
            body,
            retry_after: None,
            trace_id: trace_id.to_string(),
        });
    }

    classify_stream(retried, trace_id).await
}

async fn refresh_and_save(
    transport: &dyn Transport,
    session: &dyn AccountSession,
    auth: &dyn AuthProvider,
    identity: &AccountIdentity,
    credentials: &Credentials,
    trace_id: &str,
) -> Result<Credentials> {
    debug!(provider = %identity.provider, trace_id, "received 401, refreshing access token");
    let refreshed = auth.refresh(transport, credentials, trace_id).await?;
    session.save(identity, &refreshed).await?;
    Ok(refreshed)
}

async fn submit(
    transport: &dyn Transport,
    request: HttpRequest,
    trace_id: &str,
) -> Result<HttpResponse> {
    transport
        .execute(request)
        .await
        .map_err(|e| CoreError::NetworkError {
            message: e.message,
            trace_id: trace_id.to_string(),
        })
}

async fn submit_stream(
    transport: &dyn Transport,
    request: HttpRequest,
    trace_id: &str,
) -> Result<StreamingResponse> {
    transport
        .execute_stream(request)
        .await
        .map_err(|e| CoreError::NetworkError {
            message: e.message,
            trace_id: trace_id.to_string(),
        })
}

/// Map a buffered response to `Ok` for 2xx, `ApiError` otherwise.
pub fn classify_response(response: HttpResponse, trace_id: &str) -> Result<HttpResponse> {
    if response.is_success() {
        return Ok(response);
    }

    let body = response.text();
    let retry_after = if response.status == 429 {
        retry_after_hint(response.header("Retry-After"), &body)
    } else {
        None
    };

    Err(CoreError::ApiError {
        status: response.status,
        body,
        retry_after,
        trace_id: trace_id.to_string(),
    })
}

async fn classify_stream(
    response: StreamingResponse,
    trace_id: &str,
) -> Result<StreamingResponse> {
    if response.is_success() {
        return Ok(response);
    }

    let status = response.status;
    let retry_after_header = response
        .header("Retry-After")
        .map(|v| v.to_string());
    let body = drain(response).await;
    let retry_after = if status == 429 {
        retry_after_hint(retry_after_header.as_deref(), &body)
    } else {
        None
    };

    Err(CoreError::ApiError {
        status,
        body,
        retry_after,
        trace_id: trace_id.to_string(),
    })
}

/// Collect an error-response body, bounded so a misbehaving vendor cannot
/// buffer unboundedly.
async fn drain(mut response: StreamingResponse) -> String {
    const MAX_ERROR_BODY: usize = 64 * 1024;
    let mut body = Vec::new();
    while let Some(Ok(chunk)) = response.stream.next().await {
        body.extend_from_slice(&chunk);
        if body.len() >= MAX_ERROR_BODY {
            break;
        }
    }
    String::from_utf8_lossy(&body).into_owned()
}

/// Retry-After hint for 429s: prefer the header, fall back to Google's
/// RetryInfo detail embedded in the error body.
fn retry_after_hint(header: Option<&str>, body: &str) -> Option<u64> {
    if let Some(seconds) = header.and_then(|v| v.trim().parse::<u64>().ok()) {
        return Some(seconds);
    }
    parse_retry_delay(body)
}

/// Parse Google's retryDelay duration string (e.g., "0.457639761s", "40s")
/// from `error.details[]` of a JSON error body. Returns whole seconds,
/// capped at 60.
fn parse_retry_delay(error_json: &str) -> Option<u64> {
    let parsed: Value = serde_json::from_str(error_json).ok()?;
    let details = parsed.get("error")?.get("details")?.as_array()?;

    for detail in details {
        if detail.get("@type")?.as_str()? == "type.googleapis.com/google.rpc.RetryInfo" {
            if let Some(delay) = detail.get("retryDelay").and_then(|v| v.as_str()) {
                let seconds: f64 = delay.strip_suffix('s')?.parse().ok()?;
                return Some(seconds.min(60.0).ceil() as u64);
            }
        }
    }

    None
}
