// The chat orchestrator
//
// Resolves the auth/translator/parser triple for a provider, drives the
// execution core, and exposes the caller-facing operations: `chat`,
// `chat_stream`, `chat_non_stream`, `login`, `refresh`.

use crate::auth::{
    pkce, ApiKeyAuthProvider, AuthProvider, AuthorizationLauncher, ClaudeAuthProvider,
    GoogleAuthProvider,
};
use crate::config::{ClientConfig, HttpConfig};
use crate::error::{CoreError, Result};
use crate::http::{
    execute_stream_with_auth, execute_with_auth, HttpRequest, Transport,
};
use crate::models::{
    AccountIdentity, ChatChunk, ChatOptions, Credentials, Message, PartType, Provider,
    ResponsePart, UnifiedResponse,
};
use crate::session::{AccountSession, SignatureCache};
use crate::streaming::{
    aggregate_chunks, ClaudeStreamParser, GoogleStreamParser, SseDecoder, StreamParser,
};
use crate::trace::{redact_headers, redact_json, StreamCapture, TraceHttp, TraceRecord, TraceSink};
use crate::translation::{
    BuiltRequest, ClaudeTranslator, GeminiTranslator, RequestTranslator, ResponsesTranslator,
};
use async_stream::try_stream;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use futures::stream::Stream;
use futures::StreamExt;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};
use uuid::Uuid;

/// Port the loopback redirect listener is expected on during login.
const CALLBACK_PORT: u16 = 54545;

/// A finite, ordered stream of chunks for one chat call.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<ChatChunk>> + Send>>;

/// The façade over one provider account.
///
/// All I/O boundaries are injected: the HTTP transport, the credential
/// store, the authorization launcher, and the trace sink. The thought
/// signature cache is owned here and shared with the translators and
/// parsers, so separate clients never share reasoning state.
pub struct ChatClient {
    provider: Provider,
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    session: Arc<dyn AccountSession>,
    launcher: Arc<dyn AuthorizationLauncher>,
    trace: Arc<dyn TraceSink>,
    signatures: Arc<SignatureCache>,
    auth: Arc<dyn AuthProvider>,
    translator: Arc<dyn RequestTranslator>,
    identity: AccountIdentity,
}

impl ChatClient {
    pub fn new(
        identity: AccountIdentity,
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        session: Arc<dyn AccountSession>,
        launcher: Arc<dyn AuthorizationLauncher>,
        trace: Arc<dyn TraceSink>,
    ) -> Self {
        let provider = identity.provider;
        let signatures = Arc::new(SignatureCache::new());

        let translator: Arc<dyn RequestTranslator> = match provider {
            Provider::Claude => Arc::new(ClaudeTranslator::new(&config, signatures.clone())),
            Provider::OpenAi => Arc::new(ResponsesTranslator::new(&config, signatures.clone())),
            Provider::GeminiCli | Provider::Antigravity => {
                Arc::new(GeminiTranslator::new(provider, &config, signatures.clone()))
            }
        };

        let auth: Arc<dyn AuthProvider> = match provider {
            Provider::Claude => Arc::new(ClaudeAuthProvider::new(&config)),
            Provider::OpenAi => Arc::new(ApiKeyAuthProvider::new(provider)),
            Provider::GeminiCli | Provider::Antigravity => {
                Arc::new(GoogleAuthProvider::new(provider, &config))
            }
        };

        Self {
            provider,
            config,
            transport,
            session,
            launcher,
            trace,
            signatures,
            auth,
            translator,
            identity,
        }
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    pub fn identity(&self) -> &AccountIdentity {
        &self.identity
    }

    /// Complete a chat exchange, streaming internally and folding the
    /// chunks into one response. Works against every provider, including
    /// stream-only ones.
    pub async fn chat(
        &self,
        model: &str,
        messages: &[Message],
        options: &ChatOptions,
    ) -> Result<UnifiedResponse> {
        let mut stream = self.stream_with_method("chat", model, messages, options);
        let mut chunks = Vec::new();
        while let Some(chunk) = stream.next().await {
            chunks.push(chunk?);
        }
        aggregate_chunks(&chunks)
    }

    /// Stream a chat exchange chunk by chunk. Dropping the returned stream
    /// cancels the underlying request.
    pub fn chat_stream(
        &self,
        model: &str,
        messages: &[Message],
        options: &ChatOptions,
    ) -> ChunkStream {
        self.stream_with_method("chat_stream", model, messages, options)
    }

    /// Call the vendor's buffered endpoint. Fails fast for providers that
    /// only stream.
    pub async fn chat_non_stream(
        &self,
        model: &str,
        messages: &[Message],
        options: &ChatOptions,
    ) -> Result<UnifiedResponse> {
        if !self.provider.supports_non_streaming() {
            return Err(CoreError::Unsupported(format!(
                "{} does not support non-streaming chat",
                self.provider
            )));
        }

        let trace_id = new_trace_id();
        let started = Instant::now();
        self.ensure_fresh(&trace_id).await?;

        let built =
            self.translator
                .build(model, messages, options, self.identity.project_id(), false)?;
        let request_http = request_trace(&built);

        let result = execute_with_auth(
            self.transport.as_ref(),
            self.session.as_ref(),
            self.auth.as_ref(),
            &self.identity,
            &trace_id,
            |credentials| {
                wire_request(&built, credentials, self.provider, &self.config.http, &trace_id)
            },
        )
        .await;

        let (response_trace, outcome) = match result {
            Ok(response) => {
                let headers = redact_headers(&response.headers);
                match response.json::<serde_json::Value>() {
                    Ok(body) => (
                        TraceHttp {
                            url: built.url.clone(),
                            headers,
                            body: redact_json(&body).to_string(),
                            status: Some(response.status),
                        },
                        self.translator.parse_response(model, &body),
                    ),
                    Err(e) => (
                        TraceHttp {
                            url: built.url.clone(),
                            headers,
                            body: response.text(),
                            status: Some(response.status),
                        },
                        Err(CoreError::InvalidResponse(format!(
                            "Malformed response body: {e}"
                        ))),
                    ),
                }
            }
            Err(e) => (
                TraceHttp {
                    url: built.url.clone(),
                    ..Default::default()
                },
                Err(e),
            ),
        };

        self.trace.record(TraceRecord {
            trace_id,
            provider: self.provider,
            account: self.identity.identifier.clone(),
            method: "chat_non_stream".to_string(),
            request: request_http,
            response: response_trace,
            duration_ms: started.elapsed().as_millis() as u64,
            error: outcome.as_ref().err().map(|e| e.to_string()),
        });

        outcome
    }

    /// Run the interactive OAuth flow and persist the resulting account.
    pub async fn login(&mut self) -> Result<AccountIdentity> {
        if !self.auth.interactive() {
            return Err(CoreError::Unsupported(format!(
                "{} does not use an interactive login flow",
                self.provider
            )));
        }

        let trace_id = new_trace_id();
        let started = Instant::now();
        let codes = pkce::generate();
        let (scheme, path) = self.auth.callback();
        let redirect_uri = format!("{}://localhost:{}{}", scheme, CALLBACK_PORT, path);
        let authorization_url = self.auth.authorization_url(&codes, &redirect_uri);

        debug!(provider = %self.provider, "launching authorization flow");
        let callback_url = self
            .launcher
            .authorize(&authorization_url, scheme, path)
            .await?;

        let result = self
            .auth
            .exchange_code(
                self.transport.as_ref(),
                &callback_url,
                &codes,
                &redirect_uri,
                &trace_id,
            )
            .await;

        self.trace.record(TraceRecord {
            trace_id,
            provider: self.provider,
            account: result.as_ref().ok().and_then(|(i, _)| i.identifier.clone()),
            method: "login".to_string(),
            request: TraceHttp {
                url: authorization_url,
                ..Default::default()
            },
            response: TraceHttp::default(),
            duration_ms: started.elapsed().as_millis() as u64,
            error: result.as_ref().err().map(|e| e.to_string()),
        });

        let (identity, credentials) = result?;
        self.session.save(&identity, &credentials).await?;
        info!(provider = %self.provider, "login complete");
        self.identity = identity.clone();
        Ok(identity)
    }

    /// Force a token refresh and persist the new credentials.
    pub async fn refresh(&self) -> Result<Credentials> {
        let trace_id = new_trace_id();
        let credentials = self.session.get_credentials().await?;
        let refreshed = self
            .auth
            .refresh(self.transport.as_ref(), &credentials, &trace_id)
            .await?;
        self.session.save(&self.identity, &refreshed).await?;
        Ok(refreshed)
    }

    /// Refresh proactively when the stored token is inside the expiry
    /// margin, so most calls never see a 401 at all.
    async fn ensure_fresh(&self, trace_id: &str) -> Result<()> {
        let credentials = self.session.get_credentials().await?;
        if credentials.is_expired(self.config.auth.refresh_margin_seconds)
            && credentials.refresh_token.is_some()
        {
            debug!(provider = %self.provider, trace_id, "token inside expiry margin, refreshing");
            let refreshed = self
                .auth
                .refresh(self.transport.as_ref(), &credentials, trace_id)
                .await?;
            self.session.save(&self.identity, &refreshed).await?;
        }
        Ok(())
    }

    fn stream_with_method(
        &self,
        method: &'static str,
        model: &str,
        messages: &[Message],
        options: &ChatOptions,
    ) -> ChunkStream {
        let provider = self.provider;
        let translator = self.translator.clone();
        let transport = self.transport.clone();
        let session = self.session.clone();
        let auth = self.auth.clone();
        let trace = self.trace.clone();
        let signatures = self.signatures.clone();
        let identity = self.identity.clone();
        let http = self.config.http.clone();
        let refresh_margin = self.config.auth.refresh_margin_seconds;
        let capture_cap = self.config.trace.stream_capture_cap;
        let model = model.to_string();
        let messages = messages.to_vec();
        let options = options.clone();

        Box::pin(try_stream! {
            let trace_id = new_trace_id();
            let started = Instant::now();

            let stored = session.get_credentials().await?;
            if stored.is_expired(refresh_margin) && stored.refresh_token.is_some() {
                let refreshed = auth.refresh(transport.as_ref(), &stored, &trace_id).await?;
                session.save(&identity, &refreshed).await?;
            }

            // The Responses dialect has no incremental parser; satisfy the
            // stream from the buffered endpoint instead.
            if provider == Provider::OpenAi {
                let built = translator.build(
                    &model, &messages, &options, identity.project_id(), false,
                )?;
                let request_http = request_trace(&built);
                let result = execute_with_auth(
                    transport.as_ref(),
                    session.as_ref(),
                    auth.as_ref(),
                    &identity,
                    &trace_id,
                    |credentials| wire_request(&built, credentials, provider, &http, &trace_id),
                )
                .await;

                let outcome = match result {
                    Ok(response) => serde_json::from_slice::<serde_json::Value>(&response.body)
                        .map_err(|e| {
                            CoreError::InvalidResponse(format!("Malformed response body: {e}"))
                        })
                        .and_then(|body| {
                            translator.parse_response(&model, &body).map(|r| (body, r, response.status))
                        }),
                    Err(e) => Err(e),
                };

                match outcome {
                    Ok((body, unified, status)) => {
                        trace.record(TraceRecord {
                            trace_id,
                            provider,
                            account: identity.identifier.clone(),
                            method: method.to_string(),
                            request: request_http,
                            response: TraceHttp {
                                url: built.url.clone(),
                                headers: Vec::new(),
                                body: redact_json(&body).to_string(),
                                status: Some(status),
                            },
                            duration_ms: started.elapsed().as_millis() as u64,
                            error: None,
                        });
                        for chunk in chunks_from_response(&unified) {
                            yield chunk;
                        }
                    }
                    Err(e) => {
                        trace.record(TraceRecord {
                            trace_id: trace_id.clone(),
                            provider,
                            account: identity.identifier.clone(),
                            method: method.to_string(),
                            request: request_http,
                            response: TraceHttp { url: built.url.clone(), ..Default::default() },
                            duration_ms: started.elapsed().as_millis() as u64,
                            error: Some(e.to_string()),
                        });
                        let failed: Result<()> = Err(e);
                        failed?;
                    }
                }
                return;
            }

            let built = translator.build(
                &model, &messages, &options, identity.project_id(), true,
            )?;
            let request_http = request_trace(&built);

            let mut parser: Box<dyn StreamParser> = match provider {
                Provider::Claude => {
                    Box::new(ClaudeStreamParser::new(&model, signatures.clone()))
                }
                _ => Box::new(GoogleStreamParser::new(&model, signatures.clone())),
            };

            let result = execute_stream_with_auth(
                transport.as_ref(),
                session.as_ref(),
                auth.as_ref(),
                &identity,
                &trace_id,
                |credentials| wire_request(&built, credentials, provider, &http, &trace_id),
            )
            .await;

            let mut response = match result {
                Ok(response) => response,
                Err(e) => {
                    trace.record(TraceRecord {
                        trace_id: trace_id.clone(),
                        provider,
                        account: identity.identifier.clone(),
                        method: method.to_string(),
                        request: request_http.clone(),
                        response: TraceHttp { url: built.url.clone(), ..Default::default() },
                        duration_ms: started.elapsed().as_millis() as u64,
                        error: Some(e.to_string()),
                    });
                    Err(e)?
                }
            };

            let status = response.status;
            let response_headers = redact_headers(&response.headers);
            let mut capture = StreamCapture::new(capture_cap);
            let mut decoder = SseDecoder::new();
            let mut failure: Option<CoreError> = None;

            'read: while let Some(read) = response.stream.next().await {
                let bytes = match read {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        failure = Some(CoreError::NetworkError {
                            message: e.to_string(),
                            trace_id: trace_id.clone(),
                        });
                        break 'read;
                    }
                };
                capture.push(&String::from_utf8_lossy(&bytes));
                for event in decoder.push(&bytes) {
                    match parser.parse_event(&event) {
                        Ok(chunks) => {
                            for chunk in chunks {
                                yield chunk;
                            }
                        }
                        Err(e) => {
                            failure = Some(e);
                            break 'read;
                        }
                    }
                }
                if parser.is_done() {
                    break;
                }
            }

            if failure.is_none() && !parser.is_done() {
                if let Some(event) = decoder.finish() {
                    match parser.parse_event(&event) {
                        Ok(chunks) => {
                            for chunk in chunks {
                                yield chunk;
                            }
                        }
                        Err(e) => failure = Some(e),
                    }
                }
            }

            trace.record(TraceRecord {
                trace_id: trace_id.clone(),
                provider,
                account: identity.identifier.clone(),
                method: method.to_string(),
                request: request_http,
                response: TraceHttp {
                    url: built.url.clone(),
                    headers: response_headers,
                    body: capture.into_text(),
                    status: Some(status),
                },
                duration_ms: started.elapsed().as_millis() as u64,
                error: failure.as_ref().map(|e| e.to_string()),
            });

            if let Some(e) = failure {
                let failed: Result<()> = Err(e);
                failed?;
            }
        })
    }
}

fn new_trace_id() -> String {
    format!("tr_{}", Uuid::new_v4().simple())
}

/// Attach auth and timeout to a built request. Attachment-bearing requests
/// and long-lived-connection providers get the extended timeout.
fn wire_request(
    built: &BuiltRequest,
    credentials: &Credentials,
    provider: Provider,
    http: &HttpConfig,
    trace_id: &str,
) -> Result<HttpRequest> {
    let bearer = credentials
        .bearer()
        .ok_or_else(|| CoreError::AuthenticationFailed {
            message: "no credentials held for this account".to_string(),
            trace_id: trace_id.to_string(),
        })?;

    let timeout = if built.has_attachments || provider.long_lived_connections() {
        Duration::from_secs(http.long_timeout_seconds)
    } else {
        Duration::from_secs(http.timeout_seconds)
    };

    let mut request = HttpRequest::post(&built.url)
        .json(&built.body)
        .bearer(bearer)
        .timeout(timeout);
    for (name, value) in &built.headers {
        request = request.header(name, value);
    }
    Ok(request)
}

fn request_trace(built: &BuiltRequest) -> TraceHttp {
    TraceHttp {
        url: built.url.clone(),
        headers: redact_headers(&built.headers),
        body: redact_json(&built.body).to_string(),
        status: None,
    }
}

/// Replay a buffered response as a chunk sequence, for stream calls served
/// by a buffered endpoint.
fn chunks_from_response(response: &UnifiedResponse) -> Vec<ChatChunk> {
    let id = format!("msg_{}", Uuid::new_v4().simple());
    let mut chunks = Vec::new();
    for part in &response.parts {
        match part {
            ResponsePart::Text { text } => chunks.push(ChatChunk::text(&id, text)),
            ResponsePart::Thinking { text } => chunks.push(ChatChunk::thinking(&id, text)),
            ResponsePart::InlineData { data, mime_type } => {
                let mut chunk = ChatChunk::text(&id, STANDARD.encode(data));
                chunk.part_type = PartType::InlineData;
                chunk.mime_type = Some(mime_type.clone());
                chunks.push(chunk);
            }
            ResponsePart::ToolCall { id: tool_id, function, args } => {
                let mut chunk = ChatChunk::text(&id, args.to_string());
                chunk.part_type = PartType::ToolCall;
                chunk.tool_id = Some(tool_id.clone());
                chunk.tool_name = Some(function.clone());
                chunks.push(chunk);
            }
        }
    }
    let mut tail = ChatChunk::text(&id, "");
    tail.usage = Some(response.usage);
    chunks.push(tail);
    chunks
}
