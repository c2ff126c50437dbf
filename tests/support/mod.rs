// Shared fakes for the integration tests: a scripted transport, an
// in-memory credential store, launchers for the redirect step, and a
// collecting trace sink.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::VecDeque;
use unichat::auth::AuthorizationLauncher;
use unichat::error::Result;
use unichat::http::{
    HttpRequest, HttpResponse, StreamingResponse, Transport, TransportError,
};
use unichat::models::{AccountIdentity, Credentials};
use unichat::session::AccountSession;
use unichat::trace::{TraceRecord, TraceSink};

pub enum Scripted {
    Buffered {
        status: u16,
        body: &'static str,
    },
    Stream {
        status: u16,
        body: &'static str,
    },
}

/// Transport that replays a scripted response per call and records every
/// request it saw.
pub struct MockTransport {
    pub requests: Mutex<Vec<HttpRequest>>,
    script: Mutex<VecDeque<Scripted>>,
    read_size: usize,
}

impl MockTransport {
    pub fn new(script: Vec<Scripted>) -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            script: Mutex::new(script.into()),
            read_size: 4096,
        }
    }

    /// Deliver streamed bodies in reads of `n` bytes.
    pub fn with_read_size(mut self, n: usize) -> Self {
        self.read_size = n;
        self
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn request(&self, index: usize) -> HttpRequest {
        self.requests.lock()[index].clone()
    }

    pub fn header_of(&self, index: usize, name: &str) -> Option<String> {
        self.requests.lock()[index]
            .headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.clone())
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn execute(&self, request: HttpRequest) -> std::result::Result<HttpResponse, TransportError> {
        self.requests.lock().push(request);
        match self.script.lock().pop_front() {
            Some(Scripted::Buffered { status, body }) => Ok(HttpResponse {
                status,
                headers: Vec::new(),
                body: body.as_bytes().to_vec(),
            }),
            Some(Scripted::Stream { .. }) => {
                Err(TransportError::new("script expected a streaming call here"))
            }
            None => Err(TransportError::new("no scripted response left")),
        }
    }

    async fn execute_stream(
        &self,
        request: HttpRequest,
    ) -> std::result::Result<StreamingResponse, TransportError> {
        self.requests.lock().push(request);
        match self.script.lock().pop_front() {
            Some(Scripted::Stream { status, body }) => {
                let reads: Vec<std::io::Result<Bytes>> = body
                    .as_bytes()
                    .chunks(self.read_size)
                    .map(|c| Ok(Bytes::copy_from_slice(c)))
                    .collect();
                Ok(StreamingResponse {
                    status,
                    headers: Vec::new(),
                    stream: Box::pin(futures::stream::iter(reads)),
                })
            }
            Some(Scripted::Buffered { .. }) => {
                Err(TransportError::new("script expected a buffered call here"))
            }
            None => Err(TransportError::new("no scripted response left")),
        }
    }
}

/// In-memory credential store.
pub struct MemorySession {
    credentials: Mutex<Credentials>,
    pub saves: Mutex<Vec<(AccountIdentity, Credentials)>>,
}

impl MemorySession {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials: Mutex::new(credentials),
            saves: Mutex::new(Vec::new()),
        }
    }

    pub fn current(&self) -> Credentials {
        self.credentials.lock().clone()
    }

    pub fn save_count(&self) -> usize {
        self.saves.lock().len()
    }
}

#[async_trait]
impl AccountSession for MemorySession {
    async fn get_credentials(&self) -> Result<Credentials> {
        Ok(self.credentials.lock().clone())
    }

    async fn save(&self, identity: &AccountIdentity, credentials: &Credentials) -> Result<()> {
        *self.credentials.lock() = credentials.clone();
        self.saves
            .lock()
            .push((identity.clone(), credentials.clone()));
        Ok(())
    }
}

/// Launcher that completes the redirect immediately, echoing back the
/// state it finds in the authorization URL.
pub struct EchoLauncher {
    pub code: &'static str,
}

#[async_trait]
impl AuthorizationLauncher for EchoLauncher {
    async fn authorize(
        &self,
        authorization_url: &str,
        _callback_scheme: &str,
        callback_path: &str,
    ) -> Result<String> {
        let state = authorization_url
            .split('&')
            .find_map(|param| param.strip_prefix("state="))
            .unwrap_or_default();
        Ok(format!(
            "http://localhost:54545{}?code={}&state={}",
            callback_path, self.code, state
        ))
    }
}

/// Launcher that returns a callback with the wrong CSRF state.
pub struct TamperedLauncher;

#[async_trait]
impl AuthorizationLauncher for TamperedLauncher {
    async fn authorize(
        &self,
        _authorization_url: &str,
        _callback_scheme: &str,
        callback_path: &str,
    ) -> Result<String> {
        Ok(format!(
            "http://localhost:54545{}?code=abc&state=wrong",
            callback_path
        ))
    }
}

/// Trace sink collecting records in memory.
#[derive(Default)]
pub struct CollectingSink {
    pub records: Mutex<Vec<TraceRecord>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_count(&self) -> usize {
        self.records.lock().len()
    }

    pub fn last(&self) -> TraceRecord {
        self.records.lock().last().cloned().expect("no trace records")
    }
}

impl TraceSink for CollectingSink {
    fn record(&self, record: TraceRecord) {
        self.records.lock().push(record);
    }
}

/// Credentials that will not trip the proactive refresh margin.
pub fn fresh_credentials(access_token: &str, refresh_token: &str) -> Credentials {
    Credentials {
        api_key: None,
        access_token: Some(access_token.to_string()),
        refresh_token: Some(refresh_token.to_string()),
        expires_at: Some(chrono::Utc::now().timestamp_millis() + 3_600_000),
    }
}
