// Production transport backed by reqwest

use super::transport::{
    HttpRequest, HttpResponse, StreamingResponse, Transport, TransportError,
};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

/// Reqwest-backed [`Transport`] tuned for streaming workloads.
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, TransportError> {
        // Per-request timeouts are applied at submission time, so the
        // client itself carries none.
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Some(Duration::from_secs(60)))
            .tcp_nodelay(true)
            .use_rustls_tls()
            .build()
            .map_err(|e| TransportError::new(format!("Failed to create HTTP client: {}", e)))?;

        debug!("Created HTTP client with connection pooling and keep-alive");

        Ok(Self { client })
    }

    fn build(&self, request: HttpRequest) -> Result<reqwest::RequestBuilder, TransportError> {
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|e| TransportError::new(format!("Invalid method: {}", e)))?;

        let mut builder = self
            .client
            .request(method, &request.url)
            .timeout(request.timeout);

        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }
        Ok(builder)
    }
}

fn collect_headers(response: &reqwest::Response) -> Vec<(String, String)> {
    response
        .headers()
        .iter()
        .map(|(k, v)| {
            (
                k.as_str().to_string(),
                v.to_str().unwrap_or_default().to_string(),
            )
        })
        .collect()
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let response = self
            .build(request)?
            .send()
            .await
            .map_err(|e| TransportError::new(format!("Request failed: {}", e)))?;

        let status = response.status().as_u16();
        let headers = collect_headers(&response);
        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::new(format!("Failed to read response body: {}", e)))?
            .to_vec();

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }

    async fn execute_stream(
        &self,
        request: HttpRequest,
    ) -> Result<StreamingResponse, TransportError> {
        let response = self
            .build(request)?
            .send()
            .await
            .map_err(|e| TransportError::new(format!("Request failed: {}", e)))?;

        let status = response.status().as_u16();
        let headers = collect_headers(&response);
        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| std::io::Error::other(e.to_string())))
            .boxed();

        Ok(StreamingResponse {
            status,
            headers,
            stream,
        })
    }
}
