//! The transport client: one request/response exchange or one streaming
//! exchange against the routing API.
//!
//! [`Client`] merges headers, applies the retry policy to non-streaming
//! requests, and decodes SSE streams into [`StreamEvent`] values. Actual
//! network I/O is delegated to an injected [`HttpTransport`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::retry::{self, RetryConfig};
use crate::sse::{SseDecoder, StreamEvent};
use crate::transport::{HttpRequest, HttpTransport, ReqwestTransport};

/// Per-call options for [`Client::request`].
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Header overrides; these win over the configured defaults on conflict.
    pub headers: HashMap<String, String>,
    /// JSON request body.
    pub body: Option<serde_json::Value>,
    /// Timeout override for this call.
    pub timeout: Option<Duration>,
}

impl RequestOptions {
    /// Empty options: default headers, no body, configured timeout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the JSON body.
    pub fn body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Add a header override.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Override the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// A client for an OpenRouter-style LLM routing API.
///
/// Cheap to clone; clones share the underlying transport (and therefore its
/// connection pool). Each call owns its own retry state and stream session,
/// so concurrent calls never interfere.
///
/// # Example
///
/// ```rust,ignore
/// use openrouter_client::{Client, ClientConfig, RequestOptions};
///
/// let client = Client::new(ClientConfig::new("sk-or-..."));
/// let body = serde_json::json!({
///     "model": "openai/gpt-4o",
///     "messages": [{"role": "user", "content": "Hello"}],
/// });
/// let response = client
///     .request(reqwest::Method::POST, "/chat/completions", RequestOptions::new().body(body))
///     .await?;
/// ```
#[derive(Clone)]
pub struct Client {
    config: ClientConfig,
    transport: Arc<dyn HttpTransport>,
    retry: RetryConfig,
}

impl Client {
    /// Create a client backed by the production reqwest transport.
    pub fn new(config: ClientConfig) -> Self {
        Self::with_transport(config, Arc::new(ReqwestTransport::new()))
    }

    /// Create a client with an injected transport.
    pub fn with_transport(config: ClientConfig, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            config,
            transport,
            retry: RetryConfig::default(),
        }
    }

    /// Replace the retry configuration.
    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Returns the client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Resolve a path against the configured base URL. Absolute URLs pass
    /// through unchanged.
    fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        let base = self.config.base_url.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        format!("{base}/{path}")
    }

    /// Merge caller headers over the configured defaults; a JSON body forces
    /// `Content-Type: application/json`.
    fn merged_headers(
        &self,
        overrides: &HashMap<String, String>,
        has_body: bool,
    ) -> HashMap<String, String> {
        let mut headers = self.config.default_headers();
        for (k, v) in overrides {
            headers.insert(k.clone(), v.clone());
        }
        if has_body {
            headers.insert("Content-Type".to_string(), "application/json".to_string());
        }
        headers
    }

    /// Execute one request/response exchange, with retries applied to
    /// transient failures.
    ///
    /// An empty 2xx body decodes to an empty JSON object.
    ///
    /// # Errors
    ///
    /// - [`Error::Http`] for a non-2xx response that is not retryable
    /// - [`Error::MaxRetries`] once the retry budget is exhausted, wrapping
    ///   the last [`Error::Network`] or [`Error::Http`] failure
    /// - [`Error::InvalidResponse`] for a 2xx body that is not valid JSON
    pub async fn request(
        &self,
        method: reqwest::Method,
        path: &str,
        options: RequestOptions,
    ) -> Result<serde_json::Value> {
        let request = HttpRequest {
            method,
            url: self.url(path),
            headers: self.merged_headers(&options.headers, options.body.is_some()),
            body: options.body,
            timeout: Some(
                options
                    .timeout
                    .unwrap_or(Duration::from_secs(self.config.timeout_secs)),
            ),
        };

        debug!(
            method = %request.method,
            url = %request.url,
            "sending request"
        );

        retry::retry(&self.retry, || {
            let attempt = request.clone();
            self.execute(attempt)
        })
        .await
    }

    /// One attempt: send, classify the status, decode the body.
    async fn execute(&self, request: HttpRequest) -> Result<serde_json::Value> {
        let response = self.transport.send(request).await?;

        if !(200..300).contains(&response.status) {
            let retry_after = (response.status == 429)
                .then(|| retry::rate_limit_delay(&response.headers));
            let body = String::from_utf8_lossy(&response.body).into_owned();
            warn!(status = response.status, "request failed");
            return Err(Error::Http {
                status: response.status,
                reason: reason_phrase(response.status),
                body,
                retry_after,
            });
        }

        if response.body.is_empty() {
            return Ok(serde_json::json!({}));
        }

        serde_json::from_slice(&response.body).map_err(|e| Error::InvalidResponse {
            status: response.status,
            body: String::from_utf8_lossy(&response.body).into_owned(),
            message: format!("invalid JSON in response body: {e}"),
        })
    }

    /// Execute one streaming exchange: a single POST with
    /// `Accept: text/event-stream`, decoded events delivered over `tx` in
    /// arrival order. [`StreamEvent::Done`] is always the final event.
    ///
    /// Streaming exchanges are never retried here; reconnecting is a caller
    /// concern. There is no overall timeout, only per-read transport
    /// behavior.
    ///
    /// # Errors
    ///
    /// - [`Error::Network`] / [`Error::Http`] for failures establishing or
    ///   reading the stream
    /// - [`Error::StreamProtocol`] for a mid-stream error payload; no
    ///   further events are delivered after it
    pub async fn stream(
        &self,
        path: &str,
        body: serde_json::Value,
        tx: mpsc::Sender<StreamEvent>,
    ) -> Result<()> {
        let mut headers = self.merged_headers(&HashMap::new(), true);
        headers.insert("Accept".to_string(), "text/event-stream".to_string());

        let request = HttpRequest {
            method: reqwest::Method::POST,
            url: self.url(path),
            headers,
            body: Some(body),
            timeout: None,
        };

        debug!(url = %request.url, "opening stream");

        use futures_util::StreamExt;
        let mut bytes = self.transport.open_stream(request).await?;
        let mut decoder = SseDecoder::new();

        while let Some(read) = bytes.next().await {
            let chunk = read?;
            for event in decoder.feed(&chunk)? {
                trace!(event = ?event, "stream event");
                if tx.send(event).await.is_err() {
                    debug!("stream receiver dropped, stopping");
                    return Ok(());
                }
            }
            // A finished decoder may still hold a stashed protocol error;
            // finish() below raises it after the delivered events.
            if decoder.is_finished() {
                break;
            }
        }

        for event in decoder.finish()? {
            if tx.send(event).await.is_err() {
                break;
            }
        }

        debug!("stream complete");
        Ok(())
    }
}

/// Canonical reason phrase for a status code, empty when unknown.
fn reason_phrase(status: u16) -> String {
    reqwest::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("")
        .to_string()
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("base_url", &self.config.base_url)
            .field("api_key", &"***")
            .field("retry", &self.retry)
            .finish()
    }
}
