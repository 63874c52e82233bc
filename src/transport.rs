//! The low-level HTTP sender abstraction.
//!
//! [`HttpTransport`] is the seam between the client logic and the network.
//! The production implementation is [`ReqwestTransport`]; tests inject mocks
//! to exercise retry and decoding behavior without real I/O.
//!
//! A transport distinguishes two failure shapes: a network-level failure
//! (connection refused, timeout, interrupted transfer) surfaces as
//! [`Error::Network`], while a received response with a non-2xx status is a
//! *successful* `send` whose [`HttpResponse::status`] the caller classifies.

use std::collections::HashMap;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{Stream, StreamExt};

use crate::error::{Error, Result};

/// A single outbound HTTP exchange, built per call and immutable once built.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// HTTP method.
    pub method: reqwest::Method,
    /// Absolute target URL.
    pub url: String,
    /// Fully merged headers for this request.
    pub headers: HashMap<String, String>,
    /// JSON body, if any.
    pub body: Option<serde_json::Value>,
    /// Per-request timeout. `None` for streaming exchanges, which have no
    /// overall deadline.
    pub timeout: Option<Duration>,
}

/// The response to a non-streaming exchange.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers, with lowercase names.
    pub headers: HashMap<String, String>,
    /// Raw body bytes.
    pub body: Vec<u8>,
}

/// An unbounded stream of response body bytes.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>>> + Send>>;

/// Sends HTTP requests on behalf of the [`Client`](crate::client::Client).
///
/// Implementations own connection pooling and TLS; the client never reaches
/// below this trait.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Execute one request/response exchange.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Network`] if no response was received. A response
    /// with a non-2xx status is *not* an error at this level.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse>;

    /// Open a streaming exchange and return the response body as a byte
    /// stream.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Network`] if the connection failed, or
    /// [`Error::Http`] if the server answered with a non-2xx status (the
    /// error body is read eagerly so the failure carries it).
    async fn open_stream(&self, request: HttpRequest) -> Result<ByteStream>;
}

/// The production [`HttpTransport`] backed by a shared [`reqwest::Client`].
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    http: reqwest::Client,
}

impl ReqwestTransport {
    /// Create a transport with a fresh connection pool.
    pub fn new() -> Self {
        Self::default()
    }

    fn build(&self, request: &HttpRequest) -> reqwest::RequestBuilder {
        let mut req = self.http.request(request.method.clone(), &request.url);

        for (k, v) in &request.headers {
            req = req.header(k.as_str(), v.as_str());
        }
        if let Some(ref body) = request.body {
            req = req.json(body);
        }
        if let Some(timeout) = request.timeout {
            req = req.timeout(timeout);
        }

        req
    }
}

fn network_error(e: reqwest::Error) -> Error {
    Error::Network(e.to_string())
}

fn header_map(headers: &reqwest::header::HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect()
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let response = self.build(&request).send().await.map_err(network_error)?;

        let status = response.status().as_u16();
        let headers = header_map(response.headers());
        let body = response.bytes().await.map_err(network_error)?.to_vec();

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }

    async fn open_stream(&self, request: HttpRequest) -> Result<ByteStream> {
        let response = self.build(&request).send().await.map_err(network_error)?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = (status.as_u16() == 429)
                .then(|| crate::retry::rate_limit_delay(&header_map(response.headers())));
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Http {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("").to_string(),
                body,
                retry_after,
            });
        }

        let stream = response
            .bytes_stream()
            .map(|item| item.map(|bytes| bytes.to_vec()).map_err(network_error));

        Ok(Box::pin(stream))
    }
}
