//! Client configuration.
//!
//! A [`ClientConfig`] describes how to connect to the routing API: the base
//! URL, API key, request timeout, optional attribution headers and any extra
//! headers to send on every call.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Default base URL for the OpenRouter API.
pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Configuration for a [`Client`](crate::client::Client).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// API key sent as `Authorization: Bearer <key>`.
    pub api_key: String,

    /// Base URL for the API, without a trailing slash
    /// (e.g. "https://openrouter.ai/api/v1").
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Request timeout in seconds for non-streaming calls.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Default model to use when a request does not name one.
    #[serde(default)]
    pub default_model: Option<String>,

    /// Optional `HTTP-Referer` attribution header (app URL).
    #[serde(default)]
    pub referer: Option<String>,

    /// Optional `X-Title` attribution header (app name).
    #[serde(default)]
    pub title: Option<String>,

    /// Extra HTTP headers to include in every request.
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.into()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl ClientConfig {
    /// Create a configuration with the given API key and all other fields at
    /// their defaults.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: default_base_url(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            default_model: None,
            referer: None,
            title: None,
            headers: HashMap::new(),
        }
    }

    /// The headers attached to every outbound request.
    ///
    /// Includes `Authorization` and `Content-Type`, the attribution headers
    /// when configured, and any extra headers. Entries with empty values are
    /// excluded.
    pub fn default_headers(&self) -> HashMap<String, String> {
        let mut headers = HashMap::new();
        headers.insert(
            "Authorization".to_string(),
            format!("Bearer {}", self.api_key),
        );
        headers.insert("Content-Type".to_string(), "application/json".to_string());

        if let Some(ref referer) = self.referer
            && !referer.is_empty()
        {
            headers.insert("HTTP-Referer".to_string(), referer.clone());
        }
        if let Some(ref title) = self.title
            && !title.is_empty()
        {
            headers.insert("X-Title".to_string(), title.clone());
        }

        for (k, v) in &self.headers {
            if !v.is_empty() {
                headers.insert(k.clone(), v.clone());
            }
        }

        headers
    }
}
