//! Async client for OpenRouter-style LLM routing APIs.
//!
//! This crate covers the transport layer of a hosted chat-completion API:
//! building requests, retrying transient failures with backoff, and
//! decoding Server-Sent-Event streams into discrete events. Request and
//! response payloads are plain [`serde_json::Value`]s; shaping them is left
//! to the caller.
//!
//! # Architecture
//!
//! - [`Client`] executes one request/response or one streaming exchange
//! - [`HttpTransport`] is the injected low-level HTTP sender
//!   ([`ReqwestTransport`] in production)
//! - [`retry`] wraps request/response exchanges with bounded backoff
//! - [`SseDecoder`] turns response bytes into [`StreamEvent`]s
//! - [`Error`] is the full failure taxonomy; callers match on the variant
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use openrouter_client::{Client, ClientConfig, RequestOptions};
//!
//! let client = Client::new(ClientConfig::new(std::env::var("OPENROUTER_API_KEY")?));
//!
//! let body = serde_json::json!({
//!     "model": "openai/gpt-4o",
//!     "messages": [{"role": "user", "content": "What is Rust?"}],
//! });
//! let response = client
//!     .request(reqwest::Method::POST, "/chat/completions", RequestOptions::new().body(body))
//!     .await?;
//! println!("{}", response["choices"][0]["message"]["content"]);
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod retry;
pub mod sse;
pub mod transport;

pub use client::{Client, RequestOptions};
pub use config::ClientConfig;
pub use error::{Error, Result};
pub use retry::{RetryConfig, is_retryable};
pub use sse::{SseDecoder, StreamEvent};
pub use transport::{ByteStream, HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};
