//! Error types for openrouter-client.
//!
//! All client operations return [`Result<T>`] which uses [`Error`] as the
//! error type. The variants form the full failure taxonomy of the transport
//! pipeline; callers branch on the variant rather than string-matching.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while talking to the routing API.
#[derive(Error, Debug)]
pub enum Error {
    /// The connection could not be established or was interrupted before a
    /// response was received. Always retryable.
    #[error("network error: {0}")]
    Network(String),

    /// The remote service answered with a non-2xx status. Retryable only for
    /// status >= 500 or status == 429.
    #[error("HTTP {status} {reason}: {body}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Canonical reason phrase for the status.
        reason: String,
        /// Raw response body.
        body: String,
        /// Server-suggested wait before retrying, extracted from the
        /// `Retry-After` / `X-RateLimit-Reset` headers of a 429 response.
        retry_after: Option<Duration>,
    },

    /// A 2xx response body could not be parsed as JSON.
    #[error("invalid response (HTTP {status}): {message}")]
    InvalidResponse {
        /// HTTP status code of the response that failed to parse.
        status: u16,
        /// Raw response body, kept for diagnostics.
        body: String,
        /// What went wrong while parsing.
        message: String,
    },

    /// The retry budget was exhausted. Wraps the last underlying failure.
    #[error("max retries ({max_attempts}) exceeded: {source}")]
    MaxRetries {
        /// Number of attempts that were made before giving up.
        max_attempts: u32,
        /// The error from the final attempt.
        source: Box<Error>,
    },

    /// A mid-stream SSE event carried an explicit error payload or an error
    /// finish reason. Halts the stream; never retryable.
    #[error("stream protocol error: {0}")]
    StreamProtocol(String),

    /// A JSON serialization error while building a request body.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns the HTTP status code carried by this error, if any.
    ///
    /// [`Error::MaxRetries`] reports the status of the last underlying error.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Http { status, .. } | Error::InvalidResponse { status, .. } => Some(*status),
            Error::MaxRetries { source, .. } => source.status(),
            _ => None,
        }
    }
}

/// A convenience type alias for client operations.
pub type Result<T> = std::result::Result<T, Error>;
