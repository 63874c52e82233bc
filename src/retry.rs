//! Exponential backoff retry logic for request/response exchanges.
//!
//! [`retry`] wraps a fallible async operation and re-runs it on transient
//! failures (network errors, HTTP 5xx, HTTP 429) with exponential backoff
//! plus jitter. Rate-limit responses carry a server-suggested delay which
//! takes precedence over the computed backoff when larger.
//!
//! Retries are strictly sequential: one attempt at a time, never racing.

use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rand::Rng;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts before giving up (default: 3).
    pub max_attempts: u32,
    /// Base delay between attempts (default: 1 second).
    pub base_delay: Duration,
    /// Cap on the computed backoff delay (default: 30 seconds).
    pub max_delay: Duration,
    /// Jitter source: given an upper bound in milliseconds, returns a value
    /// in `[0, bound)`. Injectable so tests can supply `|_| 0`.
    pub jitter: fn(u64) -> u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            jitter: default_jitter,
        }
    }
}

/// Uniform random jitter in `[0, max_ms)`.
fn default_jitter(max_ms: u64) -> u64 {
    if max_ms == 0 {
        return 0;
    }
    rand::thread_rng().gen_range(0..max_ms)
}

/// Determines whether an [`Error`] should be retried.
///
/// Network failures are always retryable. HTTP errors are retryable for
/// status >= 500 and status 429. Everything else (other 4xx, invalid JSON,
/// stream protocol errors) propagates immediately.
pub fn is_retryable(err: &Error) -> bool {
    match err {
        Error::Network(_) => true,
        Error::Http { status, .. } => *status >= 500 || *status == 429,
        Error::InvalidResponse { .. }
        | Error::MaxRetries { .. }
        | Error::StreamProtocol(_)
        | Error::Json(_) => false,
    }
}

/// Backoff delay after `failures` failed attempts (1-indexed).
///
/// The delay is `min(base_delay * 2^(failures-1), max_delay)` plus a random
/// jitter of `[0, base_delay)` milliseconds.
pub fn compute_delay(config: &RetryConfig, failures: u32) -> Duration {
    let exp = 2u64.saturating_pow(failures.saturating_sub(1));
    let base_ms = config.base_delay.as_millis() as u64;
    let raw_ms = base_ms.saturating_mul(exp);
    let capped_ms = raw_ms.min(config.max_delay.as_millis() as u64);
    let jitter_ms = (config.jitter)(base_ms);

    Duration::from_millis(capped_ms.saturating_add(jitter_ms))
}

/// Extract the server-suggested wait from rate-limit response headers.
///
/// Prefers `Retry-After` (integer seconds or an HTTP-date), then
/// `X-RateLimit-Reset` (absolute epoch seconds). Date and epoch forms are
/// converted to a delta from now and floored at 1 second. Defaults to
/// 1 second when neither header is usable.
pub fn rate_limit_delay(headers: &HashMap<String, String>) -> Duration {
    if let Some(value) = header_value(headers, "retry-after") {
        if let Ok(secs) = value.trim().parse::<u64>() {
            return Duration::from_secs(secs.max(1));
        }
        if let Ok(date) = chrono::DateTime::parse_from_rfc2822(value.trim()) {
            let delta = date.timestamp() - chrono::Utc::now().timestamp();
            return Duration::from_secs(delta.max(1) as u64);
        }
    }

    if let Some(value) = header_value(headers, "x-ratelimit-reset")
        && let Ok(reset) = value.trim().parse::<i64>()
    {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64;
        return Duration::from_secs((reset - now).max(1) as u64);
    }

    Duration::from_secs(1)
}

/// Case-insensitive header lookup.
fn header_value<'a>(headers: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Run `op` until it succeeds, a non-retryable error occurs, or the attempt
/// budget is exhausted.
///
/// # Errors
///
/// Returns the operation's error unchanged when it is not retryable, or
/// [`Error::MaxRetries`] wrapping the last error after `max_attempts`
/// attempts.
pub async fn retry<T, F, Fut>(config: &RetryConfig, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut failures: u32 = 0;

    loop {
        match op().await {
            Ok(value) => {
                if failures > 0 {
                    debug!(attempts = failures + 1, "request succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) => {
                failures += 1;

                if !is_retryable(&err) {
                    return Err(err);
                }
                if failures >= config.max_attempts {
                    return Err(Error::MaxRetries {
                        max_attempts: config.max_attempts,
                        source: Box::new(err),
                    });
                }

                let mut delay = compute_delay(config, failures);
                if let Error::Http {
                    status: 429,
                    retry_after,
                    ..
                } = &err
                {
                    let suggested = retry_after.unwrap_or(Duration::from_secs(1));
                    delay = delay.max(suggested);
                }

                warn!(
                    attempt = failures,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "retrying after transient error"
                );

                tokio::time::sleep(delay).await;
            }
        }
    }
}
