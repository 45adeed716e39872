//! Shared HTTP plumbing for the Slack and Notion clients.
//!
//! # Retry Strategy
//!
//! Reads ([`RetryPolicy::Idempotent`]):
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - Other 4xx → fail immediately, with the response body in the error
//! - Network errors → retry
//!
//! Writes ([`RetryPolicy::RateLimitOnly`]) may already have been applied when
//! a 5xx or a timeout comes back, so only 429 and connection failures are
//! retried. Anything else fails the call; the next sync's find-or-create and
//! dedup pick up where it stopped.
//!
//! Backoff is exponential (1s, 2s, 4s, … capped at 32s). A `Retry-After`
//! header, which both Slack and Notion send on 429, takes precedence.

use std::time::Duration;

use anyhow::{anyhow, Result};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use tracing::{debug, warn};

use crate::config::HttpConfig;

/// Longest error body kept in error messages.
pub const MAX_ERROR_BODY: usize = 500;

/// Upper bound on a server-requested `Retry-After` wait.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(120);

/// Which failures a call may be re-sent after.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPolicy {
    /// Safe to repeat: retry 429, 5xx, and network errors.
    Idempotent,
    /// Not safe to repeat: retry only requests the server cannot have
    /// applied (429, or no connection made).
    RateLimitOnly,
}

impl RetryPolicy {
    pub fn retries_status(self, status: StatusCode) -> bool {
        status == StatusCode::TOO_MANY_REQUESTS
            || (self == RetryPolicy::Idempotent && status.is_server_error())
    }

    /// `connect_failed` is true when the request never reached the server.
    pub fn retries_network_error(self, connect_failed: bool) -> bool {
        self == RetryPolicy::Idempotent || connect_failed
    }
}

/// Build a client with the configured timeout.
pub fn build_client(config: &HttpConfig) -> Result<Client> {
    Ok(Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .user_agent(concat!("daily-report-sync/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

/// Delay before retry number `attempt` (1-based).
pub fn backoff(attempt: u32) -> Duration {
    Duration::from_secs(1 << attempt.saturating_sub(1).min(5))
}

/// Parse a `Retry-After` header given in seconds.
pub fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    let secs: u64 = headers.get(RETRY_AFTER)?.to_str().ok()?.trim().parse().ok()?;
    Some(Duration::from_secs(secs).min(MAX_RETRY_AFTER))
}

/// Cut `body` to at most [`MAX_ERROR_BODY`] characters.
pub fn truncate_body(body: &str) -> String {
    match body.char_indices().nth(MAX_ERROR_BODY) {
        Some((idx, _)) => format!("{}…", &body[..idx]),
        None => body.to_string(),
    }
}

/// Send a request, retrying transient failures.
///
/// `build` is called once per attempt since a `RequestBuilder` is consumed by
/// sending. `what` names the call in log lines and errors.
pub async fn send_with_retry<F>(
    what: &str,
    policy: RetryPolicy,
    max_retries: u32,
    mut build: F,
) -> Result<Response>
where
    F: FnMut() -> RequestBuilder,
{
    let mut last_err = None;
    let mut server_delay: Option<Duration> = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = server_delay.take().unwrap_or_else(|| backoff(attempt));
            debug!(call = what, attempt, delay_secs = delay.as_secs(), "retrying");
            tokio::time::sleep(delay).await;
        }

        match build().send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    return Ok(response);
                }

                let delay = retry_after(response.headers());
                let body = response.text().await.unwrap_or_default();
                let err = anyhow!("{} failed with HTTP {}: {}", what, status, truncate_body(&body));

                if policy.retries_status(status) {
                    warn!(call = what, status = status.as_u16(), attempt, "transient HTTP error");
                    server_delay = delay;
                    last_err = Some(err);
                    continue;
                }
                return Err(err);
            }
            Err(e) => {
                warn!(call = what, attempt, error = %e, "request error");
                let retry = policy.retries_network_error(e.is_connect());
                let err = anyhow!(e).context(format!("{} request failed", what));
                if !retry {
                    return Err(err);
                }
                last_err = Some(err);
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow!("{} failed after retries", what)))
}
