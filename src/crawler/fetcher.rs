//! Retrying fetch
//!
//! # Retry Logic
//!
//! | Condition | Action |
//! |-----------|--------|
//! | 2xx, 3xx, 4xx | Returned as a response |
//! | HTTP 5xx | Retry; after the last attempt → `Server` failure |
//! | Timeout, connection error | Retry; after the last attempt → `Network` failure |
//!
//! Nothing is extracted from a failed attempt. The same policy serves the
//! spider and the framework's URL queue.

use crate::config::HttpConfig;
use crate::http::{HttpClient, HttpError, HttpResponse};
use crate::state::Failure;
use crate::FailureKind;
use std::time::Duration;
use url::Url;

/// Attempt count and spacing for fetches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per URL, including the first
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &HttpConfig) -> Self {
        Self {
            max_attempts: config.max_retries.max(1),
            delay: Duration::from_millis(config.retry_delay_ms),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&HttpConfig::default())
    }
}

/// Result of a fetch after retries
#[derive(Debug)]
pub enum FetchOutcome {
    /// A non-5xx response
    Response(HttpResponse),
    /// Every attempt failed
    Failed(Failure),
}

/// Fetches `url` with GET, retrying transient failures
pub async fn fetch_with_retry(client: &HttpClient, url: &Url, policy: RetryPolicy) -> FetchOutcome {
    let mut attempt = 1;

    loop {
        let (kind, reason) = match client.get(url).await {
            Ok(response) if !response.is_server_error() => {
                return FetchOutcome::Response(response);
            }
            Ok(response) => (FailureKind::Server, format!("HTTP {}", response.status)),
            Err(e @ HttpError::Timeout { .. }) => (FailureKind::Network, e.to_string()),
            Err(e @ HttpError::Network { .. }) => (FailureKind::Network, e.to_string()),
        };

        if attempt >= policy.max_attempts {
            tracing::warn!(
                "Giving up on {} after {} attempts: {}",
                url,
                attempt,
                reason
            );
            return FetchOutcome::Failed(Failure {
                url: url.to_string(),
                kind,
                reason,
            });
        }

        tracing::warn!(
            "Attempt {}/{} for {} failed ({}), retrying",
            attempt,
            policy.max_attempts,
            url,
            reason
        );
        attempt += 1;
        tokio::time::sleep(policy.delay).await;
    }
}
