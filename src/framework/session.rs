//! Session maintenance
//!
//! A [`SessionHandler`] tells the dispatcher whether the scanner is still
//! logged in and how to log back in. Because the HTTP client keeps one cookie
//! jar, a successful login is visible to every later request.

use crate::config::LoginConfig;
use crate::crawler::RetryPolicy;
use crate::http::HttpClient;
use crate::ConfigError;
use anyhow::Context;
use async_trait::async_trait;
use regex::Regex;
use url::Url;

#[async_trait]
pub trait SessionHandler: Send + Sync {
    /// Checks whether the current session is authenticated
    async fn is_logged_in(&self, http: &HttpClient) -> anyhow::Result<bool>;

    /// Performs the login sequence
    async fn login(&self, http: &HttpClient) -> anyhow::Result<()>;
}

/// Logs in by submitting a form, and checks the session by matching a page
/// against a pattern
#[derive(Debug, Clone)]
pub struct FormLogin {
    url: Url,
    params: Vec<(String, String)>,
    check_url: Url,
    check_pattern: Regex,
}

impl FormLogin {
    pub fn new(
        url: Url,
        params: Vec<(String, String)>,
        check_url: Url,
        check_pattern: Regex,
    ) -> Self {
        Self {
            url,
            params,
            check_url,
            check_pattern,
        }
    }

    /// Builds a form login from the `[login]` section
    pub fn from_config(config: &LoginConfig) -> Result<Self, ConfigError> {
        let url = Url::parse(&config.url)
            .map_err(|e| ConfigError::InvalidUrl(format!("{}: {}", config.url, e)))?;
        let check_url = Url::parse(&config.check_url)
            .map_err(|e| ConfigError::InvalidUrl(format!("{}: {}", config.check_url, e)))?;
        let check_pattern =
            Regex::new(&config.check_pattern).map_err(|e| ConfigError::InvalidPattern {
                pattern: config.check_pattern.clone(),
                message: e.to_string(),
            })?;

        Ok(Self::new(
            url,
            config
                .params
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            check_url,
            check_pattern,
        ))
    }
}

#[async_trait]
impl SessionHandler for FormLogin {
    async fn is_logged_in(&self, http: &HttpClient) -> anyhow::Result<bool> {
        let response = http
            .get(&self.check_url)
            .await
            .with_context(|| format!("fetching login check page {}", self.check_url))?;
        Ok(self.check_pattern.is_match(&response.body))
    }

    async fn login(&self, http: &HttpClient) -> anyhow::Result<()> {
        tracing::info!("Logging in at {}", self.url);
        let response = http
            .post_form(&self.url, &self.params)
            .await
            .with_context(|| format!("submitting login form to {}", self.url))?;

        if response.status >= 400 {
            anyhow::bail!("login form returned HTTP {}", response.status);
        }
        Ok(())
    }
}

/// Makes sure `handler` reports a live session
///
/// Each attempt checks the session and, if it is gone, logs in and checks
/// again. A failed check or login is retried under `policy`; the error from
/// the last attempt is returned once attempts run out.
pub(crate) async fn ensure_session(
    handler: &dyn SessionHandler,
    http: &HttpClient,
    policy: RetryPolicy,
) -> anyhow::Result<()> {
    let mut attempt = 1;

    loop {
        match restore_session(handler, http).await {
            Ok(()) => return Ok(()),
            Err(e) if attempt >= policy.max_attempts => {
                return Err(e.context(format!(
                    "session not restored after {} attempts",
                    attempt
                )));
            }
            Err(e) => {
                tracing::warn!(
                    "Session attempt {}/{} failed ({:#}), retrying",
                    attempt,
                    policy.max_attempts,
                    e
                );
            }
        }
        attempt += 1;
        tokio::time::sleep(policy.delay).await;
    }
}

async fn restore_session(handler: &dyn SessionHandler, http: &HttpClient) -> anyhow::Result<()> {
    if handler.is_logged_in(http).await? {
        return Ok(());
    }

    tracing::warn!("Session lost, attempting to log in again");
    handler.login(http).await?;

    if handler.is_logged_in(http).await? {
        tracing::info!("Session restored");
        Ok(())
    } else {
        anyhow::bail!("still logged out after login")
    }
}
