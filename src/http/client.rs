//! reqwest-backed client with a shared concurrency budget
//!
//! Redirects are never followed here. The spider needs to see every hop to
//! record it and to decide whether the target is in scope.

use crate::config::HttpConfig;
use reqwest::{redirect::Policy, Client, RequestBuilder};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Semaphore;
use url::Url;

/// Number of responses after which the "current" timing window restarts
const RESPONSE_WINDOW: u64 = 50;

/// Transport-level request failures
///
/// HTTP error statuses are not errors at this layer; they come back as an
/// ordinary [`HttpResponse`].
#[derive(Debug, Clone, Error)]
pub enum HttpError {
    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("request to {url} failed: {message}")]
    Network { url: String, message: String },
}

impl HttpError {
    fn from_reqwest(url: &Url, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout {
                url: url.to_string(),
            }
        } else {
            Self::Network {
                url: url.to_string(),
                message: err.to_string(),
            }
        }
    }
}

/// A fully read HTTP response
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// The URL that was requested
    pub url: Url,
    pub status: u16,
    /// Header name/value pairs in arrival order; names are lowercase
    pub headers: Vec<(String, String)>,
    pub body: String,
    pub content_type: Option<String>,
    pub elapsed: Duration,
}

impl HttpResponse {
    /// Returns the first value of header `name` (case-insensitive)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns every value of header `name` (case-insensitive)
    pub fn header_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.headers
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn is_redirect(&self) -> bool {
        (300..400).contains(&self.status)
    }

    pub fn is_server_error(&self) -> bool {
        self.status >= 500
    }

    /// Resolves the `Location` header against the request URL
    pub fn location(&self) -> Option<Url> {
        self.header("location")
            .and_then(|loc| self.url.join(loc.trim()).ok())
    }
}

/// Snapshot of request statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, serde::Serialize)]
pub struct HttpStats {
    pub requests: u64,
    pub responses: u64,
    pub time_out_count: u64,
    /// Mean response time over all responses (seconds)
    pub average_res_time: f64,
    /// Responses in the current window
    pub curr_res_cnt: u64,
    /// Cumulative response time of the current window (seconds)
    pub curr_res_time: f64,
    /// Requests holding a permit right now
    pub in_flight: usize,
    pub max_concurrency: usize,
}

impl HttpStats {
    /// Mean response time over the current window (seconds)
    pub fn curr_avg(&self) -> f64 {
        if self.curr_res_cnt == 0 {
            0.0
        } else {
            self.curr_res_time / self.curr_res_cnt as f64
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    requests: AtomicU64,
    responses: AtomicU64,
    timeouts: AtomicU64,
    total_micros: AtomicU64,
    window_count: AtomicU64,
    window_micros: AtomicU64,
    in_flight: AtomicUsize,
}

impl Counters {
    fn record_response(&self, elapsed: Duration) {
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.responses.fetch_add(1, Ordering::Relaxed);
        self.total_micros.fetch_add(micros, Ordering::Relaxed);

        if self.window_count.fetch_add(1, Ordering::Relaxed) + 1 >= RESPONSE_WINDOW {
            self.window_count.store(0, Ordering::Relaxed);
            self.window_micros.store(0, Ordering::Relaxed);
        } else {
            self.window_micros.fetch_add(micros, Ordering::Relaxed);
        }
    }
}

/// Decrements the in-flight gauge when a request finishes, however it ends
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(gauge: &'a AtomicUsize) -> Self {
        gauge.fetch_add(1, Ordering::Relaxed);
        Self(gauge)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

/// HTTP client shared by the spider and the audit dispatcher
///
/// Clones share the connection pool, the cookie jar, the concurrency budget
/// and the statistics.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    permits: Arc<Semaphore>,
    max_concurrency: usize,
    counters: Arc<Counters>,
}

impl HttpClient {
    /// Builds a client from the `[http]` configuration section
    ///
    /// # Example
    ///
    /// ```
    /// use spindle::config::HttpConfig;
    /// use spindle::http::HttpClient;
    ///
    /// let client = HttpClient::new(&HttpConfig::default()).unwrap();
    /// assert_eq!(client.max_concurrency(), 20);
    /// ```
    pub fn new(config: &HttpConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(Duration::from_millis(config.timeout_ms))
            .redirect(Policy::none())
            .cookie_store(true)
            .gzip(true)
            .brotli(true)
            .build()?;

        let max_concurrency = config.max_concurrency.max(1);

        Ok(Self {
            client,
            permits: Arc::new(Semaphore::new(max_concurrency)),
            max_concurrency,
            counters: Arc::new(Counters::default()),
        })
    }

    /// Sends a GET request
    pub async fn get(&self, url: &Url) -> Result<HttpResponse, HttpError> {
        self.send(url, self.client.get(url.clone())).await
    }

    /// Sends a POST request with a url-encoded form body
    pub async fn post_form<K, V>(&self, url: &Url, params: &[(K, V)]) -> Result<HttpResponse, HttpError>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let pairs: Vec<(&str, &str)> = params
            .iter()
            .map(|(k, v)| (k.as_ref(), v.as_ref()))
            .collect();
        self.send(url, self.client.post(url.clone()).form(&pairs))
            .await
    }

    /// The request ceiling shared by every clone of this client
    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    pub fn stats(&self) -> HttpStats {
        let c = &self.counters;
        let responses = c.responses.load(Ordering::Relaxed);
        let total = c.total_micros.load(Ordering::Relaxed) as f64 / 1_000_000.0;

        HttpStats {
            requests: c.requests.load(Ordering::Relaxed),
            responses,
            time_out_count: c.timeouts.load(Ordering::Relaxed),
            average_res_time: if responses == 0 {
                0.0
            } else {
                total / responses as f64
            },
            curr_res_cnt: c.window_count.load(Ordering::Relaxed),
            curr_res_time: c.window_micros.load(Ordering::Relaxed) as f64 / 1_000_000.0,
            in_flight: c.in_flight.load(Ordering::Relaxed),
            max_concurrency: self.max_concurrency,
        }
    }

    async fn send(&self, url: &Url, request: RequestBuilder) -> Result<HttpResponse, HttpError> {
        // The semaphore is never closed, so acquire only fails after a
        // programming error; treat it as a network failure.
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| HttpError::Network {
                url: url.to_string(),
                message: e.to_string(),
            })?;
        let _gauge = InFlight::enter(&self.counters.in_flight);

        self.counters.requests.fetch_add(1, Ordering::Relaxed);
        let started = Instant::now();

        let result = async {
            let response = request.send().await?;
            let status = response.status().as_u16();
            let headers: Vec<(String, String)> = response
                .headers()
                .iter()
                .map(|(k, v)| {
                    (
                        k.as_str().to_string(),
                        String::from_utf8_lossy(v.as_bytes()).into_owned(),
                    )
                })
                .collect();
            let bytes = response.bytes().await?;
            Ok::<_, reqwest::Error>((status, headers, bytes))
        }
        .await;

        let elapsed = started.elapsed();

        match result {
            Ok((status, headers, bytes)) => {
                self.counters.record_response(elapsed);
                tracing::debug!("{} {} in {:?}", status, url, elapsed);

                let content_type = headers
                    .iter()
                    .find(|(k, _)| k == "content-type")
                    .map(|(_, v)| v.clone());

                Ok(HttpResponse {
                    url: url.clone(),
                    status,
                    headers,
                    body: String::from_utf8_lossy(&bytes).into_owned(),
                    content_type,
                    elapsed,
                })
            }
            Err(e) => {
                if e.is_timeout() {
                    self.counters.timeouts.fetch_add(1, Ordering::Relaxed);
                }
                tracing::debug!("Request to {} failed: {}", url, e);
                Err(HttpError::from_reqwest(url, e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response_with(headers: &[(&str, &str)]) -> HttpResponse {
        HttpResponse {
            url: Url::parse("http://example.com/dir/page").unwrap(),
            status: 302,
            headers: headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            body: String::new(),
            content_type: None,
            elapsed: Duration::ZERO,
        }
    }

    #[test]
    fn test_build_http_client() {
        let client = HttpClient::new(&HttpConfig::default()).unwrap();
        assert_eq!(client.max_concurrency(), 20);
        assert_eq!(client.stats().requests, 0);
    }

    #[test]
    fn test_zero_concurrency_is_clamped() {
        let config = HttpConfig {
            max_concurrency: 0,
            ..HttpConfig::default()
        };
        let client = HttpClient::new(&config).unwrap();
        assert_eq!(client.max_concurrency(), 1);
    }

    #[test]
    fn test_location_resolved_against_request_url() {
        let response = response_with(&[("location", "other")]);
        assert!(response.is_redirect());
        assert_eq!(
            response.location().unwrap().as_str(),
            "http://example.com/dir/other"
        );
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let response = response_with(&[("set-cookie", "a=1"), ("Set-Cookie", "b=2")]);
        assert_eq!(response.header("SET-COOKIE"), Some("a=1"));
        assert_eq!(response.header_all("set-cookie").count(), 2);
    }

    #[test]
    fn test_window_resets() {
        let counters = Counters::default();
        for _ in 0..RESPONSE_WINDOW {
            counters.record_response(Duration::from_millis(10));
        }
        assert_eq!(counters.window_count.load(Ordering::Relaxed), 0);
        assert_eq!(counters.responses.load(Ordering::Relaxed), RESPONSE_WINDOW);
    }

    #[tokio::test]
    async fn test_connection_refused_is_network_error() {
        let client = HttpClient::new(&HttpConfig::default()).unwrap();
        let url = Url::parse("http://127.0.0.1:1/").unwrap();
        let err = client.get(&url).await.unwrap_err();
        assert!(matches!(err, HttpError::Network { .. }));
        assert_eq!(client.stats().requests, 1);
        assert_eq!(client.stats().in_flight, 0);
    }
}
