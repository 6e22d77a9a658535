//! HTTP fetcher implementation
//!
//! This module handles all network retrieval for the crawler:
//! - Building the shared HTTP client with our user agent
//! - GET requests with per-request timeouts
//! - Retry with exponential backoff for transient failures
//! - The single-flight gate that collapses concurrent fetches of one URL

use crate::config::{FetchConfig, UserAgentConfig};
use crate::state::FailureKind;
use async_trait::async_trait;
use reqwest::{header, Client};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, trace};
use url::Url;

/// Upper bound for a single backoff sleep
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Result of a fetch operation
#[derive(Debug, Clone)]
pub enum FetchResult {
    /// Retrieved the resource
    Success {
        /// Final URL after redirects
        final_url: Url,
        /// HTTP status code
        status_code: u16,
        /// Content-Type header value, if any
        content_type: Option<String>,
        /// Raw response body
        body: Vec<u8>,
    },

    /// Error status: 4xx immediately, 5xx once retries are exhausted
    HttpError {
        status_code: u16,
        attempts: u32,
    },

    /// Connection failure or timeout after all retries
    NetworkError {
        error: String,
        attempts: u32,
    },
}

impl FetchResult {
    /// How a failed fetch is recorded; None for success
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Self::Success { .. } => None,
            Self::HttpError { status_code, .. } if (400..500).contains(status_code) => {
                Some(FailureKind::HttpClientError)
            }
            Self::HttpError { .. } | Self::NetworkError { .. } => Some(FailureKind::NetworkFailure),
        }
    }

    /// Short human-readable description for logs and the run report
    pub fn describe(&self) -> String {
        match self {
            Self::Success { status_code, .. } => format!("HTTP {}", status_code),
            Self::HttpError {
                status_code,
                attempts,
            } => format!("HTTP {} after {} attempt(s)", status_code, attempts),
            Self::NetworkError { error, attempts } => {
                format!("{} after {} attempt(s)", error, attempts)
            }
        }
    }
}

/// Network retrieval capability
///
/// Implementations retry connection failures, timeouts and 5xx responses
/// up to `max_retries` times; 4xx responses are returned immediately.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &Url, timeout: Duration, max_retries: u32) -> FetchResult;
}

/// Builds the pooled HTTP client shared by every fetch in a run
///
/// # Example
///
/// ```no_run
/// use sumi_harvest::config::UserAgentConfig;
/// use sumi_harvest::crawler::build_http_client;
///
/// let client = build_http_client(&UserAgentConfig::default()).unwrap();
/// ```
pub fn build_http_client(config: &UserAgentConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.header_value())
        .connect_timeout(Duration::from_secs(10))
        .pool_max_idle_per_host(10)
        .gzip(true)
        .brotli(true)
        .build()
}

/// Fetcher backed by reqwest
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
    backoff_base: Duration,
}

impl HttpFetcher {
    pub fn new(client: Client, backoff_base: Duration) -> Self {
        Self {
            client,
            backoff_base,
        }
    }

    pub fn from_config(
        user_agent: &UserAgentConfig,
        fetch: &FetchConfig,
    ) -> Result<Self, reqwest::Error> {
        Ok(Self::new(build_http_client(user_agent)?, fetch.backoff_base()))
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.backoff_base.saturating_mul(factor).min(MAX_BACKOFF)
    }
}

/// Outcome of a single attempt; `Retry` carries the result to report if no
/// attempts remain
enum Attempt {
    Done(FetchResult),
    Retry(FetchResult),
}

impl HttpFetcher {
    async fn attempt(&self, url: &Url, timeout: Duration, attempts: u32) -> Attempt {
        let network_error = |error: String| {
            Attempt::Retry(FetchResult::NetworkError { error, attempts })
        };

        let response = match self.client.get(url.clone()).timeout(timeout).send().await {
            Ok(response) => response,
            Err(e) if e.is_timeout() => return network_error("request timeout".to_string()),
            Err(e) if e.is_connect() => return network_error("connection failed".to_string()),
            Err(e) => return network_error(e.to_string()),
        };

        let status = response.status();
        if status.is_client_error() {
            return Attempt::Done(FetchResult::HttpError {
                status_code: status.as_u16(),
                attempts,
            });
        }
        if status.is_server_error() {
            return Attempt::Retry(FetchResult::HttpError {
                status_code: status.as_u16(),
                attempts,
            });
        }

        let final_url = response.url().clone();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        match response.bytes().await {
            Ok(body) => Attempt::Done(FetchResult::Success {
                final_url,
                status_code: status.as_u16(),
                content_type,
                body: body.to_vec(),
            }),
            Err(e) => network_error(format!("body read failed: {}", e)),
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &Url, timeout: Duration, max_retries: u32) -> FetchResult {
        let max_attempts = max_retries.saturating_add(1);
        let mut attempts = 0;

        loop {
            attempts += 1;
            let failure = match self.attempt(url, timeout, attempts).await {
                Attempt::Done(result) => return result,
                Attempt::Retry(failure) => failure,
            };

            if attempts >= max_attempts {
                debug!("Giving up on {}: {}", url, failure.describe());
                return failure;
            }

            let wait = self.backoff(attempts);
            trace!("Retrying {} in {:?} ({})", url, wait, failure.describe());
            tokio::time::sleep(wait).await;
        }
    }
}

type FetchCell = Arc<OnceCell<Arc<FetchResult>>>;

/// Single-flight gate in front of a fetcher
///
/// Concurrent requests for the same normalized URL share one underlying
/// fetch and all observe the same `Arc<FetchResult>`. The entry is dropped
/// once the fetch completes.
#[derive(Default)]
pub struct FetchGate {
    in_flight: Mutex<HashMap<String, FetchCell>>,
}

impl FetchGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn fetch(
        &self,
        key: &str,
        url: &Url,
        fetcher: &dyn Fetcher,
        timeout: Duration,
        max_retries: u32,
    ) -> Arc<FetchResult> {
        let cell = {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(in_flight.entry(key.to_string()).or_default())
        };

        let result = cell
            .get_or_init(|| async { Arc::new(fetcher.fetch(url, timeout, max_retries).await) })
            .await
            .clone();

        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if in_flight
            .get(key)
            .is_some_and(|current| Arc::ptr_eq(current, &cell))
        {
            in_flight.remove(key);
        }

        result
    }

    #[cfg(test)]
    fn in_flight(&self) -> usize {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
