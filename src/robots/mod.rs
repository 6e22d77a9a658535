//! Robots.txt handling module
//!
//! robots.txt is fetched at most once per host per run, through the same
//! fetcher as page content. A missing or unreachable file allows everything.

mod parser;

pub use parser::{RobotsPolicy, MAX_CRAWL_DELAY};

use crate::crawler::{FetchResult, Fetcher};
use crate::url::host_key;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::debug;
use url::Url;

type PolicyCell = Arc<OnceCell<Arc<RobotsPolicy>>>;

/// Per-origin robots.txt policies for one run
#[derive(Default)]
pub struct RobotsCache {
    policies: Mutex<HashMap<String, PolicyCell>>,
}

impl RobotsCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the policy for the URL's origin, fetching robots.txt on first use
    ///
    /// Concurrent callers for the same host wait on a single fetch.
    pub async fn policy_for(
        &self,
        url: &Url,
        fetcher: &dyn Fetcher,
        timeout: Duration,
    ) -> Arc<RobotsPolicy> {
        let (Some(host), Some(robots_url)) = (host_key(url), robots_url(url)) else {
            return Arc::new(RobotsPolicy::allow_all());
        };
        // http and https are separate origins with their own robots.txt
        let origin = format!("{}://{}", url.scheme(), host);

        let cell = {
            let mut policies = self.policies.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(policies.entry(origin).or_default())
        };

        cell.get_or_init(|| async move {
            let policy = match fetcher.fetch(&robots_url, timeout, 0).await {
                FetchResult::Success { body, .. } => {
                    RobotsPolicy::from_content(&String::from_utf8_lossy(&body))
                }
                other => {
                    debug!("No robots.txt at {} ({})", robots_url, other.describe());
                    RobotsPolicy::allow_all()
                }
            };
            Arc::new(policy)
        })
        .await
        .clone()
    }
}

/// The robots.txt location for a URL's origin
pub fn robots_url(url: &Url) -> Option<Url> {
    url.host_str()?;
    url.join("/robots.txt").ok()
}
