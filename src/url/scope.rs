use crate::config::CrawlConfig;
use crate::url::normalize::host_key;
use url::Url;

/// Checks if a host matches a wildcard pattern
///
/// Two pattern forms are supported:
/// 1. Exact match: "example.com" matches only "example.com"
/// 2. Wildcard match: "*.example.com" matches "example.com" itself and any
///    subdomain at any nesting level
///
/// # Examples
///
/// ```
/// use sumi_harvest::url::matches_wildcard;
///
/// assert!(matches_wildcard("*.example.com", "docs.example.com"));
/// assert!(!matches_wildcard("*.example.com", "example.org"));
/// ```
pub fn matches_wildcard(pattern: &str, candidate: &str) -> bool {
    match pattern.strip_prefix("*.") {
        Some(base) => candidate == base || candidate.ends_with(&format!(".{}", base)),
        None => candidate == pattern,
    }
}

/// Decides which discovered links the crawl is allowed to follow
#[derive(Debug, Clone)]
pub struct LinkScope {
    allowed_hosts: Vec<String>,
    skip_patterns: Vec<String>,
}

impl LinkScope {
    pub fn new(allowed_hosts: Vec<String>, skip_patterns: Vec<String>) -> Self {
        Self {
            allowed_hosts: allowed_hosts.into_iter().map(|h| h.to_lowercase()).collect(),
            skip_patterns: skip_patterns.into_iter().map(|p| p.to_lowercase()).collect(),
        }
    }

    pub fn from_config(config: &CrawlConfig) -> Self {
        Self::new(config.allowed_hosts.clone(), config.skip_patterns.clone())
    }

    /// Same site means equal host identity (`www.` ignored, port significant)
    pub fn is_same_site(&self, parent: &Url, candidate: &Url) -> bool {
        match (host_key(parent), host_key(candidate)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    /// Whether the candidate's host matches one of the allowed cross-site patterns
    pub fn is_allowed_host(&self, candidate: &Url) -> bool {
        let Some(host) = candidate.host_str() else {
            return false;
        };
        let host = host.to_lowercase();
        let host = host.strip_prefix("www.").unwrap_or(&host);
        self.allowed_hosts
            .iter()
            .any(|pattern| matches_wildcard(pattern, host))
    }

    /// Whether the URL looks like a non-content page (tag index, login, asset...)
    pub fn is_skipped(&self, candidate: &Url) -> bool {
        let path = candidate.path().to_lowercase();
        let target = match candidate.query() {
            Some(query) => format!("{}?{}", path, query.to_lowercase()),
            None => path.clone(),
        };

        self.skip_patterns.iter().any(|pattern| {
            if pattern.starts_with('.') && !pattern.contains('/') {
                path.ends_with(pattern.as_str())
            } else {
                target.contains(pattern.as_str())
            }
        })
    }

    /// Full admission check for a link found on `parent`
    pub fn admits(&self, parent: &Url, candidate: &Url) -> bool {
        if candidate.scheme() != "http" && candidate.scheme() != "https" {
            return false;
        }
        if !(self.is_same_site(parent, candidate) || self.is_allowed_host(candidate)) {
            return false;
        }
        !self.is_skipped(candidate)
    }
}
