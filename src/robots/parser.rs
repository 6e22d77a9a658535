//! Robots.txt rules for one host

use robotstxt::DefaultMatcher;
use std::time::Duration;
use url::Url;

/// Longest `Crawl-delay` honoured; larger values are clamped
pub const MAX_CRAWL_DELAY: Duration = Duration::from_secs(60);

/// Parsed robots.txt for a host
///
/// Allow/Disallow matching is delegated to the `robotstxt` crate; the
/// `Crawl-delay` extension is read directly from the group that applies to
/// our agent (falling back to the `*` group).
#[derive(Debug, Clone, Default)]
pub struct RobotsPolicy {
    /// Raw robots.txt content; empty means allow everything
    content: String,
}

impl RobotsPolicy {
    pub fn from_content(content: &str) -> Self {
        Self {
            content: content.to_string(),
        }
    }

    /// A policy that allows everything (missing or unreadable robots.txt)
    pub fn allow_all() -> Self {
        Self::default()
    }

    pub fn is_allow_all(&self) -> bool {
        self.content.trim().is_empty()
    }

    /// Checks whether `url` may be fetched by `agent`
    pub fn allows(&self, url: &Url, agent: &str) -> bool {
        if self.is_allow_all() {
            return true;
        }
        let mut matcher = DefaultMatcher::default();
        matcher.one_agent_allowed_by_robots(&self.content, agent, url.as_str())
    }

    /// Crawl delay for `agent`, preferring its own group over `*`
    pub fn crawl_delay(&self, agent: &str) -> Option<Duration> {
        if self.is_allow_all() {
            return None;
        }

        let agent = agent.to_lowercase();
        let mut group_agents: Vec<String> = Vec::new();
        let mut in_agent_lines = false;
        let mut specific = None;
        let mut wildcard = None;

        for line in self.content.lines() {
            let line = line.split('#').next().unwrap_or("").trim();
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim().to_lowercase();
            let value = value.trim();

            if key == "user-agent" {
                // consecutive user-agent lines share one group
                if !in_agent_lines {
                    group_agents.clear();
                }
                group_agents.push(value.to_lowercase());
                in_agent_lines = true;
                continue;
            }
            in_agent_lines = false;

            if key != "crawl-delay" {
                continue;
            }
            let Ok(seconds) = value.parse::<f64>() else {
                continue;
            };
            if !seconds.is_finite() || seconds < 0.0 {
                continue;
            }

            let delay = Duration::try_from_secs_f64(seconds)
                .map_or(MAX_CRAWL_DELAY, |delay| delay.min(MAX_CRAWL_DELAY));
            if group_agents.iter().any(|ua| ua != "*" && agent.contains(ua.as_str())) {
                specific.get_or_insert(delay);
            } else if group_agents.iter().any(|ua| ua == "*") {
                wildcard.get_or_insert(delay);
            }
        }

        specific.or(wildcard)
    }
}
