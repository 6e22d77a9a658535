use std::time::{Duration, Instant};

/// Tracks per-host politeness during a run
///
/// The minimum gap between two dispatches to the same host is the larger of
/// the configured delay and any `Crawl-delay` announced in robots.txt.
#[derive(Debug, Clone, Default)]
pub struct HostState {
    /// Number of sources dispatched to this host
    pub dispatched: u32,

    /// When the last source for this host was dispatched
    pub last_dispatch: Option<Instant>,

    /// Crawl-delay from robots.txt, if any
    pub crawl_delay: Option<Duration>,
}

impl HostState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Effective minimum gap between dispatches
    pub fn effective_delay(&self, base: Duration) -> Duration {
        match self.crawl_delay {
            Some(delay) if delay > base => delay,
            _ => base,
        }
    }

    /// Checks if a source for this host may be dispatched now
    pub fn can_dispatch(&self, base: Duration, now: Instant) -> bool {
        self.time_until_ready(base, now).is_none()
    }

    /// Returns None if dispatch is allowed now, or how long to wait otherwise
    pub fn time_until_ready(&self, base: Duration, now: Instant) -> Option<Duration> {
        let last = self.last_dispatch?;
        let min_delay = self.effective_delay(base);
        let elapsed = now.saturating_duration_since(last);
        if elapsed < min_delay {
            Some(min_delay - elapsed)
        } else {
            None
        }
    }

    /// Records that a source was dispatched to this host
    pub fn record_dispatch(&mut self, now: Instant) {
        self.dispatched += 1;
        self.last_dispatch = Some(now);
    }

    /// Applies a robots.txt crawl delay
    pub fn set_crawl_delay(&mut self, delay: Option<Duration>) {
        self.crawl_delay = delay;
    }
}
