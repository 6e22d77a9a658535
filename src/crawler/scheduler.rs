//! Scheduler for the crawl frontier and politeness
//!
//! This module handles:
//! - Frontier ordering (depth, then listing-like pages, then discovery order)
//! - Global concurrency limiting via a semaphore
//! - Per-host minimum delays, including robots.txt crawl delays

use crate::config::CrawlConfig;
use crate::state::{HostState, Source};
use crate::url::{host_key, is_listing_like};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::trace;

/// A source waiting in the frontier
#[derive(Debug, Clone)]
struct QueuedSource {
    source: Source,
    host: String,
    listing: bool,
}

impl QueuedSource {
    fn new(source: Source) -> Self {
        let host = host_key(&source.url).unwrap_or_default();
        let listing = is_listing_like(&source.url);
        Self {
            source,
            host,
            listing,
        }
    }
}

// BinaryHeap pops the greatest element, so every comparison is reversed:
// shallower, listing-like and earlier-discovered sources compare greater.
impl Ord for QueuedSource {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .source
            .depth
            .cmp(&self.source.depth)
            .then_with(|| self.listing.cmp(&other.listing))
            .then_with(|| other.source.seq.cmp(&self.source.seq))
    }
}

impl PartialOrd for QueuedSource {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for QueuedSource {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueuedSource {}

/// A source cleared for dispatch, holding its concurrency slot
pub struct ScheduledSource {
    pub source: Source,

    /// Released when the worker handling the source finishes
    pub permit: OwnedSemaphorePermit,
}

/// Scheduler owns the frontier and decides what may be dispatched next
///
/// The scheduler enforces:
/// - The global concurrency bound (one permit per in-flight source)
/// - The per-host minimum gap between dispatches
/// - Frontier priority order
pub struct Scheduler {
    semaphore: Arc<Semaphore>,
    hosts: HashMap<String, HostState>,
    frontier: BinaryHeap<QueuedSource>,
    base_delay: Duration,
}

impl Scheduler {
    pub fn new(config: &CrawlConfig) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(config.concurrency())),
            hosts: HashMap::new(),
            frontier: BinaryHeap::new(),
            base_delay: config.host_delay(),
        }
    }

    /// Adds a queued source to the frontier
    pub fn push(&mut self, source: Source) {
        self.frontier.push(QueuedSource::new(source));
    }

    /// Returns the highest-priority source whose host is ready, if a
    /// concurrency slot is free
    ///
    /// Sources whose host is still cooling down stay in the frontier.
    pub fn next_ready(&mut self, now: Instant) -> Option<ScheduledSource> {
        if self.frontier.is_empty() {
            return None;
        }
        let permit = Arc::clone(&self.semaphore).try_acquire_owned().ok()?;

        let mut not_ready = Vec::new();
        let mut found = None;

        while let Some(queued) = self.frontier.pop() {
            let ready = self
                .hosts
                .get(&queued.host)
                .map_or(true, |state| state.can_dispatch(self.base_delay, now));
            trace!("Host {} ready for {}: {}", queued.host, queued.source.url, ready);

            if ready {
                found = Some(queued);
                break;
            }
            not_ready.push(queued);
        }

        self.frontier.extend(not_ready);

        let queued = found?;
        self.hosts
            .entry(queued.host)
            .or_default()
            .record_dispatch(now);

        Some(ScheduledSource {
            source: queued.source,
            permit,
        })
    }

    /// Time until some queued host becomes ready
    ///
    /// Returns None when the frontier is empty and `Duration::ZERO` when a
    /// source could be dispatched right away.
    pub fn time_until_ready(&self, now: Instant) -> Option<Duration> {
        self.frontier
            .iter()
            .map(|queued| {
                self.hosts
                    .get(&queued.host)
                    .and_then(|state| state.time_until_ready(self.base_delay, now))
                    .unwrap_or(Duration::ZERO)
            })
            .min()
    }

    /// Whether a concurrency slot is currently free
    pub fn has_capacity(&self) -> bool {
        self.semaphore.available_permits() > 0
    }

    /// Applies a robots.txt crawl delay to a host
    pub fn set_crawl_delay(&mut self, host: &str, delay: Option<Duration>) {
        self.hosts
            .entry(host.to_string())
            .or_default()
            .set_crawl_delay(delay);
    }

    /// Removes every queued source, in priority order
    pub fn cancel_all(&mut self) -> Vec<Source> {
        let mut cancelled = Vec::with_capacity(self.frontier.len());
        while let Some(queued) = self.frontier.pop() {
            cancelled.push(queued.source);
        }
        cancelled
    }

    pub fn frontier_size(&self) -> usize {
        self.frontier.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frontier.is_empty()
    }
}
