//! In-memory content cache
//!
//! Extracted content keyed by normalized URL. A hit skips both the fetch and
//! the extraction. The cache can be shared between runs in one process by
//! passing the same `Arc<ContentCache>` to each orchestrator.

use crate::extract::ExtractionOutcome;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, PoisonError};

/// LRU cache of extracted content
///
/// Pages are cached with their links so a hit still feeds discovery.
pub struct ContentCache {
    entries: Mutex<LruCache<String, Arc<ExtractionOutcome>>>,
}

impl ContentCache {
    /// Creates a cache holding at most `capacity` entries (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Looks up a normalized URL, marking it as recently used
    pub fn get(&self, key: &str) -> Option<Arc<ExtractionOutcome>> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.get(key).cloned()
    }

    /// Stores content under a normalized URL, evicting the least recently used entry if full
    pub fn put(&self, key: impl Into<String>, content: ExtractionOutcome) -> Arc<ExtractionOutcome> {
        let content = Arc::new(content);
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.put(key.into(), Arc::clone(&content));
        content
    }

    pub fn contains(&self, key: &str) -> bool {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.contains(key)
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ContentCache {
    fn default() -> Self {
        Self::new(1000)
    }
}
