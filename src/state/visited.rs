use std::collections::HashSet;
use std::sync::{PoisonError, RwLock};

/// Normalized URLs already claimed in this run
///
/// A key is claimed when its source is admitted to the frontier (or when a
/// redirect lands on it). The set only grows.
#[derive(Debug, Default)]
pub struct VisitedSet {
    keys: RwLock<HashSet<String>>,
}

impl VisitedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims a key; returns false if it was already claimed
    pub fn claim(&self, key: &str) -> bool {
        let mut keys = self.keys.write().unwrap_or_else(PoisonError::into_inner);
        keys.insert(key.to_string())
    }

    pub fn len(&self) -> usize {
        self.keys.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
