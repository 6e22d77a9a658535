use crate::state::{FailureKind, SourceState};
use crate::url::{classify_url, SourceCategory};
use crate::{Result, SumiError};
use url::Url;

/// How a source entered the run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Origin {
    /// Given on the command line
    Seed,
    /// Extracted from a page's links
    Link,
    /// Listed inside a drive folder
    FolderChild,
}

/// A recorded per-source failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFailure {
    pub kind: FailureKind,
    pub detail: String,
}

/// A seed or discovered URL moving through the crawl
#[derive(Debug, Clone)]
pub struct Source {
    /// Absolute URL as discovered; this is what gets fetched
    pub url: Url,

    /// Normalized URL string; identity and cache key
    pub key: String,

    /// Link distance from the seed (0 for seeds)
    pub depth: u32,

    /// Discovery order, used to sort output
    pub seq: u64,

    pub origin: Origin,

    /// Category to use instead of URL classification
    pub hint: Option<SourceCategory>,

    /// Set once the rendered extractor has been invoked
    pub escalated: bool,

    pub failure: Option<SourceFailure>,

    category: Option<SourceCategory>,
    state: SourceState,
}

impl Source {
    /// Creates a source in the `Discovered` state
    pub fn new(url: Url, key: String, depth: u32, seq: u64, origin: Origin) -> Self {
        Self {
            url,
            key,
            depth,
            seq,
            origin,
            hint: None,
            escalated: false,
            failure: None,
            category: None,
            state: SourceState::Discovered,
        }
    }

    pub fn with_hint(mut self, hint: SourceCategory) -> Self {
        self.hint = Some(hint);
        self
    }

    pub fn state(&self) -> SourceState {
        self.state
    }

    /// Category of the source, classified on first use
    pub fn category(&mut self) -> SourceCategory {
        if let Some(category) = self.category {
            return category;
        }
        let category = self.hint.unwrap_or_else(|| classify_url(&self.url));
        self.category = Some(category);
        category
    }

    /// Replaces the cached category after a response or escalation
    pub fn reclassify(&mut self, category: SourceCategory) {
        self.category = Some(category);
    }

    /// Moves to `next`, rejecting transitions the state machine forbids
    pub fn advance(&mut self, next: SourceState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(SumiError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }

    /// Moves to `Failed` and records why
    pub fn fail(&mut self, kind: FailureKind, detail: impl Into<String>) -> Result<()> {
        self.advance(SourceState::Failed)?;
        self.failure = Some(SourceFailure {
            kind,
            detail: detail.into(),
        });
        Ok(())
    }
}
