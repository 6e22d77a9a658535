//! Lifecycle states of a source during a harvest run
use std::fmt;

/// Represents the current state of a source in the crawl process
///
/// ```text
/// Discovered -> Queued -> Fetching -> Extracting -> Done
///                  |          |           |
///                  |          |           +-> EscalatedExtracting -> Done
///                  +----------+-----------+-> Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceState {
    // ===== Active States =====
    /// Seed or extracted link, not yet admitted to the frontier
    Discovered,

    /// Admitted to the frontier, waiting for a slot and its host delay
    Queued,

    /// Dispatched; the fetch (or cache lookup) is in flight
    Fetching,

    /// Content retrieved; the category's extractor is running
    Extracting,

    /// Static extraction found too little; the rendered extractor is running
    EscalatedExtracting,

    // ===== Terminal States =====
    /// Extraction finished and produced output
    Done,

    /// Dropped after a fetch, robots, budget or extraction failure
    Failed,
}

impl SourceState {
    /// Returns true if no further transition is possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Returns true while the source is owned by a worker task
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            Self::Fetching | Self::Extracting | Self::EscalatedExtracting
        )
    }

    /// Whether the state machine permits moving from `self` to `next`
    pub fn can_transition_to(&self, next: SourceState) -> bool {
        use SourceState::*;
        matches!(
            (self, next),
            (Discovered, Queued)
                | (Queued, Fetching)
                | (Queued, Failed)
                | (Fetching, Extracting)
                | (Fetching, Failed)
                | (Extracting, EscalatedExtracting)
                | (Extracting, Done)
                | (Extracting, Failed)
                | (EscalatedExtracting, Done)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Discovered => "discovered",
            Self::Queued => "queued",
            Self::Fetching => "fetching",
            Self::Extracting => "extracting",
            Self::EscalatedExtracting => "escalated_extracting",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for SourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Why a source ended in the `Failed` state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FailureKind {
    /// 4xx response; never retried
    HttpClientError,
    /// Connection failure, timeout or 5xx after all retries
    NetworkFailure,
    /// robots.txt disallows the URL
    RobotsDisallowed,
    /// Content could not be extracted (unreadable PDF, folder listing error)
    ParseFailure,
    /// Cancelled in the frontier because the page budget ran out
    BudgetExceeded,
    /// The worker task hit an internal error or panicked
    WorkerError,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HttpClientError => "http_client_error",
            Self::NetworkFailure => "network_failure",
            Self::RobotsDisallowed => "robots_disallowed",
            Self::ParseFailure => "parse_failure",
            Self::BudgetExceeded => "budget_exceeded",
            Self::WorkerError => "worker_error",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
