//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `SourceState`: lifecycle of a single source (discovered, queued, fetching, ...)
//! - `Source`: a URL with its identity key, depth, discovery order and state
//! - `HostState`: per-host dispatch timing for politeness
//! - `VisitedSet`: normalized URLs already claimed in the run

mod host_state;
mod source;
mod source_state;
mod visited;

pub use host_state::HostState;
pub use source::{Origin, Source, SourceFailure};
pub use source_state::{FailureKind, SourceState};
pub use visited::VisitedSet;
