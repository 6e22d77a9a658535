//! Configuration module for Sumi-Harvest
//!
//! Settings are layered: built-in defaults, then an optional TOML file, then
//! environment and command-line overrides applied by the binary.
//!
//! # Example
//!
//! ```no_run
//! use sumi_harvest::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("harvest.toml")).unwrap();
//! println!("Harvest will follow links to depth {}", config.crawl.max_depth);
//! ```

mod parser;
mod types;
mod validation;

pub use types::{
    CacheConfig, Config, CrawlConfig, ExtractionConfig, FetchConfig, OutputConfig, RenderConfig,
    RunRequest, UserAgentConfig, DEFAULT_EXPAND_SELECTORS, DEFAULT_SKIP_PATTERNS,
};

pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};

pub use validation::{validate, validate_request};
