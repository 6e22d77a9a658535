//! Crawler module for fetching and orchestrating a harvest run
//!
//! This module contains the core crawling logic, including:
//! - HTTP fetching with retry logic and single-flight deduplication
//! - Frontier scheduling and per-host politeness
//! - The orchestrator state machine driving each source
//! - The `run` entry point wiring real capabilities to the orchestrator

mod coordinator;
mod fetcher;
mod scheduler;

pub use coordinator::{CrawlReport, HarvestOutcome, Orchestrator};
pub use fetcher::{build_http_client, FetchGate, FetchResult, Fetcher, HttpFetcher};
pub use scheduler::{ScheduledSource, Scheduler};

use crate::config::{validate, validate_request, Config, RunRequest};
use crate::extract::{DriveFolderLister, WebDriverRenderer};
use crate::output::{write_json, RunStats};
use crate::state::Source;
use crate::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// What a completed run produced
#[derive(Debug)]
pub struct RunSummary {
    /// Where the knowledge base was written
    pub output_path: PathBuf,

    /// Number of items in the knowledge base
    pub items: usize,

    /// Sources that ended in `Failed`
    pub failures: Vec<Source>,

    pub stats: RunStats,
}

/// Runs a complete harvest
///
/// This is the main entry point. It will:
/// 1. Validate the configuration and the request
/// 2. Build the HTTP fetcher, folder lister and (if configured) renderer
/// 3. Crawl every seed and what it links to
/// 4. Write the knowledge base, even when some sources failed
///
/// # Example
///
/// ```no_run
/// use sumi_harvest::config::{Config, RunRequest};
/// use sumi_harvest::crawler::run;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let request = RunRequest {
///     team_id: "team-42".to_string(),
///     user_id: "user-7".to_string(),
///     urls: vec!["https://example.com/blog".to_string()],
/// };
/// let summary = run(request, Config::default()).await?;
/// println!("{} items written to {}", summary.items, summary.output_path.display());
/// # Ok(())
/// # }
/// ```
pub async fn run(request: RunRequest, config: Config) -> Result<RunSummary> {
    validate(&config)?;
    validate_request(&request)?;

    let fetcher: Arc<dyn Fetcher> =
        Arc::new(HttpFetcher::from_config(&config.user_agent, &config.fetch)?);
    let folder_lister = Arc::new(DriveFolderLister::new(
        Arc::clone(&fetcher),
        config.fetch.timeout(),
        config.fetch.max_retries,
    ));
    let renderer = config.render.webdriver_url.as_ref().map(|endpoint| {
        info!("Rendering escalations through WebDriver at {}", endpoint);
        WebDriverRenderer::new(
            endpoint.clone(),
            config.render.clone(),
            config.user_agent.header_value(),
        )
    });
    let output_path = config.output.resolved_path();

    let mut orchestrator = Orchestrator::new(config, fetcher, folder_lister);
    if let Some(renderer) = renderer {
        orchestrator = orchestrator.with_renderer(Arc::new(renderer));
    }

    let outcome = orchestrator.run(&request).await?;
    write_json(&outcome.knowledge_base, &output_path)?;

    Ok(RunSummary {
        output_path,
        items: outcome.knowledge_base.items.len(),
        failures: outcome.failures,
        stats: outcome.stats,
    })
}
