//! Sumi-Harvest main entry point
//!
//! This is the command-line interface for the Sumi-Harvest content crawler.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use sumi_harvest::config::{
    load_config_with_hash, validate, validate_request, Config, RunRequest,
};
use sumi_harvest::crawler::run;
use sumi_harvest::output::print_statistics;
use tracing_subscriber::EnvFilter;

/// Sumi-Harvest: a content-ingestion crawler
///
/// Sumi-Harvest reads web pages, PDFs and drive folders, follows in-scope
/// links within a depth and page budget, and writes a chunked JSON
/// knowledge base.
#[derive(Parser, Debug)]
#[command(name = "sumi-harvest")]
#[command(version)]
#[command(about = "A content-ingestion crawler", long_about = None)]
struct Cli {
    /// Seed URLs (web pages, PDFs, drive folders)
    #[arg(value_name = "URL")]
    urls: Vec<String>,

    /// Team the knowledge base belongs to
    #[arg(long, env = "SUMI_TEAM_ID")]
    team: String,

    /// User stamped on every item
    #[arg(long)]
    user: String,

    /// Path to a TOML configuration file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Maximum number of sources to fetch
    #[arg(long)]
    max_pages: Option<u32>,

    /// Link depth to follow from the seeds
    #[arg(long)]
    max_depth: Option<u32>,

    /// Minimum seconds between requests to one host
    #[arg(long)]
    delay: Option<f64>,

    /// Maximum concurrent fetches
    #[arg(long)]
    max_concurrent: Option<u32>,

    /// Fetch one source at a time
    #[arg(long)]
    sync: bool,

    /// Chunk size in characters
    #[arg(long)]
    chunk_size: Option<usize>,

    /// Characters shared by consecutive chunks
    #[arg(long)]
    chunk_overlap: Option<usize>,

    /// Output file
    #[arg(short, long, value_name = "FILE")]
    output: Option<String>,

    /// Directory for the output file
    #[arg(long, env = "SUMI_OUTPUT_DIR", value_name = "DIR")]
    output_dir: Option<String>,

    /// WebDriver endpoint used to render script-heavy pages
    #[arg(long, value_name = "URL")]
    webdriver: Option<String>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate the configuration and show what would be crawled
    #[arg(long)]
    dry_run: bool,
}

impl Cli {
    /// Applies command-line overrides on top of the file or default config
    fn apply_overrides(&self, config: &mut Config) {
        if let Some(max_pages) = self.max_pages {
            config.crawl.max_pages = max_pages;
        }
        if let Some(max_depth) = self.max_depth {
            config.crawl.max_depth = max_depth;
        }
        if let Some(delay) = self.delay {
            config.crawl.delay = delay;
        }
        if let Some(max_concurrent) = self.max_concurrent {
            config.crawl.max_concurrent = max_concurrent;
        }
        if self.sync {
            config.crawl.use_async = false;
        }
        if let Some(chunk_size) = self.chunk_size {
            config.extraction.chunk_size = chunk_size;
        }
        if let Some(chunk_overlap) = self.chunk_overlap {
            config.extraction.chunk_overlap = chunk_overlap;
        }
        if let Some(output) = &self.output {
            config.output.path = output.clone();
        }
        if let Some(dir) = &self.output_dir {
            config.output.directory = Some(dir.clone());
        }
        if let Some(webdriver) = &self.webdriver {
            config.render.webdriver_url = Some(webdriver.clone());
        }
    }

    fn request(&self) -> RunRequest {
        RunRequest {
            team_id: self.team.clone(),
            user_id: self.user.clone(),
            urls: self.urls.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    let mut config = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            let (config, hash) = load_config_with_hash(path)
                .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            config
        }
        None => Config::default(),
    };
    cli.apply_overrides(&mut config);

    let request = cli.request();
    validate(&config).context("Invalid configuration")?;
    validate_request(&request).context("Invalid request")?;

    if cli.dry_run {
        handle_dry_run(&config, &request);
        return Ok(());
    }

    handle_run(config, request, cli.quiet).await
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("sumi_harvest=info,warn"),
            1 => EnvFilter::new("sumi_harvest=debug,info"),
            2 => EnvFilter::new("sumi_harvest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles --dry-run: shows the resolved configuration and seeds
fn handle_dry_run(config: &Config, request: &RunRequest) {
    println!("=== Sumi-Harvest Dry Run ===\n");

    println!("Request:");
    println!("  Team: {}", request.team_id);
    println!("  User: {}", request.user_id);

    println!("\nCrawl:");
    println!("  Max pages: {}", config.crawl.max_pages);
    println!("  Max depth: {}", config.crawl.max_depth);
    println!("  Concurrency: {}", config.crawl.concurrency());
    println!("  Host delay: {:?}", config.crawl.host_delay());
    println!("  Discovery threshold: {}", config.crawl.discovery_threshold);
    println!("  Respect robots.txt: {}", config.crawl.respect_robots_txt);
    if !config.crawl.allowed_hosts.is_empty() {
        println!("  Allowed hosts: {}", config.crawl.allowed_hosts.join(", "));
    }

    println!("\nExtraction:");
    println!("  Chunk size: {}", config.extraction.chunk_size);
    println!("  Chunk overlap: {}", config.extraction.chunk_overlap);
    match &config.render.webdriver_url {
        Some(url) => println!("  Renderer: WebDriver at {}", url),
        None => println!("  Renderer: none (static extraction only)"),
    }

    println!("\nUser Agent: {}", config.user_agent.header_value());
    println!("Output: {}", config.output.resolved_path().display());

    println!("\nSeeds ({}):", request.urls.len());
    for url in &request.urls {
        println!("  - {}", url);
    }

    println!("\n✓ Configuration is valid");
}

/// Handles the harvest itself
async fn handle_run(config: Config, request: RunRequest, quiet: bool) -> anyhow::Result<()> {
    tracing::info!(
        "Harvesting {} seed URL(s) for team {}",
        request.urls.len(),
        request.team_id
    );

    let summary = run(request, config).await.context("Harvest failed")?;

    for source in &summary.failures {
        if let Some(failure) = &source.failure {
            tracing::warn!("{}: {} ({})", source.url, failure.kind, failure.detail);
        }
    }
    tracing::info!(
        "Wrote {} item(s) to {}",
        summary.items,
        summary.output_path.display()
    );

    if !quiet {
        print_statistics(&summary.stats);
    }
    Ok(())
}
