use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// URL fragments that mark pages with no standalone content
pub const DEFAULT_SKIP_PATTERNS: &[&str] = &[
    "/tag/", "/category/", "/author/", "/search", "/login", "/signup", "/privacy", "/terms",
    ".jpg", ".jpeg", ".png", ".gif", ".svg", ".css", ".js", ".zip",
];

/// Selectors clicked by the rendered extractor to expand dynamic listings
pub const DEFAULT_EXPAND_SELECTORS: &[&str] = &[
    "[aria-expanded='false']",
    "details:not([open]) > summary",
    "button[class*='load-more']",
    "button[class*='show-more']",
    "a[class*='load-more']",
];

/// Main configuration structure for Sumi-Harvest
///
/// Every section has defaults, so an empty TOML file (or no file at all)
/// yields a usable configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    pub crawl: CrawlConfig,
    pub fetch: FetchConfig,
    pub extraction: ExtractionConfig,
    pub cache: CacheConfig,
    pub render: RenderConfig,
    pub user_agent: UserAgentConfig,
    pub output: OutputConfig,
}

/// Crawl scope and politeness configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CrawlConfig {
    /// Maximum number of sources that may reach the fetching state
    pub max_pages: u32,

    /// Maximum link distance from a seed
    pub max_depth: u32,

    /// Maximum number of sources in flight at once
    pub max_concurrent: u32,

    /// Minimum delay between two dispatches to the same host (seconds)
    pub delay: f64,

    /// When false, sources are processed one at a time
    pub use_async: bool,

    /// Pages discovering fewer in-scope links than this are escalated to rendering
    pub discovery_threshold: usize,

    /// Cross-site host patterns (e.g. "*.example.com") treated as in scope
    pub allowed_hosts: Vec<String>,

    /// URL substrings that are never followed
    pub skip_patterns: Vec<String>,

    /// Whether to consult robots.txt before fetching
    pub respect_robots_txt: bool,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            max_pages: 50,
            max_depth: 1,
            max_concurrent: 10,
            delay: 1.0,
            use_async: true,
            discovery_threshold: 5,
            allowed_hosts: Vec::new(),
            skip_patterns: DEFAULT_SKIP_PATTERNS.iter().map(|s| s.to_string()).collect(),
            respect_robots_txt: true,
        }
    }
}

impl CrawlConfig {
    /// Per-host minimum delay as a Duration
    pub fn host_delay(&self) -> Duration {
        Duration::from_secs_f64(self.delay.max(0.0))
    }

    /// Number of concurrency slots actually used
    pub fn concurrency(&self) -> usize {
        if self.use_async {
            self.max_concurrent.max(1) as usize
        } else {
            1
        }
    }
}

/// Fetcher configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct FetchConfig {
    /// Per-request timeout (seconds)
    pub timeout_secs: u64,

    /// Retries after the first attempt for transient failures
    pub max_retries: u32,

    /// Base of the exponential backoff between retries (milliseconds)
    pub retry_backoff_ms: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_retries: 3,
            retry_backoff_ms: 500,
        }
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

/// Text chunking configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ExtractionConfig {
    /// Target chunk size in characters
    pub chunk_size: usize,

    /// Characters repeated between consecutive chunks
    pub chunk_overlap: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            chunk_size: 5000,
            chunk_overlap: 200,
        }
    }
}

/// Content cache configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CacheConfig {
    /// Maximum number of cached entries
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { capacity: 1000 }
    }
}

/// Rendered extraction configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RenderConfig {
    /// WebDriver endpoint; rendering is disabled when unset
    pub webdriver_url: Option<String>,

    /// Time to let the page settle after load and after expansion clicks (milliseconds)
    pub settle_ms: u64,

    /// Page load timeout (seconds)
    pub page_load_timeout_secs: u64,

    /// Upper bound on expansion clicks per page
    pub max_clicks: usize,

    /// CSS selectors of elements to click before capturing markup
    pub expand_selectors: Vec<String>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            webdriver_url: None,
            settle_ms: 2000,
            page_load_timeout_secs: 30,
            max_clicks: 20,
            expand_selectors: DEFAULT_EXPAND_SELECTORS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct UserAgentConfig {
    /// Name of the crawler
    pub crawler_name: String,

    /// Version of the crawler
    pub crawler_version: String,

    /// URL with information about the crawler
    pub contact_url: Option<String>,
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self {
            crawler_name: "SumiHarvest".to_string(),
            crawler_version: env!("CARGO_PKG_VERSION").to_string(),
            contact_url: None,
        }
    }
}

impl UserAgentConfig {
    /// Formats the User-Agent header: `Name/Version (+ContactURL)`
    pub fn header_value(&self) -> String {
        match &self.contact_url {
            Some(contact) => format!(
                "{}/{} (+{})",
                self.crawler_name, self.crawler_version, contact
            ),
            None => format!("{}/{}", self.crawler_name, self.crawler_version),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct OutputConfig {
    /// Output file name or path
    pub path: String,

    /// Directory relative output paths are placed in
    pub directory: Option<String>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: "results.json".to_string(),
            directory: None,
        }
    }
}

impl OutputConfig {
    /// Resolves the final output file location
    pub fn resolved_path(&self) -> PathBuf {
        let path = PathBuf::from(&self.path);
        match &self.directory {
            Some(dir) if path.is_relative() => PathBuf::from(dir).join(path),
            _ => path,
        }
    }
}

/// Identifies who a run is for and where it starts
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub team_id: String,
    pub user_id: String,
    pub urls: Vec<String>,
}
