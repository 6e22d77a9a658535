//! Crawl orchestration
//!
//! The orchestrator drives one run:
//! - Admitting seeds and discovered links into the frontier
//! - Dispatching sources to worker tasks within the concurrency and host limits
//! - Fetching, extracting and escalating each source
//! - Stopping at the page budget and collecting results for the assembler

use crate::cache::ContentCache;
use crate::config::{Config, RunRequest};
use crate::crawler::fetcher::{FetchGate, FetchResult, Fetcher};
use crate::crawler::scheduler::{ScheduledSource, Scheduler};
use crate::extract::{
    confirm_token, with_confirm_token, ExtractContext, ExtractedPage, ExtractionOutcome,
    Extractor, FolderLister, RenderError, Renderer,
};
use crate::output::{assemble, Harvested, KnowledgeBase, RunStats};
use crate::robots::RobotsCache;
use crate::state::{FailureKind, Origin, Source, SourceState, VisitedSet};
use crate::url::{
    classify_response, drive_download_target, drive_file_id, host_key, normalized_key,
    LinkScope, SourceCategory,
};
use crate::{Result, SumiError};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tracing::{debug, error, info, trace, warn};
use url::Url;

/// Completed sources between two progress lines
const PROGRESS_INTERVAL: u64 = 10;

/// Shortest sleep while waiting for a host to cool down
const MIN_POLL: Duration = Duration::from_millis(10);

/// Raw results of a crawl, before assembly
#[derive(Debug)]
pub struct CrawlReport {
    pub harvested: Vec<Harvested>,

    /// Sources that ended in `Failed`, budget cancellations included
    pub failures: Vec<Source>,

    pub stats: RunStats,
}

/// Assembled results of a run
#[derive(Debug)]
pub struct HarvestOutcome {
    pub knowledge_base: KnowledgeBase,
    pub failures: Vec<Source>,
    pub stats: RunStats,
}

/// Drives crawl runs over a set of capabilities
///
/// Each call to [`Orchestrator::crawl`] starts with a fresh visited set,
/// frontier and robots cache. The content cache outlives runs and can be
/// shared between orchestrators with [`Orchestrator::with_cache`].
pub struct Orchestrator {
    config: Arc<Config>,
    fetcher: Arc<dyn Fetcher>,
    renderer: Option<Arc<dyn Renderer>>,
    folder_lister: Arc<dyn FolderLister>,
    cache: Arc<ContentCache>,
}

impl Orchestrator {
    pub fn new(
        config: Config,
        fetcher: Arc<dyn Fetcher>,
        folder_lister: Arc<dyn FolderLister>,
    ) -> Self {
        let cache = Arc::new(ContentCache::new(config.cache.capacity));
        Self {
            config: Arc::new(config),
            fetcher,
            renderer: None,
            folder_lister,
            cache,
        }
    }

    /// Enables escalation to rendered extraction
    pub fn with_renderer(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// Replaces the content cache, e.g. to share one between runs
    pub fn with_cache(mut self, cache: Arc<ContentCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn cache(&self) -> &Arc<ContentCache> {
        &self.cache
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Crawls the request's seeds and assembles the knowledge base
    pub async fn run(&self, request: &RunRequest) -> Result<HarvestOutcome> {
        let report = self.crawl(&request.urls).await?;
        let knowledge_base = assemble(request, &report.harvested, &self.config.extraction);

        let mut stats = report.stats;
        stats.items = knowledge_base.items.len() as u64;

        Ok(HarvestOutcome {
            knowledge_base,
            failures: report.failures,
            stats,
        })
    }

    /// Runs the crawl loop until the frontier is empty and nothing is in
    /// flight, or the page budget is spent
    ///
    /// Per-source failures are recorded in the report; an error here means
    /// the run itself could not continue.
    pub async fn crawl(&self, seeds: &[String]) -> Result<CrawlReport> {
        let start = Instant::now();
        let mut run = RunState::new(self.context());

        for seed in seeds {
            match seed_source(seed) {
                Ok((url, key)) => run.discover(url, key, 0, Origin::Seed, None)?,
                Err(e) => warn!("Skipping seed {}: {}", seed, e),
            }
        }
        info!(
            "Starting crawl with {} seed source(s), max depth {}, budget {} page(s)",
            run.scheduler.frontier_size(),
            self.config.crawl.max_depth,
            self.config.crawl.max_pages
        );

        let mut tasks: JoinSet<Completed> = JoinSet::new();

        loop {
            run.dispatch(&mut tasks)?;

            if tasks.is_empty() {
                match run.scheduler.time_until_ready(Instant::now()) {
                    None => break,
                    Some(wait) => {
                        trace!("No host ready, sleeping {:?}", wait);
                        tokio::time::sleep(wait.max(MIN_POLL)).await;
                        continue;
                    }
                }
            }

            // With a free slot, wake up when the next host is ready even if
            // no task has finished by then
            let wait = if run.scheduler.has_capacity() {
                run.scheduler.time_until_ready(Instant::now())
            } else {
                None
            };

            let joined = match wait {
                Some(wait) => {
                    match tokio::time::timeout(wait.max(MIN_POLL), tasks.join_next()).await {
                        Ok(joined) => joined,
                        Err(_) => continue,
                    }
                }
                None => tasks.join_next().await,
            };

            match joined {
                Some(Ok(done)) => run.complete(done)?,
                Some(Err(e)) => error!("{}", SumiError::Task(e)),
                None => {}
            }
        }

        run.stats.elapsed = start.elapsed();
        info!(
            "Crawl completed: {} source(s) done, {} failed, {} unique URL(s) claimed in {:?}",
            run.stats.completed,
            run.stats.total_failures(),
            run.ctx.visited.len(),
            run.stats.elapsed
        );

        Ok(CrawlReport {
            harvested: run.harvested,
            failures: run.failures,
            stats: run.stats,
        })
    }

    fn context(&self) -> Arc<RunContext> {
        Arc::new(RunContext {
            config: Arc::clone(&self.config),
            fetcher: Arc::clone(&self.fetcher),
            renderer: self.renderer.clone(),
            folder_lister: Arc::clone(&self.folder_lister),
            cache: Arc::clone(&self.cache),
            visited: VisitedSet::new(),
            gate: FetchGate::new(),
            robots: RobotsCache::new(),
            scope: LinkScope::from_config(&self.config.crawl),
        })
    }
}

/// Parses a seed and computes its identity
fn seed_source(seed: &str) -> Result<(Url, String)> {
    let url = Url::parse(seed.trim())?;
    let key = normalized_key(&url)?;
    Ok((url, key))
}

/// State shared with worker tasks for one run
struct RunContext {
    config: Arc<Config>,
    fetcher: Arc<dyn Fetcher>,
    renderer: Option<Arc<dyn Renderer>>,
    folder_lister: Arc<dyn FolderLister>,
    cache: Arc<ContentCache>,
    visited: VisitedSet,
    gate: FetchGate,
    robots: RobotsCache,
    scope: LinkScope,
}

impl RunContext {
    fn extract_context(&self) -> ExtractContext<'_> {
        ExtractContext {
            scope: &self.scope,
            renderer: self.renderer.as_deref(),
            folder_lister: self.folder_lister.as_ref(),
        }
    }

    /// Fetches a source through the single-flight gate
    ///
    /// Drive downloads that answer with a confirmation interstitial are
    /// fetched once more with the token.
    async fn fetch(&self, source: &Source) -> Arc<FetchResult> {
        let timeout = self.config.fetch.timeout();
        let retries = self.config.fetch.max_retries;
        let result = self
            .gate
            .fetch(&source.key, &source.url, self.fetcher.as_ref(), timeout, retries)
            .await;

        if drive_file_id(&source.url).is_none() {
            return result;
        }
        let token = match &*result {
            FetchResult::Success { body, .. } if !body.starts_with(b"%PDF-") => {
                confirm_token(&String::from_utf8_lossy(body))
            }
            _ => None,
        };
        let Some(token) = token else {
            return result;
        };

        let confirmed = with_confirm_token(&source.url, &token);
        debug!("Retrying {} with download confirmation", source.url);
        let key = normalized_key(&confirmed).unwrap_or_else(|_| confirmed.to_string());
        self.gate
            .fetch(&key, &confirmed, self.fetcher.as_ref(), timeout, retries)
            .await
    }

    /// Claims the identity of a redirect target
    fn claim_redirect(&self, source: &Source, final_url: &Url) {
        if final_url == &source.url {
            return;
        }
        if let Ok(key) = normalized_key(final_url) {
            if key != source.key && !self.visited.claim(&key) {
                debug!("{} redirected to already claimed {}", source.url, final_url);
            }
        }
    }
}

/// What a worker observed besides the content itself
#[derive(Debug, Default)]
struct TaskEvents {
    fetched: bool,
    cache_hit: bool,
    render_failed: bool,
    crawl_delay: Option<Duration>,
}

/// A finished worker task
struct Completed {
    source: Source,
    content: Option<Arc<ExtractionOutcome>>,
    events: TaskEvents,
}

impl Completed {
    /// A worker that errored or panicked; `source` is the copy taken at
    /// dispatch, still in `Fetching`
    fn aborted(mut source: Source, detail: String) -> Self {
        error!("Worker for {} aborted: {}", source.url, detail);
        if let Err(e) = source.fail(FailureKind::WorkerError, detail) {
            error!("Could not record failure for {}: {}", source.url, e);
        }
        Self {
            source,
            content: None,
            events: TaskEvents::default(),
        }
    }
}

/// Runs one source on its own task so that a panic still yields a
/// `Failed` source instead of losing it
async fn supervise(ctx: Arc<RunContext>, source: Source) -> Completed {
    let dispatched = source.clone();
    match tokio::spawn(process(ctx, source)).await {
        Ok(Ok(done)) => done,
        Ok(Err(e)) => Completed::aborted(dispatched, e.to_string()),
        Err(e) => Completed::aborted(dispatched, SumiError::Task(e).to_string()),
    }
}

enum Outcome {
    Content(Arc<ExtractionOutcome>),
    Failed(FailureKind, String),
}

/// Worker: takes a `Fetching` source to `Done` or `Failed`
async fn process(ctx: Arc<RunContext>, mut source: Source) -> Result<Completed> {
    let mut events = TaskEvents::default();

    let content = match harvest(&ctx, &mut source, &mut events).await? {
        Outcome::Content(content) => {
            source.advance(SourceState::Done)?;
            Some(content)
        }
        Outcome::Failed(kind, detail) => {
            warn!("{} failed ({}): {}", source.url, kind, detail);
            source.fail(kind, detail)?;
            None
        }
    };

    Ok(Completed {
        source,
        content,
        events,
    })
}

async fn harvest(
    ctx: &RunContext,
    source: &mut Source,
    events: &mut TaskEvents,
) -> Result<Outcome> {
    if let Some(content) = ctx.cache.get(&source.key) {
        debug!("Cache hit for {}", source.url);
        events.cache_hit = true;
        source.advance(SourceState::Extracting)?;
        return Ok(Outcome::Content(content));
    }

    let mut category = source.category();

    if category.is_page() && ctx.config.crawl.respect_robots_txt {
        let agent = ctx.config.user_agent.crawler_name.as_str();
        let policy = ctx
            .robots
            .policy_for(&source.url, ctx.fetcher.as_ref(), ctx.config.fetch.timeout())
            .await;
        events.crawl_delay = policy.crawl_delay(agent);

        if !policy.allows(&source.url, agent) {
            return Ok(Outcome::Failed(
                FailureKind::RobotsDisallowed,
                "disallowed by robots.txt".to_string(),
            ));
        }
    }

    let mut fetched = None;
    if Extractor::for_category(category).needs_fetch() {
        let result = ctx.fetch(source).await;
        events.fetched = true;

        match &*result {
            FetchResult::Success {
                final_url,
                content_type,
                body,
                ..
            } => {
                ctx.claim_redirect(source, final_url);
                category = classify_response(category, content_type.as_deref(), body);
                source.reclassify(category);
            }
            failed => {
                let kind = failed
                    .failure_kind()
                    .unwrap_or(FailureKind::NetworkFailure);
                return Ok(Outcome::Failed(kind, failed.describe()));
            }
        }
        fetched = Some(result);
    }

    let body: &[u8] = match fetched.as_deref() {
        Some(FetchResult::Success { body, .. }) => body.as_slice(),
        _ => &[],
    };

    source.advance(SourceState::Extracting)?;
    let extract_ctx = ctx.extract_context();
    let outcome = match Extractor::for_category(category)
        .extract(&source.url, body, &extract_ctx)
        .await
    {
        Ok(outcome) => outcome,
        Err(e) => return Ok(Outcome::Failed(FailureKind::ParseFailure, e.to_string())),
    };

    let threshold = ctx.config.crawl.discovery_threshold;
    let outcome = match outcome {
        ExtractionOutcome::Page(page) if needs_escalation(&page, threshold) => {
            ExtractionOutcome::Page(escalate(ctx, source, page, events).await?)
        }
        other => other,
    };

    Ok(Outcome::Content(ctx.cache.put(source.key.clone(), outcome)))
}

/// A static result with too few in-scope links or no body text
fn needs_escalation(page: &ExtractedPage, threshold: usize) -> bool {
    page.in_scope_links() < threshold || !page.has_body()
}

/// Runs the rendered extractor once; any failure keeps the static result
async fn escalate(
    ctx: &RunContext,
    source: &mut Source,
    page: ExtractedPage,
    events: &mut TaskEvents,
) -> Result<ExtractedPage> {
    source.advance(SourceState::EscalatedExtracting)?;
    source.reclassify(SourceCategory::ComplexListing);
    source.escalated = true;
    debug!(
        "Escalating {} ({} in-scope link(s))",
        source.url,
        page.in_scope_links()
    );

    let extract_ctx = ctx.extract_context();
    let rendered = Extractor::for_category(SourceCategory::ComplexListing)
        .extract(&source.url, &[], &extract_ctx)
        .await;

    match rendered {
        Ok(ExtractionOutcome::Page(rendered))
            if rendered.has_body() || rendered.in_scope_links() > page.in_scope_links() =>
        {
            Ok(rendered)
        }
        Ok(_) => Ok(page),
        Err(SumiError::Render(RenderError::NotConfigured)) => {
            debug!("No renderer configured, keeping static result for {}", source.url);
            events.render_failed = true;
            Ok(page)
        }
        Err(e) => {
            warn!("Rendering {} failed, keeping static result: {}", source.url, e);
            events.render_failed = true;
            Ok(page)
        }
    }
}

/// Driver-side state: the frontier and everything collected so far
struct RunState {
    ctx: Arc<RunContext>,
    scheduler: Scheduler,
    stats: RunStats,
    next_seq: u64,
    processed: u64,
    harvested: Vec<Harvested>,
    failures: Vec<Source>,
    started: Instant,
}

impl RunState {
    fn new(ctx: Arc<RunContext>) -> Self {
        let scheduler = Scheduler::new(&ctx.config.crawl);
        Self {
            ctx,
            scheduler,
            stats: RunStats::new(),
            next_seq: 0,
            processed: 0,
            harvested: Vec::new(),
            failures: Vec::new(),
            started: Instant::now(),
        }
    }

    fn budget_exhausted(&self) -> bool {
        self.stats.dispatched >= u64::from(self.ctx.config.crawl.max_pages)
    }

    /// Creates a source for a discovered URL and tries to admit it
    ///
    /// Drive viewer links are replaced by their download URL, which then
    /// serves as the identity.
    fn discover(
        &mut self,
        url: Url,
        key: String,
        depth: u32,
        origin: Origin,
        hint: Option<SourceCategory>,
    ) -> Result<()> {
        let (url, key) = match drive_download_target(&url) {
            Some(download) => {
                debug!("Fetching drive file {} as {}", url, download);
                let key = normalized_key(&download)?;
                (download, key)
            }
            None => (url, key),
        };

        let mut source = Source::new(url, key, depth, self.next_seq, origin);
        self.next_seq += 1;
        if let Some(hint) = hint {
            source = source.with_hint(hint);
        }
        self.admit(source)
    }

    /// Discovered -> Queued, when depth, identity and budget allow
    fn admit(&mut self, mut source: Source) -> Result<()> {
        if source.depth > self.ctx.config.crawl.max_depth {
            trace!("{} is beyond max depth", source.url);
            return Ok(());
        }
        if self.budget_exhausted() {
            trace!("{} discovered after the page budget ran out", source.url);
            return Ok(());
        }
        if !self.ctx.visited.claim(&source.key) {
            trace!("{} already claimed", source.key);
            return Ok(());
        }

        source.advance(SourceState::Queued)?;
        self.scheduler.push(source);
        Ok(())
    }

    /// Queued -> Fetching for every source that may start now
    fn dispatch(&mut self, tasks: &mut JoinSet<Completed>) -> Result<()> {
        while !self.budget_exhausted() {
            let Some(ScheduledSource { mut source, permit }) =
                self.scheduler.next_ready(Instant::now())
            else {
                break;
            };

            source.advance(SourceState::Fetching)?;
            self.stats.dispatched += 1;
            debug!("Dispatching {} (depth {})", source.url, source.depth);

            let ctx = Arc::clone(&self.ctx);
            tasks.spawn(async move {
                let _permit = permit;
                supervise(ctx, source).await
            });
        }

        if self.budget_exhausted() && !self.scheduler.is_empty() {
            self.cancel_queued()?;
        }
        Ok(())
    }

    fn cancel_queued(&mut self) -> Result<()> {
        let cancelled = self.scheduler.cancel_all();
        info!(
            "Page budget of {} reached, cancelling {} queued source(s)",
            self.ctx.config.crawl.max_pages,
            cancelled.len()
        );

        for mut source in cancelled {
            source.fail(FailureKind::BudgetExceeded, "page budget reached")?;
            self.stats.record_failure(FailureKind::BudgetExceeded);
            self.failures.push(source);
        }
        Ok(())
    }

    /// Records a finished task and admits what it discovered
    fn complete(&mut self, done: Completed) -> Result<()> {
        let Completed {
            source,
            content,
            events,
        } = done;

        self.stats.fetched += u64::from(events.fetched);
        self.stats.cache_hits += u64::from(events.cache_hit);
        self.stats.escalations += u64::from(source.escalated);
        self.stats.render_failures += u64::from(events.render_failed);

        if let (Some(delay), Some(host)) = (events.crawl_delay, host_key(&source.url)) {
            self.scheduler.set_crawl_delay(&host, Some(delay));
        }

        match content {
            Some(content) => {
                self.stats.completed += 1;
                if let (ExtractionOutcome::Document(doc), false) = (&*content, events.cache_hit) {
                    self.stats.record_pdf(doc.backend, doc.failed_pages);
                }
                self.follow(&source, &content)?;

                if !matches!(&*content, ExtractionOutcome::Folder(_)) {
                    self.harvested.push(Harvested {
                        seq: source.seq,
                        url: source.url,
                        origin: source.origin,
                        content,
                    });
                }
            }
            None => {
                if let Some(failure) = &source.failure {
                    self.stats.record_failure(failure.kind);
                }
                self.failures.push(source);
            }
        }

        self.processed += 1;
        if self.processed % PROGRESS_INTERVAL == 0 {
            let elapsed = self.started.elapsed().as_secs_f64();
            info!(
                "Progress: {} source(s) processed, {} queued, {:.2} sources/sec",
                self.processed,
                self.scheduler.frontier_size(),
                self.processed as f64 / elapsed.max(f64::EPSILON)
            );
        }
        Ok(())
    }

    /// Turns page links and folder entries into new sources one level deeper
    fn follow(&mut self, parent: &Source, content: &ExtractionOutcome) -> Result<()> {
        let depth = parent.depth + 1;

        match content {
            ExtractionOutcome::Page(page) => {
                for link in &page.links {
                    self.discover(link.url.clone(), link.key.clone(), depth, Origin::Link, None)?;
                }
            }
            ExtractionOutcome::Folder(children) => {
                for child in children {
                    match normalized_key(child) {
                        Ok(key) => self.discover(
                            child.clone(),
                            key,
                            depth,
                            Origin::FolderChild,
                            Some(SourceCategory::Pdf),
                        )?,
                        Err(e) => debug!("Skipping folder entry {}: {}", child, e),
                    }
                }
            }
            ExtractionOutcome::Document(_) => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::build_pdf;
    use crate::output::ContentTag;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Serves canned responses and counts calls per URL
    #[derive(Default)]
    struct FakeFetcher {
        responses: HashMap<String, FetchResult>,
        calls: Mutex<HashMap<String, usize>>,
    }

    impl FakeFetcher {
        fn respond(mut self, url: &str, content_type: &str, body: Vec<u8>) -> Self {
            let result = FetchResult::Success {
                final_url: Url::parse(url).unwrap(),
                status_code: 200,
                content_type: Some(content_type.to_string()),
                body,
            };
            self.responses.insert(url.to_string(), result);
            self
        }

        fn page(self, url: &str, html: String) -> Self {
            self.respond(url, "text/html; charset=utf-8", html.into_bytes())
        }

        fn status(mut self, url: &str, status_code: u16) -> Self {
            self.responses.insert(
                url.to_string(),
                FetchResult::HttpError {
                    status_code,
                    attempts: 1,
                },
            );
            self
        }

        fn calls(&self, url: &str) -> usize {
            self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
        }

        fn total_calls(&self) -> usize {
            self.calls.lock().unwrap().values().sum()
        }
    }

    #[async_trait]
    impl Fetcher for FakeFetcher {
        async fn fetch(&self, url: &Url, _timeout: Duration, _max_retries: u32) -> FetchResult {
            *self
                .calls
                .lock()
                .unwrap()
                .entry(url.to_string())
                .or_insert(0) += 1;
            tokio::task::yield_now().await;

            self.responses
                .get(url.as_str())
                .cloned()
                .unwrap_or(FetchResult::HttpError {
                    status_code: 404,
                    attempts: 1,
                })
        }
    }

    struct FakeRenderer {
        html: String,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Renderer for FakeRenderer {
        async fn render(&self, _url: &Url) -> std::result::Result<String, RenderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.html.clone())
        }
    }

    #[derive(Default)]
    struct FakeFolders {
        children: Vec<Url>,
    }

    #[async_trait]
    impl FolderLister for FakeFolders {
        async fn list_folder(&self, _folder_url: &Url) -> Result<Vec<Url>> {
            Ok(self.children.clone())
        }
    }

    fn test_config() -> Config {
        let mut config = Config::default();
        config.crawl.delay = 0.0;
        config.crawl.respect_robots_txt = false;
        config.fetch.max_retries = 0;
        config
    }

    fn html(title: &str, links: &[&str]) -> String {
        let anchors: String = links
            .iter()
            .map(|href| format!(r#"<li><a href="{}">{}</a></li>"#, href, href))
            .collect();
        format!(
            "<html><head><title>{title}</title></head><body><main><h1>{title}</h1>\
             <p>This paragraph carries enough words to count as real content.</p>\
             </main><nav><ul>{anchors}</ul></nav></body></html>"
        )
    }

    fn request(urls: &[&str]) -> RunRequest {
        RunRequest {
            team_id: "team".to_string(),
            user_id: "user".to_string(),
            urls: urls.iter().map(|u| u.to_string()).collect(),
        }
    }

    fn orchestrator(config: Config, fetcher: &Arc<FakeFetcher>) -> Orchestrator {
        Orchestrator::new(config, fetcher.clone(), Arc::new(FakeFolders::default()))
    }

    #[tokio::test]
    async fn test_blog_seed_follows_one_level() {
        let fetcher = Arc::new(
            FakeFetcher::default()
                .page(
                    "https://example.com/blog/hello",
                    html("Hello", &["/blog/one", "/blog/two", "/blog/three"]),
                )
                .page("https://example.com/blog/one", html("One", &["/blog/deeper"]))
                .page("https://example.com/blog/two", html("Two", &["/blog/deeper"]))
                .page("https://example.com/blog/three", html("Three", &["/blog/deeper"])),
        );

        let outcome = orchestrator(test_config(), &fetcher)
            .run(&request(&["https://example.com/blog/hello"]))
            .await
            .unwrap();

        let items = &outcome.knowledge_base.items;
        assert_eq!(items.len(), 4);
        assert_eq!(items[0].title, "Hello");
        assert_eq!(items[0].content_type, ContentTag::Blog);
        assert_eq!(items[0].source_url, "https://example.com/blog/hello");

        for page in ["one", "two", "three"] {
            assert_eq!(fetcher.calls(&format!("https://example.com/blog/{}", page)), 1);
        }
        assert_eq!(fetcher.calls("https://example.com/blog/deeper"), 0);

        // every page is under the threshold and no renderer is configured
        assert_eq!(outcome.stats.escalations, 4);
        assert_eq!(outcome.stats.render_failures, 4);
        assert!(outcome.failures.is_empty());
    }

    #[tokio::test]
    async fn test_escalation_invokes_renderer_once() {
        let fetcher = Arc::new(
            FakeFetcher::default().page("https://example.com/app", html("Shell", &["/a", "/b"])),
        );
        let renderer = Arc::new(FakeRenderer {
            html: html("Rendered", &["/1", "/2", "/3", "/4", "/5", "/6"]),
            calls: AtomicUsize::new(0),
        });
        let mut config = test_config();
        config.crawl.max_depth = 0;

        let outcome = orchestrator(config, &fetcher)
            .with_renderer(renderer.clone())
            .run(&request(&["https://example.com/app"]))
            .await
            .unwrap();

        assert_eq!(renderer.calls.load(Ordering::SeqCst), 1);
        assert_eq!(outcome.stats.escalations, 1);
        assert_eq!(outcome.stats.render_failures, 0);
        assert_eq!(outcome.knowledge_base.items[0].title, "Rendered");
    }

    #[tokio::test]
    async fn test_rich_page_is_not_escalated() {
        let links = ["/1", "/2", "/3", "/4", "/5"];
        let fetcher =
            Arc::new(FakeFetcher::default().page("https://example.com/", html("Home", &links)));
        let renderer = Arc::new(FakeRenderer {
            html: String::new(),
            calls: AtomicUsize::new(0),
        });
        let mut config = test_config();
        config.crawl.max_depth = 0;

        let outcome = orchestrator(config, &fetcher)
            .with_renderer(renderer.clone())
            .run(&request(&["https://example.com/"]))
            .await
            .unwrap();

        assert_eq!(renderer.calls.load(Ordering::SeqCst), 0);
        assert_eq!(outcome.stats.escalations, 0);
    }

    #[tokio::test]
    async fn test_depth_bound() {
        let fetcher = Arc::new(
            FakeFetcher::default()
                .page("https://example.com/d0", html("D0", &["/d1"]))
                .page("https://example.com/d1", html("D1", &["/d2"]))
                .page("https://example.com/d2", html("D2", &["/d3"]))
                .page("https://example.com/d3", html("D3", &[])),
        );
        let mut config = test_config();
        config.crawl.max_depth = 2;

        let report = orchestrator(config, &fetcher)
            .crawl(&["https://example.com/d0".to_string()])
            .await
            .unwrap();

        assert_eq!(report.harvested.len(), 3);
        assert_eq!(fetcher.calls("https://example.com/d3"), 0);
    }

    #[tokio::test]
    async fn test_budget_bound_cancels_queued() {
        let links: Vec<String> = (0..10).map(|i| format!("/p{}", i)).collect();
        let link_refs: Vec<&str> = links.iter().map(String::as_str).collect();
        let mut fetcher =
            FakeFetcher::default().page("https://example.com/", html("Home", &link_refs));
        for link in &links {
            fetcher = fetcher.page(&format!("https://example.com{}", link), html("Leaf", &[]));
        }
        let fetcher = Arc::new(fetcher);
        let mut config = test_config();
        config.crawl.max_pages = 4;

        let report = orchestrator(config, &fetcher)
            .crawl(&["https://example.com/".to_string()])
            .await
            .unwrap();

        assert_eq!(fetcher.total_calls(), 4);
        assert_eq!(report.stats.dispatched, 4);
        assert_eq!(report.harvested.len(), 4);
        assert_eq!(report.stats.budget_cancelled(), 7);
        assert!(report
            .failures
            .iter()
            .all(|s| s.failure.as_ref().map(|f| f.kind) == Some(FailureKind::BudgetExceeded)));
    }

    #[tokio::test]
    async fn test_each_identity_fetched_once() {
        let fetcher = Arc::new(
            FakeFetcher::default()
                .page("https://example.com/a", html("A", &["/b", "/a#top"]))
                .page("https://example.com/b", html("B", &["/a", "/a/"])),
        );

        let seeds = vec![
            "https://example.com/a".to_string(),
            "https://www.example.com/a/".to_string(),
            "https://example.com/a?utm_source=newsletter".to_string(),
        ];
        let report = orchestrator(test_config(), &fetcher)
            .crawl(&seeds)
            .await
            .unwrap();

        assert_eq!(fetcher.calls("https://example.com/a"), 1);
        assert_eq!(fetcher.calls("https://example.com/b"), 1);
        assert_eq!(fetcher.total_calls(), 2);
        assert_eq!(report.harvested.len(), 2);
    }

    #[tokio::test]
    async fn test_drive_folder_children_become_doc_items() {
        let first = "https://drive.google.com/uc?export=download&id=file1";
        let second = "https://drive.google.com/uc?export=download&id=file2";
        let fetcher = Arc::new(
            FakeFetcher::default()
                .respond(
                    first,
                    "application/pdf",
                    build_pdf(&["Quarterly results for the first period"], Some("Q1")),
                )
                .respond(
                    second,
                    "application/pdf",
                    build_pdf(&["Quarterly results for the second period"], Some("Q2")),
                ),
        );
        let folders = Arc::new(FakeFolders {
            children: vec![Url::parse(first).unwrap(), Url::parse(second).unwrap()],
        });

        let outcome = Orchestrator::new(test_config(), fetcher.clone(), folders)
            .run(&request(&["https://drive.google.com/drive/folders/abc123"]))
            .await
            .unwrap();

        let items = &outcome.knowledge_base.items;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title, "Q1");
        assert_eq!(items[1].title, "Q2");
        for item in items {
            assert_eq!(item.content_type, ContentTag::Doc);
            assert_eq!(item.chunk_index, Some(1));
            assert_eq!(item.total_chunks, Some(1));
        }
        // the folder itself is listed, not fetched
        assert_eq!(fetcher.total_calls(), 2);
    }

    #[tokio::test]
    async fn test_pdf_detected_from_content_type() {
        let fetcher = Arc::new(FakeFetcher::default().respond(
            "https://example.com/download",
            "application/pdf",
            build_pdf(&["Annual report body text"], Some("Annual Report")),
        ));

        let outcome = orchestrator(test_config(), &fetcher)
            .run(&request(&["https://example.com/download"]))
            .await
            .unwrap();

        let items = &outcome.knowledge_base.items;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].content_type, ContentTag::Pdf);
        assert_eq!(outcome.stats.escalations, 0);
    }

    #[tokio::test]
    async fn test_drive_confirmation_retry() {
        let download = "https://drive.google.com/uc?export=download&id=big";
        let confirmed = "https://drive.google.com/uc?export=download&id=big&confirm=t0k3n";
        let fetcher = Arc::new(
            FakeFetcher::default()
                .page(
                    download,
                    r#"<html><body><a href="/uc?export=download&amp;confirm=t0k3n&amp;id=big">Download anyway</a></body></html>"#
                        .to_string(),
                )
                .respond(
                    confirmed,
                    "application/pdf",
                    build_pdf(&["Large file contents"], Some("Big File")),
                ),
        );

        let outcome = orchestrator(test_config(), &fetcher)
            .run(&request(&[download]))
            .await
            .unwrap();

        assert_eq!(fetcher.calls(confirmed), 1);
        assert_eq!(outcome.knowledge_base.items.len(), 1);
        assert_eq!(outcome.knowledge_base.items[0].title, "Big File");
    }

    #[tokio::test]
    async fn test_failure_isolation() {
        let mut fetcher = FakeFetcher::default().status("https://example.com/s3", 404);
        for i in [0, 1, 2, 4] {
            let url = format!("https://example.com/s{}", i);
            fetcher = fetcher.page(&url, html(&format!("Seed {}", i), &[]));
        }
        let fetcher = Arc::new(fetcher);
        let mut config = test_config();
        config.crawl.max_depth = 0;

        let seeds: Vec<String> = (0..5).map(|i| format!("https://example.com/s{}", i)).collect();
        let urls: Vec<&str> = seeds.iter().map(String::as_str).collect();
        let outcome = orchestrator(config, &fetcher)
            .run(&request(&urls))
            .await
            .unwrap();

        assert_eq!(outcome.knowledge_base.items.len(), 4);
        assert_eq!(outcome.failures.len(), 1);

        let failed = &outcome.failures[0];
        assert_eq!(failed.url.as_str(), "https://example.com/s3");
        assert_eq!(failed.state(), SourceState::Failed);
        assert_eq!(
            failed.failure.as_ref().map(|f| f.kind),
            Some(FailureKind::HttpClientError)
        );
        assert_eq!(outcome.stats.failures[&FailureKind::HttpClientError], 1);

        // items keep seed order around the gap
        let titles: Vec<_> = outcome
            .knowledge_base
            .items
            .iter()
            .map(|i| i.title.as_str())
            .collect();
        assert_eq!(titles, vec!["Seed 0", "Seed 1", "Seed 2", "Seed 4"]);
    }

    #[tokio::test]
    async fn test_shared_cache_skips_fetch_on_second_run() {
        let fetcher = Arc::new(
            FakeFetcher::default().page("https://example.com/a", html("Cached", &[])),
        );
        let cache = Arc::new(ContentCache::new(10));
        let seeds = vec!["https://example.com/a".to_string()];

        let first = orchestrator(test_config(), &fetcher)
            .with_cache(cache.clone())
            .crawl(&seeds)
            .await
            .unwrap();
        let second = orchestrator(test_config(), &fetcher)
            .with_cache(cache.clone())
            .crawl(&seeds)
            .await
            .unwrap();

        assert_eq!(fetcher.calls("https://example.com/a"), 1);
        assert_eq!(first.stats.cache_hits, 0);
        assert_eq!(second.stats.cache_hits, 1);
        assert_eq!(second.stats.fetched, 0);
        assert_eq!(second.harvested.len(), 1);
    }

    #[tokio::test]
    async fn test_robots_disallow_fails_source() {
        let fetcher = Arc::new(
            FakeFetcher::default()
                .respond(
                    "https://example.com/robots.txt",
                    "text/plain",
                    b"User-agent: *\nDisallow: /private\n".to_vec(),
                )
                .page("https://example.com/private/notes", html("Private", &[]))
                .page("https://example.com/public", html("Public", &[])),
        );
        let mut config = test_config();
        config.crawl.respect_robots_txt = true;
        config.crawl.max_depth = 0;

        let seeds = vec![
            "https://example.com/private/notes".to_string(),
            "https://example.com/public".to_string(),
        ];
        let report = orchestrator(config, &fetcher).crawl(&seeds).await.unwrap();

        assert_eq!(fetcher.calls("https://example.com/robots.txt"), 1);
        assert_eq!(fetcher.calls("https://example.com/private/notes"), 0);
        assert_eq!(report.harvested.len(), 1);
        assert_eq!(report.stats.failures[&FailureKind::RobotsDisallowed], 1);
    }

    #[tokio::test]
    async fn test_invalid_seed_is_skipped() {
        let fetcher = Arc::new(FakeFetcher::default());
        let report = orchestrator(test_config(), &fetcher)
            .crawl(&["not a url".to_string()])
            .await
            .unwrap();

        assert_eq!(fetcher.total_calls(), 0);
        assert!(report.harvested.is_empty());
        assert_eq!(report.stats.dispatched, 0);
    }

    #[tokio::test]
    async fn test_drive_viewer_link_fetches_download() {
        let viewer = "https://drive.google.com/file/d/abc123/view";
        let download = "https://drive.google.com/uc?export=download&id=abc123";
        let fetcher = Arc::new(
            FakeFetcher::default()
                .page(viewer, "<html><body>Drive viewer shell</body></html>".to_string())
                .respond(
                    download,
                    "application/pdf",
                    build_pdf(&["Shared handbook text"], Some("Handbook")),
                ),
        );

        let outcome = orchestrator(test_config(), &fetcher)
            .run(&request(&[viewer, download]))
            .await
            .unwrap();

        assert_eq!(fetcher.calls(viewer), 0);
        assert_eq!(fetcher.calls(download), 1);
        assert!(outcome.failures.is_empty());

        let items = &outcome.knowledge_base.items;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "Handbook");
        assert_eq!(items[0].content_type, ContentTag::Pdf);
        assert_eq!(items[0].source_url, download);
    }

    #[tokio::test]
    async fn test_huge_robots_crawl_delay_does_not_lose_source() {
        let fetcher = Arc::new(
            FakeFetcher::default()
                .respond(
                    "https://example.com/robots.txt",
                    "text/plain",
                    b"User-agent: *\nCrawl-delay: 1e20\n".to_vec(),
                )
                .page("https://example.com/a", html("A", &[])),
        );
        let mut config = test_config();
        config.crawl.respect_robots_txt = true;
        config.crawl.max_depth = 0;

        let report = orchestrator(config, &fetcher)
            .crawl(&["https://example.com/a".to_string()])
            .await
            .unwrap();

        assert_eq!(report.stats.dispatched, 1);
        assert_eq!(report.harvested.len(), 1);
        assert!(report.failures.is_empty());
    }

    /// Panics on one URL and serves a page for everything else
    struct PanickingFetcher {
        poisoned: &'static str,
    }

    #[async_trait]
    impl Fetcher for PanickingFetcher {
        async fn fetch(&self, url: &Url, _timeout: Duration, _max_retries: u32) -> FetchResult {
            if url.as_str() == self.poisoned {
                panic!("fetcher blew up");
            }
            FetchResult::Success {
                final_url: url.clone(),
                status_code: 200,
                content_type: Some("text/html".to_string()),
                body: html("Fine", &[]).into_bytes(),
            }
        }
    }

    #[tokio::test]
    async fn test_worker_panic_is_recorded_as_failure() {
        let fetcher = Arc::new(PanickingFetcher {
            poisoned: "https://example.com/boom",
        });
        let mut config = test_config();
        config.crawl.max_depth = 0;

        let report = Orchestrator::new(config, fetcher, Arc::new(FakeFolders::default()))
            .crawl(&[
                "https://example.com/ok".to_string(),
                "https://example.com/boom".to_string(),
            ])
            .await
            .unwrap();

        assert_eq!(report.harvested.len(), 1);
        assert_eq!(report.failures.len(), 1);

        let failed = &report.failures[0];
        assert_eq!(failed.url.as_str(), "https://example.com/boom");
        assert_eq!(failed.state(), SourceState::Failed);
        assert_eq!(
            failed.failure.as_ref().map(|f| f.kind),
            Some(FailureKind::WorkerError)
        );
        assert_eq!(report.stats.failures[&FailureKind::WorkerError], 1);
    }
}
