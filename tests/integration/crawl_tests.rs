//! Integration tests for the harvester
//!
//! These tests use wiremock to create mock HTTP servers and run the full
//! harvest cycle end-to-end through the real HTTP fetcher.

use std::path::Path;
use sumi_harvest::config::{Config, RunRequest};
use sumi_harvest::crawler::run;
use sumi_harvest::output::{ContentTag, KnowledgeBase};
use sumi_harvest::state::FailureKind;
use sumi_harvest::SumiError;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a fast test configuration writing to `output`
fn create_test_config(output: &Path) -> Config {
    let mut config = Config::default();
    config.crawl.delay = 0.0;
    config.fetch.timeout_secs = 5;
    config.fetch.max_retries = 0;
    config.fetch.retry_backoff_ms = 10;
    config.user_agent.crawler_name = "TestBot".to_string();
    config.output.path = output.to_string_lossy().into_owned();
    config
}

fn create_request(urls: Vec<String>) -> RunRequest {
    RunRequest {
        team_id: "team-1".to_string(),
        user_id: "user-1".to_string(),
        urls,
    }
}

fn page(title: &str, links: &[&str]) -> String {
    let anchors: String = links
        .iter()
        .map(|href| format!(r#"<a href="{}">{}</a> "#, href, href))
        .collect();
    format!(
        r#"<html><head><title>{title}</title></head><body>
        <article><h1>{title}</h1>
        <p>Body text for {title} that is long enough to be kept.</p></article>
        <footer>{anchors}</footer>
        </body></html>"#
    )
}

async fn mount_page(server: &MockServer, route: &str, html: String) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_raw(html, "text/html"))
        .mount(server)
        .await;
}

async fn mount_robots(server: &MockServer, body: &str) {
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

fn read_output(path: &Path) -> KnowledgeBase {
    let json = std::fs::read_to_string(path).expect("output file should exist");
    serde_json::from_str(&json).expect("output should be valid JSON")
}

#[tokio::test]
async fn test_full_harvest_single_site() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("results.json");

    mount_robots(&server, "User-agent: *\nAllow: /").await;
    mount_page(&server, "/", page("Home", &["/blog/first", "/blog/second"])).await;
    mount_page(&server, "/blog/first", page("First Post", &["/blog/third"])).await;
    mount_page(&server, "/blog/second", page("Second Post", &[])).await;
    Mock::given(method("GET"))
        .and(path("/blog/third"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let summary = run(
        create_request(vec![format!("{}/", server.uri())]),
        create_test_config(&output),
    )
    .await
    .unwrap();

    assert_eq!(summary.output_path, output);
    assert_eq!(summary.items, 3);
    assert!(summary.failures.is_empty());
    assert_eq!(summary.stats.fetched, 3);

    let kb = read_output(&output);
    assert_eq!(kb.team_id, "team-1");
    assert_eq!(kb.user_id, "user-1");

    let titles: Vec<&str> = kb.items.iter().map(|i| i.title.as_str()).collect();
    assert_eq!(titles, vec!["Home", "First Post", "Second Post"]);
    assert_eq!(kb.items[0].content_type, ContentTag::Other);
    assert_eq!(kb.items[1].content_type, ContentTag::Blog);
    assert!(kb.items.iter().all(|i| i.user_id == "user-1"));
    assert!(kb.items.iter().all(|i| i.chunk_index.is_none()));
}

#[tokio::test]
async fn test_client_error_is_isolated() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("results.json");

    mount_page(&server, "/ok", page("Fine", &[])).await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = create_test_config(&output);
    config.fetch.max_retries = 3;

    let summary = run(
        create_request(vec![
            format!("{}/missing", server.uri()),
            format!("{}/ok", server.uri()),
        ]),
        config,
    )
    .await
    .unwrap();

    assert_eq!(summary.items, 1);
    assert_eq!(summary.failures.len(), 1);
    let failure = summary.failures[0].failure.as_ref().unwrap();
    assert_eq!(failure.kind, FailureKind::HttpClientError);

    let kb = read_output(&output);
    assert_eq!(kb.items.len(), 1);
    assert_eq!(kb.items[0].title, "Fine");
}

#[tokio::test]
async fn test_server_error_retried_then_failed() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("results.json");

    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let mut config = create_test_config(&output);
    config.fetch.max_retries = 2;

    let summary = run(
        create_request(vec![format!("{}/flaky", server.uri())]),
        config,
    )
    .await
    .unwrap();

    assert_eq!(summary.items, 0);
    let failure = summary.failures[0].failure.as_ref().unwrap();
    assert_eq!(failure.kind, FailureKind::NetworkFailure);

    // the file is written even when nothing succeeded
    assert!(read_output(&output).items.is_empty());
}

#[tokio::test]
async fn test_robots_disallow_respected() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("results.json");

    mount_robots(&server, "User-agent: *\nDisallow: /private\n").await;
    mount_page(&server, "/", page("Home", &["/private/page", "/public"])).await;
    mount_page(&server, "/public", page("Public", &[])).await;
    Mock::given(method("GET"))
        .and(path("/private/page"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let summary = run(
        create_request(vec![format!("{}/", server.uri())]),
        create_test_config(&output),
    )
    .await
    .unwrap();

    assert_eq!(summary.items, 2);
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(
        summary.failures[0].failure.as_ref().unwrap().kind,
        FailureKind::RobotsDisallowed
    );
}

#[tokio::test]
async fn test_page_budget_cancels_queued_sources() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("results.json");

    let links = ["/a", "/b", "/c", "/d", "/e", "/f"];
    mount_page(&server, "/", page("Home", &links)).await;
    for link in links {
        mount_page(&server, link, page(link, &[])).await;
    }

    let mut config = create_test_config(&output);
    config.crawl.max_pages = 3;
    config.crawl.respect_robots_txt = false;

    let summary = run(
        create_request(vec![format!("{}/", server.uri())]),
        config,
    )
    .await
    .unwrap();

    assert_eq!(summary.stats.dispatched, 3);
    assert_eq!(summary.items, 3);
    assert_eq!(summary.stats.budget_cancelled(), 4);

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 3);
}

#[tokio::test]
async fn test_output_directory_and_sync_mode() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    mount_page(&server, "/one", page("One", &[])).await;
    mount_page(&server, "/two", page("Two", &[])).await;

    let mut config = create_test_config(Path::new("kb.json"));
    config.output.directory = Some(dir.path().to_string_lossy().into_owned());
    config.crawl.use_async = false;

    let summary = run(
        create_request(vec![
            format!("{}/one", server.uri()),
            format!("{}/two", server.uri()),
        ]),
        config,
    )
    .await
    .unwrap();

    let expected = dir.path().join("kb.json");
    assert_eq!(summary.output_path, expected);

    let titles: Vec<String> = read_output(&expected)
        .items
        .into_iter()
        .map(|i| i.title)
        .collect();
    assert_eq!(titles, vec!["One", "Two"]);
}

#[tokio::test]
async fn test_invalid_request_is_rejected_before_fetching() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("results.json");

    let result = run(create_request(vec![]), create_test_config(&output)).await;
    assert!(matches!(result, Err(SumiError::Config(_))));

    let result = run(
        create_request(vec!["ftp://example.com/file".to_string()]),
        create_test_config(&output),
    )
    .await;
    assert!(matches!(result, Err(SumiError::Config(_))));
    assert!(!output.exists());
}

#[tokio::test]
async fn test_long_page_is_chunked() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("results.json");

    let paragraph = "Chunked content sentence for the long article. ".repeat(40);
    let html = format!(
        "<html><body><article><h1>Long Read</h1><p>{}</p></article></body></html>",
        paragraph
    );
    mount_page(&server, "/article/long", html).await;

    let mut config = create_test_config(&output);
    config.extraction.chunk_size = 500;
    config.extraction.chunk_overlap = 50;

    let summary = run(
        create_request(vec![format!("{}/article/long", server.uri())]),
        config,
    )
    .await
    .unwrap();

    let kb = read_output(&output);
    assert!(summary.items > 1);
    let total = kb.items.len();
    for (i, item) in kb.items.iter().enumerate() {
        assert_eq!(item.chunk_index, Some(i + 1));
        assert_eq!(item.total_chunks, Some(total));
        assert_eq!(item.content_type, ContentTag::Blog);
    }
}
