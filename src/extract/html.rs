//! Static HTML extraction
//!
//! Pulls a title, the main body text, author/date metadata and the in-scope
//! links out of a page without executing any script.

use crate::extract::chunk::collapse_whitespace;
use crate::extract::{ExtractedPage, Link};
use crate::url::{normalized_key, LinkScope};
use chrono::{DateTime, NaiveDate};
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use url::Url;

/// Containers that usually hold the main content, checked before `body`
const CONTENT_CONTAINERS: &[&str] = &[
    "main",
    "article",
    "[role=main]",
    ".content",
    ".post-content",
    ".entry-content",
    ".article-content",
    ".post-body",
    "#content",
    "#main",
];

/// Elements whose text is collected into the body
const TEXT_BLOCKS: &[&str] = &["p", "h1", "h2", "h3", "h4", "h5", "h6", "li", "blockquote", "pre"];

/// Elements whose content never counts as page text
const BOILERPLATE_TAGS: &[&str] = &[
    "nav", "header", "footer", "aside", "script", "style", "noscript", "form",
];

/// class/id fragments that mark navigation or legal boilerplate
const BOILERPLATE_MARKERS: &[&str] = &[
    "nav", "menu", "footer", "cookie", "legal", "copyright", "breadcrumb", "sidebar",
];

/// Shortest non-heading block kept in the body
const MIN_BLOCK_CHARS: usize = 10;

/// Extracts a page from raw HTML
///
/// # Arguments
///
/// * `html` - The HTML content to parse
/// * `page_url` - The URL the HTML was served from; used to resolve links
/// * `scope` - Decides which discovered links are followed
///
/// # Example
///
/// ```
/// use sumi_harvest::extract::extract_html;
/// use sumi_harvest::url::LinkScope;
/// use url::Url;
///
/// let html = r#"<html><body><h1>Hello</h1><p>Some longer paragraph text.</p></body></html>"#;
/// let url = Url::parse("https://example.com/post").unwrap();
/// let page = extract_html(html, &url, &LinkScope::new(vec![], vec![]));
/// assert_eq!(page.title, "Hello");
/// ```
pub fn extract_html(html: &str, page_url: &Url, scope: &LinkScope) -> ExtractedPage {
    let document = Html::parse_document(html);

    let title = extract_title(&document).unwrap_or_else(|| title_from_url(page_url));
    let body = extract_body(&document);
    let author = extract_author(&document);
    let date = extract_date(&document);
    let links = extract_links(&document, page_url, scope);

    ExtractedPage {
        title,
        body,
        author,
        date,
        links,
    }
}

fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

fn element_text(element: ElementRef<'_>) -> String {
    collapse_whitespace(&element.text().collect::<String>())
}

fn first_text(document: &Html, css: &str) -> Option<String> {
    let sel = selector(css)?;
    document
        .select(&sel)
        .map(element_text)
        .find(|text| !text.is_empty())
}

fn first_attr(document: &Html, css: &str, attr: &str) -> Option<String> {
    let sel = selector(css)?;
    document
        .select(&sel)
        .filter_map(|el| el.value().attr(attr))
        .map(collapse_whitespace)
        .find(|value| !value.is_empty())
}

/// Title priority: first h1, then `<title>`, then meta description, then
/// the first significant h2/h3
fn extract_title(document: &Html) -> Option<String> {
    first_text(document, "h1")
        .or_else(|| first_text(document, "title"))
        .or_else(|| first_attr(document, "meta[name=description]", "content"))
        .or_else(|| {
            let sel = selector("h2, h3")?;
            document
                .select(&sel)
                .map(element_text)
                .find(|text| text.chars().count() >= 3)
        })
}

/// Derives a readable title from the last path segment ("my-first-post" -> "My First Post")
pub fn title_from_url(url: &Url) -> String {
    let segment = url
        .path_segments()
        .and_then(|mut segments| segments.rfind(|s| !s.is_empty()))
        .map(|s| {
            let decoded = percent_decode(s);
            match decoded.rsplit_once('.') {
                Some((stem, ext)) if !stem.is_empty() && ext.len() <= 5 => stem.to_string(),
                _ => decoded,
            }
        });

    let words: Vec<String> = segment
        .unwrap_or_default()
        .split(|c: char| c == '-' || c == '_' || c.is_whitespace())
        .filter(|w| !w.is_empty())
        .map(capitalize)
        .collect();

    if words.is_empty() {
        url.host_str().unwrap_or("Untitled").to_string()
    } else {
        words.join(" ")
    }
}

fn percent_decode(segment: &str) -> String {
    url::form_urlencoded::parse(format!("x={}", segment).as_bytes())
        .next()
        .map(|(_, v)| v.into_owned())
        .unwrap_or_else(|| segment.to_string())
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn is_boilerplate(element: ElementRef<'_>) -> bool {
    let value = element.value();
    if BOILERPLATE_TAGS.contains(&value.name()) {
        return true;
    }

    let marked = |attr: Option<&str>| {
        attr.map(|s| {
            let s = s.to_lowercase();
            BOILERPLATE_MARKERS.iter().any(|m| s.contains(m))
        })
        .unwrap_or(false)
    };
    marked(value.attr("class")) || marked(value.id())
}

fn is_text_block(element: ElementRef<'_>) -> bool {
    TEXT_BLOCKS.contains(&element.value().name())
}

fn is_heading(element: ElementRef<'_>) -> bool {
    matches!(
        element.value().name(),
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6"
    )
}

/// Collects the text blocks of a container, outermost block wins
fn collect_blocks(container: ElementRef<'_>) -> Vec<String> {
    let Some(block_sel) = selector(&TEXT_BLOCKS.join(", ")) else {
        return Vec::new();
    };

    let mut blocks = Vec::new();
    'blocks: for block in container.select(&block_sel) {
        if is_boilerplate(block) {
            continue;
        }

        for ancestor in block.ancestors() {
            if ancestor.id() == container.id() {
                break;
            }
            if let Some(ancestor) = ElementRef::wrap(ancestor) {
                if is_boilerplate(ancestor) || is_text_block(ancestor) {
                    continue 'blocks;
                }
            }
        }

        let text = element_text(block);
        if text.is_empty() {
            continue;
        }
        if !is_heading(block) && text.chars().count() < MIN_BLOCK_CHARS {
            continue;
        }
        blocks.push(text);
    }
    blocks
}

/// Picks the content container with the most non-boilerplate text
fn extract_body(document: &Html) -> String {
    let mut best: Vec<String> = Vec::new();
    let mut best_len = 0;

    for css in CONTENT_CONTAINERS {
        let Some(sel) = selector(css) else { continue };
        for container in document.select(&sel) {
            let blocks = collect_blocks(container);
            let len: usize = blocks.iter().map(|b| b.chars().count()).sum();
            if len > best_len {
                best_len = len;
                best = blocks;
            }
        }
    }

    if best_len == 0 {
        if let Some(body) = selector("body").and_then(|sel| document.select(&sel).next()) {
            best = collect_blocks(body);
        }
    }

    best.join("\n\n")
}

fn extract_author(document: &Html) -> Option<String> {
    first_attr(document, "meta[name=author]", "content")
        .or_else(|| first_text(document, "[rel=author]"))
        .or_else(|| first_text(document, ".author"))
        .or_else(|| first_text(document, ".byline"))
        .map(|author| {
            let trimmed = author.trim();
            trimmed
                .strip_prefix("By ")
                .or_else(|| trimmed.strip_prefix("by "))
                .unwrap_or(trimmed)
                .trim()
                .to_string()
        })
        .filter(|author| !author.is_empty() && author.chars().count() <= 100)
}

fn extract_date(document: &Html) -> Option<String> {
    first_attr(document, "meta[property='article:published_time']", "content")
        .or_else(|| first_attr(document, "meta[name=date]", "content"))
        .or_else(|| first_attr(document, "time[datetime]", "datetime"))
        .map(|raw| normalize_date(&raw))
}

/// Normalizes a date to `YYYY-MM-DD`, returning the raw value if unparseable
pub fn normalize_date(raw: &str) -> String {
    let raw = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return dt.date_naive().format("%Y-%m-%d").to_string();
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return dt.date_naive().format("%Y-%m-%d").to_string();
    }

    for format in ["%Y-%m-%d", "%Y/%m/%d", "%B %d, %Y", "%b %d, %Y", "%d %B %Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
            return date.format("%Y-%m-%d").to_string();
        }
    }

    // "2024-03-05T10:00:00" without an offset
    if let Some(prefix) = raw.get(..10) {
        if let Ok(date) = NaiveDate::parse_from_str(prefix, "%Y-%m-%d") {
            return date.format("%Y-%m-%d").to_string();
        }
    }

    raw.to_string()
}

fn extract_links(document: &Html, page_url: &Url, scope: &LinkScope) -> Vec<Link> {
    let Some(a_sel) = selector("a[href]") else {
        return Vec::new();
    };

    let own_key = normalized_key(page_url).ok();
    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for element in document.select(&a_sel) {
        if element.value().attr("download").is_some() {
            continue;
        }
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        let Some(mut url) = resolve_link(href, page_url) else {
            continue;
        };
        url.set_fragment(None);

        let Ok(key) = normalized_key(&url) else {
            continue;
        };
        if own_key.as_deref() == Some(key.as_str()) || !scope.admits(page_url, &url) {
            continue;
        }
        if seen.insert(key.clone()) {
            links.push(Link { url, key });
        }
    }

    links
}

/// Resolves an href against the page URL
///
/// Returns None for `javascript:`, `mailto:`, `tel:` and `data:` links,
/// fragment-only links, and anything that is not http(s) after resolution.
fn resolve_link(href: &str, base_url: &Url) -> Option<Url> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lower = href.to_ascii_lowercase();
    if ["javascript:", "mailto:", "tel:", "data:"]
        .iter()
        .any(|scheme| lower.starts_with(scheme))
    {
        return None;
    }

    let url = base_url.join(href).ok()?;
    match url.scheme() {
        "http" | "https" => Some(url),
        _ => None,
    }
}
