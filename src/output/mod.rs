//! Output module for the knowledge-base file
//!
//! This module handles:
//! - The output record schema
//! - Merging extracted content into records in discovery order
//! - Chunking long pages and every PDF
//! - Writing the JSON file and run statistics

pub mod stats;

pub use stats::{print_statistics, RunStats};

use crate::config::{ExtractionConfig, RunRequest};
use crate::extract::{chunk_text, ExtractionOutcome};
use crate::state::Origin;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};
use url::Url;

/// URL path fragments that mark a page as a blog post
const BLOG_MARKERS: &[&str] = &["/blog", "/post", "/article"];

/// Content type tag stamped on every item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentTag {
    Blog,
    Pdf,
    Doc,
    Other,
}

impl ContentTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Blog => "blog",
            Self::Pdf => "pdf",
            Self::Doc => "doc",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for ContentTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One content unit in the output file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputItem {
    pub title: String,
    pub content: String,
    pub source_url: String,
    pub user_id: String,
    pub content_type: ContentTag,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,

    /// 1-based position among the chunks of one source
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_index: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_chunks: Option<usize>,
}

/// The output file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeBase {
    pub team_id: String,
    pub user_id: String,
    pub items: Vec<OutputItem>,
}

impl KnowledgeBase {
    pub fn new(request: &RunRequest) -> Self {
        Self {
            team_id: request.team_id.clone(),
            user_id: request.user_id.clone(),
            items: Vec::new(),
        }
    }
}

/// Extracted content of one completed source
#[derive(Debug, Clone)]
pub struct Harvested {
    /// Discovery sequence number of the source
    pub seq: u64,
    pub url: Url,
    pub origin: Origin,
    pub content: Arc<ExtractionOutcome>,
}

/// Picks the content type tag for a completed source
pub fn content_tag(harvested: &Harvested) -> ContentTag {
    match (&*harvested.content, harvested.origin) {
        (_, Origin::FolderChild) => ContentTag::Doc,
        (ExtractionOutcome::Document(_), _) => ContentTag::Pdf,
        _ => {
            let url = harvested.url.as_str().to_lowercase();
            if BLOG_MARKERS.iter().any(|marker| url.contains(marker)) {
                ContentTag::Blog
            } else {
                ContentTag::Other
            }
        }
    }
}

/// Merges completed sources into the knowledge base
///
/// Items follow discovery order, then chunk order. PDFs are always chunked;
/// pages only when their body is longer than the chunk size. Sources without
/// text and folder listings produce no items.
pub fn assemble(
    request: &RunRequest,
    harvested: &[Harvested],
    extraction: &ExtractionConfig,
) -> KnowledgeBase {
    let mut ordered: Vec<&Harvested> = harvested.iter().collect();
    ordered.sort_by_key(|h| h.seq);

    let mut kb = KnowledgeBase::new(request);
    for h in ordered {
        let before = kb.items.len();
        kb.items
            .extend(items_for(h, &request.user_id, extraction));
        debug!("{} produced {} item(s)", h.url, kb.items.len() - before);
    }
    kb
}

fn items_for(h: &Harvested, user_id: &str, extraction: &ExtractionConfig) -> Vec<OutputItem> {
    let tag = content_tag(h);
    let (title, body, author, date, always_chunk) = match &*h.content {
        ExtractionOutcome::Page(page) => (
            &page.title,
            &page.body,
            page.author.as_ref(),
            page.date.as_ref(),
            false,
        ),
        ExtractionOutcome::Document(doc) => (&doc.title, &doc.text, doc.author.as_ref(), None, true),
        ExtractionOutcome::Folder(_) => return Vec::new(),
    };

    if body.trim().is_empty() {
        return Vec::new();
    }

    let item = |title: String, content: String, chunk: Option<(usize, usize)>| OutputItem {
        title,
        content,
        source_url: h.url.to_string(),
        user_id: user_id.to_string(),
        content_type: tag,
        author: author.cloned(),
        date: date.cloned(),
        chunk_index: chunk.map(|(index, _)| index),
        total_chunks: chunk.map(|(_, total)| total),
    };

    if !always_chunk && body.chars().count() <= extraction.chunk_size {
        return vec![item(title.clone(), body.trim().to_string(), None)];
    }

    let chunks = chunk_text(body, extraction.chunk_size, extraction.chunk_overlap);
    let total = chunks.len();
    chunks
        .into_iter()
        .enumerate()
        .map(|(i, chunk)| {
            let index = i + 1;
            let title = if total > 1 {
                format!("{} - Part {}", title, index)
            } else {
                title.clone()
            };
            item(title, chunk, Some((index, total)))
        })
        .collect()
}

/// Writes the knowledge base as pretty-printed JSON, creating parent
/// directories as needed
pub fn write_json(kb: &KnowledgeBase, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(kb)?;
    fs::write(path, json)?;
    info!("Wrote {} item(s) to {}", kb.items.len(), path.display());
    Ok(())
}
