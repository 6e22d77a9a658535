//! Drive folder listing
//!
//! A folder page is fetched like any other page and its file links are
//! turned into direct download URLs for the PDF extractor.

use crate::crawler::{FetchResult, Fetcher};
use crate::url::drive_download_url;
use crate::{Result, SumiError};
use async_trait::async_trait;
use scraper::{Html, Selector};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

const FILE_MARKER: &str = "/file/d/";

/// Attributes that may carry a file's display name, in priority order
const NAME_ATTRIBUTES: &[&str] = &["title", "aria-label", "data-tooltip", "data-title"];

/// Lists the documents inside a folder URL
#[async_trait]
pub trait FolderLister: Send + Sync {
    async fn list_folder(&self, folder_url: &Url) -> Result<Vec<Url>>;
}

/// Lists public drive folders by parsing the folder page markup
pub struct DriveFolderLister {
    fetcher: Arc<dyn Fetcher>,
    timeout: Duration,
    max_retries: u32,
}

impl DriveFolderLister {
    pub fn new(fetcher: Arc<dyn Fetcher>, timeout: Duration, max_retries: u32) -> Self {
        Self {
            fetcher,
            timeout,
            max_retries,
        }
    }
}

#[async_trait]
impl FolderLister for DriveFolderLister {
    async fn list_folder(&self, folder_url: &Url) -> Result<Vec<Url>> {
        let result = self
            .fetcher
            .fetch(folder_url, self.timeout, self.max_retries)
            .await;

        match result {
            FetchResult::Success { body, .. } => {
                let html = String::from_utf8_lossy(&body);
                let files = parse_folder_listing(&html);
                debug!("Folder {} lists {} document(s)", folder_url, files.len());
                Ok(files)
            }
            other => Err(SumiError::FolderListing {
                url: folder_url.to_string(),
                message: other.describe(),
            }),
        }
    }
}

/// Extracts download URLs for the PDF files listed in a folder page
///
/// Named entries are kept only when the name ends in `.pdf`. When the page
/// exposes no names at all, every file id found is returned.
pub fn parse_folder_listing(html: &str) -> Vec<Url> {
    let mut named: Vec<(String, String)> = Vec::new();
    let mut seen = HashSet::new();

    let document = Html::parse_document(html);
    if let Ok(sel) = Selector::parse("a[href]") {
        for element in document.select(&sel) {
            let Some(id) = element.value().attr("href").and_then(file_id_in) else {
                continue;
            };
            if !seen.insert(id.clone()) {
                continue;
            }

            let text = element.text().collect::<String>();
            let name = NAME_ATTRIBUTES
                .iter()
                .filter_map(|attr| element.value().attr(attr))
                .chain(std::iter::once(text.as_str()))
                .map(str::trim)
                .find(|name| !name.is_empty());

            if let Some(name) = name {
                named.push((id, name.to_string()));
            }
        }
    }

    let ids: Vec<String> = if named.is_empty() {
        all_file_ids(html)
    } else {
        named
            .into_iter()
            .filter(|(_, name)| name.to_lowercase().ends_with(".pdf"))
            .map(|(id, _)| id)
            .collect()
    };

    ids.iter()
        .filter_map(|id| drive_download_url(id).ok())
        .collect()
}

/// Returns the file id following the first `/file/d/` in the text
fn file_id_in(text: &str) -> Option<String> {
    let start = text.find(FILE_MARKER)? + FILE_MARKER.len();
    let id: String = text[start..]
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect();
    (!id.is_empty()).then_some(id)
}

/// Every distinct file id in the raw markup, in order of appearance
fn all_file_ids(html: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut ids = Vec::new();
    let mut rest = html;

    while let Some(pos) = rest.find(FILE_MARKER) {
        let tail = &rest[pos..];
        if let Some(id) = file_id_in(tail) {
            if seen.insert(id.clone()) {
                ids.push(id);
            }
        }
        rest = &tail[FILE_MARKER.len()..];
    }
    ids
}

/// Finds the confirmation token on a drive "can't scan for viruses" interstitial
pub fn confirm_token(html: &str) -> Option<String> {
    let is_token_char = |c: &char| c.is_ascii_alphanumeric() || *c == '_' || *c == '-';

    if let Some(pos) = html.find("confirm=") {
        let token: String = html[pos + "confirm=".len()..]
            .chars()
            .take_while(is_token_char)
            .collect();
        if !token.is_empty() {
            return Some(token);
        }
    }

    let document = Html::parse_document(html);
    let sel = Selector::parse("input[name=confirm]").ok()?;
    document
        .select(&sel)
        .filter_map(|input| input.value().attr("value"))
        .map(str::trim)
        .find(|value| !value.is_empty())
        .map(String::from)
}

/// Adds the confirmation token to a download URL
pub fn with_confirm_token(url: &Url, token: &str) -> Url {
    let mut confirmed = url.clone();
    confirmed.query_pairs_mut().append_pair("confirm", token);
    confirmed
}
