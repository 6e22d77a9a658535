//! URL handling module for Sumi-Harvest
//!
//! This module provides URL normalization, host matching, link scoping and
//! source classification.

mod normalize;
mod scope;

use url::Url;

pub use normalize::{host_key, normalize_parsed, normalize_url, normalized_key};
pub use scope::{matches_wildcard, LinkScope};

/// Path fragments that mark listing pages (indexes of posts or documents)
const LISTING_HINTS: &[&str] = &[
    "/blog", "/posts", "/articles", "/topics", "/learn", "/resources", "/archive", "/news",
];

/// Content category of a source, deciding which extractor handles it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceCategory {
    /// Drive-style folder whose children are documents
    DriveFolder,
    /// PDF document, fetched as bytes
    Pdf,
    /// Ordinary HTML page handled by static parsing
    SimplePage,
    /// HTML page whose content only appears after rendering
    ComplexListing,
}

impl SourceCategory {
    /// Returns true for categories handled by the HTML pipeline
    pub fn is_page(&self) -> bool {
        matches!(self, Self::SimplePage | Self::ComplexListing)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DriveFolder => "drive-folder",
            Self::Pdf => "pdf",
            Self::SimplePage => "simple-page",
            Self::ComplexListing => "complex-listing",
        }
    }
}

impl std::fmt::Display for SourceCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Classifies a URL before anything is fetched
///
/// Priority order:
/// 1. Drive folder (`drive.google.com` with `/folders/` in the path)
/// 2. PDF (`.pdf` path, drive file view or download URLs)
/// 3. Simple page (the default)
///
/// `ComplexListing` is never returned here; a page only becomes one after
/// static extraction finds too few links.
///
/// # Examples
///
/// ```
/// use sumi_harvest::url::{classify_url, SourceCategory};
/// use url::Url;
///
/// let url = Url::parse("https://example.com/report.PDF").unwrap();
/// assert_eq!(classify_url(&url), SourceCategory::Pdf);
/// ```
pub fn classify_url(url: &Url) -> SourceCategory {
    if is_drive_host(url) && url.path().contains("/folders/") {
        return SourceCategory::DriveFolder;
    }

    if url.path().to_lowercase().ends_with(".pdf") || is_drive_file(url) {
        return SourceCategory::Pdf;
    }

    SourceCategory::SimplePage
}

/// Re-classifies a fetched response
///
/// A PDF content type or `%PDF-` magic bytes turn any non-folder category
/// into `Pdf`. Everything else keeps its URL-derived category.
pub fn classify_response(
    category: SourceCategory,
    content_type: Option<&str>,
    body: &[u8],
) -> SourceCategory {
    if category == SourceCategory::DriveFolder {
        return category;
    }

    let declared_pdf = content_type
        .map(|ct| ct.to_ascii_lowercase().contains("application/pdf"))
        .unwrap_or(false);

    if declared_pdf || body.starts_with(b"%PDF-") {
        SourceCategory::Pdf
    } else {
        category
    }
}

/// Listing-like URLs are likely escalation candidates and are scheduled first
pub fn is_listing_like(url: &Url) -> bool {
    let path = url.path().to_lowercase();
    path == "/"
        || LISTING_HINTS.iter().any(|hint| {
            path == *hint || path.starts_with(&format!("{}/page", hint)) || path.ends_with(hint)
        })
}

fn is_drive_host(url: &Url) -> bool {
    matches!(url.host_str(), Some(host) if host.eq_ignore_ascii_case("drive.google.com"))
}

fn is_drive_file(url: &Url) -> bool {
    if !is_drive_host(url) {
        return false;
    }
    if url.path().starts_with("/file/d/") {
        return true;
    }
    url.path() == "/uc" && url.query_pairs().any(|(k, _)| k == "id")
}

/// Extracts the file id from a drive file or download URL
pub fn drive_file_id(url: &Url) -> Option<String> {
    if !is_drive_host(url) {
        return None;
    }
    if let Some(rest) = url.path().strip_prefix("/file/d/") {
        return rest.split('/').next().filter(|id| !id.is_empty()).map(String::from);
    }
    url.query_pairs()
        .find(|(k, _)| k == "id")
        .map(|(_, v)| v.into_owned())
}

/// Maps a drive file viewer link (`/file/d/<id>/...`) to its direct download URL
///
/// Returns `None` for anything that is not a viewer link, download URLs
/// included.
pub fn drive_download_target(url: &Url) -> Option<Url> {
    if !is_drive_host(url) || !url.path().starts_with("/file/d/") {
        return None;
    }
    drive_file_id(url).and_then(|id| drive_download_url(&id).ok())
}

/// Builds the direct download URL for a drive file id
pub fn drive_download_url(file_id: &str) -> Result<Url, ::url::ParseError> {
    let mut url = Url::parse("https://drive.google.com/uc")?;
    url.query_pairs_mut()
        .append_pair("export", "download")
        .append_pair("id", file_id);
    Ok(url)
}
