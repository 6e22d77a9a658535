//! Content extraction
//!
//! One extractor per source category, selected by an exhaustive match:
//!
//! - `Html`: static parse of the fetched markup
//! - `Rendered`: browser render, then the static parse of the result
//! - `Pdf`: text and metadata from PDF bytes
//! - `Folder`: document URLs from a folder listing

pub mod chunk;
mod folder;
mod html;
mod pdf;
mod rendered;

use crate::url::{LinkScope, SourceCategory};
use crate::Result;
use thiserror::Error;
use url::Url;

pub use chunk::{chunk_text, clean_pdf_text, collapse_whitespace};
pub use folder::{
    confirm_token, parse_folder_listing, with_confirm_token, DriveFolderLister, FolderLister,
};
pub use html::{extract_html, normalize_date, title_from_url};
pub use pdf::extract_pdf;
pub use rendered::{RenderError, Renderer, WebDriverRenderer};

#[cfg(test)]
pub(crate) use pdf::tests::build_pdf;

/// Extraction failures that leave a source without content
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("PDF could not be parsed: {0}")]
    Pdf(String),

    #[error("document contains no extractable text")]
    NoText,
}

/// A followed link: the URL as discovered and its normalized key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub url: Url,
    pub key: String,
}

/// Result of the HTML extractor
#[derive(Debug, Clone, Default)]
pub struct ExtractedPage {
    pub title: String,
    pub body: String,
    pub author: Option<String>,
    pub date: Option<String>,
    /// In-scope links, deduplicated, in document order
    pub links: Vec<Link>,
}

impl ExtractedPage {
    /// Number of in-scope links discovered on the page
    pub fn in_scope_links(&self) -> usize {
        self.links.len()
    }

    pub fn has_body(&self) -> bool {
        !self.body.trim().is_empty()
    }
}

/// Which PDF backend produced the text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PdfBackend {
    PdfExtract,
    Lopdf,
}

impl PdfBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PdfExtract => "pdf-extract",
            Self::Lopdf => "lopdf",
        }
    }
}

impl std::fmt::Display for PdfBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of the PDF extractor
#[derive(Debug, Clone)]
pub struct PdfDocument {
    pub title: String,
    pub author: Option<String>,
    pub text: String,
    pub backend: PdfBackend,
    pub failed_pages: usize,
}

/// What an extractor produced for one source
#[derive(Debug, Clone)]
pub enum ExtractionOutcome {
    Page(ExtractedPage),
    Document(PdfDocument),
    Folder(Vec<Url>),
}

/// Collaborators an extractor may need
pub struct ExtractContext<'a> {
    pub scope: &'a LinkScope,
    pub renderer: Option<&'a dyn Renderer>,
    pub folder_lister: &'a dyn FolderLister,
}

/// The extraction strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extractor {
    Html,
    Rendered,
    Pdf,
    Folder,
}

impl Extractor {
    /// Selects the extractor for a category
    pub fn for_category(category: SourceCategory) -> Self {
        match category {
            SourceCategory::DriveFolder => Self::Folder,
            SourceCategory::Pdf => Self::Pdf,
            SourceCategory::SimplePage => Self::Html,
            SourceCategory::ComplexListing => Self::Rendered,
        }
    }

    /// Whether the orchestrator fetches the content before extraction
    ///
    /// The folder lister and the renderer retrieve their own content.
    pub fn needs_fetch(&self) -> bool {
        matches!(self, Self::Html | Self::Pdf)
    }

    /// Runs the extractor
    ///
    /// `body` is the fetched content for extractors that need a fetch and
    /// is ignored by the others.
    pub async fn extract(
        &self,
        url: &Url,
        body: &[u8],
        ctx: &ExtractContext<'_>,
    ) -> Result<ExtractionOutcome> {
        match self {
            Self::Html => {
                let html = String::from_utf8_lossy(body);
                Ok(ExtractionOutcome::Page(extract_html(&html, url, ctx.scope)))
            }
            Self::Rendered => {
                let renderer = ctx.renderer.ok_or(RenderError::NotConfigured)?;
                let html = renderer.render(url).await?;
                Ok(ExtractionOutcome::Page(extract_html(&html, url, ctx.scope)))
            }
            Self::Pdf => Ok(ExtractionOutcome::Document(extract_pdf(body, url)?)),
            Self::Folder => Ok(ExtractionOutcome::Folder(
                ctx.folder_lister.list_folder(url).await?,
            )),
        }
    }
}
