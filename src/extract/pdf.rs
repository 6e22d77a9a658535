//! PDF text extraction
//!
//! Whole-document extraction with pdf-extract comes first. When it fails
//! (or panics on a malformed font table) each page is read with lopdf on its
//! own, so one corrupt page only costs that page's text.

use crate::extract::chunk::clean_pdf_text;
use crate::extract::html::title_from_url;
use crate::extract::{ExtractError, PdfBackend, PdfDocument};
use lopdf::{Dictionary, Document, Object};
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, warn};
use url::Url;

/// Extracts text and metadata from PDF bytes
///
/// Returns `ExtractError::NoText` when neither backend yields any text.
pub fn extract_pdf(bytes: &[u8], source_url: &Url) -> Result<PdfDocument, ExtractError> {
    let document = extract_with(bytes, source_url, extract_whole)?;
    debug!(
        url = %source_url,
        backend = %document.backend,
        failed_pages = document.failed_pages,
        "PDF extracted"
    );
    Ok(document)
}

/// Runs `whole` first and falls back to per-page lopdf extraction
fn extract_with(
    bytes: &[u8],
    source_url: &Url,
    whole: fn(&[u8]) -> Option<String>,
) -> Result<PdfDocument, ExtractError> {
    let parsed = Document::load_mem(bytes).ok();
    let (title, author) = parsed
        .as_ref()
        .map(read_info)
        .unwrap_or((None, None));
    let title = title.unwrap_or_else(|| title_from_url(source_url));

    if let Some(text) = whole(bytes) {
        let cleaned = clean_pdf_text(&text);
        if !cleaned.is_empty() {
            return Ok(PdfDocument {
                title,
                author,
                text: cleaned,
                backend: PdfBackend::PdfExtract,
                failed_pages: 0,
            });
        }
    }

    let document = parsed.ok_or_else(|| ExtractError::Pdf("unreadable PDF structure".into()))?;
    let (text, failed_pages) = extract_per_page(&document);
    let cleaned = clean_pdf_text(&text);
    if cleaned.is_empty() {
        return Err(ExtractError::NoText);
    }

    if failed_pages > 0 {
        warn!(
            url = %source_url,
            failed_pages,
            "Some PDF pages could not be read"
        );
    }

    Ok(PdfDocument {
        title,
        author,
        text: cleaned,
        backend: PdfBackend::Lopdf,
        failed_pages,
    })
}

/// Runs pdf-extract, treating a panic as a failed extraction
fn extract_whole(bytes: &[u8]) -> Option<String> {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        pdf_extract::extract_text_from_mem(bytes)
    }));

    match outcome {
        Ok(Ok(text)) => Some(text),
        Ok(Err(e)) => {
            debug!("pdf-extract failed: {}", e);
            None
        }
        Err(_) => {
            debug!("pdf-extract panicked; falling back to per-page extraction");
            None
        }
    }
}

/// Extracts every page separately; a failing page contributes empty text
fn extract_per_page(document: &Document) -> (String, usize) {
    let mut pages_text = Vec::new();
    let mut failed = 0;

    for page_number in document.get_pages().keys() {
        let page = panic::catch_unwind(AssertUnwindSafe(|| document.extract_text(&[*page_number])));
        match page {
            Ok(Ok(text)) => pages_text.push(text),
            _ => {
                failed += 1;
                pages_text.push(String::new());
            }
        }
    }

    (pages_text.join("\n"), failed)
}

/// Reads Title and Author from the document info dictionary
fn read_info(document: &Document) -> (Option<String>, Option<String>) {
    let info = match document.trailer.get(b"Info") {
        Ok(Object::Reference(id)) => document.get_dictionary(*id).ok(),
        Ok(Object::Dictionary(dict)) => Some(dict),
        _ => None,
    };

    match info {
        Some(dict) => (info_string(dict, b"Title"), info_string(dict, b"Author")),
        None => (None, None),
    }
}

fn info_string(dict: &Dictionary, key: &[u8]) -> Option<String> {
    match dict.get(key).ok()? {
        Object::String(bytes, _) => {
            let text = decode_pdf_string(bytes);
            let text = text.trim();
            (!text.is_empty()).then(|| text.to_string())
        }
        _ => None,
    }
}

/// Decodes a PDF text string (UTF-16BE with BOM, otherwise Latin-1)
fn decode_pdf_string(bytes: &[u8]) -> String {
    if let Some(rest) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = rest
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    bytes.iter().map(|&b| b as char).collect()
}
