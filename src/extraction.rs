//! Text extraction from uploaded documents.
//!
//! Extraction is a black box returning one string per page. Pages that fail to decode are logged
//! and contribute empty text; only a document that yields no text at all is an error.

use lopdf::Document as PdfDocument;
use std::path::Path;
use thiserror::Error;

/// Separator placed between consecutive pages in the document text.
pub const PAGE_SEPARATOR: &str = "\n";

/// Errors raised while turning an uploaded file into document text.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// Every page came back empty, typically a scanned-image document.
    #[error("Could not extract text from document; it might be empty or scanned images")]
    NoText,
    /// The reader itself failed to open or parse the file.
    #[error("Document reading error: {0}")]
    Reader(String),
}

/// Source of per-page text for a stored document.
pub trait TextExtractor: Send + Sync {
    /// Read every page of the file at `path`, in page order.
    fn read_pages(&self, path: &Path) -> Result<Vec<String>, ExtractionError>;
}

/// PDF reader backed by `lopdf`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfTextExtractor;

impl TextExtractor for PdfTextExtractor {
    fn read_pages(&self, path: &Path) -> Result<Vec<String>, ExtractionError> {
        let document = PdfDocument::load(path)
            .map_err(|error| ExtractionError::Reader(format!("{}: {error}", path.display())))?;
        let pages = document.get_pages();
        tracing::debug!(path = %path.display(), pages = pages.len(), "Loaded PDF");

        let texts = pages
            .keys()
            .map(|&page_number| match document.extract_text(&[page_number]) {
                Ok(text) => text,
                Err(error) => {
                    tracing::warn!(page = page_number, error = %error, "Failed to extract page text");
                    String::new()
                }
            })
            .collect();
        Ok(texts)
    }
}

/// Read `path` through `extractor` and join its pages into one document text.
///
/// Fails with [`ExtractionError::NoText`] when the joined text is blank.
pub fn extract_document_text(
    extractor: &dyn TextExtractor,
    path: &Path,
) -> Result<String, ExtractionError> {
    let pages = extractor.read_pages(path)?;
    let page_count = pages.len();
    let text = pages.join(PAGE_SEPARATOR);
    if text.trim().is_empty() {
        tracing::warn!(path = %path.display(), pages = page_count, "Document yielded no text");
        return Err(ExtractionError::NoText);
    }
    tracing::debug!(pages = page_count, chars = text.chars().count(), "Extracted document text");
    Ok(text)
}
