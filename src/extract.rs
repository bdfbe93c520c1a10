//! Per-page text extraction for uploaded documents.
//!
//! PDFs yield one entry per physical page (1-based); plain-text files yield
//! a single page. Extraction never panics: failures come back as
//! [`ExtractError`] and the caller skips the file.

use thiserror::Error;

pub const MIME_PDF: &str = "application/pdf";
pub const MIME_TEXT: &str = "text/plain; charset=utf-8";

/// Supported document kinds, detected from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Text,
}

impl DocumentKind {
    /// Kind for `filename`, matching `.pdf` / `.txt` case-insensitively.
    pub fn from_filename(filename: &str) -> Option<Self> {
        let ext = std::path::Path::new(filename)
            .extension()?
            .to_str()?
            .to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Some(DocumentKind::Pdf),
            "txt" => Some(DocumentKind::Text),
            _ => None,
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            DocumentKind::Pdf => MIME_PDF,
            DocumentKind::Text => MIME_TEXT,
        }
    }
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unsupported file type")]
    Unsupported,
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("text file is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),
}

/// Extract `(page, text)` pairs from `bytes`.
pub fn extract_pages(bytes: &[u8], kind: DocumentKind) -> Result<Vec<(u32, String)>, ExtractError> {
    match kind {
        DocumentKind::Pdf => extract_pdf(bytes),
        DocumentKind::Text => {
            let text = std::str::from_utf8(strip_bom(bytes))?;
            Ok(vec![(1, text.to_string())])
        }
    }
}

fn extract_pdf(bytes: &[u8]) -> Result<Vec<(u32, String)>, ExtractError> {
    // pdf-extract panics on some malformed font tables.
    let pages = std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem_by_pages(bytes))
        .map_err(|_| ExtractError::Pdf("parser panicked on malformed input".to_string()))?
        .map_err(|e| ExtractError::Pdf(e.to_string()))?;
    Ok(pages
        .into_iter()
        .enumerate()
        .map(|(i, text)| (i as u32 + 1, text))
        .collect())
}

fn strip_bom(bytes: &[u8]) -> &[u8] {
    bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes)
}
