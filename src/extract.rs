//! Plain-text extraction from uploaded files.
//!
//! PDFs go through `pdf-extract`; `.txt`, `.md` and other text files are
//! read as UTF-8. Anything else is rejected rather than guessed at.

use std::path::Path;

/// Supported content types.
pub const MIME_PDF: &str = "application/pdf";
pub const MIME_TEXT: &str = "text/plain";

/// Extensions read as UTF-8 text.
const TEXT_EXTENSIONS: &[&str] = &["txt", "md", "markdown", "text", "csv", "json", "rst"];

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("unsupported file type: {0}")]
    Unsupported(String),
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("file is not valid UTF-8 text")]
    NotUtf8,
}

/// Content type for `path`, judged by its extension.
pub fn content_type_for(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    if ext == "pdf" {
        Some(MIME_PDF)
    } else if TEXT_EXTENSIONS.contains(&ext.as_str()) {
        Some(MIME_TEXT)
    } else {
        None
    }
}

/// Extract plain text from `bytes` of the given content type.
pub fn extract_text(bytes: &[u8], content_type: &str) -> Result<String, ExtractError> {
    match content_type {
        MIME_PDF => pdf_extract::extract_text_from_mem(bytes)
            .map_err(|e| ExtractError::Pdf(e.to_string())),
        MIME_TEXT => String::from_utf8(bytes.to_vec()).map_err(|_| ExtractError::NotUtf8),
        other => Err(ExtractError::Unsupported(other.to_string())),
    }
}
