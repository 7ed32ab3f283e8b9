//! Text extraction for uploaded documents.
//!
//! Only PDF is recognised by the ingestion trigger. Extraction never panics
//! the caller: pdf-extract runs on the blocking pool and a panic inside it
//! surfaces as a join error, which is reported as an ordinary failure.

use thiserror::Error;

pub const MIME_PDF: &str = "application/pdf";

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("unsupported content-type: {0}")]
    UnsupportedContentType(String),
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("document contains no extractable text")]
    NoText,
}

/// Whether `content_type` denotes a PDF (`application/pdf`, `application/x-pdf`, ...).
pub fn is_pdf(content_type: &str) -> bool {
    content_type.to_ascii_lowercase().contains("pdf")
}

/// Extract plain UTF-8 text from document bytes.
pub fn extract_text(bytes: &[u8], content_type: &str) -> Result<String, ExtractError> {
    if !is_pdf(content_type) {
        return Err(ExtractError::UnsupportedContentType(
            content_type.to_string(),
        ));
    }
    let text = pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))?;
    if text.trim().is_empty() {
        return Err(ExtractError::NoText);
    }
    Ok(text)
}

/// [`extract_text`] on the blocking pool.
pub async fn extract_text_blocking(
    bytes: Vec<u8>,
    content_type: String,
) -> Result<String, ExtractError> {
    tokio::task::spawn_blocking(move || extract_text(&bytes, &content_type))
        .await
        .map_err(|e| ExtractError::Pdf(format!("extractor aborted: {}", e)))?
}
