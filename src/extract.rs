//! PDF text extraction.
//!
//! Uploads are PDF-only (enforced at the upload endpoint); this module turns
//! the raw payload into plain UTF-8 text for chunking. Extraction failures
//! surface as [`ApiError::Extraction`] and move the file to the `failed`
//! index state rather than panicking the ingest task.

use crate::error::ApiError;

/// MIME type recorded for stored uploads.
pub const MIME_PDF: &str = "application/pdf";

/// Extract plain text from a PDF payload.
///
/// Fails when the payload is not a PDF, cannot be parsed (corrupt or
/// encrypted), or parses but contains no extractable text (scanned images
/// with no text layer).
pub fn extract_text(bytes: &[u8]) -> Result<String, ApiError> {
    if !bytes.starts_with(b"%PDF-") {
        return Err(ApiError::Extraction("not a PDF document".to_string()));
    }

    let raw = pdf_extract::extract_text_from_mem(bytes)
        .map_err(|e| ApiError::Extraction(e.to_string()))?;

    let text = normalize_text(&raw);
    if text.is_empty() {
        return Err(ApiError::Extraction(
            "no extractable text (scanned or image-only PDF)".to_string(),
        ));
    }

    Ok(text)
}

/// Collapse extractor artifacts: CRLF line endings, trailing spaces, and
/// runs of blank lines (page breaks often come out as several).
fn normalize_text(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut blank_run = 0usize;

    for line in raw.replace("\r\n", "\n").split('\n') {
        let line = line.trim_end();
        if line.is_empty() {
            blank_run += 1;
            if blank_run <= 1 {
                out.push('\n');
            }
        } else {
            blank_run = 0;
            out.push_str(line);
            out.push('\n');
        }
    }

    out.trim().to_string()
}
