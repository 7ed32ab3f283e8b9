//! Paragraph-boundary text chunker.
//!
//! Splits extracted document text on blank lines and drops segments that
//! are too short to carry meaning (running headers, page numbers, table
//! debris). There is no upper bound: an oversized paragraph is passed
//! through and left for the embedding service to accept or reject.

/// Default minimum trimmed length, in characters, for a chunk to be kept.
pub const DEFAULT_MIN_CHARS: usize = 50;

/// Split text into chunks on blank-line boundaries.
///
/// A boundary is a newline, optional whitespace, and another newline.
/// Segments are trimmed; those shorter than `min_chars` characters are
/// discarded. The same input always yields the same ordered output.
pub fn chunk_text(text: &str, min_chars: usize) -> Vec<String> {
    split_paragraphs(text)
        .into_iter()
        .map(str::trim)
        .filter(|segment| segment.chars().count() >= min_chars)
        .map(str::to_string)
        .collect()
}

fn split_paragraphs(text: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    let mut start = 0;
    let bytes = text.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'\n' {
            // Look ahead over whitespace for a second newline
            let mut j = i + 1;
            let mut closes = None;
            while j < bytes.len() && bytes[j].is_ascii_whitespace() {
                if bytes[j] == b'\n' {
                    closes = Some(j);
                }
                j += 1;
            }
            if let Some(end) = closes {
                segments.push(&text[start..i]);
                start = end + 1;
                i = end + 1;
                continue;
            }
        }
        i += 1;
    }
    segments.push(&text[start..]);
    segments
}
