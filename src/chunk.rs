//! Fixed-size overlapping text chunker.
//!
//! Splits a document body into windows of `chunk_size` characters with
//! `overlap` characters shared between adjacent windows. Windows are the
//! unit of embedding and similarity search in the retriever; they are
//! recomputed per query and never persisted.
//!
//! Splits never land inside a UTF-8 code point: every window boundary is
//! snapped back to the nearest char boundary.

use crate::models::DocumentChunk;

/// Split `text` into overlapping [`DocumentChunk`]s tagged with `source_file`.
///
/// # Guarantees
///
/// - Empty or whitespace-only text produces no chunks.
/// - Every character of the input appears in at least one chunk.
/// - Adjacent chunks share `overlap` characters (except possibly the last).
pub fn chunk_document(
    source_file: &str,
    text: &str,
    chunk_size: usize,
    overlap: usize,
) -> Vec<DocumentChunk> {
    assert!(overlap < chunk_size, "overlap must be smaller than chunk_size");

    if text.trim().is_empty() {
        return Vec::new();
    }

    let step = chunk_size - overlap;
    let mut chunks = Vec::new();
    let mut start = 0usize;

    while start < text.len() {
        let end = snap_to_char_boundary(text, start.saturating_add(chunk_size));
        let piece = text[start..end].trim();
        if !piece.is_empty() {
            chunks.push(DocumentChunk {
                text: piece.to_string(),
                source_file: source_file.to_string(),
            });
        }

        if end >= text.len() {
            break;
        }

        let next = snap_to_char_boundary(text, start + step);
        // A step of zero would loop forever on dense multi-byte text.
        start = if next > start {
            next
        } else {
            text[start..]
                .char_indices()
                .nth(1)
                .map(|(i, _)| start + i)
                .unwrap_or(text.len())
        };
    }

    chunks
}

/// Snap a byte index back to the nearest valid UTF-8 char boundary.
fn snap_to_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}
