//! Sliding-window text chunker.
//!
//! Splits extracted document text into overlapping windows (default 1000
//! characters with 200 shared between neighbours) so that retrieval can
//! match a question against a span even when the answer straddles a window
//! boundary. Window edges snap back to whitespace where possible to avoid
//! splitting words.
//!
//! Chunk identity is positional: the ingest pipeline pairs each returned
//! window with its index, and the vector store keys points by
//! (file_id, chunk_index).

/// Split text into overlapping character windows.
///
/// `chunk_size` and `overlap` are counted in characters, not bytes, so
/// multi-byte text never splits inside a code point. Returns windows in
/// document order; empty or whitespace-only input yields no windows.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let text = text.trim();
    if text.is_empty() || chunk_size == 0 {
        return Vec::new();
    }

    let chars: Vec<char> = text.chars().collect();
    let n = chars.len();
    if n <= chunk_size {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut start = 0usize;

    while start < n {
        let mut end = (start + chunk_size).min(n);

        // Snap back to the nearest whitespace, but never past the window
        // midpoint: a pathological run without spaces still makes progress.
        if end < n {
            let floor = start + chunk_size / 2;
            let mut cut = end;
            while cut > floor && !chars[cut - 1].is_whitespace() {
                cut -= 1;
            }
            if cut > floor {
                end = cut;
            }
        }

        let piece: String = chars[start..end].iter().collect();
        let piece = piece.trim();
        if !piece.is_empty() {
            chunks.push(piece.to_string());
        }

        if end >= n {
            break;
        }
        start = end.saturating_sub(overlap).max(start + 1);
    }

    chunks
}
