//! Folder-scoped similarity retrieval.
//!
//! The query is embedded with the same provider used at ingestion; mixing
//! embedding models between ingest and query silently degrades ranking
//! with no error signal, so both paths share the one `Arc<dyn Embedder>`
//! built at startup.

use crate::embedding::{embed_query, Embedder};
use crate::error::ApiError;
use crate::models::RetrievedChunk;
use crate::vector_store::VectorStore;

/// Top-k chunks for a query, restricted to one folder.
pub async fn retrieve(
    embedder: &dyn Embedder,
    store: &dyn VectorStore,
    query: &str,
    folder_id: &str,
    k: usize,
) -> Result<Vec<RetrievedChunk>, ApiError> {
    let vector = embed_query(embedder, query).await?;
    store.search(folder_id, &vector, k).await
}

/// Chunk texts joined by blank lines, in rank order.
pub fn build_context(hits: &[RetrievedChunk]) -> String {
    hits.iter()
        .map(|h| h.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Source file names deduplicated in first-appearance order, so the
/// highest-ranked file stays first in the sources list.
pub fn source_names(hits: &[RetrievedChunk]) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for hit in hits {
        if !names.iter().any(|n| n == &hit.file_name) {
            names.push(hit.file_name.clone());
        }
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(file_name: &str, index: i64, text: &str, score: f32) -> RetrievedChunk {
        RetrievedChunk {
            file_id: format!("id-{}", file_name),
            file_name: file_name.to_string(),
            chunk_index: index,
            text: text.to_string(),
            score,
        }
    }

    #[test]
    fn test_build_context_joins_in_rank_order() {
        let hits = vec![
            hit("a.pdf", 0, "first chunk", 0.9),
            hit("b.pdf", 4, "second chunk", 0.8),
        ];
        assert_eq!(build_context(&hits), "first chunk\n\nsecond chunk");
    }

    #[test]
    fn test_source_names_dedup_keeps_first_appearance_order() {
        let hits = vec![
            hit("b.pdf", 0, "x", 0.9),
            hit("a.pdf", 1, "y", 0.8),
            hit("b.pdf", 2, "z", 0.7),
        ];
        assert_eq!(source_names(&hits), vec!["b.pdf", "a.pdf"]);
    }

    #[test]
    fn test_source_names_empty_hits() {
        assert!(source_names(&[]).is_empty());
    }
}
