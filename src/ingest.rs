//! Document indexing pipeline.
//!
//! Drives an uploaded PDF through extract → chunk → embed → upsert,
//! recording progress in `files.index_state` so clients can poll while the
//! background task runs. Vector writes are keyed by (file_id, chunk_index),
//! so re-indexing the same file overwrites instead of duplicating, and a
//! failure partway leaves the already-written chunks in place.

use std::sync::Arc;

use sqlx::SqlitePool;

use crate::chunk::chunk_text;
use crate::config::Config;
use crate::embedding::Embedder;
use crate::error::ApiError;
use crate::extract;
use crate::models::{now_ts, ChunkUpsert, IndexState};
use crate::vector_store::VectorStore;

/// Everything the background task needs, owned so it can outlive the
/// upload request that spawned it.
pub struct IngestJob {
    pub pool: SqlitePool,
    pub config: Arc<Config>,
    pub embedder: Arc<dyn Embedder>,
    pub store: Arc<dyn VectorStore>,
    pub file_id: String,
    pub file_name: String,
    pub folder_id: String,
    pub bytes: Vec<u8>,
}

/// Run the pipeline and record the terminal state on the file row. Never
/// returns an error; failures land in `index_state = 'failed'` with the
/// message preserved for the status endpoint.
pub async fn run(job: IngestJob) {
    match index_file(&job).await {
        Ok(chunks) => {
            tracing::info!(file_id = %job.file_id, chunks, "file indexed");
        }
        Err(e) => {
            tracing::warn!(file_id = %job.file_id, error = %e, "indexing failed");
            if let Err(db_err) = mark_failed(&job.pool, &job.file_id, &e.to_string()).await {
                tracing::error!(file_id = %job.file_id, error = %db_err, "could not record index failure");
            }
        }
    }
}

/// Spawn [`run`] on the runtime. The upload handler fires and forgets;
/// tests await the handle.
pub fn spawn(job: IngestJob) -> tokio::task::JoinHandle<()> {
    tokio::spawn(run(job))
}

async fn index_file(job: &IngestJob) -> Result<usize, ApiError> {
    set_state(&job.pool, &job.file_id, IndexState::Extracting).await?;
    let text = extract::extract_text(&job.bytes)?;
    index_text(job, &text).await
}

/// Chunk, embed, and upsert already-extracted text.
///
/// Embedding runs in provider-sized batches, upserting as each batch
/// completes, so a retry after a mid-stream failure re-does at most one
/// batch of finished work.
async fn index_text(job: &IngestJob, text: &str) -> Result<usize, ApiError> {
    let chunks = chunk_text(
        text,
        job.config.chunking.chunk_size,
        job.config.chunking.chunk_overlap,
    );

    set_state(&job.pool, &job.file_id, IndexState::Embedding).await?;

    let mut indexed = 0usize;
    let batch_size = job.config.embedding.batch_size.max(1);
    for (batch_no, batch) in chunks.chunks(batch_size).enumerate() {
        let vectors = job.embedder.embed(batch).await?;
        if vectors.len() != batch.len() {
            return Err(ApiError::Embedding(format!(
                "provider returned {} vectors for {} inputs",
                vectors.len(),
                batch.len()
            )));
        }

        let base = batch_no * batch_size;
        let upserts: Vec<ChunkUpsert> = batch
            .iter()
            .zip(vectors)
            .enumerate()
            .map(|(i, (chunk, embedding))| ChunkUpsert {
                file_id: job.file_id.clone(),
                file_name: job.file_name.clone(),
                folder_id: job.folder_id.clone(),
                chunk_index: (base + i) as i64,
                text: chunk.clone(),
                embedding,
            })
            .collect();

        job.store.upsert(&upserts).await?;
        indexed += upserts.len();
    }

    mark_indexed(&job.pool, &job.file_id, indexed as i64).await?;
    Ok(indexed)
}

async fn set_state(pool: &SqlitePool, file_id: &str, state: IndexState) -> Result<(), ApiError> {
    sqlx::query("UPDATE files SET index_state = ?, updated_at = ? WHERE id = ?")
        .bind(state.as_str())
        .bind(now_ts())
        .bind(file_id)
        .execute(pool)
        .await?;
    Ok(())
}

async fn mark_indexed(pool: &SqlitePool, file_id: &str, chunk_count: i64) -> Result<(), ApiError> {
    sqlx::query(
        "UPDATE files SET index_state = ?, index_error = NULL, chunk_count = ?, updated_at = ? WHERE id = ?",
    )
    .bind(IndexState::Indexed.as_str())
    .bind(chunk_count)
    .bind(now_ts())
    .bind(file_id)
    .execute(pool)
    .await?;
    Ok(())
}

async fn mark_failed(pool: &SqlitePool, file_id: &str, message: &str) -> Result<(), ApiError> {
    sqlx::query("UPDATE files SET index_state = ?, index_error = ?, updated_at = ? WHERE id = ?")
        .bind(IndexState::Failed.as_str())
        .bind(message)
        .bind(now_ts())
        .bind(file_id)
        .execute(pool)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sqlx::Row;

    use crate::config::Config;
    use crate::db;
    use crate::migrate;
    use crate::vector_store::SqliteVectorStore;

    /// Deterministic embedder: each vector encodes the text length so
    /// assertions do not depend on a real model.
    struct FakeEmbedder;

    #[async_trait]
    impl Embedder for FakeEmbedder {
        fn model_name(&self) -> &str {
            "fake"
        }
        fn dims(&self) -> usize {
            4
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ApiError> {
            Ok(texts
                .iter()
                .map(|t| vec![t.len() as f32, 1.0, 0.0, 0.0])
                .collect())
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl Embedder for FailingEmbedder {
        fn model_name(&self) -> &str {
            "failing"
        }
        fn dims(&self) -> usize {
            4
        }
        async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, ApiError> {
            Err(ApiError::Embedding("synthetic failure".to_string()))
        }
    }

    async fn job_with_fixture(
        embedder: Arc<dyn Embedder>,
        bytes: Vec<u8>,
    ) -> (IngestJob, SqlitePool, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.db.path = dir.path().join("test.db");
        config.chunking.chunk_size = 100;
        config.chunking.chunk_overlap = 20;
        config.embedding.batch_size = 2;

        let pool = db::connect(&config).await.unwrap();
        migrate::ensure_schema(&pool).await.unwrap();

        let now = now_ts();
        sqlx::query("INSERT INTO folders (id, name, created_at, updated_at) VALUES (?, ?, ?, ?)")
            .bind("folder-1")
            .bind("reports")
            .bind(now)
            .bind(now)
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query(
            r#"
            INSERT INTO files (id, folder_id, name, object_key, size_bytes, mime_type,
                               index_state, chunk_count, created_at, updated_at)
            VALUES ('file-1', 'folder-1', 'report.pdf', 'pdfs/file-1.pdf', 0,
                    'application/pdf', 'uploading', 0, ?, ?)
            "#,
        )
        .bind(now)
        .bind(now)
        .execute(&pool)
        .await
        .unwrap();

        let job = IngestJob {
            pool: pool.clone(),
            config: Arc::new(config),
            embedder,
            store: Arc::new(SqliteVectorStore::new(pool.clone())),
            file_id: "file-1".to_string(),
            file_name: "report.pdf".to_string(),
            folder_id: "folder-1".to_string(),
            bytes,
        };

        (job, pool, dir)
    }

    async fn file_status(pool: &SqlitePool) -> (String, Option<String>, i64) {
        let row = sqlx::query(
            "SELECT index_state, index_error, chunk_count FROM files WHERE id = 'file-1'",
        )
        .fetch_one(pool)
        .await
        .unwrap();
        (
            row.get("index_state"),
            row.get("index_error"),
            row.get("chunk_count"),
        )
    }

    async fn chunk_rows(pool: &SqlitePool) -> i64 {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM chunks WHERE file_id = 'file-1'")
            .fetch_one(pool)
            .await
            .unwrap();
        row.get("n")
    }

    #[tokio::test]
    async fn test_index_text_chunks_embeds_and_marks_indexed() {
        let (job, pool, _dir) = job_with_fixture(Arc::new(FakeEmbedder), Vec::new()).await;

        // Long enough to split at chunk_size 100 into several chunks.
        let text = "The quarterly report covers revenue, costs, and headcount. ".repeat(10);
        let n = index_text(&job, &text).await.unwrap();
        assert!(n > 1, "expected multiple chunks, got {}", n);

        let (state, error, chunk_count) = file_status(&pool).await;
        assert_eq!(state, "indexed");
        assert_eq!(error, None);
        assert_eq!(chunk_count, n as i64);
        assert_eq!(chunk_rows(&pool).await, n as i64);
    }

    #[tokio::test]
    async fn test_reindexing_overwrites_instead_of_duplicating() {
        let (job, pool, _dir) = job_with_fixture(Arc::new(FakeEmbedder), Vec::new()).await;

        let text = "Inventory valuation uses first in first out accounting. ".repeat(10);
        let first = index_text(&job, &text).await.unwrap();
        let second = index_text(&job, &text).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(chunk_rows(&pool).await, first as i64);
    }

    #[tokio::test]
    async fn test_embedding_failure_propagates() {
        let (job, pool, _dir) = job_with_fixture(Arc::new(FailingEmbedder), Vec::new()).await;

        let err = index_text(&job, "some extracted text").await.unwrap_err();
        assert!(matches!(err, ApiError::Embedding(_)));
        assert_eq!(chunk_rows(&pool).await, 0);
    }

    #[tokio::test]
    async fn test_run_marks_failed_on_non_pdf_payload() {
        let (job, pool, _dir) =
            job_with_fixture(Arc::new(FakeEmbedder), b"plain text, not a pdf".to_vec()).await;

        run(job).await;

        let (state, error, chunk_count) = file_status(&pool).await;
        assert_eq!(state, "failed");
        assert!(error.unwrap().contains("not a PDF"));
        assert_eq!(chunk_count, 0);
    }
}
