//! Vector storage behind a single trait, selected once at startup.
//!
//! Two backends implement [`VectorStore`]:
//!
//! - [`SqliteVectorStore`] keeps chunk vectors in the `chunks` table and
//!   ranks by cosine similarity in process. Zero extra infrastructure;
//!   the default.
//! - [`QdrantVectorStore`] talks to a Qdrant server over its REST API,
//!   one collection per folder.
//!
//! Both share one identity rule: a point is addressed by
//! `(file_id, chunk_index)`, so re-ingesting a file overwrites its chunks
//! instead of accumulating duplicates.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::config::Config;
use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::error::ApiError;
use crate::models::{ChunkUpsert, RetrievedChunk};

/// Folder-scoped vector storage for chunk embeddings.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Backend identifier surfaced by status endpoints.
    fn backend_name(&self) -> &'static str;

    /// Write chunks, overwriting any existing point with the same
    /// `(file_id, chunk_index)`.
    async fn upsert(&self, chunks: &[ChunkUpsert]) -> Result<(), ApiError>;

    /// Top-k cosine search within one folder. Results come back sorted by
    /// score descending; ties resolve to the earlier-inserted chunk.
    async fn search(
        &self,
        folder_id: &str,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<RetrievedChunk>, ApiError>;

    /// Remove every point belonging to a file.
    async fn delete_file(&self, folder_id: &str, file_id: &str) -> Result<(), ApiError>;

    /// Remove every point belonging to a folder.
    async fn delete_folder(&self, folder_id: &str) -> Result<(), ApiError>;
}

/// Deterministic point identity. The same `(file_id, chunk_index)` always
/// hashes to the same UUID, which is what makes upserts idempotent on
/// backends that key points by id.
pub fn point_id(file_id: &str, chunk_index: i64) -> Uuid {
    let mut hasher = Sha256::new();
    hasher.update(file_id.as_bytes());
    hasher.update(b":");
    hasher.update(chunk_index.to_be_bytes());
    let digest = hasher.finalize();
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    Uuid::from_bytes(bytes)
}

/// Build the store selected by `[vector_store] backend`. Handlers receive
/// it as `Arc<dyn VectorStore>` and never re-inspect configuration.
pub fn create_vector_store(
    config: &Config,
    pool: &SqlitePool,
    dims: usize,
) -> anyhow::Result<Arc<dyn VectorStore>> {
    match config.vector_store.backend.as_str() {
        "sqlite" => Ok(Arc::new(SqliteVectorStore::new(pool.clone()))),
        "qdrant" => {
            let url = config
                .vector_store
                .url
                .clone()
                .unwrap_or_else(|| "http://localhost:6333".to_string());
            let store =
                QdrantVectorStore::new(&url, &config.vector_store.collection_prefix, dims)?;
            Ok(Arc::new(store))
        }
        other => anyhow::bail!(
            "Unknown vector store backend: {}. Use sqlite or qdrant.",
            other
        ),
    }
}

// ============ SQLite backend ============

/// Chunk vectors in the `chunks` table, ranked by a linear cosine scan.
/// Folders hold tens of documents, not millions, so a scan per query beats
/// maintaining an approximate index.
pub struct SqliteVectorStore {
    pool: SqlitePool,
}

impl SqliteVectorStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    fn backend_name(&self) -> &'static str {
        "sqlite"
    }

    async fn upsert(&self, chunks: &[ChunkUpsert]) -> Result<(), ApiError> {
        let now = chrono::Utc::now().timestamp();

        for chunk in chunks {
            let blob = vec_to_blob(&chunk.embedding);
            sqlx::query(
                r#"
                INSERT INTO chunks (id, file_id, file_name, folder_id, chunk_index, text, embedding, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(file_id, chunk_index) DO UPDATE SET
                    file_name = excluded.file_name,
                    folder_id = excluded.folder_id,
                    text = excluded.text,
                    embedding = excluded.embedding
                "#,
            )
            .bind(point_id(&chunk.file_id, chunk.chunk_index).to_string())
            .bind(&chunk.file_id)
            .bind(&chunk.file_name)
            .bind(&chunk.folder_id)
            .bind(chunk.chunk_index)
            .bind(&chunk.text)
            .bind(&blob)
            .bind(now)
            .execute(&self.pool)
            .await?;
        }

        Ok(())
    }

    async fn search(
        &self,
        folder_id: &str,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<RetrievedChunk>, ApiError> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            r#"
            SELECT rowid, file_id, file_name, chunk_index, text, embedding
            FROM chunks
            WHERE folder_id = ?
            "#,
        )
        .bind(folder_id)
        .fetch_all(&self.pool)
        .await?;

        let mut hits: Vec<(i64, RetrievedChunk)> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let vec = blob_to_vec(&blob);
                let score = cosine_similarity(query, &vec);
                let chunk = RetrievedChunk {
                    file_id: row.get("file_id"),
                    file_name: row.get("file_name"),
                    chunk_index: row.get("chunk_index"),
                    text: row.get("text"),
                    score,
                };
                (row.get::<i64, _>("rowid"), chunk)
            })
            .collect();

        // Score desc, rowid asc (insertion order) on ties.
        hits.sort_by(|a, b| {
            b.1.score
                .partial_cmp(&a.1.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        hits.truncate(k);

        Ok(hits.into_iter().map(|(_, chunk)| chunk).collect())
    }

    async fn delete_file(&self, _folder_id: &str, file_id: &str) -> Result<(), ApiError> {
        sqlx::query("DELETE FROM chunks WHERE file_id = ?")
            .bind(file_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_folder(&self, folder_id: &str) -> Result<(), ApiError> {
        sqlx::query("DELETE FROM chunks WHERE folder_id = ?")
            .bind(folder_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

// ============ Qdrant backend ============

/// Qdrant over REST, one collection per folder (`{prefix}{folder_id}`).
/// Point ids come from [`point_id`], so upserts overwrite in place.
pub struct QdrantVectorStore {
    client: reqwest::Client,
    base_url: String,
    collection_prefix: String,
    dims: usize,
}

impl QdrantVectorStore {
    pub fn new(url: &str, collection_prefix: &str, dims: usize) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            base_url: url.trim_end_matches('/').to_string(),
            collection_prefix: collection_prefix.to_string(),
            dims,
        })
    }

    fn collection_name(&self, folder_id: &str) -> String {
        format!("{}{}", self.collection_prefix, folder_id)
    }

    async fn ensure_collection(&self, name: &str) -> Result<(), ApiError> {
        let url = format!("{}/collections/{}", self.base_url, name);

        let resp = self.client.get(&url).send().await.map_err(transport)?;
        if resp.status().is_success() {
            return Ok(());
        }
        if resp.status() != reqwest::StatusCode::NOT_FOUND {
            return Err(status_error("collection lookup", resp).await);
        }

        let body = json!({
            "vectors": { "size": self.dims, "distance": "Cosine" }
        });
        let resp = self
            .client
            .put(&url)
            .json(&body)
            .send()
            .await
            .map_err(transport)?;

        // A concurrent ingest task may have created it between the GET and
        // the PUT; Qdrant answers 409 in that case.
        if resp.status().is_success() || resp.status() == reqwest::StatusCode::CONFLICT {
            Ok(())
        } else {
            Err(status_error("collection create", resp).await)
        }
    }
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    fn backend_name(&self) -> &'static str {
        "qdrant"
    }

    async fn upsert(&self, chunks: &[ChunkUpsert]) -> Result<(), ApiError> {
        // Ingestion batches per file, but nothing stops a caller from mixing
        // folders; group so each batch lands in its own collection.
        let mut by_folder: HashMap<&str, Vec<&ChunkUpsert>> = HashMap::new();
        for chunk in chunks {
            by_folder
                .entry(chunk.folder_id.as_str())
                .or_default()
                .push(chunk);
        }

        for (folder_id, group) in by_folder {
            let name = self.collection_name(folder_id);
            self.ensure_collection(&name).await?;

            let points: Vec<Value> = group
                .iter()
                .map(|c| {
                    json!({
                        "id": point_id(&c.file_id, c.chunk_index).to_string(),
                        "vector": c.embedding,
                        "payload": {
                            "file_id": c.file_id,
                            "file_name": c.file_name,
                            "folder_id": c.folder_id,
                            "chunk_index": c.chunk_index,
                            "text": c.text,
                        }
                    })
                })
                .collect();

            let url = format!("{}/collections/{}/points?wait=true", self.base_url, name);
            let resp = self
                .client
                .put(&url)
                .json(&json!({ "points": points }))
                .send()
                .await
                .map_err(transport)?;
            if !resp.status().is_success() {
                return Err(status_error("upsert", resp).await);
            }
        }

        Ok(())
    }

    async fn search(
        &self,
        folder_id: &str,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<RetrievedChunk>, ApiError> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let name = self.collection_name(folder_id);
        let url = format!("{}/collections/{}/points/search", self.base_url, name);
        let body = json!({
            "vector": query,
            "limit": k,
            "with_payload": true,
        });

        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(transport)?;

        // No uploads yet means no collection yet; an empty folder is not
        // an error.
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !resp.status().is_success() {
            return Err(status_error("search", resp).await);
        }

        let payload: Value = resp
            .json()
            .await
            .map_err(|e| ApiError::VectorStore(format!("qdrant search response: {}", e)))?;
        parse_search_response(&payload)
    }

    async fn delete_file(&self, folder_id: &str, file_id: &str) -> Result<(), ApiError> {
        let name = self.collection_name(folder_id);
        let url = format!(
            "{}/collections/{}/points/delete?wait=true",
            self.base_url, name
        );
        let body = json!({
            "filter": {
                "must": [
                    { "key": "file_id", "match": { "value": file_id } }
                ]
            }
        });

        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(transport)?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND || resp.status().is_success() {
            Ok(())
        } else {
            Err(status_error("delete points", resp).await)
        }
    }

    async fn delete_folder(&self, folder_id: &str) -> Result<(), ApiError> {
        let name = self.collection_name(folder_id);
        let url = format!("{}/collections/{}", self.base_url, name);

        let resp = self.client.delete(&url).send().await.map_err(transport)?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND || resp.status().is_success() {
            Ok(())
        } else {
            Err(status_error("collection delete", resp).await)
        }
    }
}

fn transport(e: reqwest::Error) -> ApiError {
    ApiError::VectorStore(format!("qdrant request failed: {}", e))
}

async fn status_error(op: &str, resp: reqwest::Response) -> ApiError {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    ApiError::VectorStore(format!("qdrant {} returned {}: {}", op, status, body))
}

/// Pull hits out of a Qdrant search response. Qdrant already ranks by
/// score; re-sort with a deterministic tie-break so equal scores do not
/// depend on server internals.
fn parse_search_response(payload: &Value) -> Result<Vec<RetrievedChunk>, ApiError> {
    let results = payload["result"]
        .as_array()
        .ok_or_else(|| ApiError::VectorStore("qdrant search response missing 'result'".into()))?;

    let mut hits: Vec<RetrievedChunk> = results
        .iter()
        .map(|item| {
            let p = &item["payload"];
            RetrievedChunk {
                file_id: p["file_id"].as_str().unwrap_or_default().to_string(),
                file_name: p["file_name"].as_str().unwrap_or_default().to_string(),
                chunk_index: p["chunk_index"].as_i64().unwrap_or(0),
                text: p["text"].as_str().unwrap_or_default().to_string(),
                score: item["score"].as_f64().unwrap_or(0.0) as f32,
            }
        })
        .collect();

    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.file_id.cmp(&b.file_id))
            .then(a.chunk_index.cmp(&b.chunk_index))
    });

    Ok(hits)
}
