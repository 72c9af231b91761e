//! File records and their removal from all three stores.

use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::error::ApiError;
use crate::folders;
use crate::models::{now_ts, FileRecord, IndexState};
use crate::storage::ObjectStore;
use crate::vector_store::VectorStore;

fn row_to_file(row: &sqlx::sqlite::SqliteRow) -> FileRecord {
    FileRecord {
        id: row.get("id"),
        folder_id: row.get("folder_id"),
        name: row.get("name"),
        object_key: row.get("object_key"),
        size_bytes: row.get("size_bytes"),
        mime_type: row.get("mime_type"),
        index_state: row.get("index_state"),
        index_error: row.get("index_error"),
        chunk_count: row.get("chunk_count"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

const FILE_COLUMNS: &str = "id, folder_id, name, object_key, size_bytes, mime_type, index_state, index_error, chunk_count, created_at, updated_at";

/// Insert the row for a fresh upload in the `uploading` state. The object
/// is already durable under `object_key` when this runs.
pub async fn create_file(
    pool: &SqlitePool,
    folder_id: &str,
    name: &str,
    object_key: &str,
    size_bytes: i64,
    mime_type: &str,
) -> Result<FileRecord, ApiError> {
    folders::get_folder(pool, folder_id).await?;

    let now = now_ts();
    let file = FileRecord {
        id: Uuid::new_v4().to_string(),
        folder_id: folder_id.to_string(),
        name: name.to_string(),
        object_key: object_key.to_string(),
        size_bytes,
        mime_type: mime_type.to_string(),
        index_state: IndexState::Uploading.as_str().to_string(),
        index_error: None,
        chunk_count: 0,
        created_at: now,
        updated_at: now,
    };

    sqlx::query(
        r#"
        INSERT INTO files (id, folder_id, name, object_key, size_bytes, mime_type,
                           index_state, chunk_count, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, 0, ?, ?)
        "#,
    )
    .bind(&file.id)
    .bind(&file.folder_id)
    .bind(&file.name)
    .bind(&file.object_key)
    .bind(file.size_bytes)
    .bind(&file.mime_type)
    .bind(&file.index_state)
    .bind(file.created_at)
    .bind(file.updated_at)
    .execute(pool)
    .await?;

    Ok(file)
}

pub async fn get_file(pool: &SqlitePool, id: &str) -> Result<FileRecord, ApiError> {
    let row = sqlx::query(&format!("SELECT {} FROM files WHERE id = ?", FILE_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await?;

    match row {
        Some(row) => Ok(row_to_file(&row)),
        None => Err(ApiError::not_found("file", id)),
    }
}

/// Files in a folder, newest first.
pub async fn list_files(pool: &SqlitePool, folder_id: &str) -> Result<Vec<FileRecord>, ApiError> {
    folders::get_folder(pool, folder_id).await?;

    let rows = sqlx::query(&format!(
        "SELECT {} FROM files WHERE folder_id = ? ORDER BY created_at DESC, id ASC",
        FILE_COLUMNS
    ))
    .bind(folder_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(row_to_file).collect())
}

/// Remove a file everywhere it lives. Object and vector cleanup is best
/// effort; the row delete decides whether the request succeeds.
pub async fn delete_file(
    pool: &SqlitePool,
    objects: &dyn ObjectStore,
    vectors: &dyn VectorStore,
    id: &str,
) -> Result<(), ApiError> {
    let file = get_file(pool, id).await?;

    if let Err(e) = objects.delete(&file.object_key).await {
        tracing::warn!(key = %file.object_key, error = %e, "object delete failed, continuing");
    }
    if let Err(e) = vectors.delete_file(&file.folder_id, &file.id).await {
        tracing::warn!(file_id = %file.id, error = %e, "vector delete failed, continuing");
    }

    sqlx::query("DELETE FROM files WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}
