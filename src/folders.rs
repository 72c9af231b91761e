//! Folder CRUD and cascade deletion.
//!
//! Deleting a folder is the one multi-store operation here: the relational
//! cascade (files, sessions, messages, and sqlite-backed chunks) commits
//! first, then object and vector cleanup runs best-effort. A cleanup
//! failure leaves orphans that are logged, fenced by folder-scoped search,
//! and overwritten by any re-ingestion.

use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::{now_ts, Folder};
use crate::storage::ObjectStore;
use crate::vector_store::VectorStore;

fn row_to_folder(row: &sqlx::sqlite::SqliteRow) -> Folder {
    Folder {
        id: row.get("id"),
        name: row.get("name"),
        description: row.get("description"),
        parent_id: row.get("parent_id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

pub async fn create_folder(
    pool: &SqlitePool,
    name: &str,
    description: Option<&str>,
    parent_id: Option<&str>,
) -> Result<Folder, ApiError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ApiError::Validation(
            "folder name must not be empty".to_string(),
        ));
    }
    if let Some(parent) = parent_id {
        get_folder(pool, parent).await?;
    }

    let now = now_ts();
    let folder = Folder {
        id: Uuid::new_v4().to_string(),
        name: name.to_string(),
        description: description.map(|s| s.to_string()),
        parent_id: parent_id.map(|s| s.to_string()),
        created_at: now,
        updated_at: now,
    };

    sqlx::query(
        "INSERT INTO folders (id, name, description, parent_id, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&folder.id)
    .bind(&folder.name)
    .bind(&folder.description)
    .bind(&folder.parent_id)
    .bind(folder.created_at)
    .bind(folder.updated_at)
    .execute(pool)
    .await?;

    Ok(folder)
}

pub async fn get_folder(pool: &SqlitePool, id: &str) -> Result<Folder, ApiError> {
    let row = sqlx::query(
        "SELECT id, name, description, parent_id, created_at, updated_at FROM folders WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => Ok(row_to_folder(&row)),
        None => Err(ApiError::not_found("folder", id)),
    }
}

/// Newest first; id breaks ties within one second.
pub async fn list_folders(pool: &SqlitePool) -> Result<Vec<Folder>, ApiError> {
    let rows = sqlx::query(
        "SELECT id, name, description, parent_id, created_at, updated_at FROM folders ORDER BY created_at DESC, id ASC",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(row_to_folder).collect())
}

pub async fn update_folder(
    pool: &SqlitePool,
    id: &str,
    name: Option<&str>,
    description: Option<&str>,
) -> Result<Folder, ApiError> {
    let mut folder = get_folder(pool, id).await?;

    if let Some(name) = name {
        let name = name.trim();
        if name.is_empty() {
            return Err(ApiError::Validation(
                "folder name must not be empty".to_string(),
            ));
        }
        folder.name = name.to_string();
    }
    if let Some(description) = description {
        folder.description = Some(description.to_string());
    }
    folder.updated_at = now_ts();

    sqlx::query("UPDATE folders SET name = ?, description = ?, updated_at = ? WHERE id = ?")
        .bind(&folder.name)
        .bind(&folder.description)
        .bind(folder.updated_at)
        .bind(id)
        .execute(pool)
        .await?;

    Ok(folder)
}

/// Counts reported back to the client after a folder deletion.
#[derive(Debug)]
pub struct FolderDeletion {
    pub files_deleted: i64,
    pub sessions_deleted: i64,
}

/// Delete a folder and everything under it. Subfolders survive with their
/// parent reference cleared (schema `ON DELETE SET NULL`).
pub async fn delete_folder(
    pool: &SqlitePool,
    objects: &dyn ObjectStore,
    vectors: &dyn VectorStore,
    id: &str,
) -> Result<FolderDeletion, ApiError> {
    get_folder(pool, id).await?;

    let object_keys: Vec<String> = sqlx::query("SELECT object_key FROM files WHERE folder_id = ?")
        .bind(id)
        .fetch_all(pool)
        .await?
        .iter()
        .map(|row| row.get("object_key"))
        .collect();

    let mut tx = pool.begin().await?;
    let sessions_deleted = sqlx::query("DELETE FROM sessions WHERE folder_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?
        .rows_affected();
    let files_deleted = sqlx::query("DELETE FROM files WHERE folder_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?
        .rows_affected();
    sqlx::query("DELETE FROM folders WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    for key in &object_keys {
        if let Err(e) = objects.delete(key).await {
            tracing::warn!(key = %key, error = %e, "orphaned object after folder delete");
        }
    }
    if let Err(e) = vectors.delete_folder(id).await {
        tracing::warn!(folder_id = id, error = %e, "orphaned vectors after folder delete");
    }

    Ok(FolderDeletion {
        files_deleted: files_deleted as i64,
        sessions_deleted: sessions_deleted as i64,
    })
}
