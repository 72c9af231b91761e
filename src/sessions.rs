//! Chat sessions and their append-only message history.
//!
//! Messages carry a per-session sequence number assigned inside the append
//! transaction, so replay order is insertion order regardless of clock
//! resolution. Rows are never updated after insert.

use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::error::ApiError;
use crate::folders;
use crate::models::{now_ts, Message, Session};

/// Title given to sessions created without one; replaced by a preview of
/// the first user message.
pub const DEFAULT_SESSION_TITLE: &str = "New Chat";

const TITLE_PREVIEW_CHARS: usize = 50;

/// Session title derived from a message: the first 50 characters, marked
/// when clipped.
pub fn title_from_message(message: &str) -> String {
    if message.chars().count() > TITLE_PREVIEW_CHARS {
        let head: String = message.chars().take(TITLE_PREVIEW_CHARS).collect();
        format!("{}...", head)
    } else {
        message.to_string()
    }
}

fn row_to_session(row: &sqlx::sqlite::SqliteRow) -> Session {
    Session {
        id: row.get("id"),
        folder_id: row.get("folder_id"),
        title: row.get("title"),
        model: row.get("model"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn row_to_message(row: &sqlx::sqlite::SqliteRow) -> Message {
    Message {
        id: row.get("id"),
        session_id: row.get("session_id"),
        role: row.get("role"),
        content: row.get("content"),
        seq: row.get("seq"),
        created_at: row.get("created_at"),
    }
}

pub async fn create_session(
    pool: &SqlitePool,
    folder_id: &str,
    title: &str,
    model: &str,
) -> Result<Session, ApiError> {
    folders::get_folder(pool, folder_id).await?;

    let now = now_ts();
    let session = Session {
        id: Uuid::new_v4().to_string(),
        folder_id: folder_id.to_string(),
        title: title.to_string(),
        model: model.to_string(),
        created_at: now,
        updated_at: now,
    };

    sqlx::query(
        "INSERT INTO sessions (id, folder_id, title, model, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&session.id)
    .bind(&session.folder_id)
    .bind(&session.title)
    .bind(&session.model)
    .bind(session.created_at)
    .bind(session.updated_at)
    .execute(pool)
    .await?;

    Ok(session)
}

pub async fn get_session(pool: &SqlitePool, id: &str) -> Result<Session, ApiError> {
    let row = sqlx::query(
        "SELECT id, folder_id, title, model, created_at, updated_at FROM sessions WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => Ok(row_to_session(&row)),
        None => Err(ApiError::not_found("session", id)),
    }
}

/// Session plus its messages in append order.
pub async fn get_session_with_messages(
    pool: &SqlitePool,
    id: &str,
) -> Result<(Session, Vec<Message>), ApiError> {
    let session = get_session(pool, id).await?;

    let rows = sqlx::query(
        "SELECT id, session_id, role, content, seq, created_at FROM messages WHERE session_id = ? ORDER BY seq ASC",
    )
    .bind(id)
    .fetch_all(pool)
    .await?;

    Ok((session, rows.iter().map(row_to_message).collect()))
}

/// Sessions for a folder, most recently active first.
pub async fn list_sessions(pool: &SqlitePool, folder_id: &str) -> Result<Vec<Session>, ApiError> {
    folders::get_folder(pool, folder_id).await?;

    let rows = sqlx::query(
        "SELECT id, folder_id, title, model, created_at, updated_at FROM sessions WHERE folder_id = ? ORDER BY updated_at DESC, id ASC",
    )
    .bind(folder_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(row_to_session).collect())
}

/// Append one message, assigning the next sequence number in the same
/// transaction. The first user message appended to a session still
/// carrying the default title renames it to a preview.
pub async fn append_message(
    pool: &SqlitePool,
    session_id: &str,
    role: &str,
    content: &str,
) -> Result<Message, ApiError> {
    if role != "user" && role != "assistant" {
        return Err(ApiError::Validation(format!(
            "message role must be user or assistant, got '{}'",
            role
        )));
    }
    if content.is_empty() {
        return Err(ApiError::Validation(
            "message content must not be empty".to_string(),
        ));
    }

    let session = get_session(pool, session_id).await?;

    let mut tx = pool.begin().await?;

    let seq: i64 =
        sqlx::query_scalar("SELECT COALESCE(MAX(seq), 0) + 1 FROM messages WHERE session_id = ?")
            .bind(session_id)
            .fetch_one(&mut *tx)
            .await?;

    let message = Message {
        id: Uuid::new_v4().to_string(),
        session_id: session_id.to_string(),
        role: role.to_string(),
        content: content.to_string(),
        seq,
        created_at: now_ts(),
    };

    sqlx::query(
        "INSERT INTO messages (id, session_id, role, content, seq, created_at) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&message.id)
    .bind(&message.session_id)
    .bind(&message.role)
    .bind(&message.content)
    .bind(message.seq)
    .bind(message.created_at)
    .execute(&mut *tx)
    .await?;

    if role == "user" && session.title == DEFAULT_SESSION_TITLE {
        sqlx::query("UPDATE sessions SET title = ?, updated_at = ? WHERE id = ?")
            .bind(title_from_message(content))
            .bind(message.created_at)
            .bind(session_id)
            .execute(&mut *tx)
            .await?;
    } else {
        sqlx::query("UPDATE sessions SET updated_at = ? WHERE id = ?")
            .bind(message.created_at)
            .bind(session_id)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    Ok(message)
}

pub async fn rename_session(pool: &SqlitePool, id: &str, title: &str) -> Result<Session, ApiError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(ApiError::Validation(
            "session title must not be empty".to_string(),
        ));
    }

    let result = sqlx::query("UPDATE sessions SET title = ?, updated_at = ? WHERE id = ?")
        .bind(title)
        .bind(now_ts())
        .bind(id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("session", id));
    }

    get_session(pool, id).await
}

/// Delete a session; its messages go with it (`ON DELETE CASCADE`).
pub async fn delete_session(pool: &SqlitePool, id: &str) -> Result<(), ApiError> {
    let result = sqlx::query("DELETE FROM sessions WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("session", id));
    }
    Ok(())
}
