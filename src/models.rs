//! Core data models used throughout docshelf.
//!
//! Row structs mirror the SQLite tables (epoch-second timestamps); the
//! `*Response` structs are the JSON shapes the HTTP layer returns, with
//! timestamps rendered as RFC3339.

use serde::Serialize;

/// Per-file ingestion progress, readable while the background task runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexState {
    Uploading,
    Extracting,
    Embedding,
    Indexed,
    Failed,
}

impl IndexState {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexState::Uploading => "uploading",
            IndexState::Extracting => "extracting",
            IndexState::Embedding => "embedding",
            IndexState::Indexed => "indexed",
            IndexState::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<IndexState> {
        match s {
            "uploading" => Some(IndexState::Uploading),
            "extracting" => Some(IndexState::Extracting),
            "embedding" => Some(IndexState::Embedding),
            "indexed" => Some(IndexState::Indexed),
            "failed" => Some(IndexState::Failed),
            _ => None,
        }
    }
}

/// A folder row.
#[derive(Debug, Clone)]
pub struct Folder {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub parent_id: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A file row. `object_key` points at the stored PDF in object storage.
#[derive(Debug, Clone)]
pub struct FileRecord {
    pub id: String,
    pub folder_id: String,
    pub name: String,
    pub object_key: String,
    pub size_bytes: i64,
    pub mime_type: String,
    pub index_state: String,
    pub index_error: Option<String>,
    pub chunk_count: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A chat session row.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub folder_id: String,
    pub title: String,
    pub model: String,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A message row. `seq` is assigned at append time and never changes.
#[derive(Debug, Clone)]
pub struct Message {
    pub id: String,
    pub session_id: String,
    pub role: String,
    pub content: String,
    pub seq: i64,
    pub created_at: i64,
}

/// A chunk staged for vector upsert during ingestion.
///
/// `file_name` rides along so search hits can name their source without a
/// join against the files table (the qdrant backend has no such table).
#[derive(Debug, Clone)]
pub struct ChunkUpsert {
    pub file_id: String,
    pub file_name: String,
    pub folder_id: String,
    pub chunk_index: i64,
    pub text: String,
    pub embedding: Vec<f32>,
}

/// A chunk returned by folder-scoped similarity search.
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub file_id: String,
    pub file_name: String,
    pub chunk_index: i64,
    pub text: String,
    pub score: f32,
}

// ============ JSON response shapes ============

#[derive(Debug, Clone, Serialize)]
pub struct FolderResponse {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub parent_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Folder> for FolderResponse {
    fn from(f: Folder) -> Self {
        Self {
            id: f.id,
            name: f.name,
            description: f.description,
            parent_id: f.parent_id,
            created_at: format_ts_iso(f.created_at),
            updated_at: format_ts_iso(f.updated_at),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FileResponse {
    pub id: String,
    pub folder_id: String,
    pub name: String,
    pub object_key: String,
    pub size_bytes: i64,
    pub mime_type: String,
    pub index_state: String,
    pub index_error: Option<String>,
    pub chunk_count: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl From<FileRecord> for FileResponse {
    fn from(f: FileRecord) -> Self {
        Self {
            id: f.id,
            folder_id: f.folder_id,
            name: f.name,
            object_key: f.object_key,
            size_bytes: f.size_bytes,
            mime_type: f.mime_type,
            index_state: f.index_state,
            index_error: f.index_error,
            chunk_count: f.chunk_count,
            created_at: format_ts_iso(f.created_at),
            updated_at: format_ts_iso(f.updated_at),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionResponse {
    pub id: String,
    pub folder_id: String,
    pub title: String,
    pub model: String,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Session> for SessionResponse {
    fn from(s: Session) -> Self {
        Self {
            id: s.id,
            folder_id: s.folder_id,
            title: s.title,
            model: s.model,
            created_at: format_ts_iso(s.created_at),
            updated_at: format_ts_iso(s.updated_at),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageResponse {
    pub id: String,
    pub session_id: String,
    pub role: String,
    pub content: String,
    pub created_at: String,
}

impl From<Message> for MessageResponse {
    fn from(m: Message) -> Self {
        Self {
            id: m.id,
            session_id: m.session_id,
            role: m.role,
            content: m.content,
            created_at: format_ts_iso(m.created_at),
        }
    }
}

/// Render an epoch-second timestamp as RFC3339, falling back to the raw
/// number for out-of-range values.
pub fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| ts.to_string())
}

/// Current time as epoch seconds; the single clock used for row timestamps.
pub fn now_ts() -> i64 {
    chrono::Utc::now().timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_state_round_trip() {
        for state in [
            IndexState::Uploading,
            IndexState::Extracting,
            IndexState::Embedding,
            IndexState::Indexed,
            IndexState::Failed,
        ] {
            assert_eq!(IndexState::from_str(state.as_str()), Some(state));
        }
        assert_eq!(IndexState::from_str("queued"), None);
    }

    #[test]
    fn test_format_ts_iso() {
        assert_eq!(format_ts_iso(0), "1970-01-01T00:00:00+00:00");
    }
}
