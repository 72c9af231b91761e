//! HTTP API server.
//!
//! Everything lives under the `/api` base path for the browser client.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`    | `/api/folders` | List folders, newest first |
//! | `POST`   | `/api/folders` | Create a folder |
//! | `GET`    | `/api/folders/{id}` | Fetch one folder |
//! | `PUT`    | `/api/folders/{id}` | Rename / re-describe a folder |
//! | `DELETE` | `/api/folders/{id}` | Delete a folder and its contents |
//! | `GET`    | `/api/folders/{id}/files` | Files in a folder with index state |
//! | `POST`   | `/api/files/upload` | Multipart PDF upload (`file`, `folder_id`) |
//! | `GET`    | `/api/files/{id}` | Fetch one file record |
//! | `DELETE` | `/api/files/{id}` | Delete a file everywhere |
//! | `POST`   | `/api/chat` | Ask a question (`model` optional) |
//! | `POST`   | `/api/chat/{gemini,ollama,smart,simple}` | Ask with a forced backend |
//! | `POST`   | `/api/chat/with-session` | Ask and record the exchange (query params) |
//! | `GET`    | `/api/chat/folder/{id}/indexed` | Poll ingestion progress |
//! | `GET`    | `/api/chat/models/status` | Provider availability report |
//! | `POST`   | `/api/sessions` | Create a session |
//! | `GET`    | `/api/sessions/{id}` | Session with ordered messages |
//! | `DELETE` | `/api/sessions/{id}` | Delete a session and its messages |
//! | `GET`    | `/api/sessions/folder/{id}` | Sessions for a folder |
//! | `POST`   | `/api/sessions/messages` | Append a message |
//! | `PUT`    | `/api/sessions/{id}/title` | Rename a session |
//! | `GET`    | `/api/health` | Liveness plus database/storage status |
//! | `GET`    | `/api/config/check` | Which providers and backends are configured |
//!
//! # Error Contract
//!
//! Every error response carries the same JSON shape:
//!
//! ```json
//! { "error": { "code": "not_found", "message": "folder not found: abc" } }
//! ```
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted; the browser client is
//! served from a different origin in development.

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

use crate::config::Config;
use crate::db;
use crate::embedding::{self, Embedder};
use crate::error::ApiError;
use crate::extract::MIME_PDF;
use crate::files;
use crate::folders;
use crate::ingest;
use crate::migrate;
use crate::models::{FileResponse, FolderResponse, MessageResponse, SessionResponse};
use crate::rag;
use crate::router::{ModelKind, ProviderRegistry};
use crate::sessions;
use crate::storage::{self, ObjectStore};
use crate::vector_store::{self, VectorStore};

/// Uploads above this size are rejected before the handler runs.
const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// Shared application state handed to every route handler.
#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub config: Arc<Config>,
    pub embedder: Arc<dyn Embedder>,
    pub vector_store: Arc<dyn VectorStore>,
    pub object_store: Arc<dyn ObjectStore>,
    pub registry: Arc<ProviderRegistry>,
}

impl AppState {
    /// Wire up every backend the config selects. A missing provider API
    /// key is not an error here; the provider just reports unavailable.
    pub async fn from_config(config: Config) -> anyhow::Result<AppState> {
        let pool = db::connect(&config).await?;
        migrate::ensure_schema(&pool).await?;

        let embedder = embedding::create_embedder(&config.embedding)?;
        let vector_store = vector_store::create_vector_store(&config, &pool, embedder.dims())?;
        let object_store = storage::create_object_store(&config)?;
        let registry = Arc::new(ProviderRegistry::from_config(&config.chat)?);

        Ok(AppState {
            pool,
            config: Arc::new(config),
            embedder,
            vector_store,
            object_store,
            registry,
        })
    }
}

/// Build the full route tree. Separated from [`run_server`] so tests can
/// serve it on an ephemeral port around their own state.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api = Router::new()
        .route("/folders", get(list_folders).post(create_folder))
        .route(
            "/folders/{id}",
            get(get_folder).put(update_folder).delete(delete_folder),
        )
        .route("/folders/{id}/files", get(list_folder_files))
        .route("/files/upload", post(upload_file))
        .route("/files/{id}", get(get_file).delete(delete_file))
        .route("/chat", post(chat))
        .route("/chat/gemini", post(chat_gemini))
        .route("/chat/ollama", post(chat_ollama))
        .route("/chat/smart", post(chat_smart))
        .route("/chat/simple", post(chat_simple))
        .route("/chat/with-session", post(chat_with_session))
        .route("/chat/folder/{id}/indexed", get(folder_indexed))
        .route("/chat/models/status", get(models_status))
        .route("/sessions", post(create_session))
        .route("/sessions/{id}", get(get_session).delete(delete_session))
        .route("/sessions/{id}/title", axum::routing::put(rename_session))
        .route("/sessions/folder/{id}", get(list_folder_sessions))
        .route("/sessions/messages", post(append_session_message))
        .route("/health", get(health))
        .route("/config/check", get(config_check));

    Router::new()
        .nest("/api", api)
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(cors)
        .with_state(state)
}

/// Bind and serve until the process is terminated.
pub async fn run_server(config: Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let state = AppState::from_config(config).await?;
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("listening on http://{}", bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Folders ============

#[derive(Deserialize)]
struct CreateFolderBody {
    name: String,
    description: Option<String>,
    parent_id: Option<String>,
}

async fn create_folder(
    State(state): State<AppState>,
    Json(body): Json<CreateFolderBody>,
) -> Result<(StatusCode, Json<FolderResponse>), ApiError> {
    let folder = folders::create_folder(
        &state.pool,
        &body.name,
        body.description.as_deref(),
        body.parent_id.as_deref(),
    )
    .await?;
    Ok((StatusCode::CREATED, Json(folder.into())))
}

async fn list_folders(
    State(state): State<AppState>,
) -> Result<Json<Vec<FolderResponse>>, ApiError> {
    let folders = folders::list_folders(&state.pool).await?;
    Ok(Json(folders.into_iter().map(FolderResponse::from).collect()))
}

async fn get_folder(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<FolderResponse>, ApiError> {
    let folder = folders::get_folder(&state.pool, &id).await?;
    Ok(Json(folder.into()))
}

#[derive(Deserialize)]
struct UpdateFolderBody {
    name: Option<String>,
    description: Option<String>,
}

async fn update_folder(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<UpdateFolderBody>,
) -> Result<Json<FolderResponse>, ApiError> {
    let folder = folders::update_folder(
        &state.pool,
        &id,
        body.name.as_deref(),
        body.description.as_deref(),
    )
    .await?;
    Ok(Json(folder.into()))
}

async fn delete_folder(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let deletion = folders::delete_folder(
        &state.pool,
        state.object_store.as_ref(),
        state.vector_store.as_ref(),
        &id,
    )
    .await?;
    Ok(Json(json!({
        "deleted": true,
        "files_deleted": deletion.files_deleted,
        "sessions_deleted": deletion.sessions_deleted,
    })))
}

async fn list_folder_files(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<FileResponse>>, ApiError> {
    let files = files::list_files(&state.pool, &id).await?;
    Ok(Json(files.into_iter().map(FileResponse::from).collect()))
}

// ============ Files ============

async fn upload_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<FileResponse>), ApiError> {
    let mut file_name: Option<String> = None;
    let mut file_bytes: Option<Vec<u8>> = None;
    let mut folder_id: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::Validation(format!("malformed multipart body: {}", e)))?
    {
        let part = field.name().unwrap_or_default().to_string();
        match part.as_str() {
            "file" => {
                file_name = field.file_name().map(String::from);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::Validation(format!("could not read upload: {}", e)))?;
                file_bytes = Some(bytes.to_vec());
            }
            "folder_id" => {
                let text = field.text().await.map_err(|e| {
                    ApiError::Validation(format!("could not read folder_id: {}", e))
                })?;
                folder_id = Some(text);
            }
            _ => {}
        }
    }

    let folder_id =
        folder_id.ok_or_else(|| ApiError::Validation("missing folder_id part".to_string()))?;
    let bytes = file_bytes.ok_or_else(|| ApiError::Validation("missing file part".to_string()))?;
    let name =
        file_name.ok_or_else(|| ApiError::Validation("file part has no filename".to_string()))?;

    if !name.to_ascii_lowercase().ends_with(".pdf") {
        return Err(ApiError::Validation(format!(
            "only PDF uploads are supported, got '{}'",
            name
        )));
    }

    // Folder check runs before the object write so a bad folder_id cannot
    // leave an orphaned object behind.
    folders::get_folder(&state.pool, &folder_id).await?;

    let object_key = format!("pdfs/{}.pdf", Uuid::new_v4());
    state.object_store.put(&object_key, &bytes, MIME_PDF).await?;

    let file = files::create_file(
        &state.pool,
        &folder_id,
        &name,
        &object_key,
        bytes.len() as i64,
        MIME_PDF,
    )
    .await?;

    ingest::spawn(ingest::IngestJob {
        pool: state.pool.clone(),
        config: state.config.clone(),
        embedder: state.embedder.clone(),
        store: state.vector_store.clone(),
        file_id: file.id.clone(),
        file_name: file.name.clone(),
        folder_id,
        bytes,
    });

    Ok((StatusCode::CREATED, Json(file.into())))
}

async fn get_file(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<FileResponse>, ApiError> {
    let file = files::get_file(&state.pool, &id).await?;
    Ok(Json(file.into()))
}

async fn delete_file(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    files::delete_file(
        &state.pool,
        state.object_store.as_ref(),
        state.vector_store.as_ref(),
        &id,
    )
    .await?;
    Ok(Json(json!({ "deleted": true })))
}

// ============ Chat ============

#[derive(Deserialize)]
struct ChatBody {
    message: String,
    folder_id: String,
    model: Option<String>,
}

async fn run_chat(
    state: &AppState,
    kind: ModelKind,
    message: &str,
    folder_id: &str,
) -> Result<Json<Value>, ApiError> {
    let outcome = rag::answer(
        &state.pool,
        state.embedder.as_ref(),
        state.vector_store.as_ref(),
        &state.registry,
        kind,
        message,
        folder_id,
        state.config.retrieval.top_k,
    )
    .await?;
    Ok(Json(json!({
        "response": outcome.response,
        "sources": outcome.sources,
        "model_used": outcome.model_used,
    })))
}

async fn chat(
    State(state): State<AppState>,
    Json(body): Json<ChatBody>,
) -> Result<Json<Value>, ApiError> {
    let kind = match body.model.as_deref() {
        Some(name) => ModelKind::parse(name),
        None => ModelKind::parse(&state.config.chat.default_model),
    };
    run_chat(&state, kind, &body.message, &body.folder_id).await
}

async fn chat_gemini(
    State(state): State<AppState>,
    Json(body): Json<ChatBody>,
) -> Result<Json<Value>, ApiError> {
    run_chat(&state, ModelKind::Gemini, &body.message, &body.folder_id).await
}

async fn chat_ollama(
    State(state): State<AppState>,
    Json(body): Json<ChatBody>,
) -> Result<Json<Value>, ApiError> {
    run_chat(&state, ModelKind::Ollama, &body.message, &body.folder_id).await
}

async fn chat_smart(
    State(state): State<AppState>,
    Json(body): Json<ChatBody>,
) -> Result<Json<Value>, ApiError> {
    run_chat(&state, ModelKind::Smart, &body.message, &body.folder_id).await
}

async fn chat_simple(
    State(state): State<AppState>,
    Json(body): Json<ChatBody>,
) -> Result<Json<Value>, ApiError> {
    run_chat(&state, ModelKind::Simple, &body.message, &body.folder_id).await
}

/// Query parameters, not a JSON body; the original API grew this way and
/// the client depends on it.
#[derive(Deserialize)]
struct WithSessionQuery {
    message: String,
    folder_id: String,
    session_id: Option<String>,
    model: Option<String>,
}

async fn chat_with_session(
    State(state): State<AppState>,
    Query(query): Query<WithSessionQuery>,
) -> Result<Json<Value>, ApiError> {
    let kind = match query.model.as_deref() {
        Some(name) => ModelKind::parse(name),
        None => ModelKind::Smart,
    };
    let outcome = rag::answer_with_session(
        &state.pool,
        state.embedder.as_ref(),
        state.vector_store.as_ref(),
        &state.registry,
        kind,
        &query.message,
        &query.folder_id,
        query.session_id.as_deref(),
        state.config.retrieval.top_k,
    )
    .await?;
    Ok(Json(json!({
        "session_id": outcome.session_id,
        "response": outcome.response,
        "sources": outcome.sources,
        "model": outcome.model_used,
    })))
}

async fn folder_indexed(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let files = files::list_files(&state.pool, &id).await?;
    let indexed = !files.is_empty() && files.iter().all(|f| f.index_state == "indexed");
    let listing: Vec<Value> = files
        .iter()
        .map(|f| {
            json!({
                "id": f.id,
                "name": f.name,
                "index_state": f.index_state,
            })
        })
        .collect();

    Ok(Json(json!({
        "indexed": indexed,
        "storage": state.vector_store.backend_name(),
        "files": listing,
    })))
}

async fn models_status(State(state): State<AppState>) -> Json<Value> {
    Json(state.registry.status().await)
}

// ============ Sessions ============

#[derive(Deserialize)]
struct CreateSessionBody {
    folder_id: String,
    title: Option<String>,
    model: Option<String>,
}

async fn create_session(
    State(state): State<AppState>,
    Json(body): Json<CreateSessionBody>,
) -> Result<(StatusCode, Json<SessionResponse>), ApiError> {
    let title = body
        .title
        .as_deref()
        .unwrap_or(sessions::DEFAULT_SESSION_TITLE);
    let model = body
        .model
        .as_deref()
        .unwrap_or(&state.config.chat.default_model);
    let session = sessions::create_session(&state.pool, &body.folder_id, title, model).await?;
    Ok((StatusCode::CREATED, Json(session.into())))
}

async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let (session, messages) = sessions::get_session_with_messages(&state.pool, &id).await?;
    Ok(Json(json!({
        "session": SessionResponse::from(session),
        "messages": messages
            .into_iter()
            .map(MessageResponse::from)
            .collect::<Vec<_>>(),
    })))
}

async fn list_folder_sessions(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<SessionResponse>>, ApiError> {
    let sessions = sessions::list_sessions(&state.pool, &id).await?;
    Ok(Json(
        sessions.into_iter().map(SessionResponse::from).collect(),
    ))
}

#[derive(Deserialize)]
struct AppendMessageBody {
    session_id: String,
    role: String,
    content: String,
}

async fn append_session_message(
    State(state): State<AppState>,
    Json(body): Json<AppendMessageBody>,
) -> Result<(StatusCode, Json<MessageResponse>), ApiError> {
    let message =
        sessions::append_message(&state.pool, &body.session_id, &body.role, &body.content).await?;
    Ok((StatusCode::CREATED, Json(message.into())))
}

#[derive(Deserialize)]
struct RenameSessionBody {
    title: String,
}

async fn rename_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<RenameSessionBody>,
) -> Result<Json<SessionResponse>, ApiError> {
    let session = sessions::rename_session(&state.pool, &id, &body.title).await?;
    Ok(Json(session.into()))
}

async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    sessions::delete_session(&state.pool, &id).await?;
    Ok(Json(json!({ "deleted": true })))
}

// ============ Health and config ============

async fn health(State(state): State<AppState>) -> Json<Value> {
    let database = match sqlx::query_scalar::<_, i64>("SELECT 1")
        .fetch_one(&state.pool)
        .await
    {
        Ok(_) => "connected",
        Err(_) => "error",
    };
    let reachable = state.object_store.reachable().await;

    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "database": database,
        "storage": {
            "backend": state.object_store.backend_name(),
            "reachable": reachable,
        },
    }))
}

fn env_present(key: &str) -> bool {
    std::env::var(key).map(|v| !v.trim().is_empty()).unwrap_or(false)
}

async fn config_check(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "openai_key_present": env_present("OPENAI_API_KEY"),
        "gemini_key_present": env_present("GEMINI_API_KEY"),
        "ollama_url": state.config.chat.ollama_url,
        "embedding_provider": state.config.embedding.provider,
        "vector_store": state.config.vector_store.backend,
        "storage_backend": state.config.storage.backend,
        "default_model": state.config.chat.default_model,
    }))
}
