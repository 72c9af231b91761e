use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub vector_store: VectorStoreConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub chat: ChatConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("data/docshelf.db")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Target chunk length in characters.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Characters shared between consecutive chunks.
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    1000
}
fn default_chunk_overlap() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Number of chunks handed to the prompt builder per question.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

fn default_top_k() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Ollama base URL, used when provider = "ollama".
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_embedding_provider() -> String {
    "local".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct VectorStoreConfig {
    /// "sqlite" keeps vectors next to the metadata; "qdrant" talks to an
    /// external Qdrant instance over its REST API.
    #[serde(default = "default_vector_backend")]
    pub backend: String,
    /// Qdrant base URL, required when backend = "qdrant".
    #[serde(default)]
    pub url: Option<String>,
    /// Collection names are formed as "{collection_prefix}{folder_id}".
    #[serde(default = "default_collection_prefix")]
    pub collection_prefix: String,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            backend: default_vector_backend(),
            url: None,
            collection_prefix: default_collection_prefix(),
        }
    }
}

fn default_vector_backend() -> String {
    "sqlite".to_string()
}
fn default_collection_prefix() -> String {
    "folder_".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// "local" writes uploads under root_dir; "s3" targets an S3-compatible
    /// bucket (AWS, MinIO, LocalStack) with SigV4 auth.
    #[serde(default = "default_storage_backend")]
    pub backend: String,
    #[serde(default = "default_storage_root")]
    pub root_dir: PathBuf,
    #[serde(default)]
    pub bucket: Option<String>,
    #[serde(default = "default_region")]
    pub region: String,
    /// Override for S3-compatible endpoints (e.g. "http://localhost:9000").
    #[serde(default)]
    pub endpoint_url: Option<String>,
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            root_dir: default_storage_root(),
            bucket: None,
            region: default_region(),
            endpoint_url: None,
            key_prefix: default_key_prefix(),
        }
    }
}

fn default_storage_backend() -> String {
    "local".to_string()
}
fn default_storage_root() -> PathBuf {
    PathBuf::from("data/objects")
}
fn default_region() -> String {
    "us-east-1".to_string()
}
fn default_key_prefix() -> String {
    "pdfs/".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    /// Model used by POST /api/chat when the request names none:
    /// "openai", "gemini", "ollama", "smart", or "simple".
    #[serde(default = "default_chat_model")]
    pub default_model: String,
    #[serde(default = "default_openai_model")]
    pub openai_model: String,
    #[serde(default = "default_gemini_model")]
    pub gemini_model: String,
    #[serde(default = "default_ollama_url")]
    pub ollama_url: String,
    #[serde(default = "default_ollama_model")]
    pub ollama_model: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            default_model: default_chat_model(),
            openai_model: default_openai_model(),
            gemini_model: default_gemini_model(),
            ollama_url: default_ollama_url(),
            ollama_model: default_ollama_model(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_chat_model() -> String {
    "smart".to_string()
}
fn default_openai_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_gemini_model() -> String {
    "gemini-1.5-flash".to_string()
}
fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_ollama_model() -> String {
    "llama3.2".to_string()
}
fn default_request_timeout() -> u64 {
    60
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Check config invariants that serde cannot express. Called by
/// [`load_config`] and directly by tests that build configs in code.
pub fn validate(config: &Config) -> Result<()> {
    // Chunking
    if config.chunking.chunk_size == 0 {
        anyhow::bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.chunk_overlap >= config.chunking.chunk_size {
        anyhow::bail!("chunking.chunk_overlap must be smaller than chunking.chunk_size");
    }

    // Retrieval
    if config.retrieval.top_k < 1 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }

    // Embedding
    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" | "local" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, or local.",
            other
        ),
    }
    if matches!(config.embedding.provider.as_str(), "openai" | "ollama") {
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    // Vector store
    match config.vector_store.backend.as_str() {
        "sqlite" => {}
        "qdrant" => {
            if config.vector_store.url.is_none() {
                anyhow::bail!("vector_store.url is required when backend is 'qdrant'");
            }
        }
        other => anyhow::bail!(
            "Unknown vector store backend: '{}'. Must be sqlite or qdrant.",
            other
        ),
    }

    // Object storage
    match config.storage.backend.as_str() {
        "local" => {}
        "s3" => {
            if config.storage.bucket.is_none() {
                anyhow::bail!("storage.bucket is required when backend is 's3'");
            }
        }
        other => anyhow::bail!(
            "Unknown storage backend: '{}'. Must be local or s3.",
            other
        ),
    }

    // Chat
    match config.chat.default_model.as_str() {
        "openai" | "gemini" | "ollama" | "smart" | "simple" => {}
        other => anyhow::bail!(
            "Unknown chat.default_model: '{}'. Must be openai, gemini, ollama, smart, or simple.",
            other
        ),
    }

    Ok(())
}

/// Starter configuration written by `shelf init`.
pub fn starter_toml() -> &'static str {
    r#"[db]
path = "data/docshelf.db"

[server]
bind = "127.0.0.1:8000"

[chunking]
chunk_size = 1000
chunk_overlap = 200

[retrieval]
top_k = 5

[embedding]
# "local" (all-MiniLM-L6-v2 via fastembed), "openai", "ollama", or "disabled"
provider = "local"

[vector_store]
# "sqlite" (embedded) or "qdrant" (set url = "http://localhost:6333")
backend = "sqlite"

[storage]
# "local" or "s3" (set bucket, and endpoint_url for MinIO-style deployments)
backend = "local"
root_dir = "data/objects"

[chat]
# "openai", "gemini", "ollama", "smart", or "simple"
default_model = "smart"
ollama_url = "http://localhost:11434"
ollama_model = "llama3.2"
"#
}
