//! # DocShelf
//!
//! A folder-based PDF chat backend.
//!
//! DocShelf ingests folders of PDF documents (extract, chunk, embed, index),
//! retrieves the passages closest to a question, and answers through OpenAI,
//! Gemini, or a local Ollama model with automatic fallback between them.
//! Conversations persist as sessions with ordered messages.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────────┐   ┌──────────────┐
//! │  Upload  │──▶│    Ingest     │──▶│   Indexes    │
//! │  (PDFs)  │   │ Extract+Chunk │   │ SQLite/Qdrant│
//! └──────────┘   │    +Embed     │   └──────┬───────┘
//!                └───────────────┘          │ top-k
//!                        ┌──────────────────┤
//!                        ▼                  ▼
//!                  ┌──────────┐       ┌──────────┐
//!                  │   Chat   │       │ Sessions │
//!                  │ (OpenAI/ │       │ (SQLite) │
//!                  │  Gemini/ │       └──────────┘
//!                  │  Ollama) │
//!                  └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! shelf init                    # starter config + empty database
//! shelf serve                   # start the HTTP API on [server].bind
//! shelf check                   # which providers are usable right now
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`models`] | Core data types and API response shapes |
//! | [`extract`] | PDF text extraction |
//! | [`chunk`] | Overlapping text chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`vector_store`] | SQLite and Qdrant vector indexes |
//! | [`storage`] | Local and S3 object storage for uploads |
//! | [`ingest`] | Background indexing pipeline |
//! | [`retrieval`] | Folder-scoped similarity search |
//! | [`llm`] | Chat provider clients |
//! | [`router`] | Model selection and quota fallback |
//! | [`rag`] | Retrieval-augmented answering |
//! | [`sessions`] | Chat session persistence |
//! | [`server`] | HTTP API server |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod chunk;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod files;
pub mod folders;
pub mod ingest;
pub mod llm;
pub mod migrate;
pub mod models;
pub mod rag;
pub mod retrieval;
pub mod router;
pub mod server;
pub mod sessions;
pub mod storage;
pub mod vector_store;
