//! # DocShelf CLI (`shelf`)
//!
//! The `shelf` binary initializes a DocShelf deployment and runs the HTTP
//! API server that the browser client talks to.
//!
//! ## Usage
//!
//! ```bash
//! shelf --config ./shelf.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `shelf init` | Write a starter config (if missing) and create the database |
//! | `shelf serve` | Start the HTTP API server |
//! | `shelf check` | Validate the config and report provider availability |
//!
//! ## Examples
//!
//! ```bash
//! # First run: starter config plus an empty database
//! shelf init
//!
//! # Serve the API on the configured bind address
//! shelf serve --config ./shelf.toml
//!
//! # See which chat providers are usable right now
//! shelf check
//! ```

mod chunk;
mod config;
mod db;
mod embedding;
mod error;
mod extract;
mod files;
mod folders;
mod ingest;
mod llm;
mod migrate;
mod models;
mod rag;
mod retrieval;
mod router;
mod server;
mod sessions;
mod storage;
mod vector_store;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// DocShelf, a folder-based PDF chat backend.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. Run `shelf init` once to write a commented starter config.
#[derive(Parser)]
#[command(
    name = "shelf",
    about = "Chat with folders of PDF documents",
    version,
    long_about = "DocShelf ingests folders of PDF documents (extract, chunk, embed, index), \
    retrieves the passages closest to a question, and answers through OpenAI, Gemini, or a \
    local Ollama model with automatic fallback between them."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./shelf.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize config and database.
    ///
    /// Writes a commented starter config to the `--config` path when none
    /// exists, then creates the SQLite database and all required tables
    /// (folders, files, chunks, sessions, messages). Idempotent; running
    /// it again is safe.
    Init,

    /// Start the HTTP API server.
    ///
    /// Binds to the address configured in `[server].bind` and serves the
    /// folder, file, chat, and session endpoints under `/api`.
    Serve,

    /// Validate configuration and probe backends.
    ///
    /// Loads and validates the config, then reports which chat providers
    /// are available (API key present, Ollama reachable) and which
    /// embedding, vector store, and object storage backends are selected.
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init => {
            if !cli.config.exists() {
                std::fs::write(&cli.config, config::starter_toml())?;
                println!("Wrote starter config to {}", cli.config.display());
            }
            let cfg = config::load_config(&cli.config)?;
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Serve => {
            let cfg = config::load_config(&cli.config)?;
            server::run_server(cfg).await?;
        }
        Commands::Check => {
            let cfg = config::load_config(&cli.config)?;
            println!("Configuration OK: {}", cli.config.display());
            println!();

            let registry = router::ProviderRegistry::from_config(&cfg.chat)?;
            let status = registry.status().await;
            println!("{:<10} {:<10} MODEL", "PROVIDER", "AVAILABLE");
            for id in ["openai", "gemini", "ollama"] {
                let entry = &status["models"][id];
                println!(
                    "{:<10} {:<10} {}",
                    id,
                    entry["available"].as_bool().unwrap_or(false),
                    entry["name"].as_str().unwrap_or("-"),
                );
            }
            println!();
            println!("recommended model: {}", status["recommended"].as_str().unwrap_or("-"));
            println!("embedding provider: {}", cfg.embedding.provider);
            println!("vector store: {}", cfg.vector_store.backend);
            println!("object storage: {}", cfg.storage.backend);
        }
    }

    Ok(())
}
