//! Chat over a folder's documents.
//!
//! One question flows through here: retrieve the folder's most relevant
//! chunks, assemble the prompt, dispatch to the selected backend, and
//! return the answer with its sources. Simple mode never touches a
//! language model; the formatted excerpts are the answer.

use sqlx::SqlitePool;

use crate::embedding::Embedder;
use crate::error::ApiError;
use crate::models::RetrievedChunk;
use crate::retrieval;
use crate::router::{ModelKind, ProviderRegistry};
use crate::sessions;
use crate::vector_store::VectorStore;

/// Simple mode retrieves a few candidates, drops weak matches, and prints
/// the best two. Thresholds follow the original heuristic tuning.
const SIMPLE_TOP_K: usize = 3;
const SIMPLE_MIN_SCORE: f32 = 0.1;
const SIMPLE_CONTEXT_CHUNKS: usize = 2;
const SIMPLE_EXCERPT_CHARS: usize = 400;

const NO_RELEVANT_CONTENT: &str =
    "I couldn't find relevant information in the uploaded documents to answer your question.";

/// A finished chat turn.
#[derive(Debug)]
pub struct ChatOutcome {
    pub response: String,
    pub sources: Vec<String>,
    pub model_used: String,
}

/// Answer one question against a folder's documents.
#[allow(clippy::too_many_arguments)]
pub async fn answer(
    pool: &SqlitePool,
    embedder: &dyn Embedder,
    store: &dyn VectorStore,
    registry: &ProviderRegistry,
    kind: ModelKind,
    message: &str,
    folder_id: &str,
    top_k: usize,
) -> Result<ChatOutcome, ApiError> {
    let message = message.trim();
    if message.is_empty() {
        return Err(ApiError::Validation(
            "message must not be empty".to_string(),
        ));
    }
    ensure_folder_exists(pool, folder_id).await?;

    if kind == ModelKind::Simple {
        return simple_answer(embedder, store, message, folder_id).await;
    }

    let hits = retrieval::retrieve(embedder, store, message, folder_id, top_k).await?;
    if hits.is_empty() {
        return Ok(ChatOutcome {
            response: NO_RELEVANT_CONTENT.to_string(),
            sources: Vec::new(),
            model_used: kind.as_str().to_string(),
        });
    }

    let context = retrieval::build_context(&hits);
    let sources = retrieval::source_names(&hits);
    let prompt = build_prompt(message, &context);

    let routed = registry.complete(kind, &prompt).await?;
    Ok(ChatOutcome {
        response: routed.response,
        sources,
        model_used: routed.model_used,
    })
}

/// A chat turn recorded in a session.
#[derive(Debug)]
pub struct SessionChatOutcome {
    pub session_id: String,
    pub response: String,
    pub sources: Vec<String>,
    pub model_used: String,
}

/// Answer one question and record both sides of the exchange in a session,
/// creating the session (titled from the message) when none is given.
///
/// The user message is appended before the model runs, so a provider
/// failure leaves the question in history without a reply. That matches
/// what the client shows while retrying.
#[allow(clippy::too_many_arguments)]
pub async fn answer_with_session(
    pool: &SqlitePool,
    embedder: &dyn Embedder,
    store: &dyn VectorStore,
    registry: &ProviderRegistry,
    kind: ModelKind,
    message: &str,
    folder_id: &str,
    session_id: Option<&str>,
    top_k: usize,
) -> Result<SessionChatOutcome, ApiError> {
    let message = message.trim();
    if message.is_empty() {
        return Err(ApiError::Validation(
            "message must not be empty".to_string(),
        ));
    }
    ensure_folder_exists(pool, folder_id).await?;

    let session = match session_id {
        Some(id) => sessions::get_session(pool, id).await?,
        None => {
            sessions::create_session(
                pool,
                folder_id,
                &sessions::title_from_message(message),
                kind.as_str(),
            )
            .await?
        }
    };

    sessions::append_message(pool, &session.id, "user", message).await?;
    let outcome = answer(pool, embedder, store, registry, kind, message, folder_id, top_k).await?;
    sessions::append_message(pool, &session.id, "assistant", &outcome.response).await?;

    Ok(SessionChatOutcome {
        session_id: session.id,
        response: outcome.response,
        sources: outcome.sources,
        model_used: outcome.model_used,
    })
}

async fn ensure_folder_exists(pool: &SqlitePool, folder_id: &str) -> Result<(), ApiError> {
    let exists: Option<String> = sqlx::query_scalar("SELECT id FROM folders WHERE id = ?")
        .bind(folder_id)
        .fetch_optional(pool)
        .await?;
    match exists {
        Some(_) => Ok(()),
        None => Err(ApiError::not_found("folder", folder_id)),
    }
}

fn build_prompt(message: &str, context: &str) -> String {
    format!(
        "Based on the following context from the uploaded documents, please answer the question.\n\n\
         Context:\n{context}\n\n\
         Question: {message}\n\n\
         Please provide a helpful and accurate answer based on the context provided. \
         If the answer cannot be found in the context, please say so."
    )
}

/// Answer without a language model: the top excerpts, labeled by file,
/// are the response.
async fn simple_answer(
    embedder: &dyn Embedder,
    store: &dyn VectorStore,
    message: &str,
    folder_id: &str,
) -> Result<ChatOutcome, ApiError> {
    let hits = retrieval::retrieve(embedder, store, message, folder_id, SIMPLE_TOP_K).await?;
    let relevant: Vec<RetrievedChunk> = hits
        .into_iter()
        .filter(|h| h.score > SIMPLE_MIN_SCORE)
        .collect();

    if relevant.is_empty() {
        return Ok(ChatOutcome {
            response: NO_RELEVANT_CONTENT.to_string(),
            sources: Vec::new(),
            model_used: ModelKind::Simple.as_str().to_string(),
        });
    }

    let sources = retrieval::source_names(&relevant);
    let shown = &relevant[..relevant.len().min(SIMPLE_CONTEXT_CHUNKS)];

    let mut response = String::from(
        "Based on the documents in this folder, here are the most relevant excerpts:\n",
    );
    for (i, hit) in shown.iter().enumerate() {
        response.push_str(&format!(
            "\n{}. From {}:\n{}\n",
            i + 1,
            hit.file_name,
            excerpt(&hit.text, SIMPLE_EXCERPT_CHARS)
        ));
    }
    response.push_str(&format!(
        "\nQuestion: {}\n\nThe excerpts above are the closest matches in your documents. \
         Review them for specific details.",
        message
    ));

    Ok(ChatOutcome {
        response,
        sources,
        model_used: ModelKind::Simple.as_str().to_string(),
    })
}

/// Clip to a character boundary near `max`, marking the cut.
fn excerpt(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let clipped: String = text.chars().take(max).collect();
    format!("{}...", clipped.trim_end())
}
