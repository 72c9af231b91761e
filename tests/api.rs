//! End-to-end tests for the HTTP API.
//!
//! Each test boots the full router on an ephemeral port with an in-process
//! embedder and canned chat providers, then drives it over HTTP the way the
//! browser client does: create folders, upload PDFs, poll until indexed,
//! chat, and manage sessions.

use async_trait::async_trait;
use docshelf::config::Config;
use docshelf::db;
use docshelf::embedding::Embedder;
use docshelf::error::{ApiError, ProviderError};
use docshelf::llm::ChatProvider;
use docshelf::migrate;
use docshelf::router::ProviderRegistry;
use docshelf::server::{build_router, AppState};
use docshelf::storage::LocalStore;
use docshelf::vector_store::SqliteVectorStore;
use serde_json::{json, Value};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tempfile::TempDir;

// ─── Fakes ──────────────────────────────────────────────────────────

/// Embeds a text as a bag-of-words histogram, so texts sharing words land
/// close together in cosine space. Deterministic and fully offline.
struct HashEmbedder;

#[async_trait]
impl Embedder for HashEmbedder {
    fn model_name(&self) -> &str {
        "hash-embedder"
    }
    fn dims(&self) -> usize {
        16
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ApiError> {
        Ok(texts
            .iter()
            .map(|text| {
                let mut v = vec![0.0f32; 16];
                for word in text.to_lowercase().split(|c: char| !c.is_alphanumeric()) {
                    if word.is_empty() {
                        continue;
                    }
                    let mut h = DefaultHasher::new();
                    word.hash(&mut h);
                    v[(h.finish() % 16) as usize] += 1.0;
                }
                v
            })
            .collect())
    }
}

/// Answers every prompt with a fixed string.
struct CannedProvider {
    id: &'static str,
    reply: &'static str,
}

#[async_trait]
impl ChatProvider for CannedProvider {
    fn id(&self) -> &'static str {
        self.id
    }
    fn display_name(&self) -> &'static str {
        self.id
    }
    fn description(&self) -> String {
        format!("canned {}", self.id)
    }
    async fn available(&self) -> bool {
        true
    }
    async fn complete(&self, _prompt: &str) -> Result<String, ProviderError> {
        Ok(self.reply.to_string())
    }
}

/// Always reports quota exhaustion.
struct QuotaProvider {
    id: &'static str,
}

#[async_trait]
impl ChatProvider for QuotaProvider {
    fn id(&self) -> &'static str {
        self.id
    }
    fn display_name(&self) -> &'static str {
        self.id
    }
    fn description(&self) -> String {
        format!("quota-limited {}", self.id)
    }
    async fn available(&self) -> bool {
        true
    }
    async fn complete(&self, _prompt: &str) -> Result<String, ProviderError> {
        Err(ProviderError::Quota("billing hard limit reached".to_string()))
    }
}

fn canned(id: &'static str, reply: &'static str) -> Arc<dyn ChatProvider> {
    Arc::new(CannedProvider { id, reply })
}

// ─── PDF fixture ────────────────────────────────────────────────────

/// Minimal valid PDF, one inner slice of text lines per page.
///
/// Byte offsets and the content stream `/Length` values are computed from
/// the generated bytes so pdf-extract parses every stream completely.
fn pdf_with_pages(pages: &[&[&str]]) -> Vec<u8> {
    let font_obj = 3 + 2 * pages.len();

    let mut out = Vec::new();
    let mut offsets = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n");

    offsets.push(out.len());
    out.extend_from_slice(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n");

    let kids: Vec<String> = (0..pages.len())
        .map(|i| format!("{} 0 R", 3 + 2 * i))
        .collect();
    offsets.push(out.len());
    out.extend_from_slice(
        format!(
            "2 0 obj << /Type /Pages /Kids [{}] /Count {} >> endobj\n",
            kids.join(" "),
            pages.len()
        )
        .as_bytes(),
    );

    for (i, lines) in pages.iter().enumerate() {
        let page_id = 3 + 2 * i;
        let content_id = 4 + 2 * i;

        offsets.push(out.len());
        out.extend_from_slice(
            format!(
                "{} 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] \
                 /Contents {} 0 R /Resources << /Font << /F1 {} 0 R >> >> >> endobj\n",
                page_id, content_id, font_obj
            )
            .as_bytes(),
        );

        let mut stream = String::from("BT /F1 12 Tf 72 720 Td ");
        for (j, line) in lines.iter().enumerate() {
            if j > 0 {
                stream.push_str("0 -16 Td ");
            }
            let escaped = line
                .replace('\\', "\\\\")
                .replace('(', "\\(")
                .replace(')', "\\)");
            stream.push_str(&format!("({}) Tj ", escaped));
        }
        stream.push_str("ET\n");

        offsets.push(out.len());
        out.extend_from_slice(
            format!(
                "{} 0 obj << /Length {} >> stream\n{}endstream endobj\n",
                content_id,
                stream.len(),
                stream
            )
            .as_bytes(),
        );
    }

    offsets.push(out.len());
    out.extend_from_slice(
        format!(
            "{} 0 obj << /Type /Font /Subtype /Type1 /BaseFont /Helvetica >> endobj\n",
            font_obj
        )
        .as_bytes(),
    );

    let total = offsets.len() + 1;
    let xref_start = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n", total).as_bytes());
    out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
    for offset in &offsets {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(format!("trailer << /Size {} /Root 1 0 R >>\nstartxref\n", total).as_bytes());
    out.extend_from_slice(format!("{}\n", xref_start).as_bytes());
    out.extend_from_slice(b"%%EOF\n");
    out
}

fn pdf_with_text(lines: &[&str]) -> Vec<u8> {
    pdf_with_pages(&[lines])
}

// ─── Harness ────────────────────────────────────────────────────────

struct TestServer {
    base: String,
    client: reqwest::Client,
    _tmp: TempDir,
}

/// Bind an ephemeral port, build the router around in-process fakes, and
/// serve it in the background for the duration of the test.
async fn start_server(providers: Vec<Arc<dyn ChatProvider>>) -> TestServer {
    let tmp = TempDir::new().unwrap();
    let mut config = Config::default();
    config.db.path = tmp.path().join("shelf.db");
    config.storage.root_dir = tmp.path().join("objects");

    let pool = db::connect(&config).await.unwrap();
    migrate::ensure_schema(&pool).await.unwrap();

    let state = AppState {
        pool: pool.clone(),
        config: Arc::new(config),
        embedder: Arc::new(HashEmbedder),
        vector_store: Arc::new(SqliteVectorStore::new(pool)),
        object_store: Arc::new(LocalStore::new(tmp.path().join("objects"))),
        registry: Arc::new(ProviderRegistry::with_providers(providers)),
    };

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = build_router(state);
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });

    TestServer {
        base: format!("http://{}/api", addr),
        client: reqwest::Client::new(),
        _tmp: tmp,
    }
}

async fn create_folder(server: &TestServer, name: &str) -> String {
    let resp = server
        .client
        .post(format!("{}/folders", server.base))
        .json(&json!({ "name": name }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let body: Value = resp.json().await.unwrap();
    body["id"].as_str().unwrap().to_string()
}

async fn upload_pdf(
    server: &TestServer,
    folder_id: &str,
    file_name: &str,
    bytes: Vec<u8>,
) -> Value {
    let part = reqwest::multipart::Part::bytes(bytes).file_name(file_name.to_string());
    let form = reqwest::multipart::Form::new()
        .part("file", part)
        .text("folder_id", folder_id.to_string());
    let resp = server
        .client
        .post(format!("{}/files/upload", server.base))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201, "upload should be accepted");
    resp.json().await.unwrap()
}

/// Poll the indexed endpoint until ingestion finishes. Panics on a failed
/// ingest so tests report the index error instead of timing out.
async fn wait_indexed(server: &TestServer, folder_id: &str) {
    for _ in 0..100 {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let resp = server
            .client
            .get(format!("{}/chat/folder/{}/indexed", server.base, folder_id))
            .send()
            .await
            .unwrap();
        let body: Value = resp.json().await.unwrap();
        if body["indexed"] == true {
            return;
        }
        let failed = body["files"]
            .as_array()
            .map(|files| files.iter().any(|f| f["index_state"] == "failed"))
            .unwrap_or(false);
        if failed {
            panic!("ingest failed: {}", body);
        }
    }
    panic!("folder did not become indexed within 5 seconds");
}

async fn chat(
    server: &TestServer,
    folder_id: &str,
    message: &str,
    model: Option<&str>,
) -> (u16, Value) {
    let mut body = json!({ "message": message, "folder_id": folder_id });
    if let Some(m) = model {
        body["model"] = json!(m);
    }
    let resp = server
        .client
        .post(format!("{}/chat", server.base))
        .json(&body)
        .send()
        .await
        .unwrap();
    let status = resp.status().as_u16();
    (status, resp.json().await.unwrap())
}

// ─── Folders ────────────────────────────────────────────────────────

#[tokio::test]
async fn folder_crud_roundtrip() {
    let server = start_server(vec![canned("openai", "unused")]).await;

    let id = create_folder(&server, "Contracts").await;

    let resp = server
        .client
        .get(format!("{}/folders/{}", server.base, id))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["name"], "Contracts");
    assert_eq!(body["description"], Value::Null);

    let resp = server
        .client
        .put(format!("{}/folders/{}", server.base, id))
        .json(&json!({ "name": "Signed Contracts", "description": "2026 renewals" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["name"], "Signed Contracts");
    assert_eq!(body["description"], "2026 renewals");

    let resp = server
        .client
        .get(format!("{}/folders", server.base))
        .send()
        .await
        .unwrap();
    let listing: Value = resp.json().await.unwrap();
    let names: Vec<&str> = listing
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["name"].as_str().unwrap())
        .collect();
    assert!(names.contains(&"Signed Contracts"));

    let resp = server
        .client
        .delete(format!("{}/folders/{}", server.base, id))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["deleted"], true);
    assert_eq!(body["files_deleted"], 0);

    let resp = server
        .client
        .get(format!("{}/folders/{}", server.base, id))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "not_found");
}

// ─── Upload and chat ────────────────────────────────────────────────

#[tokio::test]
async fn upload_ingests_and_chat_cites_the_file() {
    let server = start_server(vec![canned("openai", "The rent is 950 dollars per month.")]).await;
    let folder_id = create_folder(&server, "Leases").await;

    // Two pages; the question below targets page one.
    let pdf = pdf_with_pages(&[
        &[
            "The monthly rent is 950 dollars.",
            "Utilities are included in the rent.",
        ],
        &[
            "The security deposit equals one month of rent.",
            "Renewal terms appear in the final section.",
        ],
    ]);
    let file = upload_pdf(&server, &folder_id, "lease.pdf", pdf).await;
    assert_eq!(file["index_state"], "uploading");
    assert_eq!(file["mime_type"], "application/pdf");

    wait_indexed(&server, &folder_id).await;

    let file_id = file["id"].as_str().unwrap();
    let resp = server
        .client
        .get(format!("{}/files/{}", server.base, file_id))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["index_state"], "indexed");
    assert!(body["chunk_count"].as_i64().unwrap() >= 1);
    assert_eq!(body["index_error"], Value::Null);

    let (status, body) = chat(&server, &folder_id, "What is the monthly rent?", None).await;
    assert_eq!(status, 200);
    assert_eq!(body["response"], "The rent is 950 dollars per month.");
    assert_eq!(body["model_used"], "openai");
    let sources: Vec<&str> = body["sources"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s.as_str().unwrap())
        .collect();
    assert_eq!(sources, vec!["lease.pdf"]);
}

#[tokio::test]
async fn upload_rejects_non_pdf_and_unknown_folder() {
    let server = start_server(vec![canned("openai", "unused")]).await;
    let folder_id = create_folder(&server, "Inbox").await;

    let part = reqwest::multipart::Part::bytes(b"plain text".to_vec())
        .file_name("notes.txt".to_string());
    let form = reqwest::multipart::Form::new()
        .part("file", part)
        .text("folder_id", folder_id.clone());
    let resp = server
        .client
        .post(format!("{}/files/upload", server.base))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("only PDF uploads"));

    let part = reqwest::multipart::Part::bytes(pdf_with_text(&["hello"]))
        .file_name("hello.pdf".to_string());
    let form = reqwest::multipart::Form::new()
        .part("file", part)
        .text("folder_id", "no-such-folder".to_string());
    let resp = server
        .client
        .post(format!("{}/files/upload", server.base))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn chat_in_empty_folder_reports_no_relevant_content() {
    let server = start_server(vec![canned("openai", "should never be called")]).await;
    let folder_id = create_folder(&server, "Empty").await;

    let (status, body) = chat(&server, &folder_id, "anything in here?", None).await;
    assert_eq!(status, 200);
    assert!(body["response"]
        .as_str()
        .unwrap()
        .contains("couldn't find relevant information"));
    assert_eq!(body["sources"].as_array().unwrap().len(), 0);
    assert_eq!(body["model_used"], "smart");
}

#[tokio::test]
async fn chat_rejects_unknown_folder_and_blank_message() {
    let server = start_server(vec![canned("openai", "unused")]).await;

    let (status, body) = chat(&server, "missing-folder", "hello", None).await;
    assert_eq!(status, 404);
    assert_eq!(body["error"]["code"], "not_found");

    let folder_id = create_folder(&server, "Docs").await;
    let (status, body) = chat(&server, &folder_id, "   ", None).await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "bad_request");
}

#[tokio::test]
async fn quota_fallback_prefixes_note_and_reports_answerer() {
    let server = start_server(vec![
        Arc::new(QuotaProvider { id: "openai" }),
        canned("gemini", "Fallback answer."),
    ])
    .await;
    let folder_id = create_folder(&server, "Quota").await;
    let pdf = pdf_with_text(&["The warranty covers parts and labor for two years."]);
    upload_pdf(&server, &folder_id, "warranty.pdf", pdf).await;
    wait_indexed(&server, &folder_id).await;

    let (status, body) = chat(&server, &folder_id, "what does the warranty cover", Some("openai")).await;
    assert_eq!(status, 200);
    assert_eq!(body["model_used"], "gemini");
    let response = body["response"].as_str().unwrap();
    assert!(
        response.starts_with("[Note: answered by gemini because openai hit its quota limit]"),
        "got: {}",
        response
    );
    assert!(response.ends_with("Fallback answer."));
}

#[tokio::test]
async fn simple_mode_returns_excerpts_without_a_model() {
    let server = start_server(vec![canned("openai", "should never be called")]).await;
    let folder_id = create_folder(&server, "Manuals").await;
    let pdf = pdf_with_text(&[
        "The thermostat defaults to 20 degrees in heating mode.",
        "Hold the reset button for five seconds to restore defaults.",
    ]);
    upload_pdf(&server, &folder_id, "thermostat.pdf", pdf).await;
    wait_indexed(&server, &folder_id).await;

    let (status, body) = chat(
        &server,
        &folder_id,
        "what is the thermostat default temperature",
        Some("simple"),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["model_used"], "simple");
    let response = body["response"].as_str().unwrap();
    assert!(
        response.contains("most relevant excerpts"),
        "got: {}",
        response
    );
    assert!(response.contains("1. From thermostat.pdf:"), "got: {}", response);
    assert!(response.contains("thermostat"), "got: {}", response);
}

#[tokio::test]
async fn chat_is_scoped_to_the_requested_folder() {
    let server = start_server(vec![canned("openai", "Answer.")]).await;

    let orchard = create_folder(&server, "Orchard").await;
    let marine = create_folder(&server, "Marine").await;
    upload_pdf(
        &server,
        &orchard,
        "apples.pdf",
        pdf_with_text(&["Apples grow on trees in the orchard."]),
    )
    .await;
    upload_pdf(
        &server,
        &marine,
        "submarines.pdf",
        pdf_with_text(&["Submarines dive beneath the ocean waves."]),
    )
    .await;
    wait_indexed(&server, &orchard).await;
    wait_indexed(&server, &marine).await;

    let (status, body) = chat(&server, &orchard, "where do apples grow", None).await;
    assert_eq!(status, 200);
    let sources: Vec<&str> = body["sources"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s.as_str().unwrap())
        .collect();
    assert_eq!(sources, vec!["apples.pdf"]);
}

// ─── Sessions ───────────────────────────────────────────────────────

#[tokio::test]
async fn with_session_records_the_exchange() {
    let server = start_server(vec![canned("openai", "It is 950 dollars.")]).await;
    let folder_id = create_folder(&server, "Leases").await;
    upload_pdf(
        &server,
        &folder_id,
        "lease.pdf",
        pdf_with_text(&["The monthly rent is 950 dollars."]),
    )
    .await;
    wait_indexed(&server, &folder_id).await;

    let resp = server
        .client
        .post(format!("{}/chat/with-session", server.base))
        .query(&[
            ("message", "What is the monthly rent?"),
            ("folder_id", folder_id.as_str()),
        ])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["model"], "openai");
    assert_eq!(body["response"], "It is 950 dollars.");
    let session_id = body["session_id"].as_str().unwrap().to_string();

    let resp = server
        .client
        .get(format!("{}/sessions/{}", server.base, session_id))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["session"]["title"], "What is the monthly rent?");
    assert_eq!(body["session"]["model"], "smart");
    let messages = body["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["role"], "user");
    assert_eq!(messages[0]["content"], "What is the monthly rent?");
    assert_eq!(messages[1]["role"], "assistant");
    assert_eq!(messages[1]["content"], "It is 950 dollars.");

    // Follow-up into the same session
    let resp = server
        .client
        .post(format!("{}/chat/with-session", server.base))
        .query(&[
            ("message", "Are utilities included?"),
            ("folder_id", folder_id.as_str()),
            ("session_id", session_id.as_str()),
        ])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["session_id"].as_str().unwrap(), session_id);

    let resp = server
        .client
        .get(format!("{}/sessions/{}", server.base, session_id))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    let roles: Vec<&str> = body["messages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["role"].as_str().unwrap())
        .collect();
    assert_eq!(roles, vec!["user", "assistant", "user", "assistant"]);

    let resp = server
        .client
        .get(format!("{}/sessions/folder/{}", server.base, folder_id))
        .send()
        .await
        .unwrap();
    let listing: Value = resp.json().await.unwrap();
    assert_eq!(listing.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn session_endpoints_roundtrip() {
    let server = start_server(vec![canned("openai", "unused")]).await;
    let folder_id = create_folder(&server, "Notes").await;

    let resp = server
        .client
        .post(format!("{}/sessions", server.base))
        .json(&json!({ "folder_id": folder_id }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let session: Value = resp.json().await.unwrap();
    assert_eq!(session["title"], "New Chat");
    assert_eq!(session["model"], "smart");
    let session_id = session["id"].as_str().unwrap().to_string();

    let resp = server
        .client
        .post(format!("{}/sessions/messages", server.base))
        .json(&json!({
            "session_id": session_id,
            "role": "user",
            "content": "hello there",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);

    // First user message becomes the title
    let resp = server
        .client
        .get(format!("{}/sessions/{}", server.base, session_id))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["session"]["title"], "hello there");

    let resp = server
        .client
        .put(format!("{}/sessions/{}/title", server.base, session_id))
        .json(&json!({ "title": "Renamed" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["title"], "Renamed");

    let resp = server
        .client
        .post(format!("{}/sessions", server.base))
        .json(&json!({ "folder_id": folder_id, "title": "Keeper" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);

    let resp = server
        .client
        .delete(format!("{}/sessions/{}", server.base, session_id))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = server
        .client
        .get(format!("{}/sessions/{}", server.base, session_id))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    // The folder's other session survives the delete
    let resp = server
        .client
        .get(format!("{}/sessions/folder/{}", server.base, folder_id))
        .send()
        .await
        .unwrap();
    let listing: Value = resp.json().await.unwrap();
    let titles: Vec<&str> = listing
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["title"].as_str().unwrap())
        .collect();
    assert_eq!(titles, vec!["Keeper"]);
}

// ─── Deletion ───────────────────────────────────────────────────────

#[tokio::test]
async fn deleting_a_file_removes_it_from_retrieval() {
    let server = start_server(vec![canned("openai", "Answer.")]).await;
    let folder_id = create_folder(&server, "Archive").await;
    let file = upload_pdf(
        &server,
        &folder_id,
        "old.pdf",
        pdf_with_text(&["The archive contains obsolete procedures."]),
    )
    .await;
    wait_indexed(&server, &folder_id).await;
    let file_id = file["id"].as_str().unwrap();

    let resp = server
        .client
        .delete(format!("{}/files/{}", server.base, file_id))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["deleted"], true);

    let resp = server
        .client
        .get(format!("{}/files/{}", server.base, file_id))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    // With its vectors gone the folder has nothing to retrieve
    let (status, body) = chat(&server, &folder_id, "what is in the archive", None).await;
    assert_eq!(status, 200);
    assert!(body["response"]
        .as_str()
        .unwrap()
        .contains("couldn't find relevant information"));
}

#[tokio::test]
async fn deleting_a_folder_reports_cascade_counts() {
    let server = start_server(vec![canned("openai", "Answer.")]).await;
    let folder_id = create_folder(&server, "Temp").await;
    upload_pdf(
        &server,
        &folder_id,
        "scratch.pdf",
        pdf_with_text(&["Scratch notes for the afternoon meeting."]),
    )
    .await;
    wait_indexed(&server, &folder_id).await;

    let resp = server
        .client
        .post(format!("{}/sessions", server.base))
        .json(&json!({ "folder_id": folder_id }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);

    let resp = server
        .client
        .delete(format!("{}/folders/{}", server.base, folder_id))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["files_deleted"], 1);
    assert_eq!(body["sessions_deleted"], 1);
}

// ─── Status endpoints ───────────────────────────────────────────────

#[tokio::test]
async fn models_status_reports_availability_and_recommendation() {
    let server = start_server(vec![
        canned("openai", "hi"),
        canned("gemini", "hi"),
    ])
    .await;

    let resp = server
        .client
        .get(format!("{}/chat/models/status", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["models"]["openai"]["available"], true);
    assert_eq!(body["recommended"], "openai");
    assert_eq!(body["smart_mode_available"], true);
}

#[tokio::test]
async fn health_and_config_check_describe_the_deployment() {
    let server = start_server(vec![canned("openai", "hi")]).await;

    let resp = server
        .client
        .get(format!("{}/health", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["database"], "connected");
    assert_eq!(body["storage"]["backend"], "local");
    assert_eq!(body["storage"]["reachable"], true);

    let resp = server
        .client
        .get(format!("{}/config/check", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["vector_store"], "sqlite");
    assert_eq!(body["storage_backend"], "local");
    assert_eq!(body["default_model"], "smart");
}
