//! Chat completion providers.
//!
//! Each adapter turns its provider's wire protocol into a plain
//! `complete(prompt) -> String` call and maps failures onto the typed
//! [`ProviderError`] variants the router dispatches on. Quota detection
//! happens here at the boundary by reading the HTTP status code, so
//! nothing downstream ever matches on error message text.
//!
//! Adapters are constructed once at startup. A missing API key does not
//! prevent construction; the provider reports itself unavailable and
//! fails fast with [`ProviderError::Unavailable`] when called, which lets
//! smart mode skip it and the status endpoint report it honestly.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config::ChatConfig;
use crate::error::ProviderError;

/// One chat completion backend.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Stable identifier: `"openai"`, `"gemini"`, or `"ollama"`. Surfaced
    /// as `model_used` in chat responses.
    fn id(&self) -> &'static str;

    /// Human-readable name for the status endpoint.
    fn display_name(&self) -> &'static str;

    /// One-line description for the status endpoint.
    fn description(&self) -> String;

    /// Whether the provider looks usable right now. Key-based providers
    /// report key presence; Ollama probes the local server.
    async fn available(&self) -> bool;

    /// Run one completion for one prompt.
    async fn complete(&self, prompt: &str) -> Result<String, ProviderError>;
}

// ============ OpenAI ============

pub struct OpenAiChat {
    client: reqwest::Client,
    api_key: Option<String>,
    model: String,
}

impl OpenAiChat {
    /// Reads `OPENAI_API_KEY`; an absent or empty key leaves the provider
    /// constructed but unavailable.
    pub fn new(config: &ChatConfig, client: reqwest::Client) -> Self {
        let api_key = std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|k| !k.is_empty());
        Self {
            client,
            api_key,
            model: config.openai_model.clone(),
        }
    }
}

#[async_trait]
impl ChatProvider for OpenAiChat {
    fn id(&self) -> &'static str {
        "openai"
    }

    fn display_name(&self) -> &'static str {
        "OpenAI GPT"
    }

    fn description(&self) -> String {
        "Advanced AI model with high accuracy".to_string()
    }

    async fn available(&self) -> bool {
        self.api_key.is_some()
    }

    async fn complete(&self, prompt: &str) -> Result<String, ProviderError> {
        let Some(ref api_key) = self.api_key else {
            return Err(ProviderError::Unavailable(
                "OPENAI_API_KEY not set".to_string(),
            ));
        };

        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "user", "content": prompt }
            ],
            "temperature": 0.7,
            "stream": false
        });

        let resp = self
            .client
            .post("https://api.openai.com/v1/chat/completions")
            .header("Authorization", format!("Bearer {}", api_key))
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = read_error_message(resp).await;
            // OpenAI signals both rate limiting and exhausted billing quota
            // ("insufficient_quota") with 429.
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                return Err(ProviderError::Quota(message));
            }
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let payload: Value = resp
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;
        parse_openai_content(&payload)
    }
}

// ============ Google Gemini ============

pub struct GeminiChat {
    client: reqwest::Client,
    api_key: Option<String>,
    model: String,
}

impl GeminiChat {
    /// Reads `GEMINI_API_KEY`.
    pub fn new(config: &ChatConfig, client: reqwest::Client) -> Self {
        let api_key = std::env::var("GEMINI_API_KEY")
            .ok()
            .filter(|k| !k.is_empty());
        Self {
            client,
            api_key,
            model: config.gemini_model.clone(),
        }
    }
}

#[async_trait]
impl ChatProvider for GeminiChat {
    fn id(&self) -> &'static str {
        "gemini"
    }

    fn display_name(&self) -> &'static str {
        "Google Gemini"
    }

    fn description(&self) -> String {
        "Google's advanced AI model".to_string()
    }

    async fn available(&self) -> bool {
        self.api_key.is_some()
    }

    async fn complete(&self, prompt: &str) -> Result<String, ProviderError> {
        let Some(ref api_key) = self.api_key else {
            return Err(ProviderError::Unavailable(
                "GEMINI_API_KEY not set".to_string(),
            ));
        };

        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent",
            self.model
        );
        let body = json!({
            "contents": [{
                "parts": [{ "text": prompt }]
            }]
        });

        let resp = self
            .client
            .post(&url)
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = read_error_message(resp).await;
            // Gemini reports quota exhaustion as 429 RESOURCE_EXHAUSTED.
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                return Err(ProviderError::Quota(message));
            }
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let payload: Value = resp
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;
        parse_gemini_content(&payload)
    }
}

// ============ Ollama ============

pub struct OllamaChat {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaChat {
    pub fn new(config: &ChatConfig, client: reqwest::Client) -> Self {
        Self {
            client,
            base_url: config.ollama_url.trim_end_matches('/').to_string(),
            model: config.ollama_model.clone(),
        }
    }
}

#[async_trait]
impl ChatProvider for OllamaChat {
    fn id(&self) -> &'static str {
        "ollama"
    }

    fn display_name(&self) -> &'static str {
        "Ollama Local LLM"
    }

    fn description(&self) -> String {
        format!("Local LLM running via Ollama (model: {})", self.model)
    }

    /// The server must answer `/api/version` and `/api/tags` must list the
    /// configured model (exact name or a tagged variant of the same base).
    async fn available(&self) -> bool {
        let version_url = format!("{}/api/version", self.base_url);
        let running = match self
            .client
            .get(&version_url)
            .timeout(Duration::from_secs(5))
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        };
        if !running {
            return false;
        }

        let tags_url = format!("{}/api/tags", self.base_url);
        let Ok(resp) = self
            .client
            .get(&tags_url)
            .timeout(Duration::from_secs(5))
            .send()
            .await
        else {
            return false;
        };
        let Ok(payload) = resp.json::<Value>().await else {
            return false;
        };

        model_is_pulled(&payload, &self.model)
    }

    async fn complete(&self, prompt: &str) -> Result<String, ProviderError> {
        let url = format!("{}/api/generate", self.base_url);
        let body = json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false
        });

        let resp = self.client.post(&url).json(&body).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let message = read_error_message(resp).await;
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let payload: Value = resp
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;
        parse_ollama_content(&payload)
    }
}

// ============ Response parsing ============

fn parse_openai_content(payload: &Value) -> Result<String, ProviderError> {
    payload["choices"][0]["message"]["content"]
        .as_str()
        .map(|s| s.to_string())
        .ok_or_else(|| {
            ProviderError::Parse("response missing choices[0].message.content".to_string())
        })
}

/// Gemini may split an answer across several parts; join them.
fn parse_gemini_content(payload: &Value) -> Result<String, ProviderError> {
    let parts = payload["candidates"][0]["content"]["parts"]
        .as_array()
        .ok_or_else(|| {
            ProviderError::Parse("response missing candidates[0].content.parts".to_string())
        })?;

    let text: String = parts
        .iter()
        .filter_map(|p| p["text"].as_str())
        .collect::<Vec<_>>()
        .join("");

    if text.is_empty() {
        return Err(ProviderError::Parse(
            "no text parts in Gemini candidate".to_string(),
        ));
    }
    Ok(text)
}

fn parse_ollama_content(payload: &Value) -> Result<String, ProviderError> {
    payload["response"]
        .as_str()
        .map(|s| s.to_string())
        .ok_or_else(|| ProviderError::Parse("response missing 'response' field".to_string()))
}

/// A model counts as pulled when `/api/tags` lists the exact name or any
/// tagged variant of the same base (`llama3.2` matches `llama3.2:latest`).
fn model_is_pulled(tags: &Value, model: &str) -> bool {
    let base = model.split(':').next().unwrap_or(model);
    tags["models"]
        .as_array()
        .map(|models| {
            models.iter().any(|m| {
                let name = m["name"].as_str().unwrap_or("");
                name == model || name.starts_with(&format!("{}:", base))
            })
        })
        .unwrap_or(false)
}

/// Best-effort extraction of a human-readable message from an error body.
/// Providers wrap it differently; fall back to the raw body, truncated.
async fn read_error_message(resp: reqwest::Response) -> String {
    let body = resp.text().await.unwrap_or_default();

    if let Ok(payload) = serde_json::from_str::<Value>(&body) {
        if let Some(msg) = payload["error"]["message"].as_str() {
            return msg.to_string();
        }
        if let Some(msg) = payload["error"].as_str() {
            return msg.to_string();
        }
    }

    body.chars().take(300).collect()
}
