//! Model routing: two-tier dispatch with typed quota fallback.
//!
//! A request names a backend (or "smart"); the registry resolves it to a
//! provider and runs the completion. The one real piece of control logic
//! lives in [`ProviderRegistry::complete`]:
//!
//! - **Smart** walks the priority order (OpenAI, Gemini, Ollama) and
//!   returns the first answer. Providers that are down, keyless, or
//!   erroring are skipped.
//! - A **named** provider gets one attempt. If it fails with
//!   [`ProviderError::Quota`], the remaining chain is tried once and the
//!   answer is prefixed with a note naming both models. Any other failure
//!   propagates untouched.
//!
//! `model_used` always reports the provider that actually answered.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use crate::config::ChatConfig;
use crate::error::{ApiError, ProviderError};
use crate::llm::{ChatProvider, GeminiChat, OllamaChat, OpenAiChat};

/// Recognized backend identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelKind {
    OpenAi,
    Gemini,
    Ollama,
    Smart,
    Simple,
}

impl ModelKind {
    /// Case-insensitive; anything unrecognized routes to Smart, which is
    /// also what an absent model parameter means.
    pub fn parse(name: &str) -> ModelKind {
        match name.trim().to_ascii_lowercase().as_str() {
            "openai" => ModelKind::OpenAi,
            "gemini" => ModelKind::Gemini,
            "ollama" | "local" => ModelKind::Ollama,
            "simple" => ModelKind::Simple,
            _ => ModelKind::Smart,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::OpenAi => "openai",
            ModelKind::Gemini => "gemini",
            ModelKind::Ollama => "ollama",
            ModelKind::Smart => "smart",
            ModelKind::Simple => "simple",
        }
    }
}

/// A completed dispatch: the answer plus which provider produced it.
#[derive(Debug)]
pub struct Routed {
    pub response: String,
    pub model_used: String,
}

/// All configured providers, in fallback priority order.
pub struct ProviderRegistry {
    providers: Vec<Arc<dyn ChatProvider>>,
}

impl ProviderRegistry {
    /// Build the standard OpenAI, Gemini, Ollama set sharing one HTTP
    /// client. Missing API keys do not fail construction; those providers
    /// simply report unavailable.
    pub fn from_config(config: &ChatConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self::with_providers(vec![
            Arc::new(OpenAiChat::new(config, client.clone())),
            Arc::new(GeminiChat::new(config, client.clone())),
            Arc::new(OllamaChat::new(config, client)),
        ]))
    }

    /// Build a registry from an explicit provider list. Order is priority
    /// order.
    pub fn with_providers(providers: Vec<Arc<dyn ChatProvider>>) -> Self {
        Self { providers }
    }

    fn by_id(&self, id: &str) -> Option<&Arc<dyn ChatProvider>> {
        self.providers.iter().find(|p| p.id() == id)
    }

    /// Dispatch one prompt to the selected backend.
    pub async fn complete(&self, kind: ModelKind, prompt: &str) -> Result<Routed, ApiError> {
        match kind {
            ModelKind::OpenAi => self.complete_named("openai", prompt).await,
            ModelKind::Gemini => self.complete_named("gemini", prompt).await,
            ModelKind::Ollama => self.complete_named("ollama", prompt).await,
            ModelKind::Smart => self.complete_smart(prompt, &[]).await,
            ModelKind::Simple => Err(ApiError::Provider(
                "simple mode runs without a language model".to_string(),
            )),
        }
    }

    async fn complete_named(&self, id: &'static str, prompt: &str) -> Result<Routed, ApiError> {
        let provider = self
            .by_id(id)
            .ok_or_else(|| ApiError::Provider(format!("no provider registered for {}", id)))?;

        match provider.complete(prompt).await {
            Ok(response) => Ok(Routed {
                response,
                model_used: id.to_string(),
            }),
            Err(e) if e.is_quota() => {
                tracing::warn!(provider = id, error = %e, "quota exhausted, trying fallback chain");
                let fallback = self.complete_smart(prompt, &[id]).await.map_err(|_| {
                    ApiError::ProviderQuota(format!(
                        "{} hit its quota limit and no fallback provider answered",
                        id
                    ))
                })?;
                Ok(Routed {
                    response: format!(
                        "[Note: answered by {} because {} hit its quota limit]\n\n{}",
                        fallback.model_used, id, fallback.response
                    ),
                    model_used: fallback.model_used,
                })
            }
            Err(e) => Err(ApiError::Provider(format!("{}: {}", id, e))),
        }
    }

    /// Walk the priority order, skipping `skip`, and return the first
    /// success. Each failure is recorded so the terminal error names every
    /// provider that was tried.
    async fn complete_smart(&self, prompt: &str, skip: &[&str]) -> Result<Routed, ApiError> {
        let mut failures: Vec<String> = Vec::new();

        for provider in &self.providers {
            if skip.contains(&provider.id()) {
                continue;
            }
            match provider.complete(prompt).await {
                Ok(response) => {
                    return Ok(Routed {
                        response,
                        model_used: provider.id().to_string(),
                    });
                }
                Err(e) => {
                    tracing::debug!(provider = provider.id(), error = %e, "provider failed, trying next");
                    failures.push(format!("{}: {}", provider.id(), e));
                }
            }
        }

        Err(ApiError::Provider(format!(
            "no provider available ({})",
            failures.join("; ")
        )))
    }

    /// Availability report for the models status endpoint. `recommended`
    /// is the first available provider in priority order.
    pub async fn status(&self) -> Value {
        let mut models = serde_json::Map::new();
        let mut recommended = "unavailable";

        for provider in &self.providers {
            let available = provider.available().await;
            if available && recommended == "unavailable" {
                recommended = provider.id();
            }
            models.insert(
                provider.id().to_string(),
                json!({
                    "available": available,
                    "name": provider.display_name(),
                    "description": provider.description(),
                }),
            );
        }

        json!({
            "models": models,
            "recommended": recommended,
            "smart_mode_available": true,
        })
    }
}
