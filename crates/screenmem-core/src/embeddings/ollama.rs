//! HTTP embedding client for an Ollama-compatible `/api/embeddings`
//! endpoint (§6 "Embedding backend").
//!
//! Grounded on the sibling pack repo's `OpenAIEmbeddingProvider` for the
//! `reqwest::Client` shape (timeout, connection pool) and on the original
//! `embeddings/ollama.py` for the provisioning (`/api/tags`/`/api/pull`)
//! and loopback proxy-bypass behavior.

use super::{EmbedAction, EmbeddingClient, EmbeddingError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const EMBED_TIMEOUT: Duration = Duration::from_secs(30);

fn is_loopback_host(base_url: &str) -> bool {
    base_url.contains("127.0.0.1") || base_url.contains("localhost") || base_url.contains("[::1]")
}

fn build_client(base_url: &str) -> reqwest::Client {
    let mut builder = reqwest::Client::builder().timeout(EMBED_TIMEOUT).pool_max_idle_per_host(8);
    if is_loopback_host(base_url) {
        // Don't inherit system-wide proxy env vars for loopback endpoints.
        builder = builder.no_proxy();
    }
    builder.build().unwrap_or_else(|_| reqwest::Client::new())
}

#[derive(Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct TagsResponse {
    models: Vec<TagEntry>,
}

#[derive(Deserialize)]
struct TagEntry {
    name: String,
}

/// HTTP client against an Ollama-compatible embedding endpoint.
pub struct OllamaEmbeddingClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    dims: usize,
}

impl OllamaEmbeddingClient {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, dims: usize) -> Self {
        let base_url = base_url.into();
        let client = build_client(&base_url);
        Self { client, base_url, model: model.into(), dims }
    }

    /// Best-effort startup provisioning: checks `/api/tags`, triggers
    /// `/api/pull` if the model is missing. Failure here does not fail
    /// initialization (§4.1: "if provisioning fails, initialization may
    /// continue").
    pub async fn ensure_model_exists(&self) {
        let tags_url = format!("{}/api/tags", self.base_url);
        let tags: Option<TagsResponse> = match self.client.get(&tags_url).send().await {
            Ok(resp) => resp.json().await.ok(),
            Err(_) => None,
        };

        let has_model = tags.as_ref().is_some_and(|t| t.models.iter().any(|m| m.name == self.model));
        if has_model {
            return;
        }

        let pull_url = format!("{}/api/pull", self.base_url);
        let body = serde_json::json!({ "name": self.model });
        if let Err(e) = self.client.post(&pull_url).json(&body).send().await {
            tracing::warn!(model = %self.model, error = %e, "failed to provision embedding model; continuing");
        }
    }
}

#[async_trait]
impl EmbeddingClient for OllamaEmbeddingClient {
    async fn embed(&self, text: &str, _action: EmbedAction) -> Result<Vec<f32>, EmbeddingError> {
        let url = format!("{}/api/embeddings", self.base_url);
        let req = EmbeddingsRequest { model: &self.model, prompt: text };
        let resp = self
            .client
            .post(&url)
            .json(&req)
            .send()
            .await
            .map_err(|e| EmbeddingError::Transport(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(EmbeddingError::Transport(format!("embedding backend returned {}", resp.status())));
        }

        let parsed: EmbeddingsResponse =
            resp.json().await.map_err(|e| EmbeddingError::Transport(e.to_string()))?;

        if parsed.embedding.len() != self.dims {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.dims,
                got: parsed.embedding.len(),
            });
        }
        Ok(parsed.embedding)
    }

    fn dimensions(&self) -> usize {
        self.dims
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loopback_detection_matches_common_forms() {
        assert!(is_loopback_host("http://127.0.0.1:11434"));
        assert!(is_loopback_host("http://localhost:11434"));
        assert!(!is_loopback_host("https://ollama.example.com"));
    }
}
