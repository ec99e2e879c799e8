//! HTTP chat client for an Ollama-compatible `/api/chat` endpoint (§6 "LLM
//! backend"). Shares the loopback proxy-bypass behavior with
//! [`crate::embeddings::ollama`] but uses a longer timeout for chat
//! generation than for embeddings.

use super::{GenerateOptions, LlmClient, LlmError, Message};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const CHAT_TIMEOUT: Duration = Duration::from_secs(60);

fn is_loopback_host(base_url: &str) -> bool {
    base_url.contains("127.0.0.1") || base_url.contains("localhost") || base_url.contains("[::1]")
}

fn build_client(base_url: &str) -> reqwest::Client {
    let mut builder = reqwest::Client::builder().timeout(CHAT_TIMEOUT).pool_max_idle_per_host(8);
    if is_loopback_host(base_url) {
        builder = builder.no_proxy();
    }
    builder.build().unwrap_or_else(|_| reqwest::Client::new())
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatOptions {
    temperature: f32,
    top_p: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_ctx: Option<u32>,
    num_predict: u32,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    options: ChatOptions,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'a str>,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ChatResponseMessage,
}

/// HTTP client against an Ollama-compatible chat endpoint.
pub struct OllamaLlmClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaLlmClient {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        let base_url = base_url.into();
        let client = build_client(&base_url);
        Self { client, base_url, model: model.into() }
    }
}

#[async_trait]
impl LlmClient for OllamaLlmClient {
    async fn generate(&self, messages: &[Message], options: &GenerateOptions) -> Result<String, LlmError> {
        let url = format!("{}/api/chat", self.base_url);
        let req = ChatRequest {
            model: &self.model,
            messages: messages.iter().map(|m| ChatMessage { role: &m.role, content: &m.content }).collect(),
            stream: false,
            options: ChatOptions {
                temperature: options.temperature,
                top_p: options.top_p,
                top_k: options.top_k,
                num_ctx: options.num_ctx,
                num_predict: options.max_tokens,
            },
            format: if options.json_mode { Some("json") } else { None },
        };

        let resp = self
            .client
            .post(&url)
            .json(&req)
            .send()
            .await
            .map_err(|e| LlmError::Upstream(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(LlmError::Upstream(format!("chat backend returned {}", resp.status())));
        }

        let parsed: ChatResponse = resp.json().await.map_err(|e| LlmError::Upstream(e.to_string()))?;
        Ok(parsed.message.content)
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
