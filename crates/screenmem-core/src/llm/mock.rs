//! In-process LLM stand-in for tests, configurable with canned responses
//! keyed by a substring of the last user message.

use super::{GenerateOptions, LlmClient, LlmError, Message};
use async_trait::async_trait;
use std::sync::Mutex;

/// Returns a fixed response regardless of input, or a substring-routed
/// response table when constructed with `with_routes`.
pub struct MockLlmClient {
    default_response: String,
    routes: Vec<(String, String)>,
    calls: Mutex<Vec<String>>,
}

impl MockLlmClient {
    pub fn new(default_response: impl Into<String>) -> Self {
        Self { default_response: default_response.into(), routes: Vec::new(), calls: Mutex::new(Vec::new()) }
    }

    pub fn with_route(mut self, contains: impl Into<String>, response: impl Into<String>) -> Self {
        self.routes.push((contains.into(), response.into()));
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn generate(&self, messages: &[Message], _options: &GenerateOptions) -> Result<String, LlmError> {
        let last = messages.last().map(|m| m.content.clone()).unwrap_or_default();
        self.calls.lock().unwrap().push(last.clone());
        for (needle, response) in &self.routes {
            if last.contains(needle.as_str()) {
                return Ok(response.clone());
            }
        }
        Ok(self.default_response.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::UseCase;

    #[tokio::test]
    async fn routes_by_substring_else_falls_back_to_default() {
        let client = MockLlmClient::new("default").with_route("facts", "{\"facts\": []}");
        let opts = GenerateOptions::for_use_case(UseCase::Memory);

        let r1 = client.generate(&[Message::user("please extract facts")], &opts).await.unwrap();
        assert_eq!(r1, "{\"facts\": []}");

        let r2 = client.generate(&[Message::user("hello")], &opts).await.unwrap();
        assert_eq!(r2, "default");

        assert_eq!(client.call_count(), 2);
    }
}
