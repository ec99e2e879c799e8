//! LLM client (C2): prompts an external model for fact extraction,
//! update-plan generation, conflict classification, and summarization.
//! Enforces JSON-mode output with robust recovery (§4.2).

pub mod json_recovery;
pub mod mock;
#[cfg(feature = "embeddings")]
pub mod ollama;
pub mod presets;

use async_trait::async_trait;

pub use presets::{GenerationPreset, UseCase};

/// Options the client forwards to the backend. The client never passes
/// parameters a target model rejects: reasoning-class models (detected via
/// `reasoning_only`) receive only message/format/tool fields.
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: Option<u32>,
    pub num_ctx: Option<u32>,
    pub json_mode: bool,
    pub use_case: UseCase,
}

impl GenerateOptions {
    /// Build options from a named use-case preset.
    pub fn for_use_case(use_case: UseCase) -> Self {
        let preset = use_case.preset();
        Self {
            max_tokens: preset.max_tokens,
            temperature: preset.temperature,
            top_p: preset.top_p,
            top_k: preset.top_k,
            num_ctx: preset.num_ctx,
            json_mode: false,
            use_case,
        }
    }

    pub fn json(mut self) -> Self {
        self.json_mode = true;
        self
    }
}

/// A chat message role-tagged turn.
#[derive(Debug, Clone)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".into(), content: content.into() }
    }
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".into(), content: content.into() }
    }
}

/// LLM client errors, raised on HTTP/transport failure only; the client
/// never retries internally (§4.2, caller decides).
#[derive(Debug, Clone)]
pub enum LlmError {
    Upstream(String),
}

impl std::fmt::Display for LlmError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LlmError::Upstream(e) => write!(f, "llm upstream error: {e}"),
        }
    }
}

impl std::error::Error for LlmError {}

impl From<LlmError> for crate::error::Error {
    fn from(e: LlmError) -> Self {
        crate::error::Error::Upstream(e.to_string())
    }
}

/// A provider of chat completions.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Generate a single completion. The client is oblivious to prompt
    /// content; prompt construction lives in the caller.
    async fn generate(&self, messages: &[Message], options: &GenerateOptions) -> Result<String, LlmError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_constructors_set_expected_roles() {
        assert_eq!(Message::system("x").role, "system");
        assert_eq!(Message::user("x").role, "user");
    }

    #[test]
    fn generate_options_for_memory_use_case_has_low_temperature() {
        let opts = GenerateOptions::for_use_case(UseCase::Memory);
        assert!(opts.temperature <= 0.25);
    }
}
