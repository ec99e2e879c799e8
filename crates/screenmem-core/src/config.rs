//! Typed configuration surface (§6 "Configuration") and process-wide state
//! (the `~/.screenmem` directory, persisted `user_id`).

use crate::error::{Error, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Output shape version; `v1.0` emits a deprecation notice, `v1.1` wraps
/// results in `{results: [...]}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApiVersion {
    #[serde(rename = "v1.0")]
    V1_0,
    #[serde(rename = "v1.1")]
    V1_1,
}

impl Default for ApiVersion {
    fn default() -> Self {
        ApiVersion::V1_1
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorStoreConfig {
    pub collection_name: String,
    pub path: Option<PathBuf>,
    pub host: Option<String>,
    pub port: Option<u16>,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self { collection_name: "screenmem".into(), path: None, host: None, port: None }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedderConfig {
    pub model: String,
    pub base_url: String,
    pub embedding_dims: usize,
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        Self {
            model: "nomic-embed-text".into(),
            base_url: "http://127.0.0.1:11434".into(),
            embedding_dims: 512,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub model: String,
    pub base_url: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: f32,
    pub top_k: u32,
    pub num_ctx: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "qwen2.5vl:7b".into(),
            base_url: "http://127.0.0.1:11434".into(),
            temperature: 0.45,
            max_tokens: 384,
            top_p: 0.85,
            top_k: 25,
            num_ctx: 4096,
        }
    }
}

/// Top-level typed configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub vector_store: VectorStoreConfig,
    pub embedder: EmbedderConfig,
    pub llm: LlmConfig,
    /// Vision-enabled calls use the same shape as `llm`.
    pub mllm: LlmConfig,
    pub history_db_path: PathBuf,
    pub enable_graph: bool,
    pub version: ApiVersion,
    pub timezone: String,
    pub custom_fact_extraction_prompt: Option<String>,
    pub custom_update_memory_prompt: Option<String>,
    /// Process-wide telemetry-scoping id, generated once and persisted.
    pub user_id: String,
    /// Whether the working tier is enabled (§4.5/§4.7); when disabled,
    /// working-tier assignments are demoted to short_term immediately.
    pub enable_working_memory: bool,
    pub auto_decay: bool,
    pub auto_compress: bool,
}

impl Config {
    /// Resolve the process config directory (default `~/.screenmem`).
    pub fn config_dir() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("com", "screenmem", "core")
            .ok_or_else(|| Error::Config("could not determine home directory".into()))?;
        Ok(dirs.data_dir().to_path_buf())
    }

    /// Load an existing `config.json`, or initialize one with a fresh
    /// `user_id` on first run, creating the config directory with
    /// owner-only permissions on Unix.
    pub fn load_or_init(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o700);
            let _ = std::fs::set_permissions(dir, perms);
        }

        let config_path = dir.join("config.json");
        if config_path.exists() {
            let raw = std::fs::read_to_string(&config_path)?;
            return Ok(serde_json::from_str(&raw)?);
        }

        let config = Config {
            vector_store: VectorStoreConfig {
                path: Some(dir.join("vectors")),
                ..Default::default()
            },
            embedder: EmbedderConfig::default(),
            llm: LlmConfig::default(),
            mllm: LlmConfig::default(),
            history_db_path: dir.join("history.db"),
            enable_graph: false,
            version: ApiVersion::V1_1,
            timezone: "US/Pacific".into(),
            custom_fact_extraction_prompt: None,
            custom_update_memory_prompt: None,
            user_id: uuid::Uuid::new_v4().to_string(),
            enable_working_memory: false,
            auto_decay: true,
            auto_compress: true,
        };
        config.persist(&config_path)?;
        Ok(config)
    }

    fn persist(&self, path: &Path) -> Result<()> {
        let raw = serde_json::to_string_pretty(self)?;
        std::fs::write(path, raw)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            let _ = std::fs::set_permissions(path, perms);
        }
        Ok(())
    }
}
