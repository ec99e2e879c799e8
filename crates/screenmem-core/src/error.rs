//! Crate-wide error taxonomy.
//!
//! Kinds follow the design's error taxonomy: configuration failures are
//! fatal at init, scope failures are fatal to the call, upstream failures
//! are recoverable where the caller chose to catch, dimension mismatches
//! are fatal (data loss risk), not-found is only an error outside delete,
//! parse failures fall back to a documented safe default at the call site,
//! and transient failures are retried once internally before surfacing.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Crate-wide error type.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid or missing required configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// No scope id (user_id/agent_id/run_id) provided to an operation that
    /// requires at least one.
    #[error("scope error: at least one of user_id, agent_id, run_id is required")]
    Scope,

    /// Failure from the LLM, embedder, or vector-store backend.
    #[error("upstream error: {0}")]
    Upstream(String),

    /// Embedding size disagrees with the store's configured dimension.
    #[error("dimension error: expected {expected}, got {got}")]
    Dimension {
        /// Configured dimension.
        expected: usize,
        /// Dimension actually produced.
        got: usize,
    },

    /// `get`/`update`/`delete` on a nonexistent id.
    #[error("not found: {0}")]
    NotFound(String),

    /// The tolerant JSON recovery pipeline could not parse an LLM response.
    #[error("parse error: {0}")]
    Parse(String),

    /// Batch-flush conflict or transient I/O error, retried once internally.
    #[error("transient error: {0}")]
    Transient(String),

    /// Underlying SQLite error.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Underlying filesystem error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Underlying JSON (de)serialization error outside the tolerant recovery
    /// path (e.g. config files, not LLM responses).
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// True for errors that the ingestion main path must surface with
    /// context rather than silently swallow (see the propagation policy).
    pub fn is_main_path_fatal(&self) -> bool {
        !matches!(self, Error::Parse(_) | Error::Transient(_))
    }
}
