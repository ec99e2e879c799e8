//! # screenmem-core
//!
//! Personal screen-memory engine core. Ingests role-tagged message
//! batches, scores and tiers them by importance, resolves conflicts
//! against what's already stored, and serves hybrid text+vision
//! retrieval over the result.
//!
//! - **Ingestion**: non-inferring writes for raw message capture, an
//!   LLM-driven fact-extraction and update-planning path for
//!   conversational input, and a dedicated procedural-memory shortcut.
//! - **Tiered lifecycle**: working/short_term/long_term tiers driven by an
//!   importance score, promoted on access and decayed (or compressed) on
//!   a sweep.
//! - **Conflict resolution**: a three-level cascade (content digest,
//!   cosine similarity, cached LLM adjudication) between a new fact and
//!   its nearest stored neighbors.
//! - **Hybrid retrieval**: reciprocal-rank fusion across text and vision
//!   search, with visual-term query rewriting and a bounded result cache.
//! - **Query router**: rule-based classification and dispatch for raw
//!   conversational input, with its own response cache.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use screenmem_core::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn run() -> screenmem_core::Result<()> {
//! let store = Arc::new(MultimodalStore::open_in_memory(512, None)?);
//! let history = Arc::new(HistoryLog::open_in_memory()?);
//! let embedder: Arc<dyn EmbeddingClient> = Arc::new(MockEmbeddingClient::new(512));
//! let llm: Arc<dyn LlmClient> = Arc::new(MockLlmClient::new("ok"));
//!
//! let engine = ScreenMemory::from_parts(store, history, embedder, llm, ApiVersion::V1_1, true, true)?;
//! let scope = ScopeIds { user_id: Some("u1".into()), agent_id: None, run_id: None };
//! engine.add(&[IngestMessage::user("my favorite color is blue")], scope.clone(), MemoryMetadata::default(), false, None, None).await?;
//! let filter = MemoryFilter { user_id: Some("u1".into()), ..Default::default() };
//! let hits = engine.search(Some("favorite color"), None, &filter, 5).await;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod conflict;
pub mod embeddings;
pub mod engine;
pub mod error;
pub mod history;
pub mod importance;
pub mod ingestion;
pub mod llm;
pub mod retrieval;
pub mod router;
pub mod store;
pub mod tiered;
pub mod types;

pub use config::{ApiVersion, Config};
pub use engine::ScreenMemory;
pub use error::{Error, Result};
pub use ingestion::{ActionRecord, IngestMessage, IngestResult, IngestionPipeline, MemoryEvent};
pub use retrieval::{Hit, HybridRetriever};
pub use router::{Classifier, Dispatcher, Intent};
pub use store::{MemoryFilter, MultimodalStore, ScoredMemory};
pub use tiered::TieredManager;
pub use types::{Category, ConflictKind, EventKind, Memory, MemoryMetadata, ScopeIds, Tier};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Convenient imports for common usage.
pub mod prelude {
    pub use crate::{
        ActionRecord, ApiVersion, Category, Classifier, Config, ConflictKind, Dispatcher, Error, EventKind, Hit, HybridRetriever, IngestMessage,
        IngestResult, IngestionPipeline, Intent, Memory, MemoryEvent, MemoryFilter, MemoryMetadata, MultimodalStore, Result, ScopeIds, ScoredMemory,
        ScreenMemory, Tier, TieredManager,
    };

    pub use crate::embeddings::mock::MockEmbeddingClient;
    pub use crate::embeddings::EmbeddingClient;
    pub use crate::history::HistoryLog;
    pub use crate::llm::mock::MockLlmClient;
    pub use crate::llm::LlmClient;
}
