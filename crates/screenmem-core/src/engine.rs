//! Wiring layer (C14): owns the store and history log directly, constructs
//! every collaborator with only the references it needs, and threads the
//! ingestion pipeline's write events to the tiered manager and the
//! retriever's cache instead of letting those collaborators hold each
//! other directly.

use crate::config::{ApiVersion, Config};
use crate::embeddings::ollama::OllamaEmbeddingClient;
use crate::embeddings::EmbeddingClient;
use crate::error::Result;
use crate::history::HistoryLog;
use crate::ingestion::{IngestMessage, IngestResult, IngestionPipeline};
use crate::llm::ollama::OllamaLlmClient;
use crate::llm::LlmClient;
use crate::retrieval::{Hit, HybridRetriever};
use crate::router::Dispatcher;
use crate::store::{MemoryFilter, MultimodalStore};
use crate::tiered::TieredManager;
use crate::types::{Category, MemoryMetadata, ScopeIds};
use chrono::Utc;
use std::path::Path;
use std::sync::Arc;

/// The whole engine, built from one `Config`.
pub struct ScreenMemory {
    store: Arc<MultimodalStore>,
    history: Arc<HistoryLog>,
    tiered: Arc<TieredManager>,
    retriever: Arc<HybridRetriever>,
    ingestion: Arc<IngestionPipeline>,
    dispatcher: Arc<Dispatcher>,
}

impl ScreenMemory {
    /// Build from a loaded configuration, using Ollama-backed embedding and
    /// LLM clients for both the text and vision collaborators.
    pub fn open(db_dir: &Path, config: &Config) -> Result<Self> {
        let store = Arc::new(MultimodalStore::open(&db_dir.join("memories.db"), config.embedder.embedding_dims, None)?);
        let history = Arc::new(HistoryLog::open(&config.history_db_path)?);
        let embedder: Arc<dyn EmbeddingClient> =
            Arc::new(OllamaEmbeddingClient::new(config.embedder.base_url.clone(), config.embedder.model.clone(), config.embedder.embedding_dims));
        let llm: Arc<dyn LlmClient> = Arc::new(OllamaLlmClient::new(config.llm.base_url.clone(), config.llm.model.clone()));

        Self::build(store, history, embedder, llm, config.version, config.enable_working_memory, config.auto_compress)
    }

    /// Build from an in-memory store and history log with caller-supplied
    /// collaborators, for tests and embedding applications that manage
    /// their own clients.
    pub fn from_parts(
        store: Arc<MultimodalStore>,
        history: Arc<HistoryLog>,
        embedder: Arc<dyn EmbeddingClient>,
        llm: Arc<dyn LlmClient>,
        api_version: ApiVersion,
        working_enabled: bool,
        auto_compress: bool,
    ) -> Result<Self> {
        Self::build(store, history, embedder, llm, api_version, working_enabled, auto_compress)
    }

    fn build(
        store: Arc<MultimodalStore>,
        history: Arc<HistoryLog>,
        embedder: Arc<dyn EmbeddingClient>,
        llm: Arc<dyn LlmClient>,
        api_version: ApiVersion,
        working_enabled: bool,
        auto_compress: bool,
    ) -> Result<Self> {
        let tiered = Arc::new(TieredManager::new(store.clone(), history.clone(), embedder.clone(), llm.clone(), working_enabled, auto_compress)?);
        let retriever = Arc::new(HybridRetriever::new(store.clone(), embedder.clone()));
        let ingestion = Arc::new(IngestionPipeline::new(store.clone(), history.clone(), embedder, llm.clone(), api_version, working_enabled));
        let dispatcher = Arc::new(Dispatcher::new(retriever.clone(), ingestion.clone(), llm));

        spawn_event_bridge(ingestion.subscribe(), tiered.clone(), retriever.clone());

        Ok(Self { store, history, tiered, retriever, ingestion, dispatcher })
    }

    pub async fn add(
        &self,
        messages: &[IngestMessage],
        scope_ids: ScopeIds,
        metadata: MemoryMetadata,
        infer: bool,
        memory_type: Option<&str>,
        actor_id: Option<&str>,
    ) -> Result<IngestResult> {
        self.ingestion.add(messages, scope_ids, metadata, infer, memory_type, actor_id).await
    }

    pub async fn add_with_category(
        &self,
        messages: &[IngestMessage],
        scope_ids: ScopeIds,
        metadata: MemoryMetadata,
        category: Category,
        actor_id: Option<&str>,
    ) -> Result<IngestResult> {
        self.ingestion.add_with_category(messages, scope_ids, metadata, category, actor_id).await
    }

    /// Retrieve memories and promote every hit (access bump + tier
    /// advancement) before returning.
    pub async fn search(&self, text_query: Option<&str>, image_path: Option<&str>, filter: &MemoryFilter, limit: usize) -> Vec<Hit> {
        let hits = self.retriever.retrieve(text_query, image_path, filter, limit).await;
        let now = Utc::now();
        for hit in &hits {
            if let Err(e) = self.tiered.mark_accessed(&hit.id, now) {
                tracing::warn!(memory_id = %hit.id, error = %e, "promotion on retrieval failed");
            }
        }
        hits
    }

    /// Classify, dispatch, and cache a response for raw conversational
    /// input; see `router::Dispatcher::handle`.
    pub async fn chat(&self, input: &str, scope_ids: ScopeIds) -> String {
        self.dispatcher.handle(input, scope_ids).await
    }

    /// Run one decay sweep now; callers own the scheduling cadence.
    pub async fn run_decay_sweep(&self) {
        self.tiered.decay_sweep(Utc::now()).await;
    }

    pub fn store(&self) -> &Arc<MultimodalStore> {
        &self.store
    }

    pub fn history(&self) -> &Arc<HistoryLog> {
        &self.history
    }
}

/// Relay write events from ingestion to the retriever's cache invalidation
/// and the tiered manager's access bookkeeping, so neither collaborator
/// needs a direct reference to the other or to ingestion.
fn spawn_event_bridge(mut events: tokio::sync::broadcast::Receiver<crate::ingestion::MemoryEvent>, tiered: Arc<TieredManager>, retriever: Arc<HybridRetriever>) {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    retriever.invalidate_cache();
                    if event.kind == crate::types::EventKind::Add {
                        if let Err(e) = tiered.mark_accessed(&event.id, Utc::now()) {
                            tracing::warn!(memory_id = %event.id, error = %e, "tier bookkeeping failed on write event");
                        }
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::mock::MockEmbeddingClient;
    use crate::llm::mock::MockLlmClient;

    async fn engine() -> ScreenMemory {
        let store = Arc::new(MultimodalStore::open_in_memory(8, None).unwrap());
        let history = Arc::new(HistoryLog::open_in_memory().unwrap());
        let embedder: Arc<dyn EmbeddingClient> = Arc::new(MockEmbeddingClient::new(8));
        let llm: Arc<dyn LlmClient> = Arc::new(MockLlmClient::new("ok"));
        ScreenMemory::from_parts(store, history, embedder, llm, ApiVersion::V1_1, true, false).unwrap()
    }

    #[tokio::test]
    async fn add_then_search_round_trips() {
        let engine = engine().await;
        let scope = ScopeIds { user_id: Some("u1".into()), agent_id: None, run_id: None };
        engine.add(&[IngestMessage::user("the sky is blue")], scope.clone(), MemoryMetadata::default(), false, None, None).await.unwrap();

        let filter = MemoryFilter { user_id: Some("u1".into()), ..Default::default() };
        let hits = engine.search(Some("sky"), None, &filter, 5).await;
        assert!(!hits.is_empty());
    }

    #[tokio::test]
    async fn chat_with_greeting_short_circuits_to_canned_response() {
        let engine = engine().await;
        let scope = ScopeIds { user_id: Some("u1".into()), agent_id: None, run_id: None };
        let response = engine.chat("hi", scope).await;
        assert_eq!(response, "Hello! How can I help?");
    }

    #[tokio::test]
    async fn decay_sweep_runs_without_panicking_on_empty_store() {
        let engine = engine().await;
        engine.run_decay_sweep().await;
    }
}
