//! Tiered lifecycle manager (C7): in-memory tier/access_count/last_accessed
//! maps seeded from a mandatory cold-start store scan (Open Question 2,
//! adopted — see DESIGN.md), promotion on access, and a decay sweep that
//! demotes or compresses stale memories.

use crate::embeddings::EmbeddingClient;
use crate::error::Result;
use crate::history::HistoryLog;
use crate::llm::{GenerateOptions, LlmClient, Message, UseCase};
use crate::store::MultimodalStore;
use crate::types::{EventKind, Tier};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

const DEFAULT_T_WORKING_SECS: i64 = 3600;
const DEFAULT_T_SHORT_SECS: i64 = 7 * 86_400;

#[derive(Debug, Clone)]
struct TrackedState {
    tier: Tier,
    access_count: u64,
    last_accessed: DateTime<Utc>,
}

/// Owns the store, history log, embedder, and LLM collaborators it needs;
/// does not hold the ingestion pipeline (§9's cyclic-ownership guidance —
/// it subscribes to events the pipeline publishes instead).
pub struct TieredManager {
    store: Arc<MultimodalStore>,
    history: Arc<HistoryLog>,
    embedder: Arc<dyn EmbeddingClient>,
    llm: Arc<dyn LlmClient>,
    working_enabled: bool,
    auto_compress: bool,
    t_working: chrono::Duration,
    t_short: chrono::Duration,
    state: Mutex<HashMap<String, TrackedState>>,
}

impl TieredManager {
    /// Always performs a full cold-start scan before returning (Open
    /// Question 2, adopted).
    pub fn new(
        store: Arc<MultimodalStore>,
        history: Arc<HistoryLog>,
        embedder: Arc<dyn EmbeddingClient>,
        llm: Arc<dyn LlmClient>,
        working_enabled: bool,
        auto_compress: bool,
    ) -> Result<Self> {
        let manager = Self {
            store,
            history,
            embedder,
            llm,
            working_enabled,
            auto_compress,
            t_working: chrono::Duration::seconds(DEFAULT_T_WORKING_SECS),
            t_short: chrono::Duration::seconds(DEFAULT_T_SHORT_SECS),
            state: Mutex::new(HashMap::new()),
        };
        manager.cold_start_scan()?;
        Ok(manager)
    }

    fn cold_start_scan(&self) -> Result<()> {
        let all = self.store.scan_all()?;
        let mut state = self.state.lock().unwrap();
        for memory in all {
            state.insert(
                memory.id.clone(),
                TrackedState { tier: memory.tier, access_count: memory.access_count, last_accessed: memory.updated_at },
            );
        }
        Ok(())
    }

    /// Initial tier for a freshly scored memory; demoted to short_term if
    /// working is disabled and the score would otherwise land there.
    pub fn initial_tier(&self, score: f32) -> Tier {
        crate::importance::initial_tier(score, self.working_enabled)
    }

    /// Promote on a retrieval hit: bump access_count, advance tier per the
    /// fixed promotion rule, write the new tier back to the store.
    pub fn mark_accessed(&self, id: &str, now: DateTime<Utc>) -> Result<()> {
        let new_tier = {
            let mut state = self.state.lock().unwrap();
            let entry = state.entry(id.to_string()).or_insert(TrackedState {
                tier: Tier::LongTerm,
                access_count: 0,
                last_accessed: now,
            });
            entry.access_count += 1;
            entry.last_accessed = now;

            entry.tier = match entry.tier {
                Tier::LongTerm => Tier::ShortTerm,
                Tier::ShortTerm if self.working_enabled && entry.access_count >= 3 => Tier::Working,
                other => other,
            };
            entry.tier
        };

        self.store.bump_access(id, now)?;
        self.store.set_tier(id, new_tier)?;
        Ok(())
    }

    /// Run the decay sweep once, demoting or compressing stale memories.
    /// Errors from individual memories are logged, not propagated — a sweep
    /// is best-effort maintenance, not a transactional operation.
    pub async fn decay_sweep(&self, now: DateTime<Utc>) {
        let candidates: Vec<(String, Tier, u64)> = {
            let state = self.state.lock().unwrap();
            state.iter().map(|(id, s)| (id.clone(), s.tier, s.access_count)).collect()
        };

        for (id, tier, access_count) in candidates {
            let memory = match self.store.get(&id) {
                Ok(m) => m,
                Err(_) => continue,
            };
            let age = now - memory.created_at;

            if tier == Tier::Working && age > self.t_working {
                self.demote(&id, Tier::ShortTerm);
            } else if tier == Tier::ShortTerm && age > self.t_short && access_count < 2 {
                if self.auto_compress {
                    if let Err(e) = self.compress(&id).await {
                        tracing::warn!(memory_id = %id, error = %e, "compression failed during decay sweep");
                        self.demote(&id, Tier::LongTerm);
                    }
                } else {
                    self.demote(&id, Tier::LongTerm);
                }
            }
        }
    }

    fn demote(&self, id: &str, tier: Tier) {
        {
            let mut state = self.state.lock().unwrap();
            if let Some(entry) = state.get_mut(id) {
                entry.tier = tier;
            }
        }
        if let Err(e) = self.store.set_tier(id, tier) {
            tracing::warn!(memory_id = %id, error = %e, "failed to persist tier demotion");
        }
    }

    /// LLM-summarize, re-embed, and rewrite the memory in place, recorded
    /// as an UPDATE in the history log (§4.7).
    async fn compress(&self, id: &str) -> Result<()> {
        let mut memory = self.store.get(id)?;
        let previous_data = memory.data.clone();
        let original_length = memory.data.chars().count();

        let prompt = format!("Summarize this memory concisely, preserving all facts:\n\n{}", memory.data);
        let messages = [Message::system("You compress memories into shorter summaries."), Message::user(&prompt)];
        let options = GenerateOptions::for_use_case(UseCase::Summary);
        let summary = self.llm.generate(&messages, &options).await.map_err(crate::error::Error::from)?;

        let new_vector = self.embedder.embed(&summary, crate::embeddings::EmbedAction::Update).await.map_err(crate::error::Error::from)?;

        memory.data = summary;
        memory.hash = crate::types::Memory::digest(&memory.data);
        memory.text_vector = new_vector;
        memory.compressed = true;
        memory.metadata.original_length = Some(original_length);
        memory.metadata.compressed_at = Some(Utc::now());
        memory.tier = Tier::LongTerm;
        memory.updated_at = Utc::now();

        self.store.update(&memory)?;
        self.history.add_history(id, Some(&previous_data), Some(&memory.data), EventKind::Update, None, None, false)?;
        self.demote(id, Tier::LongTerm);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::mock::MockEmbeddingClient;
    use crate::llm::mock::MockLlmClient;
    use crate::store::MultimodalStore;
    use crate::types::{Category, Memory, MemoryMetadata, ScopeIds};

    fn sample_memory(id: &str, tier: Tier, created_at: DateTime<Utc>, access_count: u64) -> Memory {
        Memory {
            id: id.to_string(),
            data: "some stored text".into(),
            hash: Memory::digest("some stored text"),
            text_vector: vec![0.1; 8],
            vision_vector: None,
            created_at,
            updated_at: created_at,
            access_count,
            tier,
            importance_score: 0.5,
            compressed: false,
            scope_ids: ScopeIds { user_id: Some("u1".into()), agent_id: None, run_id: None },
            category: Category::General,
            actor_id: None,
            role: None,
            metadata: MemoryMetadata::default(),
        }
    }

    fn manager_with(store: Arc<MultimodalStore>, working_enabled: bool, auto_compress: bool) -> TieredManager {
        let history = Arc::new(HistoryLog::open_in_memory().unwrap());
        TieredManager::new(store, history, Arc::new(MockEmbeddingClient::new(8)), Arc::new(MockLlmClient::new("compressed summary")), working_enabled, auto_compress)
            .unwrap()
    }

    #[test]
    fn cold_start_scan_seeds_state_from_store() {
        let store = Arc::new(MultimodalStore::open_in_memory(8, None).unwrap());
        store.insert(&sample_memory("m1", Tier::LongTerm, Utc::now(), 0)).unwrap();

        let manager = manager_with(store, true, false);
        manager.mark_accessed("m1", Utc::now()).unwrap();
        assert_eq!(manager.state.lock().unwrap().get("m1").unwrap().tier, Tier::ShortTerm);
    }

    #[test]
    fn promotion_follows_long_term_to_short_term_to_working() {
        let store = Arc::new(MultimodalStore::open_in_memory(8, None).unwrap());
        store.insert(&sample_memory("m1", Tier::LongTerm, Utc::now(), 0)).unwrap();
        let manager = manager_with(store, true, false);

        manager.mark_accessed("m1", Utc::now()).unwrap();
        manager.mark_accessed("m1", Utc::now()).unwrap();
        manager.mark_accessed("m1", Utc::now()).unwrap();
        assert_eq!(manager.state.lock().unwrap().get("m1").unwrap().tier, Tier::Working);
    }

    #[test]
    fn promotion_caps_at_short_term_when_working_disabled() {
        let store = Arc::new(MultimodalStore::open_in_memory(8, None).unwrap());
        store.insert(&sample_memory("m1", Tier::LongTerm, Utc::now(), 0)).unwrap();
        let manager = manager_with(store, false, false);

        for _ in 0..5 {
            manager.mark_accessed("m1", Utc::now()).unwrap();
        }
        assert_eq!(manager.state.lock().unwrap().get("m1").unwrap().tier, Tier::ShortTerm);
    }

    #[tokio::test]
    async fn decay_sweep_demotes_stale_working_memory() {
        let old = Utc::now() - chrono::Duration::hours(2);
        let store = Arc::new(MultimodalStore::open_in_memory(8, None).unwrap());
        store.insert(&sample_memory("m1", Tier::Working, old, 0)).unwrap();
        let manager = manager_with(store.clone(), true, false);

        manager.decay_sweep(Utc::now()).await;
        assert_eq!(store.get("m1").unwrap().tier, Tier::ShortTerm);
    }

    #[tokio::test]
    async fn decay_sweep_compresses_stale_short_term_memory_when_enabled() {
        let old = Utc::now() - chrono::Duration::days(8);
        let store = Arc::new(MultimodalStore::open_in_memory(8, None).unwrap());
        store.insert(&sample_memory("m1", Tier::ShortTerm, old, 1)).unwrap();
        let history = Arc::new(HistoryLog::open_in_memory().unwrap());
        let manager = TieredManager::new(
            store.clone(),
            history.clone(),
            Arc::new(MockEmbeddingClient::new(8)),
            Arc::new(MockLlmClient::new("compressed summary")),
            true,
            true,
        )
        .unwrap();

        manager.decay_sweep(Utc::now()).await;
        let updated = store.get("m1").unwrap();
        assert!(updated.compressed);
        assert_eq!(updated.tier, Tier::LongTerm);
        assert!(updated.metadata.original_length.is_some());

        history.flush().unwrap();
        let rows = history.get_history("m1").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].event_kind, EventKind::Update);
        assert_eq!(rows[0].old_data.as_deref(), Some("some stored text"));
        assert_eq!(rows[0].new_data.as_deref(), Some("compressed summary"));
    }
}
