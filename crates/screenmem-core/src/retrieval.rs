//! Hybrid retriever (C8): optional visual-term query rewriting, parallel
//! per-modality search, reciprocal-rank fusion, and a bounded result cache
//! invalidated on any write that touches a member id.

use crate::cache::TtlLru;
use crate::embeddings::{EmbedAction, EmbeddingClient};
use crate::store::{MemoryFilter, MultimodalStore, ScoredMemory};
use regex::Regex;
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

const RRF_K: f32 = 60.0;
const DEFAULT_TEXT_WEIGHT: f32 = 0.6;
const CACHE_CAPACITY: usize = 100;

/// Bare UI nouns augmented with related terms, appended (not replacing) the
/// original word, matched whole-word case-insensitively.
pub const VISUAL_TERM_LEXICON: &[(&str, &[&str])] = &[
    ("button", &["UI element", "clickable", "interface"]),
    ("text", &["content", "words", "label"]),
    ("image", &["picture", "photo", "screenshot"]),
    ("window", &["pane", "panel", "interface", "dialog"]),
    ("file", &["document", "attachment"]),
    ("screen", &["display", "view", "interface"]),
    ("error", &["warning", "problem", "issue"]),
    ("menu", &["navigation", "options", "list"]),
    ("code", &["script", "program", "snippet"]),
];

static LEXICON_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    VISUAL_TERM_LEXICON
        .iter()
        .map(|(term, _)| Regex::new(&format!(r"(?i)\b{term}\b")).expect("fixed lexicon terms are valid regex"))
        .collect()
});

/// Augment `query` with the lexicon's related terms for any whole word it
/// contains, appending rather than replacing.
pub fn rewrite_query_for_vision(query: &str) -> String {
    let mut extras = Vec::new();
    for ((_, related), pattern) in VISUAL_TERM_LEXICON.iter().zip(LEXICON_PATTERNS.iter()) {
        if pattern.is_match(query) {
            extras.extend(related.iter().copied());
        }
    }
    if extras.is_empty() {
        query.to_string()
    } else {
        format!("{query} {}", extras.join(" "))
    }
}

/// A single fused hit.
#[derive(Debug, Clone)]
pub struct Hit {
    pub id: String,
    pub score: f32,
    pub payload: crate::types::Memory,
}

struct CachedHit {
    id: String,
    score: f32,
}

/// Combines text and vision search behind one fused, cached interface.
pub struct HybridRetriever {
    store: Arc<MultimodalStore>,
    embedder: Arc<dyn EmbeddingClient>,
    cache: TtlLru<String, Vec<CachedHit>>,
    rewrite_visual_terms: bool,
    text_weight: f32,
}

impl Clone for CachedHit {
    fn clone(&self) -> Self {
        Self { id: self.id.clone(), score: self.score }
    }
}

impl HybridRetriever {
    pub fn new(store: Arc<MultimodalStore>, embedder: Arc<dyn EmbeddingClient>) -> Self {
        Self {
            store,
            embedder,
            cache: TtlLru::new(CACHE_CAPACITY, None),
            rewrite_visual_terms: true,
            text_weight: DEFAULT_TEXT_WEIGHT,
        }
    }

    pub fn with_visual_rewriting(mut self, enabled: bool) -> Self {
        self.rewrite_visual_terms = enabled;
        self
    }

    /// Must be called from the ingestion pipeline's ADD/UPDATE/DELETE
    /// success path; a write that is never reported here leaves stale
    /// cached hits until they're naturally evicted.
    pub fn invalidate_cache(&self) {
        self.cache.clear();
    }

    /// At least one of `text_query`/`image_path` must be `Some`; returns
    /// `[]`, never an error, if both modalities fail or are absent.
    pub async fn retrieve(
        &self,
        text_query: Option<&str>,
        image_path: Option<&str>,
        filter: &MemoryFilter,
        limit: usize,
    ) -> Vec<Hit> {
        let cache_key = Self::cache_key(text_query, image_path, filter, limit);
        if let Some(cached) = self.cache.get(&cache_key) {
            return self.resolve_payloads(cached);
        }

        let text_hits = match text_query {
            Some(q) => self.search_text_side(q, filter, limit).await,
            None => Vec::new(),
        };
        let vision_hits = match image_path {
            Some(p) => self.search_vision_side(p, filter, limit).await,
            None => Vec::new(),
        };

        let fused = self.fuse(text_hits, vision_hits, limit);
        self.cache.set(cache_key, fused.iter().map(|h| CachedHit { id: h.id.clone(), score: h.score }).collect());
        fused
    }

    async fn search_text_side(&self, query: &str, filter: &MemoryFilter, limit: usize) -> Vec<ScoredMemory> {
        let rewritten = if self.rewrite_visual_terms { rewrite_query_for_vision(query) } else { query.to_string() };
        let vector = match self.embedder.embed(&rewritten, EmbedAction::Search).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "text-side embedding failed during retrieval");
                return Vec::new();
            }
        };
        match self.store.search_text(&vector, limit * 2, filter) {
            Ok(hits) => hits,
            Err(e) => {
                tracing::warn!(error = %e, "text-side search failed during retrieval");
                Vec::new()
            }
        }
    }

    /// Vision embedding is out of this crate's scope; `image_path` is used
    /// directly as the embed input, matching a text-shaped vision encoder
    /// interface until a dedicated one is wired in.
    async fn search_vision_side(&self, image_path: &str, filter: &MemoryFilter, limit: usize) -> Vec<ScoredMemory> {
        let vector = match self.embedder.embed(image_path, EmbedAction::Search).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "vision-side embedding failed during retrieval");
                return Vec::new();
            }
        };
        match self.store.search_vision(&vector, limit * 2, filter) {
            Ok(hits) => hits,
            Err(e) => {
                tracing::warn!(error = %e, "vision-side search failed during retrieval");
                Vec::new()
            }
        }
    }

    /// RRF over per-side ranks (`1/(k + rank)`), weighted `α` for text,
    /// `1-α` for vision; a memory present on only one side takes 0 there.
    /// Payload is attached from whichever side carried the memory (text
    /// preferred on ties, per the fixed preference order).
    fn fuse(&self, text_hits: Vec<ScoredMemory>, vision_hits: Vec<ScoredMemory>, limit: usize) -> Vec<Hit> {
        let mut rrf: HashMap<String, f32> = HashMap::new();
        let mut payloads: HashMap<String, crate::types::Memory> = HashMap::new();

        for (rank, sm) in text_hits.into_iter().enumerate() {
            *rrf.entry(sm.memory.id.clone()).or_default() += self.text_weight / (RRF_K + rank as f32);
            payloads.entry(sm.memory.id.clone()).or_insert(sm.memory);
        }
        for (rank, sm) in vision_hits.into_iter().enumerate() {
            *rrf.entry(sm.memory.id.clone()).or_default() += (1.0 - self.text_weight) / (RRF_K + rank as f32);
            payloads.entry(sm.memory.id.clone()).or_insert(sm.memory);
        }

        let mut fused: Vec<Hit> = rrf
            .into_iter()
            .filter_map(|(id, score)| payloads.get(&id).cloned().map(|payload| Hit { id, score, payload }))
            .collect();
        fused.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal).then_with(|| a.id.cmp(&b.id)));
        fused.truncate(limit);
        fused
    }

    /// Re-fetch payloads for a cached hit list; a member deleted since
    /// caching is silently dropped rather than surfaced as an error.
    fn resolve_payloads(&self, cached: Vec<CachedHit>) -> Vec<Hit> {
        cached
            .into_iter()
            .filter_map(|c| self.store.get(&c.id).ok().map(|payload| Hit { id: c.id, score: c.score, payload }))
            .collect()
    }

    fn cache_key(text_query: Option<&str>, image_path: Option<&str>, filter: &MemoryFilter, limit: usize) -> String {
        let mut sorted_filters = vec![
            format!("user_id={:?}", filter.user_id),
            format!("agent_id={:?}", filter.agent_id),
            format!("run_id={:?}", filter.run_id),
            format!("tier={:?}", filter.tier),
            format!("category={:?}", filter.category),
        ];
        sorted_filters.sort();
        let raw = format!("{}\u{0}{}\u{0}{}\u{0}{limit}", text_query.unwrap_or(""), image_path.unwrap_or(""), sorted_filters.join(","));
        use md5::{Digest, Md5};
        let mut hasher = Md5::new();
        hasher.update(raw.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::mock::MockEmbeddingClient;
    use crate::types::{Category, Memory, MemoryMetadata, ScopeIds, Tier};

    fn sample(id: &str, data: &str, vec: Vec<f32>) -> Memory {
        let now = chrono::Utc::now();
        Memory {
            id: id.to_string(),
            data: data.to_string(),
            hash: Memory::digest(data),
            text_vector: vec,
            vision_vector: None,
            created_at: now,
            updated_at: now,
            access_count: 0,
            tier: Tier::Working,
            importance_score: 0.5,
            compressed: false,
            scope_ids: ScopeIds { user_id: Some("u1".into()), agent_id: None, run_id: None },
            category: Category::General,
            actor_id: None,
            role: None,
            metadata: MemoryMetadata::default(),
        }
    }

    #[test]
    fn rewrite_appends_related_terms_without_replacing_original() {
        let rewritten = rewrite_query_for_vision("red button in settings");
        assert!(rewritten.starts_with("red button in settings"));
        assert!(rewritten.contains("clickable"));
    }

    #[test]
    fn rewrite_is_identity_when_no_lexicon_term_present() {
        assert_eq!(rewrite_query_for_vision("completely unrelated phrase"), "completely unrelated phrase");
    }

    #[tokio::test]
    async fn text_only_query_finds_closest_match() {
        let store = Arc::new(MultimodalStore::open_in_memory(8, None).unwrap());
        store.insert(&sample("a", "alpha", vec![1.0; 8])).unwrap();
        store.insert(&sample("b", "beta", vec![-1.0; 8])).unwrap();
        let embedder = Arc::new(MockEmbeddingClient::new(8));
        let retriever = HybridRetriever::new(store, embedder);

        let hits = retriever.retrieve(Some("alpha"), None, &MemoryFilter::default(), 5).await;
        assert!(!hits.is_empty());
    }

    #[tokio::test]
    async fn repeat_query_hits_the_cache() {
        let store = Arc::new(MultimodalStore::open_in_memory(8, None).unwrap());
        store.insert(&sample("a", "alpha", vec![1.0; 8])).unwrap();
        let embedder = Arc::new(MockEmbeddingClient::new(8));
        let retriever = HybridRetriever::new(store, embedder);

        retriever.retrieve(Some("alpha"), None, &MemoryFilter::default(), 5).await;
        let key = HybridRetriever::cache_key(Some("alpha"), None, &MemoryFilter::default(), 5);
        assert!(retriever.cache.get(&key).is_some());
    }

    #[tokio::test]
    async fn invalidate_cache_clears_prior_results() {
        let store = Arc::new(MultimodalStore::open_in_memory(8, None).unwrap());
        store.insert(&sample("a", "alpha", vec![1.0; 8])).unwrap();
        let embedder = Arc::new(MockEmbeddingClient::new(8));
        let retriever = HybridRetriever::new(store, embedder);

        retriever.retrieve(Some("alpha"), None, &MemoryFilter::default(), 5).await;
        retriever.invalidate_cache();
        let key = HybridRetriever::cache_key(Some("alpha"), None, &MemoryFilter::default(), 5);
        assert!(retriever.cache.get(&key).is_none());
    }

    #[tokio::test]
    async fn no_queries_returns_empty() {
        let store = Arc::new(MultimodalStore::open_in_memory(8, None).unwrap());
        let embedder = Arc::new(MockEmbeddingClient::new(8));
        let retriever = HybridRetriever::new(store, embedder);
        let hits = retriever.retrieve(None, None, &MemoryFilter::default(), 5).await;
        assert!(hits.is_empty());
    }
}
