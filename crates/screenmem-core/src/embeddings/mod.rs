//! Embedding client (C1): turns text into fixed-dim vectors via an
//! external model endpoint, with bounded-parallelism batching and an LRU
//! cache keyed by the exact input string.

pub mod mock;
#[cfg(feature = "embeddings")]
pub mod ollama;

use crate::cache::TtlLru;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::sync::Arc;

/// Bounded-parallelism fanout width for batch operations (§4.1, §5).
const DEFAULT_FANOUT: usize = 4;

/// Advisory action tag; never changes vector dimension within a
/// deployment, but some backends use a different model for indexing vs.
/// retrieval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedAction {
    Add,
    Search,
    Update,
}

/// Errors specific to the embedding client, kept as a module-local manual
/// `Display` enum in the idiom the teacher used at this site.
#[derive(Debug, Clone)]
pub enum EmbeddingError {
    Transport(String),
    DimensionMismatch { expected: usize, got: usize },
    ModelMissing(String),
}

impl std::fmt::Display for EmbeddingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmbeddingError::Transport(e) => write!(f, "embedding transport error: {e}"),
            EmbeddingError::DimensionMismatch { expected, got } => {
                write!(f, "embedding dimension mismatch: expected {expected}, got {got}")
            }
            EmbeddingError::ModelMissing(m) => write!(f, "embedding model not provisioned: {m}"),
        }
    }
}

impl std::error::Error for EmbeddingError {}

impl From<EmbeddingError> for crate::error::Error {
    fn from(e: EmbeddingError) -> Self {
        crate::error::Error::Upstream(e.to_string())
    }
}

/// A provider of text embeddings. Implemented by the HTTP-backed Ollama
/// client and by an in-process mock for tests (mirrors the original having
/// a first-class mock provider in its factory).
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Embed a single string.
    async fn embed(&self, text: &str, action: EmbedAction) -> Result<Vec<f32>, EmbeddingError>;

    /// Embed a batch. Default implementation fans out individual `embed`
    /// calls with bounded parallelism (typical fanout 4); backends with a
    /// native batch endpoint may override this.
    async fn embed_batch(
        &self,
        texts: &[String],
        action: EmbedAction,
    ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let futures: Vec<_> = texts.iter().map(|t| self.embed(t, action)).collect();
        let results: Vec<Result<Vec<f32>, EmbeddingError>> = stream::iter(futures)
            .buffered(DEFAULT_FANOUT)
            .collect()
            .await;
        results.into_iter().collect()
    }

    /// The fixed dimension this client produces, validated on every call.
    fn dimensions(&self) -> usize;
}

/// Wraps an `EmbeddingClient` with the process-local LRU cache keyed by
/// the exact input string (§4.1).
pub struct CachedEmbeddingClient {
    inner: Arc<dyn EmbeddingClient>,
    cache: TtlLru<String, Vec<f32>>,
}

impl CachedEmbeddingClient {
    pub fn new(inner: Arc<dyn EmbeddingClient>, capacity: usize) -> Self {
        Self { inner, cache: TtlLru::new(capacity, None) }
    }

    pub async fn embed(&self, text: &str, action: EmbedAction) -> Result<Vec<f32>, EmbeddingError> {
        if let Some(v) = self.cache.get(&text.to_string()) {
            return Ok(v);
        }
        let v = self.inner.embed(text, action).await?;
        self.cache.set(text.to_string(), v.clone());
        Ok(v)
    }

    pub async fn embed_batch(
        &self,
        texts: &[String],
        action: EmbedAction,
    ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut out: Vec<Option<Vec<f32>>> = Vec::with_capacity(texts.len());
        let mut to_fetch = Vec::new();
        let mut to_fetch_idx = Vec::new();
        for (i, t) in texts.iter().enumerate() {
            if let Some(v) = self.cache.get(t) {
                out.push(Some(v));
            } else {
                out.push(None);
                to_fetch.push(t.clone());
                to_fetch_idx.push(i);
            }
        }
        if !to_fetch.is_empty() {
            let fetched = self.inner.embed_batch(&to_fetch, action).await?;
            for (slot, v) in to_fetch_idx.into_iter().zip(fetched.into_iter()) {
                self.cache.set(texts[slot].clone(), v.clone());
                out[slot] = Some(v);
            }
        }
        Ok(out.into_iter().map(|v| v.expect("every slot filled above")).collect())
    }

    pub fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    pub fn cache_stats(&self) -> crate::cache::CacheStats {
        self.cache.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::mock::MockEmbeddingClient;

    #[tokio::test]
    async fn cached_client_hits_cache_on_repeat_text() {
        let mock = Arc::new(MockEmbeddingClient::new(4));
        let cached = CachedEmbeddingClient::new(mock, 10);
        let v1 = cached.embed("hello", EmbedAction::Add).await.unwrap();
        let v2 = cached.embed("hello", EmbedAction::Add).await.unwrap();
        assert_eq!(v1, v2);
        assert_eq!(cached.cache_stats().hits, 1);
    }

    #[tokio::test]
    async fn batch_embed_skips_cached_entries() {
        let mock = Arc::new(MockEmbeddingClient::new(4));
        let cached = CachedEmbeddingClient::new(mock, 10);
        cached.embed("a", EmbedAction::Add).await.unwrap();
        let batch = cached
            .embed_batch(&["a".to_string(), "b".to_string()], EmbedAction::Add)
            .await
            .unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(cached.cache_stats().hits, 1);
    }
}
