//! Dual vector + relational store (C3): one HNSW index per modality
//! composed with a SQLite payload table, so a search is "ANN candidate
//! set, then payload fetch, then conjunctive filter" in one place.

pub mod memories;
pub mod vector;

pub use memories::{MemoryFilter, MemoryTable};
pub use vector::{VectorIndex, VectorIndexConfig, VectorIndexError};

use crate::error::{Error, Result};
use crate::types::Memory;
use std::path::Path;
use std::sync::Mutex;

/// A single fused result: the payload plus the ANN score that produced it.
#[derive(Debug, Clone)]
pub struct ScoredMemory {
    pub memory: Memory,
    pub score: f32,
}

/// Composes a text index, an optional vision index, and the payload table
/// into the full C3 contract.
pub struct MultimodalStore {
    text_index: Mutex<VectorIndex>,
    vision_index: Option<Mutex<VectorIndex>>,
    table: MemoryTable,
}

impl MultimodalStore {
    pub fn open(db_path: &Path, text_dims: usize, vision_dims: Option<usize>) -> Result<Self> {
        let text_index = VectorIndex::new(VectorIndexConfig::with_dimensions(text_dims)).map_err(Error::from)?;
        let vision_index = vision_dims
            .map(|d| VectorIndex::new(VectorIndexConfig::with_dimensions(d)).map_err(Error::from))
            .transpose()?
            .map(Mutex::new);
        let table = MemoryTable::open(db_path)?;
        Ok(Self { text_index: Mutex::new(text_index), vision_index, table })
    }

    pub fn open_in_memory(text_dims: usize, vision_dims: Option<usize>) -> Result<Self> {
        let text_index = VectorIndex::new(VectorIndexConfig::with_dimensions(text_dims)).map_err(Error::from)?;
        let vision_index = vision_dims
            .map(|d| VectorIndex::new(VectorIndexConfig::with_dimensions(d)).map_err(Error::from))
            .transpose()?
            .map(Mutex::new);
        let table = MemoryTable::open_in_memory()?;
        Ok(Self { text_index: Mutex::new(text_index), vision_index, table })
    }

    pub fn text_dimensions(&self) -> usize {
        self.text_index.lock().unwrap().dimensions()
    }

    pub fn insert(&self, memory: &Memory) -> Result<()> {
        self.text_index.lock().unwrap().upsert(&memory.id, &memory.text_vector).map_err(Error::from)?;
        if let Some(v) = &memory.vision_vector {
            let idx = self.vision_index.as_ref().ok_or_else(|| Error::Config("vision index not configured".into()))?;
            idx.lock().unwrap().upsert(&memory.id, v).map_err(Error::from)?;
        }
        self.table.insert(memory)?;
        Ok(())
    }

    /// Replace an existing memory's vector(s) and payload in one call,
    /// preserving whichever side's vector is unchanged.
    pub fn update(&self, memory: &Memory) -> Result<()> {
        self.text_index.lock().unwrap().upsert(&memory.id, &memory.text_vector).map_err(Error::from)?;
        if let Some(v) = &memory.vision_vector {
            if let Some(idx) = &self.vision_index {
                idx.lock().unwrap().upsert(&memory.id, v).map_err(Error::from)?;
            }
        }
        self.table.replace(memory)
    }

    /// Idempotent: deleting a missing id is not an error (§4.3).
    pub fn delete(&self, id: &str) -> Result<()> {
        self.text_index.lock().unwrap().remove(id).map_err(Error::from)?;
        if let Some(idx) = &self.vision_index {
            idx.lock().unwrap().remove(id).map_err(Error::from)?;
        }
        self.table.delete(id)
    }

    pub fn get(&self, id: &str) -> Result<Memory> {
        self.table.get(id)
    }

    pub fn list(&self, filter: &MemoryFilter, limit: usize) -> Result<Vec<Memory>> {
        self.table.list(filter, limit)
    }

    /// Search the text modality, returning payload-joined, filtered hits in
    /// strict score-then-id order.
    pub fn search_text(&self, query: &[f32], limit: usize, filter: &MemoryFilter) -> Result<Vec<ScoredMemory>> {
        let hits = self.text_index.lock().unwrap().search(query, limit * 4).map_err(Error::from)?;
        self.join_and_filter(hits, limit, filter)
    }

    /// Search the vision modality. Returns an empty list (not an error) if
    /// no vision index is configured.
    pub fn search_vision(&self, query: &[f32], limit: usize, filter: &MemoryFilter) -> Result<Vec<ScoredMemory>> {
        let Some(idx) = &self.vision_index else { return Ok(vec![]) };
        let hits = idx.lock().unwrap().search(query, limit * 4).map_err(Error::from)?;
        self.join_and_filter(hits, limit, filter)
    }

    fn join_and_filter(&self, hits: Vec<(String, f32)>, limit: usize, filter: &MemoryFilter) -> Result<Vec<ScoredMemory>> {
        let ids: Vec<String> = hits.iter().map(|(id, _)| id.clone()).collect();
        let rows = self.table.get_many(&ids)?;

        let mut scored: Vec<ScoredMemory> = hits
            .into_iter()
            .filter_map(|(id, score)| rows.get(&id).cloned().map(|memory| ScoredMemory { memory, score }))
            .collect();

        scored.retain(|sm| filter.matches(&sm.memory));
        scored.sort_by(|a, b| {
            b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal).then_with(|| a.memory.id.cmp(&b.memory.id))
        });
        scored.truncate(limit);
        Ok(scored)
    }

    pub fn scan_all(&self) -> Result<Vec<Memory>> {
        self.table.scan_all()
    }

    pub fn bump_access(&self, id: &str, at: chrono::DateTime<chrono::Utc>) -> Result<()> {
        self.table.bump_access(id, at)
    }

    pub fn set_tier(&self, id: &str, tier: crate::types::Tier) -> Result<()> {
        self.table.set_tier(id, tier)
    }

    pub fn reset(&self) -> Result<()> {
        self.text_index.lock().unwrap().reset();
        if let Some(idx) = &self.vision_index {
            idx.lock().unwrap().reset();
        }
        self.table.reset()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Category, MemoryMetadata, ScopeIds, Tier};

    fn sample(id: &str, vec: Vec<f32>) -> Memory {
        let now = chrono::Utc::now();
        Memory {
            id: id.to_string(),
            data: format!("memory {id}"),
            hash: Memory::digest(&format!("memory {id}")),
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
    fn insert_then_search_finds_closest() {
        let store = MultimodalStore::open_in_memory(8, None).unwrap();
        store.insert(&sample("a", vec![1.0; 8])).unwrap();
        store.insert(&sample("b", vec![-1.0; 8])).unwrap();

        let results = store.search_text(&[1.0; 8], 1, &MemoryFilter::default()).unwrap();
        assert_eq!(results[0].memory.id, "a");
    }

    #[test]
    fn delete_is_idempotent_and_removes_from_search() {
        let store = MultimodalStore::open_in_memory(4, None).unwrap();
        store.insert(&sample("a", vec![1.0; 4])).unwrap();
        store.delete("a").unwrap();
        store.delete("a").unwrap();
        assert!(matches!(store.get("a"), Err(Error::NotFound(_))));
    }

    #[test]
    fn search_vision_without_index_returns_empty_not_error() {
        let store = MultimodalStore::open_in_memory(4, None).unwrap();
        let results = store.search_vision(&[1.0; 4], 5, &MemoryFilter::default()).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn insert_without_vision_index_rejects_vision_vector() {
        let store = MultimodalStore::open_in_memory(4, None).unwrap();
        let mut m = sample("a", vec![1.0; 4]);
        m.vision_vector = Some(vec![1.0; 4]);
        assert!(store.insert(&m).is_err());
    }
}
