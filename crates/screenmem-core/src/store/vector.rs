//! HNSW ANN layer (usearch) over a single modality.
//!
//! Adapted from the teacher's `search/vector.rs`: string-key to u64-id
//! mapping, `reserve`-before-`add` capacity doubling, cosine distance
//! reported as `1.0 - distance` already satisfying the `[0,1]` score
//! contract. Payloads are never stored here; this type is purely the ANN
//! index, composed by [`super::MultimodalStore`] with the payload table.

use std::collections::HashMap;
use std::path::Path;
use usearch::{Index, IndexOptions, MetricKind, ScalarKind};

const DEFAULT_CONNECTIVITY: usize = 16;
const DEFAULT_EXPANSION_ADD: usize = 128;
const DEFAULT_EXPANSION_SEARCH: usize = 64;

#[non_exhaustive]
#[derive(Debug, Clone)]
pub enum VectorIndexError {
    IndexCreation(String),
    IndexAdd(String),
    IndexSearch(String),
    IndexPersistence(String),
    InvalidDimensions(usize, usize),
}

impl std::fmt::Display for VectorIndexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VectorIndexError::IndexCreation(e) => write!(f, "index creation failed: {e}"),
            VectorIndexError::IndexAdd(e) => write!(f, "failed to add vector: {e}"),
            VectorIndexError::IndexSearch(e) => write!(f, "search failed: {e}"),
            VectorIndexError::IndexPersistence(e) => write!(f, "persistence failed: {e}"),
            VectorIndexError::InvalidDimensions(expected, got) => {
                write!(f, "invalid dimensions: expected {expected}, got {got}")
            }
        }
    }
}

impl std::error::Error for VectorIndexError {}

impl From<VectorIndexError> for crate::error::Error {
    fn from(e: VectorIndexError) -> Self {
        match e {
            VectorIndexError::InvalidDimensions(expected, got) => crate::error::Error::Dimension { expected, got },
            other => crate::error::Error::Upstream(other.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct VectorIndexConfig {
    pub dimensions: usize,
    pub connectivity: usize,
    pub expansion_add: usize,
    pub expansion_search: usize,
}

impl VectorIndexConfig {
    pub fn with_dimensions(dimensions: usize) -> Self {
        Self {
            dimensions,
            connectivity: DEFAULT_CONNECTIVITY,
            expansion_add: DEFAULT_EXPANSION_ADD,
            expansion_search: DEFAULT_EXPANSION_SEARCH,
        }
    }
}

/// A single-modality HNSW index keyed by memory id.
pub struct VectorIndex {
    index: Index,
    config: VectorIndexConfig,
    key_to_id: HashMap<String, u64>,
    id_to_key: HashMap<u64, String>,
    next_id: u64,
}

impl VectorIndex {
    pub fn new(config: VectorIndexConfig) -> Result<Self, VectorIndexError> {
        let options = IndexOptions {
            dimensions: config.dimensions,
            metric: MetricKind::Cos,
            quantization: ScalarKind::I8,
            connectivity: config.connectivity,
            expansion_add: config.expansion_add,
            expansion_search: config.expansion_search,
            multi: false,
        };
        let index = Index::new(&options).map_err(|e| VectorIndexError::IndexCreation(e.to_string()))?;
        Ok(Self { index, config, key_to_id: HashMap::new(), id_to_key: HashMap::new(), next_id: 0 })
    }

    pub fn len(&self) -> usize {
        self.index.size()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dimensions(&self) -> usize {
        self.config.dimensions
    }

    pub fn contains(&self, key: &str) -> bool {
        self.key_to_id.contains_key(key)
    }

    fn reserve(&self, capacity: usize) -> Result<(), VectorIndexError> {
        self.index
            .reserve(capacity)
            .map_err(|e| VectorIndexError::IndexCreation(format!("failed to reserve capacity: {e}")))
    }

    /// Insert or, if `key` already exists, replace its vector.
    pub fn upsert(&mut self, key: &str, vector: &[f32]) -> Result<(), VectorIndexError> {
        if vector.len() != self.config.dimensions {
            return Err(VectorIndexError::InvalidDimensions(self.config.dimensions, vector.len()));
        }

        if let Some(&existing_id) = self.key_to_id.get(key) {
            self.index.remove(existing_id).map_err(|e| VectorIndexError::IndexAdd(e.to_string()))?;
            self.reserve(self.index.size() + 1)?;
            self.index.add(existing_id, vector).map_err(|e| VectorIndexError::IndexAdd(e.to_string()))?;
            return Ok(());
        }

        let current_capacity = self.index.capacity();
        let current_size = self.index.size();
        if current_size >= current_capacity {
            let new_capacity = std::cmp::max(current_capacity * 2, 16);
            self.reserve(new_capacity)?;
        }

        let id = self.next_id;
        self.next_id += 1;
        self.index.add(id, vector).map_err(|e| VectorIndexError::IndexAdd(e.to_string()))?;
        self.key_to_id.insert(key.to_string(), id);
        self.id_to_key.insert(id, key.to_string());
        Ok(())
    }

    /// Remove by key. Idempotent: removing a missing key is not an error.
    pub fn remove(&mut self, key: &str) -> Result<(), VectorIndexError> {
        if let Some(id) = self.key_to_id.remove(key) {
            self.id_to_key.remove(&id);
            self.index.remove(id).map_err(|e| VectorIndexError::IndexAdd(e.to_string()))?;
        }
        Ok(())
    }

    pub fn reset(&mut self) {
        let _ = self.index.reset();
        self.key_to_id.clear();
        self.id_to_key.clear();
        self.next_id = 0;
    }

    /// Search, returning `(key, score)` with `score` already normalized to
    /// `[0,1]` (`1.0 - cosine_distance`).
    pub fn search(&self, query: &[f32], limit: usize) -> Result<Vec<(String, f32)>, VectorIndexError> {
        if query.len() != self.config.dimensions {
            return Err(VectorIndexError::InvalidDimensions(self.config.dimensions, query.len()));
        }
        if self.is_empty() || limit == 0 {
            return Ok(vec![]);
        }

        let results = self.index.search(query, limit).map_err(|e| VectorIndexError::IndexSearch(e.to_string()))?;

        let mut out = Vec::with_capacity(results.keys.len());
        for (id, distance) in results.keys.iter().zip(results.distances.iter()) {
            if let Some(key) = self.id_to_key.get(id) {
                out.push((key.clone(), (1.0 - distance).clamp(0.0, 1.0)));
            }
        }
        Ok(out)
    }

    pub fn save(&self, path: &Path) -> Result<(), VectorIndexError> {
        let path_str = path.to_str().ok_or_else(|| VectorIndexError::IndexPersistence("invalid path".into()))?;
        self.index.save(path_str).map_err(|e| VectorIndexError::IndexPersistence(e.to_string()))?;

        let mappings_path = path.with_extension("mappings.json");
        let mappings = serde_json::json!({ "key_to_id": self.key_to_id, "next_id": self.next_id });
        let mappings_str =
            serde_json::to_string(&mappings).map_err(|e| VectorIndexError::IndexPersistence(e.to_string()))?;
        std::fs::write(&mappings_path, mappings_str).map_err(|e| VectorIndexError::IndexPersistence(e.to_string()))?;
        Ok(())
    }

    pub fn load(path: &Path, config: VectorIndexConfig) -> Result<Self, VectorIndexError> {
        let path_str = path.to_str().ok_or_else(|| VectorIndexError::IndexPersistence("invalid path".into()))?;
        let options = IndexOptions {
            dimensions: config.dimensions,
            metric: MetricKind::Cos,
            quantization: ScalarKind::I8,
            connectivity: config.connectivity,
            expansion_add: config.expansion_add,
            expansion_search: config.expansion_search,
            multi: false,
        };
        let index = Index::new(&options).map_err(|e| VectorIndexError::IndexCreation(e.to_string()))?;
        index.load(path_str).map_err(|e| VectorIndexError::IndexPersistence(e.to_string()))?;

        let mappings_path = path.with_extension("mappings.json");
        let mappings_str =
            std::fs::read_to_string(&mappings_path).map_err(|e| VectorIndexError::IndexPersistence(e.to_string()))?;
        let mappings: serde_json::Value =
            serde_json::from_str(&mappings_str).map_err(|e| VectorIndexError::IndexPersistence(e.to_string()))?;
        let key_to_id: HashMap<String, u64> = serde_json::from_value(mappings["key_to_id"].clone())
            .map_err(|e| VectorIndexError::IndexPersistence(e.to_string()))?;
        let next_id = mappings["next_id"]
            .as_u64()
            .ok_or_else(|| VectorIndexError::IndexPersistence("invalid next_id".into()))?;
        let id_to_key = key_to_id.iter().map(|(k, &v)| (v, k.clone())).collect();

        Ok(Self { index, config, key_to_id, id_to_key, next_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vec_for(seed: f32, dims: usize) -> Vec<f32> {
        (0..dims).map(|i| ((i as f32 + seed) / dims as f32).sin()).collect()
    }

    #[test]
    fn upsert_then_search_finds_self_first() {
        let mut idx = VectorIndex::new(VectorIndexConfig::with_dimensions(32)).unwrap();
        idx.upsert("a", &vec_for(1.0, 32)).unwrap();
        idx.upsert("b", &vec_for(50.0, 32)).unwrap();

        let results = idx.search(&vec_for(1.0, 32), 2).unwrap();
        assert_eq!(results[0].0, "a");
    }

    #[test]
    fn remove_is_idempotent() {
        let mut idx = VectorIndex::new(VectorIndexConfig::with_dimensions(16)).unwrap();
        idx.upsert("a", &vec_for(1.0, 16)).unwrap();
        idx.remove("a").unwrap();
        assert!(!idx.contains("a"));
        idx.remove("a").unwrap();
    }

    #[test]
    fn dimension_mismatch_is_rejected() {
        let mut idx = VectorIndex::new(VectorIndexConfig::with_dimensions(16)).unwrap();
        let err = idx.upsert("a", &[1.0, 2.0]).unwrap_err();
        assert!(matches!(err, VectorIndexError::InvalidDimensions(16, 2)));
    }
}
