//! Deterministic in-process embedding provider for tests, mirroring the
//! original's `mock.py` provider so callers don't need a live Ollama
//! server to exercise C1's contract.

use super::{EmbedAction, EmbeddingClient, EmbeddingError};
use async_trait::async_trait;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Produces a deterministic pseudo-embedding from a hash of the input text,
/// so that identical text always yields an identical vector and distinct
/// text yields distinct (if not semantically meaningful) vectors.
pub struct MockEmbeddingClient {
    dims: usize,
}

impl MockEmbeddingClient {
    pub fn new(dims: usize) -> Self {
        Self { dims }
    }
}

#[async_trait]
impl EmbeddingClient for MockEmbeddingClient {
    async fn embed(&self, text: &str, _action: EmbedAction) -> Result<Vec<f32>, EmbeddingError> {
        let mut hasher = DefaultHasher::new();
        text.hash(&mut hasher);
        let seed = hasher.finish();
        let mut vector = Vec::with_capacity(self.dims);
        let mut state = seed;
        for _ in 0..self.dims {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let v = ((state >> 33) as f64 / u32::MAX as f64) * 2.0 - 1.0;
            vector.push(v as f32);
        }
        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        Ok(vector)
    }

    fn dimensions(&self) -> usize {
        self.dims
    }
}
