//! Conflict resolver (C6): three-level detection (digest, cosine, LLM
//! adjudication) over a candidate new memory against existing neighbors,
//! with a fixed resolution-action mapping.

use crate::cache::TtlLru;
use crate::llm::json_recovery::recover_json;
use crate::llm::{GenerateOptions, LlmClient, Message, UseCase};
use crate::types::{ConflictKind, ContradictionRecord, ResolutionAction};
use chrono::Utc;
use std::sync::Arc;

const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.95;
const DEFAULT_LLM_CACHE_CAPACITY: usize = 1000;

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// One existing memory considered against the candidate.
#[derive(Debug, Clone)]
pub struct ExistingMemory {
    pub id: String,
    pub data: String,
    pub hash: String,
    pub text_vector: Vec<f32>,
}

/// Outcome of adjudicating a candidate against one existing memory.
#[derive(Debug, Clone)]
pub struct Conflict {
    pub existing_id: String,
    pub kind: ConflictKind,
    pub confidence: f32,
    pub action: ResolutionAction,
    /// Present only for `complementary`, the merged text to write in place
    /// of the existing memory's data.
    pub merge_text: Option<String>,
}

#[derive(serde::Deserialize)]
struct LlmVerdict {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    confidence: f32,
    #[serde(default)]
    suggestion: Option<String>,
}

/// Three-level conflict detector over a candidate memory and its retrieved
/// neighbors.
pub struct ConflictResolver {
    llm: Arc<dyn LlmClient>,
    llm_cache: TtlLru<(String, String), LlmVerdictCached>,
    similarity_threshold: f32,
}

#[derive(Clone)]
struct LlmVerdictCached {
    kind: ConflictKind,
    confidence: f32,
}

impl ConflictResolver {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self {
            llm,
            llm_cache: TtlLru::new(DEFAULT_LLM_CACHE_CAPACITY, None),
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
        }
    }

    pub fn with_similarity_threshold(mut self, threshold: f32) -> Self {
        self.similarity_threshold = threshold;
        self
    }

    /// Detect conflicts between `new_data`/`new_vector` and each existing
    /// neighbor, applying the three-level cascade per neighbor.
    pub async fn detect(
        &self,
        new_data: &str,
        new_hash: &str,
        new_vector: &[f32],
        neighbors: &[ExistingMemory],
    ) -> Vec<Conflict> {
        let mut conflicts = Vec::with_capacity(neighbors.len());
        for existing in neighbors {
            if let Some(conflict) = self.detect_one(new_data, new_hash, new_vector, existing).await {
                conflicts.push(conflict);
            }
        }
        conflicts
    }

    async fn detect_one(
        &self,
        new_data: &str,
        new_hash: &str,
        new_vector: &[f32],
        existing: &ExistingMemory,
    ) -> Option<Conflict> {
        // Level 1: digest.
        if new_hash == existing.hash {
            return Some(Conflict {
                existing_id: existing.id.clone(),
                kind: ConflictKind::Duplicate,
                confidence: 1.0,
                action: ResolutionAction::Skip,
                merge_text: None,
            });
        }

        // Level 2: cosine.
        let similarity = cosine_similarity(new_vector, &existing.text_vector);
        if similarity < self.similarity_threshold {
            return None;
        }

        // Level 3: LLM adjudication, cached.
        let cache_key = (new_hash.to_string(), existing.hash.clone());
        let verdict = if let Some(cached) = self.llm_cache.get(&cache_key) {
            cached
        } else {
            let fresh = self.adjudicate(new_data, &existing.data).await;
            self.llm_cache.set(cache_key, fresh.clone());
            fresh
        };

        let action = ResolutionAction::from(verdict.kind);
        let merge_text = if verdict.kind == ConflictKind::Complementary {
            Some(self.merge(new_data, &existing.data).await)
        } else {
            None
        };

        Some(Conflict { existing_id: existing.id.clone(), kind: verdict.kind, confidence: verdict.confidence, action, merge_text })
    }

    /// Failure here degrades to `unrelated`/`keep_both`, logged not raised
    /// (§4.6 failure semantics).
    async fn adjudicate(&self, new_data: &str, existing_data: &str) -> LlmVerdictCached {
        let prompt = format!(
            "Compare these two memories and classify their relationship as one of: \
             duplicate, equivalent, contradictory, complementary, unrelated.\n\
             Respond with JSON: {{\"type\": string, \"confidence\": number, \"reasoning\": string, \"suggestion\": string}}.\n\n\
             Memory A (new): {new_data}\nMemory B (existing): {existing_data}"
        );
        let messages = [Message::system("You adjudicate conflicts between stored memories."), Message::user(&prompt)];
        let options = GenerateOptions::for_use_case(UseCase::Memory).json();

        let response = match self.llm.generate(&messages, &options).await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, "conflict adjudication LLM call failed; defaulting to unrelated");
                return LlmVerdictCached { kind: ConflictKind::Unrelated, confidence: 0.0 };
            }
        };

        match recover_json(&response).and_then(|v| serde_json::from_value::<LlmVerdict>(v).ok()) {
            Some(verdict) => LlmVerdictCached { kind: ConflictKind::from_tag(&verdict.kind), confidence: verdict.confidence },
            None => {
                tracing::warn!("conflict adjudication response unparsable; defaulting to unrelated");
                LlmVerdictCached { kind: ConflictKind::Unrelated, confidence: 0.0 }
            }
        }
    }

    async fn merge(&self, new_data: &str, existing_data: &str) -> String {
        let prompt = format!("Merge these two related memories into one concise statement:\n\nA: {new_data}\nB: {existing_data}");
        let messages = [Message::system("You merge complementary memories into one."), Message::user(&prompt)];
        let options = GenerateOptions::for_use_case(UseCase::Summary);
        self.llm.generate(&messages, &options).await.unwrap_or_else(|_| existing_data.to_string())
    }
}

/// Build the contradiction record written onto the existing memory's
/// metadata when `kind == Contradictory` (§4.6 supplement).
pub fn contradiction_record(new_data: &str) -> ContradictionRecord {
    ContradictionRecord::new(Utc::now(), new_data)
}
