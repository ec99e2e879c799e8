//! The `Memory` record itself and its metadata bag.

use super::{Category, ExtraMetadata, ScopeIds, Tier};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Recognized, typed metadata fields plus a catch-all for caller-supplied
/// scalars (§3 supplement: the original threads a fixed set of scalar keys
/// through every memory's payload).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryMetadata {
    /// User explicitly marked this memory important (consulted by C5).
    #[serde(default)]
    pub important: bool,
    /// User starred this memory (consulted by C5, equivalent weight to
    /// `important`).
    #[serde(default)]
    pub starred: bool,
    /// User pinned this memory (consulted by C5, equivalent weight to
    /// `important`).
    #[serde(default)]
    pub pinned: bool,
    /// Extracted named entities, consulted by C5's richness term and by
    /// the optional graph fan-out.
    #[serde(default)]
    pub entities: Vec<String>,
    /// OCR text captured alongside a screenshot, if any (richness signal).
    #[serde(default)]
    pub ocr_text: Option<String>,
    /// Structured frame details (richness signal).
    #[serde(default)]
    pub frame_details: Option<serde_json::Value>,
    /// Marks a memory created via the procedural-memory special case.
    #[serde(default)]
    pub memory_type: Option<String>,
    /// Written by C6's level-3 resolution when a contradictory conflict is
    /// detected against this memory.
    #[serde(default)]
    pub contradiction: Option<super::ContradictionRecord>,
    /// Written by C7's compression step.
    #[serde(default)]
    pub compressed_at: Option<DateTime<Utc>>,
    /// Written by C7's compression step: length of the pre-compression
    /// content.
    #[serde(default)]
    pub original_length: Option<usize>,
    /// Caller-supplied scalars with no recognized meaning to the system.
    #[serde(default)]
    pub extra: ExtraMetadata,
}

impl MemoryMetadata {
    /// True if any of the three user-mark flags is set (C5's user-mark
    /// term).
    pub fn user_marked(&self) -> bool {
        self.important || self.starred || self.pinned
    }

    /// True if any richness-signaling structured field is present (C5's
    /// richness bonus).
    pub fn has_structured_signal(&self) -> bool {
        self.ocr_text.is_some()
            || self.frame_details.is_some()
            || !self.entities.is_empty()
            || self.extra.keys().any(|k| {
                matches!(k.as_str(), "code" | "data" | "json" | "structured")
            })
    }
}

/// The unit of storage (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    /// Opaque UUID, assigned on creation, immutable.
    pub id: String,
    /// Canonical natural-language form of the memory.
    pub data: String,
    /// Content digest of `data` (I1).
    pub hash: String,
    /// Fixed-dim text embedding (required, I2).
    pub text_vector: Vec<f32>,
    /// Fixed-dim vision embedding, present only when an image was encoded
    /// alongside this memory (I2).
    pub vision_vector: Option<Vec<f32>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Monotonic non-negative; incremented on retrieval hit.
    pub access_count: u64,
    pub tier: Tier,
    /// Last computed importance score, `[0,1]`.
    pub importance_score: f32,
    /// True after LLM summarization has replaced `data`.
    pub compressed: bool,
    pub scope_ids: ScopeIds,
    pub category: Category,
    pub actor_id: Option<String>,
    pub role: Option<String>,
    pub metadata: MemoryMetadata,
}

impl Memory {
    /// Compute the content digest used for I1 and level-1 conflict
    /// detection.
    pub fn digest(data: &str) -> String {
        use md5::{Digest, Md5};
        let mut hasher = Md5::new();
        hasher.update(data.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Check invariant I1: `hash == digest(data)`.
    pub fn hash_is_consistent(&self) -> bool {
        self.hash == Self::digest(&self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_deterministic() {
        assert_eq!(Memory::digest("hello"), Memory::digest("hello"));
        assert_ne!(Memory::digest("hello"), Memory::digest("world"));
    }

    #[test]
    fn user_marked_checks_all_three_flags() {
        let mut m = MemoryMetadata::default();
        assert!(!m.user_marked());
        m.starred = true;
        assert!(m.user_marked());
    }

    #[test]
    fn structured_signal_detects_entities_and_extra_keys() {
        let mut m = MemoryMetadata::default();
        assert!(!m.has_structured_signal());
        m.entities.push("Alice".into());
        assert!(m.has_structured_signal());

        let mut m2 = MemoryMetadata::default();
        m2.extra.insert("code".into(), serde_json::json!("fn main() {}"));
        assert!(m2.has_structured_signal());
    }
}
