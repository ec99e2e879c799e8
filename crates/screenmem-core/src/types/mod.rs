//! Core data model: memories, history events, tiers, categories, and the
//! action/conflict vocabulary the ingestion planner and conflict resolver
//! speak in.

mod memory;

pub use memory::{Memory, MemoryMetadata};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A memory's position in the three-tier lifecycle pyramid, in decreasing
/// importance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Highest importance / most recently or frequently accessed.
    Working,
    /// Middle tier.
    ShortTerm,
    /// Lowest tier; candidate for compression.
    LongTerm,
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Tier::Working => write!(f, "working"),
            Tier::ShortTerm => write!(f, "short_term"),
            Tier::LongTerm => write!(f, "long_term"),
        }
    }
}

impl std::str::FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "working" => Ok(Tier::Working),
            "short_term" => Ok(Tier::ShortTerm),
            "long_term" => Ok(Tier::LongTerm),
            other => Err(format!("unknown tier: {other}")),
        }
    }
}

/// Category of a memory's content. Only the enumerated set has importance
/// scoring weights (§4.5); anything else falls back to `General`'s weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Fact,
    Procedure,
    Code,
    Task,
    Concept,
    Document,
    Question,
    Conversation,
    Greeting,
    General,
    Image,
    Video,
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Category::Fact => "fact",
            Category::Procedure => "procedure",
            Category::Code => "code",
            Category::Task => "task",
            Category::Concept => "concept",
            Category::Document => "document",
            Category::Question => "question",
            Category::Conversation => "conversation",
            Category::Greeting => "greeting",
            Category::General => "general",
            Category::Image => "image",
            Category::Video => "video",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "fact" => Ok(Category::Fact),
            "procedure" => Ok(Category::Procedure),
            "code" => Ok(Category::Code),
            "task" => Ok(Category::Task),
            "concept" => Ok(Category::Concept),
            "document" => Ok(Category::Document),
            "question" => Ok(Category::Question),
            "conversation" => Ok(Category::Conversation),
            "greeting" => Ok(Category::Greeting),
            "general" => Ok(Category::General),
            "image" => Ok(Category::Image),
            "video" => Ok(Category::Video),
            other => Err(format!("unknown category: {other}")),
        }
    }
}

impl Default for Category {
    fn default() -> Self {
        Category::General
    }
}

/// Scope keys a memory may carry; every memory carries at least one (I6).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeIds {
    pub user_id: Option<String>,
    pub agent_id: Option<String>,
    pub run_id: Option<String>,
}

impl ScopeIds {
    /// True if at least one scope id is present (I6).
    pub fn is_valid(&self) -> bool {
        self.user_id.is_some() || self.agent_id.is_some() || self.run_id.is_some()
    }
}

/// The kind of a history row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventKind {
    Add,
    Update,
    Delete,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventKind::Add => write!(f, "ADD"),
            EventKind::Update => write!(f, "UPDATE"),
            EventKind::Delete => write!(f, "DELETE"),
        }
    }
}

impl std::str::FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "ADD" => Ok(EventKind::Add),
            "UPDATE" => Ok(EventKind::Update),
            "DELETE" => Ok(EventKind::Delete),
            other => Err(format!("unknown event kind: {other}")),
        }
    }
}

/// An append-only history row (§3 "History event").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEvent {
    pub event_id: String,
    pub memory_id: String,
    pub old_data: Option<String>,
    pub new_data: Option<String>,
    pub event_kind: EventKind,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: Option<chrono::DateTime<chrono::Utc>>,
    pub is_deleted: bool,
    pub actor_id: Option<String>,
    pub role: Option<String>,
}

/// The ingestion planner's action vocabulary (§9 tagged-variant modeling).
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Add { text: String },
    Update { index: usize, text: String, old: Option<String> },
    Delete { index: usize },
    Noop,
}

/// The conflict resolver's classification vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    Duplicate,
    Equivalent,
    Contradictory,
    Complementary,
    Unrelated,
}

impl ConflictKind {
    /// Parse from the LLM's free-form classification tag, defaulting to
    /// `Unrelated` for anything unrecognized (failure semantics, §4.6).
    pub fn from_tag(tag: &str) -> Self {
        match tag.to_ascii_lowercase().as_str() {
            "duplicate" => ConflictKind::Duplicate,
            "equivalent" => ConflictKind::Equivalent,
            "contradictory" => ConflictKind::Contradictory,
            "complementary" => ConflictKind::Complementary,
            _ => ConflictKind::Unrelated,
        }
    }
}

/// The resolution action a conflict kind maps to (§4.6 table).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionAction {
    Skip,
    SkipBumpAccess,
    MarkConflict,
    Merge,
    KeepBoth,
}

impl From<ConflictKind> for ResolutionAction {
    fn from(kind: ConflictKind) -> Self {
        match kind {
            ConflictKind::Duplicate => ResolutionAction::Skip,
            ConflictKind::Equivalent => ResolutionAction::SkipBumpAccess,
            ConflictKind::Contradictory => ResolutionAction::MarkConflict,
            ConflictKind::Complementary => ResolutionAction::Merge,
            ConflictKind::Unrelated => ResolutionAction::KeepBoth,
        }
    }
}

/// A contradiction record written onto the existing memory's metadata when
/// a contradictory conflict is detected (§4.6, supplemented by
/// `conflict_resolver.py`'s record shape).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContradictionRecord {
    pub detected_at: chrono::DateTime<chrono::Utc>,
    pub conflicting_preview: String,
}

impl ContradictionRecord {
    /// Build a record previewing the first 100 chars of `conflicting_text`.
    pub fn new(now: chrono::DateTime<chrono::Utc>, conflicting_text: &str) -> Self {
        let preview: String = conflicting_text.chars().take(100).collect();
        Self { detected_at: now, conflicting_preview: preview }
    }
}

/// Free-form scalar metadata bag, used where a caller-supplied key has no
/// recognized meaning to the system.
pub type ExtraMetadata = HashMap<String, serde_json::Value>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_round_trips_through_display_and_fromstr() {
        for t in [Tier::Working, Tier::ShortTerm, Tier::LongTerm] {
            let s = t.to_string();
            assert_eq!(s.parse::<Tier>().unwrap(), t);
        }
    }

    #[test]
    fn scope_ids_requires_at_least_one() {
        assert!(!ScopeIds::default().is_valid());
        let s = ScopeIds { user_id: Some("u1".into()), ..Default::default() };
        assert!(s.is_valid());
    }

    #[test]
    fn conflict_kind_defaults_to_unrelated_on_garbage() {
        assert_eq!(ConflictKind::from_tag("banana"), ConflictKind::Unrelated);
        assert_eq!(ConflictKind::from_tag("Duplicate"), ConflictKind::Duplicate);
    }

    #[test]
    fn contradiction_record_truncates_preview() {
        let long = "x".repeat(200);
        let rec = ContradictionRecord::new(chrono::Utc::now(), &long);
        assert_eq!(rec.conflicting_preview.chars().count(), 100);
    }
}

impl Tier {
    /// Ordering used by the promotion/demotion rules: Working > ShortTerm >
    /// LongTerm.
    pub fn rank(&self) -> u8 {
        match self {
            Tier::Working => 2,
            Tier::ShortTerm => 1,
            Tier::LongTerm => 0,
        }
    }
}
