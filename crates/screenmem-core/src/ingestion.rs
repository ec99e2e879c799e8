//! Ingestion pipeline (C9): the write path from raw role-tagged messages to
//! ADD/UPDATE/DELETE memory actions. The non-inferring path embeds and
//! writes directly; the inferring path runs facts through an LLM-driven
//! extraction and update-planning stage first.
//!
//! Short messages skip fact extraction entirely and fall through to the
//! non-inferring path (`is_short_circuit`). This trades a small chance of
//! missing a fact buried in a short message for avoiding an LLM round trip
//! on the overwhelming majority of short inputs, which are greetings or
//! commands, not facts.

use crate::config::ApiVersion;
use crate::conflict::{ConflictResolver, ExistingMemory};
use crate::embeddings::{EmbedAction, EmbeddingClient};
use crate::error::{Error, Result};
use crate::history::HistoryLog;
use crate::importance;
use crate::llm::json_recovery::recover_json;
use crate::llm::{GenerateOptions, LlmClient, Message, UseCase};
use crate::store::{MemoryFilter, MultimodalStore};
use crate::types::{Action, Category, EventKind, Memory, MemoryMetadata, ScopeIds};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

const SHORT_CIRCUIT_MAX_LEN: usize = 50;
const SHORT_CIRCUIT_PREFIXES: [&str; 4] = ["!", "?", "/", "http"];
const NEIGHBOR_PROBE_LIMIT: usize = 5;

/// One role-tagged input turn.
#[derive(Debug, Clone)]
pub struct IngestMessage {
    pub role: String,
    pub content: String,
}

impl IngestMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".into(), content: content.into() }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".into(), content: content.into() }
    }
}

/// One applied (or no-op) action, returned to the caller.
#[derive(Debug, Clone)]
pub struct ActionRecord {
    pub id: String,
    pub memory: Option<String>,
    pub event: EventKind,
    pub previous_memory: Option<String>,
}

/// The versioned return shape (§4.9 stage 10).
#[derive(Debug, Clone)]
pub enum IngestResult {
    V1_1 { results: Vec<ActionRecord> },
    V1_0 { results: Vec<ActionRecord>, deprecation_notice: &'static str },
}

impl IngestResult {
    pub fn records(&self) -> &[ActionRecord] {
        match self {
            IngestResult::V1_1 { results } => results,
            IngestResult::V1_0 { results, .. } => results,
        }
    }
}

/// Published after every successful apply, so collaborators that need to
/// react to writes (the hybrid retriever's cache, the tiered manager) don't
/// require the pipeline to hold a direct reference to them.
#[derive(Debug, Clone)]
pub struct MemoryEvent {
    pub id: String,
    pub kind: EventKind,
}

fn is_short_circuit(content: &str) -> bool {
    let trimmed = content.trim();
    trimmed.chars().count() < SHORT_CIRCUIT_MAX_LEN
        || trimmed.lines().count() < 2
        || SHORT_CIRCUIT_PREFIXES.iter().any(|p| trimmed.starts_with(p))
}

#[derive(serde::Deserialize)]
struct FactsResponse {
    #[serde(default)]
    facts: Vec<String>,
}

#[derive(serde::Deserialize)]
struct RawPlanEntry {
    id: String,
    text: String,
    event: String,
    #[serde(default)]
    old_memory: Option<String>,
}

#[derive(serde::Deserialize)]
struct PlanResponse {
    memory: Vec<RawPlanEntry>,
}

/// Rewrite an UPDATE/DELETE that names an id outside the known neighbor
/// index to an ADD of its text, mitigating LLM UUID hallucination (§4.9
/// stage 7).
fn repair_hallucination(entry: RawPlanEntry, known_count: usize) -> Action {
    match entry.event.to_ascii_uppercase().as_str() {
        "ADD" => Action::Add { text: entry.text },
        "NONE" => Action::Noop,
        "UPDATE" => match entry.id.parse::<usize>() {
            Ok(index) if index < known_count => Action::Update { index, text: entry.text, old: entry.old_memory },
            _ => Action::Add { text: entry.text },
        },
        "DELETE" => match entry.id.parse::<usize>() {
            Ok(index) if index < known_count => Action::Delete { index },
            _ => Action::Add { text: entry.text },
        },
        _ => Action::Noop,
    }
}

/// Owns the store, history log, embedder, and LLM collaborators; publishes
/// write events rather than holding the tiered manager or retriever
/// directly (§9's cyclic-ownership guidance).
pub struct IngestionPipeline {
    store: Arc<MultimodalStore>,
    history: Arc<HistoryLog>,
    embedder: Arc<dyn EmbeddingClient>,
    llm: Arc<dyn LlmClient>,
    conflicts: ConflictResolver,
    api_version: ApiVersion,
    working_enabled: bool,
    events: tokio::sync::broadcast::Sender<MemoryEvent>,
}

impl IngestionPipeline {
    pub fn new(
        store: Arc<MultimodalStore>,
        history: Arc<HistoryLog>,
        embedder: Arc<dyn EmbeddingClient>,
        llm: Arc<dyn LlmClient>,
        api_version: ApiVersion,
        working_enabled: bool,
    ) -> Self {
        let (events, _) = tokio::sync::broadcast::channel(256);
        Self {
            store,
            history,
            embedder,
            conflicts: ConflictResolver::new(llm.clone()),
            llm,
            api_version,
            working_enabled,
            events,
        }
    }

    /// Subscribe to memory write events; lagging subscribers simply miss
    /// older events (broadcast semantics), acceptable for cache
    /// invalidation and best-effort tier bookkeeping.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<MemoryEvent> {
        self.events.subscribe()
    }

    fn publish(&self, id: &str, kind: EventKind) {
        let _ = self.events.send(MemoryEvent { id: id.to_string(), kind });
    }

    /// Entry point. `scope_ids` must carry at least one of user/agent/run
    /// (`Error::Scope` otherwise); `memory_type="procedural"` takes the
    /// dedicated summarization path instead of fact extraction.
    pub async fn add(
        &self,
        messages: &[IngestMessage],
        scope_ids: ScopeIds,
        metadata: MemoryMetadata,
        infer: bool,
        memory_type: Option<&str>,
        actor_id: Option<&str>,
    ) -> Result<IngestResult> {
        if !scope_ids.is_valid() {
            return Err(Error::Scope);
        }

        let filter = MemoryFilter {
            user_id: scope_ids.user_id.clone(),
            agent_id: scope_ids.agent_id.clone(),
            run_id: scope_ids.run_id.clone(),
            tier: None,
            category: None,
        };

        let records = if memory_type == Some("procedural") {
            vec![self.add_procedural(messages, &scope_ids, &metadata, actor_id).await?]
        } else if !infer {
            self.add_non_inferring(messages, &scope_ids, &metadata, Category::General, actor_id).await?
        } else {
            self.add_inferring(messages, &scope_ids, &metadata, &filter, actor_id).await?
        };

        Ok(self.wrap(records))
    }

    /// Non-inferring add tagged with an explicit category, bypassing the
    /// default `general` tag `add()` uses — the router's `task` dispatch
    /// rule needs `category=task` on the stored memory.
    pub async fn add_with_category(
        &self,
        messages: &[IngestMessage],
        scope_ids: ScopeIds,
        metadata: MemoryMetadata,
        category: Category,
        actor_id: Option<&str>,
    ) -> Result<IngestResult> {
        if !scope_ids.is_valid() {
            return Err(Error::Scope);
        }
        let records = self.add_non_inferring(messages, &scope_ids, &metadata, category, actor_id).await?;
        Ok(self.wrap(records))
    }

    fn wrap(&self, results: Vec<ActionRecord>) -> IngestResult {
        match self.api_version {
            ApiVersion::V1_1 => IngestResult::V1_1 { results },
            ApiVersion::V1_0 => IngestResult::V1_0 {
                results,
                deprecation_notice: "bare-list responses are deprecated; request api_version \"v1.1\" to receive {\"results\": [...]}",
            },
        }
    }

    fn new_memory(&self, data: String, scope_ids: &ScopeIds, metadata: &MemoryMetadata, category: Category, role: Option<String>, actor_id: Option<&str>, vector: Vec<f32>, now: DateTime<Utc>) -> Memory {
        let score = importance::score(&data, metadata, category, 0, now, now);
        Memory {
            id: Uuid::new_v4().to_string(),
            hash: Memory::digest(&data),
            data,
            text_vector: vector,
            vision_vector: None,
            created_at: now,
            updated_at: now,
            access_count: 0,
            tier: importance::initial_tier(score, self.working_enabled),
            importance_score: score,
            compressed: false,
            scope_ids: scope_ids.clone(),
            category,
            actor_id: actor_id.map(String::from),
            role,
            metadata: metadata.clone(),
        }
    }

    /// Low-latency path: one embed and one ADD per non-system message, no
    /// LLM call. Used for raw capture frames and whenever `infer=false`.
    async fn add_non_inferring(&self, messages: &[IngestMessage], scope_ids: &ScopeIds, metadata: &MemoryMetadata, category: Category, actor_id: Option<&str>) -> Result<Vec<ActionRecord>> {
        let mut records = Vec::with_capacity(messages.len());
        for message in messages.iter().filter(|m| m.role != "system") {
            let vector = self.embedder.embed(&message.content, EmbedAction::Add).await.map_err(Error::from)?;
            let memory = self.new_memory(message.content.clone(), scope_ids, metadata, category, Some(message.role.clone()), actor_id, vector, Utc::now());
            self.store.insert(&memory)?;
            self.history.add_history(&memory.id, None, Some(&memory.data), EventKind::Add, actor_id, Some(&message.role), false)?;
            self.publish(&memory.id, EventKind::Add);
            records.push(ActionRecord { id: memory.id, memory: Some(memory.data), event: EventKind::Add, previous_memory: None });
        }
        Ok(records)
    }

    async fn add_procedural(&self, messages: &[IngestMessage], scope_ids: &ScopeIds, metadata: &MemoryMetadata, actor_id: Option<&str>) -> Result<ActionRecord> {
        let transcript = messages.iter().map(|m| format!("{}: {}", m.role, m.content)).collect::<Vec<_>>().join("\n");
        let prompt_messages = [
            Message::system("Summarize this sequence of actions into a single concise procedural memory describing the steps taken, in order."),
            Message::user(&transcript),
        ];
        let options = GenerateOptions::for_use_case(UseCase::Memory);
        let summary = self.llm.generate(&prompt_messages, &options).await.map_err(Error::from)?;

        let vector = self.embedder.embed(&summary, EmbedAction::Add).await.map_err(Error::from)?;
        let mut procedural_metadata = metadata.clone();
        procedural_metadata.memory_type = Some("procedural".into());
        let memory = self.new_memory(summary.clone(), scope_ids, &procedural_metadata, Category::Procedure, None, actor_id, vector, Utc::now());

        self.store.insert(&memory)?;
        self.history.add_history(&memory.id, None, Some(&memory.data), EventKind::Add, actor_id, None, false)?;
        self.publish(&memory.id, EventKind::Add);
        Ok(ActionRecord { id: memory.id, memory: Some(summary), event: EventKind::Add, previous_memory: None })
    }

    async fn add_inferring(&self, messages: &[IngestMessage], scope_ids: &ScopeIds, metadata: &MemoryMetadata, filter: &MemoryFilter, actor_id: Option<&str>) -> Result<Vec<ActionRecord>> {
        let content = messages.iter().filter(|m| m.role != "system").map(|m| m.content.clone()).collect::<Vec<_>>().join("\n");

        // Stage 1: short-circuit.
        if is_short_circuit(&content) {
            return self.add_non_inferring(messages, scope_ids, metadata, Category::General, actor_id).await;
        }

        // Stage 2: fact extraction.
        let facts = self.extract_facts(&content).await;
        if facts.is_empty() {
            return Ok(Vec::new());
        }

        // Stage 3: batch embed candidate facts.
        let fact_vectors = self.embedder.embed_batch(&facts, EmbedAction::Add).await.map_err(Error::from)?;

        // Stage 4: neighbor probe with dedup across facts.
        let mut neighbors: HashMap<String, ExistingMemory> = HashMap::new();
        for vector in &fact_vectors {
            let hits = self.store.search_text(vector, NEIGHBOR_PROBE_LIMIT, filter)?;
            for hit in hits {
                neighbors.entry(hit.memory.id.clone()).or_insert_with(|| ExistingMemory {
                    id: hit.memory.id.clone(),
                    data: hit.memory.data.clone(),
                    hash: hit.memory.hash.clone(),
                    text_vector: hit.memory.text_vector.clone(),
                });
            }
        }
        let neighbor_list: Vec<ExistingMemory> = neighbors.values().cloned().collect();

        // A hash-level duplicate of an already-stored neighbor is resolved
        // locally (Skip) rather than spent on the update-planner LLM call.
        // A contradictory conflict is marked on the existing memory here too,
        // regardless of whether the fact itself proceeds to the planner.
        let mut facts_to_plan = Vec::with_capacity(facts.len());
        for (fact, vector) in facts.iter().zip(fact_vectors.iter()) {
            let fact_hash = Memory::digest(fact);
            let conflicts = self.conflicts.detect(fact, &fact_hash, vector, &neighbor_list).await;
            let is_duplicate = conflicts.iter().any(|c| c.kind == crate::types::ConflictKind::Duplicate);
            for conflict in conflicts.iter().filter(|c| c.kind == crate::types::ConflictKind::Contradictory) {
                self.mark_contradiction(&conflict.existing_id, fact);
            }
            if !is_duplicate {
                facts_to_plan.push(fact.clone());
            }
        }
        if facts_to_plan.is_empty() {
            return Ok(Vec::new());
        }

        // Stage 5: numerically-indexed conflict survey, UUID map kept locally.
        let mut index_to_id: Vec<String> = Vec::with_capacity(neighbor_list.len());
        let mut indexed_lines = Vec::with_capacity(neighbor_list.len());
        for existing in &neighbor_list {
            indexed_lines.push(format!("{}: {}", index_to_id.len(), existing.data));
            index_to_id.push(existing.id.clone());
        }

        // Stage 6: update planner.
        let planned = self.plan_updates(&facts_to_plan, &indexed_lines).await;

        // Stage 7 + 8: hallucination repair, apply in array order.
        let mut records = Vec::with_capacity(planned.len());
        for entry in planned {
            let action = repair_hallucination(entry, index_to_id.len());
            if let Some(record) = self.apply_action(action, &index_to_id, scope_ids, metadata, actor_id).await? {
                records.push(record);
            }
        }

        // Stage 9: optional graph fan-out, never blocks the main path.
        #[cfg(feature = "graph")]
        graph::fan_out(facts);

        Ok(records)
    }

    /// Failure here (HTTP error or unparsable response) degrades to an
    /// empty fact list, never raised to the caller.
    async fn extract_facts(&self, content: &str) -> Vec<String> {
        let messages = [
            Message::system(r#"Extract discrete, atomic facts from the following content. Respond with JSON: {"facts": [string, ...]}."#),
            Message::user(content),
        ];
        let options = GenerateOptions::for_use_case(UseCase::Memory).json();
        let response = match self.llm.generate(&messages, &options).await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, "fact extraction LLM call failed; treating as no facts");
                return Vec::new();
            }
        };
        match recover_json(&response).and_then(|v| serde_json::from_value::<FactsResponse>(v).ok()) {
            Some(parsed) => parsed.facts,
            None => {
                tracing::warn!("fact extraction response unparsable; treating as no facts");
                Vec::new()
            }
        }
    }

    /// Failure here falls back to ADDing every fact verbatim, never raised
    /// to the caller.
    async fn plan_updates(&self, facts: &[String], indexed_neighbors: &[String]) -> Vec<RawPlanEntry> {
        let fallback = || facts.iter().map(|f| RawPlanEntry { id: String::new(), text: f.clone(), event: "ADD".into(), old_memory: None }).collect();

        let facts_block = facts.iter().map(|f| format!("- {f}")).collect::<Vec<_>>().join("\n");
        let neighbors_block = if indexed_neighbors.is_empty() { "(none)".to_string() } else { indexed_neighbors.join("\n") };
        let prompt = format!(
            "New facts:\n{facts_block}\n\nExisting memories (indexed):\n{neighbors_block}\n\n\
             For each new fact decide one action: ADD a new memory, UPDATE an existing indexed \
             memory, DELETE an existing indexed memory it supersedes, or NONE. Respond with JSON: \
             {{\"memory\": [{{\"id\": string, \"text\": string, \"event\": \"ADD\"|\"UPDATE\"|\"DELETE\"|\"NONE\", \"old_memory\": string|null}}]}}. \
             For UPDATE/DELETE, \"id\" is the existing memory's index from the list above, as a string."
        );
        let messages = [Message::system("You plan memory updates from newly extracted facts."), Message::user(&prompt)];
        let options = GenerateOptions::for_use_case(UseCase::Memory).json();

        let response = match self.llm.generate(&messages, &options).await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, "update planner LLM call failed; adding every fact verbatim");
                return fallback();
            }
        };

        match recover_json(&response).and_then(|v| serde_json::from_value::<PlanResponse>(v).ok()) {
            Some(plan) => plan.memory,
            None => {
                tracing::warn!("update planner response unparsable; adding every fact verbatim");
                fallback()
            }
        }
    }

    /// Write a contradiction record onto the existing memory's metadata
    /// (§4.6 supplement); best-effort, a lookup/write failure is logged and
    /// otherwise ignored since it never blocks the new fact's own action.
    fn mark_contradiction(&self, existing_id: &str, new_fact: &str) {
        let mut existing = match self.store.get(existing_id) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(memory_id = %existing_id, error = %e, "contradiction target not found");
                return;
            }
        };
        existing.metadata.contradiction = Some(crate::conflict::contradiction_record(new_fact));
        existing.updated_at = Utc::now();
        if let Err(e) = self.store.update(&existing) {
            tracing::warn!(memory_id = %existing_id, error = %e, "failed to persist contradiction marker");
        }
    }

    /// Apply one planned action; `Noop` yields no record, per stage 8.
    async fn apply_action(&self, action: Action, index_to_id: &[String], scope_ids: &ScopeIds, metadata: &MemoryMetadata, actor_id: Option<&str>) -> Result<Option<ActionRecord>> {
        match action {
            Action::Add { text } => {
                let vector = self.embedder.embed(&text, EmbedAction::Add).await.map_err(Error::from)?;
                let memory = self.new_memory(text.clone(), scope_ids, metadata, Category::Fact, None, actor_id, vector, Utc::now());
                self.store.insert(&memory)?;
                self.history.add_history(&memory.id, None, Some(&memory.data), EventKind::Add, actor_id, None, false)?;
                self.publish(&memory.id, EventKind::Add);
                Ok(Some(ActionRecord { id: memory.id, memory: Some(text), event: EventKind::Add, previous_memory: None }))
            }
            Action::Update { index, text, old: _ } => {
                let id = &index_to_id[index];
                let mut memory = self.store.get(id)?;
                let previous = memory.data.clone();
                let vector = self.embedder.embed(&text, EmbedAction::Update).await.map_err(Error::from)?;
                memory.data = text.clone();
                memory.hash = Memory::digest(&text);
                memory.text_vector = vector;
                memory.updated_at = Utc::now();
                self.store.update(&memory)?;
                self.history.add_history(id, Some(&previous), Some(&text), EventKind::Update, actor_id, None, false)?;
                self.publish(id, EventKind::Update);
                Ok(Some(ActionRecord { id: id.clone(), memory: Some(text), event: EventKind::Update, previous_memory: Some(previous) }))
            }
            Action::Delete { index } => {
                let id = &index_to_id[index];
                let existing = self.store.get(id)?;
                self.store.delete(id)?;
                self.history.add_history(id, Some(&existing.data), None, EventKind::Delete, actor_id, None, true)?;
                self.publish(id, EventKind::Delete);
                Ok(Some(ActionRecord { id: id.clone(), memory: None, event: EventKind::Delete, previous_memory: Some(existing.data) }))
            }
            Action::Noop => Ok(None),
        }
    }
}

#[cfg(feature = "graph")]
mod graph {
    /// Knowledge-graph fan-out is out of this crate's scope; this stub
    /// preserves the call site's shape (fire-and-forget, logged on
    /// failure, never blocking stage 8) for a future graph-store backend.
    pub fn fan_out(_facts: Vec<String>) {
        tokio::spawn(async move {
            tracing::debug!("graph fan-out is not wired to a backend in this build");
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::mock::MockEmbeddingClient;
    use crate::llm::mock::MockLlmClient;

    fn scope() -> ScopeIds {
        ScopeIds { user_id: Some("u1".into()), agent_id: None, run_id: None }
    }

    fn pipeline(llm: MockLlmClient) -> IngestionPipeline {
        IngestionPipeline::new(
            Arc::new(MultimodalStore::open_in_memory(8, None).unwrap()),
            Arc::new(HistoryLog::open_in_memory().unwrap()),
            Arc::new(MockEmbeddingClient::new(8)),
            Arc::new(llm),
            ApiVersion::V1_1,
            true,
        )
    }

    #[tokio::test]
    async fn rejects_zero_scope_ids() {
        let p = pipeline(MockLlmClient::new("{}"));
        let err = p.add(&[IngestMessage::user("hello")], ScopeIds::default(), MemoryMetadata::default(), false, None, None).await.unwrap_err();
        assert!(matches!(err, Error::Scope));
    }

    #[tokio::test]
    async fn non_inferring_path_writes_one_memory_per_message_without_llm_calls() {
        let llm = MockLlmClient::new("{}");
        let p = pipeline(llm);
        let result = p
            .add(&[IngestMessage::user("first"), IngestMessage::user("second")], scope(), MemoryMetadata::default(), false, None, None)
            .await
            .unwrap();
        assert_eq!(result.records().len(), 2);
        assert!(result.records().iter().all(|r| r.event == EventKind::Add));
    }

    #[tokio::test]
    async fn short_content_short_circuits_to_non_inferring_path() {
        let llm = MockLlmClient::new("not json, would fail if called");
        let p = pipeline(llm);
        let result = p.add(&[IngestMessage::user("hi there")], scope(), MemoryMetadata::default(), true, None, None).await.unwrap();
        assert_eq!(result.records().len(), 1);
    }

    #[tokio::test]
    async fn inferring_path_extracts_facts_and_adds_them() {
        let llm = MockLlmClient::new(r#"{"facts": ["the sky is blue today"]}"#)
            .with_route("New facts", r#"{"memory": [{"id": "0", "text": "the sky is blue today", "event": "ADD", "old_memory": null}]}"#);
        let p = pipeline(llm);
        let long_content = "This is a long enough message\nwith more than one line in it\nto avoid the short circuit.";
        let result = p.add(&[IngestMessage::user(long_content)], scope(), MemoryMetadata::default(), true, None, None).await.unwrap();
        assert_eq!(result.records().len(), 1);
        assert_eq!(result.records()[0].memory.as_deref(), Some("the sky is blue today"));
    }

    #[tokio::test]
    async fn unparsable_fact_extraction_degrades_to_empty_result() {
        let llm = MockLlmClient::new("not json at all");
        let p = pipeline(llm);
        let long_content = "This is a long enough message\nwith more than one line in it\nto avoid the short circuit.";
        let result = p.add(&[IngestMessage::user(long_content)], scope(), MemoryMetadata::default(), true, None, None).await.unwrap();
        assert!(result.records().is_empty());
    }

    #[tokio::test]
    async fn hallucinated_update_id_is_repaired_to_add() {
        let llm = MockLlmClient::new(r#"{"facts": ["fact one"]}"#)
            .with_route("New facts", r#"{"memory": [{"id": "99", "text": "fact one", "event": "UPDATE", "old_memory": "missing"}]}"#);
        let p = pipeline(llm);
        let long_content = "This is a long enough message\nwith more than one line in it\nto avoid the short circuit.";
        let result = p.add(&[IngestMessage::user(long_content)], scope(), MemoryMetadata::default(), true, None, None).await.unwrap();
        assert_eq!(result.records().len(), 1);
        assert_eq!(result.records()[0].event, EventKind::Add);
    }

    #[tokio::test]
    async fn procedural_memory_type_skips_fact_extraction() {
        let llm = MockLlmClient::new("opened settings, clicked the button, saved the form");
        let p = pipeline(llm);
        let result = p
            .add(&[IngestMessage::user("step one"), IngestMessage::user("step two")], scope(), MemoryMetadata::default(), true, Some("procedural"), None)
            .await
            .unwrap();
        assert_eq!(result.records().len(), 1);
        assert_eq!(result.records()[0].memory.as_deref(), Some("opened settings, clicked the button, saved the form"));
    }

    #[tokio::test]
    async fn v1_0_wraps_with_deprecation_notice() {
        let mut p = pipeline(MockLlmClient::new("{}"));
        p.api_version = ApiVersion::V1_0;
        let result = p.add(&[IngestMessage::user("hello")], scope(), MemoryMetadata::default(), false, None, None).await.unwrap();
        assert!(matches!(result, IngestResult::V1_0 { .. }));
    }

    #[tokio::test]
    async fn contradiction_marker_is_written_onto_the_existing_memory() {
        let store = Arc::new(MultimodalStore::open_in_memory(8, None).unwrap());
        let now = Utc::now();
        let existing = crate::types::Memory {
            id: "e1".into(),
            data: "Server runs on port 8080".into(),
            hash: Memory::digest("Server runs on port 8080"),
            text_vector: vec![0.1; 8],
            vision_vector: None,
            created_at: now,
            updated_at: now,
            access_count: 0,
            tier: crate::types::Tier::LongTerm,
            importance_score: 0.5,
            compressed: false,
            scope_ids: scope(),
            category: Category::Fact,
            actor_id: None,
            role: None,
            metadata: MemoryMetadata::default(),
        };
        store.insert(&existing).unwrap();

        let p = IngestionPipeline::new(store.clone(), Arc::new(HistoryLog::open_in_memory().unwrap()), Arc::new(MockEmbeddingClient::new(8)), Arc::new(MockLlmClient::new("{}")), ApiVersion::V1_1, true);

        p.mark_contradiction("e1", "Server runs on port 9090");

        let updated = store.get("e1").unwrap();
        let record = updated.metadata.contradiction.expect("contradiction record should be set");
        assert_eq!(record.conflicting_preview, "Server runs on port 9090");
    }
}
