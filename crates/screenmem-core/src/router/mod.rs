//! Query router and response cache (C10): classify a user input, dispatch
//! to a handler, hand the input to ingestion for best-effort background
//! storage, and cache the formatted response.

pub mod complexity;

use crate::ingestion::{IngestMessage, IngestionPipeline};
use crate::llm::{GenerateOptions, LlmClient, Message, UseCase};
use crate::retrieval::HybridRetriever;
use crate::store::MemoryFilter;
use crate::types::{Category, MemoryMetadata, ScopeIds};
use md5::{Digest, Md5};
use regex::Regex;
use std::sync::{Arc, LazyLock};

use crate::cache::TtlLru;

const CLASSIFICATION_CACHE_CAPACITY: usize = 50;
const RESPONSE_CACHE_CAPACITY: usize = 100;
const RETRIEVE_LIMIT: usize = 5;

/// What the caller is trying to accomplish with this input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    RetrieveFact,
    FindProcedure,
    SearchConversation,
    ExecuteTask,
    Generic,
}

struct ClassificationRule {
    pattern: Regex,
    category: Category,
    intent: Intent,
    confidence: f32,
}

fn digest(input: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(input.as_bytes());
    format!("{:x}", hasher.finalize())
}

static GREETING_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)^(hello|hi|hey|thanks?|bye|goodbye)[.!?]*$").unwrap());
static CODE_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\b(function|code|bug|compile|error|stack trace|exception)\b").unwrap());
static PROCEDURE_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\b(how do i|how to|steps to|walk me through)\b").unwrap());
static TASK_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)^(remind me|todo|task:|remember to)\b").unwrap());
static QUESTION_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\b(what|who|when|where|why)\b.*\?|\?$").unwrap());

/// Rule-based classifier with an ordered rule list and a small LRU cache.
/// The highest-priority matching rule (first in the list) wins.
pub struct Classifier {
    cache: TtlLru<String, (Category, Intent, f32)>,
}

impl Classifier {
    pub fn new() -> Self {
        Self { cache: TtlLru::new(CLASSIFICATION_CACHE_CAPACITY, None) }
    }

    fn rules(&self) -> Vec<ClassificationRule> {
        vec![
            ClassificationRule { pattern: GREETING_PATTERN.clone(), category: Category::Greeting, intent: Intent::Generic, confidence: 0.95 },
            ClassificationRule { pattern: TASK_PATTERN.clone(), category: Category::Task, intent: Intent::ExecuteTask, confidence: 0.9 },
            ClassificationRule { pattern: PROCEDURE_PATTERN.clone(), category: Category::Question, intent: Intent::FindProcedure, confidence: 0.85 },
            ClassificationRule { pattern: CODE_PATTERN.clone(), category: Category::Code, intent: Intent::Generic, confidence: 0.8 },
            ClassificationRule { pattern: QUESTION_PATTERN.clone(), category: Category::Question, intent: Intent::RetrieveFact, confidence: 0.7 },
        ]
    }

    pub fn classify(&self, input: &str) -> (Category, Intent, f32) {
        let key = digest(input);
        if let Some(cached) = self.cache.get(&key) {
            return cached;
        }

        let result = self
            .rules()
            .into_iter()
            .find(|rule| rule.pattern.is_match(input))
            .map(|rule| (rule.category, rule.intent, rule.confidence))
            .unwrap_or((Category::General, Intent::SearchConversation, 0.3));

        self.cache.set(key, result);
        result
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new()
    }
}

/// Classifies, dispatches, asynchronously stores, and caches formatted
/// responses for raw user input.
pub struct Dispatcher {
    classifier: Classifier,
    retriever: Arc<HybridRetriever>,
    ingestion: Arc<IngestionPipeline>,
    llm: Arc<dyn LlmClient>,
    response_cache: TtlLru<String, String>,
}

impl Dispatcher {
    pub fn new(retriever: Arc<HybridRetriever>, ingestion: Arc<IngestionPipeline>, llm: Arc<dyn LlmClient>) -> Self {
        Self {
            classifier: Classifier::new(),
            retriever,
            ingestion,
            llm,
            response_cache: TtlLru::new(RESPONSE_CACHE_CAPACITY, None),
        }
    }

    /// Classify, dispatch, fire off best-effort background storage, and
    /// return the formatted response. Cache hits short-circuit
    /// classification and dispatch entirely (§4.10).
    pub async fn handle(&self, input: &str, scope_ids: ScopeIds) -> String {
        let cache_key = digest(input);
        if let Some(cached) = self.response_cache.get(&cache_key) {
            return cached;
        }

        let (category, intent, _confidence) = self.classifier.classify(input);
        let response = self.dispatch(input, category, intent, &scope_ids).await;

        self.spawn_background_storage(input, category, scope_ids);

        self.response_cache.set(cache_key, response.clone());
        response
    }

    async fn dispatch(&self, input: &str, category: Category, intent: Intent, scope_ids: &ScopeIds) -> String {
        let filter = MemoryFilter {
            user_id: scope_ids.user_id.clone(),
            agent_id: scope_ids.agent_id.clone(),
            run_id: scope_ids.run_id.clone(),
            tier: None,
            category: None,
        };

        match (category, intent) {
            (Category::Question, Intent::RetrieveFact) => {
                let mut fact_filter = filter.clone();
                fact_filter.category = Some(Category::Fact);
                self.format_retrieval(input, &fact_filter).await
            }
            (Category::Question, Intent::FindProcedure) => {
                let mut procedure_filter = filter.clone();
                procedure_filter.category = Some(Category::Procedure);
                self.format_retrieval(input, &procedure_filter).await
            }
            (Category::Task, _) => {
                let metadata = MemoryMetadata::default();
                let messages = [IngestMessage::user(input)];
                match self.ingestion.add_with_category(&messages, scope_ids.clone(), metadata, Category::Task, None).await {
                    Ok(_) => "Got it, I'll keep track of that.".to_string(),
                    Err(e) => {
                        tracing::warn!(error = %e, "task storage failed during dispatch");
                        "I couldn't save that task right now.".to_string()
                    }
                }
            }
            (Category::Code, _) => self.code_assistant(input).await,
            (Category::Greeting, _) => "Hello! How can I help?".to_string(),
            _ => self.format_retrieval(input, &filter).await,
        }
    }

    async fn format_retrieval(&self, input: &str, filter: &MemoryFilter) -> String {
        let hits = self.retriever.retrieve(Some(input), None, filter, RETRIEVE_LIMIT).await;
        if hits.is_empty() {
            "I don't have anything relevant stored yet.".to_string()
        } else {
            hits.iter().map(|h| h.payload.data.clone()).collect::<Vec<_>>().join("\n")
        }
    }

    async fn code_assistant(&self, input: &str) -> String {
        let messages = [Message::system("You are a concise coding assistant."), Message::user(input)];
        let options = GenerateOptions::for_use_case(UseCase::Chat);
        self.llm.generate(&messages, &options).await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "code assistant LLM call failed");
            "I couldn't generate a response right now.".to_string()
        })
    }

    /// Best-effort: the input is always handed to ingestion for storage,
    /// regardless of dispatch outcome, without delaying the caller's
    /// response (§4.10).
    fn spawn_background_storage(&self, input: &str, category: Category, scope_ids: ScopeIds) {
        let ingestion = self.ingestion.clone();
        let input = input.to_string();
        tokio::spawn(async move {
            let messages = [IngestMessage::user(input)];
            let metadata = MemoryMetadata::default();
            if let Err(e) = ingestion.add_with_category(&messages, scope_ids, metadata, category, None).await {
                tracing::warn!(error = %e, "background storage failed");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::mock::MockEmbeddingClient;
    use crate::history::HistoryLog;
    use crate::llm::mock::MockLlmClient;
    use crate::store::MultimodalStore;

    fn scope() -> ScopeIds {
        ScopeIds { user_id: Some("u1".into()), agent_id: None, run_id: None }
    }

    #[test]
    fn greeting_classifies_with_high_confidence() {
        let classifier = Classifier::new();
        let (category, _, confidence) = classifier.classify("hello");
        assert_eq!(category, Category::Greeting);
        assert!(confidence > 0.9);
    }

    #[test]
    fn repeat_input_hits_classification_cache() {
        let classifier = Classifier::new();
        let first = classifier.classify("how do I reset my password");
        let second = classifier.classify("how do I reset my password");
        assert_eq!(first, second);
    }

    #[test]
    fn unmatched_input_falls_back_to_generic() {
        let classifier = Classifier::new();
        let (category, intent, _) = classifier.classify("the quick brown fox");
        assert_eq!(category, Category::General);
        assert_eq!(intent, Intent::SearchConversation);
    }

    fn dispatcher() -> Dispatcher {
        let store = Arc::new(MultimodalStore::open_in_memory(8, None).unwrap());
        let history = Arc::new(HistoryLog::open_in_memory().unwrap());
        let embedder: Arc<dyn crate::embeddings::EmbeddingClient> = Arc::new(MockEmbeddingClient::new(8));
        let llm: Arc<dyn LlmClient> = Arc::new(MockLlmClient::new("a generated response"));
        let ingestion = Arc::new(IngestionPipeline::new(store.clone(), history, embedder.clone(), llm.clone(), crate::config::ApiVersion::V1_1, true));
        let retriever = Arc::new(HybridRetriever::new(store, embedder));
        Dispatcher::new(retriever, ingestion, llm)
    }

    #[tokio::test]
    async fn greeting_returns_canned_response() {
        let d = dispatcher();
        let response = d.handle("hello", scope()).await;
        assert_eq!(response, "Hello! How can I help?");
    }

    #[tokio::test]
    async fn repeat_input_hits_response_cache() {
        let d = dispatcher();
        let first = d.handle("hello there", scope()).await;
        let second = d.handle("hello there", scope()).await;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn code_question_uses_llm_with_no_retrieval() {
        let d = dispatcher();
        let response = d.handle("why does this function throw an exception", scope()).await;
        assert_eq!(response, "a generated response");
    }

    #[tokio::test]
    async fn default_dispatch_retrieves_with_empty_store() {
        let d = dispatcher();
        let response = d.handle("tell me about my day", scope()).await;
        assert_eq!(response, "I don't have anything relevant stored yet.");
    }
}
