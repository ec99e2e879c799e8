//! Query complexity analysis, used to pick a model tier for the router's
//! `code`/default handlers. English pattern lists only; the source
//! material's CJK-language alternation branches are not reproduced.

use regex::Regex;
use std::sync::LazyLock;

/// Model-size tier a query is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelTier {
    Tiny,
    Small,
    Medium,
    Large,
}

static COMPLEX_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"(?i)\bwhy\b.{0,20}\b(fail|error|issue|broke)\b",
        r"(?i)\b(explain|analyze|summarize|compare)\b",
        r"(?i)\b(cause|effect|impact)\b",
        r"(?i)\b(step|process|how to)\b",
        r"(?i)\b(advantage|disadvantage)\b",
        r"(?i)\bhow to (solve|fix|implement)\b",
        r"(?i)\b(best|optimal)\b",
    ])
});

static CREATIVE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"(?i)\b(write|create|generate)\b.{0,20}\b(content|story|poem|code)\b",
        r"(?i)\bimagine\b",
        r"(?i)\b(design|plan)\b",
    ])
});

static FACTUAL_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"(?i)\b(what is|define)\b",
        r"(?i)\bhow (many|much)\b",
        r"(?i)\bwhen\b",
        r"(?i)\bwhere\b",
        r"(?i)\bwho(se)?\b",
    ])
});

static GREETING_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"(?i)^(hello|hi|hey)[.!?]*$",
        r"(?i)^(yes|no|ok|okay)[.!?]*$",
        r"(?i)^thanks?[.!?]*$",
        r"(?i)^(bye|goodbye)[.!?]*$",
    ])
});

static CONVERSATIONAL_PATTERNS: LazyLock<Vec<Regex>> =
    LazyLock::new(|| compile(&[r"(?i)\b(how|what)\b", r"(?i)\b(think|believe)\b", r"(?i)\b(could|would|might)\b"]));

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns.iter().map(|p| Regex::new(p).expect("fixed complexity patterns are valid regex")).collect()
}

/// Per-query analysis result.
#[derive(Debug, Clone)]
pub struct QueryAnalysis {
    pub complexity_score: f32,
    pub tier: ModelTier,
    pub reasoning_required: bool,
    pub creative_required: bool,
    pub factual_required: bool,
    pub is_greeting: bool,
    pub is_question: bool,
    pub is_command: bool,
    pub is_conversational: bool,
}

const COMMAND_PREFIXES: [&str; 4] = ["!", "/", "help", "search"];

/// Stateless additive-scoring complexity analyzer (§4.10 supplement).
pub struct ComplexityAnalyzer;

impl ComplexityAnalyzer {
    pub fn new() -> Self {
        Self
    }

    pub fn analyze(&self, query: &str) -> QueryAnalysis {
        let trimmed = query.trim();
        let lower = trimmed.to_lowercase();
        let len = trimmed.chars().count();

        let is_greeting = GREETING_PATTERNS.iter().any(|p| p.is_match(trimmed));
        let is_question = trimmed.contains('?') || ["what", "where", "who", "how", "why"].iter().any(|w| lower.contains(w));
        let is_command = COMMAND_PREFIXES.iter().any(|p| lower.starts_with(p));
        let is_conversational = CONVERSATIONAL_PATTERNS.iter().any(|p| p.is_match(trimmed));

        let mut score = 0.0f32;

        score += if len < 20 {
            0.0
        } else if len < 50 {
            0.1
        } else if len < 100 {
            0.2
        } else {
            0.3
        };

        let question_marks = trimmed.matches('?').count();
        score += (0.05 * question_marks as f32).min(0.2);

        let complex_matches = COMPLEX_PATTERNS.iter().filter(|p| p.is_match(trimmed)).count();
        score += (0.1 * complex_matches as f32).min(0.3);
        let reasoning_required = complex_matches > 0;

        let creative_matches = CREATIVE_PATTERNS.iter().filter(|p| p.is_match(trimmed)).count();
        score += (0.05 * creative_matches as f32).min(0.15);
        let creative_required = creative_matches > 0;

        let factual_matches = FACTUAL_PATTERNS.iter().filter(|p| p.is_match(trimmed)).count();
        score += (0.03 * factual_matches as f32).min(0.1);
        let factual_required = factual_matches > 0;

        let sentences: Vec<&str> = trimmed.split(['.', '?', '!']).filter(|s| !s.trim().is_empty()).collect();
        if !sentences.is_empty() {
            let avg_len = sentences.iter().map(|s| s.trim().chars().count()).sum::<usize>() as f32 / sentences.len() as f32;
            score += (avg_len / 400.0).min(0.15);
        }

        let score = score.clamp(0.0, 1.0);
        let tier = if score < 0.25 {
            ModelTier::Tiny
        } else if score < 0.5 {
            ModelTier::Small
        } else if score < 0.75 {
            ModelTier::Medium
        } else {
            ModelTier::Large
        };

        QueryAnalysis {
            complexity_score: score,
            tier,
            reasoning_required,
            creative_required,
            factual_required,
            is_greeting,
            is_question,
            is_command,
            is_conversational,
        }
    }
}

impl Default for ComplexityAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}
