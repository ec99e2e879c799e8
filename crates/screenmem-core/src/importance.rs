//! Deterministic importance scorer (C5). Same inputs always yield the same
//! output; "now" is always a caller-supplied parameter, never read from the
//! wall clock inside [`score`].

use crate::types::{Category, MemoryMetadata, Tier};
use chrono::{DateTime, Utc};

/// Fixed category weights (§4.5, exact values from
/// `original_source/memscreen/memory/importance_scorer.py`).
pub fn category_weight(category: Category) -> f32 {
    match category {
        Category::Fact => 0.9,
        Category::Procedure => 0.85,
        Category::Code => 0.8,
        Category::Task => 0.75,
        Category::Concept => 0.7,
        Category::Document => 0.65,
        Category::Question => 0.6,
        Category::Image => 0.6,
        Category::Video => 0.6,
        Category::Conversation => 0.4,
        Category::Greeting => 0.2,
        Category::General => 0.5,
    }
}

fn access_score(access_count: u64) -> f32 {
    let numerator = ((access_count as f64) + 1.0).ln();
    let denominator = 5f64.ln();
    ((numerator / denominator) as f32).min(1.0)
}

fn recency_score(created_at: DateTime<Utc>, now: DateTime<Utc>) -> f32 {
    let days_since = (now - created_at).num_seconds() as f32 / 86_400.0;
    (-days_since.max(0.0) / 30.0).exp()
}

fn richness(content: &str, metadata: &MemoryMetadata) -> f32 {
    let len = content.chars().count();
    let length_term = if (100..=500).contains(&len) {
        0.5
    } else if len > 500 {
        0.3
    } else if len > 50 {
        0.2
    } else {
        0.0
    };

    let structured_term = if metadata.has_structured_signal() { 0.3 } else { 0.0 };

    let entity_term = if metadata.entities.len() > 3 {
        0.2
    } else if !metadata.entities.is_empty() {
        0.1
    } else {
        0.0
    };

    length_term + structured_term + entity_term
}

/// The weighted-sum formula from §4.5, clamped to `[0,1]`.
pub fn score(
    content: &str,
    metadata: &MemoryMetadata,
    category: Category,
    access_count: u64,
    created_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> f32 {
    let user_mark_term = if metadata.user_marked() { 1.0 } else { 0.0 };

    let raw = 0.30 * category_weight(category)
        + 0.30 * access_score(access_count)
        + 0.20 * recency_score(created_at, now)
        + 0.10 * user_mark_term
        + 0.10 * richness(content, metadata);

    raw.clamp(0.0, 1.0)
}

/// Maps a score to its initial tier (§4.5).
pub fn tier_for_score(s: f32) -> Tier {
    if s >= 0.7 {
        Tier::Working
    } else if s >= 0.4 {
        Tier::ShortTerm
    } else {
        Tier::LongTerm
    }
}

/// [`tier_for_score`] demoted to `short_term` when the working tier is
/// disabled, shared by the tiered manager and the ingestion pipeline so
/// freshly-created memories and promotions agree on the same rule.
pub fn initial_tier(score: f32, working_enabled: bool) -> Tier {
    let tier = tier_for_score(score);
    if tier == Tier::Working && !working_enabled {
        Tier::ShortTerm
    } else {
        tier
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z").unwrap().with_timezone(&Utc)
    }

    #[test]
    fn score_is_bounded_in_unit_interval() {
        let meta = MemoryMetadata::default();
        let s = score("x", &meta, Category::Greeting, 0, now(), now());
        assert!((0.0..=1.0).contains(&s));

        let mut important_meta = MemoryMetadata::default();
        important_meta.important = true;
        important_meta.entities = vec!["a".into(), "b".into(), "c".into(), "d".into()];
        let s2 = score(&"x".repeat(300), &important_meta, Category::Fact, 1000, now(), now());
        assert!((0.0..=1.0).contains(&s2));
    }

    #[test]
    fn identical_inputs_produce_identical_scores() {
        let meta = MemoryMetadata::default();
        let a = score("some content", &meta, Category::Task, 2, now(), now());
        let b = score("some content", &meta, Category::Task, 2, now(), now());
        assert_eq!(a, b);
    }

    #[test]
    fn tier_mapping_matches_fixed_thresholds() {
        assert_eq!(tier_for_score(0.7), Tier::Working);
        assert_eq!(tier_for_score(0.69), Tier::ShortTerm);
        assert_eq!(tier_for_score(0.4), Tier::ShortTerm);
        assert_eq!(tier_for_score(0.39), Tier::LongTerm);
    }

    #[test]
    fn recency_decays_toward_zero_with_age() {
        let created = now();
        let much_later = created + chrono::Duration::days(365);
        assert!(recency_score(created, much_later) < recency_score(created, created));
    }

    #[test]
    fn richness_rewards_structured_signal_and_entity_count() {
        let mut meta = MemoryMetadata::default();
        let bare = richness("short content here totalling over fifty chars", &meta);
        meta.entities = vec!["a".into(), "b".into(), "c".into(), "d".into()];
        let with_entities = richness("short content here totalling over fifty chars", &meta);
        assert!(with_entities > bare);
    }
}
