//! Importance scorer benchmarks.
//! Run with: cargo bench -p screenmem-core

use chrono::{DateTime, Utc};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use screenmem_core::importance::{category_weight, initial_tier, score, tier_for_score};
use screenmem_core::{Category, MemoryMetadata};

fn now() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z").unwrap().with_timezone(&Utc)
}

fn bench_category_weight(c: &mut Criterion) {
    let categories = [Category::Fact, Category::Procedure, Category::Code, Category::Task, Category::Conversation, Category::Greeting];

    c.bench_function("category_weight_sweep", |b| {
        b.iter(|| {
            for category in &categories {
                black_box(category_weight(*category));
            }
        })
    });
}

fn bench_score_plain(c: &mut Criterion) {
    let metadata = MemoryMetadata::default();
    let created = now();

    c.bench_function("score_plain_fact", |b| {
        b.iter(|| {
            black_box(score("the user's favorite editor is neovim", &metadata, Category::Fact, 3, created, now()));
        })
    });
}

fn bench_score_rich(c: &mut Criterion) {
    let mut metadata = MemoryMetadata::default();
    metadata.important = true;
    metadata.entities = vec!["neovim".into(), "tmux".into(), "zsh".into(), "ripgrep".into()];
    let created = now() - chrono::Duration::days(10);

    c.bench_function("score_rich_with_entities_and_flags", |b| {
        b.iter(|| {
            black_box(score(&"detailed session notes ".repeat(20), &metadata, Category::Document, 40, created, now()));
        })
    });
}

fn bench_tier_for_score(c: &mut Criterion) {
    let scores = [0.1, 0.35, 0.4, 0.55, 0.7, 0.85, 1.0];

    c.bench_function("tier_for_score_sweep", |b| {
        b.iter(|| {
            for s in &scores {
                black_box(tier_for_score(*s));
            }
        })
    });
}

fn bench_initial_tier(c: &mut Criterion) {
    c.bench_function("initial_tier_working_disabled", |b| {
        b.iter(|| {
            black_box(initial_tier(0.75, false));
        })
    });
}

criterion_group!(benches, bench_category_weight, bench_score_plain, bench_score_rich, bench_tier_for_score, bench_initial_tier,);
criterion_main!(benches);
