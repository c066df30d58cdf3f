//! Performance benchmarks for a3s-privacy-router
//!
//! Run with: cargo bench

use a3s_privacy_router::provider::memory::MemoryProvider;
use a3s_privacy_router::redactor::{redact_matches, reverse_redactions};
use a3s_privacy_router::routing::analyze_complexity;
use a3s_privacy_router::{
    DetectionOptions, DictionaryCache, DictionaryEntry, DictionaryPseudonymizer, GenerateOptions,
    GenerationOrchestrator, MemoryStore, PipelineConfig, RegexDetector, RequestContext, Scope,
};
use criterion::{criterion_group, criterion_main, Criterion};
use std::collections::HashMap;
use std::sync::Arc;

const PROMPT: &str = "Please email Jane Roe at jane.roe@example.com and call 555-123-4567. \
    Also explain how the billing API handles retries for Acme Corp, and compare it \
    with the approach used by Globex Industries.";

fn dictionary() -> Vec<DictionaryEntry> {
    let mut entries = vec![
        DictionaryEntry::new("Jane Roe", "PERSON_1", "person"),
        DictionaryEntry::new("Acme Corp", "COMPANY_1", "organization"),
        DictionaryEntry::new("Globex Industries", "COMPANY_2", "organization"),
    ];
    for i in 0..200 {
        entries.push(DictionaryEntry::new(
            format!("Customer {}", i),
            format!("CUSTOMER_{}", i),
            "customer",
        ));
    }
    entries
}

fn bench_complexity(c: &mut Criterion) {
    c.bench_function("analyze_complexity", |b| {
        b.iter(|| analyze_complexity(PROMPT));
    });
}

fn bench_detection_and_redaction(c: &mut Criterion) {
    let detector = RegexDetector::with_defaults().unwrap();

    c.bench_function("RegexDetector scan", |b| {
        b.iter(|| detector.scan(PROMPT, DetectionOptions::default()));
    });

    let matches = detector.scan(PROMPT, DetectionOptions::default()).matches;
    let table = HashMap::new();
    c.bench_function("redact + reverse", |b| {
        b.iter(|| {
            let redacted = redact_matches(PROMPT, &matches, &table);
            reverse_redactions(&redacted.redacted_text, &redacted.mappings)
        });
    });
}

fn bench_pseudonymize(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = Arc::new(MemoryStore::new(dictionary(), Vec::new()));
    let pseudonymizer = DictionaryPseudonymizer::new(store, Arc::new(DictionaryCache::default()));

    c.bench_function("pseudonymize (cached, 203 entries)", |b| {
        b.to_async(&rt)
            .iter(|| async { pseudonymizer.pseudonymize(PROMPT, &Scope::global()).await.unwrap() });
    });
}

fn bench_generate(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = Arc::new(MemoryStore::new(dictionary(), Vec::new()));
    let orchestrator = GenerationOrchestrator::builder(PipelineConfig::default())
        .dictionary_store(store.clone())
        .replacement_store(store)
        .default_provider(Arc::new(MemoryProvider::echo()))
        .build()
        .unwrap();

    c.bench_function("generate_response (external, protected)", |b| {
        b.to_async(&rt).iter(|| async {
            orchestrator
                .generate_response(
                    &RequestContext::new(),
                    "You are helpful",
                    PROMPT,
                    GenerateOptions::default().with_target("anthropic", "claude-3-5-haiku"),
                )
                .await
                .unwrap()
        });
    });
}

criterion_group!(
    benches,
    bench_complexity,
    bench_detection_and_redaction,
    bench_pseudonymize,
    bench_generate,
);
criterion_main!(benches);
