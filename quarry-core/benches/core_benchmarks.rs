use criterion::{Criterion, black_box, criterion_group, criterion_main};
use quarry_core::citation::CitationVerifier;
use quarry_core::compaction::{CompactionPolicy, CompactionTrigger, serialized_tokens};
use quarry_core::prompts::normalize_queries;
use quarry_core::schema::{CitationRef, PlanResponse, SynthesisResponse, validate};
use quarry_core::types::{PendingQuery, SearchHit, Source, SourceId};

fn corpus(count: usize) -> Vec<Source> {
    (1..=count)
        .map(|i| {
            Source::from_hit(
                SourceId(i as u32),
                SearchHit::web(
                    format!("Market report {}", i),
                    format!("https://reports{}.example/cloud", i),
                )
                .with_snippet("Cloud storage revenue grew year over year. ".repeat(20)),
            )
        })
        .collect()
}

fn bench_compaction(c: &mut Criterion) {
    let policy = CompactionPolicy::default();
    let sources = corpus(200);

    c.bench_function("compact_200_sources", |b| {
        b.iter(|| policy.compact_sources(black_box(&sources), CompactionTrigger::BudgetLow))
    });

    let view = policy.compact_sources(&sources, CompactionTrigger::SourcesOversized);
    c.bench_function("render_compacted_view", |b| b.iter(|| black_box(&view).render()));

    c.bench_function("serialized_tokens_200_sources", |b| {
        b.iter(|| serialized_tokens(black_box(&sources)))
    });
}

fn bench_citation_verifier(c: &mut Criterion) {
    let sources = corpus(50);
    let verifier = CitationVerifier::new();
    let answer: String = (1..=60)
        .map(|i| format!("Finding number {} is documented [{}]. ", i, i))
        .collect();
    let cited: Vec<CitationRef> = (1..=60).map(|i| CitationRef::new(format!("[{}]", i))).collect();

    c.bench_function("verify_60_citations", |b| {
        b.iter(|| {
            tokio_test::block_on(verifier.verify(black_box(&answer), black_box(&cited), &sources))
        })
    });
}

fn bench_schema(c: &mut Criterion) {
    let plan = r#"Here is the plan:
```json
{"queries": [{"query": "cloud storage market share 2024", "intent": "numbers"},
             {"query": "s3 vs azure blob pricing", "intent": "pricing"}]}
```"#;
    c.bench_function("validate_fenced_plan", |b| {
        b.iter(|| validate::<PlanResponse>(black_box(plan)))
    });

    let synthesis = r#"{"answer": "AWS leads [1] while Azure grows [2].", "citations": [{"id": "[1]"}, {"id": 2}]}"#;
    c.bench_function("validate_synthesis", |b| {
        b.iter(|| validate::<SynthesisResponse>(black_box(synthesis)))
    });
}

fn bench_query_normalization(c: &mut Criterion) {
    let queries: Vec<PendingQuery> = (0..40)
        .map(|i| PendingQuery::new(format!("  Cloud   storage  query {}  ", i % 15), "intent"))
        .collect();
    c.bench_function("normalize_40_queries", |b| {
        b.iter(|| normalize_queries(black_box(queries.clone()), 10))
    });
}

criterion_group!(
    benches,
    bench_compaction,
    bench_citation_verifier,
    bench_schema,
    bench_query_normalization,
);
criterion_main!(benches);
