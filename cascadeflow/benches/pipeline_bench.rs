//! Benchmarks for vector queries and fallback pipeline runs.

use cascadeflow::context::Context;
use cascadeflow::pipeline::PipelineBuilder;
use cascadeflow::providers::HashingEmbedder;
use cascadeflow::stages::{RetrievalStage, StaticAnswerStage};
use cascadeflow::testing::seeded_rates_store;
use cascadeflow::vectorstore::VectorStore;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::sync::Arc;

fn vector_query_benchmark(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let embedder = HashingEmbedder::default();
    let store = rt.block_on(seeded_rates_store(&embedder));
    let query = embedder.embed_sync("FD rates for India");

    c.bench_function("vector_query_top4", |b| {
        b.iter(|| rt.block_on(store.query(black_box(&query), 4, None)).unwrap());
    });
}

fn pipeline_benchmark(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let embedder = HashingEmbedder::default();
    let store = rt.block_on(seeded_rates_store(&embedder));
    let pipeline = PipelineBuilder::new("bench")
        .stage(
            RetrievalStage::new("rag", store, Arc::new(embedder))
                .with_query("{country}")
                .with_answer(|_| Ok(None)),
        )
        .stage(StaticAnswerStage::new("default", "no rates"))
        .build()
        .unwrap();

    c.bench_function("pipeline_retrieve_then_default", |b| {
        b.iter(|| {
            rt.block_on(pipeline.run(Context::new().with_field("country", "India")))
                .unwrap()
        });
    });
}

criterion_group!(benches, vector_query_benchmark, pipeline_benchmark);
criterion_main!(benches);
