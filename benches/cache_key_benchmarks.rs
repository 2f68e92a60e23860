//! # Cache Key Benchmarks
//!
//! Key derivation runs on every cacheable request, hit or miss. These
//! benchmarks cover canonicalization and hashing across payload sizes, and
//! the in-memory store round trip that follows a derived key.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::runtime::Runtime;

use docgate::caching::stores::memory::InMemoryCacheConfig;
use docgate::caching::{CacheStore, CanonicalKeyGenerator, CanonicalValue, InMemoryCache, KeyGenerator};

/// A query payload with `stages` pipeline stages
fn aggregate_params(stages: usize) -> Value {
    let pipeline: Vec<Value> = (0..stages)
        .map(|i| {
            json!({
                "$match": {"age": {"$gte": i}, "city": format!("city-{}", i)},
            })
        })
        .collect();

    json!({
        "connection_string": "mongodb://localhost:27017",
        "database_name": "company",
        "collection_name": "people",
        "pipeline": pipeline,
    })
}

fn benchmark_key_derivation(c: &mut Criterion) {
    let generator = CanonicalKeyGenerator::default();
    let mut group = c.benchmark_group("key_derivation");

    for stages in [1, 10, 100].iter() {
        let params = aggregate_params(*stages);
        let size = serde_json::to_vec(&params).unwrap().len();
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_with_input(BenchmarkId::new("derive_json", stages), &params, |b, params| {
            b.iter(|| black_box(generator.derive_json("aggregate", black_box(params))))
        });

        let canonical = CanonicalValue::from(&params);
        group.bench_with_input(
            BenchmarkId::new("derive_canonical", stages),
            &canonical,
            |b, canonical| b.iter(|| black_box(generator.derive("aggregate", black_box(canonical)))),
        );
    }

    group.finish();
}

fn benchmark_memory_store_round_trip(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let cache = rt.block_on(async { InMemoryCache::new(InMemoryCacheConfig::default()) });
    let generator = CanonicalKeyGenerator::default();
    let payload = vec![0u8; 4096];

    c.bench_function("memory_store_set_get", |b| {
        let mut i = 0_u64;
        b.iter(|| {
            i += 1;
            let key = generator.derive_json("query", &json!({"limit": i % 1000}));
            rt.block_on(async {
                cache.set(&key, &payload, Duration::from_secs(60)).await.unwrap();
                black_box(cache.get(&key).await.unwrap());
            })
        })
    });
}

criterion_group!(benches, benchmark_key_derivation, benchmark_memory_store_round_trip);
criterion_main!(benches);
