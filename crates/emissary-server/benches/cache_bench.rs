use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::num::NonZeroUsize;
use tokio::runtime::Runtime;
use emissary_cache::{Identity, LruStore, RandomAgeOffset, TransformationChain, UppercaseName};
use emissary_core::Entity;
use serde_json::json;

/// Crea una entidad de prueba con N campos extra
fn create_test_entity(num_fields: usize) -> Entity {
    let mut entity = Entity::new();
    entity.insert("name".to_string(), json!("simone"));
    entity.insert("age".to_string(), json!(30));
    for i in 0..num_fields {
        entity.insert(format!("field.{}", i), json!(format!("value-{}", i)));
    }
    entity
}

/// Benchmark: LRU insert with eviction at different capacities
fn bench_lru_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("lru_insert");
    let entity = create_test_entity(10);

    for capacity in [2usize, 10, 1_000] {
        let cap = NonZeroUsize::new(capacity).unwrap();
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::from_parameter(capacity), &cap, |b, &cap| {
            let mut store = LruStore::new(cap);
            b.iter(|| {
                let insertion = store.insert(entity.clone());
                std::hint::black_box(insertion)
            });
        });
    }

    group.finish();
}

/// Benchmark: LRU get (hit, refreshes recency)
fn bench_lru_get_hit(c: &mut Criterion) {
    let mut store = LruStore::new(NonZeroUsize::new(1_000).unwrap());
    let keys: Vec<u64> = (0..1_000)
        .map(|_| store.insert(create_test_entity(10)).key)
        .collect();

    let mut i = 0usize;
    c.bench_function("lru_get_hit", |b| {
        b.iter(|| {
            let key = keys[i % keys.len()];
            i += 1;
            std::hint::black_box(store.get(key).is_some())
        });
    });
}

/// Benchmark: LRU values in insertion order
fn bench_lru_values(c: &mut Criterion) {
    let mut store = LruStore::new(NonZeroUsize::new(1_000).unwrap());
    for _ in 0..1_000 {
        store.insert(create_test_entity(10));
    }

    c.bench_function("lru_values_take_10", |b| {
        b.iter(|| {
            let first: Vec<_> = store.values().take(10).cloned().collect();
            std::hint::black_box(first)
        });
    });
}

/// Benchmark: transformation chain with different member counts
fn bench_chain_apply(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("chain_apply");

    let chains = [
        ("empty", TransformationChain::empty()),
        ("noop", TransformationChain::empty().with(Identity)),
        (
            "uppercase+age",
            TransformationChain::empty()
                .with(UppercaseName)
                .with(RandomAgeOffset::default()),
        ),
    ];

    for (label, chain) in &chains {
        group.bench_with_input(BenchmarkId::from_parameter(label), chain, |b, chain| {
            b.to_async(&rt).iter(|| async {
                let result = chain.apply(create_test_entity(10)).await;
                std::hint::black_box(result)
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_lru_insert,
    bench_lru_get_hit,
    bench_lru_values,
    bench_chain_apply,
);

criterion_main!(benches);
