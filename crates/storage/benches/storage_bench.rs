use criterion::{Criterion, criterion_group, criterion_main};
use serde_json::json;
use storage::{AggregateKey, InMemoryStorage, StorageBackend, WriteBatch};

fn order_state(n: i64) -> serde_json::Value {
    json!({
        "account_id": 42,
        "status": "Pending",
        "lines": [{"book_id": n, "quantity": 2, "unit_price": 1000}]
    })
}

fn bench_insert(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("storage/insert", |b| {
        b.iter(|| {
            rt.block_on(async {
                let store = InMemoryStorage::new();
                store.insert("Order", order_state(1)).await.unwrap();
            });
        });
    });
}

fn bench_write_batch_10(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryStorage::new();
    let ids: Vec<i64> = rt.block_on(async {
        let mut ids = Vec::new();
        for n in 0..10 {
            ids.push(store.insert("Order", order_state(n)).await.unwrap());
        }
        ids
    });

    c.bench_function("storage/write_batch_10", |b| {
        b.iter(|| {
            rt.block_on(async {
                let batch = ids.iter().fold(WriteBatch::new(), |batch, id| {
                    batch.update(AggregateKey::new("Order", *id), order_state(*id))
                });
                store.write(batch).await.unwrap();
            });
        });
    });
}

fn bench_count_references(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryStorage::new();

    // Pre-populate with 1000 books
    rt.block_on(async {
        for n in 0..1000 {
            store
                .insert("Book", json!({"genre_ids": [n % 10, 99]}))
                .await
                .unwrap();
        }
    });

    c.bench_function("storage/count_references_1000", |b| {
        b.iter(|| {
            rt.block_on(async {
                store.count_references("Book", "genre_ids", 3).await.unwrap();
            });
        });
    });
}

criterion_group!(
    benches,
    bench_insert,
    bench_write_batch_10,
    bench_count_references
);
criterion_main!(benches);
