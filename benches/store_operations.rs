use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use replica_target::storage::{ChangesQuery, DocumentStore, MemoryDatabase};
use serde_json::{json, Value};
use std::collections::BTreeMap;

fn batch(prefix: &str, size: usize) -> Vec<Value> {
    (0..size)
        .map(|i| json!({"_id": format!("{}-{}", prefix, i), "n": i, "tags": ["a", "b"]}))
        .collect()
}

fn bench_bulk_docs(c: &mut Criterion) {
    let mut group = c.benchmark_group("bulk_docs");
    for size in [10usize, 100, 1000] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter_with_setup(
                || (MemoryDatabase::new("bench"), batch("doc", size)),
                |(db, docs)| black_box(db.bulk_docs(docs, true)),
            )
        });
    }
    group.finish();
}

fn bench_revs_diff(c: &mut Criterion) {
    let db = MemoryDatabase::new("bench");
    let stored = db.bulk_docs(batch("doc", 1000), true);
    let mut request: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (i, result) in stored.iter().enumerate() {
        let id = format!("doc-{}", i);
        let mut revs = vec![format!("2-{:032x}", i)];
        if let Ok(value) = serde_json::to_value(result) {
            if let Some(rev) = value["rev"].as_str() {
                revs.push(rev.to_string());
            }
        }
        request.insert(id, revs);
    }

    c.bench_function("revs_diff_1000", |b| b.iter(|| black_box(db.revs_diff(&request))));
}

fn bench_changes(c: &mut Criterion) {
    let db = MemoryDatabase::new("bench");
    db.bulk_docs(batch("doc", 5000), true);
    let query = ChangesQuery::parse(Some("1000"), None, None, None).unwrap();

    c.bench_function("changes_since_1000", |b| {
        b.iter(|| {
            let feed = db.changes(&query).unwrap();
            black_box(feed.count())
        })
    });
}

criterion_group!(benches, bench_bulk_docs, bench_revs_diff, bench_changes);
criterion_main!(benches);
