use std::hint::black_box;
use std::time::{Duration, Instant};

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use sqlite_dual::prelude::*;
use tokio::runtime::Runtime;

const SCHEMA: &str = "CREATE TABLE symbols (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    kind TEXT NOT NULL,
    line INTEGER NOT NULL,
    score REAL,
    body BLOB
)";

const INSERT: &str = "INSERT INTO symbols (id, name, kind, line, score, body) VALUES (?, ?, ?, ?, ?, ?)";

fn benchmark_rows() -> usize {
    std::env::var("BENCH_ROWS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(5_000)
}

// Deterministic rows so runs are comparable.
fn generate_rows(num_rows: usize) -> Vec<Vec<RowValues>> {
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let kinds = ["fn", "struct", "enum", "trait", "const"];
    (0..num_rows)
        .map(|i| {
            let blob_len = rng.random_range(8..=32);
            let body: Vec<u8> = (0..blob_len).map(|_| rng.random_range(0..=255)).collect();
            vec![
                RowValues::Int(i64::try_from(i).unwrap_or(i64::MAX)),
                RowValues::Text(format!("symbol_{}", rng.random_range(1..100_000))),
                RowValues::from(kinds[rng.random_range(0..kinds.len())]),
                RowValues::Int(rng.random_range(1..10_000)),
                RowValues::Float(rng.random_range(0.0..1.0)),
                RowValues::Blob(body),
            ]
        })
        .collect()
}

async fn fresh_database(backend: BackendType) -> Database {
    let registry = BackendRegistry::new();
    let mut db = Database::open(&registry, DatabaseOptions::new().with_backend(backend))
        .await
        .expect("open database");
    db.exec_sql(SCHEMA).expect("create schema");
    db
}

fn benchmark_backend(
    group: &mut criterion::BenchmarkGroup<'_, criterion::measurement::WallTime>,
    runtime: &Runtime,
    backend: BackendType,
    rows: &[Vec<RowValues>],
) {
    group.bench_function(BenchmarkId::new(backend.to_string(), rows.len()), |b| {
        b.to_async(runtime).iter_custom(|iters| async move {
            let mut total = Duration::default();
            for _ in 0..iters {
                let mut db = fresh_database(backend).await;
                let start = Instant::now();
                let inserted = db.bulk_insert(INSERT, rows).expect("bulk insert");
                total += start.elapsed();
                black_box(inserted);
                db.close().expect("close database");
            }
            total
        });
    });
}

fn bulk_insert(c: &mut Criterion) {
    let runtime = Runtime::new().expect("create tokio runtime");
    let rows = generate_rows(benchmark_rows());

    let mut group = c.benchmark_group("bulk_insert");
    group.throughput(Throughput::Elements(rows.len() as u64));
    group.sample_size(10);

    if cfg!(feature = "sqlite") {
        benchmark_backend(&mut group, &runtime, BackendType::Native, &rows);
    }
    if cfg!(feature = "turso") {
        benchmark_backend(&mut group, &runtime, BackendType::Portable, &rows);
    }

    group.finish();
}

criterion_group!(benches, bulk_insert);
criterion_main!(benches);
