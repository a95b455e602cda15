//! Performance benchmarks for navhist
//!
//! **Benchmarks Included:**
//! - `visit_insert`: inserting visits inside one outer transaction, with
//!   each visit wrapped in a nested transaction
//! - `segment_usage`: scoring segment usage at several table sizes
//! - `url_lookup`: single URL lookup by exact URL
//!
//! **Run benchmarks:**
//! ```bash
//! cargo bench                          # Run all benchmarks
//! cargo bench -- visit_insert          # Insert only
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use navhist::storage::{Time, UrlRow, VisitRow};
use navhist::HistoryDatabase;
use tempfile::TempDir;

/// Create a file-backed database so commits hit disk.
fn create_benchmark_db() -> (TempDir, HistoryDatabase) {
    let tmpdir = TempDir::new().expect("failed to create temp dir");
    let db = HistoryDatabase::builder()
        .init(tmpdir.path().join("History"))
        .expect("failed to open history database");
    (tmpdir, db)
}

fn bench_visit_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("visit_insert");
    group.sample_size(10);
    group.measurement_time(std::time::Duration::from_secs(5));

    for batch_size in &[10, 100, 1000] {
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{batch_size}_visits")),
            batch_size,
            |b, &batch_size| {
                let (_tmpdir, db) = create_benchmark_db();
                let url_id = db
                    .urls()
                    .add_url(&UrlRow::new("https://example.com/"))
                    .expect("failed to add url");

                b.iter(|| {
                    db.with_transaction(|db| {
                        for _ in 0..batch_size {
                            db.with_transaction(|db| {
                                db.visits()
                                    .add_visit(&VisitRow::new(url_id, Time::now(), 0))
                            })?;
                        }
                        Ok(())
                    })
                    .expect("insert batch failed");
                });
            },
        );
    }

    group.finish();
}

fn bench_segment_usage(c: &mut Criterion) {
    let mut group = c.benchmark_group("segment_usage");
    group.sample_size(10);
    group.measurement_time(std::time::Duration::from_secs(5));

    for count in &[10, 100, 1000] {
        let (_tmpdir, db) = create_benchmark_db();
        let now = Time::now();
        db.with_transaction(|db| {
            for i in 0..*count {
                let url = format!("https://site{i}.example/");
                let url_id = db.urls().add_url(&UrlRow::new(url.clone()))?;
                let segment = db.segments().create_segment(url_id, &url)?;
                db.segments()
                    .increase_segment_visit_count(segment, now, i % 7 + 1)?;
            }
            Ok(())
        })
        .expect("failed to seed segments");

        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, _| {
            b.iter(|| {
                let results = db
                    .segments()
                    .query_segment_usage(Time::default(), 20)
                    .expect("query failed");
                black_box(results);
            });
        });
    }

    group.finish();
}

fn bench_url_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("url_lookup");
    group.sample_size(10);
    group.measurement_time(std::time::Duration::from_secs(5));

    let (_tmpdir, db) = create_benchmark_db();
    db.with_transaction(|db| {
        for i in 0..1000 {
            db.urls()
                .add_url(&UrlRow::new(format!("https://example.com/page/{i}")))?;
        }
        Ok(())
    })
    .expect("failed to seed urls");

    group.bench_function("row_for_url", |b| {
        b.iter(|| {
            let row = db
                .urls()
                .row_for_url(black_box("https://example.com/page/500"))
                .expect("lookup failed");
            black_box(row);
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_visit_insert,
    bench_segment_usage,
    bench_url_lookup
);
criterion_main!(benches);
