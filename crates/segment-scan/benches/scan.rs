use criterion::{criterion_group, criterion_main, Criterion, Throughput};

use segment_scan::testutil::InMemorySegment;
use segment_scan::{make_cursor_holder, Cursor, CursorBuildSpec};

criterion_group!(benches, scalar_vs_vector);
criterion_main!(benches);

#[cfg(not(debug_assertions))]
const NUM_ROWS: i64 = 100_000;
#[cfg(debug_assertions)]
const NUM_ROWS: i64 = 100;

fn build_segment() -> InMemorySegment {
    InMemorySegment::builder()
        .time_column((0..NUM_ROWS).collect())
        .long_column("LONG", (0..NUM_ROWS).map(Some).collect())
        .build()
}

fn scalar_vs_vector(c: &mut Criterion) {
    let segment = build_segment();
    let mut group = c.benchmark_group(format!("scan/num_rows={NUM_ROWS}"));
    group.throughput(Throughput::Elements(NUM_ROWS as u64));

    group.bench_function("scalar", |b| {
        b.iter(|| {
            let holder = make_cursor_holder(&segment, CursorBuildSpec::default()).unwrap();
            let mut cursor = holder.as_cursor().unwrap();
            let mut count = 0u64;
            while !cursor.is_done() {
                count += criterion::black_box(cursor.current_row()) as u64;
                cursor.advance().unwrap();
            }
            count
        });
    });

    group.bench_function("vector", |b| {
        b.iter(|| {
            let holder = make_cursor_holder(&segment, CursorBuildSpec::default().with_vector_size(1024)).unwrap();
            let mut cursor = holder.as_vector_cursor().unwrap();
            let mut count = 0u64;
            while !cursor.is_done() {
                for row in criterion::black_box(cursor.current_rows()) {
                    count += row as u64;
                }
                cursor.advance().unwrap();
            }
            count
        });
    });

    group.finish();
}
