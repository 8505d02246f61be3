//! The seven literal end-to-end scenarios, one `#[test]` per scenario.

use std::sync::Arc;

use segment_scan::testutil::{InMemorySegment, LongEqualsFilter};
use segment_scan::{
    make_cursor_holder, AddConstantVirtualColumn, CursorBuildSpec, Cursor, Granularity, Interval,
    ObjectValue, ScalarSelector, VirtualColumns, TIME_COLUMN,
};

fn long_as_string(selector: &dyn ScalarSelector) -> Option<String> {
    match selector.get_object() {
        Some(ObjectValue::Single(s)) => Some(s),
        Some(ObjectValue::Multi(_)) | None => None,
    }
}

#[test]
fn s1_full_scan_reads_string_column() {
    let segment = InMemorySegment::builder()
        .time_column(vec![0, 3_600_000, 7_200_000])
        .long_column("LONG", vec![Some(0), Some(1), Some(2)])
        .build();

    let holder = make_cursor_holder(&segment, CursorBuildSpec::default()).unwrap();
    let mut cursor = holder.as_cursor().unwrap();
    let long = cursor
        .column_selector_factory()
        .make_scalar_selector("LONG", cursor.shared_offset());

    let mut rows = vec![];
    while !cursor.is_done() {
        rows.push(long_as_string(&*long));
        cursor.advance().unwrap();
    }
    assert_eq!(
        rows,
        vec![Some("0".into()), Some("1".into()), Some("2".into())]
    );
}

#[test]
fn s2_equality_filter_narrows_to_one_row() {
    let segment = InMemorySegment::builder()
        .time_column(vec![0, 3_600_000, 7_200_000])
        .long_column("LONG", vec![Some(0), Some(1), Some(2)])
        .build();

    let filter = Arc::new(LongEqualsFilter {
        column: "LONG".to_string(),
        target: 1,
    });
    let spec = CursorBuildSpec::default().with_filter(filter);
    let holder = make_cursor_holder(&segment, spec).unwrap();
    let mut cursor = holder.as_cursor().unwrap();
    let long = cursor
        .column_selector_factory()
        .make_scalar_selector("LONG", cursor.shared_offset());

    let mut rows = vec![];
    while !cursor.is_done() {
        rows.push(long_as_string(&*long));
        cursor.advance().unwrap();
    }
    assert_eq!(rows, vec![Some("1".into())]);
}

#[test]
fn s3_filter_on_nonexistent_column_matches_every_row() {
    let segment = InMemorySegment::builder().time_column(vec![0, 3_600_000]).build();

    let filter = Arc::new(segment_scan::testutil::IsNullFilter {
        column: "nonexistent".to_string(),
    });
    let spec = CursorBuildSpec::default().with_filter(filter);
    let holder = make_cursor_holder(&segment, spec).unwrap();
    let mut cursor = holder.as_cursor().unwrap();

    let mut rows = vec![];
    while !cursor.is_done() {
        rows.push(cursor.current_row());
        cursor.advance().unwrap();
    }
    assert_eq!(rows, vec![0, 1]);
}

#[test]
fn s4_filter_on_virtual_column() {
    let segment = InMemorySegment::builder()
        .time_column(vec![0, 3_600_000])
        .long_column("LONG", vec![Some(0), Some(1)])
        .build();

    let mut vcs = VirtualColumns::empty();
    vcs.register(Arc::new(AddConstantVirtualColumn {
        name: "vc".to_string(),
        input: "LONG".to_string(),
        constant: 1,
    }))
    .unwrap();

    let filter = Arc::new(LongEqualsFilter {
        column: "vc".to_string(),
        target: 2,
    });
    let spec = CursorBuildSpec::default()
        .with_virtual_columns(vcs)
        .with_filter(filter);
    let holder = make_cursor_holder(&segment, spec).unwrap();
    let mut cursor = holder.as_cursor().unwrap();

    let mut rows = vec![];
    while !cursor.is_done() {
        rows.push(cursor.current_row());
        cursor.advance().unwrap();
    }
    assert_eq!(rows, vec![1]);
}

#[test]
fn s5_descending_hourly_buckets_tag_each_row() {
    // __time = [0, 1, 1, 2, 3] hours; LONG textually mirrors the row index.
    let segment = InMemorySegment::builder()
        .time_column(vec![0, 3_600_000, 3_600_000, 7_200_000, 10_800_000])
        .long_column("LONG", vec![Some(0), Some(1), Some(1), Some(2), Some(3)])
        .build();

    let spec = CursorBuildSpec::default()
        .with_interval(Interval::new(3_600_000, 10_800_000))
        .descending();
    let holder = make_cursor_holder(&segment, spec).unwrap();
    let mut cursor = holder.as_cursor().unwrap();

    let time = cursor
        .column_selector_factory()
        .make_scalar_selector(TIME_COLUMN, cursor.shared_offset());
    let long = cursor
        .column_selector_factory()
        .make_scalar_selector("LONG", cursor.shared_offset());

    let mut pairs = vec![];
    while !cursor.is_done() {
        let bucket = Granularity::Hour.truncate(time.get_long().unwrap());
        pairs.push((bucket, long_as_string(&*long)));
        cursor.advance().unwrap();
    }
    assert_eq!(
        pairs,
        vec![
            (7_200_000, Some("2".into())),
            (3_600_000, Some("1".into())),
            (3_600_000, Some("1".into())),
        ]
    );
}

#[test]
fn s6_descending_ordering_reverses_rows() {
    let segment = InMemorySegment::builder()
        .time_column(vec![0, 3_600_000, 7_200_000])
        .long_column("LONG", vec![Some(0), Some(1), Some(2)])
        .build();

    let spec = CursorBuildSpec::default().descending();
    let holder = make_cursor_holder(&segment, spec).unwrap();
    let mut cursor = holder.as_cursor().unwrap();
    let long = cursor
        .column_selector_factory()
        .make_scalar_selector("LONG", cursor.shared_offset());

    let mut rows = vec![];
    while !cursor.is_done() {
        rows.push(long_as_string(&*long));
        cursor.advance().unwrap();
    }
    assert_eq!(
        rows,
        vec![Some("2".into()), Some("1".into()), Some("0".into())]
    );
}

#[test]
fn s7_interval_outside_segment_yields_no_rows() {
    let segment = InMemorySegment::builder()
        .time_column(vec![0, 3_600_000, 7_200_000])
        .build();

    let year_2000 = 946_684_800_000;
    let spec = CursorBuildSpec::default().with_interval(Interval::new(year_2000, year_2000 + 86_400_000));
    let holder = make_cursor_holder(&segment, spec).unwrap();
    let cursor = holder.as_cursor().unwrap();
    assert!(cursor.is_done());
}
