//! `QueryMetrics` (`spec.md` §6) — an optional, side-effect-only sink.
//!
//! Testable property 3 (`spec.md` §8) requires `emitted_count` to be
//! unaffected by whether metrics are recorded; every call site in this crate
//! treats the sink as write-only and never branches on what it returns.

use std::sync::atomic::{AtomicU64, Ordering};

/// Diagnostic sink a caller may attach to a scan. None of these calls may
/// influence row selection or ordering.
pub trait QueryMetrics: std::fmt::Debug {
    fn vectorized(&self, vectorized: bool);

    fn report_segment_rows(&self, rows: u64);

    fn report_bitmap_construction_time_ns(&self, ns: u64);

    fn report_pre_filtered_rows(&self, rows: u64);

    fn filter_bundle(&self, info: &str);
}

/// The default sink: does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopQueryMetrics;

impl QueryMetrics for NoopQueryMetrics {
    fn vectorized(&self, _vectorized: bool) {}
    fn report_segment_rows(&self, _rows: u64) {}
    fn report_bitmap_construction_time_ns(&self, _ns: u64) {}
    fn report_pre_filtered_rows(&self, _rows: u64) {}
    fn filter_bundle(&self, _info: &str) {}
}

/// A test double that records counts, used by the testable-property suite
/// to assert that attaching metrics never changes `emitted_count`.
#[derive(Debug, Default)]
pub struct RecordingQueryMetrics {
    pub vectorized_calls: AtomicU64,
    pub segment_rows: AtomicU64,
    pub bitmap_construction_time_ns: AtomicU64,
    pub pre_filtered_rows: AtomicU64,
    pub filter_bundle_calls: AtomicU64,
}

impl QueryMetrics for RecordingQueryMetrics {
    fn vectorized(&self, _vectorized: bool) {
        self.vectorized_calls.fetch_add(1, Ordering::Relaxed);
    }

    fn report_segment_rows(&self, rows: u64) {
        self.segment_rows.store(rows, Ordering::Relaxed);
    }

    fn report_bitmap_construction_time_ns(&self, ns: u64) {
        self.bitmap_construction_time_ns.fetch_add(ns, Ordering::Relaxed);
    }

    fn report_pre_filtered_rows(&self, rows: u64) {
        self.pre_filtered_rows.fetch_add(rows, Ordering::Relaxed);
    }

    fn filter_bundle(&self, _info: &str) {
        self.filter_bundle_calls.fetch_add(1, Ordering::Relaxed);
    }
}
