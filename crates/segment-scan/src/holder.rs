//! Cursor holder (`spec.md` §4.8, component C8): strategy selection plus
//! lifetime ownership of the transient resources one scan needs.

use std::cell::Cell;
use std::sync::Arc;

use ahash::AHashMap;

use crate::cancellation::Cancellation;
use crate::column_cache::{ColumnCache, Closer};
use crate::cursor::ScalarCursor;
use crate::error::{invariant, ConfigError, ExecutionError, HolderError};
use crate::filter::{BitmapIndexSelector, Filter, FilterBundle, MatcherBundleFactory};
use crate::metrics::QueryMetrics;
use crate::offset::{Ascending, BitmapOffset, Descending, FilteredOffset, Offset, TimestampCheckingOffset};
use crate::segment::{ColumnCapabilities, NullPolicy, Segment, TIME_COLUMN};
use crate::selector::{shared_vector_offset, ColumnSelectorFactory};
use crate::time::{time_search_with, Interval};
use crate::vector_cursor::{BitmapVectorOffset, FilteredVectorOffset, NoFilterVectorOffset, VectorCursor, VectorOffset};
use crate::virtual_columns::{SegmentColumnInspector, VirtualColumns};

/// Gates vectorized evaluation of virtual columns (`spec.md` §6,
/// `query_context.vectorize_virtual_columns`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Vectorization {
    /// Assume every declared virtual column vectorizes; skip the per-column
    /// check.
    Force,
    /// Ask each virtual column via [`crate::virtual_columns::VirtualColumn::can_vectorize`].
    Auto,
    /// Never vectorize if any virtual column is declared.
    False,
}

/// An aggregator consulted only for vectorization gating (`spec.md` §2/§4.7);
/// aggregation itself is out of this crate's scope.
pub trait Aggregator: std::fmt::Debug {
    fn can_vectorize(&self) -> bool;
}

/// `spec.md` §3/§6: the parameters of one scan request.
pub struct CursorBuildSpec {
    pub interval: Interval,
    pub filter: Option<Arc<dyn Filter>>,
    pub virtual_columns: VirtualColumns,
    pub preferred_ordering: Vec<(String, bool)>,
    pub vector_size: usize,
    pub vectorize_virtual_columns: Vectorization,
    pub aggregators: Vec<Arc<dyn Aggregator>>,
    pub cancellation: Cancellation,
    pub query_metrics: Option<Arc<dyn QueryMetrics>>,
    pub null_policy: NullPolicy,
}

impl Default for CursorBuildSpec {
    fn default() -> Self {
        Self {
            interval: Interval::ETERNITY,
            filter: None,
            virtual_columns: VirtualColumns::empty(),
            preferred_ordering: Vec::new(),
            vector_size: 512,
            vectorize_virtual_columns: Vectorization::Auto,
            aggregators: Vec::new(),
            cancellation: Cancellation::none(),
            query_metrics: None,
            null_policy: NullPolicy::default(),
        }
    }
}

impl CursorBuildSpec {
    pub fn with_interval(mut self, interval: Interval) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_filter(mut self, filter: Arc<dyn Filter>) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_virtual_columns(mut self, virtual_columns: VirtualColumns) -> Self {
        self.virtual_columns = virtual_columns;
        self
    }

    /// `preferred_ordering = [(__time, descending=true)]`.
    pub fn descending(mut self) -> Self {
        self.preferred_ordering = vec![(TIME_COLUMN.to_string(), true)];
        self
    }

    pub fn with_vector_size(mut self, vector_size: usize) -> Self {
        self.vector_size = vector_size;
        self
    }

    pub fn with_cancellation(mut self, cancellation: Cancellation) -> Self {
        self.cancellation = cancellation;
        self
    }

    pub fn with_query_metrics(mut self, metrics: Arc<dyn QueryMetrics>) -> Self {
        self.query_metrics = Some(metrics);
        self
    }

    pub fn with_null_policy(mut self, null_policy: NullPolicy) -> Self {
        self.null_policy = null_policy;
        self
    }
}

fn resolve_ordering(preferred: &[(String, bool)]) -> Result<bool, ConfigError> {
    match preferred.first() {
        None => Ok(false),
        Some((column, descending)) if column == TIME_COLUMN => Ok(*descending),
        Some((column, _)) => Err(ConfigError::UnsupportedOrdering { column: column.clone() }),
    }
}

#[derive(Debug)]
struct NoIndexSelector {
    total_rows: usize,
}

impl BitmapIndexSelector for NoIndexSelector {
    fn bitmap_for(&self, _column: &str, _value: &str) -> Option<crate::bitmap::RowBitmap> {
        None
    }

    fn total_rows(&self) -> usize {
        self.total_rows
    }
}

/// The iteration strategy selected per `spec.md` §4.5's five-case policy.
enum ScanStrategy {
    FullScan,
    IndexOnly(crate::filter::BitmapHolder),
    MatcherOnly(Arc<dyn MatcherBundleFactory>),
    Hybrid(crate::filter::BitmapHolder, Arc<dyn MatcherBundleFactory>),
}

/// Fixed-point resolution of virtual column capabilities, so that a virtual
/// column depending on another virtual column sees the dependency's
/// capabilities already computed. Bounded by one pass per declared column.
fn compute_virtual_capabilities(
    segment: &dyn Segment,
    virtual_columns: &VirtualColumns,
) -> AHashMap<String, ColumnCapabilities> {
    let mut caps: AHashMap<String, ColumnCapabilities> = AHashMap::new();
    let names: Vec<String> = virtual_columns.names().map(str::to_string).collect();
    for _ in 0..names.len() {
        let mut progressed = false;
        for name in &names {
            if caps.contains_key(name) {
                continue;
            }
            let Some(vc) = virtual_columns.get(name) else {
                continue;
            };
            let inspector = SegmentColumnInspector {
                segment,
                virtual_capabilities: &caps,
            };
            if let Some(c) = vc.capabilities(&inspector) {
                caps.insert(name.clone(), c);
                progressed = true;
            }
        }
        if !progressed {
            break;
        }
    }
    caps
}

/// Owns the column cache, the closer, and the selected scan strategy for one
/// scan request. See module docs and `spec.md` §4.8 for the INIT → READY →
/// CLOSED state machine.
pub struct CursorHolder<'seg> {
    segment: &'seg dyn Segment,
    column_cache: ColumnCache<'seg>,
    closer: Closer,
    virtual_columns: VirtualColumns,
    strategy: ScanStrategy,
    descending: bool,
    interval: Interval,
    vector_size: usize,
    can_vectorize_flag: bool,
    cancellation: Cancellation,
    null_policy: NullPolicy,
    closed: Cell<bool>,
}

/// Builds a holder and resolves its scan strategy up front, per `spec.md`
/// §4.5/§4.8: ordering is validated, the filter bundle (if any) is built
/// exactly once, and vectorizability is decided before any cursor exists.
#[tracing::instrument(level = "debug", skip(segment, spec), fields(interval_start = spec.interval.start, interval_end = spec.interval.end))]
pub fn make_cursor_holder<'seg>(
    segment: &'seg dyn Segment,
    spec: CursorBuildSpec,
) -> Result<CursorHolder<'seg>, HolderError> {
    let descending = resolve_ordering(&spec.preferred_ordering)?;
    let total_rows = segment.num_rows();
    if let Some(metrics) = spec.query_metrics.as_deref() {
        metrics.report_segment_rows(total_rows as u64);
    }

    let strategy = match &spec.filter {
        None => ScanStrategy::FullScan,
        Some(filter) => {
            let index_selector: Arc<dyn BitmapIndexSelector> = segment
                .bitmap_factory()
                .unwrap_or_else(|| Arc::new(NoIndexSelector { total_rows }));
            let build_started = web_time::Instant::now();
            let bundle: FilterBundle = filter.make_filter_bundle(
                index_selector.as_ref(),
                total_rows,
                0,
                false,
                spec.query_metrics.as_deref(),
            );
            if let Some(metrics) = spec.query_metrics.as_deref() {
                metrics.report_bitmap_construction_time_ns(build_started.elapsed().as_nanos() as u64);
                let description = match &bundle.index {
                    Some(index) => index.debug_info.clone(),
                    None => format!("{filter:?}"),
                };
                if let Some(index) = &bundle.index {
                    metrics.report_pre_filtered_rows(index.bitmap.count_ones() as u64);
                }
                metrics.filter_bundle(&description);
            }
            let strategy = match (bundle.index, bundle.matcher_bundle) {
                (Some(index), None) => ScanStrategy::IndexOnly(index),
                (None, Some(matcher_bundle)) => ScanStrategy::MatcherOnly(matcher_bundle),
                (Some(index), Some(matcher_bundle)) => ScanStrategy::Hybrid(index, matcher_bundle),
                (None, None) => {
                    return Err(HolderError::Execution(ExecutionError::UnmatchableFilter {
                        filter: format!("{filter:?}"),
                    }))
                }
            };
            tracing::debug!(filter = ?filter, "resolved filter bundle");
            strategy
        }
    };

    let virtual_capabilities = compute_virtual_capabilities(segment, &spec.virtual_columns);
    let inspector = SegmentColumnInspector {
        segment,
        virtual_capabilities: &virtual_capabilities,
    };
    let vc_vectorizable = match spec.vectorize_virtual_columns {
        Vectorization::Force => true,
        Vectorization::False => spec.virtual_columns.names().next().is_none(),
        Vectorization::Auto => spec
            .virtual_columns
            .names()
            .all(|name| spec.virtual_columns.get(name).is_some_and(|vc| vc.can_vectorize(&inspector))),
    };
    let agg_vectorizable = spec.aggregators.iter().all(|a| a.can_vectorize());
    let matcher_vectorizable = match &strategy {
        ScanStrategy::MatcherOnly(m) | ScanStrategy::Hybrid(_, m) => m.can_vectorize(),
        ScanStrategy::FullScan | ScanStrategy::IndexOnly(_) => true,
    };
    let can_vectorize_flag = !descending && vc_vectorizable && agg_vectorizable && matcher_vectorizable;
    if let Some(metrics) = spec.query_metrics.as_deref() {
        metrics.vectorized(can_vectorize_flag);
    }

    Ok(CursorHolder {
        segment,
        column_cache: ColumnCache::new(segment),
        closer: Closer::default(),
        virtual_columns: spec.virtual_columns,
        strategy,
        descending,
        interval: spec.interval,
        vector_size: spec.vector_size,
        can_vectorize_flag,
        cancellation: spec.cancellation,
        null_policy: spec.null_policy,
        closed: Cell::new(false),
    })
}

impl<'seg> CursorHolder<'seg> {
    pub fn can_vectorize(&self) -> bool {
        self.can_vectorize_flag
    }

    /// `(column, descending)`; only `__time` ordering is ever reported
    /// (`spec.md` §9 "Ordering hints beyond time").
    pub fn ordering(&self) -> (&'static str, bool) {
        (TIME_COLUMN, self.descending)
    }

    fn timestamps(&self) -> std::sync::Arc<dyn Fn(u32) -> i64 + Send + Sync> {
        let column = self
            .column_cache
            .get(TIME_COLUMN, &self.closer)
            .expect("every segment carries a __time column");
        std::sync::Arc::new(move |row| column.read_i64(row).expect("__time is never null"))
    }

    pub fn as_cursor(&self) -> Result<ScalarCursor<'_>, ExecutionError> {
        invariant!(!self.closed.get(), "as_cursor called on a closed holder");

        let factory = ColumnSelectorFactory::with_null_policy(
            &self.column_cache,
            &self.closer,
            &self.virtual_columns,
            self.null_policy,
        );
        let total_rows = self.segment.num_rows() as u32;
        let timestamps = self.timestamps();
        let seg_interval = self.segment.interval();

        let mut base: Box<dyn Offset> = match &self.strategy {
            ScanStrategy::FullScan | ScanStrategy::MatcherOnly(_) => {
                if self.descending {
                    Box::new(Descending::new(total_rows))
                } else {
                    Box::new(Ascending::new(total_rows))
                }
            }
            ScanStrategy::IndexOnly(holder) | ScanStrategy::Hybrid(holder, _) => {
                Box::new(BitmapOffset::new(&holder.bitmap, self.descending))
            }
        };

        // §4.6 step 3: skip rows outside the query interval before wrapping
        // with the boundary check, so `within_bounds` on the wrapped offset
        // never has to walk past already-known-out-of-range rows.
        if self.descending {
            while base.within_bounds() && timestamps(base.current()) >= self.interval.end {
                base.advance()?;
            }
        } else {
            let skip_limit = self.interval.start.max(seg_interval.start);
            while base.within_bounds() && timestamps(base.current()) < skip_limit {
                base.advance()?;
            }
        }

        let all_within = if self.descending {
            seg_interval.start >= self.interval.start
        } else {
            seg_interval.end <= self.interval.end
        };
        let limit = if self.descending { self.interval.start } else { self.interval.end };
        let checked = TimestampCheckingOffset::new(base, timestamps, limit, self.descending, all_within);

        let final_offset: Box<dyn Offset> = match &self.strategy {
            ScanStrategy::MatcherOnly(bundle) | ScanStrategy::Hybrid(_, bundle) => {
                let matcher = bundle.make_matcher(&factory);
                Box::new(FilteredOffset::new(checked.clone_box(), matcher, self.cancellation.clone())?)
            }
            ScanStrategy::FullScan | ScanStrategy::IndexOnly(_) => Box::new(checked),
        };

        Ok(ScalarCursor::from_offset(final_offset, factory))
    }

    pub fn as_vector_cursor(&self) -> Result<VectorCursor<'_>, ExecutionError> {
        invariant!(!self.closed.get(), "as_vector_cursor called on a closed holder");
        if !self.can_vectorize_flag {
            return Err(ExecutionError::NotVectorizable);
        }

        let factory = ColumnSelectorFactory::with_null_policy(
            &self.column_cache,
            &self.closer,
            &self.virtual_columns,
            self.null_policy,
        );
        let n = self.segment.num_rows();
        let column = self
            .column_cache
            .get(TIME_COLUMN, &self.closer)
            .expect("every segment carries a __time column");
        let at = |i: usize| column.read_i64(i as u32).expect("__time is never null");
        let seg_interval = self.segment.interval();

        let lo = self.interval.start.max(seg_interval.start);
        let start = time_search_with(lo, 0, n, at) as u32;
        let end = time_search_with(self.interval.end, 0, n, at) as u32;

        let base: Box<dyn VectorOffset> = match &self.strategy {
            ScanStrategy::FullScan | ScanStrategy::MatcherOnly(_) => {
                Box::new(NoFilterVectorOffset::new(self.vector_size, start, end))
            }
            ScanStrategy::IndexOnly(holder) | ScanStrategy::Hybrid(holder, _) => {
                Box::new(BitmapVectorOffset::new(self.vector_size, &holder.bitmap, start, end))
            }
        };

        let final_offset: Box<dyn VectorOffset> = match &self.strategy {
            ScanStrategy::MatcherOnly(bundle) | ScanStrategy::Hybrid(_, bundle) => {
                let matcher = bundle.make_vector_matcher(&factory);
                Box::new(FilteredVectorOffset::new(base, matcher))
            }
            ScanStrategy::FullScan | ScanStrategy::IndexOnly(_) => base,
        };

        Ok(VectorCursor::new(shared_vector_offset(final_offset), factory))
    }

    #[tracing::instrument(level = "debug", skip(self))]
    pub fn close(&self) {
        if self.closed.replace(true) {
            return;
        }
        self.closer.close();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{InMemorySegment, LongEqualsFilter};

    #[test]
    fn unsupported_ordering_is_rejected() {
        let segment = InMemorySegment::builder().time_column(vec![0, 1, 2]).build();
        let spec = CursorBuildSpec {
            preferred_ordering: vec![("not_time".to_string(), false)],
            ..Default::default()
        };
        let err = make_cursor_holder(&segment, spec).unwrap_err();
        assert!(matches!(err, HolderError::Config(ConfigError::UnsupportedOrdering { .. })));
    }

    #[test]
    fn unmatchable_filter_is_rejected() {
        #[derive(Debug)]
        struct NullBundleFilter;
        impl Filter for NullBundleFilter {
            fn make_filter_bundle(
                &self,
                _index_selector: &dyn BitmapIndexSelector,
                _total_rows: usize,
                _applied_rows_so_far: usize,
                _cnf_already_applied: bool,
                _metrics: Option<&dyn QueryMetrics>,
            ) -> FilterBundle {
                FilterBundle::none()
            }
        }

        let segment = InMemorySegment::builder().time_column(vec![0, 1]).build();
        let spec = CursorBuildSpec::default().with_filter(Arc::new(NullBundleFilter));
        let err = make_cursor_holder(&segment, spec).unwrap_err();
        assert!(matches!(
            err,
            HolderError::Execution(ExecutionError::UnmatchableFilter { .. })
        ));
    }

    #[test]
    fn full_scan_emits_all_rows_ascending() {
        let segment = InMemorySegment::builder().time_column(vec![0, 1, 2]).build();
        let holder = make_cursor_holder(&segment, CursorBuildSpec::default()).unwrap();
        let mut cursor = holder.as_cursor().unwrap();
        let mut rows = vec![];
        while !cursor.is_done() {
            rows.push(cursor.current_row());
            cursor.advance().unwrap();
        }
        assert_eq!(rows, vec![0, 1, 2]);
        holder.close();
        holder.close(); // idempotent
        assert!(holder.is_closed());
    }

    #[test]
    fn descending_ordering_reverses_rows() {
        let segment = InMemorySegment::builder().time_column(vec![0, 1, 2]).build();
        let spec = CursorBuildSpec::default().descending();
        let holder = make_cursor_holder(&segment, spec).unwrap();
        let mut cursor = holder.as_cursor().unwrap();
        let mut rows = vec![];
        while !cursor.is_done() {
            rows.push(cursor.current_row());
            cursor.advance().unwrap();
        }
        assert_eq!(rows, vec![2, 1, 0]);
        assert!(!holder.can_vectorize());
        assert!(matches!(holder.as_vector_cursor().unwrap_err(), ExecutionError::NotVectorizable));
    }

    #[test]
    fn matcher_only_filter_narrows_rows() {
        let segment = InMemorySegment::builder()
            .time_column(vec![0, 1, 2])
            .long_column("LONG", vec![Some(0), Some(1), Some(2)])
            .build();
        let filter = Arc::new(LongEqualsFilter {
            column: "LONG".to_string(),
            target: 1,
        });
        let spec = CursorBuildSpec::default().with_filter(filter);
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
    fn empty_interval_yields_no_rows() {
        let segment = InMemorySegment::builder().time_column(vec![0, 1, 2]).build();
        let spec = CursorBuildSpec::default().with_interval(Interval::new(100, 100));
        let holder = make_cursor_holder(&segment, spec).unwrap();
        let mut cursor = holder.as_cursor().unwrap();
        assert!(cursor.is_done());
        let _ = &mut cursor;
    }

    #[test]
    fn vector_and_scalar_cursors_agree_when_unfiltered() {
        let segment = InMemorySegment::builder()
            .time_column((0..20).collect())
            .long_column("LONG", (0..20).map(|i| Some(i as i64)).collect())
            .build();
        let holder = make_cursor_holder(&segment, CursorBuildSpec::default().with_vector_size(6)).unwrap();
        assert!(holder.can_vectorize());

        let mut scalar_rows = vec![];
        let mut cursor = holder.as_cursor().unwrap();
        while !cursor.is_done() {
            scalar_rows.push(cursor.current_row());
            cursor.advance().unwrap();
        }

        let mut vector_rows = vec![];
        let mut vcursor = holder.as_vector_cursor().unwrap();
        while !vcursor.is_done() {
            vector_rows.extend(vcursor.current_rows());
            vcursor.advance().unwrap();
        }

        assert_eq!(scalar_rows, vector_rows);
    }
}
