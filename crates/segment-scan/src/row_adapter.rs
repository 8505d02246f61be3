//! Row-based adapter (`spec.md` §4.9, component C9): the same cursor
//! contract as [`crate::holder::CursorHolder`], over an opaque, lazy,
//! finite-or-infinite, restartable-or-not sequence of records instead of a
//! columnar [`crate::segment::Segment`].
//!
//! Unlike the columnar path, filtering and interval clipping happen while
//! materializing the sequence rather than through an `Offset` chain — there
//! is no bitmap index and no random access into the source sequence, only
//! one forward pass per [`RowBasedCursorHolder::as_cursor`] call.

use std::cell::Cell;
use std::rc::Rc;
use std::sync::Arc;

use crate::cancellation::Cancellation;
use crate::cursor::Cursor;
use crate::error::{invariant, ConfigError, ExecutionError};
use crate::offset::{Ascending, Offset};
use crate::segment::{ColumnType, NullPolicy, RowSignature, TIME_COLUMN};
use crate::selector::{shared_offset, NullScalarSelector, ObjectValue, ScalarSelector, SharedOffset};
use crate::time::Interval;

/// One decoded field value handed back by a [`ColumnFn`], before being cast
/// to the column's declared target type per the conversion table in
/// `spec.md` §4.9.
#[derive(Clone, Debug)]
pub enum RawValue {
    Null,
    Long(i64),
    Double(f64),
    Text(String),
}

pub type TimestampFn<R> = Arc<dyn Fn(&R) -> i64 + Send + Sync>;
/// `column_fn(name, record) -> value`, collapsing `spec.md`'s curried
/// `column_name -> (record -> object)` into a single two-argument call —
/// equivalent capability, one fewer allocation per lookup.
pub type ColumnFn<R> = Arc<dyn Fn(&str, &R) -> RawValue + Send + Sync>;
/// Produces a fresh iterator over the sequence plus its baggage. Called once
/// per [`RowBasedCursorHolder::as_cursor`] for descending order; twice for
/// ascending (a cheap probe pass, then the drain): see
/// [`RowBasedCursorHolder::close_counter`].
pub type SequenceFn<R> = Arc<dyn Fn() -> (Box<dyn Iterator<Item = R>>, Baggage) + Send + Sync>;

/// Deferred cleanup a sequence attaches to one materialization, released
/// exactly once (`spec.md` §4.9). A second release, or a drop without ever
/// releasing, indicates a bug in this module and is logged loudly rather
/// than silently ignored.
pub struct Baggage {
    cleanup: Option<Box<dyn FnOnce() + Send>>,
    released: Cell<bool>,
}

impl Baggage {
    pub fn new(cleanup: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cleanup: Some(Box::new(cleanup)),
            released: Cell::new(false),
        }
    }

    /// No cleanup needed.
    pub fn none() -> Self {
        Self {
            cleanup: None,
            released: Cell::new(false),
        }
    }

    fn release(&mut self) {
        if self.released.replace(true) {
            tracing::error!("row-based adapter baggage released more than once");
            panic!("row-based adapter baggage released more than once");
        }
        if let Some(cleanup) = self.cleanup.take() {
            cleanup();
        }
    }
}

impl Drop for Baggage {
    fn drop(&mut self) {
        if !self.released.get() && self.cleanup.is_some() {
            tracing::error!("row-based adapter baggage dropped without being released");
        }
    }
}

/// Declares how to pull typed rows out of an opaque sequence of `R`s.
pub struct RowAdapterSpec<R> {
    pub signature: RowSignature,
    pub timestamp_fn: TimestampFn<R>,
    pub column_fn: ColumnFn<R>,
    pub produce: SequenceFn<R>,
}

/// The parameters of one row-adapter scan, analogous to
/// [`crate::holder::CursorBuildSpec`] but narrower: no virtual columns, no
/// vectorization, no bitmap indexes, since none of those make sense without
/// random access into the source.
pub struct RowAdapterBuildSpec<R> {
    pub interval: Interval,
    pub filter: Option<Arc<dyn Fn(&R) -> bool + Send + Sync>>,
    pub descending: bool,
    pub cancellation: Cancellation,
    pub null_policy: NullPolicy,
}

impl<R> Default for RowAdapterBuildSpec<R> {
    fn default() -> Self {
        Self {
            interval: Interval::ETERNITY,
            filter: None,
            descending: false,
            cancellation: Cancellation::none(),
            null_policy: NullPolicy::default(),
        }
    }
}

/// Presents `can_vectorize`/`as_cursor`/`ordering`/`close` over a
/// materialized row sequence. `can_vectorize` is always `false`: `spec.md`
/// names no vector path for this component.
pub struct RowBasedCursorHolder<R> {
    spec: RowAdapterSpec<R>,
    interval: Interval,
    descending: bool,
    filter: Option<Arc<dyn Fn(&R) -> bool + Send + Sync>>,
    cancellation: Cancellation,
    null_policy: NullPolicy,
    close_counter: Cell<u32>,
    closed: Cell<bool>,
}

impl<R: 'static> RowBasedCursorHolder<R> {
    pub fn new(spec: RowAdapterSpec<R>, build: RowAdapterBuildSpec<R>) -> Self {
        Self {
            spec,
            interval: build.interval,
            descending: build.descending,
            filter: build.filter,
            cancellation: build.cancellation,
            null_policy: build.null_policy,
            close_counter: Cell::new(0),
            closed: Cell::new(false),
        }
    }

    pub fn can_vectorize(&self) -> bool {
        false
    }

    /// `(column, descending)` — only `__time` ordering, same as the
    /// columnar holder.
    pub fn ordering(&self) -> (&'static str, bool) {
        (TIME_COLUMN, self.descending)
    }

    /// Always `ETERNITY`: the adapter never inspects the sequence ahead of
    /// time (`spec.md` §4.9).
    pub fn interval(&self) -> Interval {
        Interval::ETERNITY
    }

    /// Deliberately unsupported — `spec.md` §9: "implementers should not
    /// 'fix' the behavior without source guidance."
    pub fn num_rows(&self) -> Result<usize, ConfigError> {
        Err(ConfigError::UnsupportedOperation {
            what: "num_rows on the row-based adapter",
        })
    }

    /// Deliberately unsupported, same rationale as [`Self::num_rows`].
    pub fn get_metadata(&self) -> Result<Option<String>, ConfigError> {
        Err(ConfigError::UnsupportedOperation {
            what: "get_metadata on the row-based adapter",
        })
    }

    /// How many times this holder has opened-and-closed the underlying
    /// sequence across every `as_cursor` call. Ascending order opens it
    /// twice (a probe pass, then the drain); descending opens it once,
    /// since reversal requires full buffering regardless, making a separate
    /// probe redundant. Per `spec.md` §8 testable property 9.
    pub fn close_counter(&self) -> u32 {
        self.close_counter.get()
    }

    fn materialize(&self) -> Vec<R> {
        let (iter, mut baggage) = (self.spec.produce)();
        let lo = self.interval.start;
        let hi = self.interval.end;
        let timestamp_fn = Arc::clone(&self.spec.timestamp_fn);
        let rows: Vec<R> = iter
            .filter(|record| {
                let t = timestamp_fn(record);
                t >= lo && t < hi
            })
            .filter(|record| match &self.filter {
                Some(f) => f(record),
                None => true,
            })
            .collect();
        baggage.release();
        self.close_counter.set(self.close_counter.get() + 1);
        rows
    }

    /// Re-materializes the sequence, filters by interval and predicate, and
    /// returns a fresh cursor over the result. Each call invokes
    /// [`SequenceFn`] and releases its baggage independently — nothing is
    /// cached between calls, matching "restartable-or-not" sequences that
    /// may not support being iterated twice concurrently.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn as_cursor(&self) -> Result<RowCursor<R>, ExecutionError> {
        invariant!(!self.closed.get(), "as_cursor called on a closed row-based holder");

        let rows = if self.descending {
            // A single pass: the reversed result is fully buffered either
            // way, so there's nothing for a separate probe to save.
            let mut rows = self.materialize();
            rows.reverse();
            rows
        } else {
            // A cheap probe pass to warm the sequence (and surface any
            // opening failure) ahead of the real drain, discarding its rows.
            let _ = self.materialize();
            self.materialize()
        };

        let rows = Rc::new(rows);
        let n = rows.len() as u32;
        let offset = shared_offset(Box::new(Ascending::new(n)));

        Ok(RowCursor {
            rows,
            offset,
            signature: self.spec.signature.clone(),
            column_fn: Arc::clone(&self.spec.column_fn),
            timestamp_fn: Arc::clone(&self.spec.timestamp_fn),
            cancellation: self.cancellation.clone(),
            null_policy: self.null_policy,
            forced_done: false,
        })
    }

    #[tracing::instrument(level = "debug", skip(self))]
    pub fn close(&self) {
        self.closed.set(true);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.get()
    }
}

/// A row-at-a-time cursor over one materialized, already filtered-and-
/// ordered `Vec<R>`.
pub struct RowCursor<R> {
    rows: Rc<Vec<R>>,
    offset: SharedOffset,
    signature: RowSignature,
    column_fn: ColumnFn<R>,
    timestamp_fn: TimestampFn<R>,
    cancellation: Cancellation,
    null_policy: NullPolicy,
    forced_done: bool,
}

impl<R: 'static> RowCursor<R> {
    pub fn current_row(&self) -> u32 {
        self.offset.borrow().current()
    }

    /// Builds a selector for `name`: `__time` reads through `timestamp_fn`;
    /// a name in the declared [`RowSignature`] reads through `column_fn` and
    /// is cast per `spec.md` §4.9's conversion table; anything else is null,
    /// same convention as [`crate::selector::ColumnSelectorFactory`].
    pub fn make_selector(&self, name: &str) -> Box<dyn ScalarSelector> {
        if name == TIME_COLUMN {
            return Box::new(RowTimeSelector {
                rows: Rc::clone(&self.rows),
                offset: Rc::clone(&self.offset),
                timestamp_fn: Arc::clone(&self.timestamp_fn),
            });
        }
        if !self.signature.contains(name) {
            return Box::new(NullScalarSelector);
        }
        Box::new(RowFieldSelector {
            rows: Rc::clone(&self.rows),
            offset: Rc::clone(&self.offset),
            name: name.to_string(),
            declared: self.signature.type_of(name).unwrap_or(ColumnType::Unknown),
            column_fn: Arc::clone(&self.column_fn),
            null_policy: self.null_policy,
        })
    }
}

impl<R> Cursor for RowCursor<R> {
    fn advance(&mut self) -> Result<(), ExecutionError> {
        if self.is_done() {
            return Ok(());
        }
        if self.cancellation.is_cancelled() {
            self.forced_done = true;
            return Err(ExecutionError::Interrupted);
        }
        self.offset.borrow_mut().advance()
    }

    fn advance_uninterruptibly(&mut self) {
        if self.is_done() {
            return;
        }
        self.offset.borrow_mut().advance_uninterruptibly();
    }

    fn is_done(&self) -> bool {
        self.forced_done || !self.offset.borrow().within_bounds()
    }

    fn reset(&mut self) {
        self.forced_done = false;
        self.offset.borrow_mut().reset();
    }
}

struct RowTimeSelector<R> {
    rows: Rc<Vec<R>>,
    offset: SharedOffset,
    timestamp_fn: TimestampFn<R>,
}

impl<R> ScalarSelector for RowTimeSelector<R> {
    fn get_float(&self) -> Option<f32> {
        self.get_long().map(|v| v as f32)
    }

    fn get_double(&self) -> Option<f64> {
        self.get_long().map(|v| v as f64)
    }

    fn get_long(&self) -> Option<i64> {
        let row = self.offset.borrow().current() as usize;
        Some((self.timestamp_fn)(&self.rows[row]))
    }

    fn get_object(&self) -> Option<ObjectValue> {
        self.get_long().map(|v| ObjectValue::Single(v.to_string()))
    }

    fn is_null(&self) -> bool {
        false
    }
}

struct RowFieldSelector<R> {
    rows: Rc<Vec<R>>,
    offset: SharedOffset,
    name: String,
    declared: ColumnType,
    column_fn: ColumnFn<R>,
    null_policy: NullPolicy,
}

impl<R> RowFieldSelector<R> {
    fn raw(&self) -> RawValue {
        if self.declared == ColumnType::Complex {
            // "complex -> always null", regardless of what the sequence
            // actually holds (`spec.md` §4.9's conversion table).
            return RawValue::Null;
        }
        let row = self.offset.borrow().current() as usize;
        (self.column_fn)(&self.name, &self.rows[row])
    }

    /// `ReplaceWithDefault` reports a missing numeric value as the type's
    /// zero instead of `None`, same policy the columnar path applies in
    /// [`crate::selector::PhysicalScalarSelector`].
    fn numeric_default<T: Default>(&self, value: Option<T>) -> Option<T> {
        match (value, self.null_policy) {
            (None, NullPolicy::ReplaceWithDefault) if self.declared != ColumnType::String => Some(T::default()),
            (value, _) => value,
        }
    }
}

impl<R> ScalarSelector for RowFieldSelector<R> {
    fn get_float(&self) -> Option<f32> {
        self.numeric_default(match self.raw() {
            RawValue::Null => None,
            RawValue::Long(v) => Some(v as f32),
            RawValue::Double(v) => Some(v as f32),
            RawValue::Text(s) => s.parse().ok(),
        })
    }

    fn get_double(&self) -> Option<f64> {
        self.numeric_default(match self.raw() {
            RawValue::Null => None,
            RawValue::Long(v) => Some(v as f64),
            RawValue::Double(v) => Some(v),
            RawValue::Text(s) => s.parse().ok(),
        })
    }

    fn get_long(&self) -> Option<i64> {
        self.numeric_default(match self.raw() {
            RawValue::Null => None,
            RawValue::Long(v) => Some(v),
            RawValue::Double(v) => Some(v as i64),
            RawValue::Text(s) => s.parse().ok(),
        })
    }

    fn get_object(&self) -> Option<ObjectValue> {
        // Declared `string` produces decimal text of the raw value; declared
        // `unknown` hands back the original object. Both collapse to the
        // same representation here since `RawValue` has no richer object
        // variant to preserve.
        match self.raw() {
            RawValue::Null => None,
            RawValue::Long(v) => Some(ObjectValue::Single(v.to_string())),
            RawValue::Double(v) => Some(ObjectValue::Single(v.to_string())),
            RawValue::Text(s) => Some(ObjectValue::Single(s)),
        }
    }

    fn is_null(&self) -> bool {
        matches!(self.raw(), RawValue::Null)
            && !(self.null_policy == NullPolicy::ReplaceWithDefault && self.declared != ColumnType::String)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone)]
    struct Record {
        time: i64,
        value: i64,
    }

    fn spec(released: Arc<std::sync::atomic::AtomicUsize>) -> RowAdapterSpec<Record> {
        let records = vec![
            Record { time: 0, value: 0 },
            Record { time: 1, value: 1 },
            Record { time: 2, value: 2 },
        ];
        RowAdapterSpec {
            signature: RowSignature::new(vec![("value".to_string(), Some(ColumnType::Long))]),
            timestamp_fn: Arc::new(|r: &Record| r.time),
            column_fn: Arc::new(|name, r: &Record| match name {
                "value" => RawValue::Long(r.value),
                _ => RawValue::Null,
            }),
            produce: Arc::new(move || {
                let released = Arc::clone(&released);
                (
                    Box::new(records.clone().into_iter()),
                    Baggage::new(move || {
                        released.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    }),
                )
            }),
        }
    }

    #[test]
    fn ascending_scan_reads_rows_and_probes_then_drains() {
        let released = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let holder = RowBasedCursorHolder::new(spec(Arc::clone(&released)), RowAdapterBuildSpec::default());

        let mut cursor = holder.as_cursor().unwrap();
        let mut values = vec![];
        while !cursor.is_done() {
            let selector = cursor.make_selector("value");
            values.push(selector.get_long());
            cursor.advance().unwrap();
        }
        assert_eq!(values, vec![Some(0), Some(1), Some(2)]);
        assert_eq!(released.load(std::sync::atomic::Ordering::SeqCst), 2);
        assert_eq!(holder.close_counter(), 2);
    }

    #[test]
    fn descending_scan_reverses_rows_in_a_single_pass() {
        let released = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let holder = RowBasedCursorHolder::new(
            spec(Arc::clone(&released)),
            RowAdapterBuildSpec {
                descending: true,
                ..Default::default()
            },
        );

        let mut cursor = holder.as_cursor().unwrap();
        let mut values = vec![];
        while !cursor.is_done() {
            let selector = cursor.make_selector("value");
            values.push(selector.get_long());
            cursor.advance().unwrap();
        }
        assert_eq!(values, vec![Some(2), Some(1), Some(0)]);
        assert_eq!(released.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(holder.close_counter(), 1);
    }

    #[test]
    fn interval_and_predicate_filter_rows() {
        let released = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let holder = RowBasedCursorHolder::new(
            spec(released),
            RowAdapterBuildSpec {
                interval: Interval::new(1, 3),
                filter: Some(Arc::new(|r: &Record| r.value != 1)),
                ..Default::default()
            },
        );

        let mut cursor = holder.as_cursor().unwrap();
        let mut values = vec![];
        while !cursor.is_done() {
            let selector = cursor.make_selector("value");
            values.push(selector.get_long());
            cursor.advance().unwrap();
        }
        assert_eq!(values, vec![Some(2)]);
    }

    #[test]
    fn nonexistent_column_reads_null() {
        let released = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let holder = RowBasedCursorHolder::new(spec(released), RowAdapterBuildSpec::default());
        let cursor = holder.as_cursor().unwrap();
        let selector = cursor.make_selector("nope");
        assert!(selector.is_null());
    }

    #[test]
    fn num_rows_and_metadata_are_unsupported() {
        let released = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let holder = RowBasedCursorHolder::new(spec(released), RowAdapterBuildSpec::default());
        assert!(matches!(holder.num_rows(), Err(ConfigError::UnsupportedOperation { .. })));
        assert!(matches!(holder.get_metadata(), Err(ConfigError::UnsupportedOperation { .. })));
        assert!(!holder.can_vectorize());
        assert_eq!(holder.interval(), Interval::ETERNITY);
    }
}
