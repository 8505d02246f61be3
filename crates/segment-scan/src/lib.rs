//! Ordered, filtered, time-clipped row scanning over immutable columnar
//! segments.
//!
//! ## Feature flags
//!
//! - `testutil`: exposes [`testutil::InMemorySegment`], a small arrow-backed
//!   [`Segment`] used by this crate's own tests and convenient for
//!   downstream integration tests.

mod bitmap;
mod cancellation;
mod column_cache;
mod cursor;
mod error;
mod filter;
mod granularity;
mod holder;
mod metrics;
mod offset;
mod row_adapter;
mod segment;
mod selector;
mod time;
mod vector_cursor;
mod virtual_columns;

#[cfg(any(test, feature = "testutil"))]
pub mod testutil;

pub use bitmap::RowBitmap;
pub use cancellation::{Cancellation, CANCELLATION_CHECK_INTERVAL};
pub use column_cache::{ColumnCache, Closer};
pub use cursor::{Cursor, ScalarCursor};
pub use error::{ConfigError, DataError, ExecutionError, HolderError};
pub use filter::{
    BitmapHolder, BitmapIndexSelector, Filter, FilterBundle, MatcherBundleFactory, ValueMatcher,
    VectorValueMatcher,
};
pub use granularity::{bucket_starts, Granularity, Granularizer};
pub use holder::{
    make_cursor_holder, Aggregator, CursorBuildSpec, CursorHolder, Vectorization,
};
pub use metrics::{NoopQueryMetrics, QueryMetrics, RecordingQueryMetrics};
pub use offset::{
    Ascending, BitmapOffset, Descending, FilteredOffset, Offset, PointerOffset, RowMatcher,
    TimestampCheckingOffset,
};
pub use row_adapter::{
    Baggage, ColumnFn, RawValue, RowAdapterBuildSpec, RowAdapterSpec, RowBasedCursorHolder, RowCursor,
    SequenceFn, TimestampFn,
};
pub use segment::{
    BaseColumn, ColumnCapabilities, ColumnHolder, ColumnType, MultiValue, NullPolicy, RowSignature,
    Segment, TIME_COLUMN,
};
pub use selector::{
    shared_offset, shared_vector_offset, ColumnSelectorFactory, NullScalarSelector, NullVectorSelector,
    ObjectValue, ScalarSelector, SharedOffset, SharedVectorOffset, VectorSelector,
};
pub use time::{time_search, time_search_with, Interval};
pub use vector_cursor::{
    BitmapVectorOffset, FilteredVectorOffset, NoFilterVectorOffset, VectorCursor, VectorOffset,
};
pub use virtual_columns::{
    AddConstantVirtualColumn, ColumnInspector, SegmentColumnInspector, VirtualColumn, VirtualColumns,
};
