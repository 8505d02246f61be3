//! An in-memory, arrow-backed [`Segment`] used by this crate's own test
//! suite and exported (behind the `testutil` feature) for downstream
//! integration tests.

use std::sync::Arc;

use ahash::AHashMap;
use arrow::array::{Array, Float32Array, Float64Array, Int64Array, StringArray};

use crate::filter::{
    BitmapIndexSelector, Filter, FilterBundle, MatcherBundleFactory, ValueMatcher, VectorValueMatcher,
};
use crate::metrics::QueryMetrics;
use crate::offset::{PointerOffset, RowMatcher};
use crate::segment::{BaseColumn, ColumnCapabilities, ColumnHolder, ColumnType, Segment, TIME_COLUMN};
use crate::selector::{shared_offset, ColumnSelectorFactory, ScalarSelector, SharedOffset};
use crate::time::Interval;

#[derive(Debug)]
enum ColumnData {
    Long(Int64Array),
    Double(Float64Array),
    Float(Float32Array),
    Str(StringArray),
}

#[derive(Debug)]
struct InMemoryColumn {
    data: ColumnData,
    caps: ColumnCapabilities,
}

impl BaseColumn for InMemoryColumn {
    fn capabilities(&self) -> &ColumnCapabilities {
        &self.caps
    }

    fn len(&self) -> usize {
        match &self.data {
            ColumnData::Long(a) => a.len(),
            ColumnData::Double(a) => a.len(),
            ColumnData::Float(a) => a.len(),
            ColumnData::Str(a) => a.len(),
        }
    }

    fn read_f64(&self, row: u32) -> Option<f64> {
        let i = row as usize;
        match &self.data {
            ColumnData::Long(a) => (!a.is_null(i)).then(|| a.value(i) as f64),
            ColumnData::Double(a) => (!a.is_null(i)).then(|| a.value(i)),
            ColumnData::Float(a) => (!a.is_null(i)).then(|| a.value(i) as f64),
            ColumnData::Str(a) => (!a.is_null(i)).then(|| a.value(i)).and_then(|v| v.parse().ok()),
        }
    }

    fn read_i64(&self, row: u32) -> Option<i64> {
        let i = row as usize;
        match &self.data {
            ColumnData::Long(a) => (!a.is_null(i)).then(|| a.value(i)),
            ColumnData::Double(a) => (!a.is_null(i)).then(|| a.value(i) as i64),
            ColumnData::Float(a) => (!a.is_null(i)).then(|| a.value(i) as i64),
            ColumnData::Str(a) => (!a.is_null(i)).then(|| a.value(i)).and_then(|v| v.parse().ok()),
        }
    }

    fn read_string(&self, row: u32) -> Option<String> {
        let i = row as usize;
        match &self.data {
            ColumnData::Long(a) => (!a.is_null(i)).then(|| a.value(i).to_string()),
            ColumnData::Double(a) => (!a.is_null(i)).then(|| a.value(i).to_string()),
            ColumnData::Float(a) => (!a.is_null(i)).then(|| a.value(i).to_string()),
            ColumnData::Str(a) => (!a.is_null(i)).then(|| a.value(i).to_string()),
        }
    }
}

#[derive(Debug)]
struct InMemoryColumnHolder {
    column: Arc<InMemoryColumn>,
}

impl ColumnHolder for InMemoryColumnHolder {
    fn capabilities(&self) -> &ColumnCapabilities {
        self.column.capabilities()
    }

    fn open(&self) -> Arc<dyn BaseColumn> {
        Arc::clone(&self.column) as Arc<dyn BaseColumn>
    }
}

/// A small, fully in-memory [`Segment`] backed by arrow arrays. Built with
/// [`InMemorySegment::builder`].
#[derive(Debug)]
pub struct InMemorySegment {
    interval: Interval,
    num_rows: usize,
    columns: AHashMap<String, Arc<InMemoryColumnHolder>>,
}

impl Segment for InMemorySegment {
    fn interval(&self) -> Interval {
        self.interval
    }

    fn num_rows(&self) -> usize {
        self.num_rows
    }

    fn available_dimensions(&self) -> Vec<String> {
        self.columns.keys().filter(|k| k.as_str() != TIME_COLUMN).cloned().collect()
    }

    fn available_metrics(&self) -> Vec<String> {
        Vec::new()
    }

    fn column(&self, name: &str) -> Option<Arc<dyn ColumnHolder>> {
        self.columns.get(name).map(|h| Arc::clone(h) as Arc<dyn ColumnHolder>)
    }
}

impl InMemorySegment {
    pub fn builder() -> InMemorySegmentBuilder {
        InMemorySegmentBuilder::default()
    }
}

#[derive(Default)]
pub struct InMemorySegmentBuilder {
    time: Vec<i64>,
    columns: AHashMap<String, InMemoryColumn>,
}

impl InMemorySegmentBuilder {
    pub fn time_column(mut self, values: Vec<i64>) -> Self {
        self.time = values;
        self
    }

    pub fn long_column(mut self, name: &str, values: Vec<Option<i64>>) -> Self {
        self.columns.insert(
            name.to_string(),
            InMemoryColumn {
                data: ColumnData::Long(Int64Array::from(values)),
                caps: ColumnCapabilities::scalar(ColumnType::Long),
            },
        );
        self
    }

    pub fn double_column(mut self, name: &str, values: Vec<Option<f64>>) -> Self {
        self.columns.insert(
            name.to_string(),
            InMemoryColumn {
                data: ColumnData::Double(Float64Array::from(values)),
                caps: ColumnCapabilities::scalar(ColumnType::Double),
            },
        );
        self
    }

    pub fn float_column(mut self, name: &str, values: Vec<Option<f32>>) -> Self {
        self.columns.insert(
            name.to_string(),
            InMemoryColumn {
                data: ColumnData::Float(Float32Array::from(values)),
                caps: ColumnCapabilities::scalar(ColumnType::Float),
            },
        );
        self
    }

    pub fn string_column(mut self, name: &str, values: Vec<Option<String>>) -> Self {
        self.columns.insert(
            name.to_string(),
            InMemoryColumn {
                data: ColumnData::Str(StringArray::from(values)),
                caps: ColumnCapabilities::scalar(ColumnType::String),
            },
        );
        self
    }

    pub fn build(self) -> InMemorySegment {
        let num_rows = self.time.len();
        let interval = if num_rows == 0 {
            Interval::new(0, 0)
        } else {
            Interval::new(self.time[0], self.time[num_rows - 1] + 1)
        };

        let mut columns = AHashMap::new();
        columns.insert(
            TIME_COLUMN.to_string(),
            Arc::new(InMemoryColumnHolder {
                column: Arc::new(InMemoryColumn {
                    data: ColumnData::Long(Int64Array::from(self.time)),
                    caps: ColumnCapabilities::scalar(ColumnType::Long),
                }),
            }),
        );
        for (name, column) in self.columns {
            columns.insert(name, Arc::new(InMemoryColumnHolder { column: Arc::new(column) }));
        }

        InMemorySegment { interval, num_rows, columns }
    }
}

/// A row matcher reading one named column and comparing it (as a `long`) to
/// a constant. Used by S2 (`LONG == 1`) and S4 (`vc == 2`) — it reads
/// through the ordinary selector machinery via a [`PointerOffset`] it
/// repoints on every call, rather than holding its own column handle, so it
/// works against virtual columns exactly as it does against physical ones.
struct LongEqualsMatcher {
    selector: Box<dyn ScalarSelector>,
    pointer: SharedOffset,
    target: i64,
}

impl RowMatcher for LongEqualsMatcher {
    fn matches(&self, row: u32) -> bool {
        self.pointer.borrow_mut().set_pointer(row);
        self.selector.get_long() == Some(self.target)
    }
}

/// `column == target`, matcher-only (`spec.md` scenarios S2, S4).
#[derive(Debug, Clone)]
pub struct LongEqualsFilter {
    pub column: String,
    pub target: i64,
}

impl MatcherBundleFactory for LongEqualsFilter {
    fn make_matcher(&self, factory: &ColumnSelectorFactory<'_>) -> Box<dyn ValueMatcher> {
        let pointer = shared_offset(Box::new(PointerOffset::new()));
        let selector = factory.make_scalar_selector(&self.column, &pointer);
        Box::new(LongEqualsMatcher {
            selector,
            pointer,
            target: self.target,
        })
    }

    fn make_vector_matcher(&self, _factory: &ColumnSelectorFactory<'_>) -> Box<dyn VectorValueMatcher> {
        unreachable!("LongEqualsFilter::can_vectorize is false; the vector matcher path is never exercised")
    }

    fn can_vectorize(&self) -> bool {
        false
    }
}

impl Filter for LongEqualsFilter {
    fn make_filter_bundle(
        &self,
        _index_selector: &dyn BitmapIndexSelector,
        _total_rows: usize,
        _applied_rows_so_far: usize,
        _cnf_already_applied: bool,
        _metrics: Option<&dyn QueryMetrics>,
    ) -> FilterBundle {
        FilterBundle::matcher_only(Arc::new(self.clone()))
    }
}

/// `column is null`, matcher-only (`spec.md` scenario S3: filter on a
/// nonexistent column is equivalent to `== null` and matches every row, since
/// the selector factory resolves a missing name to an always-null selector).
struct IsNullMatcher {
    selector: Box<dyn ScalarSelector>,
    pointer: SharedOffset,
}

impl RowMatcher for IsNullMatcher {
    fn matches(&self, row: u32) -> bool {
        self.pointer.borrow_mut().set_pointer(row);
        self.selector.is_null()
    }
}

#[derive(Debug, Clone)]
pub struct IsNullFilter {
    pub column: String,
}

impl MatcherBundleFactory for IsNullFilter {
    fn make_matcher(&self, factory: &ColumnSelectorFactory<'_>) -> Box<dyn ValueMatcher> {
        let pointer = shared_offset(Box::new(PointerOffset::new()));
        let selector = factory.make_scalar_selector(&self.column, &pointer);
        Box::new(IsNullMatcher { selector, pointer })
    }

    fn make_vector_matcher(&self, _factory: &ColumnSelectorFactory<'_>) -> Box<dyn VectorValueMatcher> {
        unreachable!("IsNullFilter::can_vectorize is false; the vector matcher path is never exercised")
    }

    fn can_vectorize(&self) -> bool {
        false
    }
}

impl Filter for IsNullFilter {
    fn make_filter_bundle(
        &self,
        _index_selector: &dyn BitmapIndexSelector,
        _total_rows: usize,
        _applied_rows_so_far: usize,
        _cnf_already_applied: bool,
        _metrics: Option<&dyn QueryMetrics>,
    ) -> FilterBundle {
        FilterBundle::matcher_only(Arc::new(self.clone()))
    }
}
