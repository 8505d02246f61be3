//! The external `Segment`/`ColumnHolder` contracts (`spec.md` §3, §6).
//!
//! This crate treats segment persistence, ingestion and tiering as external
//! collaborators (`spec.md` §1): it only needs enough of a `Segment` to open
//! columns and ask for row count / data interval. A concrete, arrow-backed
//! implementation usable in tests lives in [`crate::testutil`].

use std::sync::Arc;

use crate::bitmap::RowBitmap;
use crate::time::Interval;

/// The name of the mandatory, monotone, single-valued numeric time column.
pub const TIME_COLUMN: &str = "__time";

/// The type of value a column (physical or virtual) produces.
///
/// Closed set per `spec.md` §3's row signature: `{float, double, long,
/// string, complex, unknown}`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ColumnType {
    Float,
    Double,
    Long,
    String,
    Complex,
    Unknown,
}

/// How a missing/unconvertible value is reported (`spec.md` §9, "Global
/// null-handling mode" redesign flag). Consumed by the row-based adapter's
/// type-conversion table (§4.9) and by scalar selectors' `is_null` semantics
/// for numeric columns; it never changes what counts as "unconvertible",
/// only what value is reported once something is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum NullPolicy {
    /// Absent/unconvertible numeric values read as `null`, same as SQL NULL.
    #[default]
    SqlCompatible,
    /// Absent/unconvertible numeric values read as the type's zero value
    /// instead of `null` (legacy Druid-style default-value mode).
    ReplaceWithDefault,
}

/// Whether a column may, for a single row, carry more than one value (e.g. a
/// multi-valued string dimension). `Unknown` covers columns whose
/// multi-valued-ness cannot be determined without opening them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MultiValue {
    Yes,
    No,
    Unknown,
}

/// Static, pre-open facts about a column.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnCapabilities {
    pub column_type: ColumnType,
    pub may_have_multiple_values: MultiValue,
    pub has_bitmap_index: bool,
    pub dictionary_encoded: bool,
}

impl ColumnCapabilities {
    pub fn scalar(column_type: ColumnType) -> Self {
        Self {
            column_type,
            may_have_multiple_values: MultiValue::No,
            has_bitmap_index: false,
            dictionary_encoded: false,
        }
    }
}

/// An ordered `(name, type?)` pair sequence, used by the row-based adapter
/// and by virtual columns to describe the shape of a schema without
/// requiring it be physically present.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RowSignature {
    columns: Vec<(String, Option<ColumnType>)>,
}

impl RowSignature {
    pub fn new(columns: Vec<(String, Option<ColumnType>)>) -> Self {
        Self { columns }
    }

    pub fn columns(&self) -> &[(String, Option<ColumnType>)] {
        &self.columns
    }

    pub fn type_of(&self, name: &str) -> Option<ColumnType> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .and_then(|(_, t)| *t)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.columns.iter().any(|(n, _)| n == name)
    }
}

/// A single opened column: enough to read one value, or one contiguous
/// slice of values, at a time. Kept deliberately narrow — type-specific
/// reading goes through [`crate::selector::ColumnSelectorFactory`], not
/// through this trait.
pub trait BaseColumn: std::fmt::Debug {
    fn capabilities(&self) -> &ColumnCapabilities;

    /// Number of rows backing this column.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A `f64` read of the value at `row`, used by numeric selectors
    /// (including `__time`). `None` means null.
    fn read_f64(&self, row: u32) -> Option<f64>;

    /// A `i64` read of the value at `row`. `None` means null.
    fn read_i64(&self, row: u32) -> Option<i64>;

    /// A string read of the value at `row`. For multi-valued dimensions this
    /// returns the first value; callers that need the full set should use
    /// [`BaseColumn::read_multi_string`].
    fn read_string(&self, row: u32) -> Option<String>;

    /// All values at `row`, for columns whose `may_have_multiple_values` is
    /// not `No`. `None` means null (not "empty list"); an empty vector is a
    /// legitimate zero-valued row.
    fn read_multi_string(&self, row: u32) -> Option<Vec<String>> {
        self.read_string(row).map(|v| vec![v])
    }
}

/// A name-to-handle lookup plus an optional bitmap-index supplier,
/// corresponding to `spec.md` §6's `ColumnHolder`.
pub trait ColumnHolder: std::fmt::Debug {
    fn capabilities(&self) -> &ColumnCapabilities;

    fn open(&self) -> Arc<dyn BaseColumn>;

    /// Returns a precomputed bitmap index for `value`, if this column
    /// carries one and `value` is indexed. A column's `has_bitmap_index` may
    /// be `true` while a specific value still has no index (e.g. a new
    /// value with no segment-level statistics); this returns `None` in that
    /// case.
    fn index_for_value(&self, _value: &str) -> Option<RowBitmap> {
        None
    }
}

/// An immutable, row-addressable collection of named columns with a
/// monotone `__time` column, per `spec.md` §3.
pub trait Segment: std::fmt::Debug {
    fn interval(&self) -> Interval;

    fn num_rows(&self) -> usize;

    fn available_dimensions(&self) -> Vec<String>;

    fn available_metrics(&self) -> Vec<String>;

    fn column(&self, name: &str) -> Option<Arc<dyn ColumnHolder>>;

    /// `None` means: no column-level bitmap indexes are available at all
    /// (e.g. a pure row-store segment); `Some(_)` is a supplier filters can
    /// use to ask individual columns for indexes.
    fn bitmap_factory(&self) -> Option<Arc<dyn crate::filter::BitmapIndexSelector>> {
        None
    }

    /// Segment-level metadata; absent on segments (such as the row-based
    /// adapter) that never compute it. Per `spec.md` §9, the row-based
    /// adapter deliberately returns `None` here rather than a fabricated
    /// value.
    fn metadata(&self) -> Option<&str> {
        None
    }
}
