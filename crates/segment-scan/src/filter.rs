//! Filter bundles (`spec.md` §4.5, component C5).
//!
//! A filter decides, given an index selector, which representation(s) it can
//! offer: a precomputed bitmap, a per-row/per-vector matcher, both, or
//! neither. The scanner (see [`crate::holder`]) picks an iteration strategy
//! from whatever comes back.

use std::sync::Arc;

use crate::bitmap::RowBitmap;
use crate::metrics::QueryMetrics;
use crate::offset::RowMatcher;
use crate::selector::{ColumnSelectorFactory, VectorSelector};

/// Per-row predicate, bound to a selector factory. Alias of
/// [`RowMatcher`] — filters and `FilteredOffset` share the same evaluation
/// contract.
pub trait ValueMatcher: RowMatcher {}
impl<T: RowMatcher> ValueMatcher for T {}

/// Evaluates a predicate over a whole vector window at once, returning which
/// of the window's rows match.
pub trait VectorValueMatcher {
    /// `mask[i]` is whether `rows[i]` matches.
    fn matches_vector(&self, rows: &[u32]) -> Vec<bool>;
}

/// A precomputed bitmap of matching rows plus whatever debug info the filter
/// wants to attach (surfaced through [`QueryMetrics::filter_bundle`]).
#[derive(Clone, Debug)]
pub struct BitmapHolder {
    pub bitmap: RowBitmap,
    pub debug_info: String,
}

/// Produces a scalar and vector matcher against a selector factory supplied
/// at cursor-construction time (so the matcher can read whatever columns it
/// needs, including virtual ones).
pub trait MatcherBundleFactory {
    fn make_matcher(&self, factory: &ColumnSelectorFactory<'_>) -> Box<dyn ValueMatcher>;

    fn make_vector_matcher(&self, factory: &ColumnSelectorFactory<'_>) -> Box<dyn VectorValueMatcher>;

    /// Whether [`MatcherBundleFactory::make_vector_matcher`] can be used for
    /// the columns this filter reads, given their capabilities.
    fn can_vectorize(&self) -> bool;
}

/// The pair `(index?, matcher_bundle?)` a filter produces for a given
/// segment, per `spec.md` §3/§4.5.
pub struct FilterBundle {
    pub index: Option<BitmapHolder>,
    pub matcher_bundle: Option<Arc<dyn MatcherBundleFactory>>,
}

impl FilterBundle {
    pub fn index_only(holder: BitmapHolder) -> Self {
        Self {
            index: Some(holder),
            matcher_bundle: None,
        }
    }

    pub fn matcher_only(bundle: Arc<dyn MatcherBundleFactory>) -> Self {
        Self {
            index: None,
            matcher_bundle: Some(bundle),
        }
    }

    pub fn hybrid(holder: BitmapHolder, bundle: Arc<dyn MatcherBundleFactory>) -> Self {
        Self {
            index: Some(holder),
            matcher_bundle: Some(bundle),
        }
    }

    pub fn none() -> Self {
        Self {
            index: None,
            matcher_bundle: None,
        }
    }
}

/// A source of precomputed bitmap indexes for individual column/value pairs,
/// passed to [`Filter::make_filter_bundle`]. Index *construction* is out of
/// scope for this crate (`spec.md` §1); this is just the lookup contract a
/// filter uses to ask for one.
pub trait BitmapIndexSelector {
    fn bitmap_for(&self, column: &str, value: &str) -> Option<RowBitmap>;

    fn total_rows(&self) -> usize;
}

/// A row predicate that can be composed into a filter bundle. The boundary
/// named in `spec.md` §1 ("filter index construction beyond the
/// `BitmapIndexSelector` contract" is out of scope): this crate never builds
/// an index itself, only consumes whatever `make_filter_bundle` hands back.
pub trait Filter: std::fmt::Debug {
    /// `applied_rows_so_far` and `cnf_already_applied` let a filter avoid
    /// redundant work when composed inside a conjunction that has already
    /// partially narrowed the row set; this crate passes them through
    /// unmodified and does not interpret them itself.
    fn make_filter_bundle(
        &self,
        index_selector: &dyn BitmapIndexSelector,
        total_rows: usize,
        applied_rows_so_far: usize,
        cnf_already_applied: bool,
        metrics: Option<&dyn QueryMetrics>,
    ) -> FilterBundle;
}
