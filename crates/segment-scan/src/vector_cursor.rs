//! Vector cursor (`spec.md` §4.7, component C7).
//!
//! Vector cursors only ever run ascending — gating (`can_vectorize`) in
//! [`crate::holder`] rejects descending orderings before a [`VectorCursor`]
//! is ever constructed.

use crate::bitmap::RowBitmap;
use crate::error::ExecutionError;
use crate::filter::VectorValueMatcher;
use crate::selector::{ColumnSelectorFactory, SharedVectorOffset, VectorSelector};

/// A mutable position over `[0, N)` that yields up to `max_vector_size` row
/// indices at a time, in ascending order. `current_rows()` is only
/// meaningful while `!is_done()`.
pub trait VectorOffset: std::fmt::Debug {
    /// Row indices in the current window, in ascending order. Length is
    /// `current_vector_size()`.
    fn current_rows(&self) -> &[u32];

    fn current_vector_size(&self) -> usize {
        self.current_rows().len()
    }

    fn max_vector_size(&self) -> usize;

    fn is_done(&self) -> bool;

    fn advance(&mut self) -> Result<(), ExecutionError>;

    fn reset(&mut self);
}

/// Contiguous `[start, end)`, chunked into windows of `vector_size`.
#[derive(Debug)]
pub struct NoFilterVectorOffset {
    vector_size: usize,
    start: u32,
    end: u32,
    pos: u32,
    window: Vec<u32>,
}

impl NoFilterVectorOffset {
    pub fn new(vector_size: usize, start: u32, end: u32) -> Self {
        assert!(vector_size > 0, "vector_size must be positive");
        let mut offset = Self {
            vector_size,
            start,
            end,
            pos: start,
            window: Vec::new(),
        };
        offset.fill();
        offset
    }

    fn fill(&mut self) {
        let window_end = self.end.min(self.pos.saturating_add(self.vector_size as u32));
        self.window = (self.pos..window_end).collect();
    }
}

impl VectorOffset for NoFilterVectorOffset {
    fn current_rows(&self) -> &[u32] {
        &self.window
    }

    fn max_vector_size(&self) -> usize {
        self.vector_size
    }

    fn is_done(&self) -> bool {
        self.pos >= self.end
    }

    fn advance(&mut self) -> Result<(), ExecutionError> {
        self.pos += self.window.len() as u32;
        self.fill();
        Ok(())
    }

    fn reset(&mut self) {
        self.pos = self.start;
        self.fill();
    }
}

/// The set bits of a bitmap within `[start, end)`, chunked into windows of
/// `vector_size`. Unlike [`NoFilterVectorOffset`] a window is not
/// necessarily a contiguous row range.
#[derive(Debug)]
pub struct BitmapVectorOffset {
    vector_size: usize,
    rows: Vec<u32>,
    idx: usize,
    window: Vec<u32>,
}

impl BitmapVectorOffset {
    pub fn new(vector_size: usize, bitmap: &RowBitmap, start: u32, end: u32) -> Self {
        assert!(vector_size > 0, "vector_size must be positive");
        let rows: Vec<u32> = bitmap
            .iter_ascending()
            .filter(|&row| row >= start && row < end)
            .collect();
        let mut offset = Self {
            vector_size,
            rows,
            idx: 0,
            window: Vec::new(),
        };
        offset.fill();
        offset
    }

    fn fill(&mut self) {
        let end = self.rows.len().min(self.idx + self.vector_size);
        self.window = self.rows[self.idx..end].to_vec();
    }
}

impl VectorOffset for BitmapVectorOffset {
    fn current_rows(&self) -> &[u32] {
        &self.window
    }

    fn max_vector_size(&self) -> usize {
        self.vector_size
    }

    fn is_done(&self) -> bool {
        self.idx >= self.rows.len()
    }

    fn advance(&mut self) -> Result<(), ExecutionError> {
        self.idx += self.window.len();
        self.fill();
        Ok(())
    }

    fn reset(&mut self) {
        self.idx = 0;
        self.fill();
    }
}

/// Wraps `inner`, dropping rows the vector matcher rejects from each window.
///
/// Each call to `advance` pulls exactly one window from `inner` and narrows
/// it; unlike a scalar [`crate::offset::FilteredOffset`] this does not search
/// ahead for a non-empty window, so `current_vector_size()` can legitimately
/// be (and, at the tail of a sparse match, usually is) smaller than
/// `max_vector_size()` — including zero on a window with no matches. This
/// mirrors windowed/batch filter execution rather than row-at-a-time
/// filtering: re-packing sparse windows into full batches would require
/// buffering across windows, which this crate does not do.
pub struct FilteredVectorOffset {
    inner: Box<dyn VectorOffset>,
    matcher: Box<dyn VectorValueMatcher>,
    window: Vec<u32>,
}

impl std::fmt::Debug for FilteredVectorOffset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilteredVectorOffset")
            .field("inner", &self.inner)
            .finish()
    }
}

impl FilteredVectorOffset {
    pub fn new(inner: Box<dyn VectorOffset>, matcher: Box<dyn VectorValueMatcher>) -> Self {
        let mut offset = Self {
            inner,
            matcher,
            window: Vec::new(),
        };
        offset.refill();
        offset
    }

    fn refill(&mut self) {
        let rows = self.inner.current_rows();
        let mask = self.matcher.matches_vector(rows);
        debug_assert_eq!(mask.len(), rows.len());
        self.window = rows
            .iter()
            .zip(mask)
            .filter_map(|(&row, matched)| matched.then_some(row))
            .collect();
    }
}

impl VectorOffset for FilteredVectorOffset {
    fn current_rows(&self) -> &[u32] {
        &self.window
    }

    fn max_vector_size(&self) -> usize {
        self.inner.max_vector_size()
    }

    fn is_done(&self) -> bool {
        self.inner.is_done()
    }

    fn advance(&mut self) -> Result<(), ExecutionError> {
        self.inner.advance()?;
        self.refill();
        Ok(())
    }

    fn reset(&mut self) {
        self.inner.reset();
        self.refill();
    }
}

/// Exposes columns as fixed-width batches, per `spec.md` §4.7.
pub struct VectorCursor<'a> {
    offset: SharedVectorOffset,
    factory: ColumnSelectorFactory<'a>,
}

impl<'a> VectorCursor<'a> {
    pub fn new(offset: SharedVectorOffset, factory: ColumnSelectorFactory<'a>) -> Self {
        Self { offset, factory }
    }

    pub fn current_vector_size(&self) -> usize {
        self.offset.borrow().current_vector_size()
    }

    pub fn max_vector_size(&self) -> usize {
        self.offset.borrow().max_vector_size()
    }

    pub fn is_done(&self) -> bool {
        self.offset.borrow().is_done()
    }

    pub fn advance(&mut self) -> Result<(), ExecutionError> {
        self.offset.borrow_mut().advance()
    }

    pub fn reset(&mut self) {
        self.offset.borrow_mut().reset();
    }

    pub fn column_selector_factory(&self) -> &ColumnSelectorFactory<'a> {
        &self.factory
    }

    pub fn make_selector(&self, name: &str) -> Box<dyn VectorSelector> {
        self.factory.make_vector_selector(name, &self.offset)
    }

    /// All `__time` values in the current window — used by tests and by
    /// downstream consumers (e.g. a granularizer) that need raw timestamps
    /// without going through a named selector.
    pub fn current_rows(&self) -> Vec<u32> {
        self.offset.borrow().current_rows().to_vec()
    }
}
