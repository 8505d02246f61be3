//! Scalar cursor (`spec.md` §4.6, component C6).

use crate::error::ExecutionError;
use crate::offset::Offset;
use crate::selector::{shared_offset, ColumnSelectorFactory, SharedOffset};

/// Row-at-a-time iteration honoring offset, time window and matcher.
pub trait Cursor {
    fn advance(&mut self) -> Result<(), ExecutionError>;
    fn advance_uninterruptibly(&mut self);
    fn is_done(&self) -> bool;
    fn reset(&mut self);
}

/// The concrete scalar cursor built by
/// [`crate::holder::CursorHolder::as_cursor`], per `spec.md` §4.6's
/// five-step construction: base offset selection (§4.5), time-window
/// skip-ahead, `TimestampCheckingOffset` wrapping, a clone to separate the
/// interruptible *filter offset* from the *cursor offset*, and — if a value
/// matcher is needed — wrapping the cursor offset in a `FilteredOffset`.
///
/// Cloning separates interruptible iteration from stateless selector reads,
/// so that a partially advanced filter search does not corrupt the
/// observable column selectors (`spec.md` §4.6 "Rationale").
pub struct ScalarCursor<'a> {
    offset: SharedOffset,
    factory: ColumnSelectorFactory<'a>,
    /// Set once an `advance()` observes cancellation; from then on
    /// `is_done()` is `true` regardless of what the underlying offset
    /// reports, satisfying `spec.md` §7: "a partial result never leaks past
    /// an errored advance".
    forced_done: bool,
}

impl<'a> ScalarCursor<'a> {
    /// Builds a cursor directly from an already-constructed offset chain —
    /// used by [`crate::holder`], which owns the selection-policy logic from
    /// `spec.md` §4.5/§4.6.
    pub fn from_offset(offset: Box<dyn Offset>, factory: ColumnSelectorFactory<'a>) -> Self {
        Self {
            offset: shared_offset(offset),
            factory,
            forced_done: false,
        }
    }

    pub fn column_selector_factory(&self) -> &ColumnSelectorFactory<'a> {
        &self.factory
    }

    /// The shared offset backing this cursor's selectors — selectors bound
    /// against this handle observe every `advance()`.
    pub fn shared_offset(&self) -> &SharedOffset {
        &self.offset
    }

    pub fn current_row(&self) -> u32 {
        self.offset.borrow().current()
    }
}

impl Cursor for ScalarCursor<'_> {
    fn advance(&mut self) -> Result<(), ExecutionError> {
        if self.is_done() {
            return Ok(());
        }
        match self.offset.borrow_mut().advance() {
            Ok(()) => Ok(()),
            Err(err) => {
                self.forced_done = true;
                Err(err)
            }
        }
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
