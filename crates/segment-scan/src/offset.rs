//! Offset primitives (`spec.md` §4.1, component C1).
//!
//! `current()` is only meaningful while `within_bounds()` is `true`; callers
//! must check `within_bounds()` before reading `current()`. `advance()` must
//! be called to make progress; a fresh offset (or one that has just been
//! `reset()`) is already positioned at its first candidate row (if any),
//! mirroring `Chunk::range`'s clip-then-slice idiom in
//! `crates/re_chunk/src/range.rs`.

use crate::cancellation::{Cancellation, CANCELLATION_CHECK_INTERVAL};
use crate::error::ExecutionError;

/// A value matcher bound to a fixed offset source, used by
/// [`FilteredOffset`]. Scalar matchers read through whatever selector
/// factory they were built against; this trait only asks "does the row at
/// `row` match", independent of how that's evaluated.
pub trait RowMatcher {
    fn matches(&self, row: u32) -> bool;
}

/// A mutable cursor position over `[0, N)`. See module docs for the
/// `current`/`within_bounds` contract.
pub trait Offset: std::fmt::Debug {
    fn current(&self) -> u32;
    fn within_bounds(&self) -> bool;
    fn advance(&mut self) -> Result<(), ExecutionError>;
    fn reset(&mut self);
    fn clone_box(&self) -> Box<dyn Offset>;

    /// Advances without observing cancellation (`spec.md` §4.6: reserved for
    /// contexts that must not raise). The default forwards to `advance` and
    /// discards an `Interrupted` error, which is correct for every variant
    /// except [`FilteredOffset`], the only one that can actually produce
    /// that error; it overrides this method to skip the cancellation check
    /// entirely rather than merely swallowing it.
    fn advance_uninterruptibly(&mut self) {
        let _ = self.advance();
    }

    /// Sets the position directly, bypassing `advance`. Only meaningful for
    /// offsets (namely [`PointerOffset`]) purpose-built for point reads by a
    /// row matcher; every other variant panics.
    fn set_pointer(&mut self, _row: u32) {
        unimplemented!("set_pointer is only supported by PointerOffset")
    }
}

impl Clone for Box<dyn Offset> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// `0, 1, 2, ..., n-1`.
#[derive(Clone, Debug)]
pub struct Ascending {
    pos: u32,
    n: u32,
}

impl Ascending {
    pub fn new(n: u32) -> Self {
        Self { pos: 0, n }
    }
}

impl Offset for Ascending {
    fn current(&self) -> u32 {
        self.pos
    }

    fn within_bounds(&self) -> bool {
        self.pos < self.n
    }

    fn advance(&mut self) -> Result<(), ExecutionError> {
        self.pos += 1;
        Ok(())
    }

    fn reset(&mut self) {
        self.pos = 0;
    }

    fn clone_box(&self) -> Box<dyn Offset> {
        Box::new(self.clone())
    }
}

/// `n-1, n-2, ..., 0`.
///
/// Represented with `pos` one past the logical position (`pos - 1`) so that
/// decrementing below zero is never attempted: `within_bounds` is `pos > 0`,
/// and `current` reads `pos - 1`. `n` is kept alongside `pos` so `reset`
/// can restore the starting position without outside help.
#[derive(Clone, Debug)]
pub struct Descending {
    pos: u32,
    n: u32,
}

impl Descending {
    pub fn new(n: u32) -> Self {
        Self { pos: n, n }
    }
}

impl Offset for Descending {
    fn current(&self) -> u32 {
        debug_assert!(self.within_bounds());
        self.pos - 1
    }

    fn within_bounds(&self) -> bool {
        self.pos > 0
    }

    fn advance(&mut self) -> Result<(), ExecutionError> {
        self.pos = self.pos.saturating_sub(1);
        Ok(())
    }

    fn reset(&mut self) {
        self.pos = self.n;
    }

    fn clone_box(&self) -> Box<dyn Offset> {
        Box::new(self.clone())
    }
}

/// A position settable directly via [`PointerOffset::set`] rather than by
/// `advance`-ing. A row matcher (`spec.md` §6 `Filter::make_matcher`) that
/// wants to read arbitrary rows through the ordinary selector machinery —
/// rather than maintaining its own column handles — binds a selector to one
/// of these and repoints it once per `RowMatcher::matches(row)` call.
/// `within_bounds` is always `true`; bounds-checking for matcher reads is the
/// caller's responsibility (the row index comes from an already-bounded
/// offset).
#[derive(Clone, Debug, Default)]
pub struct PointerOffset {
    row: u32,
}

impl PointerOffset {
    pub fn new() -> Self {
        Self { row: 0 }
    }
}

impl Offset for PointerOffset {
    fn current(&self) -> u32 {
        self.row
    }

    fn within_bounds(&self) -> bool {
        true
    }

    fn advance(&mut self) -> Result<(), ExecutionError> {
        self.row += 1;
        Ok(())
    }

    fn reset(&mut self) {
        self.row = 0;
    }

    fn clone_box(&self) -> Box<dyn Offset> {
        Box::new(self.clone())
    }

    fn set_pointer(&mut self, row: u32) {
        self.row = row;
    }
}

/// Iterates the set bits of a [`crate::bitmap::RowBitmap`], ascending or
/// descending.
#[derive(Clone, Debug)]
pub struct BitmapOffset {
    order: Vec<u32>,
    idx: usize,
}

impl BitmapOffset {
    pub fn new(bitmap: &crate::bitmap::RowBitmap, descending: bool) -> Self {
        let order: Vec<u32> = if descending {
            bitmap.iter_descending().collect()
        } else {
            bitmap.iter_ascending().collect()
        };
        Self { order, idx: 0 }
    }
}

impl Offset for BitmapOffset {
    fn current(&self) -> u32 {
        self.order[self.idx]
    }

    fn within_bounds(&self) -> bool {
        self.idx < self.order.len()
    }

    fn advance(&mut self) -> Result<(), ExecutionError> {
        self.idx += 1;
        Ok(())
    }

    fn reset(&mut self) {
        self.idx = 0;
    }

    fn clone_box(&self) -> Box<dyn Offset> {
        Box::new(self.clone())
    }
}

/// Wraps `inner`, skipping rows the matcher rejects. Construction and every
/// `advance` drive `inner` forward until a match or exhaustion.
///
/// `advance` checks `cancellation` at least every
/// [`CANCELLATION_CHECK_INTERVAL`] rows (`spec.md` §4.1: "K <= 1024"), and on
/// cancellation leaves the offset either exhausted or positioned at a valid
/// match — never at a transient position, so a cancelled search can't leak
/// an inconsistent `current()` to a caller who ignores the error.
pub struct FilteredOffset {
    inner: Box<dyn Offset>,
    matcher: Box<dyn RowMatcher>,
    cancellation: Cancellation,
}

impl std::fmt::Debug for FilteredOffset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilteredOffset").field("inner", &self.inner).finish()
    }
}

impl FilteredOffset {
    pub fn new(
        mut inner: Box<dyn Offset>,
        matcher: Box<dyn RowMatcher>,
        cancellation: Cancellation,
    ) -> Result<Self, ExecutionError> {
        Self::seek(&mut *inner, &*matcher, &cancellation)?;
        Ok(Self {
            inner,
            matcher,
            cancellation,
        })
    }

    fn seek(
        inner: &mut dyn Offset,
        matcher: &dyn RowMatcher,
        cancellation: &Cancellation,
    ) -> Result<(), ExecutionError> {
        let mut since_check: u32 = 0;
        while inner.within_bounds() && !matcher.matches(inner.current()) {
            inner.advance()?;
            since_check += 1;
            if since_check >= CANCELLATION_CHECK_INTERVAL {
                since_check = 0;
                if cancellation.is_cancelled() {
                    return Err(ExecutionError::Interrupted);
                }
            }
        }
        Ok(())
    }
}

impl Offset for FilteredOffset {
    fn current(&self) -> u32 {
        self.inner.current()
    }

    fn within_bounds(&self) -> bool {
        self.inner.within_bounds()
    }

    fn advance(&mut self) -> Result<(), ExecutionError> {
        if !self.inner.within_bounds() {
            return Ok(());
        }
        self.inner.advance()?;
        Self::seek(&mut *self.inner, &*self.matcher, &self.cancellation)
    }

    fn reset(&mut self) {
        self.inner.reset();
        // Re-seeking after reset can only fail on cancellation; a cancelled
        // reset leaves `inner` wherever it stopped, which still satisfies
        // the "exhausted or at a valid match" invariant.
        let _ = Self::seek(&mut *self.inner, &*self.matcher, &self.cancellation);
    }

    fn clone_box(&self) -> Box<dyn Offset> {
        // `RowMatcher` is not `Clone`-object-safe in general (arbitrary
        // closures over borrowed selectors); `FilteredOffset` is built fresh
        // per cursor instead of cloned. Cloning the *cursor offset* before
        // wrapping it in a matcher (per `spec.md` §4.6 step 5) is how this
        // crate avoids ever needing to clone a `FilteredOffset` itself.
        unimplemented!("FilteredOffset is constructed per-cursor, not cloned")
    }

    fn advance_uninterruptibly(&mut self) {
        if !self.inner.within_bounds() {
            return;
        }
        self.inner.advance_uninterruptibly();
        while self.inner.within_bounds() && !self.matcher.matches(self.inner.current()) {
            self.inner.advance_uninterruptibly();
        }
    }
}

/// Augments `within_bounds` with a time-column check (`spec.md` §4.1).
/// Ascending requires `timestamps[current] < limit`; descending requires
/// `timestamps[current] >= limit`. If `all_within` the data interval is
/// already known to lie entirely inside the query interval, and the check is
/// skipped.
pub struct TimestampCheckingOffset {
    inner: Box<dyn Offset>,
    timestamps: std::sync::Arc<dyn Fn(u32) -> i64 + Send + Sync>,
    limit: i64,
    descending: bool,
    all_within: bool,
}

impl std::fmt::Debug for TimestampCheckingOffset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimestampCheckingOffset")
            .field("inner", &self.inner)
            .field("limit", &self.limit)
            .field("descending", &self.descending)
            .field("all_within", &self.all_within)
            .finish()
    }
}

impl TimestampCheckingOffset {
    pub fn new(
        inner: Box<dyn Offset>,
        timestamps: std::sync::Arc<dyn Fn(u32) -> i64 + Send + Sync>,
        limit: i64,
        descending: bool,
        all_within: bool,
    ) -> Self {
        Self {
            inner,
            timestamps,
            limit,
            descending,
            all_within,
        }
    }

    fn time_ok(&self, row: u32) -> bool {
        if self.all_within {
            return true;
        }
        let t = (self.timestamps)(row);
        if self.descending {
            t >= self.limit
        } else {
            t < self.limit
        }
    }
}

impl Offset for TimestampCheckingOffset {
    fn current(&self) -> u32 {
        self.inner.current()
    }

    fn within_bounds(&self) -> bool {
        self.inner.within_bounds() && self.time_ok(self.inner.current())
    }

    fn advance(&mut self) -> Result<(), ExecutionError> {
        self.inner.advance()
    }

    fn reset(&mut self) {
        self.inner.reset();
    }

    fn clone_box(&self) -> Box<dyn Offset> {
        Box::new(Self {
            inner: self.inner.clone_box(),
            timestamps: self.timestamps.clone(),
            limit: self.limit,
            descending: self.descending,
            all_within: self.all_within,
        })
    }

    fn advance_uninterruptibly(&mut self) {
        self.inner.advance_uninterruptibly();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(mut o: Box<dyn Offset>) -> Vec<u32> {
        let mut out = vec![];
        while o.within_bounds() {
            out.push(o.current());
            o.advance().unwrap();
        }
        out
    }

    #[test]
    fn ascending_drains_in_order() {
        assert_eq!(drain(Box::new(Ascending::new(5))), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn descending_drains_in_order() {
        assert_eq!(drain(Box::new(Descending::new(5))), vec![4, 3, 2, 1, 0]);
    }

    #[test]
    fn ascending_empty() {
        assert_eq!(drain(Box::new(Ascending::new(0))), Vec::<u32>::new());
    }

    #[test]
    fn descending_reset_replays_from_n() {
        let mut o = Descending::new(3);
        assert_eq!(o.current(), 2);
        o.advance().unwrap();
        o.advance().unwrap();
        assert_eq!(o.current(), 0);
        o.reset();
        assert_eq!(drain(Box::new(o)), vec![2, 1, 0]);
    }

    #[test]
    fn bitmap_offset_respects_direction() {
        let bm = crate::bitmap::RowBitmap::from_rows(10, [2, 4, 9]);
        assert_eq!(
            drain(Box::new(BitmapOffset::new(&bm, false))),
            vec![2, 4, 9]
        );
        assert_eq!(
            drain(Box::new(BitmapOffset::new(&bm, true))),
            vec![9, 4, 2]
        );
    }

    struct EvenMatcher;
    impl RowMatcher for EvenMatcher {
        fn matches(&self, row: u32) -> bool {
            row % 2 == 0
        }
    }

    #[test]
    fn filtered_offset_skips_non_matches() {
        let base = Box::new(Ascending::new(10));
        let filtered =
            FilteredOffset::new(base, Box::new(EvenMatcher), Cancellation::none()).unwrap();
        assert_eq!(drain(Box::new(filtered)), vec![0, 2, 4, 6, 8]);
    }

    #[test]
    fn filtered_offset_observes_cancellation() {
        struct NeverMatcher;
        impl RowMatcher for NeverMatcher {
            fn matches(&self, _row: u32) -> bool {
                false
            }
        }
        let cancellation = Cancellation::none();
        cancellation.cancel();
        let err = FilteredOffset::new(
            Box::new(Ascending::new(10_000)),
            Box::new(NeverMatcher),
            cancellation,
        )
        .unwrap_err();
        assert!(matches!(err, ExecutionError::Interrupted));
    }

    #[test]
    fn advance_uninterruptibly_ignores_cancellation() {
        let cancellation = Cancellation::none();
        let mut filtered = FilteredOffset::new(
            Box::new(Ascending::new(10)),
            Box::new(EvenMatcher),
            cancellation.clone(),
        )
        .unwrap();
        cancellation.cancel();
        // Would return `Err(Interrupted)` through `advance`; must succeed here.
        filtered.advance_uninterruptibly();
        assert_eq!(filtered.current(), 2);
    }

    #[test]
    fn timestamp_checking_ascending_stops_at_limit() {
        let times = [0i64, 10, 20, 30, 40];
        let inner = Box::new(Ascending::new(5));
        let checked = TimestampCheckingOffset::new(
            inner,
            std::sync::Arc::new(move |row| times[row as usize]),
            25,
            false,
            false,
        );
        assert_eq!(drain(Box::new(checked)), vec![0, 1, 2]);
    }

    #[test]
    fn timestamp_checking_descending_stops_at_limit() {
        let times = [0i64, 10, 20, 30, 40];
        let inner = Box::new(Descending::new(5));
        let checked = TimestampCheckingOffset::new(
            inner,
            std::sync::Arc::new(move |row| times[row as usize]),
            15,
            true,
            false,
        );
        assert_eq!(drain(Box::new(checked)), vec![4, 3, 2]);
    }

    #[test]
    fn pointer_offset_reads_wherever_its_set() {
        let mut p = PointerOffset::new();
        assert_eq!(p.current(), 0);
        p.set_pointer(7);
        assert_eq!(p.current(), 7);
        assert!(p.within_bounds());
    }

    #[test]
    fn all_within_skips_time_check() {
        let inner = Box::new(Ascending::new(3));
        let checked = TimestampCheckingOffset::new(
            inner,
            std::sync::Arc::new(|_row| i64::MAX),
            0,
            false,
            true,
        );
        assert_eq!(drain(Box::new(checked)), vec![0, 1, 2]);
    }
}
