//! Cooperative cancellation, replacing the source's host-thread interrupt
//! flag (`spec.md` §9) with an explicit, injectable token.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// How many rows [`FilteredOffset::advance`](crate::offset::FilteredOffset)
/// may skip between cancellation checks. `spec.md` §4.1 requires this to be
/// at most 1024.
pub const CANCELLATION_CHECK_INTERVAL: u32 = 512;

/// A shared, cooperative cancellation flag.
///
/// Cloning a [`Cancellation`] shares the same underlying flag; this is the
/// handle callers pass into a [`crate::CursorBuildSpec`] and that this crate
/// polls from [`crate::Cursor::advance`] and during filter-offset
/// advancement. It is never polled from
/// [`crate::Cursor::advance_uninterruptibly`].
#[derive(Clone, Debug, Default)]
pub struct Cancellation(Arc<AtomicBool>);

impl Cancellation {
    /// A token that will never be cancelled.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }
}
