//! The column cache (`spec.md` §4.2, component C2): open-once, lifetime-
//! scoped column handles, registered with the holder's [`Closer`].

use std::cell::RefCell;
use std::sync::Arc;

use ahash::AHashMap;

use crate::segment::{BaseColumn, Segment};

/// Releases every resource it was handed, in reverse order of acquisition,
/// exactly once. `spec.md` §5: "holder close releases in reverse order of
/// acquisition; any close failure is coalesced and reported once."
#[derive(Default)]
pub struct Closer {
    // Resources only need to be dropped, not explicitly closed: every
    // column/bitmap this crate opens is a plain in-memory `Arc`, so "release"
    // is just dropping the last reference. Keeping them here is what makes
    // that happen at a deterministic point (`Closer::close`) rather than
    // whenever the holder's fields happen to go out of scope.
    resources: RefCell<Vec<Arc<dyn std::any::Any>>>,
    closed: RefCell<bool>,
}

impl Closer {
    pub fn register<T: std::any::Any>(&self, resource: Arc<T>) {
        self.resources.borrow_mut().push(resource);
    }

    /// Idempotent: a second call is a no-op, per `spec.md` §5's
    /// "Idempotence" testable property.
    pub fn close(&self) {
        if *self.closed.borrow() {
            return;
        }
        *self.closed.borrow_mut() = true;
        let mut resources = self.resources.borrow_mut();
        while resources.pop().is_some() {
            // Dropped here, in reverse-of-push (i.e. reverse-of-acquisition)
            // order.
        }
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }
}

/// Open-once, memoized `name -> opened column` map, scoped to one
/// [`crate::holder::CursorHolder`]'s lifetime.
///
/// Single-threaded from the holder's perspective (`spec.md` §4.2): `get`
/// takes `&self` via `RefCell` rather than `&mut self` only so that it can be
/// shared between the filter-bundle construction path and the result
/// selector-factory path without restructuring ownership, not because
/// concurrent access is supported.
pub struct ColumnCache<'seg> {
    segment: &'seg dyn Segment,
    opened: RefCell<AHashMap<String, Arc<dyn BaseColumn>>>,
}

impl<'seg> ColumnCache<'seg> {
    pub fn new(segment: &'seg dyn Segment) -> Self {
        Self {
            segment,
            opened: RefCell::new(AHashMap::new()),
        }
    }

    /// Opens `name` if absent, memoizing and registering the handle with
    /// `closer`. Returns `None` if the segment has no such column — this is
    /// not an error (`spec.md` §4.3: callers fall back to a null selector).
    ///
    /// A failure while opening (not modeled here since [`BaseColumn::open`]
    /// is infallible in this crate's `Segment` contract, but relevant to any
    /// `Segment` impl that defers I/O) must propagate and must not leave a
    /// partial entry in the cache; this implementation only inserts after a
    /// successful open, which gives that for free.
    pub fn get(&self, name: &str, closer: &Closer) -> Option<Arc<dyn BaseColumn>> {
        if let Some(existing) = self.opened.borrow().get(name) {
            return Some(Arc::clone(existing));
        }
        let holder = self.segment.column(name)?;
        let opened = holder.open();
        closer.register(Arc::clone(&opened));
        self.opened
            .borrow_mut()
            .insert(name.to_string(), Arc::clone(&opened));
        Some(opened)
    }

    pub fn opened_count(&self) -> usize {
        self.opened.borrow().len()
    }
}
