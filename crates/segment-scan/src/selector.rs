//! Column selector factory (`spec.md` §4.3, component C3).
//!
//! Binds `(name, offset) -> selector`. Name resolution is virtual columns
//! first, then physical columns, then a null selector — a column name that
//! resolves to nothing is not an error (`spec.md` §8, scenario S3: "filter on
//! nonexistent column equals null").

use std::cell::RefCell;
use std::rc::Rc;

use crate::column_cache::{ColumnCache, Closer};
use crate::offset::Offset;
use crate::segment::{BaseColumn, NullPolicy};
use crate::vector_cursor::VectorOffset;
use crate::virtual_columns::VirtualColumns;

/// The result of a string-dimension `get_object()` read: a single value, a
/// list of values (multi-valued dimension), or (via `Option::None` at the
/// call site) null.
#[derive(Clone, Debug, PartialEq)]
pub enum ObjectValue {
    Single(String),
    Multi(Vec<String>),
}

/// Shared handle to the offset a [`ScalarSelector`] reads through. Cloning
/// shares the same underlying offset, so a cursor driving `advance()` on one
/// clone is immediately visible to every selector built against another.
pub type SharedOffset = Rc<RefCell<Box<dyn Offset>>>;

pub fn shared_offset(offset: Box<dyn Offset>) -> SharedOffset {
    Rc::new(RefCell::new(offset))
}

/// Shared handle to the vector offset a [`VectorSelector`] reads through.
pub type SharedVectorOffset = Rc<RefCell<Box<dyn VectorOffset>>>;

pub fn shared_vector_offset(offset: Box<dyn VectorOffset>) -> SharedVectorOffset {
    Rc::new(RefCell::new(offset))
}

/// A row-at-a-time value reader bound to one column and one [`SharedOffset`].
/// Values are valid only until the bound offset's next `advance()`
/// (`spec.md` §3: "Lifecycle").
pub trait ScalarSelector {
    fn get_float(&self) -> Option<f32>;
    fn get_double(&self) -> Option<f64>;
    fn get_long(&self) -> Option<i64>;
    fn get_object(&self) -> Option<ObjectValue>;
    fn is_null(&self) -> bool;
}

/// A fixed-capacity batch reader over the vector offset's current window
/// `[vector_start, vector_start + current_vector_size)`.
pub trait VectorSelector {
    fn get_doubles(&self) -> Vec<Option<f64>>;
    fn get_longs(&self) -> Vec<Option<i64>>;
    fn get_strings(&self) -> Vec<Option<String>>;
}

struct PhysicalScalarSelector {
    column: std::sync::Arc<dyn BaseColumn>,
    offset: SharedOffset,
    null_policy: NullPolicy,
}

impl PhysicalScalarSelector {
    /// `ReplaceWithDefault` reports a missing numeric value as the type's
    /// zero instead of `None` (`spec.md` §9 "Global null-handling mode").
    fn numeric_default<T: Default>(&self, value: Option<T>) -> Option<T> {
        match (value, self.null_policy) {
            (None, NullPolicy::ReplaceWithDefault) => Some(T::default()),
            (value, _) => value,
        }
    }
}

impl ScalarSelector for PhysicalScalarSelector {
    fn get_float(&self) -> Option<f32> {
        self.numeric_default(
            self.column
                .read_f64(self.offset.borrow().current())
                .map(|v| v as f32),
        )
    }

    fn get_double(&self) -> Option<f64> {
        self.numeric_default(self.column.read_f64(self.offset.borrow().current()))
    }

    fn get_long(&self) -> Option<i64> {
        self.numeric_default(self.column.read_i64(self.offset.borrow().current()))
    }

    fn get_object(&self) -> Option<ObjectValue> {
        let row = self.offset.borrow().current();
        let values = self.column.read_multi_string(row)?;
        if values.len() == 1 {
            Some(ObjectValue::Single(values.into_iter().next()?))
        } else {
            Some(ObjectValue::Multi(values))
        }
    }

    fn is_null(&self) -> bool {
        let row = self.offset.borrow().current();
        let missing = self.column.read_multi_string(row).is_none();
        missing
            && !(self.null_policy == NullPolicy::ReplaceWithDefault
                && self.column.capabilities().column_type != crate::segment::ColumnType::String)
    }
}

struct PhysicalVectorSelector {
    column: std::sync::Arc<dyn BaseColumn>,
    offset: SharedVectorOffset,
    null_policy: NullPolicy,
}

impl PhysicalVectorSelector {
    fn numeric_default<T: Default>(&self, value: Option<T>) -> Option<T> {
        match (value, self.null_policy) {
            (None, NullPolicy::ReplaceWithDefault) => Some(T::default()),
            (value, _) => value,
        }
    }
}

impl VectorSelector for PhysicalVectorSelector {
    fn get_doubles(&self) -> Vec<Option<f64>> {
        self.offset
            .borrow()
            .current_rows()
            .iter()
            .map(|&row| self.numeric_default(self.column.read_f64(row)))
            .collect()
    }

    fn get_longs(&self) -> Vec<Option<i64>> {
        self.offset
            .borrow()
            .current_rows()
            .iter()
            .map(|&row| self.numeric_default(self.column.read_i64(row)))
            .collect()
    }

    fn get_strings(&self) -> Vec<Option<String>> {
        self.offset
            .borrow()
            .current_rows()
            .iter()
            .map(|&row| self.column.read_string(row))
            .collect()
    }
}

/// Always-null selector, returned for names that resolve to neither a
/// virtual nor a physical column.
pub struct NullScalarSelector;

impl ScalarSelector for NullScalarSelector {
    fn get_float(&self) -> Option<f32> {
        None
    }

    fn get_double(&self) -> Option<f64> {
        None
    }

    fn get_long(&self) -> Option<i64> {
        None
    }

    fn get_object(&self) -> Option<ObjectValue> {
        None
    }

    fn is_null(&self) -> bool {
        true
    }
}

pub struct NullVectorSelector {
    offset: SharedVectorOffset,
}

impl VectorSelector for NullVectorSelector {
    fn get_doubles(&self) -> Vec<Option<f64>> {
        vec![None; self.offset.borrow().current_vector_size()]
    }

    fn get_longs(&self) -> Vec<Option<i64>> {
        vec![None; self.offset.borrow().current_vector_size()]
    }

    fn get_strings(&self) -> Vec<Option<String>> {
        vec![None; self.offset.borrow().current_vector_size()]
    }
}

/// Binds column names to selectors, resolving virtual columns before
/// physical ones (`spec.md` §4.3).
pub struct ColumnSelectorFactory<'a> {
    column_cache: &'a ColumnCache<'a>,
    closer: &'a Closer,
    virtual_columns: &'a VirtualColumns,
    null_policy: NullPolicy,
}

impl<'a> ColumnSelectorFactory<'a> {
    pub fn new(
        column_cache: &'a ColumnCache<'a>,
        closer: &'a Closer,
        virtual_columns: &'a VirtualColumns,
    ) -> Self {
        Self::with_null_policy(column_cache, closer, virtual_columns, NullPolicy::default())
    }

    pub fn with_null_policy(
        column_cache: &'a ColumnCache<'a>,
        closer: &'a Closer,
        virtual_columns: &'a VirtualColumns,
        null_policy: NullPolicy,
    ) -> Self {
        Self {
            column_cache,
            closer,
            virtual_columns,
            null_policy,
        }
    }

    pub fn make_scalar_selector(&self, name: &str, offset: &SharedOffset) -> Box<dyn ScalarSelector> {
        if let Some(vc) = self.virtual_columns.get(name) {
            return vc.make_scalar_selector(name, self, offset);
        }
        if let Some(column) = self.column_cache.get(name, self.closer) {
            return Box::new(PhysicalScalarSelector {
                column,
                offset: Rc::clone(offset),
                null_policy: self.null_policy,
            });
        }
        Box::new(NullScalarSelector)
    }

    pub fn make_vector_selector(
        &self,
        name: &str,
        offset: &SharedVectorOffset,
    ) -> Box<dyn VectorSelector> {
        if let Some(vc) = self.virtual_columns.get(name) {
            return vc.make_vector_selector(name, self, offset);
        }
        if let Some(column) = self.column_cache.get(name, self.closer) {
            return Box::new(PhysicalVectorSelector {
                column,
                offset: Rc::clone(offset),
                null_policy: self.null_policy,
            });
        }
        Box::new(NullVectorSelector {
            offset: Rc::clone(offset),
        })
    }

    pub fn virtual_columns(&self) -> &VirtualColumns {
        self.virtual_columns
    }
}
