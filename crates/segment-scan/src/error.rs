//! The error taxonomy from `spec.md` §7.
//!
//! [`ConfigError`] and [`DataError`] are raised before or during cursor
//! construction; [`ExecutionError`] is raised while a cursor is being driven.
//! None of these are retried by this crate — callers decide what to do next.

/// Errors discovered while interpreting a [`crate::CursorBuildSpec`] against a
/// [`crate::Segment`], before any row has been produced.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// `preferred_ordering` named a column other than `__time`.
    #[error("unsupported ordering on column {column:?}: only __time ordering is honored")]
    UnsupportedOrdering { column: String },

    /// A virtual column's declaration (directly or transitively) referenced
    /// itself.
    #[error("cyclic virtual column definition involving {name:?}")]
    CyclicVirtualColumn { name: String },

    /// An operation the row-based adapter does not support, per `spec.md` §9
    /// ("the contract in this spec is that `get_metadata()` is
    /// `UnsupportedOperation` ... and `num_rows()` is `UnsupportedOperation`
    /// too").
    #[error("unsupported operation: {what}")]
    UnsupportedOperation { what: &'static str },
}

/// Errors raised while a [`crate::Cursor`] or [`crate::VectorCursor`] is being
/// driven.
#[derive(thiserror::Error, Debug)]
pub enum ExecutionError {
    /// `as_vector_cursor` was called on a holder whose `can_vectorize()` is
    /// `false`.
    #[error("cursor is not vectorizable")]
    NotVectorizable,

    /// A filter produced neither a bitmap index nor a value matcher.
    #[error("filter {filter:?} produced neither an index nor a matcher")]
    UnmatchableFilter { filter: String },

    /// The cooperative cancellation token was observed set during
    /// `advance()`. The cursor that raised this is left `is_done() == true`.
    #[error("cursor advance was interrupted")]
    Interrupted,

    /// One or more registered resources failed to release during
    /// `CursorHolder::close`. Secondary failures during the same close are
    /// coalesced into this one.
    #[error("failed to close cursor holder: {reason}")]
    CloseFailed { reason: String },
}

/// Errors raised when a selector is asked to produce a type the underlying
/// column cannot honor.
#[derive(thiserror::Error, Debug)]
pub enum DataError {
    #[error("column {column:?} has type {actual:?}, but {requested:?} was requested")]
    TypeMismatch {
        column: String,
        requested: crate::segment::ColumnType,
        actual: crate::segment::ColumnType,
    },
}

/// Either a [`ConfigError`] or an [`ExecutionError`] raised while building a
/// holder — [`crate::holder::make_cursor_holder`] can fail for either reason
/// (bad ordering is a config problem; an unmatchable filter is only
/// detectable once the filter bundle is built), and this is the single
/// result type that covers both without forcing callers to match twice.
#[derive(thiserror::Error, Debug)]
pub enum HolderError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),
}

/// Panics with a formatted message. Used at the handful of sites named in
/// `spec.md` §7 where the only possible cause is a bug in this crate itself
/// (e.g. an offset observed out of bounds) rather than anything a caller
/// could have prevented.
macro_rules! invariant {
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            panic!("segment-scan invariant violated: {}", format!($($arg)+));
        }
    };
}
pub(crate) use invariant;
