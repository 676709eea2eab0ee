//! Errors raised by component storage.
//!
//! Only layout violations and storage misuse are errors. A missing component or
//! a stale entity handle is ordinary control flow and is reported through
//! `Option` or treated as a no-op instead.

/// An error from a pool, the registry or an update unit.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A value was written to (or viewed from) a pool whose element layout
    /// belongs to a different type.
    #[error("`{name}` is {actual} bytes but the pool stores {expected}-byte values")]
    TypeMismatch {
        name: &'static str,
        expected: usize,
        actual: usize,
    },

    /// The pool has not had its element layout established yet.
    #[error("pool storage has not been initialised")]
    UninitializedStorage,

    /// A row was addressed that the pool has never pushed.
    #[error("row {row} is outside the {rows} rows of the pool")]
    RowOutOfRange { row: usize, rows: usize },

    /// The same component type was requested twice in one join.
    #[error("`{0}` appears more than once in a join")]
    AliasedJoin(&'static str),

    /// An update unit failed during a frame.
    #[error("update unit `{unit}` failed: {source}")]
    Unit {
        unit: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },
}

impl Error {
    /// Wrap an arbitrary failure raised inside an update unit.
    pub fn unit(unit: impl Into<String>, source: impl Into<Box<dyn std::error::Error + Send + Sync + 'static>>) -> Error {
        Error::Unit {
            unit: unit.into(),
            source: source.into(),
        }
    }

    /// Returns true if this error indicates a layout violation.
    pub fn is_type_mismatch(&self) -> bool {
        matches!(self, Error::TypeMismatch { .. })
    }
}

/// A `Result` defaulting to this crate's `Error`.
pub type Result<T, E = Error> = std::result::Result<T, E>;
