//! Error type for specification and dialect operations.

use thiserror::Error;

use crate::validate::ValidationError;

/// Errors raised while building specs or rendering dialect SQL.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpecError {
    /// Malformed name, type, size or default.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Mutation attempted on a locked field spec.
    #[error("field '{field}' is locked")]
    Locked { field: String },

    /// The driver has no mapping for the requested operation.
    #[error("driver '{driver}' does not support {operation}")]
    UnsupportedDriver {
        driver: String,
        operation: &'static str,
    },
}

/// Convenience alias for results with [`SpecError`].
pub type Result<T> = std::result::Result<T, SpecError>;
