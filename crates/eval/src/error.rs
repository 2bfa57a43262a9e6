use statute_core::CoreError;
use statute_storage::StorageError;

/// Errors that abort an evaluation call.
///
/// Unresolved references are not errors: they resolve to null and, when
/// required, set the call's missing-required flag instead.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EvalError {
    /// Actions needed for the requested output depend on each other.
    #[error("circular dependency detected among actions: {}", .involved.join(", "))]
    CircularDependency { involved: Vec<String> },

    /// A comparison between values with no common ordering.
    #[error("cannot compare values of types {left} and {right}")]
    Incomparable { left: String, right: String },

    /// The reference date of a call is not a calendar date.
    #[error("invalid reference date '{value}'")]
    InvalidReferenceDate { value: String },

    /// A date operand that is present but cannot be read as a date.
    #[error("invalid date '{value}' in {operation}")]
    InvalidDate { value: String, operation: String },

    /// An operation without the operands its kind needs.
    #[error("invalid {operation} operation: {message}")]
    InvalidOperation { operation: String, message: String },

    /// Decimal arithmetic overflowed.
    #[error("numeric overflow: {message}")]
    Overflow { message: String },

    /// A remote rule service could not be reached or answered garbage.
    #[error("transport failure calling service {service}: {message}")]
    Transport { service: String, message: String },

    /// A claim or case accessor failed.
    #[error("accessor failure: {message}")]
    Accessor { message: String },

    #[error(transparent)]
    Core(CoreError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<CoreError> for EvalError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::Incomparable { left, right } => EvalError::Incomparable { left, right },
            other => EvalError::Core(other),
        }
    }
}
