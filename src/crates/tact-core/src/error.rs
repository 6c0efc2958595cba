//! Error types for action resolution and parameter extraction
//!
//! All errors implement `std::error::Error` via the `thiserror` crate.
//!
//! # Propagation contract
//!
//! Not every variant travels the same way:
//!
//! - [`DimensionMismatch`](ActionError::DimensionMismatch) and
//!   [`InvalidOperation`](ActionError::InvalidOperation) are programmer errors.
//!   They surface immediately and are never retried.
//! - [`ParseFailure`](ActionError::ParseFailure) and
//!   [`ValidationFailure`](ActionError::ValidationFailure) raised while
//!   normalizing a single entity are recovered locally: the offending
//!   parameter is treated as unresolved, the extraction continues.
//! - [`MissingRequiredParameter`](ActionError::MissingRequiredParameter) drops
//!   one action from a batch, never the whole query.
//! - [`ExecutionFailure`](ActionError::ExecutionFailure) is caught per action
//!   during `run`; the failed action reports a null output and later actions
//!   still execute.
//!
//! "Nothing matched" is not an error at all — public entry points report it
//! through the `message` field of their structured results.

use thiserror::Error;

/// Convenience result type using [`ActionError`].
pub type Result<T> = std::result::Result<T, ActionError>;

/// Error type for all core operations.
#[derive(Debug, Error)]
pub enum ActionError {
    /// A vector's length does not match the index's fixed dimensionality.
    #[error("dimension mismatch: index holds {expected}-dimensional vectors, got {actual}")]
    DimensionMismatch {
        /// Dimensionality the index was created with.
        expected: usize,
        /// Dimensionality of the offending vector.
        actual: usize,
    },

    /// A query was issued against an index with no records.
    ///
    /// Callers resolving actions treat this as "no candidates", not a crash.
    #[error("vector index is empty")]
    EmptyIndex,

    /// A structurally invalid request (self-merge, missing executor registry,
    /// malformed catalogue entry).
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// Malformed collaborator output or unparseable numeric/date/JSON text.
    #[error("parse failure: {0}")]
    ParseFailure(String),

    /// A value parsed correctly but falls outside its declared domain.
    #[error("validation failure: {0}")]
    ValidationFailure(String),

    /// A required parameter could not be resolved from the query text.
    #[error("missing required parameter '{parameter}' for action '{action}'")]
    MissingRequiredParameter {
        /// Action whose schema declared the parameter.
        action: String,
        /// Name of the unresolved parameter.
        parameter: String,
    },

    /// An executor callback failed.
    #[error("action '{action}' execution failed: {error}")]
    ExecutionFailure {
        /// Name of the action that was being executed.
        action: String,
        /// Error message from the callback.
        error: String,
    },

    /// An external collaborator call (embedding, recognition, completion)
    /// failed.
    #[error("collaborator call failed: {0}")]
    Collaborator(String),

    /// JSON serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// File system error while persisting or restoring an index.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ActionError {
    /// Create an [`ActionError::InvalidOperation`].
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        ActionError::InvalidOperation(message.into())
    }

    /// Create an [`ActionError::ParseFailure`].
    pub fn parse(message: impl Into<String>) -> Self {
        ActionError::ParseFailure(message.into())
    }

    /// Create an [`ActionError::ValidationFailure`].
    pub fn validation(message: impl Into<String>) -> Self {
        ActionError::ValidationFailure(message.into())
    }

    /// Create an [`ActionError::Collaborator`].
    pub fn collaborator(message: impl Into<String>) -> Self {
        ActionError::Collaborator(message.into())
    }

    /// Create an [`ActionError::MissingRequiredParameter`].
    pub fn missing_required(action: impl Into<String>, parameter: impl Into<String>) -> Self {
        ActionError::MissingRequiredParameter {
            action: action.into(),
            parameter: parameter.into(),
        }
    }

    /// Create an [`ActionError::ExecutionFailure`].
    pub fn execution(action: impl Into<String>, error: impl Into<String>) -> Self {
        ActionError::ExecutionFailure {
            action: action.into(),
            error: error.into(),
        }
    }

    /// Whether this error is recovered locally during parameter extraction
    /// (the parameter stays unresolved) rather than aborting the call.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ActionError::ParseFailure(_) | ActionError::ValidationFailure(_)
        )
    }
}
