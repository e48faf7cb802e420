//! Error types for varmon.
//!
//! All errors are strongly typed using thiserror. Callers are expected to
//! treat every variant as a programming error (bad configuration or misuse),
//! so none of them carry retry semantics.

use thiserror::Error;

/// Validation errors raised while building conditions, registering variables
/// or checking notified values.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    /// A required value was null.
    #[error("Required value '{field}' is null")]
    NullValue {
        /// Name of the null argument.
        field: String,
    },

    /// A value or literal had the wrong type for its variable.
    #[error("Type mismatch in {context}: expected {expected}, got {actual}")]
    TypeMismatch {
        /// Where the mismatch was found.
        context: String,
        /// Type that was required.
        expected: String,
        /// Type that was supplied.
        actual: String,
    },

    /// A condition was configured inconsistently.
    #[error("Invalid configuration: {reason}")]
    InvalidConfiguration {
        /// What is inconsistent.
        reason: String,
    },
}

impl ValidationError {
    pub(crate) fn null_value(field: impl Into<String>) -> Self {
        Self::NullValue { field: field.into() }
    }

    pub(crate) fn type_mismatch(
        context: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::TypeMismatch {
            context: context.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    pub(crate) fn invalid_configuration(reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            reason: reason.into(),
        }
    }
}

/// Execution errors raised by operations on a running engine.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExecutionError {
    /// The variable id is not registered.
    #[error("Variable not registered: {id}")]
    UnregisteredVariable {
        /// The unknown id.
        id: String,
    },

    /// A channel's other side is gone.
    #[error("Channel disconnected: {path}")]
    Disconnected {
        /// Which channel disconnected.
        path: String,
    },

    /// A blocking receive timed out.
    #[error("Operation timed out after {duration_ms}ms")]
    Timeout {
        /// The timeout that elapsed.
        duration_ms: u64,
    },
}

/// Top-level error type for varmon.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MonitorError {
    /// Invalid input.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Runtime misuse or channel failure.
    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    /// Engine state is unusable, e.g. a poisoned lock.
    #[error("Internal error: {message}")]
    Internal {
        /// Diagnostic detail.
        message: String,
    },
}

impl MonitorError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub(crate) fn unregistered(id: impl Into<String>) -> Self {
        Self::Execution(ExecutionError::UnregisteredVariable { id: id.into() })
    }

    /// Returns true for validation errors.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true for execution errors.
    #[must_use]
    pub const fn is_execution(&self) -> bool {
        matches!(self, Self::Execution(_))
    }

    /// Returns true for internal errors.
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        matches!(self, Self::Internal { .. })
    }

    /// Returns true if this is an unknown-variable error.
    #[must_use]
    pub const fn is_unregistered_variable(&self) -> bool {
        matches!(
            self,
            Self::Execution(ExecutionError::UnregisteredVariable { .. })
        )
    }

    /// Returns true if a required value was null.
    #[must_use]
    pub const fn is_null_value(&self) -> bool {
        matches!(self, Self::Validation(ValidationError::NullValue { .. }))
    }

    /// Returns true if a value or threshold had the wrong type.
    #[must_use]
    pub const fn is_type_mismatch(&self) -> bool {
        matches!(self, Self::Validation(ValidationError::TypeMismatch { .. }))
    }

    /// Returns true if a condition was configured inconsistently.
    #[must_use]
    pub const fn is_invalid_configuration(&self) -> bool {
        matches!(
            self,
            Self::Validation(ValidationError::InvalidConfiguration { .. })
        )
    }
}

/// Result type alias for varmon operations.
pub type MonitorResult<T> = Result<T, MonitorError>;

pub(crate) fn lock_err(context: &'static str) -> MonitorError {
    MonitorError::internal(format!("poisoned lock: {context}"))
}
