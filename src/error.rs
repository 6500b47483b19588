//! Error types for lazytarget.
//!
//! All errors are strongly typed using thiserror so callers can match on the
//! specific resolution failure that occurred.

use thiserror::Error;

use crate::registry::ResolverHandle;
use crate::storage::StorageError;
use crate::target::{TargetKind, TargetSpecification};

/// Validation errors that occur during input validation.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Identifier '{input}' is malformed: {reason}")]
    MalformedIdentifier {
        input: String,
        reason: String,
    },

    #[error("Identifier {id} must carry a version to be stored")]
    UnversionedIdentifier {
        id: String,
    },

    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        reason: String,
    },
}

/// Top-level error type for target resolution.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// A target that was explicitly requested does not exist.
    #[error("Target not found: {spec}")]
    TargetNotFound {
        spec: TargetSpecification,
    },

    /// A security link resolved to nothing and carried no attached security.
    #[error("Security link could not be resolved: {link}")]
    SecurityNotFound {
        link: String,
    },

    /// The handle was never registered in this process, or its resolver is gone.
    #[error("Unknown resolver handle: {handle}")]
    UnknownHandle {
        handle: ResolverHandle,
    },

    #[error("Expected a {expected} target, got {actual}")]
    KindMismatch {
        expected: TargetKind,
        actual: TargetKind,
    },

    #[error("Index {index} out of range for list of length {len}")]
    IndexOutOfRange {
        index: usize,
        len: usize,
    },

    #[error("Snapshot encoding failed: {message}")]
    Encoding {
        message: String,
    },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl ResolveError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if the failure reports absence rather than a broken backend.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::TargetNotFound { .. }
                | Self::SecurityNotFound { .. }
                | Self::Storage(StorageError::NotFound(_))
        )
    }

    /// Returns true if the error signals a broken calling contract.
    ///
    /// These are never worth retrying: an unknown handle means a snapshot was
    /// rehydrated in a process that never saw the resolver it references.
    #[must_use]
    pub const fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            Self::UnknownHandle { .. } | Self::KindMismatch { .. } | Self::IndexOutOfRange { .. }
        )
    }
}

/// Result type alias for resolution operations.
pub type ResolveResult<T> = Result<T, ResolveError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::UniqueId;

    #[test]
    fn test_target_not_found_names_spec() {
        let spec = TargetSpecification::new(TargetKind::Position, UniqueId::latest("Pos", "7"));
        let err = ResolveError::TargetNotFound { spec };
        let msg = err.to_string();
        assert!(msg.contains("Target not found"));
        assert!(msg.contains("Pos~7"));
        assert!(err.is_not_found());
        assert!(!err.is_contract_violation());
    }

    #[test]
    fn test_unknown_handle_is_contract_violation() {
        let err = ResolveError::UnknownHandle {
            handle: ResolverHandle::from_raw(42),
        };
        assert!(err.is_contract_violation());
        assert!(!err.is_not_found());
        assert!(err.to_string().contains("42"));
    }

    #[test]
    fn test_storage_not_found_counts_as_absence() {
        let err: ResolveError = StorageError::NotFound("Sec~1".to_string()).into();
        assert!(err.is_not_found());

        let err: ResolveError = StorageError::Backend("disk on fire".to_string()).into();
        assert!(!err.is_not_found());
        assert!(err.to_string().contains("disk on fire"));
    }

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::InvalidConfig {
            reason: "threshold must be > 0".to_string(),
        };
        let wrapped: ResolveError = err.into();
        assert!(wrapped.to_string().contains("threshold must be > 0"));
    }

    #[test]
    fn test_internal_error() {
        let err = ResolveError::internal("slot source missing");
        assert!(err.to_string().contains("slot source missing"));
    }
}
