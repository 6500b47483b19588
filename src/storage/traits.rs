//! Abstract storage traits.
//!
//! These traits define the contract that entity stores must implement.
//! Implementations are expected to be safe for concurrent readers; the
//! resolution layer calls them from many worker threads at once.

use std::sync::Arc;

use thiserror::Error;

use crate::domain::Security;
use crate::error::ValidationError;
use crate::id::{ExternalIdBundle, ObjectId, UniqueId};
use crate::target::Target;
use crate::version::VersionCorrection;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The requested entity does not exist at the requested coordinate.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Key already exists.
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    /// Backend error.
    #[error("Storage backend error: {0}")]
    Backend(String),

    /// Connection failed.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The entity was rejected before anything was written.
    #[error("Invalid entity: {0}")]
    Validation(#[from] ValidationError),
}

/// Looks up entities by identifier at a version-correction.
///
/// # Versioning
/// - A versioned `UniqueId` names exactly one stored version.
/// - An unversioned `UniqueId` names whichever version is current at the
///   version-correction.
pub trait ObjectResolver: Send + Sync {
    /// Resolve an entity. Returns `Ok(None)` when it does not exist.
    fn resolve_object(
        &self,
        unique_id: &UniqueId,
        version_correction: &VersionCorrection,
    ) -> Result<Option<Target>, StorageError>;

    /// Resolve the exact id of the entity carrying any of `external_ids`.
    fn resolve_external_id(
        &self,
        external_ids: &ExternalIdBundle,
        version_correction: &VersionCorrection,
    ) -> Result<Option<UniqueId>, StorageError>;
}

/// Looks up securities.
///
/// Unlike [`ObjectResolver`], absence is reported as `StorageError::NotFound`.
pub trait SecuritySource: Send + Sync {
    /// Get the security carrying any of `external_ids`.
    fn get_by_external_ids(
        &self,
        external_ids: &ExternalIdBundle,
        version_correction: &VersionCorrection,
    ) -> Result<Arc<Security>, StorageError>;

    /// Get the security with the given object id.
    fn get_by_object_id(
        &self,
        object_id: &ObjectId,
        version_correction: &VersionCorrection,
    ) -> Result<Arc<Security>, StorageError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    // Compile-time test: ensure traits are object-safe
    fn _assert_object_resolver_object_safe(_: &dyn ObjectResolver) {}
    fn _assert_security_source_object_safe(_: &dyn SecuritySource) {}

    #[test]
    fn test_storage_error_display() {
        let err = StorageError::NotFound("Sec~1".to_string());
        assert!(err.to_string().contains("Not found"));

        let err = StorageError::Backend("connection refused".to_string());
        assert!(err.to_string().contains("connection refused"));
    }
}
