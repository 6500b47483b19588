//! The target resolver stack.
//!
//! - [`ObjectTargetResolver`] adapts a store's [`ObjectResolver`](crate::storage::ObjectResolver).
//! - [`CachingTargetResolver`] memoizes resolutions and accepts pushed entities.
//! - [`DelegatingTargetResolver`] is the entry point the computation engine calls;
//!   it answers lazily resolvable kinds with a proxy and forwards the rest.

mod caching;
mod delegating;
mod object;

use crate::error::ResolveResult;
use crate::id::{ExternalIdBundle, UniqueId};
use crate::target::{Target, TargetSpecification};
use crate::version::VersionCorrection;

pub use caching::CachingTargetResolver;
pub use delegating::DelegatingTargetResolver;
pub use object::ObjectTargetResolver;

/// Resolves specifications into targets at a version-correction.
pub trait TargetResolver: Send + Sync {
    /// Resolve `spec`. Returns `Ok(None)` when the target does not exist.
    fn resolve(
        &self,
        spec: &TargetSpecification,
        version_correction: &VersionCorrection,
    ) -> ResolveResult<Option<Target>>;

    /// Resolve the exact id of the security carrying any of `external_ids`.
    fn resolve_external_ids(
        &self,
        _external_ids: &ExternalIdBundle,
        _version_correction: &VersionCorrection,
    ) -> ResolveResult<Option<UniqueId>> {
        Ok(None)
    }

    /// The caching extension, if this resolver has one.
    fn cache(&self) -> Option<&dyn TargetCache> {
        None
    }
}

/// Accepts entities resolved elsewhere so later resolutions skip storage.
///
/// The cache is append-only from the resolution layer's point of view.
pub trait TargetCache: Send + Sync {
    fn cache_targets(&self, targets: &[Target], version_correction: &VersionCorrection) -> ResolveResult<()>;
}
