use std::sync::Arc;

use tracing::trace;

use super::TargetResolver;
use crate::error::{ResolveError, ResolveResult};
use crate::id::{ExternalIdBundle, UniqueId};
use crate::storage::ObjectResolver;
use crate::target::{Target, TargetKind, TargetSpecification};
use crate::version::VersionCorrection;

/// Resolves specifications straight from an [`ObjectResolver`].
///
/// Primitive specifications resolve to their own identifier without a store
/// round-trip. Every other kind must come back from the store as that kind.
#[derive(Clone)]
pub struct ObjectTargetResolver {
    objects: Arc<dyn ObjectResolver>,
}

impl ObjectTargetResolver {
    #[must_use]
    pub fn new(objects: Arc<dyn ObjectResolver>) -> Self {
        Self { objects }
    }
}

impl TargetResolver for ObjectTargetResolver {
    fn resolve(
        &self,
        spec: &TargetSpecification,
        version_correction: &VersionCorrection,
    ) -> ResolveResult<Option<Target>> {
        if spec.kind() == TargetKind::Primitive {
            return Ok(Some(Target::Primitive(spec.unique_id().clone())));
        }

        trace!(%spec, %version_correction, "resolving from store");
        let Some(target) = self.objects.resolve_object(spec.unique_id(), version_correction)? else {
            return Ok(None);
        };
        if target.kind() != spec.kind() {
            return Err(ResolveError::KindMismatch {
                expected: spec.kind(),
                actual: target.kind(),
            });
        }
        Ok(Some(target))
    }

    fn resolve_external_ids(
        &self,
        external_ids: &ExternalIdBundle,
        version_correction: &VersionCorrection,
    ) -> ResolveResult<Option<UniqueId>> {
        Ok(self.objects.resolve_external_id(external_ids, version_correction)?)
    }
}
