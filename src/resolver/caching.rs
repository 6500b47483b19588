use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::trace;

use super::{TargetCache, TargetResolver};
use crate::error::{ResolveError, ResolveResult};
use crate::id::{ExternalIdBundle, UniqueId};
use crate::target::{Target, TargetSpecification};
use crate::version::VersionCorrection;

type CacheKey = (UniqueId, VersionCorrection);

/// Memoizing resolver that also accepts entities pushed by lazy proxies.
///
/// Entries are keyed by `(exact id, version-correction)`. An unversioned id
/// is additionally keyed as requested, but only when the version-correction
/// is fully fixed; "latest" at an open coordinate is not a stable answer.
/// Nothing is ever evicted.
pub struct CachingTargetResolver {
    underlying: Arc<dyn TargetResolver>,
    entries: RwLock<HashMap<CacheKey, Target>>,
}

impl CachingTargetResolver {
    #[must_use]
    pub fn new(underlying: Arc<dyn TargetResolver>) -> Self {
        Self {
            underlying,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the cached target for an id, without consulting the underlying resolver.
    #[must_use]
    pub fn cached(&self, unique_id: &UniqueId, version_correction: &VersionCorrection) -> Option<Target> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(&(unique_id.clone(), *version_correction)).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert(&self, requested: Option<&UniqueId>, target: &Target, vc: &VersionCorrection) -> ResolveResult<()> {
        let exact = target.unique_id()?;
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(requested) = requested {
            if !requested.is_versioned() && !vc.contains_latest() {
                entries
                    .entry((requested.clone(), *vc))
                    .or_insert_with(|| target.clone());
            }
        }
        trace!(unique_id = %exact, version_correction = %vc, "caching target");
        entries.entry((exact, *vc)).or_insert_with(|| target.clone());
        Ok(())
    }
}

impl fmt::Debug for CachingTargetResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachingTargetResolver")
            .field("entries", &self.len())
            .finish_non_exhaustive()
    }
}

impl TargetResolver for CachingTargetResolver {
    fn resolve(
        &self,
        spec: &TargetSpecification,
        version_correction: &VersionCorrection,
    ) -> ResolveResult<Option<Target>> {
        if let Some(hit) = self.cached(spec.unique_id(), version_correction) {
            if hit.kind() != spec.kind() {
                return Err(ResolveError::KindMismatch {
                    expected: spec.kind(),
                    actual: hit.kind(),
                });
            }
            return Ok(Some(hit));
        }

        let resolved = self.underlying.resolve(spec, version_correction)?;
        if let Some(target) = &resolved {
            self.insert(Some(spec.unique_id()), target, version_correction)?;
        }
        Ok(resolved)
    }

    fn resolve_external_ids(
        &self,
        external_ids: &ExternalIdBundle,
        version_correction: &VersionCorrection,
    ) -> ResolveResult<Option<UniqueId>> {
        self.underlying.resolve_external_ids(external_ids, version_correction)
    }

    fn cache(&self) -> Option<&dyn TargetCache> {
        Some(self)
    }
}

impl TargetCache for CachingTargetResolver {
    fn cache_targets(&self, targets: &[Target], version_correction: &VersionCorrection) -> ResolveResult<()> {
        for target in targets {
            self.insert(None, target, version_correction)?;
        }
        Ok(())
    }
}
