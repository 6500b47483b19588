//! Process-wide mapping between resolver instances and transmissible handles.
//!
//! A lazy-over-handle snapshot names its resolver by a small integer so it
//! can cross a process boundary. The registry hands those integers out and
//! turns them back into resolvers on the receiving side of a round trip
//! within the same process.
//!
//! # Lifecycle
//!
//! Resolvers are held weakly. An entry whose resolver has been dropped is
//! unrecoverable immediately and is physically removed by one of:
//! - a sweep after `sweep_threshold` new registrations,
//! - an explicit [`ResolverRegistry::purge`],
//! - [`ResolverRegistry::release_if_last`], called when a bound resolve
//!   context that registered its resolver is dropped.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock, PoisonError, RwLock, Weak};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::config::LazyResolutionConfig;
use crate::error::{ResolveError, ResolveResult};
use crate::resolver::TargetResolver;
use crate::target::{Target, TargetSpecification};
use crate::version::VersionCorrection;

static GLOBAL: OnceLock<Arc<ResolverRegistry>> = OnceLock::new();

/// Opaque handle naming a registered resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResolverHandle(u64);

impl ResolverHandle {
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ResolverHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Stable identity of a resolver instance: the address of its allocation.
fn identity(resolver: &Arc<dyn TargetResolver>) -> usize {
    Arc::as_ptr(resolver).cast::<()>() as usize
}

#[derive(Default)]
struct RegistryState {
    next: u64,
    by_handle: HashMap<ResolverHandle, Weak<dyn TargetResolver>>,
    by_identity: HashMap<usize, ResolverHandle>,
    since_sweep: usize,
}

impl RegistryState {
    fn live(&self, identity: usize) -> Option<ResolverHandle> {
        let handle = *self.by_identity.get(&identity)?;
        let weak = self.by_handle.get(&handle)?;
        // An address can be reused once the old resolver is gone.
        (weak.strong_count() > 0 && weak.as_ptr().cast::<()>() as usize == identity).then_some(handle)
    }

    fn remove(&mut self, handle: ResolverHandle) {
        if let Some(weak) = self.by_handle.remove(&handle) {
            let identity = weak.as_ptr().cast::<()>() as usize;
            if self.by_identity.get(&identity) == Some(&handle) {
                self.by_identity.remove(&identity);
            }
        }
    }

    fn sweep(&mut self) -> usize {
        let dead: Vec<ResolverHandle> = self
            .by_handle
            .iter()
            .filter(|(_, weak)| weak.strong_count() == 0)
            .map(|(handle, _)| *handle)
            .collect();
        for handle in &dead {
            self.remove(*handle);
        }
        self.since_sweep = 0;
        dead.len()
    }
}

/// Weak, bidirectional resolver registry.
pub struct ResolverRegistry {
    state: RwLock<RegistryState>,
    sweep_threshold: usize,
}

impl ResolverRegistry {
    /// Creates a registry sweeping after `config.registry_sweep_threshold` registrations.
    #[must_use]
    pub fn new(config: &LazyResolutionConfig) -> Self {
        Self::with_sweep_threshold(config.registry_sweep_threshold)
    }

    #[must_use]
    pub fn with_sweep_threshold(sweep_threshold: usize) -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
            sweep_threshold: sweep_threshold.max(1),
        }
    }

    /// The lazily created process-wide registry.
    pub fn global() -> Arc<Self> {
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(Self::new(&LazyResolutionConfig::default()))))
    }

    /// Returns the handle for `resolver`, registering it on first use.
    ///
    /// Concurrent calls for the same instance always agree on one handle.
    pub fn handle_for(&self, resolver: &Arc<dyn TargetResolver>) -> ResolverHandle {
        let identity = identity(resolver);
        {
            let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(handle) = state.live(identity) {
                return handle;
            }
        }

        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = state.live(identity) {
            return handle;
        }
        if let Some(stale) = state.by_identity.get(&identity).copied() {
            state.remove(stale);
        }

        state.next += 1;
        let handle = ResolverHandle(state.next);
        state.by_handle.insert(handle, Arc::downgrade(resolver));
        state.by_identity.insert(identity, handle);
        trace!(%handle, "registered resolver");

        state.since_sweep += 1;
        if state.since_sweep >= self.sweep_threshold {
            let purged = state.sweep();
            if purged > 0 {
                debug!(purged, "swept dead resolver handles");
            }
        }
        handle
    }

    /// Recovers the resolver behind `handle`.
    ///
    /// # Errors
    ///
    /// `UnknownHandle` if this process never issued the handle or the
    /// resolver has since been dropped.
    pub fn resolver_for(&self, handle: ResolverHandle) -> ResolveResult<Arc<dyn TargetResolver>> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state
            .by_handle
            .get(&handle)
            .and_then(Weak::upgrade)
            .ok_or(ResolveError::UnknownHandle { handle })
    }

    /// Removes every entry whose resolver is gone. Returns how many were removed.
    pub fn purge(&self) -> usize {
        self.state.write().unwrap_or_else(PoisonError::into_inner).sweep()
    }

    /// Unregisters `resolver` if the caller holds the only strong reference to it.
    ///
    /// Returns true if an entry was removed.
    pub fn release_if_last(&self, resolver: &Arc<dyn TargetResolver>) -> bool {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if Arc::strong_count(resolver) > 1 {
            return false;
        }
        let Some(handle) = state.live(identity(resolver)) else {
            return false;
        };
        state.remove(handle);
        trace!(%handle, "released resolver");
        true
    }

    /// Number of entries, live or not yet swept.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.read().unwrap_or_else(PoisonError::into_inner).by_handle.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ResolverRegistry {
    fn default() -> Self {
        Self::new(&LazyResolutionConfig::default())
    }
}

impl fmt::Debug for ResolverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolverRegistry")
            .field("entries", &self.len())
            .field("sweep_threshold", &self.sweep_threshold)
            .finish()
    }
}

/// A resolver fixed to one version-correction, plus the registry that can name it.
#[derive(Clone)]
pub struct ResolverBinding {
    resolver: Arc<dyn TargetResolver>,
    registry: Arc<ResolverRegistry>,
    version_correction: VersionCorrection,
}

impl ResolverBinding {
    #[must_use]
    pub fn new(
        resolver: Arc<dyn TargetResolver>,
        registry: Arc<ResolverRegistry>,
        version_correction: VersionCorrection,
    ) -> Self {
        Self {
            resolver,
            registry,
            version_correction,
        }
    }

    /// Rebuilds a binding from a transmitted handle.
    ///
    /// # Errors
    ///
    /// `UnknownHandle` when `registry` cannot recover the resolver.
    pub fn from_handle(
        handle: ResolverHandle,
        version_correction: VersionCorrection,
        registry: &Arc<ResolverRegistry>,
    ) -> ResolveResult<Self> {
        let resolver = registry.resolver_for(handle)?;
        Ok(Self::new(resolver, Arc::clone(registry), version_correction))
    }

    #[must_use]
    pub fn resolver(&self) -> &Arc<dyn TargetResolver> {
        &self.resolver
    }

    #[must_use]
    pub const fn version_correction(&self) -> &VersionCorrection {
        &self.version_correction
    }

    /// Registers the resolver (if needed) and returns its handle.
    #[must_use]
    pub fn handle(&self) -> ResolverHandle {
        self.registry.handle_for(&self.resolver)
    }

    /// Resolves a target the caller explicitly asked for.
    ///
    /// # Errors
    ///
    /// `TargetNotFound` when the resolver reports absence.
    pub fn resolve(&self, spec: &TargetSpecification) -> ResolveResult<Target> {
        self.resolve_optional(spec)?
            .ok_or_else(|| ResolveError::TargetNotFound { spec: spec.clone() })
    }

    pub fn resolve_optional(&self, spec: &TargetSpecification) -> ResolveResult<Option<Target>> {
        self.resolver.resolve(spec, &self.version_correction)
    }
}

impl fmt::Debug for ResolverBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolverBinding")
            .field("version_correction", &self.version_correction)
            .finish_non_exhaustive()
    }
}
