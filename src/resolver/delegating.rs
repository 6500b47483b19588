use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use super::{TargetCache, TargetResolver};
use crate::config::LazyResolutionConfig;
use crate::error::{ResolveResult, ValidationError};
use crate::id::{ExternalIdBundle, UniqueId};
use crate::proxy::{HandlePortfolioNode, HandlePosition, HandleTrade};
use crate::registry::{ResolverBinding, ResolverRegistry};
use crate::target::{Target, TargetKind, TargetSpecification};
use crate::version::VersionCorrection;

/// Entry point used by the computation engine.
///
/// Specifications of a lazily resolvable kind are answered immediately with a
/// lazy-over-handle proxy bound to the underlying resolver; the underlying
/// resolver is not called, so even existence is checked only on first use.
/// Every other kind is forwarded unchanged.
pub struct DelegatingTargetResolver {
    underlying: Arc<dyn TargetResolver>,
    lazy_kinds: HashSet<TargetKind>,
    registry: Arc<ResolverRegistry>,
}

impl DelegatingTargetResolver {
    /// Creates a resolver with the default lazy kinds and the global registry.
    #[must_use]
    pub fn new(underlying: Arc<dyn TargetResolver>) -> Self {
        let config = LazyResolutionConfig::default();
        Self {
            underlying,
            lazy_kinds: config.lazy_kinds.into_iter().collect(),
            registry: ResolverRegistry::global(),
        }
    }

    /// Creates a resolver from a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns the configuration's validation error.
    pub fn with_config(
        underlying: Arc<dyn TargetResolver>,
        config: &LazyResolutionConfig,
    ) -> Result<Self, ValidationError> {
        config.validate()?;
        Ok(Self {
            underlying,
            lazy_kinds: config.lazy_kinds.iter().copied().collect(),
            registry: ResolverRegistry::global(),
        })
    }

    #[must_use]
    pub fn with_registry(mut self, registry: Arc<ResolverRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// True if `resolve` answers `spec` with a proxy instead of a lookup.
    #[must_use]
    pub fn is_lazily_resolvable(&self, spec: &TargetSpecification) -> bool {
        self.lazy_kinds.contains(&spec.kind())
    }

    #[must_use]
    pub fn underlying(&self) -> &Arc<dyn TargetResolver> {
        &self.underlying
    }
}

impl fmt::Debug for DelegatingTargetResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<_> = self.lazy_kinds.iter().collect();
        kinds.sort();
        f.debug_struct("DelegatingTargetResolver")
            .field("lazy_kinds", &kinds)
            .finish_non_exhaustive()
    }
}

impl TargetResolver for DelegatingTargetResolver {
    fn resolve(
        &self,
        spec: &TargetSpecification,
        version_correction: &VersionCorrection,
    ) -> ResolveResult<Option<Target>> {
        if !self.is_lazily_resolvable(spec) {
            return self.underlying.resolve(spec, version_correction);
        }

        debug!(%spec, %version_correction, "handing out lazy proxy");
        let binding = ResolverBinding::new(
            Arc::clone(&self.underlying),
            Arc::clone(&self.registry),
            *version_correction,
        );
        let spec = spec.clone();
        let target = match spec.kind() {
            TargetKind::PortfolioNode => Target::PortfolioNode(Arc::new(HandlePortfolioNode::deferred(spec, binding))),
            TargetKind::Position => Target::Position(Arc::new(HandlePosition::deferred(spec, binding))),
            TargetKind::Trade => Target::Trade(Arc::new(HandleTrade::deferred(spec, binding))),
            _ => return self.underlying.resolve(&spec, version_correction),
        };
        Ok(Some(target))
    }

    fn resolve_external_ids(
        &self,
        external_ids: &ExternalIdBundle,
        version_correction: &VersionCorrection,
    ) -> ResolveResult<Option<UniqueId>> {
        self.underlying.resolve_external_ids(external_ids, version_correction)
    }

    fn cache(&self) -> Option<&dyn TargetCache> {
        self.underlying.cache()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{PortfolioNode, SimplePortfolioNode, Trade};
    use crate::error::ResolveError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counting {
        calls: AtomicUsize,
    }

    impl TargetResolver for Counting {
        fn resolve(&self, spec: &TargetSpecification, _: &VersionCorrection) -> ResolveResult<Option<Target>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match spec.kind() {
                TargetKind::PortfolioNode => {
                    let id = spec.unique_id().object_id().at_version("1");
                    Ok(Some(Target::PortfolioNode(Arc::new(SimplePortfolioNode::new(id, "node")))))
                }
                _ => Ok(None),
            }
        }
    }

    fn delegating(underlying: &Arc<Counting>) -> DelegatingTargetResolver {
        DelegatingTargetResolver::new(underlying.clone())
            .with_registry(Arc::new(ResolverRegistry::with_sweep_threshold(8)))
    }

    #[test]
    fn test_lazy_kinds_skip_the_underlying_resolver() {
        let underlying = Arc::new(Counting::default());
        let resolver = delegating(&underlying);
        let spec = TargetSpecification::new(TargetKind::PortfolioNode, UniqueId::latest("Node", "1"));
        assert!(resolver.is_lazily_resolvable(&spec));

        let node = resolver
            .resolve(&spec, &VersionCorrection::latest())
            .unwrap()
            .unwrap()
            .into_portfolio_node()
            .unwrap();
        assert_eq!(underlying.calls.load(Ordering::SeqCst), 0);

        assert_eq!(node.name().unwrap(), "node");
        assert_eq!(underlying.calls.load(Ordering::SeqCst), 1);
        node.name().unwrap();
        assert_eq!(underlying.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_other_kinds_are_forwarded() {
        let underlying = Arc::new(Counting::default());
        let resolver = delegating(&underlying);
        let spec = TargetSpecification::new(TargetKind::Portfolio, UniqueId::latest("Port", "1"));
        assert!(!resolver.is_lazily_resolvable(&spec));
        assert!(resolver.resolve(&spec, &VersionCorrection::latest()).unwrap().is_none());
        assert_eq!(underlying.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_missing_lazy_target_fails_on_use() {
        let underlying = Arc::new(Counting::default());
        let resolver = delegating(&underlying);
        let spec = TargetSpecification::new(TargetKind::Trade, UniqueId::latest("Trade", "1"));
        let trade = resolver
            .resolve(&spec, &VersionCorrection::latest())
            .unwrap()
            .unwrap()
            .into_trade()
            .unwrap();
        assert!(matches!(trade.quantity(), Err(ResolveError::TargetNotFound { .. })));
    }

    #[test]
    fn test_eager_config_forwards_everything() {
        let underlying = Arc::new(Counting::default());
        let resolver =
            DelegatingTargetResolver::with_config(underlying.clone(), &LazyResolutionConfig::eager()).unwrap();
        let spec = TargetSpecification::new(TargetKind::PortfolioNode, UniqueId::latest("Node", "1"));
        assert!(!resolver.is_lazily_resolvable(&spec));
        resolver.resolve(&spec, &VersionCorrection::latest()).unwrap();
        assert_eq!(underlying.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = LazyResolutionConfig {
            lazy_kinds: vec![TargetKind::Portfolio],
            ..LazyResolutionConfig::default()
        };
        assert!(DelegatingTargetResolver::with_config(Arc::new(Counting::default()), &config).is_err());
    }
}
