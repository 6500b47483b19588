//! Resolve contexts.
//!
//! A [`ResolveContext`] pairs a security source with an optional target
//! resolver. Binding it to a version-correction yields the
//! [`BoundResolveContext`] that every lazy-over-object proxy carries: it
//! resolves security links and pushes freshly resolved entities back into the
//! resolver's cache so sibling lookups are free.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::domain::{Portfolio, PortfolioNode, Position, Security, SecurityLink, Trade};
use crate::error::{ResolveError, ResolveResult};
use crate::marshal;
use crate::proxy::{LazyPortfolio, LazyPortfolioNode, LazyPosition, LazyTrade};
use crate::registry::{ResolverBinding, ResolverHandle, ResolverRegistry};
use crate::resolver::TargetResolver;
use crate::storage::{SecuritySource, StorageError};
use crate::target::{Target, TargetSpecification};
use crate::version::VersionCorrection;

/// Unbound pairing of the collaborators a lazy proxy needs.
#[derive(Clone)]
pub struct ResolveContext {
    security_source: Arc<dyn SecuritySource>,
    target_resolver: Option<Arc<dyn TargetResolver>>,
    registry: Arc<ResolverRegistry>,
}

impl ResolveContext {
    /// Creates a context that names its resolver through the global registry.
    #[must_use]
    pub fn new(
        security_source: Arc<dyn SecuritySource>,
        target_resolver: Option<Arc<dyn TargetResolver>>,
    ) -> Self {
        Self {
            security_source,
            target_resolver,
            registry: ResolverRegistry::global(),
        }
    }

    #[must_use]
    pub fn with_registry(mut self, registry: Arc<ResolverRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Fixes the context to one version-correction.
    #[must_use]
    pub fn bind(&self, version_correction: VersionCorrection) -> Arc<BoundResolveContext> {
        Arc::new(BoundResolveContext {
            security_source: Arc::clone(&self.security_source),
            target_resolver: self.target_resolver.clone(),
            registry: Arc::clone(&self.registry),
            version_correction,
            registered: AtomicBool::new(false),
        })
    }
}

impl fmt::Debug for ResolveContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolveContext")
            .field("has_target_resolver", &self.target_resolver.is_some())
            .finish_non_exhaustive()
    }
}

/// A resolve context fixed to one version-correction.
pub struct BoundResolveContext {
    security_source: Arc<dyn SecuritySource>,
    target_resolver: Option<Arc<dyn TargetResolver>>,
    registry: Arc<ResolverRegistry>,
    version_correction: VersionCorrection,
    registered: AtomicBool,
}

impl BoundResolveContext {
    #[must_use]
    pub const fn version_correction(&self) -> &VersionCorrection {
        &self.version_correction
    }

    #[must_use]
    pub fn target_resolver(&self) -> Option<&Arc<dyn TargetResolver>> {
        self.target_resolver.as_ref()
    }

    /// The resolver bound to this context's version-correction, if there is one.
    #[must_use]
    pub fn resolver_binding(&self) -> Option<ResolverBinding> {
        let resolver = self.target_resolver.as_ref()?;
        Some(ResolverBinding::new(
            Arc::clone(resolver),
            Arc::clone(&self.registry),
            self.version_correction,
        ))
    }

    /// Registers the resolver and returns its handle.
    ///
    /// `None` means there is nothing a remote side could ever re-resolve
    /// against, so snapshots must be fully materialized.
    #[must_use]
    pub fn resolver_handle(&self) -> Option<ResolverHandle> {
        let resolver = self.target_resolver.as_ref()?;
        self.registered.store(true, Ordering::Release);
        Some(self.registry.handle_for(resolver))
    }

    /// Resolves a security link at this context's version-correction.
    ///
    /// An attached security is returned without a lookup. Absence is
    /// `Ok(None)`; the caller decides whether that is fatal.
    ///
    /// # Errors
    ///
    /// Backend failures other than not-found.
    pub fn resolve_security_link(&self, link: &SecurityLink) -> ResolveResult<Option<Arc<Security>>> {
        if let Some(target) = &link.target {
            return Ok(Some(Arc::clone(target)));
        }

        let looked_up = if let Some(object_id) = &link.object_id {
            self.security_source.get_by_object_id(object_id, &self.version_correction)
        } else if link.external_ids.is_empty() {
            Err(StorageError::NotFound("security link carries no identifiers".to_string()))
        } else {
            self.security_source
                .get_by_external_ids(&link.external_ids, &self.version_correction)
        };

        match looked_up {
            Ok(security) => {
                self.cache_security(&security);
                Ok(Some(security))
            }
            Err(StorageError::NotFound(_)) => {
                debug!(%link, version_correction = %self.version_correction, "security link resolved to nothing");
                Ok(None)
            }
            Err(err) => {
                warn!(%link, error = %err, "security lookup failed");
                Err(ResolveError::Storage(err))
            }
        }
    }

    pub fn cache_portfolio_node(&self, node: &Arc<dyn PortfolioNode>) {
        self.push(Target::PortfolioNode(Arc::clone(node)));
    }

    pub fn cache_position(&self, position: &Arc<dyn Position>) {
        self.push(Target::Position(Arc::clone(position)));
    }

    pub fn cache_trade(&self, trade: &Arc<dyn Trade>) {
        self.push(Target::Trade(Arc::clone(trade)));
    }

    pub fn cache_security(&self, security: &Arc<Security>) {
        self.push(Target::Security(Arc::clone(security)));
    }

    fn push(&self, target: Target) {
        let Some(resolver) = &self.target_resolver else {
            return;
        };
        let Some(cache) = resolver.cache() else {
            return;
        };
        if marshal::is_writing() {
            marshal::defer(Arc::clone(resolver), target, self.version_correction);
            return;
        }
        trace!(kind = %target.kind(), version_correction = %self.version_correction, "pushing into resolver cache");
        if let Err(err) = cache.cache_targets(std::slice::from_ref(&target), &self.version_correction) {
            warn!(kind = %target.kind(), error = %err, "cache push failed");
        }
    }

    /// Wraps a resolved portfolio structure target in its lazy-over-object proxy.
    ///
    /// Securities and primitives come back unchanged.
    #[must_use]
    pub fn lazy_target(self: &Arc<Self>, target: Target) -> Target {
        match target {
            Target::Portfolio(p) => Target::Portfolio(Arc::new(LazyPortfolio::new(p, Arc::clone(self)))),
            Target::PortfolioNode(n) => {
                Target::PortfolioNode(Arc::new(LazyPortfolioNode::new(n, Arc::clone(self))))
            }
            Target::Position(p) => Target::Position(Arc::new(LazyPosition::new(p, Arc::clone(self)))),
            Target::Trade(t) => Target::Trade(Arc::new(LazyTrade::new(t, Arc::clone(self)))),
            other => other,
        }
    }

    /// Resolves a portfolio through the bound resolver and wraps it lazily.
    ///
    /// # Errors
    ///
    /// `TargetNotFound` if the resolver has no such portfolio, or
    /// `Internal` if this context has no resolver at all.
    pub fn resolve_portfolio(self: &Arc<Self>, spec: &TargetSpecification) -> ResolveResult<Arc<dyn Portfolio>> {
        let binding = self
            .resolver_binding()
            .ok_or_else(|| ResolveError::internal("resolve context has no target resolver"))?;
        let target = binding.resolve(spec)?;
        self.lazy_target(target).into_portfolio()
    }
}

impl Drop for BoundResolveContext {
    fn drop(&mut self) {
        if !self.registered.load(Ordering::Acquire) {
            return;
        }
        if let Some(resolver) = &self.target_resolver {
            self.registry.release_if_last(resolver);
        }
    }
}

impl fmt::Debug for BoundResolveContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundResolveContext")
            .field("version_correction", &self.version_correction)
            .field("has_target_resolver", &self.target_resolver.is_some())
            .finish_non_exhaustive()
    }
}
