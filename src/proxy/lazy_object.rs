use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime};
use rust_decimal::Decimal;
use tracing::debug;

use crate::context::BoundResolveContext;
use crate::domain::{
    Counterparty, NodeList, Portfolio, PortfolioNode, Position, PositionList, Premium, Security, SecurityLink,
    Trade, TradeList,
};
use crate::error::{ResolveError, ResolveResult};
use crate::id::UniqueId;
use crate::lazy::{LazyList, Memo, SlotSource};
use crate::marshal::WriteGuard;
use crate::snapshot::{
    materialize_node, materialize_portfolio, materialize_position, materialize_trade, HandleSnapshot, NodeFields,
    NodeSnapshot, PortfolioFields, PortfolioSnapshot, PositionFields, PositionSnapshot, TradeFields, TradeSnapshot,
};
use crate::target::{TargetKind, TargetSpecification};

/// Slots of a resolved underlying list, wrapped and cached on first read.
struct ObjectSlots<T: ?Sized> {
    underlying: Arc<LazyList<T>>,
    context: Arc<BoundResolveContext>,
    wrap: fn(Arc<T>, &Arc<BoundResolveContext>) -> Arc<T>,
}

impl<T: ?Sized + Send + Sync> SlotSource<T> for ObjectSlots<T> {
    fn resolve_slot(&self, index: usize) -> ResolveResult<Arc<T>> {
        let item = self.underlying.get(index)?;
        Ok((self.wrap)(item, &self.context))
    }
}

fn lazy_list<T: ?Sized + Send + Sync + 'static>(
    underlying: Arc<LazyList<T>>,
    context: &Arc<BoundResolveContext>,
    wrap: fn(Arc<T>, &Arc<BoundResolveContext>) -> Arc<T>,
) -> Arc<LazyList<T>> {
    let len = underlying.len();
    Arc::new(LazyList::new(
        len,
        ObjectSlots {
            underlying,
            context: Arc::clone(context),
            wrap,
        },
    ))
}

fn wrap_node(node: Arc<dyn PortfolioNode>, context: &Arc<BoundResolveContext>) -> Arc<dyn PortfolioNode> {
    context.cache_portfolio_node(&node);
    Arc::new(LazyPortfolioNode::new(node, Arc::clone(context)))
}

fn wrap_position(position: Arc<dyn Position>, context: &Arc<BoundResolveContext>) -> Arc<dyn Position> {
    context.cache_position(&position);
    Arc::new(LazyPosition::new(position, Arc::clone(context)))
}

fn wrap_trade(trade: Arc<dyn Trade>, context: &Arc<BoundResolveContext>) -> Arc<dyn Trade> {
    context.cache_trade(&trade);
    Arc::new(LazyTrade::new(trade, Arc::clone(context)))
}

/// Resolves a link once. Absence is remembered; only backend failures retry.
fn linked_security(
    memo: &Memo<Option<Arc<Security>>>,
    link: &SecurityLink,
    context: &BoundResolveContext,
) -> ResolveResult<Arc<Security>> {
    let resolved = memo.get_or_try_init(|| context.resolve_security_link(link))?;
    resolved
        .clone()
        .or_else(|| link.target.clone())
        .ok_or_else(|| ResolveError::SecurityNotFound {
            link: link.to_string(),
        })
}

fn fall_back(kind: TargetKind, unique_id: &UniqueId) {
    debug!(%kind, %unique_id, "no addressable resolver; snapshotting a materialized graph");
}

/// Lazy proxy over a resolved portfolio.
#[derive(Debug)]
pub struct LazyPortfolio {
    underlying: Arc<dyn Portfolio>,
    context: Arc<BoundResolveContext>,
    root_node: Memo<Arc<dyn PortfolioNode>>,
}

impl LazyPortfolio {
    #[must_use]
    pub fn new(underlying: Arc<dyn Portfolio>, context: Arc<BoundResolveContext>) -> Self {
        Self {
            underlying,
            context,
            root_node: Memo::new(),
        }
    }
}

impl Portfolio for LazyPortfolio {
    fn unique_id(&self) -> ResolveResult<&UniqueId> {
        self.underlying.unique_id()
    }

    fn name(&self) -> ResolveResult<&str> {
        self.underlying.name()
    }

    fn attributes(&self) -> ResolveResult<&BTreeMap<String, String>> {
        self.underlying.attributes()
    }

    fn root_node(&self) -> ResolveResult<Arc<dyn PortfolioNode>> {
        self.root_node
            .get_or_try_init(|| {
                self.underlying
                    .root_node()
                    .map(|root| wrap_node(root, &self.context))
            })
            .map(Arc::clone)
    }

    fn snapshot(&self) -> ResolveResult<PortfolioSnapshot> {
        let _pass = WriteGuard::enter();
        let unique_id = self.underlying.unique_id()?;
        match self.context.resolver_handle() {
            Some(resolver) => {
                let requested = TargetSpecification::new(TargetKind::Portfolio, unique_id.clone());
                let fields = PortfolioFields::capture(&*self.underlying, &requested)?;
                Ok(PortfolioSnapshot::Handle(HandleSnapshot::new(
                    resolver,
                    *self.context.version_correction(),
                    fields,
                )))
            }
            None => {
                fall_back(TargetKind::Portfolio, unique_id);
                Ok(PortfolioSnapshot::Simple(materialize_portfolio(self)?))
            }
        }
    }
}

/// Lazy proxy over a resolved portfolio node.
#[derive(Debug)]
pub struct LazyPortfolioNode {
    underlying: Arc<dyn PortfolioNode>,
    context: Arc<BoundResolveContext>,
    child_nodes: Memo<NodeList>,
    positions: Memo<PositionList>,
}

impl LazyPortfolioNode {
    #[must_use]
    pub fn new(underlying: Arc<dyn PortfolioNode>, context: Arc<BoundResolveContext>) -> Self {
        Self {
            underlying,
            context,
            child_nodes: Memo::new(),
            positions: Memo::new(),
        }
    }
}

impl PortfolioNode for LazyPortfolioNode {
    fn unique_id(&self) -> ResolveResult<&UniqueId> {
        self.underlying.unique_id()
    }

    fn parent_node_id(&self) -> ResolveResult<Option<&UniqueId>> {
        self.underlying.parent_node_id()
    }

    fn name(&self) -> ResolveResult<&str> {
        self.underlying.name()
    }

    fn child_nodes(&self) -> ResolveResult<NodeList> {
        self.child_nodes
            .get_or_try_init(|| {
                self.underlying
                    .child_nodes()
                    .map(|list| lazy_list(list, &self.context, wrap_node))
            })
            .map(Arc::clone)
    }

    fn positions(&self) -> ResolveResult<PositionList> {
        self.positions
            .get_or_try_init(|| {
                self.underlying
                    .positions()
                    .map(|list| lazy_list(list, &self.context, wrap_position))
            })
            .map(Arc::clone)
    }

    fn snapshot(&self) -> ResolveResult<NodeSnapshot> {
        let _pass = WriteGuard::enter();
        let unique_id = self.underlying.unique_id()?;
        match self.context.resolver_handle() {
            Some(resolver) => {
                let requested = TargetSpecification::new(TargetKind::PortfolioNode, unique_id.clone());
                let fields = NodeFields::capture(&*self.underlying, &requested)?;
                Ok(NodeSnapshot::Handle(HandleSnapshot::new(
                    resolver,
                    *self.context.version_correction(),
                    fields,
                )))
            }
            None => {
                fall_back(TargetKind::PortfolioNode, unique_id);
                Ok(NodeSnapshot::Simple(materialize_node(self)?))
            }
        }
    }
}

/// Lazy proxy over a resolved position.
#[derive(Debug)]
pub struct LazyPosition {
    underlying: Arc<dyn Position>,
    context: Arc<BoundResolveContext>,
    security: Memo<Option<Arc<Security>>>,
    trades: Memo<TradeList>,
}

impl LazyPosition {
    #[must_use]
    pub fn new(underlying: Arc<dyn Position>, context: Arc<BoundResolveContext>) -> Self {
        Self {
            underlying,
            context,
            security: Memo::new(),
            trades: Memo::new(),
        }
    }

    /// True once the security link has been looked up, whatever the outcome.
    #[must_use]
    pub fn is_security_resolved(&self) -> bool {
        self.security.is_resolved()
    }
}

impl Position for LazyPosition {
    fn unique_id(&self) -> ResolveResult<&UniqueId> {
        self.underlying.unique_id()
    }

    fn quantity(&self) -> ResolveResult<Decimal> {
        self.underlying.quantity()
    }

    fn security_link(&self) -> ResolveResult<&SecurityLink> {
        self.underlying.security_link()
    }

    fn security(&self) -> ResolveResult<Arc<Security>> {
        linked_security(&self.security, self.underlying.security_link()?, &self.context)
    }

    fn trades(&self) -> ResolveResult<TradeList> {
        self.trades
            .get_or_try_init(|| {
                self.underlying
                    .trades()
                    .map(|list| lazy_list(list, &self.context, wrap_trade))
            })
            .map(Arc::clone)
    }

    fn attributes(&self) -> ResolveResult<&BTreeMap<String, String>> {
        self.underlying.attributes()
    }

    fn snapshot(&self) -> ResolveResult<PositionSnapshot> {
        let _pass = WriteGuard::enter();
        let unique_id = self.underlying.unique_id()?;
        match self.context.resolver_handle() {
            Some(resolver) => {
                let requested = TargetSpecification::new(TargetKind::Position, unique_id.clone());
                let known = self.security.get().and_then(Option::as_ref);
                let fields = PositionFields::capture(&*self.underlying, &requested, known)?;
                Ok(PositionSnapshot::Handle(HandleSnapshot::new(
                    resolver,
                    *self.context.version_correction(),
                    fields,
                )))
            }
            None => {
                fall_back(TargetKind::Position, unique_id);
                Ok(PositionSnapshot::Simple(materialize_position(self)?))
            }
        }
    }
}

/// Lazy proxy over a resolved trade.
#[derive(Debug)]
pub struct LazyTrade {
    underlying: Arc<dyn Trade>,
    context: Arc<BoundResolveContext>,
    security: Memo<Option<Arc<Security>>>,
}

impl LazyTrade {
    #[must_use]
    pub fn new(underlying: Arc<dyn Trade>, context: Arc<BoundResolveContext>) -> Self {
        Self {
            underlying,
            context,
            security: Memo::new(),
        }
    }
}

impl Trade for LazyTrade {
    fn unique_id(&self) -> ResolveResult<&UniqueId> {
        self.underlying.unique_id()
    }

    fn parent_position_id(&self) -> ResolveResult<Option<&UniqueId>> {
        self.underlying.parent_position_id()
    }

    fn quantity(&self) -> ResolveResult<Decimal> {
        self.underlying.quantity()
    }

    fn security_link(&self) -> ResolveResult<&SecurityLink> {
        self.underlying.security_link()
    }

    fn security(&self) -> ResolveResult<Arc<Security>> {
        linked_security(&self.security, self.underlying.security_link()?, &self.context)
    }

    fn counterparty(&self) -> ResolveResult<&Counterparty> {
        self.underlying.counterparty()
    }

    fn trade_date(&self) -> ResolveResult<NaiveDate> {
        self.underlying.trade_date()
    }

    fn trade_time(&self) -> ResolveResult<Option<NaiveTime>> {
        self.underlying.trade_time()
    }

    fn premium(&self) -> ResolveResult<Option<&Premium>> {
        self.underlying.premium()
    }

    fn attributes(&self) -> ResolveResult<&BTreeMap<String, String>> {
        self.underlying.attributes()
    }

    fn snapshot(&self) -> ResolveResult<TradeSnapshot> {
        let _pass = WriteGuard::enter();
        let unique_id = self.underlying.unique_id()?;
        match self.context.resolver_handle() {
            Some(resolver) => {
                let requested = TargetSpecification::new(TargetKind::Trade, unique_id.clone());
                let known = self.security.get().and_then(Option::as_ref);
                let fields = TradeFields::capture(&*self.underlying, &requested, known)?;
                Ok(TradeSnapshot::Handle(HandleSnapshot::new(
                    resolver,
                    *self.context.version_correction(),
                    fields,
                )))
            }
            None => {
                fall_back(TargetKind::Trade, unique_id);
                Ok(TradeSnapshot::Simple(materialize_trade(self)?))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ResolveContext;
    use crate::domain::{SimplePortfolioNode, SimplePosition, SimpleTrade};
    use crate::id::{ExternalId, ExternalIdBundle};
    use crate::resolver::{CachingTargetResolver, ObjectTargetResolver, TargetResolver};
    use crate::storage::{InMemoryObjectStore, SecuritySource, StorageError};
    use crate::version::VersionCorrection;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Security source that counts lookups and never finds anything.
    #[derive(Default)]
    struct Empty {
        lookups: AtomicUsize,
    }

    impl SecuritySource for Empty {
        fn get_by_external_ids(
            &self,
            ids: &ExternalIdBundle,
            _: &VersionCorrection,
        ) -> Result<Arc<Security>, StorageError> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            Err(StorageError::NotFound(ids.to_string()))
        }

        fn get_by_object_id(
            &self,
            id: &crate::id::ObjectId,
            _: &VersionCorrection,
        ) -> Result<Arc<Security>, StorageError> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            Err(StorageError::NotFound(id.to_string()))
        }
    }

    fn node() -> SimplePortfolioNode {
        let link = SecurityLink::by_external_ids(ExternalIdBundle::of(ExternalId::new("TICKER", "X")));
        SimplePortfolioNode::new(UniqueId::of("Node", "root", "1"), "root")
            .with_child(SimplePortfolioNode::new(UniqueId::of("Node", "a", "1"), "a"))
            .with_position(
                SimplePosition::new(UniqueId::of("Pos", "1", "1"), Decimal::from(5), link.clone())
                    .with_trade(SimpleTrade::new(UniqueId::of("Trade", "1", "1"), Decimal::from(5))),
            )
            .with_position(SimplePosition::new(UniqueId::of("Pos", "2", "1"), Decimal::from(7), link))
    }

    fn caching() -> Arc<CachingTargetResolver> {
        let store: Arc<InMemoryObjectStore> = Arc::new(InMemoryObjectStore::new());
        Arc::new(CachingTargetResolver::new(Arc::new(ObjectTargetResolver::new(store))))
    }

    #[test]
    fn test_children_resolve_per_index_and_land_in_cache() {
        let caching = caching();
        let context = ResolveContext::new(Arc::new(Empty::default()), Some(caching.clone() as Arc<dyn TargetResolver>))
            .bind(VersionCorrection::latest());
        let lazy = LazyPortfolioNode::new(Arc::new(node()), Arc::clone(&context));

        let positions = lazy.positions().unwrap();
        assert_eq!(positions.len(), 2);
        assert_eq!(positions.resolved_count(), 0);

        let second = positions.get(1).unwrap();
        assert_eq!(second.quantity().unwrap(), Decimal::from(7));
        assert_eq!(positions.resolved_count(), 1);
        assert!(Arc::ptr_eq(&lazy.positions().unwrap(), &positions));

        let vc = VersionCorrection::latest();
        assert!(caching.cached(&UniqueId::of("Pos", "2", "1"), &vc).is_some());
        assert!(caching.cached(&UniqueId::of("Pos", "1", "1"), &vc).is_none());
        assert!(caching.cached(&UniqueId::of("Node", "a", "1"), &vc).is_none());
    }

    #[test]
    fn test_missing_security_is_looked_up_once_then_raises() {
        let source = Arc::new(Empty::default());
        let context = ResolveContext::new(source.clone(), None).bind(VersionCorrection::latest());
        let underlying = node().positions[0].clone();
        let lazy = LazyPosition::new(underlying, context);

        for _ in 0..3 {
            let err = lazy.security().unwrap_err();
            assert!(matches!(err, ResolveError::SecurityNotFound { .. }));
        }
        assert!(lazy.is_security_resolved());
        assert_eq!(source.lookups.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_snapshot_without_resolver_is_materialized() {
        let context = ResolveContext::new(Arc::new(Empty::default()), None).bind(VersionCorrection::latest());
        let original = node();
        let lazy = LazyPortfolioNode::new(Arc::new(original.clone()), context);

        match lazy.snapshot().unwrap() {
            NodeSnapshot::Simple(simple) => assert_eq!(simple, original),
            NodeSnapshot::Handle(_) => panic!("expected a materialized snapshot"),
        }
    }

    #[test]
    fn test_snapshot_with_resolver_carries_child_specs() {
        let caching = caching();
        let registry = Arc::new(crate::registry::ResolverRegistry::with_sweep_threshold(8));
        let context = ResolveContext::new(Arc::new(Empty::default()), Some(caching as Arc<dyn TargetResolver>))
            .with_registry(Arc::clone(&registry))
            .bind(VersionCorrection::latest());
        let lazy = LazyPortfolioNode::new(Arc::new(node()), context);

        let NodeSnapshot::Handle(snapshot) = lazy.snapshot().unwrap() else {
            panic!("expected a handle snapshot");
        };
        assert!(registry.resolver_for(snapshot.resolver).is_ok());
        assert_eq!(snapshot.fields.child_nodes.len(), 1);
        assert_eq!(snapshot.fields.positions[1].unique_id(), &UniqueId::of("Pos", "2", "1"));
        // Snapshotting reads the underlying lists, not the lazy ones.
        assert!(!lazy.positions.is_resolved());
    }
}
