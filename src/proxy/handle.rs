use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime};
use rust_decimal::Decimal;

use crate::domain::{
    Counterparty, NodeList, Portfolio, PortfolioNode, Position, PositionList, Premium, Security, SecurityLink,
    Trade, TradeList,
};
use crate::error::{ResolveError, ResolveResult};
use crate::id::UniqueId;
use crate::lazy::{LazyList, Memo, SlotSource};
use crate::marshal::WriteGuard;
use crate::registry::{ResolverBinding, ResolverRegistry};
use crate::snapshot::{
    HandleSnapshot, NodeFields, NodeSnapshot, PortfolioFields, PortfolioSnapshot, PositionFields, PositionSnapshot,
    TradeFields, TradeSnapshot,
};
use crate::target::{Target, TargetKind, TargetSpecification};

type Wrap<T> = fn(Target, &TargetSpecification, &ResolverBinding) -> ResolveResult<Arc<T>>;

/// Slots named by specification, resolved through the binding on first read.
struct SpecSlots<T: ?Sized> {
    specs: Vec<TargetSpecification>,
    binding: ResolverBinding,
    wrap: Wrap<T>,
}

impl<T: ?Sized + Send + Sync> SlotSource<T> for SpecSlots<T> {
    fn resolve_slot(&self, index: usize) -> ResolveResult<Arc<T>> {
        let spec = self.specs.get(index).ok_or(ResolveError::IndexOutOfRange {
            index,
            len: self.specs.len(),
        })?;
        let target = self.binding.resolve(spec)?;
        (self.wrap)(target, spec, &self.binding)
    }
}

fn spec_list<T: ?Sized + Send + Sync + 'static>(
    specs: &[TargetSpecification],
    binding: &ResolverBinding,
    wrap: Wrap<T>,
) -> Arc<LazyList<T>> {
    Arc::new(LazyList::new(
        specs.len(),
        SpecSlots {
            specs: specs.to_vec(),
            binding: binding.clone(),
            wrap,
        },
    ))
}

fn wrap_node(
    target: Target,
    spec: &TargetSpecification,
    binding: &ResolverBinding,
) -> ResolveResult<Arc<dyn PortfolioNode>> {
    let node = target.into_portfolio_node()?;
    Ok(Arc::new(HandlePortfolioNode::from_node(&*node, spec, binding.clone())?))
}

fn wrap_position(target: Target, spec: &TargetSpecification, binding: &ResolverBinding) -> ResolveResult<Arc<dyn Position>> {
    let position = target.into_position()?;
    Ok(Arc::new(HandlePosition::from_position(&*position, spec, binding.clone())?))
}

fn wrap_trade(target: Target, spec: &TargetSpecification, binding: &ResolverBinding) -> ResolveResult<Arc<dyn Trade>> {
    let trade = target.into_trade()?;
    Ok(Arc::new(HandleTrade::from_trade(&*trade, spec, binding.clone())?))
}

/// Finds the specification a security link points at.
fn link_spec(binding: &ResolverBinding, link: &SecurityLink) -> ResolveResult<Option<TargetSpecification>> {
    if let Some(object_id) = &link.object_id {
        return Ok(Some(TargetSpecification::new(TargetKind::Security, object_id.at_latest())));
    }
    if link.external_ids.is_empty() {
        return Ok(None);
    }
    let found = binding
        .resolver()
        .resolve_external_ids(&link.external_ids, binding.version_correction())?;
    Ok(found.map(|unique_id| TargetSpecification::new(TargetKind::Security, unique_id)))
}

fn handle_security(
    binding: &ResolverBinding,
    known: Option<&TargetSpecification>,
    link: &SecurityLink,
) -> ResolveResult<Arc<Security>> {
    if let Some(target) = &link.target {
        return Ok(Arc::clone(target));
    }
    let not_found = || ResolveError::SecurityNotFound {
        link: link.to_string(),
    };
    let spec = match known {
        Some(spec) => spec.clone(),
        None => link_spec(binding, link)?.ok_or_else(not_found)?,
    };
    binding.resolve_optional(&spec)?.ok_or_else(not_found)?.into_security()
}

/// Portfolio known only by specification.
#[derive(Debug)]
pub struct HandlePortfolio {
    binding: ResolverBinding,
    requested: TargetSpecification,
    fields: Memo<PortfolioFields>,
    root_node: Memo<Arc<dyn PortfolioNode>>,
}

impl HandlePortfolio {
    /// A proxy that has not touched the resolver yet.
    #[must_use]
    pub fn deferred(spec: TargetSpecification, binding: ResolverBinding) -> Self {
        Self {
            binding,
            requested: spec,
            fields: Memo::new(),
            root_node: Memo::new(),
        }
    }

    /// Rehydrates a handle snapshot.
    ///
    /// # Errors
    ///
    /// `UnknownHandle` if `registry` does not know the snapshot's resolver.
    pub fn from_snapshot(
        snapshot: HandleSnapshot<PortfolioFields>,
        registry: &Arc<ResolverRegistry>,
    ) -> ResolveResult<Self> {
        let binding = ResolverBinding::from_handle(snapshot.resolver, snapshot.version_correction, registry)?;
        Ok(Self {
            binding,
            requested: snapshot.fields.specification.clone(),
            fields: Memo::ready(snapshot.fields),
            root_node: Memo::new(),
        })
    }

    /// The pinned specification once resolved, else the requested one.
    #[must_use]
    pub fn specification(&self) -> &TargetSpecification {
        self.fields.get().map_or(&self.requested, |f| &f.specification)
    }

    fn fields(&self) -> ResolveResult<&PortfolioFields> {
        self.fields.get_or_try_init(|| {
            let portfolio = self.binding.resolve(&self.requested)?.into_portfolio()?;
            PortfolioFields::capture(&*portfolio, &self.requested)
        })
    }
}

impl Portfolio for HandlePortfolio {
    fn unique_id(&self) -> ResolveResult<&UniqueId> {
        Ok(self.fields()?.specification.unique_id())
    }

    fn name(&self) -> ResolveResult<&str> {
        Ok(&self.fields()?.name)
    }

    fn attributes(&self) -> ResolveResult<&BTreeMap<String, String>> {
        Ok(&self.fields()?.attributes)
    }

    fn root_node(&self) -> ResolveResult<Arc<dyn PortfolioNode>> {
        self.root_node
            .get_or_try_init(|| {
                let spec = &self.fields()?.root_node;
                wrap_node(self.binding.resolve(spec)?, spec, &self.binding)
            })
            .map(Arc::clone)
    }

    fn snapshot(&self) -> ResolveResult<PortfolioSnapshot> {
        let _pass = WriteGuard::enter();
        let fields = self.fields()?.clone();
        Ok(PortfolioSnapshot::Handle(HandleSnapshot::new(
            self.binding.handle(),
            *self.binding.version_correction(),
            fields,
        )))
    }
}

/// Portfolio node known only by specification.
#[derive(Debug)]
pub struct HandlePortfolioNode {
    binding: ResolverBinding,
    requested: TargetSpecification,
    fields: Memo<NodeFields>,
    child_nodes: Memo<NodeList>,
    positions: Memo<PositionList>,
}

impl HandlePortfolioNode {
    #[must_use]
    pub fn deferred(spec: TargetSpecification, binding: ResolverBinding) -> Self {
        Self::with_fields(spec, binding, Memo::new())
    }

    /// A proxy over a node that was just resolved for `spec`.
    pub fn from_node(
        node: &dyn PortfolioNode,
        spec: &TargetSpecification,
        binding: ResolverBinding,
    ) -> ResolveResult<Self> {
        let fields = NodeFields::capture(node, spec)?;
        Ok(Self::with_fields(spec.clone(), binding, Memo::ready(fields)))
    }

    pub fn from_snapshot(snapshot: HandleSnapshot<NodeFields>, registry: &Arc<ResolverRegistry>) -> ResolveResult<Self> {
        let binding = ResolverBinding::from_handle(snapshot.resolver, snapshot.version_correction, registry)?;
        let spec = snapshot.fields.specification.clone();
        Ok(Self::with_fields(spec, binding, Memo::ready(snapshot.fields)))
    }

    fn with_fields(requested: TargetSpecification, binding: ResolverBinding, fields: Memo<NodeFields>) -> Self {
        Self {
            binding,
            requested,
            fields,
            child_nodes: Memo::new(),
            positions: Memo::new(),
        }
    }

    #[must_use]
    pub fn specification(&self) -> &TargetSpecification {
        self.fields.get().map_or(&self.requested, |f| &f.specification)
    }

    /// True once the node itself has been resolved.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.fields.is_resolved()
    }

    fn fields(&self) -> ResolveResult<&NodeFields> {
        self.fields.get_or_try_init(|| {
            let node = self.binding.resolve(&self.requested)?.into_portfolio_node()?;
            NodeFields::capture(&*node, &self.requested)
        })
    }
}

impl PortfolioNode for HandlePortfolioNode {
    fn unique_id(&self) -> ResolveResult<&UniqueId> {
        Ok(self.fields()?.specification.unique_id())
    }

    fn parent_node_id(&self) -> ResolveResult<Option<&UniqueId>> {
        Ok(self.fields()?.parent_node_id.as_ref())
    }

    fn name(&self) -> ResolveResult<&str> {
        Ok(&self.fields()?.name)
    }

    fn child_nodes(&self) -> ResolveResult<NodeList> {
        self.child_nodes
            .get_or_try_init(|| -> ResolveResult<NodeList> {
                Ok(spec_list(&self.fields()?.child_nodes, &self.binding, wrap_node))
            })
            .map(Arc::clone)
    }

    fn positions(&self) -> ResolveResult<PositionList> {
        self.positions
            .get_or_try_init(|| -> ResolveResult<PositionList> {
                Ok(spec_list(&self.fields()?.positions, &self.binding, wrap_position))
            })
            .map(Arc::clone)
    }

    fn snapshot(&self) -> ResolveResult<NodeSnapshot> {
        let _pass = WriteGuard::enter();
        let fields = self.fields()?.clone();
        Ok(NodeSnapshot::Handle(HandleSnapshot::new(
            self.binding.handle(),
            *self.binding.version_correction(),
            fields,
        )))
    }
}

/// Position known only by specification.
#[derive(Debug)]
pub struct HandlePosition {
    binding: ResolverBinding,
    requested: TargetSpecification,
    fields: Memo<PositionFields>,
    security: Memo<Arc<Security>>,
    trades: Memo<TradeList>,
}

impl HandlePosition {
    #[must_use]
    pub fn deferred(spec: TargetSpecification, binding: ResolverBinding) -> Self {
        Self::with_fields(spec, binding, Memo::new())
    }

    pub fn from_position(
        position: &dyn Position,
        spec: &TargetSpecification,
        binding: ResolverBinding,
    ) -> ResolveResult<Self> {
        let fields = PositionFields::capture(position, spec, None)?;
        Ok(Self::with_fields(spec.clone(), binding, Memo::ready(fields)))
    }

    pub fn from_snapshot(
        snapshot: HandleSnapshot<PositionFields>,
        registry: &Arc<ResolverRegistry>,
    ) -> ResolveResult<Self> {
        let binding = ResolverBinding::from_handle(snapshot.resolver, snapshot.version_correction, registry)?;
        let spec = snapshot.fields.specification.clone();
        Ok(Self::with_fields(spec, binding, Memo::ready(snapshot.fields)))
    }

    fn with_fields(requested: TargetSpecification, binding: ResolverBinding, fields: Memo<PositionFields>) -> Self {
        Self {
            binding,
            requested,
            fields,
            security: Memo::new(),
            trades: Memo::new(),
        }
    }

    #[must_use]
    pub fn specification(&self) -> &TargetSpecification {
        self.fields.get().map_or(&self.requested, |f| &f.specification)
    }

    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.fields.is_resolved()
    }

    fn fields(&self) -> ResolveResult<&PositionFields> {
        self.fields.get_or_try_init(|| {
            let position = self.binding.resolve(&self.requested)?.into_position()?;
            PositionFields::capture(&*position, &self.requested, None)
        })
    }
}

impl Position for HandlePosition {
    fn unique_id(&self) -> ResolveResult<&UniqueId> {
        Ok(self.fields()?.specification.unique_id())
    }

    fn quantity(&self) -> ResolveResult<Decimal> {
        Ok(self.fields()?.quantity)
    }

    fn security_link(&self) -> ResolveResult<&SecurityLink> {
        Ok(&self.fields()?.security_link)
    }

    fn security(&self) -> ResolveResult<Arc<Security>> {
        self.security
            .get_or_try_init(|| {
                let fields = self.fields()?;
                handle_security(&self.binding, fields.security.as_ref(), &fields.security_link)
            })
            .map(Arc::clone)
    }

    fn trades(&self) -> ResolveResult<TradeList> {
        self.trades
            .get_or_try_init(|| -> ResolveResult<TradeList> {
                Ok(spec_list(&self.fields()?.trades, &self.binding, wrap_trade))
            })
            .map(Arc::clone)
    }

    fn attributes(&self) -> ResolveResult<&BTreeMap<String, String>> {
        Ok(&self.fields()?.attributes)
    }

    fn snapshot(&self) -> ResolveResult<PositionSnapshot> {
        let _pass = WriteGuard::enter();
        let mut fields = self.fields()?.clone();
        if let Some(security) = self.security.get() {
            fields.security = Some(TargetSpecification::new(TargetKind::Security, security.unique_id.clone()));
        }
        Ok(PositionSnapshot::Handle(HandleSnapshot::new(
            self.binding.handle(),
            *self.binding.version_correction(),
            fields,
        )))
    }
}

/// Trade known only by specification.
#[derive(Debug)]
pub struct HandleTrade {
    binding: ResolverBinding,
    requested: TargetSpecification,
    fields: Memo<TradeFields>,
    security: Memo<Arc<Security>>,
}

impl HandleTrade {
    #[must_use]
    pub fn deferred(spec: TargetSpecification, binding: ResolverBinding) -> Self {
        Self::with_fields(spec, binding, Memo::new())
    }

    pub fn from_trade(trade: &dyn Trade, spec: &TargetSpecification, binding: ResolverBinding) -> ResolveResult<Self> {
        let fields = TradeFields::capture(trade, spec, None)?;
        Ok(Self::with_fields(spec.clone(), binding, Memo::ready(fields)))
    }

    pub fn from_snapshot(snapshot: HandleSnapshot<TradeFields>, registry: &Arc<ResolverRegistry>) -> ResolveResult<Self> {
        let binding = ResolverBinding::from_handle(snapshot.resolver, snapshot.version_correction, registry)?;
        let spec = snapshot.fields.specification.clone();
        Ok(Self::with_fields(spec, binding, Memo::ready(snapshot.fields)))
    }

    fn with_fields(requested: TargetSpecification, binding: ResolverBinding, fields: Memo<TradeFields>) -> Self {
        Self {
            binding,
            requested,
            fields,
            security: Memo::new(),
        }
    }

    #[must_use]
    pub fn specification(&self) -> &TargetSpecification {
        self.fields.get().map_or(&self.requested, |f| &f.specification)
    }

    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.fields.is_resolved()
    }

    fn fields(&self) -> ResolveResult<&TradeFields> {
        self.fields.get_or_try_init(|| {
            let trade = self.binding.resolve(&self.requested)?.into_trade()?;
            TradeFields::capture(&*trade, &self.requested, None)
        })
    }
}

impl Trade for HandleTrade {
    fn unique_id(&self) -> ResolveResult<&UniqueId> {
        Ok(self.fields()?.specification.unique_id())
    }

    fn parent_position_id(&self) -> ResolveResult<Option<&UniqueId>> {
        Ok(self.fields()?.parent_position_id.as_ref())
    }

    fn quantity(&self) -> ResolveResult<Decimal> {
        Ok(self.fields()?.quantity)
    }

    fn security_link(&self) -> ResolveResult<&SecurityLink> {
        Ok(&self.fields()?.security_link)
    }

    fn security(&self) -> ResolveResult<Arc<Security>> {
        self.security
            .get_or_try_init(|| {
                let fields = self.fields()?;
                handle_security(&self.binding, fields.security.as_ref(), &fields.security_link)
            })
            .map(Arc::clone)
    }

    fn counterparty(&self) -> ResolveResult<&Counterparty> {
        Ok(&self.fields()?.counterparty)
    }

    fn trade_date(&self) -> ResolveResult<NaiveDate> {
        Ok(self.fields()?.trade_date)
    }

    fn trade_time(&self) -> ResolveResult<Option<NaiveTime>> {
        Ok(self.fields()?.trade_time)
    }

    fn premium(&self) -> ResolveResult<Option<&Premium>> {
        Ok(self.fields()?.premium.as_ref())
    }

    fn attributes(&self) -> ResolveResult<&BTreeMap<String, String>> {
        Ok(&self.fields()?.attributes)
    }

    fn snapshot(&self) -> ResolveResult<TradeSnapshot> {
        let _pass = WriteGuard::enter();
        let mut fields = self.fields()?.clone();
        if let Some(security) = self.security.get() {
            fields.security = Some(TargetSpecification::new(TargetKind::Security, security.unique_id.clone()));
        }
        Ok(TradeSnapshot::Handle(HandleSnapshot::new(
            self.binding.handle(),
            *self.binding.version_correction(),
            fields,
        )))
    }
}
