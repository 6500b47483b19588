//! Values that stand in for targets when they leave the process.
//!
//! Snapshotting is an explicit call made by whatever is about to ship a
//! target elsewhere. A proxy whose context can name its resolver produces a
//! *handle* snapshot: its own scalar fields, its own specification, and only
//! specifications for its children, tagged with the resolver handle and the
//! version-correction. A proxy with nothing addressable produces a *simple*
//! snapshot: the whole graph beneath it, fully materialized.
//!
//! Both forms are plain serde values; [`TargetSnapshot::encode`] and
//! [`TargetSnapshot::decode`] move them through JSON.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::{
    Counterparty, Portfolio, PortfolioNode, Position, Premium, Security, SecurityLink, SimplePortfolio,
    SimplePortfolioNode, SimplePosition, SimpleTrade, Trade,
};
use crate::error::{ResolveError, ResolveResult};
use crate::id::UniqueId;
use crate::marshal::WriteGuard;
use crate::proxy::{HandlePortfolio, HandlePortfolioNode, HandlePosition, HandleTrade};
use crate::registry::{ResolverHandle, ResolverRegistry};
use crate::target::{Target, TargetKind, TargetSpecification};
use crate::version::VersionCorrection;

/// Handle-bound form of one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandleSnapshot<F> {
    pub resolver: ResolverHandle,
    pub version_correction: VersionCorrection,
    #[serde(flatten)]
    pub fields: F,
}

impl<F> HandleSnapshot<F> {
    #[must_use]
    pub const fn new(resolver: ResolverHandle, version_correction: VersionCorrection, fields: F) -> Self {
        Self {
            resolver,
            version_correction,
            fields,
        }
    }
}

fn spec(kind: TargetKind, unique_id: &UniqueId) -> TargetSpecification {
    TargetSpecification::new(kind, unique_id.clone())
}

fn security_spec(link: &SecurityLink, resolved: Option<&Arc<Security>>) -> Option<TargetSpecification> {
    resolved
        .or(link.target.as_ref())
        .map(|security| spec(TargetKind::Security, &security.unique_id))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioFields {
    pub specification: TargetSpecification,
    pub name: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    pub root_node: TargetSpecification,
}

impl PortfolioFields {
    /// Reads the fields of a resolved portfolio, pinning `requested` to its id.
    pub fn capture(portfolio: &dyn Portfolio, requested: &TargetSpecification) -> ResolveResult<Self> {
        let root = portfolio.root_node()?;
        Ok(Self {
            specification: requested.pinned_to(portfolio.unique_id()?),
            name: portfolio.name()?.to_string(),
            attributes: portfolio.attributes()?.clone(),
            root_node: spec(TargetKind::PortfolioNode, root.unique_id()?),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeFields {
    pub specification: TargetSpecification,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_node_id: Option<UniqueId>,
    pub name: String,
    #[serde(default)]
    pub child_nodes: Vec<TargetSpecification>,
    #[serde(default)]
    pub positions: Vec<TargetSpecification>,
}

impl NodeFields {
    /// Reads the fields of a resolved node.
    ///
    /// Children are read only for their ids; pass a node whose lists are
    /// already resolved or this resolves every child.
    pub fn capture(node: &dyn PortfolioNode, requested: &TargetSpecification) -> ResolveResult<Self> {
        let mut child_nodes = Vec::new();
        for child in node.child_nodes()?.iter() {
            child_nodes.push(spec(TargetKind::PortfolioNode, child?.unique_id()?));
        }
        let mut positions = Vec::new();
        for position in node.positions()?.iter() {
            positions.push(spec(TargetKind::Position, position?.unique_id()?));
        }
        Ok(Self {
            specification: requested.pinned_to(node.unique_id()?),
            parent_node_id: node.parent_node_id()?.cloned(),
            name: node.name()?.to_string(),
            child_nodes,
            positions,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionFields {
    pub specification: TargetSpecification,
    pub quantity: Decimal,
    pub security_link: SecurityLink,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security: Option<TargetSpecification>,
    #[serde(default)]
    pub trades: Vec<TargetSpecification>,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl PositionFields {
    /// Reads the fields of a resolved position.
    ///
    /// The link travels without its attached security; the security's
    /// specification travels instead, taken from `resolved` or the link.
    pub fn capture(
        position: &dyn Position,
        requested: &TargetSpecification,
        resolved: Option<&Arc<Security>>,
    ) -> ResolveResult<Self> {
        let link = position.security_link()?;
        let mut trades = Vec::new();
        for trade in position.trades()?.iter() {
            trades.push(spec(TargetKind::Trade, trade?.unique_id()?));
        }
        Ok(Self {
            specification: requested.pinned_to(position.unique_id()?),
            quantity: position.quantity()?,
            security_link: link.detached(),
            security: security_spec(link, resolved),
            trades,
            attributes: position.attributes()?.clone(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeFields {
    pub specification: TargetSpecification,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_position_id: Option<UniqueId>,
    pub quantity: Decimal,
    pub security_link: SecurityLink,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security: Option<TargetSpecification>,
    pub counterparty: Counterparty,
    pub trade_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trade_time: Option<NaiveTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub premium: Option<Premium>,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl TradeFields {
    pub fn capture(
        trade: &dyn Trade,
        requested: &TargetSpecification,
        resolved: Option<&Arc<Security>>,
    ) -> ResolveResult<Self> {
        let link = trade.security_link()?;
        Ok(Self {
            specification: requested.pinned_to(trade.unique_id()?),
            parent_position_id: trade.parent_position_id()?.cloned(),
            quantity: trade.quantity()?,
            security_link: link.detached(),
            security: security_spec(link, resolved),
            counterparty: trade.counterparty()?.clone(),
            trade_date: trade.trade_date()?,
            trade_time: trade.trade_time()?,
            premium: trade.premium()?.cloned(),
            attributes: trade.attributes()?.clone(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortfolioSnapshot {
    Handle(HandleSnapshot<PortfolioFields>),
    Simple(SimplePortfolio),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeSnapshot {
    Handle(HandleSnapshot<NodeFields>),
    Simple(SimplePortfolioNode),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionSnapshot {
    Handle(HandleSnapshot<PositionFields>),
    Simple(SimplePosition),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeSnapshot {
    Handle(HandleSnapshot<TradeFields>),
    Simple(SimpleTrade),
}

/// The transmissible form of any [`Target`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum TargetSnapshot {
    Portfolio(PortfolioSnapshot),
    PortfolioNode(NodeSnapshot),
    Position(PositionSnapshot),
    Trade(TradeSnapshot),
    Security(Arc<Security>),
    Primitive(UniqueId),
}

impl TargetSnapshot {
    #[must_use]
    pub const fn kind(&self) -> TargetKind {
        match self {
            Self::Portfolio(_) => TargetKind::Portfolio,
            Self::PortfolioNode(_) => TargetKind::PortfolioNode,
            Self::Position(_) => TargetKind::Position,
            Self::Trade(_) => TargetKind::Trade,
            Self::Security(_) => TargetKind::Security,
            Self::Primitive(_) => TargetKind::Primitive,
        }
    }

    /// True if rehydrating this snapshot needs a registered resolver.
    #[must_use]
    pub const fn is_handle(&self) -> bool {
        matches!(
            self,
            Self::Portfolio(PortfolioSnapshot::Handle(_))
                | Self::PortfolioNode(NodeSnapshot::Handle(_))
                | Self::Position(PositionSnapshot::Handle(_))
                | Self::Trade(TradeSnapshot::Handle(_))
        )
    }

    /// Turns the snapshot back into a usable target.
    ///
    /// Handle snapshots become lazy-over-handle proxies bound to the resolver
    /// `registry` knows by that handle; simple snapshots are used as-is.
    ///
    /// # Errors
    ///
    /// `UnknownHandle` if `registry` cannot recover a referenced resolver.
    pub fn into_target(self, registry: &Arc<ResolverRegistry>) -> ResolveResult<Target> {
        Ok(match self {
            Self::Portfolio(PortfolioSnapshot::Handle(s)) => {
                Target::Portfolio(Arc::new(HandlePortfolio::from_snapshot(s, registry)?))
            }
            Self::Portfolio(PortfolioSnapshot::Simple(p)) => Target::Portfolio(Arc::new(p)),
            Self::PortfolioNode(NodeSnapshot::Handle(s)) => {
                Target::PortfolioNode(Arc::new(HandlePortfolioNode::from_snapshot(s, registry)?))
            }
            Self::PortfolioNode(NodeSnapshot::Simple(n)) => Target::PortfolioNode(Arc::new(n)),
            Self::Position(PositionSnapshot::Handle(s)) => {
                Target::Position(Arc::new(HandlePosition::from_snapshot(s, registry)?))
            }
            Self::Position(PositionSnapshot::Simple(p)) => Target::Position(Arc::new(p)),
            Self::Trade(TradeSnapshot::Handle(s)) => Target::Trade(Arc::new(HandleTrade::from_snapshot(s, registry)?)),
            Self::Trade(TradeSnapshot::Simple(t)) => Target::Trade(Arc::new(t)),
            Self::Security(s) => Target::Security(s),
            Self::Primitive(id) => Target::Primitive(id),
        })
    }

    /// Encodes the snapshot as JSON bytes.
    pub fn encode(&self) -> ResolveResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| ResolveError::Encoding { message: e.to_string() })
    }

    pub fn decode(bytes: &[u8]) -> ResolveResult<Self> {
        serde_json::from_slice(bytes).map_err(|e| ResolveError::Encoding { message: e.to_string() })
    }
}

impl Target {
    /// Produces the value that stands in for this target outside the process.
    pub fn snapshot(&self) -> ResolveResult<TargetSnapshot> {
        Ok(match self {
            Self::Portfolio(p) => TargetSnapshot::Portfolio(p.snapshot()?),
            Self::PortfolioNode(n) => TargetSnapshot::PortfolioNode(n.snapshot()?),
            Self::Position(p) => TargetSnapshot::Position(p.snapshot()?),
            Self::Trade(t) => TargetSnapshot::Trade(t.snapshot()?),
            Self::Security(s) => TargetSnapshot::Security(Arc::clone(s)),
            Self::Primitive(id) => TargetSnapshot::Primitive(id.clone()),
        })
    }
}

/// Attaches `security` to a copy of `link`; absence leaves the link unchanged.
fn attach(link: &SecurityLink, security: ResolveResult<Arc<Security>>) -> ResolveResult<SecurityLink> {
    match security {
        Ok(security) => Ok(link.with_target(security)),
        Err(err) if err.is_not_found() => Ok(link.clone()),
        Err(err) => Err(err),
    }
}

/// Walks a whole portfolio into plain values.
///
/// The walk is a marshalling pass: entities the lazy proxies resolve on the
/// way are pushed into their caches only once the outermost pass ends.
pub fn materialize_portfolio(portfolio: &dyn Portfolio) -> ResolveResult<SimplePortfolio> {
    let _pass = WriteGuard::enter();
    let root = materialize_node(&*portfolio.root_node()?)?;
    let mut simple = SimplePortfolio::new(portfolio.unique_id()?.clone(), portfolio.name()?, root);
    simple.attributes = portfolio.attributes()?.clone();
    Ok(simple)
}

pub fn materialize_node(node: &dyn PortfolioNode) -> ResolveResult<SimplePortfolioNode> {
    let _pass = WriteGuard::enter();
    let mut simple = SimplePortfolioNode::new(node.unique_id()?.clone(), node.name()?);
    simple.parent_node_id = node.parent_node_id()?.cloned();
    for child in node.child_nodes()?.iter() {
        simple.child_nodes.push(Arc::new(materialize_node(&*child?)?));
    }
    for position in node.positions()?.iter() {
        simple.positions.push(Arc::new(materialize_position(&*position?)?));
    }
    Ok(simple)
}

pub fn materialize_position(position: &dyn Position) -> ResolveResult<SimplePosition> {
    let _pass = WriteGuard::enter();
    let link = attach(position.security_link()?, position.security())?;
    let mut simple = SimplePosition::new(position.unique_id()?.clone(), position.quantity()?, link);
    for trade in position.trades()?.iter() {
        simple.trades.push(Arc::new(materialize_trade(&*trade?)?));
    }
    simple.attributes = position.attributes()?.clone();
    Ok(simple)
}

pub fn materialize_trade(trade: &dyn Trade) -> ResolveResult<SimpleTrade> {
    let _pass = WriteGuard::enter();
    let mut simple = SimpleTrade::new(trade.unique_id()?.clone(), trade.quantity()?)
        .with_security_link(attach(trade.security_link()?, trade.security())?)
        .with_counterparty(trade.counterparty()?.clone())
        .with_trade_date(trade.trade_date()?, trade.trade_time()?);
    simple.parent_position_id = trade.parent_position_id()?.cloned();
    simple.premium = trade.premium()?.cloned();
    simple.attributes = trade.attributes()?.clone();
    Ok(simple)
}
