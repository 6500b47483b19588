//! Plain, fully materialized entity values.
//!
//! These are what the store hands out and what a snapshot falls back to when
//! no remote side could ever re-resolve a handle. They carry no laziness.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{
    Counterparty, NodeList, Portfolio, PortfolioNode, Position, PositionList, Security, SecurityLink,
    Trade, TradeList,
};
use crate::error::{ResolveError, ResolveResult};
use crate::id::UniqueId;
use crate::lazy::LazyList;
use crate::snapshot::{NodeSnapshot, PortfolioSnapshot, PositionSnapshot, TradeSnapshot};

fn attached_security(link: &SecurityLink) -> ResolveResult<Arc<Security>> {
    link.target.clone().ok_or_else(|| ResolveError::SecurityNotFound {
        link: link.to_string(),
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimplePortfolio {
    pub unique_id: UniqueId,
    pub name: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    pub root_node: Arc<SimplePortfolioNode>,
}

impl SimplePortfolio {
    #[must_use]
    pub fn new(unique_id: UniqueId, name: impl Into<String>, root_node: SimplePortfolioNode) -> Self {
        Self {
            unique_id,
            name: name.into(),
            attributes: BTreeMap::new(),
            root_node: Arc::new(root_node),
        }
    }
}

impl Portfolio for SimplePortfolio {
    fn unique_id(&self) -> ResolveResult<&UniqueId> {
        Ok(&self.unique_id)
    }

    fn name(&self) -> ResolveResult<&str> {
        Ok(&self.name)
    }

    fn attributes(&self) -> ResolveResult<&BTreeMap<String, String>> {
        Ok(&self.attributes)
    }

    fn root_node(&self) -> ResolveResult<Arc<dyn PortfolioNode>> {
        Ok(Arc::clone(&self.root_node) as Arc<dyn PortfolioNode>)
    }

    fn snapshot(&self) -> ResolveResult<PortfolioSnapshot> {
        Ok(PortfolioSnapshot::Simple(self.clone()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimplePortfolioNode {
    pub unique_id: UniqueId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_node_id: Option<UniqueId>,
    pub name: String,
    #[serde(default)]
    pub child_nodes: Vec<Arc<SimplePortfolioNode>>,
    #[serde(default)]
    pub positions: Vec<Arc<SimplePosition>>,
}

impl SimplePortfolioNode {
    #[must_use]
    pub fn new(unique_id: UniqueId, name: impl Into<String>) -> Self {
        Self {
            unique_id,
            parent_node_id: None,
            name: name.into(),
            child_nodes: Vec::new(),
            positions: Vec::new(),
        }
    }

    /// Appends `child`, pointing its parent id at this node.
    #[must_use]
    pub fn with_child(mut self, mut child: Self) -> Self {
        child.parent_node_id = Some(self.unique_id.clone());
        self.child_nodes.push(Arc::new(child));
        self
    }

    #[must_use]
    pub fn with_position(mut self, position: SimplePosition) -> Self {
        self.positions.push(Arc::new(position));
        self
    }
}

impl PortfolioNode for SimplePortfolioNode {
    fn unique_id(&self) -> ResolveResult<&UniqueId> {
        Ok(&self.unique_id)
    }

    fn parent_node_id(&self) -> ResolveResult<Option<&UniqueId>> {
        Ok(self.parent_node_id.as_ref())
    }

    fn name(&self) -> ResolveResult<&str> {
        Ok(&self.name)
    }

    fn child_nodes(&self) -> ResolveResult<NodeList> {
        let items = self
            .child_nodes
            .iter()
            .map(|child| Arc::clone(child) as Arc<dyn PortfolioNode>)
            .collect();
        Ok(Arc::new(LazyList::resolved(items)))
    }

    fn positions(&self) -> ResolveResult<PositionList> {
        let items = self
            .positions
            .iter()
            .map(|position| Arc::clone(position) as Arc<dyn Position>)
            .collect();
        Ok(Arc::new(LazyList::resolved(items)))
    }

    fn snapshot(&self) -> ResolveResult<NodeSnapshot> {
        Ok(NodeSnapshot::Simple(self.clone()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimplePosition {
    pub unique_id: UniqueId,
    pub quantity: Decimal,
    pub security_link: SecurityLink,
    #[serde(default)]
    pub trades: Vec<Arc<SimpleTrade>>,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl SimplePosition {
    #[must_use]
    pub fn new(unique_id: UniqueId, quantity: Decimal, security_link: SecurityLink) -> Self {
        Self {
            unique_id,
            quantity,
            security_link,
            trades: Vec::new(),
            attributes: BTreeMap::new(),
        }
    }

    /// Appends `trade`, pointing its parent position id at this position.
    #[must_use]
    pub fn with_trade(mut self, mut trade: SimpleTrade) -> Self {
        trade.parent_position_id = Some(self.unique_id.clone());
        self.trades.push(Arc::new(trade));
        self
    }

    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

impl Position for SimplePosition {
    fn unique_id(&self) -> ResolveResult<&UniqueId> {
        Ok(&self.unique_id)
    }

    fn quantity(&self) -> ResolveResult<Decimal> {
        Ok(self.quantity)
    }

    fn security_link(&self) -> ResolveResult<&SecurityLink> {
        Ok(&self.security_link)
    }

    fn security(&self) -> ResolveResult<Arc<Security>> {
        attached_security(&self.security_link)
    }

    fn trades(&self) -> ResolveResult<TradeList> {
        let items = self
            .trades
            .iter()
            .map(|trade| Arc::clone(trade) as Arc<dyn Trade>)
            .collect();
        Ok(Arc::new(LazyList::resolved(items)))
    }

    fn attributes(&self) -> ResolveResult<&BTreeMap<String, String>> {
        Ok(&self.attributes)
    }

    fn snapshot(&self) -> ResolveResult<PositionSnapshot> {
        Ok(PositionSnapshot::Simple(self.clone()))
    }
}

/// Premium paid or received on a trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Premium {
    pub amount: Decimal,
    pub currency: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<NaiveTime>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimpleTrade {
    pub unique_id: UniqueId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_position_id: Option<UniqueId>,
    pub quantity: Decimal,
    #[serde(default)]
    pub security_link: SecurityLink,
    #[serde(default)]
    pub counterparty: Counterparty,
    pub trade_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trade_time: Option<NaiveTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub premium: Option<Premium>,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl SimpleTrade {
    /// Creates a trade dated today with the default counterparty and no security.
    #[must_use]
    pub fn new(unique_id: UniqueId, quantity: Decimal) -> Self {
        Self {
            unique_id,
            parent_position_id: None,
            quantity,
            security_link: SecurityLink::default(),
            counterparty: Counterparty::default(),
            trade_date: Utc::now().date_naive(),
            trade_time: None,
            premium: None,
            attributes: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_security_link(mut self, link: SecurityLink) -> Self {
        self.security_link = link;
        self
    }

    #[must_use]
    pub fn with_counterparty(mut self, counterparty: Counterparty) -> Self {
        self.counterparty = counterparty;
        self
    }

    #[must_use]
    pub fn with_trade_date(mut self, date: NaiveDate, time: Option<NaiveTime>) -> Self {
        self.trade_date = date;
        self.trade_time = time;
        self
    }

    #[must_use]
    pub fn with_premium(mut self, premium: Premium) -> Self {
        self.premium = Some(premium);
        self
    }
}

impl Trade for SimpleTrade {
    fn unique_id(&self) -> ResolveResult<&UniqueId> {
        Ok(&self.unique_id)
    }

    fn parent_position_id(&self) -> ResolveResult<Option<&UniqueId>> {
        Ok(self.parent_position_id.as_ref())
    }

    fn quantity(&self) -> ResolveResult<Decimal> {
        Ok(self.quantity)
    }

    fn security_link(&self) -> ResolveResult<&SecurityLink> {
        Ok(&self.security_link)
    }

    fn security(&self) -> ResolveResult<Arc<Security>> {
        attached_security(&self.security_link)
    }

    fn counterparty(&self) -> ResolveResult<&Counterparty> {
        Ok(&self.counterparty)
    }

    fn trade_date(&self) -> ResolveResult<NaiveDate> {
        Ok(self.trade_date)
    }

    fn trade_time(&self) -> ResolveResult<Option<NaiveTime>> {
        Ok(self.trade_time)
    }

    fn premium(&self) -> ResolveResult<Option<&Premium>> {
        Ok(self.premium.as_ref())
    }

    fn attributes(&self) -> ResolveResult<&BTreeMap<String, String>> {
        Ok(&self.attributes)
    }

    fn snapshot(&self) -> ResolveResult<TradeSnapshot> {
        Ok(TradeSnapshot::Simple(self.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::{ExternalId, ExternalIdBundle};

    fn position() -> SimplePosition {
        SimplePosition::new(
            UniqueId::of("Pos", "1", "1"),
            Decimal::from(100),
            SecurityLink::by_external_ids(ExternalIdBundle::of(ExternalId::new("TICKER", "AAPL"))),
        )
        .with_trade(SimpleTrade::new(UniqueId::of("Trade", "1", "1"), Decimal::from(60)))
        .with_trade(SimpleTrade::new(UniqueId::of("Trade", "2", "1"), Decimal::from(40)))
    }

    #[test]
    fn test_builders_set_back_pointers() {
        let root = SimplePortfolioNode::new(UniqueId::of("Node", "root", "1"), "root")
            .with_child(SimplePortfolioNode::new(UniqueId::of("Node", "a", "1"), "a"))
            .with_position(position());

        assert_eq!(root.child_nodes[0].parent_node_id.as_ref(), Some(&root.unique_id));
        let pos = &root.positions[0];
        assert!(pos
            .trades
            .iter()
            .all(|t| t.parent_position_id.as_ref() == Some(&pos.unique_id)));
    }

    #[test]
    fn test_simple_lists_are_fully_resolved() {
        let pos = position();
        let trades = pos.trades().unwrap();
        assert_eq!(trades.len(), 2);
        assert_eq!(trades.resolved_count(), 2);
        assert_eq!(trades.get(1).unwrap().quantity().unwrap(), Decimal::from(40));
    }

    #[test]
    fn test_unattached_security_is_an_error() {
        let err = position().security().unwrap_err();
        assert!(matches!(err, ResolveError::SecurityNotFound { .. }));
        assert!(err.to_string().contains("TICKER~AAPL"));
    }

    #[test]
    fn test_simple_snapshot_is_itself() {
        let pos = position();
        match pos.snapshot().unwrap() {
            PositionSnapshot::Simple(copy) => assert_eq!(copy, pos),
            PositionSnapshot::Handle(_) => panic!("expected simple snapshot"),
        }
    }
}
