//! Portfolio structure capability interfaces.
//!
//! Each entity kind has one trait. Plain values, lazy proxies over resolved
//! objects, and lazy proxies over specifications all implement the same
//! trait, so calling code never needs to know which it was handed.
//!
//! Accessors are fallible because a proxy may have to resolve itself (or a
//! slice of itself) to answer.

mod security;
mod simple;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime};
use rust_decimal::Decimal;

use crate::error::ResolveResult;
use crate::id::UniqueId;
use crate::lazy::LazyList;
use crate::snapshot::{NodeSnapshot, PortfolioSnapshot, PositionSnapshot, TradeSnapshot};

pub use security::{Counterparty, Security, SecurityLink};
pub use simple::{Premium, SimplePortfolio, SimplePortfolioNode, SimplePosition, SimpleTrade};

/// Lazily resolved child nodes of a portfolio node.
pub type NodeList = Arc<LazyList<dyn PortfolioNode>>;
/// Lazily resolved positions of a portfolio node.
pub type PositionList = Arc<LazyList<dyn Position>>;
/// Lazily resolved trades of a position.
pub type TradeList = Arc<LazyList<dyn Trade>>;

/// A named portfolio with a single root node.
pub trait Portfolio: Send + Sync + fmt::Debug {
    fn unique_id(&self) -> ResolveResult<&UniqueId>;
    fn name(&self) -> ResolveResult<&str>;
    fn attributes(&self) -> ResolveResult<&BTreeMap<String, String>>;
    fn root_node(&self) -> ResolveResult<Arc<dyn PortfolioNode>>;

    /// Produces the value that stands in for this portfolio when it leaves the process.
    fn snapshot(&self) -> ResolveResult<PortfolioSnapshot>;
}

/// A node in the portfolio tree.
pub trait PortfolioNode: Send + Sync + fmt::Debug {
    fn unique_id(&self) -> ResolveResult<&UniqueId>;
    fn parent_node_id(&self) -> ResolveResult<Option<&UniqueId>>;
    fn name(&self) -> ResolveResult<&str>;
    fn child_nodes(&self) -> ResolveResult<NodeList>;
    fn positions(&self) -> ResolveResult<PositionList>;
    fn snapshot(&self) -> ResolveResult<NodeSnapshot>;
}

/// A holding of some quantity of a security, optionally built from trades.
pub trait Position: Send + Sync + fmt::Debug {
    fn unique_id(&self) -> ResolveResult<&UniqueId>;
    fn quantity(&self) -> ResolveResult<Decimal>;
    fn security_link(&self) -> ResolveResult<&SecurityLink>;

    /// The linked security.
    ///
    /// # Errors
    ///
    /// `SecurityNotFound` when the link resolves to nothing and no security
    /// was ever attached to it.
    fn security(&self) -> ResolveResult<Arc<Security>>;
    fn trades(&self) -> ResolveResult<TradeList>;
    fn attributes(&self) -> ResolveResult<&BTreeMap<String, String>>;
    fn snapshot(&self) -> ResolveResult<PositionSnapshot>;
}

/// A single trade contributing to a position.
pub trait Trade: Send + Sync + fmt::Debug {
    fn unique_id(&self) -> ResolveResult<&UniqueId>;
    fn parent_position_id(&self) -> ResolveResult<Option<&UniqueId>>;
    fn quantity(&self) -> ResolveResult<Decimal>;
    fn security_link(&self) -> ResolveResult<&SecurityLink>;

    /// The linked security; see [`Position::security`].
    fn security(&self) -> ResolveResult<Arc<Security>>;
    fn counterparty(&self) -> ResolveResult<&Counterparty>;
    fn trade_date(&self) -> ResolveResult<NaiveDate>;
    fn trade_time(&self) -> ResolveResult<Option<NaiveTime>>;
    fn premium(&self) -> ResolveResult<Option<&Premium>>;
    fn attributes(&self) -> ResolveResult<&BTreeMap<String, String>>;
    fn snapshot(&self) -> ResolveResult<TradeSnapshot>;
}
