//! Computation targets and the specifications that denote them.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::domain::{Portfolio, PortfolioNode, Position, Security, Trade};
use crate::error::{ResolveError, ResolveResult};
use crate::id::UniqueId;

/// The kind of entity a specification denotes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    Portfolio,
    PortfolioNode,
    Position,
    Trade,
    Security,
    /// An opaque identifier that resolves to itself.
    Primitive,
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Portfolio => "portfolio",
            Self::PortfolioNode => "portfolio node",
            Self::Position => "position",
            Self::Trade => "trade",
            Self::Security => "security",
            Self::Primitive => "primitive",
        };
        f.write_str(name)
    }
}

/// A cheap, serializable handle denoting a target without resolving it.
///
/// # Examples
///
/// ```
/// use lazytarget::{TargetKind, TargetSpecification, UniqueId};
///
/// let spec = TargetSpecification::new(TargetKind::Position, UniqueId::latest("Pos", "1"));
/// let pinned = spec.pinned_to(&UniqueId::of("Pos", "1", "4"));
/// assert_eq!(pinned.unique_id().version(), Some("4"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetSpecification {
    kind: TargetKind,
    unique_id: UniqueId,
}

impl TargetSpecification {
    #[must_use]
    pub const fn new(kind: TargetKind, unique_id: UniqueId) -> Self {
        Self { kind, unique_id }
    }

    #[must_use]
    pub const fn kind(&self) -> TargetKind {
        self.kind
    }

    #[must_use]
    pub const fn unique_id(&self) -> &UniqueId {
        &self.unique_id
    }

    /// Returns the specification upgraded to the exact id a resolution produced.
    ///
    /// Versioned specifications are returned unchanged; the upgrade only ever
    /// replaces "latest" with a concrete version of the same object.
    #[must_use]
    pub fn pinned_to(&self, resolved: &UniqueId) -> Self {
        if self.unique_id.is_versioned() || !self.unique_id.same_object(resolved) {
            return self.clone();
        }
        Self::new(self.kind, resolved.clone())
    }
}

impl fmt::Display for TargetSpecification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.kind, self.unique_id)
    }
}

/// A resolved computation target.
///
/// Portfolio structure variants hold capability trait objects, so a target
/// may be a plain value, a lazy proxy over a resolved object, or a lazy proxy
/// over a specification. Callers cannot tell the difference.
#[derive(Debug, Clone)]
pub enum Target {
    Portfolio(Arc<dyn Portfolio>),
    PortfolioNode(Arc<dyn PortfolioNode>),
    Position(Arc<dyn Position>),
    Trade(Arc<dyn Trade>),
    Security(Arc<Security>),
    Primitive(UniqueId),
}

impl Target {
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

    /// The exact id of the target. Lazy proxies resolve themselves to answer.
    pub fn unique_id(&self) -> ResolveResult<UniqueId> {
        Ok(match self {
            Self::Portfolio(p) => p.unique_id()?.clone(),
            Self::PortfolioNode(n) => n.unique_id()?.clone(),
            Self::Position(p) => p.unique_id()?.clone(),
            Self::Trade(t) => t.unique_id()?.clone(),
            Self::Security(s) => s.unique_id.clone(),
            Self::Primitive(id) => id.clone(),
        })
    }

    /// The specification of this target, pinned to its exact id.
    pub fn specification(&self) -> ResolveResult<TargetSpecification> {
        Ok(TargetSpecification::new(self.kind(), self.unique_id()?))
    }

    pub fn into_portfolio(self) -> ResolveResult<Arc<dyn Portfolio>> {
        match self {
            Self::Portfolio(p) => Ok(p),
            other => Err(other.mismatch(TargetKind::Portfolio)),
        }
    }

    pub fn into_portfolio_node(self) -> ResolveResult<Arc<dyn PortfolioNode>> {
        match self {
            Self::PortfolioNode(n) => Ok(n),
            other => Err(other.mismatch(TargetKind::PortfolioNode)),
        }
    }

    pub fn into_position(self) -> ResolveResult<Arc<dyn Position>> {
        match self {
            Self::Position(p) => Ok(p),
            other => Err(other.mismatch(TargetKind::Position)),
        }
    }

    pub fn into_trade(self) -> ResolveResult<Arc<dyn Trade>> {
        match self {
            Self::Trade(t) => Ok(t),
            other => Err(other.mismatch(TargetKind::Trade)),
        }
    }

    pub fn into_security(self) -> ResolveResult<Arc<Security>> {
        match self {
            Self::Security(s) => Ok(s),
            other => Err(other.mismatch(TargetKind::Security)),
        }
    }

    fn mismatch(&self, expected: TargetKind) -> ResolveError {
        ResolveError::KindMismatch {
            expected,
            actual: self.kind(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SimpleTrade;
    use rust_decimal::Decimal;

    #[test]
    fn test_pinning_only_upgrades_latest() {
        let latest = TargetSpecification::new(TargetKind::Trade, UniqueId::latest("T", "1"));
        let v3 = UniqueId::of("T", "1", "3");
        assert_eq!(latest.pinned_to(&v3).unique_id(), &v3);

        let pinned = TargetSpecification::new(TargetKind::Trade, UniqueId::of("T", "1", "2"));
        assert_eq!(pinned.pinned_to(&v3), pinned);

        let other_object = UniqueId::of("T", "2", "1");
        assert_eq!(latest.pinned_to(&other_object), latest);
    }

    #[test]
    fn test_target_kind_and_conversion() {
        let trade = SimpleTrade::new(UniqueId::of("T", "1", "1"), Decimal::ONE);
        let target = Target::Trade(Arc::new(trade));
        assert_eq!(target.kind(), TargetKind::Trade);
        assert_eq!(
            target.specification().unwrap(),
            TargetSpecification::new(TargetKind::Trade, UniqueId::of("T", "1", "1"))
        );

        let err = target.clone().into_position().unwrap_err();
        assert!(matches!(
            err,
            ResolveError::KindMismatch {
                expected: TargetKind::Position,
                actual: TargetKind::Trade
            }
        ));
        assert!(target.into_trade().is_ok());
    }

    #[test]
    fn test_primitive_resolves_to_itself() {
        let id = UniqueId::latest("Prim", "x");
        let target = Target::Primitive(id.clone());
        assert_eq!(target.unique_id().unwrap(), id);
    }

    #[test]
    fn test_specification_display() {
        let spec = TargetSpecification::new(TargetKind::PortfolioNode, UniqueId::of("N", "a", "1"));
        assert_eq!(spec.to_string(), "portfolio node(N~a~1)");
    }
}
