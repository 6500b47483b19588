//! # lazytarget - Lazy Target Resolution for Portfolio Object Graphs
//!
//! lazytarget sits between a computation engine's dependency-graph evaluator
//! and the stores that version portfolios, positions, trades and securities.
//! It hands out targets that look fully resolved but only resolve the slices
//! that are actually read, and it can ship them to another process as compact,
//! resolver-handle-bound snapshots.
//!
//! ## Core Concepts
//!
//! - **VersionCorrection**: the bitemporal coordinate every resolution is parametrized by
//! - **TargetSpecification**: a cheap (kind, identifier) handle denoting a target
//! - **BoundResolveContext**: a security source plus a caching resolver fixed to one coordinate
//! - **Lazy-over-object proxies**: wrap a resolved entity, deferring its children
//! - **Lazy-over-handle proxies**: wrap a specification, deferring everything
//! - **ResolverRegistry**: weak map from resolvers to transmissible handles
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use chrono::Utc;
//! use lazytarget::{
//!     CachingTargetResolver, DelegatingTargetResolver, InMemoryObjectStore, ObjectTargetResolver,
//!     PortfolioNode, SimplePortfolioNode, TargetKind, TargetResolver, TargetSpecification, UniqueId,
//!     VersionCorrection,
//! };
//!
//! let store = Arc::new(InMemoryObjectStore::new());
//! store.add_node(SimplePortfolioNode::new(UniqueId::of("Node", "1", "1"), "root"), Utc::now())?;
//!
//! let caching = Arc::new(CachingTargetResolver::new(Arc::new(ObjectTargetResolver::new(store))));
//! let resolver = DelegatingTargetResolver::new(caching);
//!
//! // No storage access yet: the node is a proxy.
//! let spec = TargetSpecification::new(TargetKind::PortfolioNode, UniqueId::latest("Node", "1"));
//! let node = resolver.resolve(&spec, &VersionCorrection::latest())?.unwrap().into_portfolio_node()?;
//!
//! // First read resolves and pins the version.
//! assert_eq!(node.name()?, "root");
//! assert_eq!(node.unique_id()?.version(), Some("1"));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Values
pub mod config;
pub mod domain;
pub mod error;
pub mod id;
pub mod target;
pub mod version;

// Resolution
pub mod context;
pub mod lazy;
pub mod marshal;
pub mod proxy;
pub mod registry;
pub mod resolver;
pub mod snapshot;
pub mod storage;

// Re-export primary types at crate root for convenience
pub use config::LazyResolutionConfig;
pub use context::{BoundResolveContext, ResolveContext};
pub use domain::{
    Counterparty, NodeList, Portfolio, PortfolioNode, Position, PositionList, Premium, Security, SecurityLink,
    SimplePortfolio, SimplePortfolioNode, SimplePosition, SimpleTrade, Trade, TradeList,
};
pub use error::{ResolveError, ResolveResult, ValidationError};
pub use id::{ExternalId, ExternalIdBundle, ObjectId, UniqueId};
pub use lazy::{LazyList, Memo, SlotSource};
pub use proxy::{
    HandlePortfolio, HandlePortfolioNode, HandlePosition, HandleTrade, LazyPortfolio, LazyPortfolioNode,
    LazyPosition, LazyTrade,
};
pub use registry::{ResolverBinding, ResolverHandle, ResolverRegistry};
pub use resolver::{
    CachingTargetResolver, DelegatingTargetResolver, ObjectTargetResolver, TargetCache, TargetResolver,
};
pub use snapshot::{NodeSnapshot, PortfolioSnapshot, PositionSnapshot, TargetSnapshot, TradeSnapshot};
pub use storage::{InMemoryObjectStore, ObjectResolver, SecuritySource, StorageError};
pub use target::{Target, TargetKind, TargetSpecification};
pub use version::VersionCorrection;
