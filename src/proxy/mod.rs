//! Lazy proxies for portfolio structure.
//!
//! Two families implement the same capability traits as the plain entities:
//!
//! - **Lazy-over-object** ([`LazyPortfolio`], [`LazyPortfolioNode`],
//!   [`LazyPosition`], [`LazyTrade`]) wrap an entity that is already resolved
//!   and defer only its children and its security. Children come out wrapped
//!   in the same family and are pushed into the bound context's cache.
//! - **Lazy-over-handle** ([`HandlePortfolio`], [`HandlePortfolioNode`],
//!   [`HandlePosition`], [`HandleTrade`]) hold a specification and a resolver
//!   binding and resolve everything on demand. They are what the delegating
//!   resolver hands out and what handle snapshots rehydrate into.

mod handle;
mod lazy_object;

pub use handle::{HandlePortfolio, HandlePortfolioNode, HandlePosition, HandleTrade};
pub use lazy_object::{LazyPortfolio, LazyPortfolioNode, LazyPosition, LazyTrade};
