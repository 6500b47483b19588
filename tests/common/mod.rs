//! Shared fixture: one stored portfolio and the resolver stack over it.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;

use lazytarget::{
    CachingTargetResolver, ExternalId, ExternalIdBundle, InMemoryObjectStore, ObjectId, ObjectResolver,
    ObjectTargetResolver, ResolveContext, ResolverRegistry, Security, SecurityLink, SimplePortfolio,
    SimplePortfolioNode, SimplePosition, SimpleTrade, StorageError, Target, TargetKind, TargetResolver,
    TargetSpecification, UniqueId, VersionCorrection,
};

/// Object resolver that records every identifier it is asked for.
pub struct CountingStore {
    inner: Arc<InMemoryObjectStore>,
    requests: Mutex<Vec<UniqueId>>,
}

impl CountingStore {
    pub fn new(inner: Arc<InMemoryObjectStore>) -> Self {
        Self {
            inner,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<UniqueId> {
        self.requests.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// True if any request named `value` in scheme `scheme`.
    pub fn was_asked_for(&self, scheme: &str, value: &str) -> bool {
        self.requests().iter().any(|id| id.scheme() == scheme && id.value() == value)
    }
}

impl ObjectResolver for CountingStore {
    fn resolve_object(
        &self,
        unique_id: &UniqueId,
        version_correction: &VersionCorrection,
    ) -> Result<Option<Target>, StorageError> {
        self.requests.lock().unwrap().push(unique_id.clone());
        self.inner.resolve_object(unique_id, version_correction)
    }

    fn resolve_external_id(
        &self,
        external_ids: &ExternalIdBundle,
        version_correction: &VersionCorrection,
    ) -> Result<Option<UniqueId>, StorageError> {
        self.inner.resolve_external_id(external_ids, version_correction)
    }
}

pub struct Fixture {
    pub store: Arc<InMemoryObjectStore>,
    pub objects: Arc<CountingStore>,
    pub caching: Arc<CachingTargetResolver>,
    pub registry: Arc<ResolverRegistry>,
    pub portfolio: SimplePortfolio,
    pub stored_at: DateTime<Utc>,
}

pub fn apple() -> Security {
    Security::new(UniqueId::of("Sec", "AAPL", "1"), "Apple", "EQUITY")
        .with_external_id(ExternalId::new("TICKER", "AAPL"))
}

pub fn msft() -> Security {
    Security::new(UniqueId::of("Sec", "MSFT", "1"), "Microsoft", "EQUITY")
        .with_external_id(ExternalId::new("TICKER", "MSFT"))
}

fn by_ticker(ticker: &str) -> SecurityLink {
    SecurityLink::by_external_ids(ExternalIdBundle::of(ExternalId::new("TICKER", ticker)))
}

/// Root node with two child nodes and three positions; position 1 has two trades.
pub fn portfolio() -> SimplePortfolio {
    let trade_date = chrono::NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
    let position_1 = SimplePosition::new(UniqueId::of("Pos", "1", "1"), Decimal::from(150), by_ticker("AAPL"))
        .with_attribute("book", "equities")
        .with_trade(
            SimpleTrade::new(UniqueId::of("Trade", "1a", "1"), Decimal::from(100))
                .with_security_link(by_ticker("AAPL"))
                .with_trade_date(trade_date, None),
        )
        .with_trade(
            SimpleTrade::new(UniqueId::of("Trade", "1b", "1"), Decimal::from(50))
                .with_security_link(by_ticker("AAPL"))
                .with_trade_date(trade_date, None),
        );

    let root = SimplePortfolioNode::new(UniqueId::of("Node", "root", "1"), "root")
        .with_child(
            SimplePortfolioNode::new(UniqueId::of("Node", "a", "1"), "a").with_position(SimplePosition::new(
                UniqueId::of("Pos", "a0", "1"),
                Decimal::from(1),
                by_ticker("MSFT"),
            )),
        )
        .with_child(SimplePortfolioNode::new(UniqueId::of("Node", "b", "1"), "b"))
        .with_position(SimplePosition::new(
            UniqueId::of("Pos", "0", "1"),
            Decimal::from(10),
            SecurityLink::by_object_id(ObjectId::new("Sec", "MSFT")),
        ))
        .with_position(position_1)
        .with_position(SimplePosition::new(UniqueId::of("Pos", "2", "1"), Decimal::from(-30), by_ticker("MSFT")));

    SimplePortfolio::new(UniqueId::of("Port", "1", "1"), "Global Equities", root)
}

pub fn fixture() -> Fixture {
    let stored_at = Utc::now() - Duration::hours(1);
    let store = Arc::new(InMemoryObjectStore::new());
    store.add_security(apple(), stored_at).unwrap();
    store.add_security(msft(), stored_at).unwrap();
    let portfolio = portfolio();
    store.add_portfolio_tree(&portfolio, stored_at).unwrap();

    let objects = Arc::new(CountingStore::new(store.clone()));
    let caching = CachingTargetResolver::new(Arc::new(ObjectTargetResolver::new(objects.clone())));
    Fixture {
        caching: Arc::new(caching),
        objects,
        registry: Arc::new(ResolverRegistry::with_sweep_threshold(8)),
        store,
        portfolio,
        stored_at,
    }
}

impl Fixture {
    pub fn resolver(&self) -> Arc<dyn TargetResolver> {
        self.caching.clone()
    }

    /// A context whose resolver can be named across the boundary.
    pub fn context(&self) -> ResolveContext {
        ResolveContext::new(self.store.clone(), Some(self.resolver())).with_registry(Arc::clone(&self.registry))
    }

    /// A context with nothing addressable: snapshots must materialize.
    pub fn offline_context(&self) -> ResolveContext {
        ResolveContext::new(self.store.clone(), None).with_registry(Arc::clone(&self.registry))
    }
}

pub fn spec(kind: TargetKind, scheme: &str, value: &str) -> TargetSpecification {
    TargetSpecification::new(kind, UniqueId::latest(scheme, value))
}
