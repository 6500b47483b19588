mod common;

use std::sync::{Arc, Mutex};

use chrono::{NaiveDate, NaiveTime};
use lazytarget::snapshot::{materialize_node, materialize_portfolio};
use lazytarget::{
    marshal, CachingTargetResolver, Counterparty, ExternalId, ExternalIdBundle, InMemoryObjectStore, NodeSnapshot,
    ObjectId, Portfolio, PortfolioNode, Position, PositionSnapshot, Premium, ResolveContext, ResolveError,
    ResolverRegistry, Security, SecurityLink, SecuritySource, SimpleTrade, StorageError, Target, TargetKind,
    TargetSnapshot, Trade, TradeSnapshot, UniqueId, VersionCorrection,
};
use rust_decimal::Decimal;

use common::{fixture, spec};

fn ship(snapshot: &TargetSnapshot) -> TargetSnapshot {
    let bytes = snapshot.encode().unwrap();
    TargetSnapshot::decode(&bytes).unwrap()
}

#[test]
fn handle_snapshot_rehydrates_to_an_equal_portfolio() {
    let fx = fixture();
    let context = fx.context().bind(VersionCorrection::latest());
    let portfolio = context.resolve_portfolio(&spec(TargetKind::Portfolio, "Port", "1")).unwrap();

    let snapshot = Target::Portfolio(Arc::clone(&portfolio)).snapshot().unwrap();
    assert!(snapshot.is_handle());
    assert_eq!(snapshot.kind(), TargetKind::Portfolio);
    assert_eq!(marshal::depth(), 0);

    let received = ship(&snapshot).into_target(&fx.registry).unwrap().into_portfolio().unwrap();
    assert_eq!(received.unique_id().unwrap(), portfolio.unique_id().unwrap());
    assert_eq!(
        materialize_portfolio(&*received).unwrap(),
        materialize_portfolio(&*portfolio).unwrap()
    );
}

#[test]
fn handle_snapshot_carries_child_specifications_not_children() {
    let fx = fixture();
    let context = fx.context().bind(VersionCorrection::latest());
    let portfolio = context.resolve_portfolio(&spec(TargetKind::Portfolio, "Port", "1")).unwrap();
    let root = portfolio.root_node().unwrap();

    let Ok(NodeSnapshot::Handle(snapshot)) = root.snapshot() else {
        panic!("expected a handle snapshot");
    };
    let positions: Vec<String> = snapshot
        .fields
        .positions
        .iter()
        .map(|spec| spec.unique_id().to_string())
        .collect();
    assert_eq!(positions, vec!["Pos~0~1", "Pos~1~1", "Pos~2~1"]);
    assert_eq!(snapshot.fields.child_nodes.len(), 2);

    // Capturing the specifications resolved nothing below the root.
    assert_eq!(root.positions().unwrap().resolved_count(), 0);
}

#[test]
fn rehydrated_node_resolves_children_on_demand() {
    let fx = fixture();
    let context = fx.context().bind(VersionCorrection::latest());
    let portfolio = context.resolve_portfolio(&spec(TargetKind::Portfolio, "Port", "1")).unwrap();
    let root = Target::PortfolioNode(portfolio.root_node().unwrap());

    let received = ship(&root.snapshot().unwrap())
        .into_target(&fx.registry)
        .unwrap()
        .into_portfolio_node()
        .unwrap();
    let before = fx.objects.count();

    let position = received.positions().unwrap().get(1).unwrap();
    assert_eq!(position.security().unwrap().name, "Apple");
    assert_eq!(position.trades().unwrap().len(), 2);
    assert!(fx.objects.was_asked_for("Pos", "1"));
    assert!(!fx.objects.was_asked_for("Pos", "2"));
    assert!(fx.objects.count() > before);

    assert_eq!(materialize_node(&*received).unwrap(), materialize_node(&*portfolio.root_node().unwrap()).unwrap());
}

#[test]
fn offline_context_materializes_an_equal_graph() {
    let fx = fixture();
    let context = fx.offline_context().bind(VersionCorrection::latest());
    let portfolio = context
        .lazy_target(Target::Portfolio(Arc::new(fx.portfolio.clone())))
        .into_portfolio()
        .unwrap();

    let snapshot = Target::Portfolio(Arc::clone(&portfolio)).snapshot().unwrap();
    assert!(!snapshot.is_handle());

    // Plain snapshots need no registry at all.
    let elsewhere = Arc::new(ResolverRegistry::with_sweep_threshold(8));
    let received = ship(&snapshot).into_target(&elsewhere).unwrap().into_portfolio().unwrap();
    let expected = materialize_portfolio(&*portfolio).unwrap();
    assert_eq!(materialize_portfolio(&*received).unwrap(), expected);

    let root = received.root_node().unwrap();
    assert_eq!(root.child_nodes().unwrap().len(), 2);
    let position = root.positions().unwrap().get(1).unwrap();
    assert_eq!(position.security().unwrap().name, "Apple");
}

#[test]
fn handle_from_another_process_is_rejected() {
    let fx = fixture();
    let context = fx.context().bind(VersionCorrection::latest());
    let portfolio = context.resolve_portfolio(&spec(TargetKind::Portfolio, "Port", "1")).unwrap();
    let snapshot = ship(&Target::Portfolio(portfolio).snapshot().unwrap());

    let elsewhere = Arc::new(ResolverRegistry::with_sweep_threshold(8));
    let err = snapshot.into_target(&elsewhere).unwrap_err();
    assert!(matches!(err, ResolveError::UnknownHandle { .. }));
    assert!(err.is_contract_violation());
}

#[test]
fn primitive_and_security_targets_ship_as_values() {
    let fx = fixture();
    let apple = Target::Security(Arc::new(common::apple()));
    let received = ship(&apple.snapshot().unwrap()).into_target(&fx.registry).unwrap();
    assert_eq!(received.into_security().unwrap().name, "Apple");

    let primitive = Target::Primitive(lazytarget::UniqueId::of("Prim", "x", "1"));
    let snapshot = primitive.snapshot().unwrap();
    assert!(!snapshot.is_handle());
    assert_eq!(snapshot.kind(), TargetKind::Primitive);
}

#[test]
fn position_and_trade_fields_survive_the_wire() {
    let fx = fixture();
    let context = fx.context().bind(VersionCorrection::latest());
    let portfolio = context.resolve_portfolio(&spec(TargetKind::Portfolio, "Port", "1")).unwrap();
    let position = portfolio.root_node().unwrap().positions().unwrap().get(1).unwrap();

    let snapshot = Target::Position(Arc::clone(&position)).snapshot().unwrap();
    assert!(matches!(snapshot, TargetSnapshot::Position(PositionSnapshot::Handle(_))));
    let shipped = ship(&snapshot);
    assert_eq!(shipped, snapshot);

    let received = shipped.into_target(&fx.registry).unwrap().into_position().unwrap();
    assert_eq!(received.quantity().unwrap(), Decimal::from(150));
    assert_eq!(received.attributes().unwrap().get("book").map(String::as_str), Some("equities"));
    let trades = received.trades().unwrap();
    assert_eq!(trades.len(), 2);
    let trade = trades.get(1).unwrap();
    assert_eq!(trade.quantity().unwrap(), Decimal::from(50));
    assert_eq!(trade.trade_date().unwrap(), NaiveDate::from_ymd_opt(2024, 3, 15).unwrap());
}

#[test]
fn trade_premium_and_counterparty_survive_the_wire() {
    let fx = fixture();
    let context = fx.context().bind(VersionCorrection::latest());
    let premium = Premium {
        amount: Decimal::new(-125_050, 2),
        currency: "USD".to_string(),
        date: NaiveDate::from_ymd_opt(2024, 3, 18),
        time: NaiveTime::from_hms_opt(16, 30, 0),
    };
    let original = SimpleTrade::new(UniqueId::of("Trade", "fx", "3"), Decimal::new(2_500_125, 4))
        .with_security_link(SecurityLink::by_external_ids(ExternalIdBundle::of(ExternalId::new("TICKER", "AAPL"))))
        .with_counterparty(Counterparty::new(ExternalId::new("LEI", "5493001KJTIIGC8Y1R12")))
        .with_trade_date(
            NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(),
            NaiveTime::from_hms_opt(9, 45, 30),
        )
        .with_premium(premium.clone());
    let trade = context
        .lazy_target(Target::Trade(Arc::new(original.clone())))
        .into_trade()
        .unwrap();

    let snapshot = Target::Trade(trade).snapshot().unwrap();
    assert!(matches!(snapshot, TargetSnapshot::Trade(TradeSnapshot::Handle(_))));
    let shipped = ship(&snapshot);
    assert_eq!(shipped, snapshot);

    let received = shipped.into_target(&fx.registry).unwrap().into_trade().unwrap();
    assert_eq!(received.unique_id().unwrap(), &original.unique_id);
    assert_eq!(received.quantity().unwrap(), Decimal::new(2_500_125, 4));
    assert_eq!(received.premium().unwrap(), Some(&premium));
    assert_eq!(received.counterparty().unwrap(), &original.counterparty);
    assert_eq!(received.trade_date().unwrap(), original.trade_date);
    assert_eq!(received.trade_time().unwrap(), original.trade_time);
    assert_eq!(received.security().unwrap().name, "Apple");
}

/// Security source that records how many entries the shared cache holds at each lookup.
struct CacheWatcher {
    store: Arc<InMemoryObjectStore>,
    caching: Arc<CachingTargetResolver>,
    seen: Mutex<Vec<usize>>,
}

impl CacheWatcher {
    fn note(&self) {
        self.seen.lock().unwrap().push(self.caching.len());
    }
}

impl SecuritySource for CacheWatcher {
    fn get_by_external_ids(
        &self,
        external_ids: &ExternalIdBundle,
        vc: &VersionCorrection,
    ) -> Result<Arc<Security>, StorageError> {
        self.note();
        self.store.get_by_external_ids(external_ids, vc)
    }

    fn get_by_object_id(&self, object_id: &ObjectId, vc: &VersionCorrection) -> Result<Arc<Security>, StorageError> {
        self.note();
        self.store.get_by_object_id(object_id, vc)
    }
}

#[test]
fn materializing_defers_cache_pushes_until_the_walk_ends() {
    let fx = fixture();
    let watcher = Arc::new(CacheWatcher {
        store: fx.store.clone(),
        caching: Arc::clone(&fx.caching),
        seen: Mutex::new(Vec::new()),
    });
    let context = ResolveContext::new(watcher.clone(), Some(fx.resolver()))
        .with_registry(Arc::clone(&fx.registry))
        .bind(VersionCorrection::latest());
    let portfolio = context.resolve_portfolio(&spec(TargetKind::Portfolio, "Port", "1")).unwrap();
    assert_eq!(fx.caching.len(), 1);

    let materialized = materialize_portfolio(&*portfolio).unwrap();
    assert_eq!(materialized.root_node.child_nodes.len(), 2);
    assert_eq!(marshal::depth(), 0);

    // Mid-walk the cache still held only the portfolio.
    let seen = watcher.seen.lock().unwrap().clone();
    assert_eq!(seen.len(), 6);
    assert!(seen.iter().all(|len| *len == 1));

    let vc = VersionCorrection::latest();
    for id in ["Node~a~1", "Node~b~1", "Pos~0~1", "Pos~a0~1", "Trade~1b~1", "Sec~MSFT~1", "Sec~AAPL~1"] {
        let id: UniqueId = id.parse().unwrap();
        assert!(fx.caching.cached(&id, &vc).is_some(), "{id} should be cached");
    }
}
