//! Priced query tests
//!
//! Registry rows merged with the shared price hash: cache-absent tokens price
//! as `None`, an unreachable store degrades instead of failing, and an empty
//! registry is a typed "no data" outcome.

use pretty_assertions::assert_eq;
use rstest::rstest;
use std::sync::Arc;

use feed_coordinator::coordination::{CoordinationStore, keys};
use feed_coordinator::models::NewInstrument;
use feed_coordinator::queries::QueryError;
use feed_coordinator::registry::InstrumentRegistry;
use feed_coordinator::{MemoryRegistry, MemoryStore, PriceScope, PricedInstrumentQuery};

fn row(token: &str, symbol: &str) -> NewInstrument {
    NewInstrument {
        token: token.to_string(),
        symbol: symbol.to_string(),
        underlying: None,
        instrument_type: None,
        expiry: None,
        strike: None,
    }
}

fn query(store: &MemoryStore, registry: &Arc<MemoryRegistry>) -> PricedInstrumentQuery {
    let registry: Arc<dyn InstrumentRegistry> = registry.clone();
    PricedInstrumentQuery::new(Arc::new(store.handle()), registry)
}

#[tokio::test]
async fn prices_merge_with_none_for_cache_absent_tokens() {
    let store = MemoryStore::new();
    let registry = Arc::new(MemoryRegistry::new());
    registry
        .insert_underlyings(vec![row("T1", "NIFTY"), row("T2", "BANKNIFTY")])
        .await
        .unwrap();
    store
        .hash_put(keys::PRICE_HASH, &[("T1".to_string(), "101.5".to_string())])
        .await;

    let priced = query(&store, &registry)
        .priced_instruments(PriceScope::Underlyings)
        .await
        .unwrap();

    assert_eq!(priced.len(), 2);
    let by_token = |token: &str| {
        priced
            .iter()
            .find(|row| row.instrument.token == token)
            .expect("row present")
    };
    assert_eq!(by_token("T1").price, Some(101.5));
    assert_eq!(by_token("T2").price, None);
}

#[tokio::test]
async fn derivative_scope_joins_the_parent_row() {
    let store = MemoryStore::new();
    let registry = Arc::new(MemoryRegistry::new());
    let parents = registry
        .insert_underlyings(vec![row("U1", "NIFTY")])
        .await
        .unwrap();
    registry
        .insert_derivatives(
            vec![row("D1", "NIFTY24AUGFUT"), row("D2", "NIFTY24AUG24000CE")],
            parents[0].id,
        )
        .await
        .unwrap();
    store
        .hash_put(keys::PRICE_HASH, &[("D2".to_string(), "88.25".to_string())])
        .await;

    let priced = query(&store, &registry)
        .priced_instruments(PriceScope::DerivativesOf("NIFTY".to_string()))
        .await
        .unwrap();

    assert_eq!(priced.len(), 2);
    for row in &priced {
        let parent = row.underlying_data.as_ref().expect("parent joined");
        assert_eq!(parent.symbol, "NIFTY");
        assert_eq!(row.instrument.underlying_id, Some(parent.id));
    }
    assert_eq!(
        priced
            .iter()
            .find(|row| row.instrument.token == "D2")
            .unwrap()
            .price,
        Some(88.25)
    );
}

#[rstest]
#[case::underlyings(PriceScope::Underlyings)]
#[case::derivatives(PriceScope::DerivativesOf("NIFTY".to_string()))]
#[tokio::test]
async fn empty_registry_surfaces_no_data(#[case] scope: PriceScope) {
    let store = MemoryStore::new();
    let registry = Arc::new(MemoryRegistry::new());

    let result = query(&store, &registry).priced_instruments(scope).await;
    assert!(matches!(result, Err(QueryError::NoData)));
}

#[tokio::test]
async fn unreachable_store_serves_unpriced_rows() {
    let store = MemoryStore::new();
    let registry = Arc::new(MemoryRegistry::new());
    registry
        .insert_underlyings(vec![row("T1", "NIFTY")])
        .await
        .unwrap();
    store
        .hash_put(keys::PRICE_HASH, &[("T1".to_string(), "101.5".to_string())])
        .await;

    let query = query(&store, &registry);
    store.set_available(false);

    let priced = query
        .priced_instruments(PriceScope::Underlyings)
        .await
        .unwrap();
    assert_eq!(priced.len(), 1);
    assert_eq!(priced[0].price, None, "degraded, not failed");
}
