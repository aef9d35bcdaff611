//! Priced instrument queries
//!
//! The read surface consumed by the REST layer: registry rows merged with the
//! shared price hash by token. A price missing from the cache is `None`, an
//! unreachable store degrades to all-`None` prices, and an empty registry
//! result is a typed "no data" outcome rather than a failure.

use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

use crate::coordination::{CoordinationStore, StoreReply, keys};
use crate::models::Instrument;
use crate::registry::{InstrumentRegistry, RegistryError};

/// Which instruments to price
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PriceScope {
    Underlyings,
    /// Derivatives of the underlying with this symbol
    DerivativesOf(String),
}

/// A registry row with its last seen price, if any
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PricedInstrument {
    #[serde(flatten)]
    pub instrument: Instrument,
    /// Parent row, present for derivative scopes
    pub underlying_data: Option<Instrument>,
    pub price: Option<f64>,
}

#[derive(Debug, Error)]
pub enum QueryError {
    /// Nothing is known for the requested scope
    #[error("no instruments found")]
    NoData,

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Joins registry rows with the shared price hash
pub struct PricedInstrumentQuery {
    store: Arc<dyn CoordinationStore>,
    registry: Arc<dyn InstrumentRegistry>,
}

impl PricedInstrumentQuery {
    pub fn new(store: Arc<dyn CoordinationStore>, registry: Arc<dyn InstrumentRegistry>) -> Self {
        Self { store, registry }
    }

    pub async fn priced_instruments(
        &self,
        scope: PriceScope,
    ) -> Result<Vec<PricedInstrument>, QueryError> {
        let rows: Vec<(Instrument, Option<Instrument>)> = match scope {
            PriceScope::Underlyings => self
                .registry
                .list_underlyings()
                .await?
                .into_iter()
                .map(|row| (row, None))
                .collect(),
            PriceScope::DerivativesOf(symbol) => self
                .registry
                .list_derivatives_by_underlying_symbol(&symbol)
                .await?
                .into_iter()
                .map(|joined| (joined.derivative, Some(joined.underlying)))
                .collect(),
        };
        if rows.is_empty() {
            return Err(QueryError::NoData);
        }

        let tokens: Vec<String> = rows.iter().map(|(row, _)| row.token.clone()).collect();
        let prices = match self.store.hash_get_many(keys::PRICE_HASH, &tokens).await {
            StoreReply::Value(prices) => prices,
            StoreReply::Unavailable => {
                warn!("price hash unreadable, serving unpriced instruments");
                vec![None; rows.len()]
            }
        };

        Ok(rows
            .into_iter()
            .zip(prices)
            .map(|((instrument, underlying_data), raw)| PricedInstrument {
                instrument,
                underlying_data,
                price: raw.and_then(|raw| raw.parse::<f64>().ok()),
            })
            .collect())
    }
}
