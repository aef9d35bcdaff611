//! Durable instrument registry
//!
//! Fallback source of truth for instruments: consulted when a cache set is
//! cold, and the only place generated ids come from. Plain transactional
//! CRUD; registry faults are typed errors that abort the calling batch.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{DerivativeWithUnderlying, Instrument, NewInstrument};

pub use memory::MemoryRegistry;
pub use postgres::PgRegistry;

/// Registry failure surfaced to the caller
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Raised by test registries simulating an outage
    #[error("registry unavailable: {0}")]
    Unavailable(String),
}

/// Append-only durable store of instruments.
///
/// Duplicate-token inserts are the caller's responsibility to prevent (the
/// sync engine diffs against cache/registry membership before inserting).
#[async_trait]
pub trait InstrumentRegistry: Send + Sync {
    /// All live underlyings
    async fn list_underlyings(&self) -> Result<Vec<Instrument>, RegistryError>;

    /// All live derivatives of the underlying with the given token
    async fn list_derivatives_by_underlying_token(
        &self,
        token: &str,
    ) -> Result<Vec<Instrument>, RegistryError>;

    /// All live derivatives of the underlying with the given symbol, joined
    /// with the parent row
    async fn list_derivatives_by_underlying_symbol(
        &self,
        symbol: &str,
    ) -> Result<Vec<DerivativeWithUnderlying>, RegistryError>;

    /// Insert underlyings transactionally, returning rows with generated ids
    async fn insert_underlyings(
        &self,
        rows: Vec<NewInstrument>,
    ) -> Result<Vec<Instrument>, RegistryError>;

    /// Insert derivatives of one underlying transactionally, returning rows
    /// with generated ids
    async fn insert_derivatives(
        &self,
        rows: Vec<NewInstrument>,
        underlying_id: i64,
    ) -> Result<Vec<Instrument>, RegistryError>;
}
