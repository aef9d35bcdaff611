//! In-process registry used by tests and runnable single-node setups

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use super::{InstrumentRegistry, RegistryError};
use crate::models::{DerivativeWithUnderlying, Instrument, NewInstrument};

#[derive(Default)]
struct Inner {
    underlyings: Vec<Instrument>,
    derivatives: Vec<Instrument>,
    next_id: i64,
}

/// Registry over process memory with a write-failure toggle
#[derive(Default)]
pub struct MemoryRegistry {
    inner: Mutex<Inner>,
    fail_writes: AtomicBool,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent inserts fail, simulating a registry outage
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn build(inner: &mut Inner, row: NewInstrument, underlying_id: Option<i64>) -> Instrument {
        inner.next_id += 1;
        let now = Utc::now();
        Instrument {
            id: inner.next_id,
            token: row.token,
            symbol: row.symbol,
            underlying: row.underlying,
            instrument_type: row.instrument_type,
            expiry: row.expiry,
            strike: row.strike,
            underlying_id,
            is_deleted: false,
            created_at: now,
            updated_at: now,
        }
    }

    fn check_writable(&self) -> Result<(), RegistryError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(RegistryError::Unavailable(
                "simulated write failure".to_string(),
            ));
        }
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("memory registry lock poisoned")
    }
}

#[async_trait]
impl InstrumentRegistry for MemoryRegistry {
    async fn list_underlyings(&self) -> Result<Vec<Instrument>, RegistryError> {
        Ok(self
            .lock()
            .underlyings
            .iter()
            .filter(|row| !row.is_deleted)
            .cloned()
            .collect())
    }

    async fn list_derivatives_by_underlying_token(
        &self,
        token: &str,
    ) -> Result<Vec<Instrument>, RegistryError> {
        let inner = self.lock();
        let Some(parent) = inner
            .underlyings
            .iter()
            .find(|row| row.token == token && !row.is_deleted)
        else {
            return Ok(Vec::new());
        };
        Ok(inner
            .derivatives
            .iter()
            .filter(|row| row.underlying_id == Some(parent.id) && !row.is_deleted)
            .cloned()
            .collect())
    }

    async fn list_derivatives_by_underlying_symbol(
        &self,
        symbol: &str,
    ) -> Result<Vec<DerivativeWithUnderlying>, RegistryError> {
        let inner = self.lock();
        let Some(parent) = inner
            .underlyings
            .iter()
            .find(|row| row.symbol == symbol && !row.is_deleted)
        else {
            return Ok(Vec::new());
        };
        Ok(inner
            .derivatives
            .iter()
            .filter(|row| row.underlying_id == Some(parent.id) && !row.is_deleted)
            .map(|row| DerivativeWithUnderlying {
                derivative: row.clone(),
                underlying: parent.clone(),
            })
            .collect())
    }

    async fn insert_underlyings(
        &self,
        rows: Vec<NewInstrument>,
    ) -> Result<Vec<Instrument>, RegistryError> {
        self.check_writable()?;
        let mut inner = self.lock();
        let mut inserted = Vec::with_capacity(rows.len());
        for row in rows {
            let instrument = Self::build(&mut inner, row, None);
            inner.underlyings.push(instrument.clone());
            inserted.push(instrument);
        }
        Ok(inserted)
    }

    async fn insert_derivatives(
        &self,
        rows: Vec<NewInstrument>,
        underlying_id: i64,
    ) -> Result<Vec<Instrument>, RegistryError> {
        self.check_writable()?;
        let mut inner = self.lock();
        let mut inserted = Vec::with_capacity(rows.len());
        for row in rows {
            let instrument = Self::build(&mut inner, row, Some(underlying_id));
            inner.derivatives.push(instrument.clone());
            inserted.push(instrument);
        }
        Ok(inserted)
    }
}
