//! PostgreSQL-backed registry

use async_trait::async_trait;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use tracing::{debug, info};

use super::{InstrumentRegistry, RegistryError};
use crate::models::{DerivativeWithUnderlying, Instrument, NewInstrument};

const MAX_CONNECTIONS: u32 = 5;

const UNDERLYING_COLUMNS: &str = "id, created_at, updated_at, is_deleted, token, symbol, \
     underlying, instrument_type, expiry, strike, NULL::BIGINT AS underlying_id";

const DERIVATIVE_COLUMNS: &str = "id, created_at, updated_at, is_deleted, token, symbol, \
     underlying, instrument_type, expiry, strike, underlying_id";

/// Registry over a PostgreSQL pool
#[derive(Debug)]
pub struct PgRegistry {
    pool: PgPool,
}

impl PgRegistry {
    /// Connect the pool and apply pending migrations
    pub async fn connect(database_url: &str) -> Result<Self, RegistryError> {
        let pool = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect(database_url)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        info!("instrument registry ready");
        Ok(Self { pool })
    }

    /// Wrap an existing pool (tests, shared composition roots)
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn map_instrument(row: &PgRow) -> Result<Instrument, sqlx::Error> {
    Ok(Instrument {
        id: row.try_get("id")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        is_deleted: row.try_get("is_deleted")?,
        token: row.try_get("token")?,
        symbol: row.try_get("symbol")?,
        underlying: row.try_get("underlying")?,
        instrument_type: row.try_get("instrument_type")?,
        expiry: row.try_get("expiry")?,
        strike: row.try_get("strike")?,
        underlying_id: row.try_get("underlying_id")?,
    })
}

fn map_parent(row: &PgRow) -> Result<Instrument, sqlx::Error> {
    Ok(Instrument {
        id: row.try_get("parent_id")?,
        created_at: row.try_get("parent_created_at")?,
        updated_at: row.try_get("parent_updated_at")?,
        is_deleted: row.try_get("parent_is_deleted")?,
        token: row.try_get("parent_token")?,
        symbol: row.try_get("parent_symbol")?,
        underlying: row.try_get("parent_underlying")?,
        instrument_type: row.try_get("parent_instrument_type")?,
        expiry: row.try_get("parent_expiry")?,
        strike: row.try_get("parent_strike")?,
        underlying_id: None,
    })
}

#[async_trait]
impl InstrumentRegistry for PgRegistry {
    async fn list_underlyings(&self) -> Result<Vec<Instrument>, RegistryError> {
        let rows = sqlx::query(&format!(
            "SELECT {UNDERLYING_COLUMNS} FROM underlying_instrument \
             WHERE is_deleted = FALSE ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;

        let instruments = rows
            .iter()
            .map(map_instrument)
            .collect::<Result<Vec<_>, _>>()?;
        debug!("listed {} underlyings", instruments.len());
        Ok(instruments)
    }

    async fn list_derivatives_by_underlying_token(
        &self,
        token: &str,
    ) -> Result<Vec<Instrument>, RegistryError> {
        let rows = sqlx::query(&format!(
            "SELECT {DERIVATIVE_COLUMNS} FROM derivative_instrument \
             WHERE is_deleted = FALSE \
               AND underlying_id = (SELECT id FROM underlying_instrument WHERE token = $1 \
                                    AND is_deleted = FALSE LIMIT 1) \
             ORDER BY id"
        ))
        .bind(token)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(map_instrument)
            .collect::<Result<Vec<_>, _>>()?)
    }

    async fn list_derivatives_by_underlying_symbol(
        &self,
        symbol: &str,
    ) -> Result<Vec<DerivativeWithUnderlying>, RegistryError> {
        let rows = sqlx::query(
            r"
            SELECT
                d.id, d.created_at, d.updated_at, d.is_deleted, d.token, d.symbol,
                d.underlying, d.instrument_type, d.expiry, d.strike, d.underlying_id,
                u.id AS parent_id, u.created_at AS parent_created_at,
                u.updated_at AS parent_updated_at, u.is_deleted AS parent_is_deleted,
                u.token AS parent_token, u.symbol AS parent_symbol,
                u.underlying AS parent_underlying,
                u.instrument_type AS parent_instrument_type,
                u.expiry AS parent_expiry, u.strike AS parent_strike
            FROM derivative_instrument d
            JOIN underlying_instrument u ON u.id = d.underlying_id
            WHERE u.symbol = $1 AND d.is_deleted = FALSE AND u.is_deleted = FALSE
            ORDER BY d.id
            ",
        )
        .bind(symbol)
        .fetch_all(&self.pool)
        .await?;

        let mut joined = Vec::with_capacity(rows.len());
        for row in &rows {
            joined.push(DerivativeWithUnderlying {
                derivative: map_instrument(row)?,
                underlying: map_parent(row)?,
            });
        }
        Ok(joined)
    }

    async fn insert_underlyings(
        &self,
        rows: Vec<NewInstrument>,
    ) -> Result<Vec<Instrument>, RegistryError> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = Vec::with_capacity(rows.len());
        for row in rows {
            let returned = sqlx::query(&format!(
                "INSERT INTO underlying_instrument \
                 (token, symbol, underlying, instrument_type, expiry, strike) \
                 VALUES ($1, $2, $3, $4, $5, $6) \
                 RETURNING {UNDERLYING_COLUMNS}"
            ))
            .bind(&row.token)
            .bind(&row.symbol)
            .bind(&row.underlying)
            .bind(&row.instrument_type)
            .bind(row.expiry)
            .bind(row.strike)
            .fetch_one(&mut *tx)
            .await?;
            inserted.push(map_instrument(&returned)?);
        }
        tx.commit().await?;
        debug!("inserted {} underlyings", inserted.len());
        Ok(inserted)
    }

    async fn insert_derivatives(
        &self,
        rows: Vec<NewInstrument>,
        underlying_id: i64,
    ) -> Result<Vec<Instrument>, RegistryError> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = Vec::with_capacity(rows.len());
        for row in rows {
            let returned = sqlx::query(&format!(
                "INSERT INTO derivative_instrument \
                 (token, symbol, underlying, instrument_type, expiry, strike, underlying_id) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7) \
                 RETURNING {DERIVATIVE_COLUMNS}"
            ))
            .bind(&row.token)
            .bind(&row.symbol)
            .bind(&row.underlying)
            .bind(&row.instrument_type)
            .bind(row.expiry)
            .bind(row.strike)
            .bind(underlying_id)
            .fetch_one(&mut *tx)
            .await?;
            inserted.push(map_instrument(&returned)?);
        }
        tx.commit().await?;
        debug!("inserted {} derivatives", inserted.len());
        Ok(inserted)
    }
}
