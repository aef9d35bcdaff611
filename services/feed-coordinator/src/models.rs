//! Domain types shared across the service

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Entity classes tracked by the sync and claim machinery.
///
/// The class name is used both as a key suffix for cache/pending sets and as
/// the payload of sync notifications on the shared channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityClass {
    /// Top-level instrument (index or stock)
    Underlying,
    /// Contract derived from an underlying (future or option)
    Derivative,
}

impl EntityClass {
    /// Canonical wire/key name for the class
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Underlying => "underlying",
            Self::Derivative => "derivative",
        }
    }

    /// Parse a channel payload back into a class
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "underlying" => Some(Self::Underlying),
            "derivative" => Some(Self::Derivative),
            _ => None,
        }
    }
}

impl fmt::Display for EntityClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Process-lifetime node identifier.
///
/// Generated once at startup and stable for the life of the process; used as
/// the addressing key for targeted reconnects and for heartbeat/ownership
/// bookkeeping in the shared store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(String);

impl NodeId {
    /// Generate a fresh id for this process
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Wrap an existing id (loaded from config or tests)
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A durable instrument row.
///
/// Immutable once created except for the soft-delete flag; rows are never
/// physically deleted. `underlying_id` is populated for derivatives only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instrument {
    pub id: i64,
    pub token: String,
    pub symbol: String,
    pub underlying: Option<String>,
    pub instrument_type: Option<String>,
    pub expiry: Option<DateTime<Utc>>,
    pub strike: Option<f64>,
    pub underlying_id: Option<i64>,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An instrument discovered upstream but not yet persisted
#[derive(Debug, Clone, PartialEq)]
pub struct NewInstrument {
    pub token: String,
    pub symbol: String,
    pub underlying: Option<String>,
    pub instrument_type: Option<String>,
    pub expiry: Option<DateTime<Utc>>,
    pub strike: Option<f64>,
}

/// A derivative row joined with its parent underlying row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DerivativeWithUnderlying {
    pub derivative: Instrument,
    pub underlying: Instrument,
}

/// Separator for the `token::id` cache encoding
const CACHE_ENTRY_SEPARATOR: &str = "::";

/// Membership entry of a per-class instrument cache set.
///
/// Encoded as `token::id` so derivative sync can recover the parent row id
/// without a registry round trip. Tokens must not contain `::`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheEntry {
    pub token: String,
    pub id: i64,
}

impl CacheEntry {
    pub fn new(token: impl Into<String>, id: i64) -> Self {
        Self {
            token: token.into(),
            id,
        }
    }

    /// Build an entry from a persisted row
    pub fn from_instrument(instrument: &Instrument) -> Self {
        Self {
            token: instrument.token.clone(),
            id: instrument.id,
        }
    }

    /// Encode as the `token::id` set member
    pub fn encode(&self) -> String {
        format!("{}{}{}", self.token, CACHE_ENTRY_SEPARATOR, self.id)
    }

    /// Decode a set member back into `(token, id)`; `None` if malformed
    pub fn decode(raw: &str) -> Option<Self> {
        let (token, id) = raw.rsplit_once(CACHE_ENTRY_SEPARATOR)?;
        let id = id.parse::<i64>().ok()?;
        if token.is_empty() {
            return None;
        }
        Some(Self {
            token: token.to_string(),
            id,
        })
    }
}
