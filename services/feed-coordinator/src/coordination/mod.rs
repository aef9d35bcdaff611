//! Shared coordination store
//!
//! All cross-node state (instrument caches, pending claim batches, heartbeats,
//! ownership, prices) lives behind [`CoordinationStore`]. A store fault is a
//! soft failure by contract: operations log the cause and report
//! [`StoreReply::Unavailable`] instead of returning an error, so callers can
//! keep serving degraded results while tests still distinguish "empty because
//! absent" from "empty because unreachable".

pub mod keys;
pub mod memory;
pub mod redis;

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::time::Duration;

pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;

/// Typed reply of a store operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreReply<T> {
    /// The operation reached the store; the value may still be empty.
    Value(T),
    /// The store could not be reached; the cause was logged at the call site.
    Unavailable,
}

impl<T> StoreReply<T> {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable)
    }

    /// The reached value, if any
    pub fn value(self) -> Option<T> {
        match self {
            Self::Value(value) => Some(value),
            Self::Unavailable => None,
        }
    }

    /// The reached value, or the empty value when the store was unreachable
    pub fn value_or_default(self) -> T
    where
        T: Default,
    {
        self.value().unwrap_or_default()
    }
}

/// A message delivered on a subscribed pub/sub channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelMessage {
    pub channel: String,
    pub payload: String,
}

/// Key-value/set/hash/pub-sub substrate reachable by every node.
///
/// One connection is shared process-wide; implementations are constructed in
/// the composition root and injected where needed. `set_drain` must be atomic
/// (a single round trip) — it is the claim primitive that enforces one-winner
/// semantics without an explicit lock.
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// Add members to a set, returning how many were newly added
    async fn set_add(&self, key: &str, members: &[String]) -> StoreReply<u64>;

    /// Read full set membership
    async fn set_members(&self, key: &str) -> StoreReply<HashSet<String>>;

    /// Atomically read a set and delete the key.
    ///
    /// Concurrent callers racing on the same key must never both observe a
    /// non-empty result.
    async fn set_drain(&self, key: &str) -> StoreReply<HashSet<String>>;

    /// Add members to a set and publish a message, in one pipelined call
    async fn set_add_and_publish(
        &self,
        key: &str,
        members: &[String],
        channel: &str,
        message: &str,
    ) -> StoreReply<u64>;

    /// Overwrite hash fields
    async fn hash_put(&self, key: &str, entries: &[(String, String)]) -> StoreReply<()>;

    /// Read a full hash
    async fn hash_all(&self, key: &str) -> StoreReply<HashMap<String, String>>;

    /// Read several hash fields, `None` per absent field
    async fn hash_get_many(&self, key: &str, fields: &[String]) -> StoreReply<Vec<Option<String>>>;

    /// Bound a key's lifetime; `false` if the key does not exist
    async fn expire(&self, key: &str, ttl_secs: i64) -> StoreReply<bool>;

    /// Publish a message, returning the number of receivers
    async fn publish(&self, channel: &str, message: &str) -> StoreReply<u64>;

    /// Subscribe this handle to a channel
    async fn subscribe(&self, channel: &str) -> StoreReply<()>;

    /// Wait up to `wait` for the next message on any subscribed channel
    async fn next_message(&self, wait: Duration) -> StoreReply<Option<ChannelMessage>>;
}
