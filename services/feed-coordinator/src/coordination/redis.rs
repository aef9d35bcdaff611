//! Redis-backed coordination store
//!
//! One multiplexed connection (via `ConnectionManager`) is shared by every
//! task in the process, plus a single pub/sub connection for the subscribed
//! channels. Constructed once in the composition root and injected.

use async_trait::async_trait;
use futures_util::StreamExt;
use redis::AsyncCommands;
use redis::aio::{ConnectionManager, PubSub};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::error;

use super::{ChannelMessage, CoordinationStore, StoreReply};

/// Coordination store over a Redis deployment
pub struct RedisStore {
    conn: ConnectionManager,
    pubsub: Mutex<PubSub>,
}

impl RedisStore {
    /// Connect the shared command connection and the pub/sub connection
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = client.get_connection_manager().await?;
        let pubsub = client.get_async_pubsub().await?;
        Ok(Self {
            conn,
            pubsub: Mutex::new(pubsub),
        })
    }
}

#[async_trait]
impl CoordinationStore for RedisStore {
    async fn set_add(&self, key: &str, members: &[String]) -> StoreReply<u64> {
        if members.is_empty() {
            return StoreReply::Value(0);
        }
        let mut conn = self.conn.clone();
        let added: Result<u64, _> = conn.sadd(key, members).await;
        match added {
            Ok(count) => StoreReply::Value(count),
            Err(err) => {
                error!("redis sadd failed for {key}: {err}");
                StoreReply::Unavailable
            }
        }
    }

    async fn set_members(&self, key: &str) -> StoreReply<HashSet<String>> {
        let mut conn = self.conn.clone();
        let members: Result<HashSet<String>, _> = conn.smembers(key).await;
        match members {
            Ok(members) => StoreReply::Value(members),
            Err(err) => {
                error!("redis smembers failed for {key}: {err}");
                StoreReply::Unavailable
            }
        }
    }

    async fn set_drain(&self, key: &str) -> StoreReply<HashSet<String>> {
        let mut conn = self.conn.clone();
        // SMEMBERS + DEL in one MULTI/EXEC round trip: of two concurrent
        // drains, at most one observes a non-empty set.
        let drained: Result<(HashSet<String>, u64), _> = redis::pipe()
            .atomic()
            .smembers(key)
            .del(key)
            .query_async(&mut conn)
            .await;
        match drained {
            Ok((members, _deleted)) => StoreReply::Value(members),
            Err(err) => {
                error!("redis smembers+del failed for {key}: {err}");
                StoreReply::Unavailable
            }
        }
    }

    async fn set_add_and_publish(
        &self,
        key: &str,
        members: &[String],
        channel: &str,
        message: &str,
    ) -> StoreReply<u64> {
        if members.is_empty() {
            return StoreReply::Value(0);
        }
        let mut conn = self.conn.clone();
        let result: Result<(u64, u64), _> = redis::pipe()
            .sadd(key, members)
            .publish(channel, message)
            .query_async(&mut conn)
            .await;
        match result {
            Ok((added, _receivers)) => StoreReply::Value(added),
            Err(err) => {
                error!("redis sadd+publish failed for {key}: {err}");
                StoreReply::Unavailable
            }
        }
    }

    async fn hash_put(&self, key: &str, entries: &[(String, String)]) -> StoreReply<()> {
        if entries.is_empty() {
            return StoreReply::Value(());
        }
        let mut conn = self.conn.clone();
        let stored: Result<(), _> = conn.hset_multiple(key, entries).await;
        match stored {
            Ok(()) => StoreReply::Value(()),
            Err(err) => {
                error!("redis hset failed for {key}: {err}");
                StoreReply::Unavailable
            }
        }
    }

    async fn hash_all(&self, key: &str) -> StoreReply<HashMap<String, String>> {
        let mut conn = self.conn.clone();
        let fields: Result<HashMap<String, String>, _> = conn.hgetall(key).await;
        match fields {
            Ok(fields) => StoreReply::Value(fields),
            Err(err) => {
                error!("redis hgetall failed for {key}: {err}");
                StoreReply::Unavailable
            }
        }
    }

    async fn hash_get_many(&self, key: &str, fields: &[String]) -> StoreReply<Vec<Option<String>>> {
        if fields.is_empty() {
            return StoreReply::Value(Vec::new());
        }
        let mut conn = self.conn.clone();
        // A single field would degrade HMGET to HGET and change the reply
        // shape, so it is fetched explicitly.
        if fields.len() == 1 {
            let value: Result<Option<String>, _> = conn.hget(key, &fields[0]).await;
            return match value {
                Ok(value) => StoreReply::Value(vec![value]),
                Err(err) => {
                    error!("redis hget failed for {key}: {err}");
                    StoreReply::Unavailable
                }
            };
        }
        let values: Result<Vec<Option<String>>, _> = conn.hget(key, fields).await;
        match values {
            Ok(values) => StoreReply::Value(values),
            Err(err) => {
                error!("redis hmget failed for {key}: {err}");
                StoreReply::Unavailable
            }
        }
    }

    async fn expire(&self, key: &str, ttl_secs: i64) -> StoreReply<bool> {
        let mut conn = self.conn.clone();
        let applied: Result<bool, _> = conn.expire(key, ttl_secs).await;
        match applied {
            Ok(applied) => StoreReply::Value(applied),
            Err(err) => {
                error!("redis expire failed for {key}: {err}");
                StoreReply::Unavailable
            }
        }
    }

    async fn publish(&self, channel: &str, message: &str) -> StoreReply<u64> {
        let mut conn = self.conn.clone();
        let receivers: Result<u64, _> = conn.publish(channel, message).await;
        match receivers {
            Ok(receivers) => StoreReply::Value(receivers),
            Err(err) => {
                error!("redis publish failed for {channel}: {err}");
                StoreReply::Unavailable
            }
        }
    }

    async fn subscribe(&self, channel: &str) -> StoreReply<()> {
        let mut pubsub = self.pubsub.lock().await;
        match pubsub.subscribe(channel).await {
            Ok(()) => StoreReply::Value(()),
            Err(err) => {
                error!("redis subscribe failed for {channel}: {err}");
                StoreReply::Unavailable
            }
        }
    }

    async fn next_message(&self, wait: Duration) -> StoreReply<Option<ChannelMessage>> {
        let mut pubsub = self.pubsub.lock().await;
        let mut stream = pubsub.on_message();
        match tokio::time::timeout(wait, stream.next()).await {
            Err(_elapsed) => StoreReply::Value(None),
            Ok(None) => {
                error!("redis pub/sub stream ended");
                StoreReply::Unavailable
            }
            Ok(Some(msg)) => {
                let channel = msg.get_channel_name().to_string();
                match msg.get_payload::<String>() {
                    Ok(payload) => StoreReply::Value(Some(ChannelMessage { channel, payload })),
                    Err(err) => {
                        error!("redis message on {channel} had non-text payload: {err}");
                        StoreReply::Unavailable
                    }
                }
            }
        }
    }
}
