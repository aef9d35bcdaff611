//! In-process coordination store
//!
//! Backs tests and single-node setups with the same atomicity contract as the
//! Redis store: every operation runs under one lock, so a drain can never be
//! observed half-applied. Each handle created with [`MemoryStore::handle`] is
//! its own pub/sub subscriber, which lets one test host several "nodes"
//! against shared state. The availability toggle simulates a lost connection
//! so callers can assert the `Unavailable`-versus-empty distinction.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use super::{ChannelMessage, CoordinationStore, StoreReply};

#[derive(Default)]
struct State {
    sets: HashMap<String, HashSet<String>>,
    hashes: HashMap<String, HashMap<String, String>>,
    subscribers: Vec<Weak<Mutex<Inbox>>>,
}

#[derive(Default)]
struct Inbox {
    channels: HashSet<String>,
    queue: VecDeque<ChannelMessage>,
}

struct Shared {
    state: Mutex<State>,
    available: AtomicBool,
}

/// Shared in-memory store; one instance per simulated fleet
pub struct MemoryStore {
    shared: Arc<Shared>,
    inbox: Arc<Mutex<Inbox>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let shared = Arc::new(Shared {
            state: Mutex::new(State::default()),
            available: AtomicBool::new(true),
        });
        Self::register(shared)
    }

    /// A handle over the same state with its own pub/sub subscription
    pub fn handle(&self) -> Self {
        Self::register(Arc::clone(&self.shared))
    }

    /// Simulate the store dropping off (or coming back)
    pub fn set_available(&self, available: bool) {
        self.shared.available.store(available, Ordering::SeqCst);
    }

    fn register(shared: Arc<Shared>) -> Self {
        let inbox = Arc::new(Mutex::new(Inbox::default()));
        shared
            .state
            .lock()
            .expect("memory store lock poisoned")
            .subscribers
            .push(Arc::downgrade(&inbox));
        Self { shared, inbox }
    }

    fn available(&self) -> bool {
        self.shared.available.load(Ordering::SeqCst)
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.shared.state.lock().expect("memory store lock poisoned")
    }

    fn pop_message(&self) -> Option<ChannelMessage> {
        self.inbox
            .lock()
            .expect("memory store lock poisoned")
            .queue
            .pop_front()
    }

    fn publish_locked(state: &mut State, channel: &str, message: &str) -> u64 {
        let mut receivers = 0;
        state.subscribers.retain(|slot| {
            let Some(inbox) = slot.upgrade() else {
                return false;
            };
            let mut inbox = inbox.lock().expect("memory store lock poisoned");
            if inbox.channels.contains(channel) {
                inbox.queue.push_back(ChannelMessage {
                    channel: channel.to_string(),
                    payload: message.to_string(),
                });
                receivers += 1;
            }
            true
        });
        receivers
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CoordinationStore for MemoryStore {
    async fn set_add(&self, key: &str, members: &[String]) -> StoreReply<u64> {
        if !self.available() {
            return StoreReply::Unavailable;
        }
        if members.is_empty() {
            return StoreReply::Value(0);
        }
        let mut state = self.state();
        let set = state.sets.entry(key.to_string()).or_default();
        let mut added = 0;
        for member in members {
            if set.insert(member.clone()) {
                added += 1;
            }
        }
        StoreReply::Value(added)
    }

    async fn set_members(&self, key: &str) -> StoreReply<HashSet<String>> {
        if !self.available() {
            return StoreReply::Unavailable;
        }
        StoreReply::Value(self.state().sets.get(key).cloned().unwrap_or_default())
    }

    async fn set_drain(&self, key: &str) -> StoreReply<HashSet<String>> {
        if !self.available() {
            return StoreReply::Unavailable;
        }
        StoreReply::Value(self.state().sets.remove(key).unwrap_or_default())
    }

    async fn set_add_and_publish(
        &self,
        key: &str,
        members: &[String],
        channel: &str,
        message: &str,
    ) -> StoreReply<u64> {
        if !self.available() {
            return StoreReply::Unavailable;
        }
        if members.is_empty() {
            return StoreReply::Value(0);
        }
        let mut state = self.state();
        let set = state.sets.entry(key.to_string()).or_default();
        let mut added = 0;
        for member in members {
            if set.insert(member.clone()) {
                added += 1;
            }
        }
        Self::publish_locked(&mut state, channel, message);
        StoreReply::Value(added)
    }

    async fn hash_put(&self, key: &str, entries: &[(String, String)]) -> StoreReply<()> {
        if !self.available() {
            return StoreReply::Unavailable;
        }
        let mut state = self.state();
        let hash = state.hashes.entry(key.to_string()).or_default();
        for (field, value) in entries {
            hash.insert(field.clone(), value.clone());
        }
        StoreReply::Value(())
    }

    async fn hash_all(&self, key: &str) -> StoreReply<HashMap<String, String>> {
        if !self.available() {
            return StoreReply::Unavailable;
        }
        StoreReply::Value(self.state().hashes.get(key).cloned().unwrap_or_default())
    }

    async fn hash_get_many(&self, key: &str, fields: &[String]) -> StoreReply<Vec<Option<String>>> {
        if !self.available() {
            return StoreReply::Unavailable;
        }
        let state = self.state();
        let hash = state.hashes.get(key);
        StoreReply::Value(
            fields
                .iter()
                .map(|field| hash.and_then(|hash| hash.get(field).cloned()))
                .collect(),
        )
    }

    async fn expire(&self, key: &str, _ttl_secs: i64) -> StoreReply<bool> {
        if !self.available() {
            return StoreReply::Unavailable;
        }
        // TTLs are not simulated; tests drain keys to model expiry.
        let state = self.state();
        StoreReply::Value(state.sets.contains_key(key) || state.hashes.contains_key(key))
    }

    async fn publish(&self, channel: &str, message: &str) -> StoreReply<u64> {
        if !self.available() {
            return StoreReply::Unavailable;
        }
        let mut state = self.state();
        StoreReply::Value(Self::publish_locked(&mut state, channel, message))
    }

    async fn subscribe(&self, channel: &str) -> StoreReply<()> {
        if !self.available() {
            return StoreReply::Unavailable;
        }
        self.inbox
            .lock()
            .expect("memory store lock poisoned")
            .channels
            .insert(channel.to_string());
        StoreReply::Value(())
    }

    async fn next_message(&self, wait: Duration) -> StoreReply<Option<ChannelMessage>> {
        if !self.available() {
            return StoreReply::Unavailable;
        }
        if let Some(message) = self.pop_message() {
            return StoreReply::Value(Some(message));
        }
        tokio::time::sleep(wait).await;
        if !self.available() {
            return StoreReply::Unavailable;
        }
        StoreReply::Value(self.pop_message())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_and_unavailable_are_distinguishable() {
        let store = MemoryStore::new();
        assert_eq!(
            store.set_members("missing").await,
            StoreReply::Value(HashSet::new())
        );

        store.set_available(false);
        assert!(store.set_members("missing").await.is_unavailable());
        assert!(store.set_drain("missing").await.is_unavailable());
        assert!(store.hash_all("missing").await.is_unavailable());

        store.set_available(true);
        assert_eq!(
            store.set_members("missing").await,
            StoreReply::Value(HashSet::new())
        );
    }

    #[tokio::test]
    async fn drain_removes_the_key() {
        let store = MemoryStore::new();
        store
            .set_add("batch", &["a".to_string(), "b".to_string()])
            .await;
        let first = store.set_drain("batch").await.value_or_default();
        assert_eq!(first.len(), 2);
        let second = store.set_drain("batch").await.value_or_default();
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn publish_reaches_every_subscribed_handle() {
        let store = MemoryStore::new();
        let a = store.handle();
        let b = store.handle();
        a.subscribe("events").await;
        b.subscribe("events").await;

        let receivers = store.publish("events", "hello").await.value_or_default();
        assert_eq!(receivers, 2);

        for handle in [&a, &b] {
            let message = handle
                .next_message(Duration::from_millis(10))
                .await
                .value_or_default()
                .expect("message delivered");
            assert_eq!(message.channel, "events");
            assert_eq!(message.payload, "hello");
        }

        // The publishing handle never subscribed, so its inbox stays empty.
        assert_eq!(
            store.next_message(Duration::from_millis(10)).await,
            StoreReply::Value(None)
        );
    }
}
