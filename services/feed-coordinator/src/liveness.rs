//! Liveness monitor
//!
//! Any node may run the check; duplicate firing across the fleet is tolerated
//! because reconnect requests are idempotent. The monitor never decides which
//! node is "actually" unhealthy — it publishes a targeted request and trusts
//! the addressed node to act on the timeout signal.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::coordination::{CoordinationStore, StoreReply, keys};

/// Scans fleet heartbeats and requests targeted reconnects
pub struct LivenessMonitor {
    store: Arc<dyn CoordinationStore>,
    heartbeat_timeout_secs: i64,
}

impl LivenessMonitor {
    pub fn new(store: Arc<dyn CoordinationStore>, heartbeat_timeout_secs: i64) -> Self {
        Self {
            store,
            heartbeat_timeout_secs,
        }
    }

    /// One timer tick: publish a reconnect request for every stale node.
    ///
    /// Returns the flagged node ids.
    pub async fn check_once(&self) -> Vec<String> {
        let heartbeats = match self.store.hash_all(keys::HEARTBEAT_HASH).await {
            StoreReply::Value(heartbeats) => heartbeats,
            StoreReply::Unavailable => {
                warn!("heartbeats unreadable, skipping liveness check");
                return Vec::new();
            }
        };
        if heartbeats.is_empty() {
            debug!("no heartbeats recorded yet");
            return Vec::new();
        }

        let now = chrono::Utc::now().timestamp();
        let stale = stale_nodes(&heartbeats, now, self.heartbeat_timeout_secs);
        for node_id in &stale {
            warn!("heartbeat for node {node_id} is stale, requesting reconnect");
            self.store.publish(keys::RECONNECT_CHANNEL, node_id).await;
        }
        stale
    }
}

/// Which recorded heartbeats are older than the timeout.
///
/// Pure so the staleness rule is testable without a clock; unparseable
/// timestamps are skipped (a node that never wrote a valid ping will be
/// caught by its own error-frame reconnect path).
pub fn stale_nodes(
    heartbeats: &HashMap<String, String>,
    now_epoch_secs: i64,
    timeout_secs: i64,
) -> Vec<String> {
    let mut stale = Vec::new();
    for (node_id, raw) in heartbeats {
        // Heartbeats are written as integer seconds but tolerate a float
        // encoding from older writers.
        let Ok(last_ping) = raw.parse::<f64>() else {
            warn!("unparseable heartbeat {raw} for node {node_id}");
            continue;
        };
        let age = now_epoch_secs - last_ping as i64;
        if age > timeout_secs {
            stale.push(node_id.clone());
        }
    }
    stale.sort();
    stale
}
