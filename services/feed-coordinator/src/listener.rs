//! Fleet event listener
//!
//! One poll loop per node over the shared pub/sub channels. Delivery latency
//! is bounded by the poll interval rather than push-driven blocking. Each
//! message is dispatched by channel: new-instruments notifications go to the
//! subscription coordinator; reconnect requests are filtered by exact node-id
//! match so only the addressed node acts.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::coordination::{ChannelMessage, CoordinationStore, StoreReply, keys};
use crate::feed::FeedHandle;
use crate::models::{EntityClass, NodeId};
use crate::subscription::SubscriptionCoordinator;

/// Per-node pub/sub poll loop
pub struct Listener {
    store: Arc<dyn CoordinationStore>,
    coordinator: SubscriptionCoordinator,
    feed: FeedHandle,
    node_id: NodeId,
    poll_interval: Duration,
}

impl Listener {
    pub fn new(
        store: Arc<dyn CoordinationStore>,
        coordinator: SubscriptionCoordinator,
        feed: FeedHandle,
        node_id: NodeId,
        poll_interval: Duration,
    ) -> Self {
        Self {
            store,
            coordinator,
            feed,
            node_id,
            poll_interval,
        }
    }

    /// Subscribe to both fleet channels and poll until the process exits
    pub async fn run(self) {
        loop {
            let subscribed = !self
                .store
                .subscribe(keys::NEW_INSTRUMENTS_CHANNEL)
                .await
                .is_unavailable()
                && !self
                    .store
                    .subscribe(keys::RECONNECT_CHANNEL)
                    .await
                    .is_unavailable();
            if subscribed {
                break;
            }
            warn!("channel subscription failed, retrying");
            tokio::time::sleep(self.poll_interval).await;
        }
        info!("listening for fleet events");

        loop {
            match self.store.next_message(self.poll_interval).await {
                StoreReply::Value(Some(message)) => self.dispatch(message).await,
                StoreReply::Value(None) => {}
                StoreReply::Unavailable => {
                    // Back off one interval instead of spinning against a
                    // dead connection.
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }
    }

    async fn dispatch(&self, message: ChannelMessage) {
        match message.channel.as_str() {
            keys::NEW_INSTRUMENTS_CHANNEL => match EntityClass::parse(&message.payload) {
                Some(class) => {
                    self.coordinator.handle_notification(class).await;
                }
                None => warn!("unknown entity class announced: {}", message.payload),
            },
            keys::RECONNECT_CHANNEL => {
                if message.payload == self.node_id.as_str() {
                    info!("targeted reconnect received");
                    if let Err(err) = self.feed.request_reconnect().await {
                        error!("could not forward reconnect to the feed task: {err}");
                    }
                } else {
                    debug!("reconnect addressed to node {}, ignoring", message.payload);
                }
            }
            other => warn!("message on unexpected channel {other}"),
        }
    }
}
