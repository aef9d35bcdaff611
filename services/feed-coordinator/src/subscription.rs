//! Subscription coordinator
//!
//! Races the rest of the fleet for each announced batch. The atomic drain of
//! the pending set is the whole claim protocol: whoever reads a non-empty set
//! owns the batch; everyone else reads empty and moves on. Losing the race is
//! the expected case on all but one node and is never reported as an error.

use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::coordination::{CoordinationStore, StoreReply, keys};
use crate::feed::FeedHandle;
use crate::models::{EntityClass, NodeId};

/// What a claim attempt resolved to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// This node won the batch and issued subscriptions for `count` tokens
    Won { count: usize },
    /// Another node drained the batch first (or it was already handled)
    Lost,
    /// The pending set could not be read; the batch stays claimable
    StoreUnavailable,
    /// The batch was drained but the local feed task is gone
    SubscribeFailed,
}

/// Claims announced instrument batches for this node
pub struct SubscriptionCoordinator {
    store: Arc<dyn CoordinationStore>,
    feed: FeedHandle,
    node_id: NodeId,
}

impl SubscriptionCoordinator {
    pub fn new(store: Arc<dyn CoordinationStore>, feed: FeedHandle, node_id: NodeId) -> Self {
        Self {
            store,
            feed,
            node_id,
        }
    }

    /// React to a new-instruments notification for an entity class.
    ///
    /// Safe under re-delivery: a second drain of the same batch observes an
    /// empty set and resolves to [`ClaimOutcome::Lost`].
    pub async fn handle_notification(&self, class: EntityClass) -> ClaimOutcome {
        let pending = keys::pending_batch(class);
        let claimed = match self.store.set_drain(&pending).await {
            StoreReply::Value(claimed) => claimed,
            StoreReply::Unavailable => {
                warn!("pending {class} batch unreadable, leaving it claimable");
                return ClaimOutcome::StoreUnavailable;
            }
        };
        if claimed.is_empty() {
            debug!("{class} batch already claimed elsewhere");
            return ClaimOutcome::Lost;
        }

        let mut tokens: Vec<String> = claimed.into_iter().collect();
        tokens.sort();
        info!("won {class} batch of {} tokens, subscribing", tokens.len());

        if let Err(err) = self.feed.subscribe(tokens.clone()).await {
            error!("could not hand {class} batch to the feed task: {err}");
            return ClaimOutcome::SubscribeFailed;
        }

        // Bookkeeping only: ownership is operational visibility and the
        // resubscribe-after-drop source, not a correctness input.
        self.store
            .set_add(&keys::ownership(&self.node_id), &tokens)
            .await;

        ClaimOutcome::Won {
            count: tokens.len(),
        }
    }
}
