//! Claim protocol tests
//!
//! The atomic drain of a pending batch is the only cross-node correctness
//! mechanism: for any published batch, exactly one coordinator may observe a
//! non-empty result.

use futures_util::future::join_all;
use std::sync::Arc;
use std::time::Duration;

use feed_coordinator::coordination::{CoordinationStore, keys};
use feed_coordinator::feed::{FeedCommand, FeedHandle};
use feed_coordinator::{ClaimOutcome, EntityClass, MemoryStore, NodeId, SubscriptionCoordinator};

fn tokens(raw: &[&str]) -> Vec<String> {
    raw.iter().map(|token| token.to_string()).collect()
}

#[tokio::test]
async fn exactly_one_coordinator_wins_a_published_batch() {
    let store = MemoryStore::new();
    store
        .set_add(
            &keys::pending_batch(EntityClass::Underlying),
            &tokens(&["T1", "T2", "T3"]),
        )
        .await;

    let mut receivers = Vec::new();
    let mut races = Vec::new();
    for index in 0..8 {
        let (feed, rx) = FeedHandle::channel(8);
        receivers.push(rx);
        let coordinator = SubscriptionCoordinator::new(
            Arc::new(store.handle()),
            feed,
            NodeId::from_string(format!("node-{index}")),
        );
        races.push(async move { coordinator.handle_notification(EntityClass::Underlying).await });
    }

    let outcomes = join_all(races).await;
    let winners = outcomes
        .iter()
        .filter(|outcome| matches!(outcome, ClaimOutcome::Won { .. }))
        .count();
    let losers = outcomes
        .iter()
        .filter(|outcome| **outcome == ClaimOutcome::Lost)
        .count();
    assert_eq!(winners, 1, "exactly one node may drain the batch");
    assert_eq!(losers, 7, "every other node observes an empty set");

    // Only the winner handed tokens to its feed task.
    let mut subscribed = 0;
    for rx in &mut receivers {
        if let Ok(command) = rx.try_recv() {
            assert_eq!(command, FeedCommand::Subscribe(tokens(&["T1", "T2", "T3"])));
            subscribed += 1;
        }
    }
    assert_eq!(subscribed, 1);
}

#[tokio::test]
async fn winner_records_ownership_for_its_node() {
    let store = Arc::new(MemoryStore::new());
    store
        .set_add(
            &keys::pending_batch(EntityClass::Derivative),
            &tokens(&["D1", "D2"]),
        )
        .await;

    let (feed, mut rx) = FeedHandle::channel(8);
    let node = NodeId::from_string("node-owner");
    let coordinator = SubscriptionCoordinator::new(store.clone(), feed, node.clone());

    let outcome = coordinator
        .handle_notification(EntityClass::Derivative)
        .await;
    assert_eq!(outcome, ClaimOutcome::Won { count: 2 });

    let owned = store
        .set_members(&keys::ownership(&node))
        .await
        .value_or_default();
    assert!(owned.contains("D1") && owned.contains("D2"));
    assert!(rx.try_recv().is_ok());
}

#[tokio::test]
async fn redelivered_notification_is_a_silent_no_op() {
    let store = Arc::new(MemoryStore::new());
    store
        .set_add(&keys::pending_batch(EntityClass::Underlying), &tokens(&["T1"]))
        .await;

    let (feed, _rx) = FeedHandle::channel(8);
    let coordinator =
        SubscriptionCoordinator::new(store.clone(), feed, NodeId::from_string("node-a"));

    let first = coordinator
        .handle_notification(EntityClass::Underlying)
        .await;
    assert_eq!(first, ClaimOutcome::Won { count: 1 });

    // Re-delivery (a reconnect-triggered re-publish) finds the set empty.
    let second = coordinator
        .handle_notification(EntityClass::Underlying)
        .await;
    assert_eq!(second, ClaimOutcome::Lost);
}

#[tokio::test]
async fn unreachable_store_leaves_the_batch_claimable() {
    let store = Arc::new(MemoryStore::new());
    let pending = keys::pending_batch(EntityClass::Underlying);
    store.set_add(&pending, &tokens(&["T1"])).await;

    let (feed, mut rx) = FeedHandle::channel(8);
    let coordinator =
        SubscriptionCoordinator::new(store.clone(), feed, NodeId::from_string("node-a"));

    store.set_available(false);
    let outcome = coordinator
        .handle_notification(EntityClass::Underlying)
        .await;
    assert_eq!(outcome, ClaimOutcome::StoreUnavailable);
    assert!(rx.try_recv().is_err(), "no subscription without a claim");

    // Once the store is back the batch is still there to be won.
    store.set_available(true);
    let retry = coordinator
        .handle_notification(EntityClass::Underlying)
        .await;
    assert_eq!(retry, ClaimOutcome::Won { count: 1 });

    // Bounded wait so a hung command channel fails the test rather than CI.
    let command = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("subscribe command delivered")
        .expect("feed channel open");
    assert_eq!(command, FeedCommand::Subscribe(tokens(&["T1"])));
}
