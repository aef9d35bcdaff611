//! Feed client tests
//!
//! Drive the socket-owning task against a scripted connector: price and
//! heartbeat maintenance, the self-healing error-frame path, and command
//! handling from the rest of the node.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use feed_coordinator::config::FeedSettings;
use feed_coordinator::coordination::{CoordinationStore, keys};
use feed_coordinator::feed::client::{FeedConnection, FeedConnector};
use feed_coordinator::feed::{FeedClient, FeedError};
use feed_coordinator::{MemoryStore, NodeId};

/// Connector handing out scripted connections, one frame list per dial
struct ScriptedConnector {
    scripts: Mutex<VecDeque<Vec<String>>>,
    connects: Arc<AtomicUsize>,
    sent: Arc<Mutex<Vec<String>>>,
}

impl ScriptedConnector {
    fn new(scripts: Vec<Vec<&str>>) -> (Self, Arc<AtomicUsize>, Arc<Mutex<Vec<String>>>) {
        let connects = Arc::new(AtomicUsize::new(0));
        let sent = Arc::new(Mutex::new(Vec::new()));
        let connector = Self {
            scripts: Mutex::new(
                scripts
                    .into_iter()
                    .map(|frames| frames.into_iter().map(str::to_string).collect())
                    .collect(),
            ),
            connects: Arc::clone(&connects),
            sent: Arc::clone(&sent),
        };
        (connector, connects, sent)
    }
}

#[async_trait]
impl FeedConnector for ScriptedConnector {
    async fn connect(&self) -> Result<Box<dyn FeedConnection>, FeedError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let frames = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_default();
        Ok(Box::new(ScriptedConnection {
            frames: frames.into(),
            sent: Arc::clone(&self.sent),
        }))
    }
}

struct ScriptedConnection {
    frames: VecDeque<String>,
    sent: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl FeedConnection for ScriptedConnection {
    async fn send(&mut self, text: &str) -> Result<(), FeedError> {
        self.sent.lock().unwrap().push(text.to_string());
        Ok(())
    }

    async fn recv(&mut self) -> Result<String, FeedError> {
        match self.frames.pop_front() {
            Some(frame) => Ok(frame),
            // Script exhausted: stay connected and quiet.
            None => std::future::pending().await,
        }
    }
}

fn settings() -> FeedSettings {
    FeedSettings {
        ws_url: "wss://unused.example/ws".to_string(),
        reconnect_delay_ms: 10,
        command_buffer: 8,
    }
}

async fn eventually<F, Fut>(mut check: F, what: &str)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Instant::now() + Duration::from_secs(2);
    loop {
        if check().await {
            return;
        }
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

const QUOTE_FRAME: &str = r#"{"data_type": "quote", "payload": {"token": "T1", "price": 101.5}}"#;
const PING_FRAME: &str = r#"{"data_type": "ping"}"#;
const ERROR_FRAME: &str = r#"{"data_type": "error"}"#;

#[tokio::test]
async fn quotes_refresh_the_price_cache_and_heartbeat() {
    let store = Arc::new(MemoryStore::new());
    let node = NodeId::from_string("node-a");
    let (connector, _connects, _sent) = ScriptedConnector::new(vec![vec![QUOTE_FRAME, PING_FRAME]]);
    let (client, _handle) =
        FeedClient::new(Box::new(connector), store.clone(), node.clone(), &settings());
    let task = tokio::spawn(client.run());

    eventually(
        || async {
            store
                .hash_get_many(keys::PRICE_HASH, &["T1".to_string()])
                .await
                .value_or_default()
                == vec![Some("101.5".to_string())]
        },
        "price cache write",
    )
    .await;

    eventually(
        || async {
            store
                .hash_all(keys::HEARTBEAT_HASH)
                .await
                .value_or_default()
                .contains_key(node.as_str())
        },
        "heartbeat write",
    )
    .await;

    task.abort();
}

#[tokio::test]
async fn error_frame_reconnects_and_restores_owned_subscriptions() {
    let store = Arc::new(MemoryStore::new());
    let node = NodeId::from_string("node-a");
    store
        .set_add(&keys::ownership(&node), &["T1".to_string()])
        .await;

    let (connector, connects, sent) = ScriptedConnector::new(vec![vec![ERROR_FRAME], vec![]]);
    let (client, _handle) =
        FeedClient::new(Box::new(connector), store.clone(), node.clone(), &settings());
    let task = tokio::spawn(client.run());

    eventually(
        || async { connects.load(Ordering::SeqCst) >= 2 },
        "reconnect after error frame",
    )
    .await;

    // Both connections replayed the owned subscription.
    eventually(
        || async {
            let sent = sent.lock().unwrap();
            sent.iter()
                .filter(|text| text.contains("\"subscribe\"") && text.contains("T1"))
                .count()
                >= 2
        },
        "resubscribe on both connections",
    )
    .await;

    // Even an error frame proves the connection produced a frame.
    assert!(
        store
            .hash_all(keys::HEARTBEAT_HASH)
            .await
            .value_or_default()
            .contains_key(node.as_str())
    );

    task.abort();
}

#[tokio::test]
async fn subscribe_commands_reach_the_wire() {
    let store = Arc::new(MemoryStore::new());
    let (connector, _connects, sent) = ScriptedConnector::new(vec![vec![]]);
    let (client, handle) = FeedClient::new(
        Box::new(connector),
        store.clone(),
        NodeId::from_string("node-a"),
        &settings(),
    );
    let task = tokio::spawn(client.run());

    handle
        .subscribe(vec!["T9".to_string()])
        .await
        .expect("feed task alive");

    eventually(
        || async {
            sent.lock().unwrap().iter().any(|text| {
                text == r#"{"msg_command":"subscribe","data_type":"quote","tokens":["T9"]}"#
            })
        },
        "subscribe frame on the wire",
    )
    .await;

    task.abort();
}

#[tokio::test]
async fn targeted_reconnect_replaces_the_connection() {
    let store = Arc::new(MemoryStore::new());
    let (connector, connects, _sent) = ScriptedConnector::new(vec![vec![], vec![]]);
    let (client, handle) = FeedClient::new(
        Box::new(connector),
        store.clone(),
        NodeId::from_string("node-a"),
        &settings(),
    );
    let task = tokio::spawn(client.run());

    eventually(
        || async { connects.load(Ordering::SeqCst) == 1 },
        "initial connection",
    )
    .await;

    handle.request_reconnect().await.expect("feed task alive");

    eventually(
        || async { connects.load(Ordering::SeqCst) == 2 },
        "replacement connection",
    )
    .await;

    task.abort();
}
