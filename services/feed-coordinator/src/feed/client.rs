//! Socket-owning feed task
//!
//! State machine per connection: disconnected, connecting, connected and
//! listening. The task never reaches a terminal error state: connect failures
//! retry after a delay, receive/send faults and upstream error frames drop
//! the connection and dial again, and a targeted reconnect request does the
//! same. Every inbound frame — quote, ping, or error — refreshes this node's
//! heartbeat; quotes additionally refresh the shared price hash.

use async_trait::async_trait;
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{error, info, warn};

use super::wire::{FrameType, IncomingMessage, OutgoingMessage};
use super::{FeedCommand, FeedError, FeedHandle};
use crate::config::FeedSettings;
use crate::coordination::{CoordinationStore, StoreReply, keys};
use crate::models::NodeId;

/// One live duplex connection to the upstream feed
#[async_trait]
pub trait FeedConnection: Send {
    async fn send(&mut self, text: &str) -> Result<(), FeedError>;

    /// Block until the next inbound text frame
    async fn recv(&mut self) -> Result<String, FeedError>;
}

/// Dials fresh connections; replacing a connection discards the old one
#[async_trait]
pub trait FeedConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn FeedConnection>, FeedError>;
}

/// WebSocket connector for the production feed
pub struct WsConnector {
    url: String,
}

impl WsConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl FeedConnector for WsConnector {
    async fn connect(&self) -> Result<Box<dyn FeedConnection>, FeedError> {
        let (stream, _response) = connect_async(self.url.as_str()).await?;
        Ok(Box::new(WsConnection { stream }))
    }
}

struct WsConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl FeedConnection for WsConnection {
    async fn send(&mut self, text: &str) -> Result<(), FeedError> {
        self.stream
            .send(Message::Text(text.to_string()))
            .await
            .map_err(FeedError::from)
    }

    async fn recv(&mut self) -> Result<String, FeedError> {
        loop {
            match self.stream.next().await {
                None => return Err(FeedError::Closed),
                Some(Err(err)) => return Err(err.into()),
                Some(Ok(Message::Text(text))) => return Ok(text),
                Some(Ok(Message::Close(_))) => return Err(FeedError::Closed),
                // Transport-level ping/pong/binary frames are not part of the
                // feed protocol; the broker's liveness ping arrives as text.
                Some(Ok(_)) => continue,
            }
        }
    }
}

/// Why the per-connection loop ended
enum LoopExit {
    /// Targeted reconnect request; dial again immediately
    Reconnect,
    /// Upstream error frame; dial again immediately
    ErrorFrame,
    /// Socket-level send/receive fault; dial again after the delay
    Fault,
    /// Command channel closed; the process is shutting down
    Shutdown,
}

/// The per-node feed task
pub struct FeedClient {
    connector: Box<dyn FeedConnector>,
    store: Arc<dyn CoordinationStore>,
    node_id: NodeId,
    commands: mpsc::Receiver<FeedCommand>,
    reconnect_delay: Duration,
}

impl FeedClient {
    pub fn new(
        connector: Box<dyn FeedConnector>,
        store: Arc<dyn CoordinationStore>,
        node_id: NodeId,
        settings: &FeedSettings,
    ) -> (Self, FeedHandle) {
        let (tx, rx) = mpsc::channel(settings.command_buffer);
        (
            Self {
                connector,
                store,
                node_id,
                commands: rx,
                reconnect_delay: Duration::from_millis(settings.reconnect_delay_ms),
            },
            FeedHandle { commands: tx },
        )
    }

    /// Run until the command channel closes
    pub async fn run(self) {
        let Self {
            connector,
            store,
            node_id,
            mut commands,
            reconnect_delay,
        } = self;

        loop {
            let mut conn = match connector.connect().await {
                Ok(conn) => conn,
                Err(err) => {
                    error!("feed connect failed: {err}");
                    tokio::time::sleep(reconnect_delay).await;
                    continue;
                }
            };
            info!("feed connected");

            if resubscribe_owned(conn.as_mut(), &store, &node_id)
                .await
                .is_err()
            {
                tokio::time::sleep(reconnect_delay).await;
                continue;
            }

            match drive(conn.as_mut(), &mut commands, &store, &node_id).await {
                LoopExit::Shutdown => {
                    info!("feed task stopping");
                    return;
                }
                // Both immediate paths: upstream told us the connection is
                // bad, or the liveness protocol did.
                LoopExit::Reconnect | LoopExit::ErrorFrame => {}
                LoopExit::Fault => tokio::time::sleep(reconnect_delay).await,
            }
        }
    }
}

/// Restore this node's recorded subscriptions on a fresh connection.
///
/// Re-subscription is idempotent upstream, so replaying the ownership set
/// after a drop is always safe.
async fn resubscribe_owned(
    conn: &mut dyn FeedConnection,
    store: &Arc<dyn CoordinationStore>,
    node_id: &NodeId,
) -> Result<(), ()> {
    match store.set_members(&keys::ownership(node_id)).await {
        StoreReply::Value(tokens) if !tokens.is_empty() => {
            let mut tokens: Vec<String> = tokens.into_iter().collect();
            tokens.sort();
            info!("restoring {} owned subscriptions", tokens.len());
            send_command(conn, OutgoingMessage::subscribe(tokens))
                .await
                .map_err(|_exit| ())
        }
        StoreReply::Value(_) => Ok(()),
        StoreReply::Unavailable => {
            warn!("ownership set unreadable, skipping resubscribe");
            Ok(())
        }
    }
}

async fn drive(
    conn: &mut dyn FeedConnection,
    commands: &mut mpsc::Receiver<FeedCommand>,
    store: &Arc<dyn CoordinationStore>,
    node_id: &NodeId,
) -> LoopExit {
    loop {
        tokio::select! {
            command = commands.recv() => match command {
                None => return LoopExit::Shutdown,
                Some(FeedCommand::Reconnect) => {
                    info!("reconnect requested for this node");
                    return LoopExit::Reconnect;
                }
                Some(FeedCommand::Subscribe(tokens)) => {
                    if let Err(exit) = send_command(conn, OutgoingMessage::subscribe(tokens)).await {
                        return exit;
                    }
                }
                Some(FeedCommand::Unsubscribe(tokens)) => {
                    if let Err(exit) = send_command(conn, OutgoingMessage::unsubscribe(tokens)).await {
                        return exit;
                    }
                }
            },
            frame = conn.recv() => match frame {
                Err(err) => {
                    error!("feed receive failed: {err}");
                    return LoopExit::Fault;
                }
                Ok(text) => {
                    if let Some(exit) = handle_frame(&text, store, node_id).await {
                        return exit;
                    }
                }
            },
        }
    }
}

async fn send_command(
    conn: &mut dyn FeedConnection,
    message: OutgoingMessage,
) -> Result<(), LoopExit> {
    let text = match serde_json::to_string(&message) {
        Ok(text) => text,
        Err(err) => {
            error!("unencodable outbound feed message: {err}");
            return Ok(());
        }
    };
    if let Err(err) = conn.send(&text).await {
        error!("feed send failed: {err}");
        return Err(LoopExit::Fault);
    }
    Ok(())
}

async fn handle_frame(
    text: &str,
    store: &Arc<dyn CoordinationStore>,
    node_id: &NodeId,
) -> Option<LoopExit> {
    let exit = match serde_json::from_str::<IncomingMessage>(text) {
        Err(err) => {
            warn!("undecodable feed frame: {err}");
            None
        }
        Ok(frame) => match frame.data_type {
            FrameType::Quote => {
                match frame.payload {
                    Some(quote) => {
                        store
                            .hash_put(
                                keys::PRICE_HASH,
                                &[(quote.token, quote.price.to_string())],
                            )
                            .await;
                    }
                    None => warn!("quote frame without payload"),
                }
                None
            }
            FrameType::Ping => None,
            FrameType::Error => {
                error!("upstream reported an error frame, reconnecting");
                Some(LoopExit::ErrorFrame)
            }
        },
    };

    // Every inbound frame, whatever its type, proves the connection is alive.
    store
        .hash_put(
            keys::HEARTBEAT_HASH,
            &[(node_id.to_string(), Utc::now().timestamp().to_string())],
        )
        .await;

    exit
}
