//! Upstream feed client
//!
//! Exactly one task per node owns the socket ([`client::FeedClient::run`]);
//! every other component talks to it through a cloneable [`FeedHandle`]. A
//! reconnect — whether self-detected from an error frame or requested by the
//! liveness protocol — is a command into that task, so two sockets can never
//! race open.

pub mod client;
pub mod wire;

use thiserror::Error;
use tokio::sync::mpsc;

pub use client::{FeedClient, FeedConnection, FeedConnector, WsConnector};

/// Feed transport failure
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("websocket error: {0}")]
    Transport(String),

    #[error("connection closed by peer")]
    Closed,

    /// The owning feed task has stopped; commands can no longer be delivered
    #[error("feed task stopped")]
    TaskStopped,
}

impl From<tokio_tungstenite::tungstenite::Error> for FeedError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

/// Command delivered to the socket-owning task
#[derive(Debug, Clone, PartialEq)]
pub enum FeedCommand {
    Subscribe(Vec<String>),
    Unsubscribe(Vec<String>),
    /// Discard the live connection and dial a fresh one
    Reconnect,
}

/// Cloneable handle over the feed task's command channel
#[derive(Debug, Clone)]
pub struct FeedHandle {
    commands: mpsc::Sender<FeedCommand>,
}

impl FeedHandle {
    /// A detached handle plus its receiving end.
    ///
    /// Lets tests and alternative runtimes observe commands without running a
    /// socket task.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<FeedCommand>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { commands: tx }, rx)
    }

    /// Issue a subscribe command for the given tokens
    pub async fn subscribe(&self, tokens: Vec<String>) -> Result<(), FeedError> {
        self.commands
            .send(FeedCommand::Subscribe(tokens))
            .await
            .map_err(|_| FeedError::TaskStopped)
    }

    /// Issue an unsubscribe command for the given tokens
    pub async fn unsubscribe(&self, tokens: Vec<String>) -> Result<(), FeedError> {
        self.commands
            .send(FeedCommand::Unsubscribe(tokens))
            .await
            .map_err(|_| FeedError::TaskStopped)
    }

    /// Ask the feed task to replace its connection
    pub async fn request_reconnect(&self) -> Result<(), FeedError> {
        self.commands
            .send(FeedCommand::Reconnect)
            .await
            .map_err(|_| FeedError::TaskStopped)
    }
}
