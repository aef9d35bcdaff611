//! Feed socket wire format
//!
//! Outbound control commands and inbound data frames are JSON; the broker's
//! formats are otherwise treated as opaque contracts.

use serde::{Deserialize, Serialize};

/// Control verb of an outbound message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MsgCommand {
    Subscribe,
    Unsubscribe,
    Ping,
    Error,
}

/// Payload kind of a frame in either direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameType {
    Ping,
    Quote,
    Error,
}

/// Outbound control command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    pub msg_command: MsgCommand,
    pub data_type: FrameType,
    pub tokens: Vec<String>,
}

impl OutgoingMessage {
    pub fn subscribe(tokens: Vec<String>) -> Self {
        Self {
            msg_command: MsgCommand::Subscribe,
            data_type: FrameType::Quote,
            tokens,
        }
    }

    pub fn unsubscribe(tokens: Vec<String>) -> Self {
        Self {
            msg_command: MsgCommand::Unsubscribe,
            data_type: FrameType::Quote,
            tokens,
        }
    }
}

/// Inbound frame: a quote update, a protocol ping, or an error report
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct IncomingMessage {
    pub data_type: FrameType,
    #[serde(default)]
    pub payload: Option<QuotePayload>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct QuotePayload {
    pub token: String,
    pub price: f64,
}
