//! Frame types for the Parley protocol.
//!
//! Frames are internally tagged by a `type` field so that a browser can
//! dispatch on `frame.type` directly, e.g.
//! `{"type":"new_message","conversationId":"alice_bob","message":{..}}`.

use crate::message::Message;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Frame type identifiers, used for logging and metric labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameType {
    Ping,
    Connected,
    NewMessage,
    Pong,
    Error,
}

impl FrameType {
    /// The wire name of this frame type.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            FrameType::Ping => "ping",
            FrameType::Connected => "connected",
            FrameType::NewMessage => "new_message",
            FrameType::Pong => "pong",
            FrameType::Error => "error",
        }
    }
}

impl fmt::Display for FrameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A frame sent from a client to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Liveness signal.
    ///
    /// Carries the identity the client is logged in as, once it knows it.
    /// A socket may ping anonymously before login.
    Ping {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<u64>,
    },
}

impl ClientFrame {
    /// Create a liveness ping for an identity.
    #[must_use]
    pub fn ping(user: impl Into<String>) -> Self {
        ClientFrame::Ping {
            user: Some(user.into()),
            timestamp: None,
        }
    }

    /// Get the frame type.
    #[must_use]
    pub fn frame_type(&self) -> FrameType {
        match self {
            ClientFrame::Ping { .. } => FrameType::Ping,
        }
    }
}

/// A frame pushed from the server to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// Sent once after the socket is registered.
    Connected {
        #[serde(rename = "connectionId")]
        connection_id: String,
        /// Recommended liveness interval in milliseconds.
        heartbeat: u32,
    },

    /// A message was committed to a conversation log.
    NewMessage {
        #[serde(rename = "conversationId")]
        conversation_id: String,
        message: Message,
    },

    /// Reply to a client ping.
    Pong {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<u64>,
    },

    /// The server could not process a client frame.
    Error { code: u16, message: String },
}

impl ServerFrame {
    /// Create a `new_message` frame for a committed message.
    #[must_use]
    pub fn new_message(message: Message) -> Self {
        ServerFrame::NewMessage {
            conversation_id: message.conversation_id.clone(),
            message,
        }
    }

    /// Create a `connected` frame.
    #[must_use]
    pub fn connected(connection_id: impl Into<String>, heartbeat: u32) -> Self {
        ServerFrame::Connected {
            connection_id: connection_id.into(),
            heartbeat,
        }
    }

    /// Create a `pong` frame echoing the ping timestamp.
    #[must_use]
    pub fn pong(timestamp: Option<u64>) -> Self {
        ServerFrame::Pong { timestamp }
    }

    /// Create an `error` frame.
    #[must_use]
    pub fn error(code: u16, message: impl Into<String>) -> Self {
        ServerFrame::Error {
            code,
            message: message.into(),
        }
    }

    /// Get the frame type.
    #[must_use]
    pub fn frame_type(&self) -> FrameType {
        match self {
            ServerFrame::Connected { .. } => FrameType::Connected,
            ServerFrame::NewMessage { .. } => FrameType::NewMessage,
            ServerFrame::Pong { .. } => FrameType::Pong,
            ServerFrame::Error { .. } => FrameType::Error,
        }
    }
}
