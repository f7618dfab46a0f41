//! CollabMessage / SessionInfo - Session Multiplexer contracts

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Message kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Participant-authored message, never dropped
    Chat,
    /// Server notice (join / leave)
    System,
    /// Liveness ping
    Heartbeat,
}

/// Message routed inside a collaboration session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollabMessage {
    /// Originating participant (`system` for server notices)
    #[serde(default)]
    pub sender_id: String,

    /// Target session
    #[serde(default)]
    pub session_id: String,

    /// Payload
    #[serde(default)]
    pub body: String,

    /// Creation time
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,

    /// Message kind
    pub kind: MessageKind,
}

/// Sender id used for server-originated messages
pub const SYSTEM_SENDER: &str = "system";

impl CollabMessage {
    /// Chat message
    pub fn chat(
        session_id: impl Into<String>,
        sender_id: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            sender_id: sender_id.into(),
            session_id: session_id.into(),
            body: body.into(),
            timestamp: Utc::now(),
            kind: MessageKind::Chat,
        }
    }

    /// Server notice
    pub fn system(session_id: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            sender_id: SYSTEM_SENDER.to_string(),
            session_id: session_id.into(),
            body: body.into(),
            timestamp: Utc::now(),
            kind: MessageKind::System,
        }
    }

    /// Liveness ping
    pub fn heartbeat(session_id: impl Into<String>, sender_id: impl Into<String>) -> Self {
        Self {
            sender_id: sender_id.into(),
            session_id: session_id.into(),
            body: String::new(),
            timestamp: Utc::now(),
            kind: MessageKind::Heartbeat,
        }
    }

    /// Whether this is a chat message
    pub fn is_chat(&self) -> bool {
        self.kind == MessageKind::Chat
    }
}

/// Read-only view of a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub participants: BTreeSet<String>,
}
