//! CloseReason - why a stream ended
//!
//! Carried by every end-of-stream so that subscribers get a reason instead of
//! a silent disconnect.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Reason attached to an end-of-stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum CloseReason {
    /// Producer finished normally
    Completed,
    /// Consumer cancelled
    Cancelled,
    /// Peer disconnected without closing
    PeerGone,
    /// Liveness window elapsed
    Timeout,
    /// Server is shutting down
    Shutdown,
    /// Request was malformed or over a limit
    Rejected(String),
    /// Unexpected failure
    Error(String),
}

impl CloseReason {
    /// Whether the stream ended without any failure
    pub fn is_clean(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Shutdown)
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::PeerGone => write!(f, "peer gone"),
            Self::Timeout => write!(f, "timeout"),
            Self::Shutdown => write!(f, "shutdown"),
            Self::Rejected(msg) => write!(f, "rejected: {msg}"),
            Self::Error(msg) => write!(f, "error: {msg}"),
        }
    }
}
