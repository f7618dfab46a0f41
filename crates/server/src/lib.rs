//! # Server
//!
//! Orchestration layer: composes the streaming services behind one hub and
//! exposes them over WebSocket.
//!
//! Routes:
//! - `GET /v1/ingest` - client-streaming batches, one `result` frame at the end
//! - `GET /v1/snapshots` - `subscribe` frame, then periodic `snapshot` frames
//! - `GET /v1/sessions/{session_id}?participant_id=..` - bidirectional `message` frames
//! - `GET /v1/alerts` - `subscribe_alerts` frame, then `event` frames
//! - `GET /health` - JSON health report
//!
//! Every stream ends with an `end` frame carrying the close reason.

mod error;
mod frames;
mod hub;
mod registry;
mod server;
mod ws;

pub use error::ServerError;
pub use frames::{ClientFrame, ServerFrame};
pub use hub::{HealthReport, HealthStatus, StreamHub};
pub use registry::{
    ConnectionCounters, ConnectionGuard, ConnectionId, ConnectionInfo, ConnectionRegistry,
    StreamKind,
};
pub use server::Server;
pub use ws::router;
