//! # Stream Channel
//!
//! The conduit every streaming service is built on.
//!
//! - `channel(capacity, Delivery)` gives one ordered, bounded direction of a
//!   stream. Reliable channels apply backpressure; best-effort channels
//!   displace the oldest buffered message.
//! - Either endpoint may `close(reason)`; the peer observes the reason after
//!   draining what was already buffered.
//! - `Ticker` replaces sleep loops with a cadence that stops promptly on
//!   cancellation.

mod channel;
mod ticker;

pub use channel::{
    channel, ChannelStats, Delivery, SendError, StreamEnd, StreamReceiver, StreamSender,
};
pub use contracts::CloseReason;
pub use ticker::Ticker;
pub use tokio_util::sync::CancellationToken;
