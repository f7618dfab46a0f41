//! # Fanout
//!
//! Server-streaming alert subscriptions over the shared event bus.
//!
//! Each subscriber owns a bus cursor and a filter (severity, source,
//! acknowledged). Matching events go out in bus order through a reliable
//! stream; falling behind the bus window skips events and counts them as
//! lagged.

mod fanout;
mod metrics;

pub use fanout::{AlertFanout, AlertSubscriberHandle};
pub use metrics::{SubscriberMetrics, SubscriberMetricsSnapshot};
