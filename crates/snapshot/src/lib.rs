//! # Snapshot
//!
//! Server-streaming live snapshots.
//!
//! A subscription is validated, its cadence clamped, and then a snapshot of
//! the latest matching value of every subscribed metric is pushed on each
//! tick until the subscriber disconnects or the server shuts down. A failed
//! read skips that tick; the next one proceeds on schedule.

mod publisher;

pub use publisher::{clamp_cadence, PublisherState, SnapshotPublisher, SnapshotSubscription};
