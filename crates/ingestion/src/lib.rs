//! # Ingestion
//!
//! Client-streaming batch ingestion.
//!
//! Responsibilities:
//! - Read batches from one caller's inbound stream
//! - Reject oversized batches whole, invalid records individually
//! - Persist valid records per metric partition (one retry on failure)
//! - Publish derived events for configured metrics
//! - Forward accepted records to the archive worker
//! - Return one aggregate `IngestResult` when the stream ends
//!
//! ## Usage Example
//!
//! ```ignore
//! use ingestion::IngestHandler;
//! use stream_channel::{channel, Delivery};
//!
//! let handler = IngestHandler::new(config.ingest.clone(), store, bus);
//! let (tx, rx) = channel(16, Delivery::Reliable);
//! tokio::spawn(async move {
//!     tx.send(batch).await.ok();
//! });
//! let result = handler.ingest(rx).await;
//! ```

mod config;
mod error;
mod handler;
mod validate;

// Re-exports
pub use config::{EventRule, IngestConfig, IngestionMetrics, MetricsSnapshot};
pub use error::RejectReason;
pub use handler::IngestHandler;
pub use validate::{future_horizon, validate_record};
