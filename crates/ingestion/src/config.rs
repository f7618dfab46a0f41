//! Ingestion metrics

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

pub use contracts::{EventRule, IngestConfig};

/// Lifetime counters of one `IngestHandler`
#[derive(Debug, Default)]
pub struct IngestionMetrics {
    /// Ingestion calls completed
    pub calls: AtomicU64,

    /// Batches read from all calls
    pub batches_received: AtomicU64,

    /// Records persisted
    pub records_accepted: AtomicU64,

    /// Records rejected
    pub records_rejected: AtomicU64,

    /// Records the store already had
    pub records_duplicate: AtomicU64,

    /// Store writes that needed the retry
    pub store_retries: AtomicU64,

    /// Derived events that could not be published
    pub event_publish_failures: AtomicU64,

    /// Batches currently being processed
    pub in_flight_batches: AtomicUsize,
}

impl IngestionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_batch_started(&self) {
        self.batches_received.fetch_add(1, Ordering::Relaxed);
        self.in_flight_batches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_batch_finished(&self, accepted: u64, rejected: u64, duplicates: u64) {
        self.in_flight_batches.fetch_sub(1, Ordering::Relaxed);
        self.records_accepted.fetch_add(accepted, Ordering::Relaxed);
        self.records_rejected.fetch_add(rejected, Ordering::Relaxed);
        self.records_duplicate.fetch_add(duplicates, Ordering::Relaxed);
    }

    pub fn record_call(&self) {
        self.calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_store_retry(&self) {
        self.store_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_event_publish_failure(&self) {
        self.event_publish_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            calls: self.calls.load(Ordering::Relaxed),
            batches_received: self.batches_received.load(Ordering::Relaxed),
            records_accepted: self.records_accepted.load(Ordering::Relaxed),
            records_rejected: self.records_rejected.load(Ordering::Relaxed),
            records_duplicate: self.records_duplicate.load(Ordering::Relaxed),
            store_retries: self.store_retries.load(Ordering::Relaxed),
            event_publish_failures: self.event_publish_failures.load(Ordering::Relaxed),
            in_flight_batches: self.in_flight_batches.load(Ordering::Relaxed),
        }
    }
}

/// Metrics snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub calls: u64,
    pub batches_received: u64,
    pub records_accepted: u64,
    pub records_rejected: u64,
    pub records_duplicate: u64,
    pub store_retries: u64,
    pub event_publish_failures: u64,
    pub in_flight_batches: usize,
}
