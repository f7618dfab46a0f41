//! Archive worker metrics

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Metrics for one archive worker
#[derive(Debug, Default)]
pub struct ArchiveMetrics {
    /// Current queue length
    queue_len: AtomicUsize,
    /// Batches written
    batches_written: AtomicU64,
    /// Records written
    records_written: AtomicU64,
    /// Write failures
    failure_count: AtomicU64,
    /// Batches dropped because the queue was full
    dropped_count: AtomicU64,
}

impl ArchiveMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_len(&self) -> usize {
        self.queue_len.load(Ordering::Relaxed)
    }

    pub fn set_queue_len(&self, len: usize) {
        self.queue_len.store(len, Ordering::Relaxed);
    }

    pub fn batches_written(&self) -> u64 {
        self.batches_written.load(Ordering::Relaxed)
    }

    pub fn records_written(&self) -> u64 {
        self.records_written.load(Ordering::Relaxed)
    }

    /// Record one successful batch write
    pub fn record_write(&self, records: usize) {
        self.batches_written.fetch_add(1, Ordering::Relaxed);
        self.records_written
            .fetch_add(records as u64, Ordering::Relaxed);
    }

    pub fn failure_count(&self) -> u64 {
        self.failure_count.load(Ordering::Relaxed)
    }

    pub fn inc_failure_count(&self) {
        self.failure_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped_count.load(Ordering::Relaxed)
    }

    pub fn inc_dropped_count(&self) {
        self.dropped_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> ArchiveMetricsSnapshot {
        ArchiveMetricsSnapshot {
            queue_len: self.queue_len(),
            batches_written: self.batches_written(),
            records_written: self.records_written(),
            failure_count: self.failure_count(),
            dropped_count: self.dropped_count(),
        }
    }
}

/// Snapshot of archive metrics (for reporting)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArchiveMetricsSnapshot {
    pub queue_len: usize,
    pub batches_written: u64,
    pub records_written: u64,
    pub failure_count: u64,
    pub dropped_count: u64,
}
