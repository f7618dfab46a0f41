//! Subscriber metrics for observability

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters of one alert subscriber
#[derive(Debug, Default)]
pub struct SubscriberMetrics {
    /// Events sent to the subscriber
    delivered: AtomicU64,
    /// Events that did not match its filter
    filtered: AtomicU64,
    /// Events missed because it fell behind the bus
    lagged: AtomicU64,
}

impl SubscriberMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    pub fn inc_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn filtered(&self) -> u64 {
        self.filtered.load(Ordering::Relaxed)
    }

    pub fn inc_filtered(&self) {
        self.filtered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn lagged(&self) -> u64 {
        self.lagged.load(Ordering::Relaxed)
    }

    pub fn add_lagged(&self, missed: u64) {
        self.lagged.fetch_add(missed, Ordering::Relaxed);
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> SubscriberMetricsSnapshot {
        SubscriberMetricsSnapshot {
            delivered: self.delivered(),
            filtered: self.filtered(),
            lagged: self.lagged(),
        }
    }
}

/// Snapshot of subscriber metrics (for reporting)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubscriberMetricsSnapshot {
    pub delivered: u64,
    pub filtered: u64,
    pub lagged: u64,
}
