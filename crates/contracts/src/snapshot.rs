//! Subscription / Snapshot - Live Snapshot Publisher contracts

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::Tags;

/// Snapshot subscription request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    /// Metrics to include (empty = every metric in the store)
    #[serde(default)]
    pub metric_names: BTreeSet<String>,

    /// Tag filter applied to every metric
    #[serde(default)]
    pub filters: Tags,

    /// Requested push interval; clamped by the publisher
    #[serde(default)]
    pub cadence_ms: i64,
}

impl Subscription {
    /// Subscription for the given metrics
    pub fn for_metrics<I, S>(names: I, cadence_ms: i64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            metric_names: names.into_iter().map(Into::into).collect(),
            filters: Tags::new(),
            cadence_ms,
        }
    }

    /// Add a tag filter
    pub fn with_filter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.insert(key.into(), value.into());
        self
    }
}

/// Latest value of one metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotValue {
    pub metric_name: String,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

/// Point-in-time view pushed on every cadence tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Sequence number within the subscription (starts at 1)
    pub snapshot_id: u64,

    /// One entry per metric that currently has a matching value
    pub values: Vec<SnapshotValue>,

    /// Effective cadence after clamping
    pub cadence_ms: u64,
}
