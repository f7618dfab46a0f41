//! Record / Batch / IngestResult - Ingestion input and output
//!
//! A `Batch` only lives for the duration of one ingestion call; only its
//! constituent `Record`s are persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Tag set attached to a record (ordered for stable keys)
pub type Tags = BTreeMap<String, String>;

/// Sample value as received on the wire.
///
/// Producers are expected to send numbers, but the wire format cannot
/// prevent anything else; non-numeric values are kept as `Raw` so that
/// validation can reject the record instead of failing the whole batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SampleValue {
    /// Numeric sample
    Number(f64),
    /// Anything else the producer sent
    Raw(serde_json::Value),
}

impl SampleValue {
    /// Finite numeric value, if any
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(v) if v.is_finite() => Some(*v),
            _ => None,
        }
    }
}

impl From<f64> for SampleValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for SampleValue {
    fn from(value: &str) -> Self {
        Self::Raw(serde_json::Value::String(value.to_string()))
    }
}

/// A single metric data point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Producer-assigned identifier
    pub id: String,

    /// Metric name (e.g. `cpu.load`)
    pub metric_name: String,

    /// Sample value
    pub value: SampleValue,

    /// Dimension tags
    #[serde(default)]
    pub tags: Tags,

    /// Sample time
    pub timestamp: DateTime<Utc>,
}

impl Record {
    /// Create a record without tags
    pub fn new(
        id: impl Into<String>,
        metric_name: impl Into<String>,
        value: impl Into<SampleValue>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            metric_name: metric_name.into(),
            value: value.into(),
            tags: Tags::new(),
            timestamp,
        }
    }

    /// Add a tag
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Whether every entry of `filter` is present with the same value
    pub fn matches_tags(&self, filter: &Tags) -> bool {
        filter
            .iter()
            .all(|(key, value)| self.tags.get(key) == Some(value))
    }
}

/// Longest accepted metric name
pub const MAX_METRIC_NAME_LEN: usize = 200;

/// Metric name rule: 1..=200 chars, starts with an ASCII letter or `_`,
/// then ASCII alphanumerics or one of `_ . : -`.
pub fn is_valid_metric_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    name.len() <= MAX_METRIC_NAME_LEN
        && (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | ':' | '-'))
}

/// Group of records submitted together on an ingestion stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    /// Batch identifier
    pub batch_id: String,

    /// Records, in producer order
    pub records: Vec<Record>,

    /// Producer name
    #[serde(default)]
    pub source: String,
}

impl Batch {
    /// Create batch
    pub fn new(batch_id: impl Into<String>, source: impl Into<String>, records: Vec<Record>) -> Self {
        Self {
            batch_id: batch_id.into(),
            records,
            source: source.into(),
        }
    }
}

/// Aggregate outcome of one ingestion call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestResult {
    /// Id of the last batch received on the call
    pub batch_id: String,

    /// Records persisted
    pub accepted_count: u64,

    /// Records rejected (validation, oversized batch, store failure)
    pub rejected_count: u64,

    /// Error descriptions, capped in length
    pub errors: Vec<String>,

    /// Records already present in the store (dedup enabled)
    #[serde(default)]
    pub duplicate_count: u64,

    /// Batches read from the stream
    #[serde(default)]
    pub batches_received: u64,
}
