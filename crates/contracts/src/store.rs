//! MetricStore trait - durable key/value / time-series store interface
//!
//! The store is a black box: its internal locking is its own business, but
//! it must accept concurrent writers. Callers treat write failures as
//! retryable.

use chrono::{DateTime, Utc};

use crate::{ContractError, Record, Tags};

/// Result of a single `put`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// New point stored
    Inserted,
    /// Same metric + timestamp + tags already stored (dedup enabled)
    Duplicate,
}

/// Time-series store
#[trait_variant::make(MetricStore: Send)]
pub trait LocalMetricStore {
    /// Persist one record under `metric_name`
    ///
    /// # Errors
    /// `TransientIo` when the store is temporarily unavailable
    async fn put(&self, metric_name: &str, record: &Record) -> Result<PutOutcome, ContractError>;

    /// Most recent record of `metric_name` whose tags match `tag_filter`
    async fn latest(
        &self,
        metric_name: &str,
        tag_filter: &Tags,
    ) -> Result<Option<Record>, ContractError>;

    /// All records of `metric_name` with `timestamp >= since`, oldest first
    async fn range_query(
        &self,
        metric_name: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<Record>, ContractError>;

    /// Names of every metric with at least one stored record
    async fn metric_names(&self) -> Result<Vec<String>, ContractError>;
}
