//! Per-record validation

use chrono::{DateTime, TimeDelta, Utc};
use contracts::{is_valid_metric_name, Record};

use crate::error::RejectReason;

/// Latest timestamp accepted at `now` with the given producer clock skew
pub fn future_horizon(now: DateTime<Utc>, max_clock_skew_ms: u64) -> DateTime<Utc> {
    i64::try_from(max_clock_skew_ms)
        .ok()
        .and_then(TimeDelta::try_milliseconds)
        .and_then(|skew| now.checked_add_signed(skew))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Validate one record, returning its numeric value
///
/// Checks run in order: value, timestamp, metric name.
pub fn validate_record(record: &Record, horizon: DateTime<Utc>) -> Result<f64, RejectReason> {
    let value = record.value.as_f64().ok_or(RejectReason::InvalidValue)?;

    if record.timestamp > horizon {
        return Err(RejectReason::FutureTimestamp);
    }

    if !is_valid_metric_name(&record.metric_name) {
        return Err(RejectReason::InvalidMetricName);
    }

    Ok(value)
}
