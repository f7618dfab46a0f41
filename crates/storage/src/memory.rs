//! MemoryStore - in-process time-series store

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use contracts::{ContractError, MetricStore, PutOutcome, Record, StoreConfig, Tags};
use tokio::sync::RwLock;
use tracing::trace;

/// In-memory `MetricStore`
///
/// Each metric keeps its records sorted by timestamp; once a series reaches
/// `max_points_per_metric` the oldest point is evicted. With `dedup` on, a
/// record with the same timestamp and tags as a stored one is reported as
/// `PutOutcome::Duplicate` and not stored again.
#[derive(Debug)]
pub struct MemoryStore {
    series: RwLock<HashMap<String, Vec<Record>>>,
    dedup: bool,
    max_points_per_metric: usize,
}

impl MemoryStore {
    pub fn new(config: &StoreConfig) -> Self {
        Self {
            series: RwLock::new(HashMap::new()),
            dedup: config.dedup,
            max_points_per_metric: config.max_points_per_metric.max(1),
        }
    }

    /// Number of points stored for `metric_name`
    pub async fn point_count(&self, metric_name: &str) -> usize {
        self.series
            .read()
            .await
            .get(metric_name)
            .map_or(0, Vec::len)
    }

    /// Number of points stored across all metrics
    pub async fn total_points(&self) -> usize {
        self.series.read().await.values().map(Vec::len).sum()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(&StoreConfig::default())
    }
}

impl MetricStore for MemoryStore {
    async fn put(&self, metric_name: &str, record: &Record) -> Result<PutOutcome, ContractError> {
        let mut series = self.series.write().await;
        let points = series.entry(metric_name.to_string()).or_default();

        let start = points.partition_point(|p| p.timestamp < record.timestamp);
        let end = points.partition_point(|p| p.timestamp <= record.timestamp);

        if self.dedup && points[start..end].iter().any(|p| p.tags == record.tags) {
            trace!(metric = %metric_name, id = %record.id, "duplicate point");
            return Ok(PutOutcome::Duplicate);
        }

        points.insert(end, record.clone());
        if points.len() > self.max_points_per_metric {
            points.remove(0);
        }

        Ok(PutOutcome::Inserted)
    }

    async fn latest(
        &self,
        metric_name: &str,
        tag_filter: &Tags,
    ) -> Result<Option<Record>, ContractError> {
        let series = self.series.read().await;
        Ok(series.get(metric_name).and_then(|points| {
            points
                .iter()
                .rev()
                .find(|p| p.matches_tags(tag_filter))
                .cloned()
        }))
    }

    async fn range_query(
        &self,
        metric_name: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<Record>, ContractError> {
        let series = self.series.read().await;
        Ok(series
            .get(metric_name)
            .map(|points| {
                let start = points.partition_point(|p| p.timestamp < since);
                points[start..].to_vec()
            })
            .unwrap_or_default())
    }

    async fn metric_names(&self) -> Result<Vec<String>, ContractError> {
        let series = self.series.read().await;
        let mut names: Vec<String> = series
            .iter()
            .filter(|(_, points)| !points.is_empty())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[tokio::test]
    async fn test_put_and_latest() {
        let store = MemoryStore::default();
        store
            .put("cpu", &Record::new("r1", "cpu", 1.0, ts(1)))
            .await
            .unwrap();
        store
            .put("cpu", &Record::new("r2", "cpu", 2.0, ts(2)))
            .await
            .unwrap();

        let latest = store.latest("cpu", &Tags::new()).await.unwrap().unwrap();
        assert_eq!(latest.id, "r2");
        assert!(store.latest("mem", &Tags::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_out_of_order_writes_stay_sorted() {
        let store = MemoryStore::default();
        for (id, secs) in [("a", 5), ("b", 1), ("c", 3)] {
            store
                .put("cpu", &Record::new(id, "cpu", 1.0, ts(secs)))
                .await
                .unwrap();
        }

        let all = store.range_query("cpu", ts(0)).await.unwrap();
        let ids: Vec<_> = all.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["b", "c", "a"]);

        let latest = store.latest("cpu", &Tags::new()).await.unwrap().unwrap();
        assert_eq!(latest.id, "a");
    }

    #[tokio::test]
    async fn test_dedup_same_timestamp_and_tags() {
        let store = MemoryStore::default();
        let record = Record::new("r1", "cpu", 1.0, ts(1)).with_tag("host", "a");

        assert_eq!(
            store.put("cpu", &record).await.unwrap(),
            PutOutcome::Inserted
        );
        assert_eq!(
            store.put("cpu", &record).await.unwrap(),
            PutOutcome::Duplicate
        );

        let other_host = Record::new("r2", "cpu", 1.0, ts(1)).with_tag("host", "b");
        assert_eq!(
            store.put("cpu", &other_host).await.unwrap(),
            PutOutcome::Inserted
        );
        assert_eq!(store.point_count("cpu").await, 2);
    }

    #[tokio::test]
    async fn test_dedup_disabled_keeps_both() {
        let store = MemoryStore::new(&StoreConfig {
            dedup: false,
            ..Default::default()
        });
        let record = Record::new("r1", "cpu", 1.0, ts(1));
        store.put("cpu", &record).await.unwrap();
        assert_eq!(
            store.put("cpu", &record).await.unwrap(),
            PutOutcome::Inserted
        );
        assert_eq!(store.point_count("cpu").await, 2);
    }

    #[tokio::test]
    async fn test_retention_evicts_oldest() {
        let store = MemoryStore::new(&StoreConfig {
            dedup: true,
            max_points_per_metric: 2,
        });
        for secs in 0..4 {
            store
                .put("cpu", &Record::new(format!("r{secs}"), "cpu", 1.0, ts(secs)))
                .await
                .unwrap();
        }
        let all = store.range_query("cpu", ts(0)).await.unwrap();
        let ids: Vec<_> = all.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["r2", "r3"]);
    }

    #[tokio::test]
    async fn test_latest_honours_tag_filter() {
        let store = MemoryStore::default();
        store
            .put("cpu", &Record::new("a", "cpu", 1.0, ts(1)).with_tag("host", "a"))
            .await
            .unwrap();
        store
            .put("cpu", &Record::new("b", "cpu", 2.0, ts(2)).with_tag("host", "b"))
            .await
            .unwrap();

        let filter = Tags::from([("host".to_string(), "a".to_string())]);
        let latest = store.latest("cpu", &filter).await.unwrap().unwrap();
        assert_eq!(latest.id, "a");
    }

    #[tokio::test]
    async fn test_range_query_since() {
        let store = MemoryStore::default();
        let now = Utc::now();
        for offset in [30, 20, 10] {
            store
                .put(
                    "cpu",
                    &Record::new(format!("r{offset}"), "cpu", 1.0, now - Duration::seconds(offset)),
                )
                .await
                .unwrap();
        }
        let recent = store
            .range_query("cpu", now - Duration::seconds(15))
            .await
            .unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].id, "r10");
    }

    #[tokio::test]
    async fn test_metric_names_sorted() {
        let store = MemoryStore::default();
        store
            .put("mem", &Record::new("a", "mem", 1.0, ts(1)))
            .await
            .unwrap();
        store
            .put("cpu", &Record::new("b", "cpu", 1.0, ts(1)))
            .await
            .unwrap();
        assert_eq!(store.metric_names().await.unwrap(), ["cpu", "mem"]);
    }
}
