//! IngestHandler - client-streaming batch ingestion

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use contracts::{
    ArchiveBatch, Batch, ContractError, Event, EventBus, EventRule, IngestConfig, IngestResult,
    MetricStore, PutOutcome, Record,
};
use storage::ArchiveHandle;
use stream_channel::StreamReceiver;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::config::IngestionMetrics;
use crate::error::RejectReason;
use crate::validate::{future_horizon, validate_record};

/// Source used for derived events when the batch names none
const DEFAULT_EVENT_SOURCE: &str = "ingestion";

/// Batch ingestion handler
///
/// Cheap to clone; every clone shares the store, bus, archive and metrics.
pub struct IngestHandler<S, B> {
    inner: Arc<Inner<S, B>>,
}

struct Inner<S, B> {
    store: Arc<S>,
    bus: Arc<B>,
    archive: Option<Arc<ArchiveHandle>>,
    config: IngestConfig,
    rules: HashMap<String, EventRule>,
    metrics: Arc<IngestionMetrics>,
}

impl<S, B> Clone for IngestHandler<S, B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S, B> IngestHandler<S, B>
where
    S: MetricStore + Sync + 'static,
    B: EventBus,
{
    pub fn new(config: IngestConfig, store: Arc<S>, bus: Arc<B>) -> Self {
        Self::build(config, store, bus, None)
    }

    /// Handler that also forwards accepted records to an archive worker
    pub fn with_archive(
        config: IngestConfig,
        store: Arc<S>,
        bus: Arc<B>,
        archive: Arc<ArchiveHandle>,
    ) -> Self {
        Self::build(config, store, bus, Some(archive))
    }

    fn build(
        config: IngestConfig,
        store: Arc<S>,
        bus: Arc<B>,
        archive: Option<Arc<ArchiveHandle>>,
    ) -> Self {
        let rules = config
            .event_rules
            .iter()
            .map(|rule| (rule.metric_name.clone(), rule.clone()))
            .collect();

        Self {
            inner: Arc::new(Inner {
                store,
                bus,
                archive,
                config,
                rules,
                metrics: Arc::new(IngestionMetrics::new()),
            }),
        }
    }

    pub fn metrics(&self) -> &Arc<IngestionMetrics> {
        &self.inner.metrics
    }

    pub fn config(&self) -> &IngestConfig {
        &self.inner.config
    }

    /// Consume batches until the stream ends and return the aggregate result
    ///
    /// At most `max_concurrent_batches` batches are processed at once; the
    /// next batch is not read while every permit is taken. Batches already
    /// started when the stream ends are finished before returning.
    #[instrument(name = "ingest_call", skip_all)]
    pub async fn ingest(&self, inbound: StreamReceiver<Batch>) -> IngestResult {
        let started = Instant::now();
        let permits = Arc::new(Semaphore::new(self.inner.config.max_concurrent_batches.max(1)));
        let mut workers = JoinSet::new();
        let mut summary = CallSummary::new(self.inner.config.max_errors);

        loop {
            let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
                break;
            };

            let batch = match inbound.recv().await {
                Ok(batch) => batch,
                Err(end) => {
                    debug!(reason = %end.reason, "ingest stream ended");
                    break;
                }
            };

            summary.batch_received(&batch.batch_id);
            self.inner.metrics.record_batch_started();

            let inner = Arc::clone(&self.inner);
            workers.spawn(async move {
                let outcome = inner.process_batch(batch).await;
                drop(permit);
                outcome
            });

            while let Some(joined) = workers.try_join_next() {
                summary.merge_joined(joined);
            }
        }

        while let Some(joined) = workers.join_next().await {
            summary.merge_joined(joined);
        }

        let result = summary.into_result();
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        self.inner.metrics.record_call();
        observability::record_ingest_call(&result, elapsed_ms);

        info!(
            batch_id = %result.batch_id,
            batches = result.batches_received,
            accepted = result.accepted_count,
            rejected = result.rejected_count,
            duplicates = result.duplicate_count,
            elapsed_ms = elapsed_ms,
            "ingest call finished"
        );
        result
    }
}

impl<S, B> Inner<S, B>
where
    S: MetricStore + Sync + 'static,
    B: EventBus,
{
    #[instrument(
        name = "ingest_batch",
        skip(self, batch),
        fields(batch_id = %batch.batch_id, records = batch.records.len())
    )]
    async fn process_batch(&self, batch: Batch) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();

        if batch.records.len() > self.config.max_batch_size {
            warn!(
                batch_id = %batch.batch_id,
                records = batch.records.len(),
                max = self.config.max_batch_size,
                "batch rejected: too large"
            );
            observability::record_batch_rejected(batch.records.len());
            outcome.reject_many(batch.records.len() as u64, RejectReason::OversizedBatch);
            self.finish(&outcome);
            return outcome;
        }

        let Batch {
            batch_id,
            records,
            source,
        } = batch;
        let scope = BatchScope {
            batch_id: &batch_id,
            source: &source,
            horizon: future_horizon(Utc::now(), self.config.max_clock_skew_ms),
        };
        let mut archived = Vec::new();

        for (metric_name, partition) in partition_by_metric(records) {
            self.persist_partition(&scope, &metric_name, &partition, &mut outcome, &mut archived)
                .await;
        }

        if !archived.is_empty() {
            self.forward_to_archive(&batch_id, &source, archived);
        }

        self.finish(&outcome);
        outcome
    }

    async fn persist_partition(
        &self,
        scope: &BatchScope<'_>,
        metric_name: &str,
        partition: &[Record],
        outcome: &mut BatchOutcome,
        archived: &mut Vec<Record>,
    ) {
        for (idx, record) in partition.iter().enumerate() {
            let value = match validate_record(record, scope.horizon) {
                Ok(value) => value,
                Err(reason) => {
                    debug!(record_id = %record.id, metric = %metric_name, %reason, "record rejected");
                    outcome.reject(reason);
                    continue;
                }
            };

            match self.put_with_retry(metric_name, record).await {
                Ok(PutOutcome::Inserted) => {
                    outcome.accepted += 1;
                    archived.push(record.clone());
                    self.derive_event(scope, metric_name, value, record).await;
                }
                Ok(PutOutcome::Duplicate) => outcome.duplicates += 1,
                Err(e) => {
                    let remaining = (partition.len() - idx) as u64;
                    error!(
                        metric = %metric_name,
                        rejected = remaining,
                        error = %e,
                        "store write failed after retry, rejecting rest of partition"
                    );
                    outcome.reject_many(
                        remaining,
                        RejectReason::StoreFailure {
                            metric_name: metric_name.to_string(),
                            message: e.to_string(),
                        },
                    );
                    return;
                }
            }
        }
    }

    /// Write once; on failure wait `retry_backoff_ms` and write once more
    async fn put_with_retry(
        &self,
        metric_name: &str,
        record: &Record,
    ) -> Result<PutOutcome, ContractError> {
        match self.store.put(metric_name, record).await {
            Ok(outcome) => Ok(outcome),
            Err(first) => {
                warn!(metric = %metric_name, error = %first, "store write failed, retrying");
                self.metrics.record_store_retry();
                tokio::time::sleep(Duration::from_millis(self.config.retry_backoff_ms)).await;

                let retried = self.store.put(metric_name, record).await;
                observability::record_store_retry(metric_name, retried.is_ok());
                retried
            }
        }
    }

    /// Publish a derived event when a rule matches; failures never reject
    async fn derive_event(
        &self,
        scope: &BatchScope<'_>,
        metric_name: &str,
        value: f64,
        record: &Record,
    ) {
        let Some(rule) = self.rules.get(metric_name) else {
            return;
        };
        if !rule.triggers(metric_name, value) {
            return;
        }

        let title = rule
            .title
            .clone()
            .unwrap_or_else(|| format!("{metric_name} threshold reached"));
        let source = if scope.source.is_empty() {
            DEFAULT_EVENT_SOURCE
        } else {
            scope.source
        };
        let event = Event::new(Uuid::new_v4().to_string(), title, rule.severity, source)
            .with_context("metric_name", metric_name)
            .with_context("value", value.to_string())
            .with_context("record_id", record.id.clone())
            .with_context("batch_id", scope.batch_id);

        let published = match self.bus.publish(event.clone()).await {
            Ok(_) => true,
            Err(first) => {
                warn!(event_id = %event.id, error = %first, "event publish failed, retrying");
                match self.bus.publish(event.clone()).await {
                    Ok(_) => true,
                    Err(e) => {
                        self.metrics.record_event_publish_failure();
                        error!(event_id = %event.id, error = %e, "event publish failed");
                        false
                    }
                }
            }
        };
        observability::record_event_derived(&rule.severity.to_string(), published);
    }

    fn forward_to_archive(&self, batch_id: &str, source: &str, records: Vec<Record>) {
        if let Some(archive) = &self.archive {
            archive.try_send(ArchiveBatch {
                batch_id: batch_id.to_string(),
                source: source.to_string(),
                archived_at: Utc::now(),
                records,
            });
        }
    }

    fn finish(&self, outcome: &BatchOutcome) {
        self.metrics
            .record_batch_finished(outcome.accepted, outcome.rejected, outcome.duplicates);
    }
}

/// Per-batch values shared by every partition
struct BatchScope<'a> {
    batch_id: &'a str,
    source: &'a str,
    /// Latest acceptable record timestamp
    horizon: DateTime<Utc>,
}

/// Group records by metric name, keeping first-seen metric order and the
/// original order inside each group
fn partition_by_metric(records: Vec<Record>) -> Vec<(String, Vec<Record>)> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut partitions: Vec<(String, Vec<Record>)> = Vec::new();

    for record in records {
        match index.get(&record.metric_name) {
            Some(&slot) => partitions[slot].1.push(record),
            None => {
                index.insert(record.metric_name.clone(), partitions.len());
                partitions.push((record.metric_name.clone(), vec![record]));
            }
        }
    }
    partitions
}

/// Result of one batch
#[derive(Debug, Default)]
struct BatchOutcome {
    accepted: u64,
    rejected: u64,
    duplicates: u64,
    errors: Vec<RejectReason>,
}

impl BatchOutcome {
    fn reject(&mut self, reason: RejectReason) {
        self.rejected += 1;
        self.errors.push(reason);
    }

    /// Reject several records under one error entry
    fn reject_many(&mut self, count: u64, reason: RejectReason) {
        self.rejected += count;
        self.errors.push(reason);
    }
}

/// Running aggregate of one ingestion call
struct CallSummary {
    result: IngestResult,
    max_errors: usize,
    truncated_errors: usize,
}

impl CallSummary {
    fn new(max_errors: usize) -> Self {
        Self {
            result: IngestResult::default(),
            max_errors,
            truncated_errors: 0,
        }
    }

    fn batch_received(&mut self, batch_id: &str) {
        self.result.batches_received += 1;
        self.result.batch_id = batch_id.to_string();
    }

    fn merge_joined(&mut self, joined: Result<BatchOutcome, tokio::task::JoinError>) {
        match joined {
            Ok(outcome) => self.merge(outcome),
            Err(e) => error!(error = %e, "batch task failed"),
        }
    }

    fn merge(&mut self, outcome: BatchOutcome) {
        self.result.accepted_count += outcome.accepted;
        self.result.rejected_count += outcome.rejected;
        self.result.duplicate_count += outcome.duplicates;

        for reason in outcome.errors {
            if self.result.errors.len() < self.max_errors {
                self.result.errors.push(reason.to_string());
            } else {
                self.truncated_errors += 1;
            }
        }
    }

    fn into_result(self) -> IngestResult {
        if self.truncated_errors > 0 {
            debug!(
                truncated = self.truncated_errors,
                "error list capped at max_errors"
            );
        }
        self.result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone};
    use contracts::{BusMessage, BusReceiver, Severity, StoreConfig, Tags};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use storage::{BroadcastBus, MemoryStore};
    use stream_channel::{channel, Delivery};
    use tokio::sync::Mutex;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn handler_with(
        config: IngestConfig,
    ) -> (
        IngestHandler<MemoryStore, BroadcastBus>,
        Arc<MemoryStore>,
        Arc<BroadcastBus>,
    ) {
        let store = Arc::new(MemoryStore::new(&StoreConfig::default()));
        let bus = Arc::new(BroadcastBus::new(16));
        let handler = IngestHandler::new(config, Arc::clone(&store), Arc::clone(&bus));
        (handler, store, bus)
    }

    async fn run<S, B>(handler: &IngestHandler<S, B>, batches: Vec<Batch>) -> IngestResult
    where
        S: MetricStore + Sync + 'static,
        B: EventBus,
    {
        let (tx, rx) = channel(batches.len().max(1), Delivery::Reliable);
        for batch in batches {
            tx.send(batch).await.unwrap();
        }
        drop(tx);
        handler.ingest(rx).await
    }

    #[tokio::test]
    async fn test_three_batch_scenario() {
        let (handler, store, _) = handler_with(IngestConfig::default());

        let result = run(
            &handler,
            vec![
                Batch::new(
                    "b1",
                    "p",
                    vec![
                        Record::new("r1", "m1", 10.0, ts(1)),
                        Record::new("r2", "m1", 20.0, ts(2)),
                    ],
                ),
                Batch::new("b2", "p", vec![Record::new("r3", "m1", "bad", ts(3))]),
                Batch::new("b3", "p", vec![Record::new("r4", "m2", 5.0, ts(4))]),
            ],
        )
        .await;

        assert_eq!(result.rejected_count, 1);
        assert_eq!(result.errors, vec!["invalid value".to_string()]);
        assert_eq!(result.accepted_count, 3);
        assert_eq!(result.batches_received, 3);
        assert_eq!(result.batch_id, "b3");
        assert_eq!(store.point_count("m1").await, 2);
        assert_eq!(store.point_count("m2").await, 1);
    }

    #[tokio::test]
    async fn test_identical_reingest_is_not_double_counted() {
        let (handler, store, _) = handler_with(IngestConfig::default());
        let batch = Batch::new(
            "b1",
            "p",
            vec![
                Record::new("r1", "cpu", 1.0, ts(1)).with_tag("host", "a"),
                Record::new("r2", "cpu", 2.0, ts(2)).with_tag("host", "a"),
            ],
        );

        let first = run(&handler, vec![batch.clone()]).await;
        assert_eq!(first.accepted_count, 2);

        let second = run(&handler, vec![batch]).await;
        assert_eq!(second.accepted_count, 0);
        assert_eq!(second.duplicate_count, 2);
        assert_eq!(second.rejected_count, 0);
        assert_eq!(store.point_count("cpu").await, 2);
    }

    #[tokio::test]
    async fn test_oversized_batch_does_not_affect_others() {
        let config = IngestConfig {
            max_batch_size: 2,
            ..Default::default()
        };
        let (handler, store, _) = handler_with(config);

        let oversized = Batch::new(
            "big",
            "p",
            (0..3)
                .map(|i| Record::new(format!("x{i}"), "big", 1.0, ts(i)))
                .collect(),
        );
        let valid = Batch::new(
            "ok",
            "p",
            vec![
                Record::new("a", "small", 1.0, ts(1)),
                Record::new("b", "small", 2.0, ts(2)),
            ],
        );

        let result = run(&handler, vec![oversized, valid]).await;
        assert_eq!(result.rejected_count, 3);
        assert_eq!(result.accepted_count, 2);
        assert_eq!(result.errors, vec!["batch exceeds max_batch_size".to_string()]);
        assert_eq!(store.point_count("big").await, 0);
        assert_eq!(store.point_count("small").await, 2);
    }

    #[tokio::test]
    async fn test_invalid_records_do_not_abort_batch() {
        let (handler, _, _) = handler_with(IngestConfig::default());
        let future = Utc::now() + chrono::Duration::hours(1);

        let result = run(
            &handler,
            vec![Batch::new(
                "b1",
                "p",
                vec![
                    Record::new("r1", "cpu", 1.0, ts(1)),
                    Record::new("r2", "cpu", 2.0, future),
                    Record::new("r3", "9cpu", 3.0, ts(3)),
                    Record::new("r4", "cpu", 4.0, ts(4)),
                ],
            )],
        )
        .await;

        assert_eq!(result.accepted_count, 2);
        assert_eq!(result.rejected_count, 2);
        assert!(result.errors.contains(&"timestamp in the future".to_string()));
        assert!(result.errors.contains(&"invalid metric name".to_string()));
    }

    #[tokio::test]
    async fn test_errors_are_capped() {
        let config = IngestConfig {
            max_errors: 2,
            ..Default::default()
        };
        let (handler, _, _) = handler_with(config);
        let records = (0..5)
            .map(|i| Record::new(format!("r{i}"), "cpu", "bad", ts(i)))
            .collect();

        let result = run(&handler, vec![Batch::new("b1", "p", records)]).await;
        assert_eq!(result.rejected_count, 5);
        assert_eq!(result.errors.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_stream_returns_empty_result() {
        let (handler, _, _) = handler_with(IngestConfig::default());
        let result = run(&handler, vec![]).await;
        assert_eq!(result, IngestResult::default());
    }

    /// Store that fails a configurable number of writes for one metric
    struct FlakyStore {
        inner: MemoryStore,
        failing_metric: String,
        failures_left: Mutex<usize>,
    }

    impl FlakyStore {
        fn new(failing_metric: &str, failures: usize) -> Self {
            Self {
                inner: MemoryStore::default(),
                failing_metric: failing_metric.to_string(),
                failures_left: Mutex::new(failures),
            }
        }
    }

    impl MetricStore for FlakyStore {
        async fn put(
            &self,
            metric_name: &str,
            record: &Record,
        ) -> Result<PutOutcome, ContractError> {
            if metric_name == self.failing_metric {
                let mut left = self.failures_left.lock().await;
                if *left > 0 {
                    *left -= 1;
                    return Err(ContractError::transient_io("put", "store unavailable"));
                }
            }
            self.inner.put(metric_name, record).await
        }

        async fn latest(
            &self,
            metric_name: &str,
            tag_filter: &Tags,
        ) -> Result<Option<Record>, ContractError> {
            self.inner.latest(metric_name, tag_filter).await
        }

        async fn range_query(
            &self,
            metric_name: &str,
            since: DateTime<Utc>,
        ) -> Result<Vec<Record>, ContractError> {
            self.inner.range_query(metric_name, since).await
        }

        async fn metric_names(&self) -> Result<Vec<String>, ContractError> {
            self.inner.metric_names().await
        }
    }

    fn fast_retry() -> IngestConfig {
        IngestConfig {
            retry_backoff_ms: 1,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_single_failure_is_retried() {
        let store = Arc::new(FlakyStore::new("cpu", 1));
        let bus = Arc::new(BroadcastBus::new(4));
        let handler = IngestHandler::new(fast_retry(), Arc::clone(&store), bus);

        let result = run(
            &handler,
            vec![Batch::new("b1", "p", vec![Record::new("r1", "cpu", 1.0, ts(1))])],
        )
        .await;

        assert_eq!(result.accepted_count, 1);
        assert!(result.errors.is_empty());
        assert_eq!(handler.metrics().snapshot().store_retries, 1);
    }

    #[tokio::test]
    async fn test_persistent_failure_rejects_partition_only() {
        let store = Arc::new(FlakyStore::new("cpu", usize::MAX));
        let bus = Arc::new(BroadcastBus::new(4));
        let handler = IngestHandler::new(fast_retry(), Arc::clone(&store), bus);

        let result = run(
            &handler,
            vec![Batch::new(
                "b1",
                "p",
                vec![
                    Record::new("r1", "cpu", 1.0, ts(1)),
                    Record::new("r2", "mem", 1.0, ts(1)),
                    Record::new("r3", "cpu", 2.0, ts(2)),
                ],
            )],
        )
        .await;

        assert_eq!(result.accepted_count, 1);
        assert_eq!(result.rejected_count, 2);
        assert_eq!(result.errors.len(), 1);
        assert!(
            result.errors[0].starts_with("store write failed for 'cpu'"),
            "got: {}",
            result.errors[0]
        );
        assert_eq!(store.inner.point_count("mem").await, 1);
    }

    #[tokio::test]
    async fn test_rule_publishes_derived_event() {
        let config = IngestConfig {
            event_rules: vec![EventRule {
                metric_name: "cpu".into(),
                severity: Severity::Critical,
                title: Some("cpu hot".into()),
                min_value: Some(90.0),
            }],
            ..Default::default()
        };
        let (handler, _, bus) = handler_with(config);
        let mut events = bus.subscribe();

        let result = run(
            &handler,
            vec![Batch::new(
                "b1",
                "sensors",
                vec![
                    Record::new("r1", "cpu", 50.0, ts(1)),
                    Record::new("r2", "cpu", 95.0, ts(2)),
                ],
            )],
        )
        .await;
        assert_eq!(result.accepted_count, 2);

        let BusMessage::Event(event) = events.recv().await else {
            panic!("expected a derived event");
        };
        assert_eq!(event.title, "cpu hot");
        assert_eq!(event.severity, Severity::Critical);
        assert_eq!(event.source, "sensors");
        assert_eq!(event.context.get("record_id").map(String::as_str), Some("r2"));
        assert_eq!(event.context.get("batch_id").map(String::as_str), Some("b1"));
    }

    /// Store that tracks how many writes run at once
    struct SlowStore {
        inner: MemoryStore,
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    impl MetricStore for SlowStore {
        async fn put(
            &self,
            metric_name: &str,
            record: &Record,
        ) -> Result<PutOutcome, ContractError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            self.inner.put(metric_name, record).await
        }

        async fn latest(
            &self,
            metric_name: &str,
            tag_filter: &Tags,
        ) -> Result<Option<Record>, ContractError> {
            self.inner.latest(metric_name, tag_filter).await
        }

        async fn range_query(
            &self,
            metric_name: &str,
            since: DateTime<Utc>,
        ) -> Result<Vec<Record>, ContractError> {
            self.inner.range_query(metric_name, since).await
        }

        async fn metric_names(&self) -> Result<Vec<String>, ContractError> {
            self.inner.metric_names().await
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_batches_bounded_by_semaphore() {
        let store = Arc::new(SlowStore {
            inner: MemoryStore::default(),
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let config = IngestConfig {
            max_concurrent_batches: 2,
            ..Default::default()
        };
        let handler = IngestHandler::new(config, Arc::clone(&store), Arc::new(BroadcastBus::new(4)));

        let batches = (0..8)
            .map(|i| Batch::new(format!("b{i}"), "p", vec![Record::new("r", format!("m{i}"), 1.0, ts(i))]))
            .collect();
        let result = run(&handler, batches).await;

        assert_eq!(result.accepted_count, 8);
        let peak = store.peak.load(Ordering::SeqCst);
        assert!(peak <= 2, "peak concurrency {peak} exceeded the limit");
        assert!(peak >= 1);
    }

    #[tokio::test]
    async fn test_accepted_records_are_archived() {
        let dir = tempfile::tempdir().unwrap();
        let archive = storage::FileArchive::new("archive", dir.path()).unwrap();
        let archive = Arc::new(ArchiveHandle::spawn(archive, 4));

        let store = Arc::new(MemoryStore::default());
        let handler = IngestHandler::with_archive(
            IngestConfig::default(),
            store,
            Arc::new(BroadcastBus::new(4)),
            Arc::clone(&archive),
        );

        run(
            &handler,
            vec![Batch::new(
                "b1",
                "p",
                vec![
                    Record::new("r1", "cpu", 1.0, ts(1)),
                    Record::new("r2", "cpu", "bad", ts(2)),
                ],
            )],
        )
        .await;
        drop(handler);

        let metrics = Arc::clone(archive.metrics());
        archive.shutdown().await;

        assert_eq!(metrics.batches_written(), 1);
        assert_eq!(metrics.records_written(), 1);
    }
}
