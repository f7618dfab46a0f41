//! ArchiveHandle - runs an archive sink behind an isolated queue and worker task

use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument, warn};

use contracts::{ArchiveBatch, ArchiveSink};

use crate::metrics::ArchiveMetrics;

/// Handle to a running archive worker
///
/// Ingestion hands batches over with `try_send`; a slow or failing archive
/// never stalls the ingestion path, it only drops batches. The handle is
/// shared, so `shutdown` works through `&self`.
pub struct ArchiveHandle {
    name: String,
    tx: mpsc::Sender<ArchiveBatch>,
    metrics: Arc<ArchiveMetrics>,
    stop: CancellationToken,
    worker_handle: Mutex<Option<JoinHandle<()>>>,
}

impl ArchiveHandle {
    /// Spawn the worker task for `sink`
    pub fn spawn<S: ArchiveSink + Send + 'static>(sink: S, queue_capacity: usize) -> Self {
        let name = sink.name().to_string();
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let metrics = Arc::new(ArchiveMetrics::new());
        let stop = CancellationToken::new();

        let worker_metrics = Arc::clone(&metrics);
        let worker_name = name.clone();
        let worker_stop = stop.clone();

        let worker_handle = tokio::spawn(async move {
            archive_worker(sink, rx, worker_stop, worker_metrics, worker_name).await;
        });

        Self {
            name,
            tx,
            metrics,
            stop,
            worker_handle: Mutex::new(Some(worker_handle)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn metrics(&self) -> &Arc<ArchiveMetrics> {
        &self.metrics
    }

    /// Queue a batch for archival (non-blocking)
    ///
    /// Returns false if the queue is full and the batch was dropped.
    pub fn try_send(&self, batch: ArchiveBatch) -> bool {
        match self.tx.try_send(batch) {
            Ok(()) => {
                self.metrics
                    .set_queue_len(self.tx.max_capacity() - self.tx.capacity());
                true
            }
            Err(mpsc::error::TrySendError::Full(b)) => {
                self.metrics.inc_dropped_count();
                warn!(
                    archive = %self.name,
                    batch_id = %b.batch_id,
                    "Queue full, batch dropped"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                error!(archive = %self.name, "Archive worker closed unexpectedly");
                false
            }
        }
    }

    /// Drain the queue, flush and close the sink
    #[instrument(name = "archive_handle_shutdown", skip(self))]
    pub async fn shutdown(&self) {
        self.stop.cancel();
        let worker = self
            .worker_handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(worker) = worker else {
            return;
        };
        if let Err(e) = worker.await {
            error!(archive = %self.name, error = ?e, "Worker task panicked");
        }
        debug!(archive = %self.name, "ArchiveHandle shutdown complete");
    }
}

#[instrument(
    name = "archive_worker_loop",
    skip(sink, rx, stop, metrics),
    fields(archive = %name)
)]
async fn archive_worker<S: ArchiveSink>(
    mut sink: S,
    mut rx: mpsc::Receiver<ArchiveBatch>,
    stop: CancellationToken,
    metrics: Arc<ArchiveMetrics>,
    name: String,
) {
    debug!(archive = %name, "Archive worker started");

    loop {
        let next = tokio::select! {
            biased;
            batch = rx.recv() => batch,
            // 停止后不再接收新批次，但排空已入队的
            _ = stop.cancelled() => {
                rx.close();
                rx.recv().await
            }
        };
        let Some(batch) = next else {
            break;
        };
        metrics.set_queue_len(rx.len());

        match sink.write_batch(&batch).await {
            Ok(()) => metrics.record_write(batch.records.len()),
            Err(e) => {
                metrics.inc_failure_count();
                error!(
                    archive = %name,
                    batch_id = %batch.batch_id,
                    error = %e,
                    "Write failed"
                );
            }
        }
    }

    if let Err(e) = sink.flush().await {
        error!(archive = %name, error = %e, "Flush failed on shutdown");
    }
    if let Err(e) = sink.close().await {
        error!(archive = %name, error = %e, "Close failed on shutdown");
    }

    debug!(archive = %name, "Archive worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use contracts::{ContractError, Record};
    use std::sync::atomic::{AtomicU64, Ordering};
    use tokio::time::{sleep, Duration};

    struct MockArchive {
        name: String,
        write_count: Arc<AtomicU64>,
        closed: Arc<AtomicU64>,
        should_fail: bool,
        delay_ms: u64,
    }

    impl MockArchive {
        fn new(name: &str) -> Self {
            Self {
                name: name.to_string(),
                write_count: Arc::new(AtomicU64::new(0)),
                closed: Arc::new(AtomicU64::new(0)),
                should_fail: false,
                delay_ms: 0,
            }
        }
    }

    impl ArchiveSink for MockArchive {
        fn name(&self) -> &str {
            &self.name
        }

        async fn write_batch(&mut self, _batch: &ArchiveBatch) -> Result<(), ContractError> {
            if self.delay_ms > 0 {
                sleep(Duration::from_millis(self.delay_ms)).await;
            }
            if self.should_fail {
                return Err(ContractError::transient_io("archive write", "mock failure"));
            }
            self.write_count.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }

        async fn flush(&mut self) -> Result<(), ContractError> {
            Ok(())
        }

        async fn close(&mut self) -> Result<(), ContractError> {
            self.closed.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }
    }

    fn batch(i: u64) -> ArchiveBatch {
        ArchiveBatch {
            batch_id: format!("b{i}"),
            source: "test".into(),
            archived_at: Utc::now(),
            records: vec![Record::new(format!("r{i}"), "cpu", i as f64, Utc::now())],
        }
    }

    #[tokio::test]
    async fn test_archive_handle_drains_on_shutdown() {
        let sink = MockArchive::new("test");
        let write_count = Arc::clone(&sink.write_count);
        let closed = Arc::clone(&sink.closed);

        let handle = ArchiveHandle::spawn(sink, 10);
        for i in 0..5 {
            assert!(handle.try_send(batch(i)));
        }
        let metrics = Arc::clone(handle.metrics());

        handle.shutdown().await;
        assert_eq!(write_count.load(Ordering::Relaxed), 5);
        assert_eq!(closed.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.records_written(), 5);
    }

    #[tokio::test]
    async fn test_archive_handle_queue_full() {
        let mut sink = MockArchive::new("slow");
        sink.delay_ms = 100;

        let handle = ArchiveHandle::spawn(sink, 2);
        for i in 0..10 {
            handle.try_send(batch(i));
        }

        assert!(handle.metrics().dropped_count() > 0);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_archive_handle_failure_isolation() {
        let mut sink = MockArchive::new("failing");
        sink.should_fail = true;

        let handle = ArchiveHandle::spawn(sink, 10);
        for i in 0..3 {
            handle.try_send(batch(i));
        }

        sleep(Duration::from_millis(50)).await;
        assert_eq!(handle.metrics().failure_count(), 3);

        handle.shutdown().await;
    }
}
