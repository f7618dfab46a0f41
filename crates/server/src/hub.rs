//! StreamHub - composition root of the streaming services
//!
//! Owns the store, the bus, the four services, the connection registry and
//! the shutdown token. Transports (the WebSocket layer, tests) call the four
//! operations here and never touch the services directly.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use contracts::{
    AlertSubscription, Batch, CollabMessage, ContractError, Event, IngestResult, ServiceConfig,
    Subscription,
};
use fanout::{AlertFanout, AlertSubscriberHandle};
use ingestion::{IngestHandler, MetricsSnapshot};
use observability::{IngestStatsAggregator, IngestSummary};
use serde::Serialize;
use session::{SessionError, SessionMultiplexer};
use snapshot::{SnapshotPublisher, SnapshotSubscription};
use storage::{ArchiveHandle, BroadcastBus, FileArchive, MemoryStore};
use stream_channel::{CancellationToken, StreamReceiver};
use tracing::{info, instrument, warn};

use crate::error::ServerError;
use crate::registry::{ConnectionRegistry, StreamKind};

/// Serving state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Serving,
    Draining,
}

/// `GET /health` body
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub uptime_secs: u64,
    pub connections: BTreeMap<StreamKind, usize>,
    pub total_connections: usize,
    pub max_connections: usize,
    pub active_sessions: usize,
    pub session_participants: usize,
    pub snapshot_subscriptions: usize,
    pub alert_subscribers: usize,
    pub ingest_calls: u64,
    pub records_accepted: u64,
    pub records_rejected: u64,
}

struct HubInner {
    config: ServiceConfig,
    store: Arc<MemoryStore>,
    ingest: IngestHandler<MemoryStore, BroadcastBus>,
    snapshots: SnapshotPublisher<MemoryStore>,
    sessions: SessionMultiplexer,
    alerts: AlertFanout<BroadcastBus>,
    registry: Arc<ConnectionRegistry>,
    archive: Option<Arc<ArchiveHandle>>,
    stats: Mutex<IngestStatsAggregator>,
    shutdown: CancellationToken,
    started: Instant,
}

/// Shared handle to the running services
#[derive(Clone)]
pub struct StreamHub {
    inner: Arc<HubInner>,
}

impl StreamHub {
    /// Build every service from configuration
    ///
    /// Must be called inside a tokio runtime; the archive worker is spawned
    /// here when archiving is enabled.
    pub fn new(config: ServiceConfig) -> Result<Self, ServerError> {
        let store = Arc::new(MemoryStore::new(&config.store));
        let bus = Arc::new(BroadcastBus::new(config.alerts.bus_capacity));
        Self::with_parts(config, store, bus)
    }

    /// Build around an existing store and bus
    pub fn with_parts(
        config: ServiceConfig,
        store: Arc<MemoryStore>,
        bus: Arc<BroadcastBus>,
    ) -> Result<Self, ServerError> {
        let shutdown = CancellationToken::new();

        let archive = if config.archive.enabled {
            let sink = FileArchive::new("archive", &config.archive.path).map_err(|source| {
                ServerError::Archive {
                    path: config.archive.path.display().to_string(),
                    source,
                }
            })?;
            Some(Arc::new(ArchiveHandle::spawn(
                sink,
                config.archive.queue_capacity,
            )))
        } else {
            None
        };

        let ingest = match &archive {
            Some(archive) => IngestHandler::with_archive(
                config.ingest.clone(),
                Arc::clone(&store),
                Arc::clone(&bus),
                Arc::clone(archive),
            ),
            None => IngestHandler::new(config.ingest.clone(), Arc::clone(&store), Arc::clone(&bus)),
        };
        let snapshots =
            SnapshotPublisher::new(config.snapshot.clone(), Arc::clone(&store), shutdown.clone());
        let sessions = SessionMultiplexer::new(config.session.clone(), shutdown.clone());
        let alerts = AlertFanout::new(Arc::clone(&bus), config.alerts.clone(), shutdown.clone());
        let registry = Arc::new(ConnectionRegistry::new(config.server.max_connections));

        Ok(Self {
            inner: Arc::new(HubInner {
                config,
                store,
                ingest,
                snapshots,
                sessions,
                alerts,
                registry,
                archive,
                stats: Mutex::new(IngestStatsAggregator::new()),
                shutdown,
                started: Instant::now(),
            }),
        })
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.inner.store
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.inner.registry
    }

    /// Token cancelled when shutdown begins
    pub fn shutdown_token(&self) -> CancellationToken {
        self.inner.shutdown.clone()
    }

    pub fn is_draining(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    /// Client-streaming ingestion; one result when `inbound` ends
    pub async fn ingest(&self, inbound: StreamReceiver<Batch>) -> IngestResult {
        let started = Instant::now();
        let result = self.inner.ingest.ingest(inbound).await;
        let elapsed_ms = started.elapsed().as_secs_f64() * 1_000.0;
        self.stats().update(&result, elapsed_ms);
        result
    }

    /// Server-streaming live snapshots
    pub fn subscribe_snapshots(&self, subscription: Subscription) -> SnapshotSubscription {
        self.inner.snapshots.subscribe(subscription)
    }

    /// Bidirectional collaboration session
    pub async fn join_session(
        &self,
        session_id: &str,
        participant_id: &str,
        inbound: StreamReceiver<CollabMessage>,
    ) -> Result<StreamReceiver<CollabMessage>, SessionError> {
        self.inner
            .sessions
            .join(session_id, participant_id, inbound)
            .await
    }

    /// Server-streaming alerts
    pub fn subscribe_alerts(
        &self,
        filter: AlertSubscription,
    ) -> (StreamReceiver<Event>, AlertSubscriberHandle) {
        self.inner.alerts.open(filter)
    }

    /// Publish an event on the shared bus
    pub async fn publish_event(&self, event: Event) -> Result<usize, ContractError> {
        self.inner.alerts.publish(event).await
    }

    pub fn sessions(&self) -> &SessionMultiplexer {
        &self.inner.sessions
    }

    pub fn ingest_metrics(&self) -> MetricsSnapshot {
        self.inner.ingest.metrics().snapshot()
    }

    /// Totals and call latency over every ingestion call so far
    pub fn ingest_summary(&self) -> IngestSummary {
        self.stats().summary()
    }

    pub fn health(&self) -> HealthReport {
        let ingest = self.ingest_metrics();
        HealthReport {
            status: if self.is_draining() {
                HealthStatus::Draining
            } else {
                HealthStatus::Serving
            },
            uptime_secs: self.inner.started.elapsed().as_secs(),
            connections: self.inner.registry.count_by_kind(),
            total_connections: self.inner.registry.active(),
            max_connections: self.inner.registry.max_connections(),
            active_sessions: self.inner.sessions.session_count(),
            session_participants: self.inner.sessions.participant_count(),
            snapshot_subscriptions: self.inner.snapshots.active_subscriptions(),
            alert_subscribers: self.inner.alerts.active_subscribers(),
            ingest_calls: ingest.calls,
            records_accepted: ingest.records_accepted,
            records_rejected: ingest.records_rejected,
        }
    }

    /// Begin shutdown: every open stream closes with `shutdown`
    pub fn shutdown(&self) {
        if !self.inner.shutdown.is_cancelled() {
            info!("shutdown requested, draining streams");
            self.inner.shutdown.cancel();
        }
    }

    /// Wait for open connections to finish, then flush the archive
    ///
    /// Gives up waiting after `shutdown_grace_ms`.
    #[instrument(name = "hub_drain", skip(self))]
    pub async fn drain(&self) {
        self.shutdown();

        let grace = Duration::from_millis(self.inner.config.server.shutdown_grace_ms);
        let deadline = tokio::time::Instant::now() + grace;
        while self.inner.registry.active() > 0 {
            if tokio::time::Instant::now() >= deadline {
                warn!(
                    open = self.inner.registry.active(),
                    "grace period elapsed with connections still open"
                );
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        if let Some(archive) = &self.inner.archive {
            archive.shutdown().await;
        }
        info!("streams drained");
    }

    fn stats(&self) -> MutexGuard<'_, IngestStatsAggregator> {
        self.inner.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use contracts::{CloseReason, Record, Severity};
    use stream_channel::{channel, Delivery};
    use tokio::time::timeout;

    fn hub() -> StreamHub {
        StreamHub::new(ServiceConfig::default()).unwrap()
    }

    async fn ingest(hub: &StreamHub, batches: Vec<Batch>) -> IngestResult {
        let (tx, rx) = channel(4, Delivery::Reliable);
        tokio::spawn(async move {
            for batch in batches {
                tx.send(batch).await.unwrap();
            }
        });
        hub.ingest(rx).await
    }

    #[tokio::test]
    async fn test_ingest_then_snapshot() {
        let hub = hub();
        let result = ingest(
            &hub,
            vec![Batch::new(
                "b1",
                "probe",
                vec![Record::new("r1", "cpu", 0.75, Utc::now())],
            )],
        )
        .await;
        assert_eq!(result.accepted_count, 1);

        let sub = hub.subscribe_snapshots(Subscription::for_metrics(["cpu"], 0));
        let snapshot = timeout(Duration::from_secs(1), sub.stream.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(snapshot.values[0].value, 0.75);

        let summary = hub.ingest_summary();
        assert_eq!(summary.total_calls, 1);
        assert_eq!(summary.total_accepted, 1);
    }

    #[tokio::test]
    async fn test_alerts_through_hub() {
        let hub = hub();
        let (rx, _handle) = hub.subscribe_alerts(AlertSubscription::default());

        hub.publish_event(Event::new("e1", "disk full", Severity::Critical, "node-1"))
            .await
            .unwrap();
        let event = timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.id, "e1");
        assert_eq!(hub.health().alert_subscribers, 1);
    }

    #[tokio::test]
    async fn test_shutdown_reports_draining_and_closes_streams() {
        let hub = hub();
        let (_tx, inbound) = channel(4, Delivery::Reliable);
        let out = hub.join_session("room1", "A", inbound).await.unwrap();
        assert_eq!(hub.health().status, HealthStatus::Serving);
        assert_eq!(hub.health().active_sessions, 1);

        hub.drain().await;
        assert_eq!(hub.health().status, HealthStatus::Draining);

        let end = loop {
            match timeout(Duration::from_secs(1), out.recv()).await.unwrap() {
                Ok(_) => continue,
                Err(end) => break end,
            }
        };
        assert_eq!(end.reason, CloseReason::Shutdown);
    }

    #[tokio::test]
    async fn test_archive_flushed_on_drain() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ServiceConfig::default();
        config.archive.enabled = true;
        config.archive.path = dir.path().to_path_buf();
        let hub = StreamHub::new(config).unwrap();

        ingest(
            &hub,
            vec![Batch::new(
                "b1",
                "probe",
                vec![Record::new("r1", "cpu", 1.0, Utc::now())],
            )],
        )
        .await;
        hub.drain().await;

        let day_dirs: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(day_dirs.len(), 1);
        let files: Vec<_> = std::fs::read_dir(day_dirs[0].as_ref().unwrap().path())
            .unwrap()
            .collect();
        assert_eq!(files.len(), 1);
    }
}
