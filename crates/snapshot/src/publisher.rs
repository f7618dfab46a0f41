//! SnapshotPublisher - server-streaming live snapshots

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use contracts::{
    is_valid_metric_name, CloseReason, ContractError, MetricStore, Snapshot, SnapshotConfig,
    SnapshotValue, Subscription,
};
use stream_channel::{channel, CancellationToken, Delivery, StreamReceiver, StreamSender, Ticker};
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

/// Lifecycle of one snapshot subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublisherState {
    /// Subscription received, not yet validated
    Idle,
    /// Pushing snapshots on cadence
    Streaming,
    /// Stream ended
    Closed,
}

/// Clamp a requested cadence into `[min_ms, max_ms]`; `<= 0` means `min_ms`
pub fn clamp_cadence(requested_ms: i64, min_ms: u64, max_ms: u64) -> u64 {
    let max_ms = max_ms.max(min_ms);
    if requested_ms <= 0 {
        return min_ms;
    }
    (requested_ms as u64).clamp(min_ms, max_ms)
}

/// Live snapshot publisher
pub struct SnapshotPublisher<S> {
    store: Arc<S>,
    config: SnapshotConfig,
    shutdown: CancellationToken,
    active: Arc<AtomicUsize>,
}

impl<S> Clone for SnapshotPublisher<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            config: self.config.clone(),
            shutdown: self.shutdown.clone(),
            active: Arc::clone(&self.active),
        }
    }
}

/// Client side of one subscription
pub struct SnapshotSubscription {
    /// Snapshots in emission order
    pub stream: StreamReceiver<Snapshot>,
    state: watch::Receiver<PublisherState>,
}

impl SnapshotSubscription {
    pub fn state(&self) -> PublisherState {
        *self.state.borrow()
    }

    /// Wait until the publisher reports `target`
    pub async fn wait_for(&mut self, target: PublisherState) {
        // Sender dropping means the publisher task ended: treat as Closed
        let _ = self.state.wait_for(|s| *s == target).await;
    }
}

impl<S> SnapshotPublisher<S>
where
    S: MetricStore + Sync + 'static,
{
    /// `shutdown` ends every subscription with `CloseReason::Shutdown`
    pub fn new(config: SnapshotConfig, store: Arc<S>, shutdown: CancellationToken) -> Self {
        Self {
            store,
            config,
            shutdown,
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Effective cadence for a requested value
    pub fn effective_cadence_ms(&self, requested_ms: i64) -> u64 {
        clamp_cadence(
            requested_ms,
            self.config.min_cadence_ms,
            self.config.max_cadence_ms,
        )
    }

    /// Number of subscriptions currently streaming
    pub fn active_subscriptions(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }

    /// Start a subscription on its own task
    ///
    /// The returned stream is best-effort: a slow reader sees the newest
    /// snapshots and loses older ones.
    pub fn subscribe(&self, subscription: Subscription) -> SnapshotSubscription {
        let (tx, rx) = channel(self.config.channel_capacity, Delivery::BestEffort);
        let (state_tx, state_rx) = watch::channel(PublisherState::Idle);

        let publisher = self.clone();
        tokio::spawn(async move {
            publisher.stream(subscription, tx, state_tx).await;
        });

        SnapshotSubscription {
            stream: rx,
            state: state_rx,
        }
    }

    /// Drive one subscription until the peer leaves or the server shuts down
    #[instrument(
        name = "snapshot_stream",
        skip_all,
        fields(metrics = subscription.metric_names.len(), cadence_ms = subscription.cadence_ms)
    )]
    pub async fn stream(
        &self,
        subscription: Subscription,
        out: StreamSender<Snapshot>,
        state: watch::Sender<PublisherState>,
    ) -> CloseReason {
        if let Some(bad) = subscription
            .metric_names
            .iter()
            .find(|name| !is_valid_metric_name(name))
        {
            let reason = CloseReason::Rejected(format!("invalid metric name '{bad}'"));
            warn!(metric = %bad, "snapshot subscription rejected");
            out.close(reason.clone());
            state.send_replace(PublisherState::Closed);
            return reason;
        }

        let cadence_ms = self.effective_cadence_ms(subscription.cadence_ms);
        let mut ticker = Ticker::new(Duration::from_millis(cadence_ms));
        let mut next_id: u64 = 1;

        self.active.fetch_add(1, Ordering::Relaxed);
        state.send_replace(PublisherState::Streaming);
        debug!(cadence_ms, "snapshot subscription streaming");

        let reason = loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    out.close(CloseReason::Shutdown);
                    break CloseReason::Shutdown;
                }
                reason = out.closed() => break reason,
                _ = ticker.tick() => {
                    let values = match self.collect(&subscription).await {
                        Ok(values) => values,
                        Err(e) => {
                            warn!(error = %e, snapshot_id = next_id, "snapshot query failed, skipping tick");
                            observability::record_snapshot_tick_skipped();
                            continue;
                        }
                    };

                    let count = values.len();
                    let snapshot = Snapshot {
                        snapshot_id: next_id,
                        values,
                        cadence_ms,
                    };
                    if let Err(e) = out.send(snapshot).await {
                        break e.reason;
                    }
                    next_id += 1;
                    observability::record_snapshot_sent(count);
                }
            }
        };

        self.active.fetch_sub(1, Ordering::Relaxed);
        state.send_replace(PublisherState::Closed);
        info!(reason = %reason, sent = next_id - 1, "snapshot subscription closed");
        reason
    }

    /// Latest matching value of every subscribed metric
    ///
    /// Each metric is read on its own; the snapshot is not a single atomic
    /// read across metrics.
    async fn collect(&self, subscription: &Subscription) -> Result<Vec<SnapshotValue>, ContractError> {
        let names: Vec<String> = if subscription.metric_names.is_empty() {
            self.store.metric_names().await?
        } else {
            subscription.metric_names.iter().cloned().collect()
        };

        let mut values = Vec::with_capacity(names.len());
        for metric_name in names {
            let latest = self.store.latest(&metric_name, &subscription.filters).await?;
            if let Some(record) = latest {
                if let Some(value) = record.value.as_f64() {
                    values.push(SnapshotValue {
                        metric_name,
                        value,
                        timestamp: record.timestamp,
                    });
                }
            }
        }
        Ok(values)
    }
}
