//! AlertFanout - broadcasts bus events to filtered subscribers

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use contracts::{
    AlertSubscription, AlertsConfig, BusMessage, BusReceiver, CloseReason, ContractError, Event,
    EventBus,
};
use stream_channel::{channel, CancellationToken, Delivery, StreamReceiver, StreamSender};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::metrics::SubscriberMetrics;

/// Event fan-out service
///
/// Every subscriber runs on its own task with its own bus cursor, so a
/// stalled subscriber only stalls itself.
pub struct AlertFanout<B> {
    bus: Arc<B>,
    config: AlertsConfig,
    shutdown: CancellationToken,
    active: Arc<AtomicUsize>,
}

impl<B> Clone for AlertFanout<B> {
    fn clone(&self) -> Self {
        Self {
            bus: Arc::clone(&self.bus),
            config: self.config.clone(),
            shutdown: self.shutdown.clone(),
            active: Arc::clone(&self.active),
        }
    }
}

/// Handle to one running subscriber
pub struct AlertSubscriberHandle {
    metrics: Arc<SubscriberMetrics>,
    task: JoinHandle<CloseReason>,
}

impl AlertSubscriberHandle {
    pub fn metrics(&self) -> &Arc<SubscriberMetrics> {
        &self.metrics
    }

    /// Wait for the subscriber task to end
    pub async fn finished(self) -> CloseReason {
        self.task
            .await
            .unwrap_or_else(|e| CloseReason::Error(format!("subscriber task failed: {e}")))
    }
}

impl<B: EventBus> AlertFanout<B> {
    pub fn new(bus: Arc<B>, config: AlertsConfig, shutdown: CancellationToken) -> Self {
        Self {
            bus,
            config,
            shutdown,
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Publish an event to every current subscriber
    pub async fn publish(&self, event: Event) -> Result<usize, ContractError> {
        self.bus.publish(event).await
    }

    /// Subscribers currently attached
    pub fn active_subscribers(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }

    /// Attach a subscriber that writes matching events into `out`
    ///
    /// The bus cursor is taken before this returns: every event published
    /// afterwards is considered for this subscriber.
    pub fn subscribe(
        &self,
        filter: AlertSubscription,
        out: StreamSender<Event>,
    ) -> AlertSubscriberHandle {
        let receiver = self.bus.subscribe();
        let metrics = Arc::new(SubscriberMetrics::new());

        let active = self.active.fetch_add(1, Ordering::Relaxed) + 1;
        observability::record_alert_subscribers(active);

        let task = {
            let fanout = self.clone();
            let metrics = Arc::clone(&metrics);
            tokio::spawn(async move {
                let reason = fanout.deliver(filter, receiver, out, &metrics).await;
                let active = fanout.active.fetch_sub(1, Ordering::Relaxed) - 1;
                observability::record_alert_subscribers(active);
                reason
            })
        };

        AlertSubscriberHandle { metrics, task }
    }

    /// `subscribe` with a fresh reliable channel of `subscriber_queue`
    pub fn open(&self, filter: AlertSubscription) -> (StreamReceiver<Event>, AlertSubscriberHandle) {
        let (tx, rx) = channel(self.config.subscriber_queue, Delivery::Reliable);
        let handle = self.subscribe(filter, tx);
        (rx, handle)
    }

    #[instrument(
        name = "alert_subscriber",
        skip_all,
        fields(severities = filter.severities.len(), sources = filter.sources.len())
    )]
    async fn deliver(
        &self,
        filter: AlertSubscription,
        mut receiver: B::Receiver,
        out: StreamSender<Event>,
        metrics: &SubscriberMetrics,
    ) -> CloseReason {
        debug!("alert subscriber attached");

        let reason = loop {
            let message = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break CloseReason::Shutdown,
                reason = out.closed() => break reason,
                message = receiver.recv() => message,
            };

            match message {
                BusMessage::Event(event) => {
                    if !filter.matches(&event) {
                        metrics.inc_filtered();
                        continue;
                    }
                    // Reliable send: waits for this subscriber only
                    let sent = tokio::select! {
                        biased;
                        _ = self.shutdown.cancelled() => break CloseReason::Shutdown,
                        sent = out.send(event) => sent,
                    };
                    if let Err(e) = sent {
                        break e.reason;
                    }
                    metrics.inc_delivered();
                    observability::record_alert_delivered();
                }
                BusMessage::Lagged(missed) => {
                    warn!(missed, "alert subscriber fell behind the bus, events skipped");
                    metrics.add_lagged(missed);
                    observability::record_alert_lagged(missed);
                }
                BusMessage::Closed => break CloseReason::Completed,
            }
        };

        out.close(reason.clone());
        info!(
            reason = %reason,
            delivered = metrics.delivered(),
            lagged = metrics.lagged(),
            "alert subscriber detached"
        );
        reason
    }
}
