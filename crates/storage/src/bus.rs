//! BroadcastBus - in-process publish/subscribe bus
//!
//! Backed by `tokio::sync::broadcast`: every subscriber sees every event
//! published after it subscribed, at most once. A subscriber that falls more
//! than `capacity` events behind skips the overflow and is told how many it
//! missed.

use contracts::{BusMessage, BusReceiver, ContractError, Event, EventBus};
use tokio::sync::broadcast;
use tracing::trace;

/// In-process `EventBus`
#[derive(Debug, Clone)]
pub struct BroadcastBus {
    tx: broadcast::Sender<Event>,
}

impl BroadcastBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }
}

impl EventBus for BroadcastBus {
    type Receiver = BroadcastReceiver;

    async fn publish(&self, event: Event) -> Result<usize, ContractError> {
        // No subscribers is not a failure; the event simply has no audience
        let delivered = self.tx.send(event).unwrap_or(0);
        trace!(subscribers = delivered, "event published");
        Ok(delivered)
    }

    fn subscribe(&self) -> Self::Receiver {
        BroadcastReceiver {
            rx: self.tx.subscribe(),
        }
    }

    fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// Subscription to a `BroadcastBus`
#[derive(Debug)]
pub struct BroadcastReceiver {
    rx: broadcast::Receiver<Event>,
}

impl BusReceiver for BroadcastReceiver {
    async fn recv(&mut self) -> BusMessage {
        match self.rx.recv().await {
            Ok(event) => BusMessage::Event(event),
            Err(broadcast::error::RecvError::Lagged(missed)) => BusMessage::Lagged(missed),
            Err(broadcast::error::RecvError::Closed) => BusMessage::Closed,
        }
    }
}
