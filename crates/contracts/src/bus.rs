//! EventBus trait - publish/subscribe bus interface
//!
//! Fan-out to all subscribers, at-most-once per subscriber, no persistence.

use std::future::Future;

use crate::{ContractError, Event};

/// What a bus subscriber observes next
#[derive(Debug, Clone, PartialEq)]
pub enum BusMessage {
    /// Next event in publish order
    Event(Event),
    /// Subscriber fell behind; this many events were skipped
    Lagged(u64),
    /// Bus shut down
    Closed,
}

/// Receiving half of a bus subscription
#[trait_variant::make(BusReceiver: Send)]
pub trait LocalBusReceiver {
    /// Wait for the next message
    async fn recv(&mut self) -> BusMessage;
}

/// Shared event bus
pub trait EventBus: Send + Sync + 'static {
    /// Subscription handle type
    type Receiver: BusReceiver + 'static;

    /// Publish an event to every current subscriber
    ///
    /// Returns the number of subscribers it was handed to.
    fn publish(&self, event: Event) -> impl Future<Output = Result<usize, ContractError>> + Send;

    /// Attach a new subscriber; it sees events published from now on
    fn subscribe(&self) -> Self::Receiver;

    /// Current number of attached subscribers
    fn subscriber_count(&self) -> usize;
}
