//! Ordered, bounded conduit between the two endpoints of one stream direction.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use contracts::CloseReason;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Behaviour of `send` when the buffer is full
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Sender suspends until there is room (backpressure)
    Reliable,
    /// Sender never suspends; the oldest buffered message is displaced
    BestEffort,
}

/// Per-channel counters
#[derive(Debug, Default)]
pub struct ChannelStats {
    sent: AtomicU64,
    dropped: AtomicU64,
}

impl ChannelStats {
    /// Messages accepted into the buffer
    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    /// Messages displaced by best-effort sends
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Observed by the receiver once the buffer is drained after close
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("end of stream: {reason}")]
pub struct StreamEnd {
    pub reason: CloseReason,
}

/// Returned by `send` on a closed channel; hands the message back
pub struct SendError<T> {
    pub message: T,
    pub reason: CloseReason,
}

impl<T> SendError<T> {
    /// Recover the unsent message
    pub fn into_inner(self) -> T {
        self.message
    }
}

impl<T> fmt::Debug for SendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SendError")
            .field("reason", &self.reason)
            .finish_non_exhaustive()
    }
}

impl<T> fmt::Display for SendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stream closed: {}", self.reason)
    }
}

impl<T> std::error::Error for SendError<T> {}

struct Shared {
    delivery: Delivery,
    reason: OnceLock<CloseReason>,
    closed: CancellationToken,
    stats: ChannelStats,
}

impl Shared {
    /// Record the close reason (first one wins) and wake `closed()` waiters
    fn close(&self, reason: CloseReason) {
        if self.reason.set(reason).is_ok() {
            trace!(reason = %self.reason(), "stream channel closed");
        }
        self.closed.cancel();
    }

    fn reason(&self) -> CloseReason {
        self.reason.get().cloned().unwrap_or(CloseReason::Completed)
    }
}

/// Create a stream channel holding at most `capacity` buffered messages
pub fn channel<T>(capacity: usize, delivery: Delivery) -> (StreamSender<T>, StreamReceiver<T>) {
    let (tx, rx) = async_channel::bounded(capacity.max(1));
    let shared = Arc::new(Shared {
        delivery,
        reason: OnceLock::new(),
        closed: CancellationToken::new(),
        stats: ChannelStats::default(),
    });

    (
        StreamSender {
            tx,
            shared: Arc::clone(&shared),
        },
        StreamReceiver { rx, shared },
    )
}

/// Sending endpoint
///
/// Cloneable; dropping the last clone ends the stream with `completed`.
pub struct StreamSender<T> {
    tx: async_channel::Sender<T>,
    shared: Arc<Shared>,
}

impl<T> StreamSender<T> {
    /// Send one message
    ///
    /// Reliable channels suspend while the buffer is full; best-effort
    /// channels displace the oldest buffered message instead.
    pub async fn send(&self, message: T) -> Result<(), SendError<T>> {
        if self.shared.closed.is_cancelled() {
            return Err(self.send_error(message));
        }

        let result = match self.shared.delivery {
            Delivery::Reliable => self.tx.send(message).await.map_err(|e| e.into_inner()),
            Delivery::BestEffort => match self.tx.force_send(message) {
                Ok(Some(_displaced)) => {
                    self.shared.stats.dropped.fetch_add(1, Ordering::Relaxed);
                    trace!("best-effort send displaced oldest message");
                    Ok(())
                }
                Ok(None) => Ok(()),
                Err(e) => Err(e.into_inner()),
            },
        };

        match result {
            Ok(()) => {
                self.shared.stats.sent.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(message) => Err(self.send_error(message)),
        }
    }

    /// Close the stream; buffered messages are still delivered
    pub fn close(&self, reason: CloseReason) {
        self.shared.close(reason);
        self.tx.close();
    }

    /// Whether either endpoint closed the stream
    pub fn is_closed(&self) -> bool {
        self.shared.closed.is_cancelled() || self.tx.is_closed()
    }

    /// Resolves once the stream is closed, with the winning reason
    pub async fn closed(&self) -> CloseReason {
        self.shared.closed.cancelled().await;
        self.shared.reason()
    }

    /// Token cancelled when the stream closes
    pub fn closed_token(&self) -> CancellationToken {
        self.shared.closed.child_token()
    }

    /// Close reason, if closed
    pub fn close_reason(&self) -> Option<CloseReason> {
        self.is_closed().then(|| self.shared.reason())
    }

    /// Messages currently buffered
    pub fn len(&self) -> usize {
        self.tx.len()
    }

    /// Whether nothing is buffered
    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }

    pub fn delivery(&self) -> Delivery {
        self.shared.delivery
    }

    pub fn stats(&self) -> &ChannelStats {
        &self.shared.stats
    }

    fn send_error(&self, message: T) -> SendError<T> {
        SendError {
            message,
            reason: self.shared.reason(),
        }
    }
}

impl<T> Clone for StreamSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> Drop for StreamSender<T> {
    fn drop(&mut self) {
        if self.tx.sender_count() == 1 {
            self.shared.close(CloseReason::Completed);
            self.tx.close();
        }
    }
}

impl<T> fmt::Debug for StreamSender<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamSender")
            .field("delivery", &self.shared.delivery)
            .field("len", &self.tx.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Receiving endpoint
///
/// Dropping it ends the stream with `peer_gone`.
pub struct StreamReceiver<T> {
    rx: async_channel::Receiver<T>,
    shared: Arc<Shared>,
}

impl<T> StreamReceiver<T> {
    /// Next message, or end of stream once closed and drained
    pub async fn recv(&self) -> Result<T, StreamEnd> {
        match self.rx.recv().await {
            Ok(message) => Ok(message),
            Err(_) => Err(self.end()),
        }
    }

    /// Next message if one is buffered
    pub fn try_recv(&self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// Close the stream from the receiving side
    pub fn close(&self, reason: CloseReason) {
        self.shared.close(reason);
        self.rx.close();
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.is_cancelled() || self.rx.is_closed()
    }

    /// Resolves once the stream is closed, with the winning reason
    ///
    /// Buffered messages may still be pending; use `recv` to drain them.
    pub async fn closed(&self) -> CloseReason {
        self.shared.closed.cancelled().await;
        self.shared.reason()
    }

    /// Token cancelled when the stream closes
    pub fn closed_token(&self) -> CancellationToken {
        self.shared.closed.child_token()
    }

    /// Messages currently buffered
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn stats(&self) -> &ChannelStats {
        &self.shared.stats
    }

    fn end(&self) -> StreamEnd {
        // Senders may have raced each other on drop without recording a reason
        self.shared.close(CloseReason::Completed);
        StreamEnd {
            reason: self.shared.reason(),
        }
    }
}

impl<T> Drop for StreamReceiver<T> {
    fn drop(&mut self) {
        self.shared.close(CloseReason::PeerGone);
        self.rx.close();
    }
}

impl<T> fmt::Debug for StreamReceiver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamReceiver")
            .field("len", &self.rx.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}
