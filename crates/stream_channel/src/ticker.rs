//! Cancellable fixed-cadence timer

use std::time::Duration;

use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Smallest period a ticker accepts
const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Fixed-cadence ticker
///
/// Missed ticks are skipped rather than fired in a burst.
#[derive(Debug)]
pub struct Ticker {
    interval: Interval,
}

impl Ticker {
    /// Ticker whose first tick completes immediately
    pub fn new(period: Duration) -> Self {
        Self::starting_at(Instant::now(), period)
    }

    /// Ticker whose first tick completes after one period
    pub fn delayed(period: Duration) -> Self {
        let period = period.max(MIN_PERIOD);
        Self::starting_at(Instant::now() + period, period)
    }

    fn starting_at(start: Instant, period: Duration) -> Self {
        let mut interval = time::interval_at(start, period.max(MIN_PERIOD));
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Self { interval }
    }

    pub fn period(&self) -> Duration {
        self.interval.period()
    }

    /// Wait for the next tick
    pub async fn tick(&mut self) -> Instant {
        self.interval.tick().await
    }

    /// Wait for the next tick, or `None` as soon as `cancel` fires
    pub async fn tick_until(&mut self, cancel: &CancellationToken) -> Option<Instant> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            at = self.interval.tick() => Some(at),
        }
    }

    /// Restart the period from now
    pub fn reset(&mut self) {
        self.interval.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_first_tick_is_immediate() {
        let mut ticker = Ticker::new(Duration::from_secs(60));
        let started = Instant::now();
        ticker.tick().await;
        assert!(started.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_tick_until_observes_cancel() {
        let mut ticker = Ticker::delayed(Duration::from_secs(60));
        let cancel = CancellationToken::new();

        let handle = {
            let cancel = cancel.clone();
            tokio::spawn(async move { ticker.tick_until(&cancel).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        cancel.cancel();

        let result = time::timeout(Duration::from_millis(200), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_zero_period_is_clamped() {
        let ticker = Ticker::new(Duration::ZERO);
        assert_eq!(ticker.period(), MIN_PERIOD);
    }
}
