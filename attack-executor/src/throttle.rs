use std::time::Duration;
use tokio::time::{interval, Instant, Interval, MissedTickBehavior};

/// Hands out one permit per interval, the first one immediately.
///
/// When the consumer falls behind, the missed permits are handed out back to back so the
/// long run average stays at the configured rate.
pub struct Throttle {
    interval: Interval,
}

impl Throttle {
    pub fn new(period: Duration) -> Self {
        let mut interval = interval(period.max(Duration::from_nanos(1)));
        interval.set_missed_tick_behavior(MissedTickBehavior::Burst);
        Throttle { interval }
    }

    pub fn period(&self) -> Duration {
        self.interval.period()
    }

    /// Wait for the next permit, returning its scheduled time
    pub async fn permit(&mut self) -> Instant {
        self.interval.tick().await
    }
}
