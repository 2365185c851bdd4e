//! Attempt spacing backed by governor

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::num::NonZeroU32;
use std::time::Duration;

/// Enforces a minimum spacing between gather attempt starts
///
/// Burst size is one, so every attempt waits out whatever is left of the
/// interval since the previous attempt started.
pub struct AttemptRateLimiter {
    period: Duration,
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
}

impl AttemptRateLimiter {
    /// Build a limiter for `period` between attempts; `None` for a zero period
    pub fn new(period: Duration) -> Option<Self> {
        let quota = Quota::with_period(period)?.allow_burst(NonZeroU32::MIN);
        Some(Self {
            period,
            limiter: RateLimiter::direct(quota),
        })
    }

    /// Build a limiter from an ops/sec rate
    pub fn per_second(rate: f64) -> Option<Self> {
        if !(rate.is_finite() && rate > 0.0) {
            return None;
        }
        Self::new(Duration::from_secs_f64(1.0 / rate))
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Wait until the next attempt is allowed to start
    pub async fn wait(&self) {
        self.limiter.until_ready().await;
    }
}

impl std::fmt::Debug for AttemptRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttemptRateLimiter")
            .field("period", &self.period)
            .finish()
    }
}
