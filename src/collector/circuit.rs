//! Consecutive-failure circuit breaker

use serde::Serialize;

/// Blocks new runs after too many failed runs in a row
///
/// The breaker only counts whole runs (after retries are exhausted), not
/// individual attempts. Once open it stays open until [`CircuitBreaker::reset`].
#[derive(Debug, Clone, Serialize)]
pub struct CircuitBreaker {
    consecutive_failures: u32,
    threshold: u32,
}

impl CircuitBreaker {
    pub fn new(threshold: u32) -> Self {
        Self {
            consecutive_failures: 0,
            threshold: threshold.max(1),
        }
    }

    pub fn is_open(&self) -> bool {
        self.consecutive_failures >= self.threshold
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn set_threshold(&mut self, threshold: u32) {
        self.threshold = threshold.max(1);
    }

    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
    }

    /// Count a failed run; returns `true` if this failure opened the breaker
    pub fn record_failure(&mut self) -> bool {
        let was_open = self.is_open();
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        !was_open && self.is_open()
    }

    pub fn reset(&mut self) {
        self.consecutive_failures = 0;
    }
}
