//! The shared collector state machine

use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::Serialize;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::circuit::CircuitBreaker;
use super::rate_limit::AttemptRateLimiter;
use super::{GatherContext, Source};
use crate::error::{Result, SourceError};
use crate::metrics;
use crate::models::{success_rate, CollectionResult, CollectionStatus, CollectorConfig, Priority};
use crate::utils::panic_message;
use crate::utils::retry::RetryPolicy;

/// How often a paused run re-checks its pause and cancel flags
pub const PAUSE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Upper bound on a single backoff sleep
const MAX_RETRY_DELAY: Duration = Duration::from_secs(300);

// ============================================================================
// Health Snapshot
// ============================================================================

/// Point-in-time view of a collector, safe to hand across the API boundary
#[derive(Debug, Clone, Serialize)]
pub struct CollectorHealth {
    pub name: String,
    pub source_type: String,
    pub status: CollectionStatus,
    pub enabled: bool,
    pub priority: Priority,
    pub is_running: bool,
    pub is_paused: bool,
    pub total_executions: u64,
    pub successful_executions: u64,
    pub failed_executions: u64,
    pub consecutive_failures: u32,
    pub circuit_breaker_threshold: u32,
    pub circuit_breaker_open: bool,
    /// Successful runs over finished (completed + failed) runs, in percent
    pub success_rate: f64,
    pub total_items_collected: u64,
    pub last_run: Option<DateTime<Utc>>,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

// ============================================================================
// Collector
// ============================================================================

/// Mutable bookkeeping, never held across an await point
#[derive(Debug)]
struct CollectorState {
    status: CollectionStatus,
    total_executions: u64,
    successful_executions: u64,
    failed_executions: u64,
    total_items: u64,
    breaker: CircuitBreaker,
    last_run: Option<DateTime<Utc>>,
    last_success: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

impl CollectorState {
    fn new(breaker_threshold: u32) -> Self {
        Self {
            status: CollectionStatus::Idle,
            total_executions: 0,
            successful_executions: 0,
            failed_executions: 0,
            total_items: 0,
            breaker: CircuitBreaker::new(breaker_threshold),
            last_run: None,
            last_success: None,
            last_error: None,
        }
    }
}

/// Execution envelope around one [`Source`]
pub struct Collector {
    name: String,
    source: Box<dyn Source>,
    config: RwLock<CollectorConfig>,
    state: Mutex<CollectorState>,
    limiter: Mutex<Option<Arc<AttemptRateLimiter>>>,
    running: AtomicBool,
    paused: AtomicBool,
    cancel_tx: watch::Sender<bool>,
}

/// Clears the per-run flags however the run ends
struct RunGuard<'a> {
    collector: &'a Collector,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.collector.paused.store(false, Ordering::SeqCst);
        self.collector.cancel_tx.send_replace(false);
        self.collector.running.store(false, Ordering::SeqCst);
    }
}

impl Collector {
    /// Create a collector for a source
    pub fn new(name: impl Into<String>, source: Box<dyn Source>, config: CollectorConfig) -> Self {
        let (cancel_tx, _) = watch::channel(false);
        let threshold = config.circuit_breaker_threshold;
        Self {
            name: name.into(),
            source,
            config: RwLock::new(config),
            state: Mutex::new(CollectorState::new(threshold)),
            limiter: Mutex::new(None),
            running: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            cancel_tx,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source_type(&self) -> &str {
        self.source.source_type()
    }

    /// Snapshot of the current configuration
    pub fn config(&self) -> CollectorConfig {
        self.config
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn status(&self) -> CollectionStatus {
        self.lock_state().status
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn is_circuit_open(&self) -> bool {
        self.lock_state().breaker.is_open()
    }

    fn lock_state(&self) -> MutexGuard<'_, CollectorState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_status(&self, status: CollectionStatus) {
        self.lock_state().status = status;
    }

    fn cancel_requested(&self) -> bool {
        *self.cancel_tx.borrow()
    }

    // ------------------------------------------------------------------------
    // Control signals
    // ------------------------------------------------------------------------

    /// Ask the in-flight run to stop at its next checkpoint
    ///
    /// Returns `false` when no run is in flight.
    pub fn cancel(&self) -> bool {
        if !self.is_running() {
            return false;
        }
        info!(collector = %self.name, "Cancellation requested");
        self.cancel_tx.send_replace(true);
        true
    }

    /// Hold the in-flight run at its next checkpoint until resumed
    pub fn pause(&self) -> bool {
        if !self.is_running() {
            return false;
        }
        info!(collector = %self.name, "Pause requested");
        self.paused.store(true, Ordering::SeqCst);
        true
    }

    pub fn resume(&self) -> bool {
        let was_paused = self.paused.swap(false, Ordering::SeqCst);
        if was_paused {
            info!(collector = %self.name, "Resumed");
        }
        was_paused
    }

    // ------------------------------------------------------------------------
    // Configuration and statistics
    // ------------------------------------------------------------------------

    /// Replace the configuration; an in-flight run keeps its snapshot
    pub fn update_config(&self, config: CollectorConfig) -> Result<()> {
        config.validate()?;

        self.lock_state()
            .breaker
            .set_threshold(config.circuit_breaker_threshold);
        *self
            .config
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = config;

        debug!(collector = %self.name, "Configuration updated");
        Ok(())
    }

    /// Flip only the enabled flag
    pub fn set_enabled(&self, enabled: bool) {
        self.config
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .enabled = enabled;
    }

    pub fn reset_circuit_breaker(&self) {
        self.lock_state().breaker.reset();
        metrics::set_circuit_open(&self.name, false);
        info!(collector = %self.name, "Circuit breaker reset");
    }

    /// Zero all counters and close the breaker
    pub fn reset_statistics(&self) {
        let threshold = self.config().circuit_breaker_threshold;
        let mut state = self.lock_state();
        let status = state.status;
        *state = CollectorState::new(threshold);
        state.status = status;
        drop(state);
        metrics::set_circuit_open(&self.name, false);
    }

    pub fn health_check(&self) -> CollectorHealth {
        let config = self.config();
        let state = self.lock_state();
        CollectorHealth {
            name: self.name.clone(),
            source_type: self.source.source_type().to_string(),
            status: state.status,
            enabled: config.enabled,
            priority: config.priority,
            is_running: self.is_running(),
            is_paused: self.is_paused(),
            total_executions: state.total_executions,
            successful_executions: state.successful_executions,
            failed_executions: state.failed_executions,
            consecutive_failures: state.breaker.consecutive_failures(),
            circuit_breaker_threshold: state.breaker.threshold(),
            circuit_breaker_open: state.breaker.is_open(),
            success_rate: success_rate(state.successful_executions, state.failed_executions),
            total_items_collected: state.total_items,
            last_run: state.last_run,
            last_success: state.last_success,
            last_error: state.last_error.clone(),
        }
    }

    // ------------------------------------------------------------------------
    // Collection
    // ------------------------------------------------------------------------

    /// Run the source once through the full envelope
    ///
    /// Always returns a terminal result. Errors and panics from the source
    /// become `Failed` results.
    pub async fn collect(&self) -> CollectionResult {
        let config = self.config();

        if !config.enabled {
            debug!(collector = %self.name, "Skipping disabled collector");
            return CollectionResult::terminal(
                &self.name,
                CollectionStatus::Cancelled,
                "Collector is disabled",
            );
        }

        if self.is_running() {
            warn!(collector = %self.name, "Collection already in progress");
            return CollectionResult::terminal(
                &self.name,
                CollectionStatus::Failed,
                "Collection already in progress",
            );
        }

        {
            let mut state = self.lock_state();
            if state.breaker.is_open() {
                // Counted as an execution; the breaker counter stays put
                state.total_executions += 1;
                let consecutive = state.breaker.consecutive_failures();
                drop(state);
                warn!(
                    collector = %self.name,
                    consecutive_failures = consecutive,
                    "Circuit breaker open, skipping collection"
                );
                return CollectionResult::terminal(
                    &self.name,
                    CollectionStatus::Failed,
                    format!("Circuit breaker open after {consecutive} consecutive failures"),
                );
            }
        }

        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return CollectionResult::terminal(
                &self.name,
                CollectionStatus::Failed,
                "Collection already in progress",
            );
        }
        let _guard = RunGuard { collector: self };
        // Drop signals that landed after the previous run had finished
        self.cancel_tx.send_replace(false);
        self.paused.store(false, Ordering::SeqCst);

        self.set_status(CollectionStatus::Running);
        info!(collector = %self.name, source_type = %self.source_type(), "Collection started");

        let started = CollectionResult::started(&self.name);
        let result = match AssertUnwindSafe(self.run_attempts(&config, started.clone()))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(payload) => {
                let message = format!("Collector panicked: {}", panic_message(payload.as_ref()));
                error!(collector = %self.name, error = %message, "Collection aborted");
                let mut result = started;
                result.add_error(message.clone());
                result.error_message = Some(message);
                result.finalize(CollectionStatus::Failed);
                result
            }
        };

        self.record_outcome(&result);
        result
    }

    /// The retry loop; returns once the run reached a terminal state
    async fn run_attempts(
        &self,
        config: &CollectorConfig,
        mut result: CollectionResult,
    ) -> CollectionResult {
        result.metadata.insert(
            "source_type".to_string(),
            self.source.source_type().into(),
        );
        result
            .metadata
            .insert("priority".to_string(), config.priority.as_str().into());

        let policy = RetryPolicy::new(config.retry_delay()).with_max_delay(MAX_RETRY_DELAY);
        let limiter = self.limiter_for(config);
        let mut attempt: u32 = 0;

        loop {
            if let Some(limiter) = &limiter {
                limiter.wait().await;
            }

            self.wait_while_paused().await;

            if self.cancel_requested() {
                return self.finish_cancelled(result, attempt);
            }

            attempt += 1;
            self.set_status(CollectionStatus::Running);
            let ctx = GatherContext {
                collector_name: self.name.clone(),
                config: config.clone(),
                attempt,
            };

            debug!(collector = %self.name, attempt = attempt, "Gather attempt");
            let attempt_start = Instant::now();
            let outcome = tokio::time::timeout(config.timeout(), self.source.gather(&ctx)).await;

            let err = match outcome {
                Ok(Ok(items)) => {
                    let gather_secs = attempt_start.elapsed().as_secs_f64();
                    result.set_items(items);
                    result.finalize(CollectionStatus::Completed);
                    result
                        .performance_metrics
                        .insert("attempts".to_string(), f64::from(attempt));
                    result
                        .performance_metrics
                        .insert("gather_secs".to_string(), gather_secs);
                    let throughput = result.items_per_second();
                    result
                        .performance_metrics
                        .insert("items_per_second".to_string(), throughput);
                    info!(
                        collector = %self.name,
                        items = result.collected_count,
                        attempts = attempt,
                        "Collection completed"
                    );
                    return result;
                }
                Ok(Err(err)) => err,
                Err(_) => SourceError::Timeout,
            };

            // A cancel that raced this attempt wins over counting it as a failure
            if self.cancel_requested() {
                return self.finish_cancelled(result, attempt);
            }

            let message = err.to_string();
            result.add_error(format!("Attempt {attempt}: {message}"));

            if attempt > config.max_retries {
                error!(
                    collector = %self.name,
                    attempts = attempt,
                    error = %message,
                    "Collection failed"
                );
                result
                    .performance_metrics
                    .insert("attempts".to_string(), f64::from(attempt));
                result.error_message = Some(message);
                result.finalize(CollectionStatus::Failed);
                return result;
            }

            let delay = policy.delay_for(attempt);
            warn!(
                collector = %self.name,
                attempt = attempt,
                max_retries = config.max_retries,
                delay_ms = delay.as_millis() as u64,
                recoverable = err.is_recoverable(),
                error = %message,
                "Attempt failed, retrying after delay"
            );
            self.set_status(CollectionStatus::Retrying);
            self.sleep_unless_cancelled(delay).await;

            if self.cancel_requested() {
                return self.finish_cancelled(result, attempt);
            }
        }
    }

    fn finish_cancelled(&self, mut result: CollectionResult, attempts: u32) -> CollectionResult {
        info!(collector = %self.name, attempts = attempts, "Collection cancelled");
        result
            .performance_metrics
            .insert("attempts".to_string(), f64::from(attempts));
        result.error_message = Some("Collection cancelled".to_string());
        result.finalize(CollectionStatus::Cancelled);
        result
    }

    /// Block while paused, polling until resumed or cancelled
    async fn wait_while_paused(&self) {
        if !self.is_paused() {
            return;
        }

        self.set_status(CollectionStatus::Paused);
        info!(collector = %self.name, "Collection paused");
        while self.is_paused() && !self.cancel_requested() {
            tokio::time::sleep(PAUSE_POLL_INTERVAL).await;
        }
        self.set_status(CollectionStatus::Running);
    }

    /// Backoff sleep that wakes early when cancel is requested
    async fn sleep_unless_cancelled(&self, delay: Duration) {
        let mut cancel_rx = self.cancel_tx.subscribe();
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = cancel_rx.wait_for(|cancelled| *cancelled) => {}
        }
    }

    /// Reuse the limiter while the configured rate stays the same
    fn limiter_for(&self, config: &CollectorConfig) -> Option<Arc<AttemptRateLimiter>> {
        let mut slot = self
            .limiter
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let Some(period) = config.rate_limit_interval() else {
            *slot = None;
            return None;
        };

        match slot.as_ref() {
            Some(existing) if existing.period() == period => Some(Arc::clone(existing)),
            _ => {
                let limiter = AttemptRateLimiter::new(period).map(Arc::new);
                slot.clone_from(&limiter);
                limiter
            }
        }
    }

    fn record_outcome(&self, result: &CollectionResult) {
        let mut state = self.lock_state();
        state.status = result.status;
        state.total_executions += 1;
        state.last_run = result.end_time;

        match result.status {
            CollectionStatus::Completed => {
                state.successful_executions += 1;
                state.total_items += result.collected_count;
                state.last_success = result.end_time;
                state.breaker.record_success();
            }
            CollectionStatus::Failed => {
                state.failed_executions += 1;
                state.last_error = result.error_message.clone();
                if state.breaker.record_failure() {
                    warn!(
                        collector = %self.name,
                        threshold = state.breaker.threshold(),
                        "Circuit breaker opened"
                    );
                }
            }
            _ => {}
        }

        let breaker_open = state.breaker.is_open();
        drop(state);

        metrics::record_collection(
            &self.name,
            result.status.as_str(),
            result.collected_count,
            result.duration_secs(),
        );
        metrics::set_circuit_open(&self.name, breaker_open);
    }
}

impl std::fmt::Debug for Collector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collector")
            .field("name", &self.name)
            .field("source_type", &self.source.source_type())
            .field("running", &self.is_running())
            .finish()
    }
}
