//! Bounded-concurrency execution of many collectors
//!
//! The engine drives collector runs cooperatively on the calling task: a
//! batch is a `join_all` over gated futures, so runs interleave at their
//! await points without being spawned onto other threads. A counting
//! semaphore limits how many collectors are inside `collect()` at once;
//! the rest wait at the gate.
//!
//! Every result, from batches and single runs alike, lands in a bounded
//! [`ResultHistory`] and is folded into running [`CollectionStats`].

pub mod history;

use futures::future::join_all;
use futures::FutureExt;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{RwLock, Semaphore};
use tracing::{debug, error, info};

use crate::collector::Collector;
use crate::metrics;
use crate::models::{CollectionResult, CollectionStats, CollectionStatus};
use crate::utils::panic_message;

pub use history::{ResultHistory, DEFAULT_HISTORY_SIZE};

/// Default number of collectors allowed inside `collect()` at once
pub const DEFAULT_MAX_CONCURRENT: usize = 3;

/// Number of trailing results used for trend metrics
pub const TREND_WINDOW: usize = 10;

// ============================================================================
// Reports
// ============================================================================

/// Aggregates for one collector, computed from retained history
#[derive(Debug, Clone, Default, Serialize)]
pub struct CollectorPerformance {
    pub runs: u64,
    pub successes: u64,
    pub failures: u64,
    pub cancellations: u64,
    pub total_items: u64,
    pub average_duration_secs: f64,
    pub last_status: Option<CollectionStatus>,
}

/// Engine-wide performance report
#[derive(Debug, Clone, Serialize)]
pub struct PerformanceReport {
    pub stats: CollectionStats,
    pub run_success_rate: f64,
    pub success_rate_trend: Vec<f64>,
    pub throughput_trend: Vec<f64>,
    pub recent_average_success_rate: f64,
    pub recent_average_throughput: f64,
    pub per_collector: BTreeMap<String, CollectorPerformance>,
    pub history_size: usize,
    pub history_capacity: usize,
    pub max_concurrent: usize,
    pub active_collections: usize,
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

// ============================================================================
// Execution Engine
// ============================================================================

/// Runs collectors behind a shared concurrency gate
pub struct ExecutionEngine {
    gate: Semaphore,
    max_concurrent: AtomicUsize,
    /// Permits still to be retired after a shrink, taken as runs finish
    shrink_debt: Mutex<usize>,
    active: Arc<AtomicUsize>,
    history: RwLock<ResultHistory>,
    stats: RwLock<CollectionStats>,
}

impl Default for ExecutionEngine {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONCURRENT, DEFAULT_HISTORY_SIZE)
    }
}

/// Keeps the active-collection gauge honest even if a run unwinds
struct ActiveGuard(Arc<AtomicUsize>);

impl ActiveGuard {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        let now = counter.fetch_add(1, Ordering::SeqCst) + 1;
        metrics::set_running_collectors(now);
        Self(Arc::clone(counter))
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        let now = self.0.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
        metrics::set_running_collectors(now);
    }
}

impl ExecutionEngine {
    /// Create an engine with the given gate size and history capacity
    pub fn new(max_concurrent: usize, history_size: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            gate: Semaphore::new(max_concurrent),
            max_concurrent: AtomicUsize::new(max_concurrent),
            shrink_debt: Mutex::new(0),
            active: Arc::new(AtomicUsize::new(0)),
            history: RwLock::new(ResultHistory::new(history_size)),
            stats: RwLock::new(CollectionStats::new()),
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent.load(Ordering::SeqCst)
    }

    /// Resize the gate in place
    ///
    /// Growing releases new permits at once. Shrinking retires idle permits
    /// immediately and the rest as in-flight runs finish, so the number of
    /// running collectors never exceeds the limit in force.
    pub fn set_max_concurrent(&self, max_concurrent: usize) {
        let max_concurrent = max_concurrent.max(1);
        let mut debt = self.lock_debt();
        let previous = self.max_concurrent.swap(max_concurrent, Ordering::SeqCst);

        if max_concurrent > previous {
            let grow = max_concurrent - previous;
            let repaid = grow.min(*debt);
            *debt -= repaid;
            self.gate.add_permits(grow - repaid);
        } else if max_concurrent < previous {
            let shrink = previous - max_concurrent;
            let retired = self.gate.forget_permits(shrink);
            *debt += shrink - retired;
        }
        drop(debt);

        info!(max_concurrent = max_concurrent, "Concurrency limit updated");
    }

    fn lock_debt(&self) -> std::sync::MutexGuard<'_, usize> {
        self.shrink_debt
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Hand a finished run's permit back, or retire it if a shrink is pending
    fn release(&self, permit: tokio::sync::SemaphorePermit<'_>) {
        let mut debt = self.lock_debt();
        if *debt > 0 {
            *debt -= 1;
            permit.forget();
        }
    }

    /// Collectors currently inside their gated run
    pub fn active_collections(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Run every enabled collector, at most `max_concurrent` at a time
    ///
    /// Returns an empty map, without side effects, when collection is
    /// globally disabled or there is nothing to run.
    pub async fn execute_all(
        &self,
        collectors: &[Arc<Collector>],
        global_enabled: bool,
    ) -> HashMap<String, CollectionResult> {
        if !global_enabled {
            debug!("Global collection disabled, skipping batch");
            return HashMap::new();
        }

        let enabled: Vec<&Arc<Collector>> = collectors
            .iter()
            .filter(|c| c.config().enabled)
            .collect();

        if enabled.is_empty() {
            return HashMap::new();
        }

        info!(
            collectors = enabled.len(),
            max_concurrent = self.max_concurrent(),
            "Starting batch collection"
        );

        let runs = enabled
            .iter()
            .map(|collector| self.run_gated(collector));
        let results = join_all(runs).await;

        let mut by_name = HashMap::with_capacity(results.len());
        for result in results {
            self.record(&result).await;
            by_name.insert(result.source_name.clone(), result);
        }

        let completed = by_name
            .values()
            .filter(|r| r.status == CollectionStatus::Completed)
            .count();
        info!(
            total = by_name.len(),
            completed = completed,
            "Batch collection finished"
        );

        by_name
    }

    /// Run one collector through the same gate
    pub async fn execute_single(&self, collector: &Arc<Collector>) -> CollectionResult {
        let result = self.run_gated(collector).await;
        self.record(&result).await;
        result
    }

    /// Acquire a permit and run, containing anything that escapes `collect()`
    async fn run_gated(&self, collector: &Collector) -> CollectionResult {
        let permit = match self.gate.acquire().await {
            Ok(permit) => permit,
            Err(_) => {
                return CollectionResult::terminal(
                    collector.name(),
                    CollectionStatus::Failed,
                    "Execution gate closed",
                )
            }
        };
        let active = ActiveGuard::enter(&self.active);

        let mut result = match AssertUnwindSafe(collector.collect()).catch_unwind().await {
            Ok(result) => result,
            Err(payload) => {
                let message = format!(
                    "Unhandled error in collector: {}",
                    panic_message(payload.as_ref())
                );
                error!(collector = %collector.name(), error = %message, "Collector escaped its envelope");
                let mut result = CollectionResult::terminal(
                    collector.name(),
                    CollectionStatus::Failed,
                    message.clone(),
                );
                result.add_error(message);
                result
            }
        };

        drop(active);
        self.release(permit);

        result.source_name = collector.name().to_string();
        result
    }

    async fn record(&self, result: &CollectionResult) {
        self.stats.write().await.record(result);
        self.history.write().await.push(result.clone());
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    pub async fn stats(&self) -> CollectionStats {
        self.stats.read().await.clone()
    }

    /// The last `n` results, oldest first
    pub async fn recent_results(&self, n: usize) -> Vec<CollectionResult> {
        self.history.read().await.recent(n)
    }

    pub async fn history_for(&self, name: &str) -> Vec<CollectionResult> {
        self.history.read().await.for_collector(name)
    }

    pub async fn history_len(&self) -> usize {
        self.history.read().await.len()
    }

    /// Failed results among the last `n`
    pub async fn recent_failures(&self, n: usize) -> usize {
        self.history.read().await.recent_failures(n)
    }

    pub async fn set_history_capacity(&self, capacity: usize) {
        self.history.write().await.set_capacity(capacity);
    }

    pub async fn performance_report(&self) -> PerformanceReport {
        let stats = self.stats().await;
        let history = self.history.read().await;

        let success_rate_trend = history.success_rate_trend(TREND_WINDOW);
        let throughput_trend = history.throughput_trend(TREND_WINDOW);

        let mut per_collector: BTreeMap<String, CollectorPerformance> = BTreeMap::new();
        let mut timed: HashMap<&str, u64> = HashMap::new();
        for result in history.iter() {
            let entry = per_collector.entry(result.source_name.clone()).or_default();
            entry.runs += 1;
            entry.total_items += result.collected_count;
            entry.last_status = Some(result.status);
            match result.status {
                CollectionStatus::Completed => entry.successes += 1,
                CollectionStatus::Failed => entry.failures += 1,
                CollectionStatus::Cancelled => entry.cancellations += 1,
                _ => {}
            }
            if let Some(secs) = result.duration_secs() {
                let n = timed.entry(result.source_name.as_str()).or_insert(0);
                *n += 1;
                entry.average_duration_secs += (secs - entry.average_duration_secs) / *n as f64;
            }
        }

        PerformanceReport {
            run_success_rate: stats.run_success_rate(),
            recent_average_success_rate: mean(&success_rate_trend),
            recent_average_throughput: mean(&throughput_trend),
            success_rate_trend,
            throughput_trend,
            per_collector,
            history_size: history.len(),
            history_capacity: history.capacity(),
            max_concurrent: self.max_concurrent(),
            active_collections: self.active_collections(),
            stats,
        }
    }

    /// Clear history and statistics
    pub async fn reset(&self) {
        self.history.write().await.clear();
        self.stats.write().await.reset();
        info!("Execution engine statistics reset");
    }
}
