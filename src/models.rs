//! Core data structures for the collection engine
//!
//! Plain value types shared by collectors, the execution engine, the monitor
//! and the coordinator. Nothing here performs I/O.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

// ============================================================================
// Collection Status
// ============================================================================

/// Lifecycle state of a collector run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CollectionStatus {
    #[default]
    Idle,
    Running,
    Completed,
    Failed,
    Cancelled,
    Paused,
    Retrying,
}

impl CollectionStatus {
    /// Whether a run in this state has finished
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Paused => "paused",
            Self::Retrying => "retrying",
        }
    }
}

impl std::fmt::Display for CollectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Priority
// ============================================================================

/// Scheduling priority of a collector
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

// ============================================================================
// Collection Result
// ============================================================================

/// Success rate in percent; exactly `0.0` when nothing was attempted
pub fn success_rate(collected: u64, errors: u64) -> f64 {
    let total = collected + errors;
    if total == 0 {
        0.0
    } else {
        collected as f64 / total as f64 * 100.0
    }
}

/// Outcome of a single collection run
///
/// Created when a run starts, mutated only by the owning collector while the
/// run is in flight, and handed out as an owned value once it is terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionResult {
    pub source_name: String,
    pub status: CollectionStatus,
    pub collected_count: u64,
    /// Always equal to `errors.len()`; only [`CollectionResult::add_error`] touches either
    pub error_count: u64,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
    #[serde(default)]
    pub items: Vec<Value>,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub performance_metrics: HashMap<String, f64>,
}

impl CollectionResult {
    /// Create an empty result for a source, without timestamps
    pub fn new(source_name: impl Into<String>) -> Self {
        Self {
            source_name: source_name.into(),
            status: CollectionStatus::Idle,
            collected_count: 0,
            error_count: 0,
            start_time: None,
            end_time: None,
            error_message: None,
            metadata: HashMap::new(),
            items: Vec::new(),
            errors: Vec::new(),
            warnings: Vec::new(),
            performance_metrics: HashMap::new(),
        }
    }

    /// Create a result stamped with the current time as its start
    pub fn started(source_name: impl Into<String>) -> Self {
        let mut result = Self::new(source_name);
        result.start_time = Some(Utc::now());
        result.status = CollectionStatus::Running;
        result
    }

    /// Build an already-terminal result, used by guards that never start a run
    pub fn terminal(
        source_name: impl Into<String>,
        status: CollectionStatus,
        message: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        let mut result = Self::new(source_name);
        result.start_time = Some(now);
        result.end_time = Some(now);
        result.status = status;
        result.error_message = Some(message.into());
        result
    }

    /// Record an error message
    pub fn add_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
        self.error_count = self.errors.len() as u64;
    }

    /// Record a warning message
    pub fn add_warning(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    /// Store the items gathered by a successful attempt
    pub fn set_items(&mut self, items: Vec<Value>) {
        self.collected_count = items.len() as u64;
        self.items = items;
    }

    /// Move to a terminal status and stamp the end time
    pub fn finalize(&mut self, status: CollectionStatus) {
        self.status = status;
        self.end_time = Some(Utc::now());
        if let Some(secs) = self.duration_secs() {
            self.performance_metrics
                .insert("duration_secs".to_string(), secs);
        }
    }

    /// Wall-clock duration, only when both timestamps are present
    pub fn duration(&self) -> Option<Duration> {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => Some((end - start).to_std().unwrap_or(Duration::ZERO)),
            _ => None,
        }
    }

    pub fn duration_secs(&self) -> Option<f64> {
        self.duration().map(|d| d.as_secs_f64())
    }

    /// Percentage of items collected versus errors encountered
    pub fn success_rate(&self) -> f64 {
        success_rate(self.collected_count, self.error_count)
    }

    /// Throughput of the run, `0.0` when the duration is unknown or zero
    pub fn items_per_second(&self) -> f64 {
        match self.duration_secs() {
            Some(secs) if secs > 0.0 => self.collected_count as f64 / secs,
            _ => 0.0,
        }
    }

    /// Serializable view including the derived fields
    pub fn to_summary(&self) -> Value {
        serde_json::json!({
            "source_name": self.source_name,
            "status": self.status,
            "collected_count": self.collected_count,
            "error_count": self.error_count,
            "start_time": self.start_time,
            "end_time": self.end_time,
            "duration_secs": self.duration_secs(),
            "success_rate": self.success_rate(),
            "items_per_second": self.items_per_second(),
            "error_message": self.error_message,
            "warnings": self.warnings,
        })
    }
}

// ============================================================================
// Collector Configuration
// ============================================================================

/// Per-source configuration
///
/// Well-known knobs are typed fields; anything source-specific goes into
/// the open `settings` map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Whether the collector may run at all
    pub enabled: bool,

    /// Desired interval between scheduled runs, in seconds
    pub interval_secs: u64,

    /// Retries after the first failed attempt
    pub max_retries: u32,

    /// Timeout of a single gather attempt, in seconds
    pub timeout_secs: f64,

    /// Hint for sources that can fan out internally
    pub parallel_workers: usize,

    pub priority: Priority,

    /// Maximum gather attempts per second
    pub rate_limit: Option<f64>,

    /// Base backoff delay, in seconds; doubled for each further retry
    pub retry_delay_secs: f64,

    /// Consecutive failed runs that open the circuit breaker
    pub circuit_breaker_threshold: u32,

    /// Source-specific tuning
    pub settings: HashMap<String, Value>,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 3600,
            max_retries: 3,
            timeout_secs: 30.0,
            parallel_workers: 1,
            priority: Priority::Normal,
            rate_limit: None,
            retry_delay_secs: 5.0,
            circuit_breaker_threshold: 5,
            settings: HashMap::new(),
        }
    }
}

impl CollectorConfig {
    /// Get gather timeout as Duration
    pub fn timeout(&self) -> Duration {
        secs_to_duration(self.timeout_secs)
    }

    /// Get base retry delay as Duration
    pub fn retry_delay(&self) -> Duration {
        secs_to_duration(self.retry_delay_secs)
    }

    /// Get run interval as Duration
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Minimum spacing between attempt starts implied by `rate_limit`
    pub fn rate_limit_interval(&self) -> Option<Duration> {
        self.rate_limit
            .filter(|rate| *rate > 0.0)
            .map(|rate| secs_to_duration(1.0 / rate))
    }

    pub fn setting_str(&self, key: &str) -> Option<&str> {
        self.settings.get(key).and_then(Value::as_str)
    }

    pub fn setting_u64(&self, key: &str) -> Option<u64> {
        self.settings.get(key).and_then(Value::as_u64)
    }

    pub fn setting_bool(&self, key: &str) -> Option<bool> {
        self.settings.get(key).and_then(Value::as_bool)
    }

    /// Validate configuration values
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.timeout_secs <= 0.0 || Duration::try_from_secs_f64(self.timeout_secs).is_err() {
            return Err(crate::error::Error::config(
                "timeout_secs must be a positive, representable number of seconds",
            ));
        }
        if Duration::try_from_secs_f64(self.retry_delay_secs).is_err() {
            return Err(crate::error::Error::config(
                "retry_delay_secs must be a non-negative, representable number of seconds",
            ));
        }
        if self.circuit_breaker_threshold == 0 {
            return Err(crate::error::Error::config(
                "circuit_breaker_threshold must be greater than 0",
            ));
        }
        if let Some(rate) = self.rate_limit {
            if rate <= 0.0 || Duration::try_from_secs_f64(1.0 / rate).is_err() {
                return Err(crate::error::Error::config(
                    "rate_limit must be positive with a representable interval",
                ));
            }
        }
        Ok(())
    }
}

/// Seconds to Duration, clamping negatives and NaN to zero and overflow to `Duration::MAX`
fn secs_to_duration(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs.max(0.0)).unwrap_or(Duration::MAX)
}

// ============================================================================
// Collection Statistics
// ============================================================================

/// Running aggregate over many collection results
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollectionStats {
    pub total_runs: u64,
    pub successful_runs: u64,
    pub failed_runs: u64,
    pub cancelled_runs: u64,
    pub total_items: u64,
    pub total_errors: u64,
    pub average_duration_secs: f64,
    pub average_success_rate: f64,
    pub last_collection: Option<DateTime<Utc>>,
    /// Number of results that contributed to `average_duration_secs`
    #[serde(skip)]
    timed_runs: u64,
}

impl CollectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one result into the aggregate without revisiting history
    pub fn record(&mut self, result: &CollectionResult) {
        self.total_runs += 1;
        match result.status {
            CollectionStatus::Completed => self.successful_runs += 1,
            CollectionStatus::Failed => self.failed_runs += 1,
            CollectionStatus::Cancelled => self.cancelled_runs += 1,
            _ => {}
        }

        self.total_items += result.collected_count;
        self.total_errors += result.error_count;

        if let Some(secs) = result.duration_secs() {
            self.timed_runs += 1;
            self.average_duration_secs +=
                (secs - self.average_duration_secs) / self.timed_runs as f64;
        }

        self.average_success_rate +=
            (result.success_rate() - self.average_success_rate) / self.total_runs as f64;

        self.last_collection = result.end_time.or(result.start_time).or(Some(Utc::now()));
    }

    /// Overall run success rate in percent
    pub fn run_success_rate(&self) -> f64 {
        if self.total_runs == 0 {
            0.0
        } else {
            self.successful_runs as f64 / self.total_runs as f64 * 100.0
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
