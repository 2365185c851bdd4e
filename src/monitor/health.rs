//! Health scoring and recommendations

use serde::{Deserialize, Serialize};

use crate::collector::CollectorHealth;
use crate::models::{CollectionResult, CollectionStatus};

/// Weight of the healthy-collector fraction in the score
const COLLECTOR_WEIGHT: f64 = 70.0;

/// Weight of the recent success rate in the score
const SUCCESS_WEIGHT: f64 = 30.0;

/// Overall health label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthLabel {
    Healthy,
    Warning,
    Critical,
}

impl HealthLabel {
    /// Map a 0-100 score onto a label
    pub fn from_score(score: f64) -> Self {
        if score >= 80.0 {
            Self::Healthy
        } else if score >= 60.0 {
            Self::Warning
        } else {
            Self::Critical
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }
}

impl std::fmt::Display for HealthLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Thresholds used by the assessor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthThresholds {
    /// Minimum per-collector run success rate, in percent
    pub min_success_rate: f64,

    /// Consecutive failed runs at which a collector counts as unhealthy
    pub max_consecutive_failures: u32,

    /// Average run duration above which a recommendation is issued
    pub max_avg_duration_secs: f64,

    /// Failures among the last `failure_window` results that trigger a recommendation
    pub failure_alert_threshold: usize,

    /// Results considered for the system success rate
    pub health_window: usize,

    /// Results considered for the failure recommendation
    pub failure_window: usize,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            min_success_rate: 80.0,
            max_consecutive_failures: 3,
            max_avg_duration_secs: 300.0,
            failure_alert_threshold: 3,
            health_window: 20,
            failure_window: 10,
        }
    }
}

/// Assessed health of the whole system
#[derive(Debug, Clone, Serialize)]
pub struct SystemHealth {
    pub status: HealthLabel,
    pub score: f64,
    pub healthy_collectors: usize,
    pub total_collectors: usize,
    /// Completed over finished runs within the health window, in percent
    pub recent_success_rate: f64,
    pub sample_size: usize,
}

/// Per-collector verdict
#[derive(Debug, Clone, Serialize)]
pub struct CollectorCheck {
    pub name: String,
    pub healthy: bool,
    pub issues: Vec<String>,
}

/// Computes health labels, scores and recommendations
#[derive(Debug, Clone, Default)]
pub struct HealthAssessor {
    thresholds: HealthThresholds,
}

impl HealthAssessor {
    pub fn new(thresholds: HealthThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &HealthThresholds {
        &self.thresholds
    }

    pub fn set_thresholds(&mut self, thresholds: HealthThresholds) {
        self.thresholds = thresholds;
    }

    /// Breaker closed and below the consecutive-failure limit
    pub fn is_collector_healthy(&self, health: &CollectorHealth) -> bool {
        !health.circuit_breaker_open
            && health.consecutive_failures < self.thresholds.max_consecutive_failures
    }

    pub fn check_collector(&self, health: &CollectorHealth) -> CollectorCheck {
        let mut issues = Vec::new();

        if health.circuit_breaker_open {
            issues.push("Circuit breaker is open".to_string());
        }
        if health.consecutive_failures >= self.thresholds.max_consecutive_failures {
            issues.push(format!(
                "Too many consecutive failures: {}",
                health.consecutive_failures
            ));
        }
        let finished = health.successful_executions + health.failed_executions;
        if finished > 0 && health.success_rate < self.thresholds.min_success_rate {
            issues.push(format!(
                "Low success rate: {:.1}% (minimum {:.1}%)",
                health.success_rate, self.thresholds.min_success_rate
            ));
        }

        CollectorCheck {
            name: health.name.clone(),
            healthy: issues.is_empty(),
            issues,
        }
    }

    /// Score the system from collector snapshots and recent results
    ///
    /// An empty collector set or an empty result window counts as fully
    /// healthy for that component.
    pub fn assess(&self, collectors: &[CollectorHealth], recent: &[CollectionResult]) -> SystemHealth {
        let total_collectors = collectors.len();
        let healthy_collectors = collectors
            .iter()
            .filter(|c| self.is_collector_healthy(c))
            .count();
        let collector_fraction = if total_collectors == 0 {
            1.0
        } else {
            healthy_collectors as f64 / total_collectors as f64
        };

        let skip = recent.len().saturating_sub(self.thresholds.health_window);
        let window = &recent[skip..];
        let completed = window
            .iter()
            .filter(|r| r.status == CollectionStatus::Completed)
            .count();
        let failed = window
            .iter()
            .filter(|r| r.status == CollectionStatus::Failed)
            .count();
        let recent_success_rate = if completed + failed == 0 {
            100.0
        } else {
            completed as f64 / (completed + failed) as f64 * 100.0
        };

        let score = COLLECTOR_WEIGHT * collector_fraction
            + SUCCESS_WEIGHT * (recent_success_rate / 100.0);
        let score = (score * 10.0).round() / 10.0;

        SystemHealth {
            status: HealthLabel::from_score(score),
            score,
            healthy_collectors,
            total_collectors,
            recent_success_rate,
            sample_size: window.len(),
        }
    }

    /// Free-text operator recommendations
    pub fn recommendations(
        &self,
        collectors: &[CollectorHealth],
        recent_failures: usize,
        average_duration_secs: f64,
    ) -> Vec<String> {
        let mut recommendations = Vec::new();

        let disabled: Vec<&str> = collectors
            .iter()
            .filter(|c| !c.enabled)
            .map(|c| c.name.as_str())
            .collect();
        if !disabled.is_empty() {
            recommendations.push(format!(
                "Consider enabling disabled collectors: {}",
                disabled.join(", ")
            ));
        }

        let unhealthy: Vec<&str> = collectors
            .iter()
            .filter(|c| !self.is_collector_healthy(c))
            .map(|c| c.name.as_str())
            .collect();
        if !unhealthy.is_empty() {
            recommendations.push(format!(
                "Investigate unhealthy collectors and reset their circuit breakers once fixed: {}",
                unhealthy.join(", ")
            ));
        }

        if recent_failures >= self.thresholds.failure_alert_threshold {
            recommendations.push(format!(
                "High failure count: {} of the last {} collections failed; check feed availability and credentials",
                recent_failures, self.thresholds.failure_window
            ));
        }

        if average_duration_secs > self.thresholds.max_avg_duration_secs {
            recommendations.push(format!(
                "Average collection time {:.1}s exceeds {:.1}s; consider raising timeouts or lowering concurrency",
                average_duration_secs, self.thresholds.max_avg_duration_secs
            ));
        }

        recommendations
    }
}
