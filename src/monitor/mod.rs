//! Health assessment and alerting for collection runs
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────┐
//! │           CollectionMonitor                │
//! │  - Observes every collection result        │
//! │  - Builds the detailed status report       │
//! └────────────────────────────────────────────┘
//!           │                      │
//!           ▼                      ▼
//!   ┌───────────────┐     ┌────────────────┐
//!   │ HealthAssessor│     │  AlertManager  │
//!   │ score, labels │     │ bounded log,   │
//!   │ recommendations│    │ active window  │
//!   └───────────────┘     └────────────────┘
//! ```

pub mod alerts;
pub mod health;
pub mod resources;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use crate::collector::CollectorHealth;
use crate::models::{CollectionResult, CollectionStatus, CollectorConfig};
use crate::utils::truncate_text;

pub use alerts::{Alert, AlertLevel, AlertManager, AlertSummary};
pub use health::{CollectorCheck, HealthAssessor, HealthLabel, HealthThresholds, SystemHealth};
pub use resources::{ResourceSampler, ResourceUsage};

/// Results shown in the recent-activity slice of a status report
pub const RECENT_ACTIVITY_LEN: usize = 10;

/// Longest error text copied into an alert message
const MAX_ALERT_ERROR_LEN: usize = 200;

/// Per-collector section of the detailed status
#[derive(Debug, Clone, Serialize)]
pub struct CollectorDetail {
    #[serde(flatten)]
    pub health: CollectorHealth,
    pub healthy: bool,
    pub issues: Vec<String>,
    pub config: CollectorConfig,
}

/// Full status report handed to the API layer
#[derive(Debug, Clone, Serialize)]
pub struct DetailedStatus {
    pub timestamp: DateTime<Utc>,
    pub global_enabled: bool,
    pub concurrent_collections: usize,
    pub collectors: BTreeMap<String, CollectorDetail>,
    pub recent_activity: Vec<Value>,
    pub system_health: SystemHealth,
    pub resource_usage: ResourceUsage,
    pub active_alerts: Vec<Alert>,
    pub alert_summary: AlertSummary,
    pub recommendations: Vec<String>,
}

/// Everything the monitor needs from the coordinator to build a report
#[derive(Debug, Clone)]
pub struct StatusSnapshot {
    pub global_enabled: bool,
    pub concurrent_collections: usize,
    pub collectors: Vec<(CollectorHealth, CollectorConfig)>,
    /// Most recent results, oldest first
    pub recent_results: Vec<CollectionResult>,
    pub average_duration_secs: f64,
}

/// Observes collection results and reports on system health
#[derive(Debug, Default)]
pub struct CollectionMonitor {
    assessor: RwLock<HealthAssessor>,
    alerts: RwLock<AlertManager>,
    resources: ResourceSampler,
}

impl CollectionMonitor {
    pub fn new(thresholds: HealthThresholds) -> Self {
        Self {
            assessor: RwLock::new(HealthAssessor::new(thresholds)),
            alerts: RwLock::new(AlertManager::new()),
            resources: ResourceSampler::new(),
        }
    }

    /// Monitor with a custom alert retention policy
    pub fn with_retention(
        thresholds: HealthThresholds,
        max_alerts: usize,
        active_window: Duration,
    ) -> Self {
        let mut alerts = AlertManager::new();
        alerts.configure(max_alerts, active_window);
        Self {
            assessor: RwLock::new(HealthAssessor::new(thresholds)),
            alerts: RwLock::new(alerts),
            resources: ResourceSampler::new(),
        }
    }

    pub async fn thresholds(&self) -> HealthThresholds {
        self.assessor.read().await.thresholds().clone()
    }

    pub async fn set_thresholds(&self, thresholds: HealthThresholds) {
        self.assessor.write().await.set_thresholds(thresholds);
    }

    /// Results the monitor wants to see when building a report
    pub async fn window_size(&self) -> usize {
        let assessor = self.assessor.read().await;
        let thresholds = assessor.thresholds();
        thresholds
            .health_window
            .max(thresholds.failure_window)
            .max(RECENT_ACTIVITY_LEN)
    }

    /// Raise alerts for a finished run
    ///
    /// `health` is the collector's snapshot taken after the run.
    pub async fn record_result(&self, result: &CollectionResult, health: &CollectorHealth) {
        let check = self.assessor.read().await.check_collector(health);
        let mut alerts = self.alerts.write().await;
        let collector = Some(result.source_name.as_str());

        match result.status {
            CollectionStatus::Failed if result.error_count == 0 => {
                // Guard rejection: nothing was attempted
                let reason = result.error_message.as_deref().unwrap_or("rejected");
                alerts.add_alert(
                    AlertLevel::Warning,
                    format!("Collection skipped: {reason}"),
                    collector,
                );
            }
            CollectionStatus::Failed => {
                let reason = result.error_message.as_deref().unwrap_or("unknown error");
                alerts.add_alert(
                    AlertLevel::Error,
                    format!(
                        "Collection failed: {}",
                        truncate_text(reason, MAX_ALERT_ERROR_LEN)
                    ),
                    collector,
                );
                if health.circuit_breaker_open
                    && health.consecutive_failures == health.circuit_breaker_threshold
                {
                    alerts.add_alert(
                        AlertLevel::Critical,
                        format!(
                            "Circuit breaker opened after {} consecutive failures",
                            health.consecutive_failures
                        ),
                        collector,
                    );
                }
            }
            CollectionStatus::Completed if !check.healthy => {
                alerts.add_alert(
                    AlertLevel::Warning,
                    format!("Collector degraded: {}", check.issues.join("; ")),
                    collector,
                );
            }
            _ => {}
        }
    }

    /// Log an alert directly
    pub async fn add_alert(&self, level: AlertLevel, message: &str, collector: Option<&str>) -> Alert {
        self.alerts.write().await.add_alert(level, message, collector)
    }

    pub async fn active_alerts(&self) -> Vec<Alert> {
        self.alerts.read().await.active_alerts()
    }

    pub async fn alerts_by_level(&self, level: AlertLevel) -> Vec<Alert> {
        self.alerts.read().await.alerts_by_level(level)
    }

    pub async fn alerts_for_collector(&self, collector: &str) -> Vec<Alert> {
        self.alerts.read().await.alerts_for_collector(collector)
    }

    pub async fn alert_summary(&self) -> AlertSummary {
        self.alerts.read().await.summary()
    }

    pub async fn clear_alerts(&self, collector: Option<&str>) -> usize {
        let mut alerts = self.alerts.write().await;
        match collector {
            Some(name) => alerts.clear_collector(name),
            None => {
                let cleared = alerts.len();
                alerts.clear();
                cleared
            }
        }
    }

    /// Change alert retention; trims immediately
    pub async fn configure_alerts(&self, max_alerts: usize, active_window: Duration) {
        self.alerts.write().await.configure(max_alerts, active_window);
    }

    pub async fn detailed_status(&self, snapshot: StatusSnapshot) -> DetailedStatus {
        let assessor = self.assessor.read().await.clone();
        let thresholds = assessor.thresholds();

        let healths: Vec<CollectorHealth> =
            snapshot.collectors.iter().map(|(h, _)| h.clone()).collect();
        let system_health = assessor.assess(&healths, &snapshot.recent_results);

        let failure_skip = snapshot
            .recent_results
            .len()
            .saturating_sub(thresholds.failure_window);
        let recent_failures = snapshot.recent_results[failure_skip..]
            .iter()
            .filter(|r| r.status == CollectionStatus::Failed)
            .count();
        let recommendations =
            assessor.recommendations(&healths, recent_failures, snapshot.average_duration_secs);

        let running = healths.iter().filter(|h| h.is_running).count();
        let resource_usage = self.resources.usage(running, healths.len());

        let activity_skip = snapshot
            .recent_results
            .len()
            .saturating_sub(RECENT_ACTIVITY_LEN);
        let recent_activity = snapshot.recent_results[activity_skip..]
            .iter()
            .map(CollectionResult::to_summary)
            .collect();

        let collectors = snapshot
            .collectors
            .into_iter()
            .map(|(health, config)| {
                let check = assessor.check_collector(&health);
                (
                    health.name.clone(),
                    CollectorDetail {
                        health,
                        healthy: check.healthy,
                        issues: check.issues,
                        config,
                    },
                )
            })
            .collect();

        let alerts = self.alerts.read().await;

        DetailedStatus {
            timestamp: Utc::now(),
            global_enabled: snapshot.global_enabled,
            concurrent_collections: snapshot.concurrent_collections,
            collectors,
            recent_activity,
            system_health,
            resource_usage,
            active_alerts: alerts.active_alerts(),
            alert_summary: alerts.summary(),
            recommendations,
        }
    }

    /// Drop every alert
    pub async fn reset(&self) {
        self.alerts.write().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Priority;

    fn health(name: &str) -> CollectorHealth {
        CollectorHealth {
            name: name.to_string(),
            source_type: "test".to_string(),
            status: CollectionStatus::Idle,
            enabled: true,
            priority: Priority::Normal,
            is_running: false,
            is_paused: false,
            total_executions: 1,
            successful_executions: 0,
            failed_executions: 1,
            consecutive_failures: 1,
            circuit_breaker_threshold: 1,
            circuit_breaker_open: true,
            success_rate: 0.0,
            total_items_collected: 0,
            last_run: None,
            last_success: None,
            last_error: None,
        }
    }

    #[tokio::test]
    async fn test_failed_run_raises_error_and_breaker_alerts() {
        let monitor = CollectionMonitor::default();
        let mut result = CollectionResult::started("spamhaus");
        result.add_error("Attempt 1: Request timeout");
        result.error_message = Some("Request timeout".into());
        result.finalize(CollectionStatus::Failed);

        monitor.record_result(&result, &health("spamhaus")).await;

        let alerts = monitor.alerts_for_collector("spamhaus").await;
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0].level, AlertLevel::Error);
        assert_eq!(alerts[1].level, AlertLevel::Critical);
    }

    #[tokio::test]
    async fn test_guard_rejection_is_warning() {
        let monitor = CollectionMonitor::default();
        let result = CollectionResult::terminal(
            "spamhaus",
            CollectionStatus::Failed,
            "Circuit breaker open after 1 consecutive failures",
        );
        let mut h = health("spamhaus");
        h.consecutive_failures = 2;

        monitor.record_result(&result, &h).await;

        let alerts = monitor.active_alerts().await;
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].level, AlertLevel::Warning);
    }

    #[tokio::test]
    async fn test_detailed_status() {
        let monitor = CollectionMonitor::default();
        let mut ok = CollectionResult::started("a");
        ok.finalize(CollectionStatus::Completed);

        let snapshot = StatusSnapshot {
            global_enabled: true,
            concurrent_collections: 3,
            collectors: vec![(health("a"), CollectorConfig::default())],
            recent_results: vec![ok],
            average_duration_secs: 0.1,
        };

        let status = monitor.detailed_status(snapshot).await;
        assert!(status.global_enabled);
        assert_eq!(status.collectors.len(), 1);
        assert!(!status.collectors["a"].healthy);
        assert_eq!(status.recent_activity.len(), 1);
        // 70 * 0 + 30 * 1
        assert_eq!(status.system_health.score, 30.0);
        assert_eq!(status.resource_usage.total_collectors, 1);
        assert!(!status.recommendations.is_empty());

        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["collectors"]["a"]["circuit_breaker_open"], true);
    }

    #[tokio::test]
    async fn test_clear_alerts() {
        let monitor = CollectionMonitor::default();
        monitor.add_alert(AlertLevel::Info, "one", Some("a")).await;
        monitor.add_alert(AlertLevel::Info, "two", Some("b")).await;

        assert_eq!(monitor.clear_alerts(Some("a")).await, 1);
        assert_eq!(monitor.clear_alerts(None).await, 1);
        assert!(monitor.active_alerts().await.is_empty());
    }
}
