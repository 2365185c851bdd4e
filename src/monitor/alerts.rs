//! Bounded alert log with an "active" time window

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use uuid::Uuid;

/// Default number of alerts kept
pub const DEFAULT_MAX_ALERTS: usize = 1000;

/// Default window in which an alert counts as active
pub const DEFAULT_ACTIVE_WINDOW_SECS: i64 = 3600;

/// Severity level of an alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Info,
    Warning,
    Error,
    Critical,
}

impl AlertLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }
}

impl std::fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One logged alert
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub level: AlertLevel,
    pub message: String,
    pub collector: Option<String>,
}

impl Alert {
    pub fn new(level: AlertLevel, message: impl Into<String>, collector: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            level,
            message: message.into(),
            collector,
        }
    }

    /// Format alert for display
    pub fn format_message(&self) -> String {
        match &self.collector {
            Some(collector) => format!(
                "[{}] {} ({}) at {}",
                self.level.as_str().to_uppercase(),
                self.message,
                collector,
                self.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
            ),
            None => format!(
                "[{}] {} at {}",
                self.level.as_str().to_uppercase(),
                self.message,
                self.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
            ),
        }
    }
}

/// Counts of stored alerts
#[derive(Debug, Clone, Default, Serialize)]
pub struct AlertSummary {
    pub total: usize,
    pub active: usize,
    pub by_level: BTreeMap<String, usize>,
    pub by_collector: BTreeMap<String, usize>,
}

/// Append-only, size-bounded alert log
#[derive(Debug, Clone)]
pub struct AlertManager {
    alerts: VecDeque<Alert>,
    max_alerts: usize,
    active_window: Duration,
}

impl Default for AlertManager {
    fn default() -> Self {
        Self::new()
    }
}

impl AlertManager {
    pub fn new() -> Self {
        Self {
            alerts: VecDeque::new(),
            max_alerts: DEFAULT_MAX_ALERTS,
            active_window: Duration::seconds(DEFAULT_ACTIVE_WINDOW_SECS),
        }
    }

    /// Set retention policy; excess alerts are dropped immediately
    pub fn configure(&mut self, max_alerts: usize, active_window: Duration) {
        self.max_alerts = max_alerts;
        self.active_window = active_window.max(Duration::zero());
        self.trim();
    }

    pub fn max_alerts(&self) -> usize {
        self.max_alerts
    }

    pub fn active_window(&self) -> Duration {
        self.active_window
    }

    fn trim(&mut self) {
        while self.alerts.len() > self.max_alerts {
            self.alerts.pop_front();
        }
    }

    /// Log an alert and return a copy of it
    pub fn add_alert(
        &mut self,
        level: AlertLevel,
        message: impl Into<String>,
        collector: Option<&str>,
    ) -> Alert {
        let alert = Alert::new(level, message, collector.map(str::to_string));
        match level {
            AlertLevel::Info => tracing::info!(alert = %alert.format_message(), "Alert raised"),
            AlertLevel::Warning => tracing::warn!(alert = %alert.format_message(), "Alert raised"),
            AlertLevel::Error | AlertLevel::Critical => {
                tracing::error!(alert = %alert.format_message(), "Alert raised")
            }
        }
        self.alerts.push_back(alert.clone());
        self.trim();
        alert
    }

    fn is_active(&self, alert: &Alert, now: DateTime<Utc>) -> bool {
        now - alert.timestamp < self.active_window
    }

    /// Alerts raised within the active window, oldest first
    pub fn active_alerts(&self) -> Vec<Alert> {
        let now = Utc::now();
        self.alerts
            .iter()
            .filter(|a| self.is_active(a, now))
            .cloned()
            .collect()
    }

    pub fn all_alerts(&self) -> Vec<Alert> {
        self.alerts.iter().cloned().collect()
    }

    pub fn alerts_by_level(&self, level: AlertLevel) -> Vec<Alert> {
        self.alerts
            .iter()
            .filter(|a| a.level == level)
            .cloned()
            .collect()
    }

    pub fn alerts_for_collector(&self, collector: &str) -> Vec<Alert> {
        self.alerts
            .iter()
            .filter(|a| a.collector.as_deref() == Some(collector))
            .cloned()
            .collect()
    }

    pub fn summary(&self) -> AlertSummary {
        let now = Utc::now();
        let mut summary = AlertSummary {
            total: self.alerts.len(),
            ..Default::default()
        };

        for alert in &self.alerts {
            if self.is_active(alert, now) {
                summary.active += 1;
            }
            *summary
                .by_level
                .entry(alert.level.as_str().to_string())
                .or_insert(0) += 1;
            if let Some(collector) = &alert.collector {
                *summary.by_collector.entry(collector.clone()).or_insert(0) += 1;
            }
        }

        summary
    }

    pub fn clear(&mut self) {
        self.alerts.clear();
    }

    /// Drop every alert attributed to one collector; returns how many went
    pub fn clear_collector(&mut self, collector: &str) -> usize {
        let before = self.alerts.len();
        self.alerts
            .retain(|a| a.collector.as_deref() != Some(collector));
        before - self.alerts.len()
    }

    pub fn len(&self) -> usize {
        self.alerts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }
}
