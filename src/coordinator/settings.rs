//! Persisted coordinator settings document

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::engine::{DEFAULT_HISTORY_SIZE, DEFAULT_MAX_CONCURRENT};
use crate::error::SettingsError;
use crate::models::CollectorConfig;
use crate::monitor::alerts::{DEFAULT_ACTIVE_WINDOW_SECS, DEFAULT_MAX_ALERTS};
use crate::monitor::HealthThresholds;

/// Default settings file name
pub const DEFAULT_SETTINGS_FILE: &str = "collection_settings.json";

/// Resource budget for the process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceLimits {
    pub max_memory_mb: u64,
    pub max_cpu_percent: f64,

    /// Results retained by the execution engine
    pub history_size: usize,

    /// Alerts retained by the alert manager
    pub max_alerts: usize,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_memory_mb: 1024,
            max_cpu_percent: 80.0,
            history_size: DEFAULT_HISTORY_SIZE,
            max_alerts: DEFAULT_MAX_ALERTS,
        }
    }
}

/// Health check and alerting knobs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringSettings {
    pub health_check_interval_secs: u64,
    pub alert_window_secs: u64,
    pub min_success_rate: f64,
    pub max_consecutive_failures: u32,
    pub max_avg_duration_secs: f64,
}

impl Default for MonitoringSettings {
    fn default() -> Self {
        let thresholds = HealthThresholds::default();
        Self {
            health_check_interval_secs: 300,
            alert_window_secs: DEFAULT_ACTIVE_WINDOW_SECS as u64,
            min_success_rate: thresholds.min_success_rate,
            max_consecutive_failures: thresholds.max_consecutive_failures,
            max_avg_duration_secs: thresholds.max_avg_duration_secs,
        }
    }
}

impl MonitoringSettings {
    /// Health thresholds derived from these settings
    pub fn thresholds(&self) -> HealthThresholds {
        HealthThresholds {
            min_success_rate: self.min_success_rate,
            max_consecutive_failures: self.max_consecutive_failures,
            max_avg_duration_secs: self.max_avg_duration_secs,
            ..HealthThresholds::default()
        }
    }

    pub fn alert_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.alert_window_secs).unwrap_or(i64::MAX))
    }
}

/// The document the coordinator reads once and rewrites on every change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorSettings {
    pub global_enabled: bool,
    pub concurrent_collections: usize,

    /// Default retry delay in seconds for newly configured collectors
    pub retry_delay: f64,

    pub collectors: BTreeMap<String, CollectorConfig>,
    pub resource_limits: ResourceLimits,
    pub monitoring: MonitoringSettings,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            global_enabled: true,
            concurrent_collections: DEFAULT_MAX_CONCURRENT,
            retry_delay: 5.0,
            collectors: BTreeMap::new(),
            resource_limits: ResourceLimits::default(),
            monitoring: MonitoringSettings::default(),
        }
    }
}

impl CoordinatorSettings {
    /// Read the document at `path`
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let content = fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| SettingsError::Corrupt {
            path: path.display().to_string(),
            source,
        })
    }

    /// Read the document, falling back to defaults when missing or corrupt
    ///
    /// The fallback is written back so the file exists afterwards. A failed
    /// write is logged and otherwise ignored.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(settings) => {
                debug!(path = %path.display(), "Loaded collection settings");
                settings
            }
            Err(SettingsError::Io { source, .. }) if source.kind() == ErrorKind::NotFound => {
                info!(path = %path.display(), "No settings file, writing defaults");
                let settings = Self::default();
                settings.save_logged(path);
                settings
            }
            Err(e) => {
                warn!(error = %e, "Falling back to default collection settings");
                let settings = Self::default();
                settings.save_logged(path);
                settings
            }
        }
    }

    /// Write the full document as pretty-printed JSON
    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        let io_err = |source| SettingsError::Io {
            path: path.display().to_string(),
            source,
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(io_err)?;
            }
        }

        let content = serde_json::to_string_pretty(self).map_err(|source| SettingsError::Corrupt {
            path: path.display().to_string(),
            source,
        })?;
        fs::write(path, content).map_err(io_err)
    }

    /// Save, logging instead of returning failures
    pub fn save_logged(&self, path: &Path) {
        if let Err(e) = self.save(path) {
            warn!(error = %e, "Failed to persist collection settings");
        }
    }

    /// A config for a collector with no stored entry
    pub fn default_collector_config(&self) -> CollectorConfig {
        CollectorConfig {
            retry_delay_secs: self.retry_delay,
            ..CollectorConfig::default()
        }
    }
}
