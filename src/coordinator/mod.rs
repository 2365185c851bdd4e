//! Collection coordinator
//!
//! Single entry point for the API layer: owns the collector registry, the
//! persisted settings document, the execution engine and the monitor.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │            CollectionCoordinator             │
//! │                                              │
//! │  ┌───────────────┐   ┌────────────────────┐  │
//! │  │   Registry    │   │ CoordinatorSettings│  │
//! │  │ name → Arc<…> │   │ JSON, rewritten on │  │
//! │  │               │   │ every mutation     │  │
//! │  └───────────────┘   └────────────────────┘  │
//! │          │                                   │
//! │          ▼                                   │
//! │  ┌───────────────┐   ┌────────────────────┐  │
//! │  │ExecutionEngine│──▶│ CollectionMonitor  │  │
//! │  │ gate, history │   │ health, alerts     │  │
//! │  └───────────────┘   └────────────────────┘  │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use feedwarden::coordinator::CollectionCoordinator;
//!
//! let coordinator = CollectionCoordinator::new("collection_settings.json");
//! coordinator.register_collector(collector).await;
//! let results = coordinator.collect_all().await;
//! ```

pub mod settings;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::collector::{Collector, CollectorHealth};
use crate::engine::{ExecutionEngine, PerformanceReport};
use crate::error::{Error, Result};
use crate::models::{CollectionResult, CollectionStatus, CollectorConfig};
use crate::monitor::{Alert, AlertSummary, CollectionMonitor, DetailedStatus, StatusSnapshot};

pub use settings::{CoordinatorSettings, MonitoringSettings, ResourceLimits, DEFAULT_SETTINGS_FILE};

/// Façade over registry, settings, engine and monitor
pub struct CollectionCoordinator {
    settings_path: PathBuf,
    settings: RwLock<CoordinatorSettings>,
    collectors: RwLock<HashMap<String, Arc<Collector>>>,
    engine: ExecutionEngine,
    monitor: CollectionMonitor,
}

impl CollectionCoordinator {
    /// Create a coordinator backed by the settings document at `settings_path`
    ///
    /// A missing or corrupt document is replaced with defaults.
    pub fn new(settings_path: impl Into<PathBuf>) -> Self {
        let settings_path = settings_path.into();
        let settings = CoordinatorSettings::load_or_default(&settings_path);

        let engine = ExecutionEngine::new(
            settings.concurrent_collections,
            settings.resource_limits.history_size,
        );
        let monitor = CollectionMonitor::with_retention(
            settings.monitoring.thresholds(),
            settings.resource_limits.max_alerts,
            settings.monitoring.alert_window(),
        );

        info!(
            path = %settings_path.display(),
            global_enabled = settings.global_enabled,
            concurrent_collections = settings.concurrent_collections,
            "Collection coordinator initialized"
        );

        Self {
            settings_path,
            settings: RwLock::new(settings),
            collectors: RwLock::new(HashMap::new()),
            engine,
            monitor,
        }
    }

    pub fn settings_path(&self) -> &Path {
        &self.settings_path
    }

    /// Snapshot of the settings document
    pub async fn settings(&self) -> CoordinatorSettings {
        self.settings.read().await.clone()
    }

    async fn persist(&self) {
        self.settings.read().await.save_logged(&self.settings_path);
    }

    async fn get(&self, name: &str) -> Option<Arc<Collector>> {
        self.collectors.read().await.get(name).cloned()
    }

    async fn snapshot(&self) -> Vec<Arc<Collector>> {
        self.collectors.read().await.values().cloned().collect()
    }

    // ------------------------------------------------------------------------
    // Registry
    // ------------------------------------------------------------------------

    /// Add a collector, replacing any collector of the same name
    ///
    /// A stored configuration for the name wins over the collector's own;
    /// otherwise the collector's configuration is stored.
    pub async fn register_collector(&self, collector: Collector) {
        let name = collector.name().to_string();

        let stored = self.settings.read().await.collectors.get(&name).cloned();
        match stored {
            Some(config) => {
                if let Err(e) = collector.update_config(config) {
                    warn!(collector = %name, error = %e, "Ignoring invalid stored configuration");
                    self.settings
                        .write()
                        .await
                        .collectors
                        .insert(name.clone(), collector.config());
                }
            }
            None => {
                self.settings
                    .write()
                    .await
                    .collectors
                    .insert(name.clone(), collector.config());
            }
        }

        let previous = self
            .collectors
            .write()
            .await
            .insert(name.clone(), Arc::new(collector));
        if let Some(previous) = previous {
            previous.cancel();
            info!(collector = %name, "Replaced registered collector");
        } else {
            info!(collector = %name, "Registered collector");
        }

        self.persist().await;
    }

    /// Remove a collector, cancelling its run first
    ///
    /// The stored configuration is kept so a later registration picks it up.
    pub async fn unregister_collector(&self, name: &str) -> bool {
        let removed = self.collectors.write().await.remove(name);
        match removed {
            Some(collector) => {
                if collector.cancel() {
                    debug!(collector = %name, "Cancelled running collector on unregister");
                }
                info!(collector = %name, "Unregistered collector");
                true
            }
            None => false,
        }
    }

    /// Registered names, sorted
    pub async fn collector_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.collectors.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn collector_health(&self, name: &str) -> Option<CollectorHealth> {
        self.get(name).await.map(|c| c.health_check())
    }

    // ------------------------------------------------------------------------
    // Enable / disable
    // ------------------------------------------------------------------------

    async fn store_config(&self, name: &str, config: CollectorConfig) {
        self.settings
            .write()
            .await
            .collectors
            .insert(name.to_string(), config);
        self.persist().await;
    }

    pub async fn enable_collector(&self, name: &str) -> bool {
        let Some(collector) = self.get(name).await else {
            return false;
        };
        collector.set_enabled(true);
        self.store_config(name, collector.config()).await;
        info!(collector = %name, "Collector enabled");
        true
    }

    /// Disable a collector, cancelling its in-flight run
    pub async fn disable_collector(&self, name: &str) -> bool {
        let Some(collector) = self.get(name).await else {
            return false;
        };
        collector.cancel();
        collector.set_enabled(false);
        self.store_config(name, collector.config()).await;
        info!(collector = %name, "Collector disabled");
        true
    }

    pub async fn is_global_enabled(&self) -> bool {
        self.settings.read().await.global_enabled
    }

    pub async fn enable_global_collection(&self) {
        self.settings.write().await.global_enabled = true;
        self.persist().await;
        info!("Global collection enabled");
    }

    /// Stop batch collection and cancel every in-flight run
    pub async fn disable_global_collection(&self) {
        self.settings.write().await.global_enabled = false;
        self.persist().await;
        let cancelled = self.cancel_all_collections().await;
        info!(cancelled = cancelled, "Global collection disabled");
    }

    // ------------------------------------------------------------------------
    // Run control
    // ------------------------------------------------------------------------

    /// Returns `false` for unknown names and idle collectors
    pub async fn cancel_collection(&self, name: &str) -> bool {
        match self.get(name).await {
            Some(collector) => collector.cancel(),
            None => false,
        }
    }

    /// Cancel every running collector; returns how many were signalled
    pub async fn cancel_all_collections(&self) -> usize {
        self.snapshot()
            .await
            .iter()
            .filter(|collector| collector.cancel())
            .count()
    }

    pub async fn pause_collection(&self, name: &str) -> bool {
        match self.get(name).await {
            Some(collector) => collector.pause(),
            None => false,
        }
    }

    pub async fn resume_collection(&self, name: &str) -> bool {
        match self.get(name).await {
            Some(collector) => collector.resume(),
            None => false,
        }
    }

    pub async fn reset_circuit_breaker(&self, name: &str) -> bool {
        match self.get(name).await {
            Some(collector) => {
                collector.reset_circuit_breaker();
                true
            }
            None => false,
        }
    }

    // ------------------------------------------------------------------------
    // Configuration
    // ------------------------------------------------------------------------

    /// Validate, apply and persist a collector's configuration
    pub async fn update_collector_config(&self, name: &str, config: CollectorConfig) -> Result<()> {
        let collector = self
            .get(name)
            .await
            .ok_or_else(|| Error::config(format!("Collector '{name}' not found")))?;

        collector.update_config(config.clone())?;
        self.store_config(name, config).await;
        info!(collector = %name, "Collector configuration updated");
        Ok(())
    }

    /// Resize the execution gate and persist the new limit
    pub async fn set_concurrent_collections(&self, max_concurrent: usize) {
        let max_concurrent = max_concurrent.max(1);
        self.engine.set_max_concurrent(max_concurrent);
        self.settings.write().await.concurrent_collections = max_concurrent;
        self.persist().await;
    }

    /// Replace monitoring thresholds and alert retention, then persist
    pub async fn update_monitoring(&self, monitoring: MonitoringSettings) {
        self.monitor.set_thresholds(monitoring.thresholds()).await;
        let max_alerts = {
            let mut settings = self.settings.write().await;
            settings.monitoring = monitoring.clone();
            settings.resource_limits.max_alerts
        };
        self.monitor
            .configure_alerts(max_alerts, monitoring.alert_window())
            .await;
        self.persist().await;
    }

    // ------------------------------------------------------------------------
    // Collection
    // ------------------------------------------------------------------------

    async fn observe(&self, collector: &Collector, result: &CollectionResult) {
        let health = collector.health_check();
        self.monitor.record_result(result, &health).await;
    }

    /// Run every enabled collector under the concurrency gate
    pub async fn collect_all(&self) -> HashMap<String, CollectionResult> {
        let global_enabled = self.is_global_enabled().await;
        let collectors = self.snapshot().await;

        let results = self.engine.execute_all(&collectors, global_enabled).await;

        for collector in &collectors {
            if let Some(result) = results.get(collector.name()) {
                self.observe(collector, result).await;
            }
        }
        results
    }

    /// Run one collector by name
    pub async fn collect_single(&self, name: &str) -> CollectionResult {
        let Some(collector) = self.get(name).await else {
            warn!(collector = %name, "Collection requested for unknown collector");
            return CollectionResult::terminal(
                name,
                CollectionStatus::Failed,
                format!("Collector '{name}' not found"),
            );
        };

        if !self.is_global_enabled().await {
            return CollectionResult::terminal(
                name,
                CollectionStatus::Cancelled,
                "Global collection is disabled",
            );
        }

        let result = self.engine.execute_single(&collector).await;
        self.observe(&collector, &result).await;
        result
    }

    // ------------------------------------------------------------------------
    // Reporting
    // ------------------------------------------------------------------------

    pub async fn get_detailed_status(&self) -> DetailedStatus {
        let global_enabled = self.is_global_enabled().await;
        let mut collectors: Vec<(CollectorHealth, CollectorConfig)> = self
            .snapshot()
            .await
            .iter()
            .map(|c| (c.health_check(), c.config()))
            .collect();
        collectors.sort_by(|a, b| a.0.name.cmp(&b.0.name));

        let window = self.monitor.window_size().await;
        let snapshot = StatusSnapshot {
            global_enabled,
            concurrent_collections: self.engine.max_concurrent(),
            collectors,
            recent_results: self.engine.recent_results(window).await,
            average_duration_secs: self.engine.stats().await.average_duration_secs,
        };

        self.monitor.detailed_status(snapshot).await
    }

    pub async fn get_performance_report(&self) -> PerformanceReport {
        self.engine.performance_report().await
    }

    /// Alerts within the active window
    pub async fn get_alerts(&self) -> Vec<Alert> {
        self.monitor.active_alerts().await
    }

    pub async fn get_alert_summary(&self) -> AlertSummary {
        self.monitor.alert_summary().await
    }

    pub async fn get_history(&self, name: &str) -> Vec<CollectionResult> {
        self.engine.history_for(name).await
    }

    /// Zero collector counters, engine history and stats, and alerts
    pub async fn reset_all_statistics(&self) {
        for collector in self.snapshot().await {
            collector.reset_statistics();
        }
        self.engine.reset().await;
        self.monitor.reset().await;
        info!("All collection statistics reset");
    }
}

impl std::fmt::Debug for CollectionCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectionCoordinator")
            .field("settings_path", &self.settings_path)
            .finish()
    }
}
