//! Integration tests for the collection coordinator
//!
//! Each test gets its own settings file in a temporary directory.

mod common;

use common::{fast_config, scripted, Behavior};
use feedwarden::coordinator::{CollectionCoordinator, CoordinatorSettings, MonitoringSettings};
use feedwarden::models::{CollectionStatus, CollectorConfig};
use feedwarden::monitor::AlertLevel;
use std::time::Duration;
use tempfile::TempDir;

fn setup() -> (TempDir, CollectionCoordinator) {
    let dir = TempDir::new().unwrap();
    let coordinator = CollectionCoordinator::new(dir.path().join("settings.json"));
    (dir, coordinator)
}

/// Poll the coordinator until the collector reports `status`
async fn wait_for_status(coordinator: &CollectionCoordinator, name: &str, status: CollectionStatus) {
    for _ in 0..400 {
        if let Some(health) = coordinator.collector_health(name).await {
            if health.status == status {
                return;
            }
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("collector {name} never reached {status}");
}

fn slow_failing() -> CollectorConfig {
    CollectorConfig {
        max_retries: 5,
        retry_delay_secs: 30.0,
        ..fast_config()
    }
}

/// Registering the same name twice keeps only the newer collector
#[tokio::test]
async fn test_register_replaces_same_name() {
    let (_dir, coordinator) = setup();

    let (first, _) = scripted("feed", Behavior::Succeed(1), Duration::ZERO, fast_config());
    let (second, _) = scripted("feed", Behavior::Succeed(5), Duration::ZERO, fast_config());
    coordinator.register_collector(first).await;
    coordinator.register_collector(second).await;

    assert_eq!(coordinator.collector_names().await, vec!["feed"]);
    let result = coordinator.collect_single("feed").await;
    assert_eq!(result.collected_count, 5);
}

/// Unregistering a running collector cancels its run
#[tokio::test]
async fn test_unregister_cancels_running() {
    let (_dir, coordinator) = setup();
    let (collector, _) = scripted("doomed", Behavior::Fail, Duration::ZERO, slow_failing());
    coordinator.register_collector(collector).await;

    let (result, removed) = tokio::join!(coordinator.collect_single("doomed"), async {
        wait_for_status(&coordinator, "doomed", CollectionStatus::Retrying).await;
        coordinator.unregister_collector("doomed").await
    });

    assert!(removed);
    assert_eq!(result.status, CollectionStatus::Cancelled);
    assert!(coordinator.collector_names().await.is_empty());
    assert!(!coordinator.unregister_collector("doomed").await);
}

/// Disabling global collection cancels in-flight runs
#[tokio::test]
async fn test_disable_global_cancels_in_flight() {
    let (_dir, coordinator) = setup();
    let (collector, _) = scripted("busy", Behavior::Fail, Duration::ZERO, slow_failing());
    coordinator.register_collector(collector).await;

    let (results, _) = tokio::join!(coordinator.collect_all(), async {
        wait_for_status(&coordinator, "busy", CollectionStatus::Retrying).await;
        coordinator.disable_global_collection().await;
    });

    assert_eq!(results["busy"].status, CollectionStatus::Cancelled);
    assert!(coordinator.collect_all().await.is_empty());

    coordinator.enable_global_collection().await;
    assert!(coordinator.is_global_enabled().await);
}

/// Stored per-collector settings override the collector's own on register
#[tokio::test]
async fn test_stored_settings_applied_on_register() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("settings.json");

    let mut settings = CoordinatorSettings::default();
    settings.collectors.insert(
        "feed".to_string(),
        CollectorConfig {
            enabled: false,
            max_retries: 9,
            ..CollectorConfig::default()
        },
    );
    settings.save(&path).unwrap();

    let coordinator = CollectionCoordinator::new(&path);
    let (collector, calls) = scripted("feed", Behavior::Succeed(1), Duration::ZERO, fast_config());
    coordinator.register_collector(collector).await;

    let health = coordinator.collector_health("feed").await.unwrap();
    assert!(!health.enabled);
    assert!(coordinator.collect_all().await.is_empty());
    assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 0);
}

/// A stored config with an unrepresentable delay is replaced, not applied
#[tokio::test]
async fn test_stored_oversized_delay_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("settings.json");

    let mut settings = CoordinatorSettings::default();
    settings.collectors.insert(
        "feed".to_string(),
        CollectorConfig {
            retry_delay_secs: 1e300,
            ..CollectorConfig::default()
        },
    );
    settings.save(&path).unwrap();

    let coordinator = CollectionCoordinator::new(&path);
    let (collector, calls) = scripted("feed", Behavior::Succeed(1), Duration::ZERO, fast_config());
    coordinator.register_collector(collector).await;

    let result = coordinator.collect_single("feed").await;
    assert_eq!(result.status, CollectionStatus::Completed);
    assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);

    let stored = CoordinatorSettings::load(&path).unwrap();
    assert_eq!(stored.collectors["feed"], fast_config());
}

/// Enable/disable and config updates are written to the settings file
#[tokio::test]
async fn test_mutations_persist() {
    let (_dir, coordinator) = setup();
    let (collector, _) = scripted("feed", Behavior::Succeed(1), Duration::ZERO, fast_config());
    coordinator.register_collector(collector).await;

    assert!(coordinator.disable_collector("feed").await);
    let stored = CoordinatorSettings::load(coordinator.settings_path()).unwrap();
    assert!(!stored.collectors["feed"].enabled);

    let disabled = coordinator.collect_single("feed").await;
    assert_eq!(disabled.status, CollectionStatus::Cancelled);

    assert!(coordinator.enable_collector("feed").await);
    let updated = CollectorConfig {
        max_retries: 1,
        rate_limit: Some(10.0),
        ..fast_config()
    };
    coordinator
        .update_collector_config("feed", updated)
        .await
        .unwrap();

    let invalid = CollectorConfig {
        circuit_breaker_threshold: 0,
        ..fast_config()
    };
    assert!(coordinator
        .update_collector_config("feed", invalid)
        .await
        .is_err());

    coordinator.set_concurrent_collections(7).await;

    let stored = CoordinatorSettings::load(coordinator.settings_path()).unwrap();
    assert!(stored.collectors["feed"].enabled);
    assert_eq!(stored.collectors["feed"].max_retries, 1);
    assert_eq!(stored.collectors["feed"].rate_limit, Some(10.0));
    assert_eq!(stored.concurrent_collections, 7);
}

/// A corrupt settings file falls back to defaults and is rewritten
#[tokio::test]
async fn test_corrupt_settings_fall_back() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("settings.json");
    std::fs::write(&path, "][").unwrap();

    let coordinator = CollectionCoordinator::new(&path);

    assert!(coordinator.is_global_enabled().await);
    assert_eq!(coordinator.settings().await, CoordinatorSettings::default());
    assert!(CoordinatorSettings::load(&path).is_ok());
}

/// Failed runs raise alerts that expire with the active window
#[tokio::test]
async fn test_alerts_follow_active_window() {
    let (_dir, coordinator) = setup();
    let config = CollectorConfig {
        max_retries: 0,
        circuit_breaker_threshold: 10,
        ..fast_config()
    };
    let (collector, _) = scripted("flaky", Behavior::Fail, Duration::ZERO, config);
    coordinator.register_collector(collector).await;

    for _ in 0..3 {
        coordinator.collect_single("flaky").await;
    }

    let alerts = coordinator.get_alerts().await;
    assert_eq!(alerts.len(), 3);
    assert!(alerts.iter().all(|a| a.level == AlertLevel::Error));
    assert!(alerts.iter().all(|a| a.collector.as_deref() == Some("flaky")));

    coordinator
        .update_monitoring(MonitoringSettings {
            alert_window_secs: 0,
            ..MonitoringSettings::default()
        })
        .await;
    assert!(coordinator.get_alerts().await.is_empty());
    assert_eq!(coordinator.get_alert_summary().await.total, 3);
}

/// Opening the breaker raises a critical alert
#[tokio::test]
async fn test_breaker_open_alert() {
    let (_dir, coordinator) = setup();
    let config = CollectorConfig {
        max_retries: 0,
        circuit_breaker_threshold: 2,
        ..fast_config()
    };
    let (collector, _) = scripted("fragile", Behavior::Fail, Duration::ZERO, config);
    coordinator.register_collector(collector).await;

    coordinator.collect_single("fragile").await;
    coordinator.collect_single("fragile").await;

    let alerts = coordinator.get_alerts().await;
    assert_eq!(
        alerts.iter().filter(|a| a.level == AlertLevel::Critical).count(),
        1
    );

    assert!(coordinator.reset_circuit_breaker("fragile").await);
    assert!(!coordinator.collector_health("fragile").await.unwrap().circuit_breaker_open);
}

/// The detailed status reflects collectors, history and health
#[tokio::test]
async fn test_detailed_status_and_reset() {
    let (_dir, coordinator) = setup();
    let failing = CollectorConfig {
        max_retries: 0,
        circuit_breaker_threshold: 1,
        ..fast_config()
    };
    let (good, _) = scripted("good", Behavior::Succeed(2), Duration::ZERO, fast_config());
    let (bad, _) = scripted("bad", Behavior::Fail, Duration::ZERO, failing);
    coordinator.register_collector(good).await;
    coordinator.register_collector(bad).await;

    let results = coordinator.collect_all().await;
    assert_eq!(results.len(), 2);

    let status = coordinator.get_detailed_status().await;
    assert!(status.global_enabled);
    assert_eq!(status.concurrent_collections, 3);
    assert_eq!(status.collectors.len(), 2);
    assert!(status.collectors["good"].healthy);
    assert!(!status.collectors["bad"].healthy);
    assert_eq!(status.recent_activity.len(), 2);
    assert_eq!(status.system_health.healthy_collectors, 1);
    // 70 * 0.5 + 30 * 0.5
    assert_eq!(status.system_health.score, 50.0);
    assert!(!status.recommendations.is_empty());

    let report = coordinator.get_performance_report().await;
    assert_eq!(report.stats.total_runs, 2);

    coordinator.reset_all_statistics().await;
    let report = coordinator.get_performance_report().await;
    assert_eq!(report.stats.total_runs, 0);
    assert!(coordinator.get_alerts().await.is_empty());
    let health = coordinator.collector_health("bad").await.unwrap();
    assert_eq!(health.total_executions, 0);
    assert!(!health.circuit_breaker_open);
}

/// Pause and resume are routed to the named collector
#[tokio::test]
async fn test_pause_resume_via_coordinator() {
    let (_dir, coordinator) = setup();
    let config = CollectorConfig {
        retry_delay_secs: 0.2,
        ..fast_config()
    };
    let (collector, _) = scripted("feed", Behavior::FailTimes(1), Duration::ZERO, config);
    coordinator.register_collector(collector).await;

    assert!(!coordinator.pause_collection("feed").await, "idle collectors ignore pause");

    let (result, _) = tokio::join!(coordinator.collect_single("feed"), async {
        wait_for_status(&coordinator, "feed", CollectionStatus::Retrying).await;
        assert!(coordinator.pause_collection("feed").await);
        wait_for_status(&coordinator, "feed", CollectionStatus::Paused).await;
        assert!(coordinator.resume_collection("feed").await);
    });

    assert_eq!(result.status, CollectionStatus::Completed);
    assert_eq!(coordinator.get_history("feed").await.len(), 1);
}
