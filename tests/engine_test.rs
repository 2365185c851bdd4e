//! Integration tests for the execution engine

mod common;

use common::{fast_config, scripted, Behavior};
use feedwarden::collector::Collector;
use feedwarden::engine::ExecutionEngine;
use feedwarden::models::{CollectionStatus, CollectorConfig};
use std::sync::atomic::AtomicU32;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn arc(collector: (Collector, Arc<AtomicU32>)) -> Arc<Collector> {
    Arc::new(collector.0)
}

/// Globally disabled batches do nothing
#[tokio::test]
async fn test_global_disabled_returns_empty() {
    let engine = ExecutionEngine::default();
    let collectors = vec![arc(scripted(
        "a",
        Behavior::Succeed(1),
        Duration::ZERO,
        fast_config(),
    ))];

    let results = engine.execute_all(&collectors, false).await;

    assert!(results.is_empty());
    assert_eq!(engine.history_len().await, 0);
    assert_eq!(collectors[0].health_check().total_executions, 0);
}

/// One failure does not affect the rest of the batch
#[tokio::test]
async fn test_failure_is_isolated() {
    let engine = ExecutionEngine::default();
    let collectors = vec![
        arc(scripted("ok", Behavior::Succeed(3), Duration::ZERO, fast_config())),
        arc(scripted("boom", Behavior::Panic, Duration::ZERO, fast_config())),
    ];

    let results = engine.execute_all(&collectors, true).await;

    assert_eq!(results.len(), 2);
    assert_eq!(results["ok"].status, CollectionStatus::Completed);
    assert_eq!(results["ok"].collected_count, 3);
    assert_eq!(results["boom"].status, CollectionStatus::Failed);
    assert_eq!(results["boom"].source_name, "boom");

    let stats = engine.stats().await;
    assert_eq!(stats.total_runs, 2);
    assert_eq!(stats.successful_runs, 1);
    assert_eq!(stats.failed_runs, 1);
}

/// Disabled collectors are left out of the batch
#[tokio::test]
async fn test_disabled_collectors_filtered() {
    let engine = ExecutionEngine::default();
    let disabled = CollectorConfig {
        enabled: false,
        ..fast_config()
    };
    let collectors = vec![
        arc(scripted("on", Behavior::Succeed(1), Duration::ZERO, fast_config())),
        arc(scripted("off", Behavior::Succeed(1), Duration::ZERO, disabled)),
    ];

    let results = engine.execute_all(&collectors, true).await;

    assert_eq!(results.len(), 1);
    assert!(results.contains_key("on"));
}

/// The gate bounds how many collectors run at once
#[tokio::test]
async fn test_concurrency_gate() {
    let delay = Duration::from_millis(100);
    let collectors: Vec<Arc<Collector>> = (0..5)
        .map(|i| arc(scripted(&format!("feed-{i}"), Behavior::Succeed(1), delay, fast_config())))
        .collect();

    let engine = ExecutionEngine::new(2, 100);
    let started = Instant::now();
    let results = engine.execute_all(&collectors, true).await;
    let gated = started.elapsed();

    assert_eq!(results.len(), 5);
    assert!(gated >= Duration::from_millis(250), "took {gated:?}");
    assert_eq!(engine.active_collections(), 0);

    engine.set_max_concurrent(5);
    let started = Instant::now();
    engine.execute_all(&collectors, true).await;
    assert!(started.elapsed() < gated);
}

/// History keeps the newest results in insertion order
#[tokio::test]
async fn test_history_is_bounded() {
    let engine = ExecutionEngine::new(3, 100);

    for i in 0..150 {
        let collector = arc(scripted(
            &format!("c{i}"),
            Behavior::Succeed(1),
            Duration::ZERO,
            fast_config(),
        ));
        engine.execute_single(&collector).await;
    }

    assert_eq!(engine.history_len().await, 100);
    let recent = engine.recent_results(100).await;
    assert_eq!(recent.first().unwrap().source_name, "c50");
    assert_eq!(recent.last().unwrap().source_name, "c149");

    // Stats cover every run, not just retained history
    assert_eq!(engine.stats().await.total_runs, 150);
}

/// The report summarizes history per collector
#[tokio::test]
async fn test_performance_report() {
    let engine = ExecutionEngine::default();
    let config = CollectorConfig {
        max_retries: 0,
        ..fast_config()
    };
    let good = arc(scripted("good", Behavior::Succeed(4), Duration::ZERO, fast_config()));
    let bad = arc(scripted("bad", Behavior::Fail, Duration::ZERO, config));

    for _ in 0..3 {
        engine.execute_single(&good).await;
    }
    engine.execute_single(&bad).await;

    let report = engine.performance_report().await;
    assert_eq!(report.history_size, 4);
    assert_eq!(report.max_concurrent, 3);
    assert_eq!(report.run_success_rate, 75.0);
    assert_eq!(report.success_rate_trend.len(), 4);
    assert_eq!(report.per_collector["good"].successes, 3);
    assert_eq!(report.per_collector["good"].total_items, 12);
    assert_eq!(report.per_collector["bad"].failures, 1);

    engine.reset().await;
    let report = engine.performance_report().await;
    assert_eq!(report.history_size, 0);
    assert_eq!(report.stats.total_runs, 0);
}
