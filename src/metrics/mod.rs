//! Prometheus metrics for collection runs
//!
//! # Usage
//!
//! Call `init_metrics()` at application startup to register all metrics.
//! If initialization fails, or is never called, every recording function
//! is a no-op.

use prometheus::{
    register_counter_vec, register_gauge, register_gauge_vec, register_histogram_vec, CounterVec,
    Encoder, Gauge, GaugeVec, HistogramVec, TextEncoder,
};
use std::sync::OnceLock;

// ============================================================================
// Metrics Storage
// ============================================================================

struct CollectionMetrics {
    collections: CounterVec,
    items_collected: CounterVec,
    duration: HistogramVec,
    circuit_open: GaugeVec,
    running: Gauge,
}

static COLLECTION_METRICS: OnceLock<CollectionMetrics> = OnceLock::new();

/// Flag to track if initialization was attempted
static METRICS_INIT_ATTEMPTED: OnceLock<bool> = OnceLock::new();

// ============================================================================
// Initialization
// ============================================================================

/// Register all collection metrics with the default registry
///
/// Idempotent: later calls return `Ok(())` without registering again.
///
/// # Example
///
/// ```ignore
/// if let Err(e) = feedwarden::metrics::init_metrics() {
///     tracing::warn!("Metrics initialization failed: {}", e);
/// }
/// ```
pub fn init_metrics() -> Result<(), Box<dyn std::error::Error>> {
    if METRICS_INIT_ATTEMPTED.get().is_some() {
        return Ok(());
    }
    METRICS_INIT_ATTEMPTED.set(true).ok();

    let metrics = CollectionMetrics {
        collections: register_counter_vec!(
            "feedwarden_collections_total",
            "Finished collection runs by collector and terminal status",
            &["collector", "status"]
        )?,
        items_collected: register_counter_vec!(
            "feedwarden_items_collected_total",
            "Items gathered by successful runs",
            &["collector"]
        )?,
        duration: register_histogram_vec!(
            "feedwarden_collection_duration_seconds",
            "Wall-clock duration of a collection run in seconds",
            &["collector"],
            vec![0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0]
        )?,
        circuit_open: register_gauge_vec!(
            "feedwarden_circuit_open",
            "Whether the collector's circuit breaker is open (1 = open, 0 = closed)",
            &["collector"]
        )?,
        running: register_gauge!(
            "feedwarden_running_collectors",
            "Collectors currently inside a gated run"
        )?,
    };

    COLLECTION_METRICS
        .set(metrics)
        .map_err(|_| "Collection metrics already initialized")?;

    tracing::info!("Prometheus metrics initialized successfully");
    Ok(())
}

/// Check if metrics have been initialized
pub fn metrics_initialized() -> bool {
    COLLECTION_METRICS.get().is_some()
}

// ============================================================================
// Recording
// ============================================================================

/// Text exposition of every registered metric
pub fn gather_metrics() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

/// Record one finished run
pub fn record_collection(collector: &str, status: &str, items: u64, duration_secs: Option<f64>) {
    let Some(m) = COLLECTION_METRICS.get() else {
        return;
    };

    m.collections.with_label_values(&[collector, status]).inc();

    if items > 0 {
        m.items_collected
            .with_label_values(&[collector])
            .inc_by(items as f64);
    }

    if let Some(secs) = duration_secs {
        m.duration.with_label_values(&[collector]).observe(secs);
    }
}

pub fn set_circuit_open(collector: &str, open: bool) {
    if let Some(m) = COLLECTION_METRICS.get() {
        m.circuit_open
            .with_label_values(&[collector])
            .set(if open { 1.0 } else { 0.0 });
    }
}

pub fn set_running_collectors(running: usize) {
    if let Some(m) = COLLECTION_METRICS.get() {
        m.running.set(running as f64);
    }
}

// ============================================================================
// Tests
// ============================================================================
