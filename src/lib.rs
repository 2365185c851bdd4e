//! feedwarden - threat-intelligence IP feed collection engine
//!
//! Pulls IP records from many external feeds, runs each one through a
//! uniform retry/backoff/circuit-breaker envelope, and reports health and
//! alerts for the whole fleet.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`models`] - Status enum, per-run results, per-collector config, stats
//! - [`collector`] - The `Source` trait and the `Collector` envelope
//! - [`sources`] - API and plaintext blocklist feed variants
//! - [`engine`] - Bounded-concurrency execution with result history
//! - [`monitor`] - Health scoring, recommendations and alerts
//! - [`coordinator`] - Registry, persisted settings and the public façade
//! - [`config`] - TOML application configuration
//! - [`metrics`] - Prometheus metrics
//! - [`error`] - Error types
//! - [`utils`] - Common utilities and helpers
//!
//! # Example
//!
//! ```no_run
//! use feedwarden::coordinator::CollectionCoordinator;
//! use feedwarden::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load(None)?;
//!     let coordinator = CollectionCoordinator::new(&config.settings_path);
//!     let base = coordinator.settings().await.default_collector_config();
//!     for collector in config.build_collectors(&base)? {
//!         coordinator.register_collector(collector).await;
//!     }
//!     let results = coordinator.collect_all().await;
//!     println!("{} feeds collected", results.len());
//!     Ok(())
//! }
//! ```

pub mod collector;
pub mod config;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod models;
pub mod monitor;
pub mod sources;
pub mod utils;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::collector::{Collector, CollectorHealth, GatherContext, Source};
    pub use crate::config::Config;
    pub use crate::coordinator::{CollectionCoordinator, CoordinatorSettings};
    pub use crate::engine::{ExecutionEngine, PerformanceReport};
    pub use crate::error::{Error, ErrorCategory, Result, SourceError};
    pub use crate::models::{CollectionResult, CollectionStats, CollectionStatus, CollectorConfig, Priority};
    pub use crate::monitor::{Alert, AlertLevel, DetailedStatus};
}

// Direct re-exports for convenience
pub use models::{CollectionResult, CollectionStatus, CollectorConfig};
