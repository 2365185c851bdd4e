//! Single-source collection envelope
//!
//! A [`Source`] knows how to talk to one external threat-intelligence feed
//! and nothing else. [`Collector`] wraps a source with everything that is
//! shared between feeds:
//!
//! - an `Idle → Running → {Completed | Failed | Cancelled}` state machine
//! - a retry loop with exponential backoff and a per-attempt timeout
//! - optional rate limiting between attempts (governor)
//! - a circuit breaker counting consecutive failed runs
//! - cooperative cancel / pause / resume signals
//!
//! # Example
//!
//! ```rust,ignore
//! use feedwarden::collector::{Collector, GatherContext, Source};
//!
//! struct StaticFeed;
//!
//! #[async_trait::async_trait]
//! impl Source for StaticFeed {
//!     fn source_type(&self) -> &str { "static" }
//!
//!     async fn gather(&self, _ctx: &GatherContext) -> Result<Vec<Value>, SourceError> {
//!         Ok(vec![serde_json::json!({"ip": "203.0.113.7"})])
//!     }
//! }
//!
//! let collector = Collector::new("static", Box::new(StaticFeed), CollectorConfig::default());
//! let result = collector.collect().await;
//! ```

mod base;
pub mod circuit;
pub mod rate_limit;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::SourceError;
use crate::models::CollectorConfig;

pub use base::{Collector, CollectorHealth, PAUSE_POLL_INTERVAL};
pub use circuit::CircuitBreaker;
pub use rate_limit::AttemptRateLimiter;

/// Per-run information handed to a source's gathering operation
#[derive(Debug, Clone)]
pub struct GatherContext {
    /// Registered name of the collector running this source
    pub collector_name: String,

    /// Configuration snapshot taken when the run started
    pub config: CollectorConfig,

    /// 1-based attempt number within the run
    pub attempt: u32,
}

/// A threat-intelligence feed variant
///
/// Implementors supply only the network interaction. Retries, timeouts,
/// rate limiting and bookkeeping are handled by [`Collector`]; credentials,
/// sessions and pagination stay inside `gather`.
#[async_trait]
pub trait Source: Send + Sync {
    /// Identifier of the feed type (e.g. "api", "blocklist")
    fn source_type(&self) -> &str;

    /// Fetch one batch of raw items from the feed
    async fn gather(&self, ctx: &GatherContext) -> Result<Vec<Value>, SourceError>;
}
