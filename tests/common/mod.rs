//! Common test utilities

use async_trait::async_trait;
use feedwarden::collector::{Collector, GatherContext, Source};
use feedwarden::error::SourceError;
use feedwarden::models::CollectorConfig;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// What a scripted source does on each call
#[derive(Debug, Clone, Copy)]
#[allow(dead_code)]
pub enum Behavior {
    /// Return `n` items
    Succeed(usize),
    /// Fail every call with a recoverable error
    Fail,
    /// Fail the first `n` calls, then return one item
    FailTimes(u32),
    /// Panic inside gather
    Panic,
}

/// Source with scripted behavior, an optional delay and a call counter
pub struct ScriptedSource {
    behavior: Behavior,
    delay: Duration,
    calls: Arc<AtomicU32>,
}

#[async_trait]
impl Source for ScriptedSource {
    fn source_type(&self) -> &str {
        "scripted"
    }

    async fn gather(&self, ctx: &GatherContext) -> Result<Vec<Value>, SourceError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        match self.behavior {
            Behavior::Succeed(n) => Ok((0..n)
                .map(|i| json!({"ip": format!("198.51.100.{i}"), "source": ctx.collector_name}))
                .collect()),
            Behavior::Fail => Err(SourceError::other("upstream unavailable")),
            Behavior::FailTimes(n) if call < n => Err(SourceError::other("upstream unavailable")),
            Behavior::FailTimes(_) => Ok(vec![json!({"ip": "198.51.100.1"})]),
            Behavior::Panic => panic!("gather blew up"),
        }
    }
}

/// Config with tiny delays so retries finish quickly
#[allow(dead_code)]
pub fn fast_config() -> CollectorConfig {
    CollectorConfig {
        max_retries: 2,
        retry_delay_secs: 0.01,
        timeout_secs: 5.0,
        ..CollectorConfig::default()
    }
}

/// Build a collector and hand back its call counter
#[allow(dead_code)]
pub fn scripted(
    name: &str,
    behavior: Behavior,
    delay: Duration,
    config: CollectorConfig,
) -> (Collector, Arc<AtomicU32>) {
    let calls = Arc::new(AtomicU32::new(0));
    let source = ScriptedSource {
        behavior,
        delay,
        calls: Arc::clone(&calls),
    };
    (Collector::new(name, Box::new(source), config), calls)
}

/// Poll until `check` holds, giving up after two seconds
#[allow(dead_code)]
pub async fn wait_until(mut check: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !check() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
