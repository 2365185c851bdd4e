//! Plaintext IP blocklist feed

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::net::IpAddr;
use std::time::Duration;
use tracing::debug;

use super::{build_client, check_status, request_error};
use crate::collector::{GatherContext, Source};
use crate::error::SourceError;

/// Downloads a list with one IP or CIDR range per line
///
/// Blank lines and lines starting with `#` or `;` are skipped, as is
/// anything after an inline `#` or `;`.
#[derive(Debug, Clone)]
pub struct BlocklistSource {
    client: Client,
    url: String,
}

/// Validate `addr` or `addr/prefix`
pub fn is_valid_entry(entry: &str) -> bool {
    match entry.split_once('/') {
        Some((addr, prefix)) => {
            let Ok(addr) = addr.parse::<IpAddr>() else {
                return false;
            };
            let max = if addr.is_ipv4() { 32 } else { 128 };
            prefix.parse::<u8>().is_ok_and(|p| p <= max)
        }
        None => entry.parse::<IpAddr>().is_ok(),
    }
}

/// Parse a blocklist body into items; also returns the rejected line count
pub fn parse_blocklist(body: &str, source: &str) -> (Vec<Value>, usize) {
    let mut items = Vec::new();
    let mut rejected = 0;

    for line in body.lines() {
        let content = line.split(['#', ';']).next().unwrap_or("").trim();
        let Some(entry) = content.split_whitespace().next() else {
            continue;
        };

        if is_valid_entry(entry) {
            items.push(json!({ "ip": entry, "source": source }));
        } else {
            debug!(source = %source, line = %line, "Skipping invalid blocklist entry");
            rejected += 1;
        }
    }

    (items, rejected)
}

impl BlocklistSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, SourceError> {
        Ok(Self {
            client: build_client(timeout)?,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Source for BlocklistSource {
    fn source_type(&self) -> &str {
        "blocklist"
    }

    async fn gather(&self, ctx: &GatherContext) -> Result<Vec<Value>, SourceError> {
        debug!(collector = %ctx.collector_name, url = %self.url, attempt = ctx.attempt, "Downloading blocklist");

        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(request_error)?;
        check_status(response.status())?;
        let body = response.text().await.map_err(request_error)?;

        let (items, rejected) = parse_blocklist(&body, &ctx.collector_name);
        if rejected > 0 {
            debug!(
                collector = %ctx.collector_name,
                accepted = items.len(),
                rejected = rejected,
                "Blocklist parsed with rejected lines"
            );
        }
        Ok(items)
    }
}
