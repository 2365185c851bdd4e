//! Concrete feed variants
//!
//! - [`ApiFeedSource`] - token-authenticated JSON API
//! - [`BlocklistSource`] - plaintext list of IPs and CIDR ranges

pub mod api;
pub mod blocklist;

use reqwest::{Client, StatusCode};
use std::time::Duration;

use crate::error::SourceError;

pub use api::ApiFeedSource;
pub use blocklist::BlocklistSource;

/// User agent sent with every feed request
pub const USER_AGENT: &str = concat!("feedwarden/", env!("CARGO_PKG_VERSION"));

/// Build the HTTP client shared by the feed variants
pub fn build_client(timeout: Duration) -> Result<Client, SourceError> {
    let client = Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .gzip(true)
        .build()?;
    Ok(client)
}

/// Classify a non-success status
pub(crate) fn check_status(status: StatusCode) -> Result<(), SourceError> {
    if status.is_success() {
        return Ok(());
    }
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(SourceError::Auth(format!(
            "feed rejected credentials with status {}",
            status.as_u16()
        ))),
        _ => Err(SourceError::Status(status.as_u16())),
    }
}

pub(crate) fn request_error(e: reqwest::Error) -> SourceError {
    if e.is_timeout() {
        SourceError::Timeout
    } else {
        SourceError::Http(e)
    }
}
