//! Unified error handling for the feedwarden crate
//!
//! Collection never surfaces these errors to callers of the collector,
//! engine or coordinator: they are converted into failed results at those
//! boundaries. They do flow freely inside sources, settings persistence and
//! the binary.
//!
//! # Architecture
//!
//! - [`SourceError`] - Failures raised by a source's gathering operation
//! - [`SettingsError`] - Failures reading or writing the settings document
//! - [`ErrorCategory`] - Classification of errors for handling strategies
//! - [`Error`] - Unified error enum wrapping all domain-specific errors

use std::io;
use thiserror::Error;

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Network-related errors (HTTP, timeout, status codes)
    Network,
    /// Credential or authorization problems
    Auth,
    /// Payload parsing errors
    Parsing,
    /// Settings persistence errors
    Storage,
    /// Configuration and validation errors
    Config,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Auth => "auth",
            Self::Parsing => "parsing",
            Self::Storage => "storage",
            Self::Config => "config",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised by a source while gathering raw items
#[derive(Error, Debug)]
pub enum SourceError {
    /// HTTP request error
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Unexpected status code from the feed
    #[error("Feed returned status {0}")]
    Status(u16),

    /// Gathering did not finish in time
    #[error("Request timeout")]
    Timeout,

    /// Credentials were rejected or missing
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Payload could not be interpreted
    #[error("Parse error: {0}")]
    Parse(String),

    /// Anything else a source wants to report
    #[error("{0}")]
    Other(String),
}

impl SourceError {
    /// Create a generic source error
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Whether the error is likely transient (reported with each retry)
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Http(_) | Self::Timeout => true,
            Self::Status(code) => *code == 429 || *code >= 500,
            Self::Auth(_) | Self::Parse(_) => false,
            Self::Other(_) => true,
        }
    }

    /// Get the error category
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Http(_) | Self::Status(_) | Self::Timeout => ErrorCategory::Network,
            Self::Auth(_) => ErrorCategory::Auth,
            Self::Parse(_) => ErrorCategory::Parsing,
            Self::Other(_) => ErrorCategory::Other,
        }
    }
}

/// Errors that can occur while loading or saving the settings document
#[derive(Error, Debug)]
pub enum SettingsError {
    /// File could not be read or written
    #[error("Settings I/O failed for {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    /// File contents are not a valid settings document
    #[error("Settings document {path} is corrupt: {source}")]
    Corrupt {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Unified error type for the feedwarden crate
#[derive(Error, Debug)]
pub enum Error {
    /// Source gathering errors
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// Settings document errors
    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML deserialization errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a generic error with context
    pub fn other(context: impl Into<String>) -> Self {
        Self::Other(context.into())
    }

    /// Check if this error is recoverable (can be retried)
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Source(e) => e.is_recoverable(),
            Self::Io(_) => true,
            Self::Settings(_) | Self::Config(_) | Self::Json(_) | Self::Toml(_) => false,
            Self::Other(_) => false,
        }
    }

    /// Get the error category for handling strategies
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Source(e) => e.category(),
            Self::Settings(_) | Self::Io(_) => ErrorCategory::Storage,
            Self::Json(_) | Self::Toml(_) => ErrorCategory::Parsing,
            Self::Config(_) => ErrorCategory::Config,
            Self::Other(_) => ErrorCategory::Other,
        }
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;
