//! Application configuration for the feedwarden binary
//!
//! Loads the feed list, the settings-document path and logging options
//! from a TOML file, with environment variable overrides.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use url::Url;

use crate::collector::{Collector, Source};
use crate::coordinator::DEFAULT_SETTINGS_FILE;
use crate::error::{Error, Result};
use crate::models::CollectorConfig;
use crate::sources::{ApiFeedSource, BlocklistSource};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path of the persisted coordinator settings document
    pub settings_path: PathBuf,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Feeds to register at startup
    pub feeds: Vec<FeedConfig>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (pretty, json)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("pretty"),
        }
    }
}

/// Feed variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedKind {
    /// JSON API, optionally token-authenticated
    Api,
    /// Plaintext IP/CIDR list
    Blocklist,
}

/// One feed entry (`[[feeds]]` table)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    pub name: String,
    pub kind: FeedKind,
    pub url: String,

    /// Environment variable holding the API token
    #[serde(default)]
    pub token_env: Option<String>,

    /// Field of a JSON object body that holds the item array
    #[serde(default)]
    pub items_field: Option<String>,

    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Maximum gather attempts per second
    #[serde(default)]
    pub rate_limit: Option<f64>,
}

fn default_true() -> bool {
    true
}

impl FeedConfig {
    /// Build a collector for this feed on top of `base`
    ///
    /// Token lookup happens here, so a missing variable fails startup
    /// rather than every run.
    pub fn build_collector(&self, base: &CollectorConfig) -> Result<Collector> {
        let config = CollectorConfig {
            enabled: self.enabled,
            rate_limit: self.rate_limit.or(base.rate_limit),
            ..base.clone()
        };
        config.validate()?;

        let source: Box<dyn Source> = match self.kind {
            FeedKind::Api => {
                let mut source = ApiFeedSource::new(&self.url, config.timeout())?;
                if let Some(var) = &self.token_env {
                    let token = std::env::var(var).map_err(|_| {
                        Error::config(format!(
                            "feed '{}': environment variable {} is not set",
                            self.name, var
                        ))
                    })?;
                    source = source.with_token(token);
                }
                if let Some(field) = &self.items_field {
                    source = source.with_items_field(field);
                }
                Box::new(source)
            }
            FeedKind::Blocklist => Box::new(BlocklistSource::new(&self.url, config.timeout())?),
        };

        Ok(Collector::new(&self.name, source, config))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            settings_path: PathBuf::from(DEFAULT_SETTINGS_FILE),
            logging: LoggingConfig::default(),
            feeds: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("Failed to read config file {}: {e}", path.display()))
        })?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Default configuration with environment overrides applied
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    /// Load from `path` if given, apply env overrides, then validate
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("FEEDWARDEN_SETTINGS_PATH") {
            self.settings_path = PathBuf::from(path);
        }
        if let Ok(level) = std::env::var("FEEDWARDEN_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("FEEDWARDEN_LOG_FORMAT") {
            self.logging.format = format;
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if !matches!(self.logging.format.as_str(), "pretty" | "text" | "json") {
            return Err(Error::config(format!(
                "unknown log format '{}'",
                self.logging.format
            )));
        }

        let mut names = HashSet::new();
        for feed in &self.feeds {
            if feed.name.trim().is_empty() {
                return Err(Error::config("feed name must not be empty"));
            }
            if !names.insert(feed.name.as_str()) {
                return Err(Error::config(format!("duplicate feed name '{}'", feed.name)));
            }

            let url = Url::parse(&feed.url).map_err(|e| {
                Error::config(format!("feed '{}': invalid url '{}': {e}", feed.name, feed.url))
            })?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(Error::config(format!(
                    "feed '{}': unsupported scheme '{}'",
                    feed.name,
                    url.scheme()
                )));
            }

            if feed.rate_limit.is_some_and(|r| r <= 0.0) {
                return Err(Error::config(format!(
                    "feed '{}': rate_limit must be positive",
                    feed.name
                )));
            }
        }

        Ok(())
    }

    /// Build collectors for every configured feed
    pub fn build_collectors(&self, base: &CollectorConfig) -> Result<Vec<Collector>> {
        self.feeds.iter().map(|f| f.build_collector(base)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
settings_path = "/var/lib/feedwarden/settings.json"

[logging]
level = "debug"
format = "json"

[[feeds]]
name = "abuse-api"
kind = "api"
url = "https://api.example.com/v2/blacklist"
items_field = "data"
rate_limit = 0.5

[[feeds]]
name = "drop"
kind = "blocklist"
url = "https://www.example.org/drop.txt"
enabled = false
"#;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.settings_path, PathBuf::from(DEFAULT_SETTINGS_FILE));
    }

    #[test]
    fn test_parse_toml() {
        let config: Config = toml::from_str(SAMPLE).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.feeds.len(), 2);
        assert_eq!(config.feeds[0].kind, FeedKind::Api);
        assert_eq!(config.feeds[1].kind, FeedKind::Blocklist);
        assert!(!config.feeds[1].enabled);
        assert_eq!(config.logging.format, "json");
    }

    #[test]
    fn test_invalid_url_rejected() {
        let mut config: Config = toml::from_str(SAMPLE).unwrap();
        config.feeds[0].url = "not a url".to_string();
        assert!(config.validate().is_err());

        config.feeds[0].url = "ftp://example.com/list".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let mut config: Config = toml::from_str(SAMPLE).unwrap();
        config.feeds[1].name = "abuse-api".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_build_collectors() {
        let config: Config = toml::from_str(SAMPLE).unwrap();
        let collectors = config.build_collectors(&CollectorConfig::default()).unwrap();

        assert_eq!(collectors.len(), 2);
        assert_eq!(collectors[0].source_type(), "api");
        assert_eq!(collectors[0].config().rate_limit, Some(0.5));
        assert!(!collectors[1].config().enabled);
    }

    #[test]
    fn test_missing_token_env_fails() {
        let feed = FeedConfig {
            name: "needs-token".to_string(),
            kind: FeedKind::Api,
            url: "https://api.example.com".to_string(),
            token_env: Some("FEEDWARDEN_TEST_TOKEN_THAT_IS_NOT_SET".to_string()),
            items_field: None,
            enabled: true,
            rate_limit: None,
        };
        assert!(feed.build_collector(&CollectorConfig::default()).is_err());
    }
}
