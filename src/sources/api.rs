//! Token-authenticated JSON API feed

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use super::{build_client, check_status, request_error};
use crate::collector::{GatherContext, Source};
use crate::error::SourceError;

/// Field holding the item array when the body is an object
pub const DEFAULT_ITEMS_FIELD: &str = "data";

/// Pulls IP records from a JSON API
///
/// The body is either an array of records or an object whose
/// `items_field` holds that array. The settings keys `items_field` and
/// `limit` override the constructor values per run.
#[derive(Debug, Clone)]
pub struct ApiFeedSource {
    client: Client,
    url: String,
    token: Option<String>,
    items_field: String,
}

impl ApiFeedSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, SourceError> {
        Ok(Self {
            client: build_client(timeout)?,
            url: url.into(),
            token: None,
            items_field: DEFAULT_ITEMS_FIELD.to_string(),
        })
    }

    /// Send `Authorization: Bearer <token>` with every request
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_items_field(mut self, field: impl Into<String>) -> Self {
        self.items_field = field.into();
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn extract_items(body: Value, items_field: &str) -> Result<Vec<Value>, SourceError> {
        match body {
            Value::Array(items) => Ok(items),
            Value::Object(mut map) => match map.remove(items_field) {
                Some(Value::Array(items)) => Ok(items),
                Some(Value::Null) => Ok(Vec::new()),
                Some(_) => Err(SourceError::Parse(format!(
                    "field '{items_field}' is not an array"
                ))),
                None => Err(SourceError::Parse(format!(
                    "response has no '{items_field}' field"
                ))),
            },
            _ => Err(SourceError::Parse(
                "expected a JSON array or object".to_string(),
            )),
        }
    }
}

#[async_trait]
impl Source for ApiFeedSource {
    fn source_type(&self) -> &str {
        "api"
    }

    async fn gather(&self, ctx: &GatherContext) -> Result<Vec<Value>, SourceError> {
        let items_field = ctx
            .config
            .setting_str("items_field")
            .unwrap_or(self.items_field.as_str());

        let mut request = self.client.get(&self.url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        if let Some(limit) = ctx.config.setting_u64("limit") {
            request = request.query(&[("limit", limit)]);
        }

        debug!(collector = %ctx.collector_name, url = %self.url, attempt = ctx.attempt, "Requesting API feed");
        let response = request.send().await.map_err(request_error)?;
        check_status(response.status())?;

        let body = response.text().await.map_err(request_error)?;
        let value: Value =
            serde_json::from_str(&body).map_err(|e| SourceError::Parse(e.to_string()))?;

        Self::extract_items(value, items_field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_array_body() {
        let items = ApiFeedSource::extract_items(json!([{"ip": "1.2.3.4"}]), "data").unwrap();
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn test_extract_nested_field() {
        let body = json!({"data": [{"ip": "1.2.3.4"}, {"ip": "5.6.7.8"}], "meta": {}});
        assert_eq!(ApiFeedSource::extract_items(body, "data").unwrap().len(), 2);

        let body = json!({"data": null});
        assert!(ApiFeedSource::extract_items(body, "data").unwrap().is_empty());
    }

    #[test]
    fn test_extract_rejects_wrong_shape() {
        assert!(matches!(
            ApiFeedSource::extract_items(json!({"results": []}), "data"),
            Err(SourceError::Parse(_))
        ));
        assert!(matches!(
            ApiFeedSource::extract_items(json!({"data": "oops"}), "data"),
            Err(SourceError::Parse(_))
        ));
        assert!(matches!(
            ApiFeedSource::extract_items(json!(42), "data"),
            Err(SourceError::Parse(_))
        ));
    }
}
