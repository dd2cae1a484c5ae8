//! Last.fm HTTP client
//!
//! Talks to the Last.fm 2.0 REST endpoint. Every call is a GET with the
//! method name, API key and `format=json` in the query string.
//!
//! API: https://www.last.fm/api/rest

use serde_json::Value;

use super::domain::LookupError;
use super::dto;

/// Default Last.fm REST endpoint
pub const DEFAULT_BASE_URL: &str = "https://ws.audioscrobbler.com/2.0/";

/// User agent string sent with every request
const USER_AGENT: &str = concat!("albumart/", env!("CARGO_PKG_VERSION"));

/// Last.fm API client
pub struct LastFmClient {
    http_client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl LastFmClient {
    /// Create a client for the public Last.fm endpoint.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    /// Create a client against a custom endpoint (proxies, tests).
    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_default();

        Self {
            http_client,
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    /// Invoke an API method and return the decoded JSON body.
    pub async fn request(
        &self,
        method: &str,
        params: &[(&str, &str)],
    ) -> Result<Value, LookupError> {
        let mut query: Vec<(&str, &str)> = vec![
            ("method", method),
            ("api_key", self.api_key.as_str()),
            ("format", "json"),
        ];
        query.extend_from_slice(params);

        tracing::debug!(method, "Last.fm request");

        let response = self
            .http_client
            .get(&self.base_url)
            .query(&query)
            .send()
            .await
            .map_err(LookupError::network)?;

        let status = response.status();

        // Last.fm reports service errors in the body, sometimes with a 200
        let body = match response.json::<Value>().await {
            Ok(body) => body,
            Err(_) if !status.is_success() => return Err(LookupError::Http(status.as_u16())),
            Err(e) => return Err(LookupError::Parse(e.to_string())),
        };

        if body.get("error").is_some() {
            let error: dto::ApiError = serde_json::from_value(body)
                .map_err(|e| LookupError::Parse(e.to_string()))?;
            return Err(LookupError::Service {
                code: error.error,
                message: error.message,
            });
        }

        if !status.is_success() {
            return Err(LookupError::Http(status.as_u16()));
        }

        Ok(body)
    }
}
