//! HTTP client for the Financial Modeling Prep REST API.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use url::Url;

use crate::{Endpoint, Error};

/// Production base URI for the v3 API.
pub const DEFAULT_BASE_URL: &str = "https://financialmodelingprep.com/api/v3/";

/// Request timeout for FMP API calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client for the FMP API.
///
/// Builds request URLs as `base_url + endpoint query + apikey=<key>` and
/// returns the parsed JSON body. It performs no throttling and no retries;
/// callers decide both.
#[derive(Clone)]
pub struct Client {
    http: reqwest::Client,
    /// Base URI, always ending with `/`.
    base_url: String,
    api_key: String,
}

impl Client {
    /// Creates a new client pointing at the production API.
    pub fn new(api_key: impl Into<String>) -> Result<Self, Error> {
        Self::with_base_url(DEFAULT_BASE_URL, api_key)
    }

    /// Creates a new client with a custom base URL. Used for testing with wiremock.
    pub fn with_base_url(base_url: &str, api_key: impl Into<String>) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        let mut base_url = base_url.to_string();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        Ok(Self {
            http,
            base_url,
            api_key: api_key.into(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Full request URL for an endpoint, including the API key.
    pub fn url_for(&self, endpoint: &Endpoint) -> Result<Url, Error> {
        let raw = format!(
            "{}{}apikey={}",
            self.base_url,
            endpoint.query_string(),
            self.api_key
        );
        Ok(Url::parse(&raw)?)
    }

    /// Performs one GET round trip and parses the body as JSON.
    pub async fn fetch(&self, endpoint: &Endpoint) -> Result<Value, Error> {
        let url = self.url_for(endpoint)?;
        tracing::debug!("GET {}{}", self.base_url, endpoint.query_string());

        // reqwest errors carry the request URL, which includes the key.
        let resp = self.http.get(url).send().await.map_err(|e| {
            let e = e.without_url();
            tracing::error!("Failed to get {}: {}", endpoint, e);
            Error::Network(e)
        })?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| {
            let e = e.without_url();
            tracing::error!("Failed to read response body for {}: {}", endpoint, e);
            Error::Network(e)
        })?;

        if !status.is_success() {
            let snippet = truncate_body(&body);
            tracing::error!("{} failed with status {}: {}", endpoint, status, snippet);
            return Err(Error::HttpStatus {
                status: status.as_u16(),
                body: snippet,
            });
        }

        let parsed: Value = serde_json::from_str(&body).map_err(|e| {
            let snippet = truncate_body(&body);
            tracing::error!("Failed to parse {}: {} | body: {}", endpoint, e, snippet);
            Error::Parse {
                source: e,
                body: snippet,
            }
        })?;

        // FMP reports key and plan problems as a 200 with an error object.
        if let Some(message) = parsed.get("Error Message").and_then(Value::as_str) {
            tracing::error!("{} rejected upstream: {}", endpoint, message);
            return Err(Error::Upstream(message.to_string()));
        }

        Ok(parsed)
    }

    /// Like [`fetch`](Self::fetch), then deserializes into `T`.
    pub async fn fetch_as<T: DeserializeOwned>(&self, endpoint: &Endpoint) -> Result<T, Error> {
        let value = self.fetch(endpoint).await?;
        serde_json::from_value(value).map_err(|e| Error::Parse {
            source: e,
            body: String::new(),
        })
    }
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 2000;
    if body.len() <= MAX {
        body.to_string()
    } else {
        let mut end = MAX;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...[truncated]", &body[..end])
    }
}
