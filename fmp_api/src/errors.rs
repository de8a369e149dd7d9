//! Error types for the API client.

/// Errors that can occur when making API requests.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The base URL combined with the endpoint query did not form a valid URL.
    #[error("invalid request url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// Transport-level failure: connection refused, timeout, TLS, body read.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    /// The API returned a non-success status with a body snippet.
    #[error("request failed with status {status}")]
    HttpStatus { status: u16, body: String },
    /// The response body was not valid JSON (or not the expected shape).
    #[error("failed to parse response: {source}")]
    Parse {
        source: serde_json::Error,
        body: String,
    },
    /// FMP answered 200 with an `{"Error Message": ...}` body (bad key, plan limits).
    #[error("upstream error: {0}")]
    Upstream(String),
}
