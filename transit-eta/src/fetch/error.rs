//! Fetch error types.

use std::time::Duration;

/// Errors from issuing a request or decoding its response.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// HTTP request failed (connection refused, TLS, body read, ...)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Upstream returned a non-success status code
    #[error("API error {status}: {message}")]
    Status { status: u16, message: String },

    /// Response body did not match the expected shape
    #[error("JSON parse error: {message}")]
    Json {
        message: String,
        body: Option<String>,
    },

    /// Request did not complete within its deadline
    #[error("request to {url} timed out after {timeout:?}")]
    Timeout { url: String, timeout: Duration },

    /// The owning provider was torn down mid-request
    #[error("request cancelled")]
    Cancelled,

    /// A local dataset file could not be read
    #[error("failed to read dataset {path}: {message}")]
    Io { path: String, message: String },

    /// Every request in a batch failed
    #[error("all {failed} requests in batch failed")]
    BatchFailed { failed: usize },
}

impl FetchError {
    /// Build a decode error, keeping a short excerpt of the offending body.
    pub fn json(err: serde_json::Error, body: &str) -> Self {
        FetchError::Json {
            message: err.to_string(),
            body: Some(body.chars().take(500).collect()),
        }
    }

    /// Whether the response arrived but could not be decoded.
    pub fn is_parse(&self) -> bool {
        matches!(self, FetchError::Json { .. })
    }
}
