//! Transport seam between the fetcher and the network.

use std::time::Duration;

use async_trait::async_trait;

use super::error::FetchError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// An outgoing request.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: Method,
    pub url: String,
    /// JSON body, sent for POST requests.
    pub body: Option<serde_json::Value>,
    /// Arrival (poll) requests may be answered by a configured literal
    /// payload instead of the network; metadata lookups never are.
    pub mockable: bool,
}

impl Request {
    /// A metadata or dataset GET.
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            body: None,
            mockable: false,
        }
    }

    /// An arrival GET, answerable by the mock payload.
    pub fn arrivals(url: impl Into<String>) -> Self {
        Self {
            mockable: true,
            ..Self::get(url)
        }
    }

    /// An arrival POST with a JSON body, answerable by the mock payload.
    pub fn arrivals_post(url: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            body: Some(body),
            mockable: true,
        }
    }
}

/// Something that can turn a request into a response body.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &Request) -> Result<String, FetchError>;
}

/// Transport backed by a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport whose client enforces `timeout` on every request.
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &Request) -> Result<String, FetchError> {
        let builder = match request.method {
            Method::Get => self.http.get(&request.url),
            Method::Post => self.http.post(&request.url),
        };
        let builder = match &request.body {
            Some(body) => builder.json(body),
            None => builder,
        };

        let response = builder.send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Status {
                status: status.as_u16(),
                message: body,
            });
        }

        Ok(response.text().await?)
    }
}
