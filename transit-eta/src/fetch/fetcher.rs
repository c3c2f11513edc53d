//! Request orchestration shared by every provider.
//!
//! The fetcher answers arrival requests from the configured mock payload
//! when one is set, bounds every network call by a deadline, limits the
//! number of in-flight requests, and aborts promptly when the owning
//! provider is cancelled. Batches always settle every request: one
//! failure never voids the rest of the batch.

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::de::DeserializeOwned;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::ProviderConfig;

use super::error::FetchError;
use super::transport::{Request, Transport};

/// Outcome of a settle-all batch.
#[derive(Debug)]
pub struct Settled<K, T> {
    /// Successful responses, in request order.
    pub succeeded: Vec<(K, T)>,
    /// Number of requests that failed.
    pub failed: usize,
}

impl<K, T> Settled<K, T> {
    /// Successful responses, or `BatchFailed` when nothing succeeded.
    ///
    /// An empty batch is not a failure.
    pub fn require_any(self) -> Result<Vec<(K, T)>, FetchError> {
        if self.succeeded.is_empty() && self.failed > 0 {
            return Err(FetchError::BatchFailed {
                failed: self.failed,
            });
        }
        Ok(self.succeeded)
    }
}

/// Issues requests on behalf of one provider instance.
#[derive(Clone)]
pub struct EtaFetcher {
    label: Arc<str>,
    transport: Arc<dyn Transport>,
    mock_data: Option<Arc<str>>,
    timeout: Duration,
    semaphore: Arc<Semaphore>,
    cancel: CancellationToken,
}

impl EtaFetcher {
    /// Create a fetcher for the provider named `label`.
    pub fn new(
        label: &str,
        transport: Arc<dyn Transport>,
        config: &ProviderConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            label: Arc::from(label),
            transport,
            mock_data: config.mock_data.as_deref().map(Arc::from),
            timeout: config.request_timeout,
            semaphore: Arc::new(Semaphore::new(config.max_concurrent)),
            cancel,
        }
    }

    /// Issue one request and decode its JSON body.
    pub async fn fetch<T: DeserializeOwned>(&self, request: Request) -> Result<T, FetchError> {
        let body = self.fetch_text(&request).await?;
        serde_json::from_str(&body).map_err(|e| FetchError::json(e, &body))
    }

    /// Issue every request concurrently and wait for all of them to settle.
    pub async fn fetch_all<K, T>(&self, requests: Vec<(K, Request)>) -> Settled<K, T>
    where
        K: fmt::Debug,
        T: DeserializeOwned,
    {
        let futures = requests.into_iter().map(|(key, request)| async move {
            let url = request.url.clone();
            let result = self.fetch::<T>(request).await;
            (key, url, result)
        });

        let mut succeeded = Vec::new();
        let mut failed = 0;

        for (key, url, result) in join_all(futures).await {
            match result {
                Ok(value) => succeeded.push((key, value)),
                Err(e) => {
                    failed += 1;
                    warn!(
                        provider = %self.label,
                        key = ?key,
                        url = %url,
                        error = %e,
                        "Request failed, continuing with the rest of the batch"
                    );
                }
            }
        }

        Settled { succeeded, failed }
    }

    /// Load a static bootstrap dataset from a URL or a local path.
    pub async fn dataset<T: DeserializeOwned>(&self, source: &str) -> Result<T, FetchError> {
        if source.starts_with("http://") || source.starts_with("https://") {
            return self.fetch(Request::get(source)).await;
        }

        let path = Path::new(source);
        let body = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| FetchError::Io {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
        serde_json::from_str(&body).map_err(|e| FetchError::json(e, &body))
    }

    /// Whether arrival requests are answered from a literal payload.
    pub fn is_mocked(&self) -> bool {
        self.mock_data.is_some()
    }

    async fn fetch_text(&self, request: &Request) -> Result<String, FetchError> {
        if request.mockable
            && let Some(mock) = &self.mock_data
        {
            debug!(provider = %self.label, url = %request.url, "Answering from mock payload");
            return Ok(mock.to_string());
        }

        tokio::select! {
            _ = self.cancel.cancelled() => Err(FetchError::Cancelled),
            result = self.send_bounded(request) => result,
        }
    }

    async fn send_bounded(&self, request: &Request) -> Result<String, FetchError> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| FetchError::Cancelled)?;

        debug!(provider = %self.label, url = %request.url, "Sending request");

        match tokio::time::timeout(self.timeout, self.transport.send(request)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout {
                url: request.url.clone(),
                timeout: self.timeout,
            }),
        }
    }
}
