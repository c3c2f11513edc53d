//! Test doubles shared by the unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::config::{ConfigLayer, ProviderConfig};
use crate::fetch::{EtaFetcher, FetchError, Request, Transport};
use crate::provider::{Delegate, EtaUpdate};
use crate::providers::ProviderKind;

enum Reply {
    Body(String),
    Fail,
    Hang,
}

/// Transport answering from a fixed URL → body table.
///
/// Unknown URLs answer 404.
#[derive(Default)]
pub(crate) struct StubTransport {
    replies: HashMap<String, Reply>,
    calls: AtomicUsize,
    requests: Mutex<Vec<Request>>,
}

impl StubTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with(mut self, url: &str, body: &str) -> Self {
        self.replies
            .insert(url.to_string(), Reply::Body(body.to_string()));
        self
    }

    pub(crate) fn failing(mut self, url: &str) -> Self {
        self.replies.insert(url.to_string(), Reply::Fail);
        self
    }

    /// Never answers `url`; only a timeout or cancellation ends the call.
    pub(crate) fn hanging(mut self, url: &str) -> Self {
        self.replies.insert(url.to_string(), Reply::Hang);
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// URLs requested so far, in call order.
    pub(crate) fn requested_urls(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.url.clone())
            .collect()
    }

    pub(crate) fn requests(&self) -> Vec<Request> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for StubTransport {
    async fn send(&self, request: &Request) -> Result<String, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());

        match self.replies.get(&request.url) {
            Some(Reply::Body(body)) => Ok(body.clone()),
            Some(Reply::Fail) => Err(FetchError::Status {
                status: 503,
                message: "service unavailable".to_string(),
            }),
            Some(Reply::Hang) => futures::future::pending().await,
            None => Err(FetchError::Status {
                status: 404,
                message: format!("no stub for {}", request.url),
            }),
        }
    }
}

/// Delegate that hands out a fixed layer and records every update.
pub(crate) struct RecordingDelegate {
    layer: Mutex<ConfigLayer>,
    updates: Mutex<Vec<EtaUpdate>>,
}

impl RecordingDelegate {
    pub(crate) fn new(layer: ConfigLayer) -> Arc<Self> {
        Arc::new(Self {
            layer: Mutex::new(layer),
            updates: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn updates(&self) -> Vec<EtaUpdate> {
        self.updates.lock().unwrap().clone()
    }
}

impl Delegate for RecordingDelegate {
    fn config(&self) -> ConfigLayer {
        self.layer.lock().unwrap().clone()
    }

    fn update_available(&self, update: &EtaUpdate) {
        self.updates.lock().unwrap().push(update.clone());
    }
}

/// Merged config and a fetcher over `stub`, for driving an adapter directly.
pub(crate) fn adapter_fixture(
    kind: ProviderKind,
    layer: ConfigLayer,
    stub: &Arc<StubTransport>,
) -> (ProviderConfig, EtaFetcher) {
    let config = ProviderConfig::from_layers(kind.defaults(), layer, kind.requirements()).unwrap();
    let fetcher = EtaFetcher::new(
        kind.display_name(),
        stub.clone(),
        &config,
        CancellationToken::new(),
    );
    (config, fetcher)
}
