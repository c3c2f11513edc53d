//! A configured provider instance.
//!
//! `Provider` owns one operator adapter together with its merged
//! configuration, fetcher and last published result. `fetch_eta` is one
//! poll cycle: it resolves metadata if needed, fetches and normalizes
//! arrivals, publishes the result, and always ends by signalling the
//! delegate, whatever happened along the way.

use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{ConfigError, ConfigLayer, ProviderConfig};
use crate::domain::{Clock, EtaRecord};
use crate::fetch::{EtaFetcher, Transport};
use crate::metadata::Resolution;
use crate::providers::{FetchContext, OperatorAdapter, ProviderError, ProviderKind};

/// What a display surface sees: nothing yet, or the last published records.
pub type Published = Option<Arc<Vec<EtaRecord>>>;

/// The host side of a provider.
pub trait Delegate: Send + Sync {
    /// Instance configuration, overlaid on the provider's defaults.
    fn config(&self) -> ConfigLayer;

    /// Called at the end of every poll cycle, successful or not.
    fn update_available(&self, update: &EtaUpdate);
}

/// The availability signal.
#[derive(Debug, Clone)]
pub struct EtaUpdate {
    pub identifier: String,
    pub name: String,
    pub records: Published,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Configured,
    Started,
}

/// Read-only view of a provider's published records.
#[derive(Debug, Clone)]
pub struct ProviderHandle {
    identifier: Arc<str>,
    name: Arc<str>,
    receiver: watch::Receiver<Published>,
}

impl ProviderHandle {
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn current_eta(&self) -> Published {
        self.receiver.borrow().clone()
    }

    /// Heading for a display: the first record's station, else the
    /// provider's name.
    pub fn header(&self) -> String {
        self.receiver
            .borrow()
            .as_ref()
            .and_then(|records| records.first())
            .map(|r| r.station.clone())
            .unwrap_or_else(|| self.name.to_string())
    }

    /// Wait until a new result is published.
    pub async fn changed(&mut self) -> bool {
        self.receiver.changed().await.is_ok()
    }
}

pub struct Provider {
    identifier: String,
    name: String,
    kind: ProviderKind,
    config: ProviderConfig,
    adapter: Box<dyn OperatorAdapter>,
    resolution: Resolution,
    delegate: Arc<dyn Delegate>,
    transport: Arc<dyn Transport>,
    fetcher: EtaFetcher,
    clock: Clock,
    lifecycle: Lifecycle,
    cancel: CancellationToken,
    published: watch::Sender<Published>,
}

impl Provider {
    pub(crate) fn new(
        identifier: &str,
        name: String,
        kind: ProviderKind,
        config: ProviderConfig,
        delegate: Arc<dyn Delegate>,
        transport: Arc<dyn Transport>,
        clock: Clock,
    ) -> Self {
        let cancel = CancellationToken::new();
        let fetcher = EtaFetcher::new(&name, transport.clone(), &config, cancel.clone());
        let (published, _) = watch::channel(None);

        debug!(provider = %name, identifier = %identifier, "Provider configured");
        Self {
            identifier: identifier.to_string(),
            name,
            kind,
            config,
            adapter: kind.adapter(),
            resolution: Resolution::Pending,
            delegate,
            transport,
            fetcher,
            clock,
            lifecycle: Lifecycle::Configured,
            cancel,
            published,
        }
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ProviderKind {
        self.kind
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    pub fn resolution(&self) -> &Resolution {
        &self.resolution
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    /// Replace the instance layer.
    ///
    /// The layer is merged over the provider's defaults and validated; on
    /// success cached metadata and the published result are dropped, and
    /// the next cycle resolves afresh.
    pub fn set_config(&mut self, layer: ConfigLayer) -> Result<(), ConfigError> {
        let config =
            ProviderConfig::from_layers(self.kind.defaults(), layer, self.kind.requirements())?;

        self.fetcher = EtaFetcher::new(
            &self.name,
            self.transport.clone(),
            &config,
            self.cancel.clone(),
        );
        self.config = config;
        self.adapter = self.kind.adapter();
        self.resolution = Resolution::Pending;
        self.published.send_replace(None);

        info!(provider = %self.name, "Provider re-configured");
        Ok(())
    }

    pub fn start(&mut self) {
        info!(
            provider = %self.name,
            interval_secs = self.config.reload_interval.as_secs(),
            "Starting provider"
        );
        self.lifecycle = Lifecycle::Started;
    }

    /// Run one poll cycle.
    ///
    /// Never fails: errors are logged, the previous result stays
    /// published, and the delegate is signalled regardless.
    pub async fn fetch_eta(&mut self) {
        match self.refresh().await {
            Ok(records) => {
                debug!(provider = %self.name, records = records.len(), "Publishing ETA records");
                self.published.send_replace(Some(Arc::new(records)));
            }
            Err(ProviderError::Metadata(e)) => {
                warn!(provider = %self.name, error = %e, "No metadata, nothing to fetch");
            }
            Err(e) => {
                error!(provider = %self.name, error = %e, "Could not load ETA data");
            }
        }

        self.delegate.update_available(&EtaUpdate {
            identifier: self.identifier.clone(),
            name: self.name.clone(),
            records: self.current_eta(),
        });
    }

    async fn refresh(&mut self) -> Result<Vec<EtaRecord>, ProviderError> {
        if let Resolution::Failed(e) = &self.resolution {
            return Err(e.clone().into());
        }

        let ctx = FetchContext {
            config: &self.config,
            fetcher: &self.fetcher,
            clock: self.clock,
        };

        if !self.resolution.is_resolved() {
            match self.adapter.resolve(&ctx).await {
                Ok(()) => self.resolution = Resolution::Resolved,
                Err(ProviderError::Metadata(e)) => {
                    self.resolution = Resolution::Failed(e.clone());
                    return Err(e.into());
                }
                Err(e) => {
                    self.adapter.invalidate();
                    return Err(e);
                }
            }
        }

        self.adapter.fetch(&ctx).await
    }

    /// Last published records, or `None` before the first success.
    pub fn current_eta(&self) -> Published {
        self.published.borrow().clone()
    }

    /// Heading from resolved metadata, else the provider's name.
    pub fn header(&self) -> String {
        self.adapter.header().unwrap_or_else(|| self.name.clone())
    }

    pub fn handle(&self) -> ProviderHandle {
        ProviderHandle {
            identifier: Arc::from(self.identifier.as_str()),
            name: Arc::from(self.name.as_str()),
            receiver: self.published.subscribe(),
        }
    }

    /// Token that aborts this provider's in-flight requests.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}
