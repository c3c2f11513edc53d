use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use transit_eta::config::{ConfigLayer, load_instances};
use transit_eta::provider::{Delegate, EtaUpdate};
use transit_eta::registry::ProviderRegistry;
use transit_eta::scheduler::PollScheduler;
use transit_eta::web::{AppState, create_router};

const DEFAULT_CONFIG_PATH: &str = "eta-config.json";
const DEFAULT_ADDR: &str = "127.0.0.1:3000";

/// Hands a provider its instance layer and logs what it publishes.
struct LoggingDelegate {
    layer: ConfigLayer,
}

impl Delegate for LoggingDelegate {
    fn config(&self) -> ConfigLayer {
        self.layer.clone()
    }

    fn update_available(&self, update: &EtaUpdate) {
        match &update.records {
            Some(records) => {
                let arrivals = records.iter().filter(|r| r.has_arrivals()).count();
                info!(
                    provider = %update.name,
                    records = records.len(),
                    with_arrivals = arrivals,
                    "ETA updated"
                );
            }
            None => warn!(provider = %update.name, "No ETA available yet"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config_path =
        std::env::var("ETA_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let addr: SocketAddr = std::env::var("ETA_ADDR")
        .unwrap_or_else(|_| DEFAULT_ADDR.to_string())
        .parse()?;

    let instances = load_instances(&config_path)?;
    info!(path = %config_path, count = instances.len(), "Loaded provider instances");

    let registry = ProviderRegistry::builtin();
    let mut schedulers = Vec::with_capacity(instances.len());
    for instance in instances {
        let delegate = Arc::new(LoggingDelegate {
            layer: instance.layer,
        });
        match registry.initialize(&instance.provider, delegate) {
            Ok(provider) => schedulers.push(PollScheduler::spawn(provider)),
            Err(e) => error!(provider = %instance.provider, error = %e, "Skipping provider"),
        }
    }

    if schedulers.is_empty() {
        warn!("No provider started; serving empty boards");
    }

    let handles = schedulers.iter().map(|s| s.handle().clone()).collect();
    let app = create_router(AppState::new(handles));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "Transit ETA boards listening");
    info!("  GET /health           - Health check");
    info!("  GET /eta              - Every board");
    info!("  GET /eta/:identifier  - Boards for one operator");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for shutdown signal");
            }
        })
        .await?;

    info!("Shutting down pollers");
    for scheduler in schedulers {
        scheduler.shutdown().await;
    }

    Ok(())
}
