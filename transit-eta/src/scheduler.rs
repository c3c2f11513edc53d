//! Poll loop.
//!
//! Each provider runs in its own task. The first cycle waits for the
//! configured initial delay; every later cycle waits the full reload
//! interval measured from the end of the previous one, so cycles never
//! overlap. Cancelling the scheduler aborts in-flight requests and ends
//! the loop.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::ConfigLayer;
use crate::provider::{Provider, ProviderHandle};

/// What ended a wait between cycles.
enum Wake {
    Elapsed,
    Reconfigure(ConfigLayer),
    Cancelled,
}

pub struct PollScheduler {
    handle: ProviderHandle,
    cancel: CancellationToken,
    reconfigure: mpsc::UnboundedSender<ConfigLayer>,
    task: JoinHandle<()>,
}

impl PollScheduler {
    /// Start `provider` and poll it until shut down.
    pub fn spawn(mut provider: Provider) -> Self {
        let handle = provider.handle();
        let cancel = provider.cancellation_token();
        let (reconfigure, commands) = mpsc::unbounded_channel();

        provider.start();
        let task = tokio::spawn(run(provider, cancel.clone(), commands));

        Self {
            handle,
            cancel,
            reconfigure,
            task,
        }
    }

    pub fn handle(&self) -> &ProviderHandle {
        &self.handle
    }

    /// Install a new instance layer; the next cycle starts immediately.
    pub fn reconfigure(&self, layer: ConfigLayer) {
        if self.reconfigure.send(layer).is_err() {
            warn!(provider = %self.handle.name(), "Poll loop already stopped, ignoring new config");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop polling and wait for the loop to exit.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            error!(provider = %self.handle.name(), error = %e, "Poll loop panicked");
        }
    }
}

async fn run(
    mut provider: Provider,
    cancel: CancellationToken,
    mut commands: mpsc::UnboundedReceiver<ConfigLayer>,
) {
    let mut delay = provider.config().initial_load_delay;

    loop {
        match wait(delay, &cancel, &mut commands).await {
            Wake::Elapsed => {}
            Wake::Reconfigure(layer) => {
                if let Err(e) = provider.set_config(layer) {
                    error!(provider = %provider.name(), error = %e, "Rejected new configuration");
                    // Keep the old config and finish the interval from scratch.
                    delay = provider.config().reload_interval;
                    continue;
                }
            }
            Wake::Cancelled => break,
        }

        provider.fetch_eta().await;
        delay = provider.config().reload_interval;
    }

    info!(provider = %provider.name(), "Poll loop stopped");
}

async fn wait(
    duration: Duration,
    cancel: &CancellationToken,
    commands: &mut mpsc::UnboundedReceiver<ConfigLayer>,
) -> Wake {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Wake::Cancelled,
        Some(layer) = commands.recv() => Wake::Reconfigure(layer),
        _ = tokio::time::sleep(duration) => Wake::Elapsed,
    }
}
