//! Application state for the web layer.

use std::sync::Arc;

use crate::provider::ProviderHandle;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Read-only views of every running provider, in config order
    pub providers: Arc<Vec<ProviderHandle>>,
}

impl AppState {
    pub fn new(providers: Vec<ProviderHandle>) -> Self {
        Self {
            providers: Arc::new(providers),
        }
    }

    /// Every provider whose identifier matches, ignoring case.
    pub fn matching(&self, identifier: &str) -> impl Iterator<Item = &ProviderHandle> {
        let wanted = identifier.trim().to_lowercase();
        self.providers
            .iter()
            .filter(move |p| p.identifier().eq_ignore_ascii_case(&wanted))
    }
}
