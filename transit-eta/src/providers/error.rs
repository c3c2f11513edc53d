//! Provider error types.

use crate::config::ConfigError;
use crate::fetch::FetchError;
use crate::metadata::MetadataError;

/// Anything that can go wrong inside one poll cycle.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Network or decode failure
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Static identifiers could not be determined
    #[error(transparent)]
    Metadata(#[from] MetadataError),

    /// A required identifier is missing
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl ProviderError {
    /// Whether the next cycle may succeed without re-configuration.
    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Fetch(_))
    }
}
