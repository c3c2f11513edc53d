//! Response bodies.

use serde::Serialize;

use crate::domain::EtaRecord;
use crate::provider::ProviderHandle;

/// One provider's display board.
#[derive(Debug, Serialize)]
pub struct EtaBoard {
    /// Registry identifier (e.g., "kmb")
    pub identifier: String,

    /// Display name
    pub name: String,

    /// Heading shown above the rows
    pub header: String,

    /// Whether any cycle has published yet
    pub ready: bool,

    /// Last published rows; empty until the first successful cycle
    pub records: Vec<EtaRecord>,
}

impl From<&ProviderHandle> for EtaBoard {
    fn from(handle: &ProviderHandle) -> Self {
        let published = handle.current_eta();
        Self {
            identifier: handle.identifier().to_string(),
            name: handle.name().to_string(),
            header: handle.header(),
            ready: published.is_some(),
            records: published.map(|r| r.as_ref().clone()).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct EtaResponse {
    pub boards: Vec<EtaBoard>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
