//! Operator adapters.
//!
//! Each Hong Kong operator publishes its own API with its own payload
//! shapes. An adapter knows one operator: which identifiers it needs,
//! how to resolve them once, and how to turn one poll's responses into
//! `EtaRecord`s. `ProviderKind` is the closed set of adapters the
//! registry can build.

mod ctb;
mod error;
mod gmb;
mod kmb;
mod lrt;
mod mtr;
mod mtrbus;
mod serde_util;

use async_trait::async_trait;

use crate::config::{ConfigLayer, ProviderConfig, Requirement};
use crate::domain::{Clock, EtaRecord, Language};
use crate::fetch::EtaFetcher;

pub use ctb::Ctb;
pub use error::ProviderError;
pub use gmb::Gmb;
pub use kmb::Kmb;
pub use lrt::Lrt;
pub use mtr::Mtr;
pub use mtrbus::MtrBus;

/// Everything an adapter may use during one cycle.
#[derive(Clone, Copy)]
pub struct FetchContext<'a> {
    pub config: &'a ProviderConfig,
    pub fetcher: &'a EtaFetcher,
    pub clock: Clock,
}

impl FetchContext<'_> {
    pub fn language(&self) -> Language {
        self.config.language
    }

    pub fn api_base(&self) -> &str {
        &self.config.api_base
    }
}

/// The operations every operator adapter implements.
#[async_trait]
pub trait OperatorAdapter: Send + Sync {
    /// Resolve static identifiers. Only called while unresolved.
    async fn resolve(&mut self, ctx: &FetchContext<'_>) -> Result<(), ProviderError>;

    /// Fetch and normalize one poll cycle's arrivals.
    async fn fetch(&self, ctx: &FetchContext<'_>) -> Result<Vec<EtaRecord>, ProviderError>;

    /// Drop resolved metadata and every cached lookup.
    fn invalidate(&mut self);

    /// Header text derived from resolved metadata.
    fn header(&self) -> Option<String> {
        None
    }
}

/// The operators this crate knows how to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    /// Citybus
    Ctb,
    /// Green minibus
    Gmb,
    /// Kowloon Motor Bus
    Kmb,
    /// MTR Light Rail
    Lrt,
    /// MTR heavy rail
    Mtr,
    /// MTR feeder bus
    MtrBus,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 6] = [
        ProviderKind::Ctb,
        ProviderKind::Gmb,
        ProviderKind::Kmb,
        ProviderKind::Lrt,
        ProviderKind::Mtr,
        ProviderKind::MtrBus,
    ];

    /// Registry identifier.
    pub fn identifier(self) -> &'static str {
        match self {
            ProviderKind::Ctb => "ctb",
            ProviderKind::Gmb => "gmb",
            ProviderKind::Kmb => "kmb",
            ProviderKind::Lrt => "lrt",
            ProviderKind::Mtr => "mtr",
            ProviderKind::MtrBus => "mtrbus",
        }
    }

    /// Human-readable operator name.
    pub fn display_name(self) -> &'static str {
        match self {
            ProviderKind::Ctb => "CTB",
            ProviderKind::Gmb => "GMB",
            ProviderKind::Kmb => "KMB",
            ProviderKind::Lrt => "LRT",
            ProviderKind::Mtr => "MTR",
            ProviderKind::MtrBus => "MTR Bus",
        }
    }

    /// Intrinsic configuration defaults.
    pub fn defaults(self) -> ConfigLayer {
        match self {
            ProviderKind::Ctb => ctb::defaults(),
            ProviderKind::Gmb => gmb::defaults(),
            ProviderKind::Kmb => kmb::defaults(),
            ProviderKind::Lrt => lrt::defaults(),
            ProviderKind::Mtr => mtr::defaults(),
            ProviderKind::MtrBus => mtrbus::defaults(),
        }
    }

    /// Identifiers the operator cannot start without.
    pub fn requirements(self) -> &'static [Requirement] {
        match self {
            ProviderKind::Ctb => &[Requirement::Station, Requirement::Line],
            ProviderKind::Gmb => &[Requirement::Area, Requirement::Line, Requirement::Station],
            ProviderKind::Kmb => &[Requirement::StopsOrStation],
            ProviderKind::Lrt | ProviderKind::Mtr | ProviderKind::MtrBus => &[Requirement::Station],
        }
    }

    /// Build a fresh, unresolved adapter.
    pub fn adapter(self) -> Box<dyn OperatorAdapter> {
        match self {
            ProviderKind::Ctb => Box::new(Ctb::default()),
            ProviderKind::Gmb => Box::new(Gmb::default()),
            ProviderKind::Kmb => Box::new(Kmb::default()),
            ProviderKind::Lrt => Box::new(Lrt::default()),
            ProviderKind::Mtr => Box::new(Mtr::default()),
            ProviderKind::MtrBus => Box::new(MtrBus::default()),
        }
    }
}
