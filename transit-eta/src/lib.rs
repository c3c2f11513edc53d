//! Hong Kong transit arrival boards.
//!
//! Polls the open-data endpoints of the territory's bus and rail
//! operators, resolves the stops a user asked for, and publishes
//! normalized "line at station, next arrivals per destination" records.

pub mod cache;
pub mod config;
pub mod domain;
pub mod fetch;
pub mod metadata;
pub mod normalize;
pub mod provider;
pub mod providers;
pub mod registry;
pub mod scheduler;
pub mod web;

#[cfg(test)]
mod testing;

pub use config::{ConfigError, ConfigLayer, InstanceConfig, ProviderConfig, load_instances};
pub use domain::{EtaGroup, EtaRecord, Language};
pub use provider::{Delegate, EtaUpdate, Provider, ProviderHandle};
pub use providers::{ProviderError, ProviderKind};
pub use registry::{ProviderDefinition, ProviderRegistry};
pub use scheduler::PollScheduler;
