//! Provider registry.
//!
//! Maps identifiers to provider kinds. Lookups are case-insensitive; the
//! set of kinds is closed, but a kind can be registered under more than
//! one identifier.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use crate::config::{ConfigError, ProviderConfig};
use crate::domain::Clock;
use crate::fetch::{HttpTransport, Transport};
use crate::provider::{Delegate, Provider};
use crate::providers::{ProviderError, ProviderKind};

/// What an identifier resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderDefinition {
    pub kind: ProviderKind,
    /// Display name; the identifier is used when unset.
    pub name: Option<String>,
}

impl ProviderDefinition {
    pub fn new(kind: ProviderKind) -> Self {
        Self { kind, name: None }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProviderRegistry {
    definitions: HashMap<String, ProviderDefinition>,
}

impl ProviderRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every built-in operator under its own identifier.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for kind in ProviderKind::ALL {
            registry.register(
                kind.identifier(),
                ProviderDefinition::new(kind).named(kind.display_name()),
            );
        }
        registry
    }

    pub fn register(&mut self, identifier: &str, definition: ProviderDefinition) {
        self.definitions
            .insert(identifier.trim().to_lowercase(), definition);
    }

    pub fn lookup(&self, identifier: &str) -> Option<&ProviderDefinition> {
        self.definitions.get(&identifier.trim().to_lowercase())
    }

    /// Registered identifiers, sorted.
    pub fn identifiers(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.definitions.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Build a provider talking to the real network.
    pub fn initialize(
        &self,
        identifier: &str,
        delegate: Arc<dyn Delegate>,
    ) -> Result<Provider, ProviderError> {
        let (key, definition) = self.definition(identifier)?;
        let config = merge(definition, delegate.as_ref())?;
        let transport = Arc::new(HttpTransport::new(config.request_timeout)?);
        Ok(build(
            &key,
            definition,
            config,
            delegate,
            transport,
            Clock::System,
        ))
    }

    /// Build a provider over an explicit transport and clock.
    pub fn initialize_with(
        &self,
        identifier: &str,
        delegate: Arc<dyn Delegate>,
        transport: Arc<dyn Transport>,
        clock: Clock,
    ) -> Result<Provider, ProviderError> {
        let (key, definition) = self.definition(identifier)?;
        let config = merge(definition, delegate.as_ref())?;
        Ok(build(&key, definition, config, delegate, transport, clock))
    }

    fn definition(&self, identifier: &str) -> Result<(String, &ProviderDefinition), ConfigError> {
        let key = identifier.trim().to_lowercase();
        let definition = self
            .definitions
            .get(&key)
            .ok_or_else(|| ConfigError::UnknownProvider(identifier.to_string()))?;
        Ok((key, definition))
    }
}

/// Intrinsic defaults first, then the delegate's layer on top.
fn merge(
    definition: &ProviderDefinition,
    delegate: &dyn Delegate,
) -> Result<ProviderConfig, ConfigError> {
    let kind = definition.kind;
    ProviderConfig::from_layers(kind.defaults(), delegate.config(), kind.requirements())
}

fn build(
    identifier: &str,
    definition: &ProviderDefinition,
    config: ProviderConfig,
    delegate: Arc<dyn Delegate>,
    transport: Arc<dyn Transport>,
    clock: Clock,
) -> Provider {
    let name = config
        .name
        .clone()
        .or_else(|| definition.name.clone())
        .unwrap_or_else(|| identifier.to_string());

    info!(
        provider = %name,
        identifier = %identifier,
        kind = ?definition.kind,
        "Initialized provider"
    );
    Provider::new(
        identifier,
        name,
        definition.kind,
        config,
        delegate,
        transport,
        clock,
    )
}
