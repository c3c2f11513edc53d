//! Layered provider configuration.
//!
//! A provider's intrinsic defaults are overlaid by the instance layer
//! supplied by its delegate; the instance layer wins wherever it sets a
//! field. The merged result is validated once and is immutable until the
//! provider is explicitly re-configured.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

use crate::domain::Language;

/// Default display language tag.
const DEFAULT_LANG: &str = "en";

/// Default per-request deadline.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default upper bound on in-flight requests per batch.
const DEFAULT_MAX_CONCURRENT: usize = 5;

/// Default poll interval (one minute).
const DEFAULT_RELOAD_INTERVAL_SECS: u64 = 60;

/// Errors raised while building or loading configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A required identifier is missing
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// A field is present but unusable
    #[error("invalid {field}: {message}")]
    Invalid {
        field: &'static str,
        message: String,
    },

    /// No provider is registered under this identifier
    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    /// The instance file could not be read or parsed
    #[error("failed to load {path}: {message}")]
    Load { path: String, message: String },
}

/// One or more station identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Identifiers {
    One(String),
    Many(Vec<String>),
}

impl Identifiers {
    /// Non-blank identifiers, trimmed, in configured order.
    pub fn to_vec(&self) -> Vec<String> {
        let raw: Vec<&String> = match self {
            Identifiers::One(s) => vec![s],
            Identifiers::Many(v) => v.iter().collect(),
        };
        raw.into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

/// Direction of a bus route, as the KMB API spells it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Bound {
    #[serde(rename = "O", alias = "outbound", alias = "o")]
    Outbound,
    #[serde(rename = "I", alias = "inbound", alias = "i")]
    Inbound,
}

impl Bound {
    /// Single-letter code used in arrival entries.
    pub fn code(self) -> &'static str {
        match self {
            Bound::Outbound => "O",
            Bound::Inbound => "I",
        }
    }

    /// Path segment used by the route-stop endpoint.
    pub fn path_segment(self) -> &'static str {
        match self {
            Bound::Outbound => "outbound",
            Bound::Inbound => "inbound",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim() {
            "O" | "o" => Some(Bound::Outbound),
            "I" | "i" => Some(Bound::Inbound),
            _ => None,
        }
    }
}

/// A route calling at a stop: one explicit route object in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RouteStopping {
    pub route: String,
    pub bound: Bound,
    #[serde(default = "default_service_type")]
    pub service_type: String,
    /// Zero-based position of the stop along the route. `999` means the
    /// terminus, whatever the route's length.
    pub seq: u32,
}

fn default_service_type() -> String {
    "1".to_string()
}

/// A partial configuration: provider defaults or instance overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigLayer {
    pub name: Option<String>,
    pub lang: Option<String>,
    pub sta: Option<Identifiers>,
    pub line: Option<String>,
    pub area: Option<String>,
    pub stops: Option<Vec<RouteStopping>>,
    pub api_base: Option<String>,
    pub dataset: Option<String>,
    pub mock_data: Option<String>,
    pub request_timeout_secs: Option<u64>,
    pub max_concurrent: Option<usize>,
    pub reload_interval_secs: Option<u64>,
    pub initial_load_delay_secs: Option<u64>,
}

impl ConfigLayer {
    /// Overlay `overrides` on top of `self`; fields set in `overrides` win.
    pub fn overlay(self, overrides: ConfigLayer) -> ConfigLayer {
        ConfigLayer {
            name: overrides.name.or(self.name),
            lang: overrides.lang.or(self.lang),
            sta: overrides.sta.or(self.sta),
            line: overrides.line.or(self.line),
            area: overrides.area.or(self.area),
            stops: overrides.stops.or(self.stops),
            api_base: overrides.api_base.or(self.api_base),
            dataset: overrides.dataset.or(self.dataset),
            mock_data: overrides.mock_data.or(self.mock_data),
            request_timeout_secs: overrides.request_timeout_secs.or(self.request_timeout_secs),
            max_concurrent: overrides.max_concurrent.or(self.max_concurrent),
            reload_interval_secs: overrides.reload_interval_secs.or(self.reload_interval_secs),
            initial_load_delay_secs: overrides
                .initial_load_delay_secs
                .or(self.initial_load_delay_secs),
        }
    }

    /// Set the station identifier (for building layers in code).
    pub fn with_station(mut self, sta: impl Into<String>) -> Self {
        self.sta = Some(Identifiers::One(sta.into()));
        self
    }

    pub fn with_line(mut self, line: impl Into<String>) -> Self {
        self.line = Some(line.into());
        self
    }

    pub fn with_lang(mut self, lang: impl Into<String>) -> Self {
        self.lang = Some(lang.into());
        self
    }

    pub fn with_mock_data(mut self, payload: impl Into<String>) -> Self {
        self.mock_data = Some(payload.into());
        self
    }
}

/// Identifiers a provider cannot start without.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    Station,
    Line,
    Area,
    /// Either explicit route objects or a station identifier.
    StopsOrStation,
}

/// Fully merged and validated configuration for one provider instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    pub name: Option<String>,
    pub lang: String,
    pub language: Language,
    pub stations: Vec<String>,
    pub line: Option<String>,
    pub area: Option<String>,
    pub stops: Vec<RouteStopping>,
    pub api_base: String,
    pub dataset: Option<String>,
    pub mock_data: Option<String>,
    pub request_timeout: Duration,
    pub max_concurrent: usize,
    pub reload_interval: Duration,
    pub initial_load_delay: Duration,
}

impl ProviderConfig {
    /// Merge `overrides` over `defaults` and validate the result.
    pub fn from_layers(
        defaults: ConfigLayer,
        overrides: ConfigLayer,
        requirements: &[Requirement],
    ) -> Result<Self, ConfigError> {
        let merged = defaults.overlay(overrides);

        let lang = merged
            .lang
            .filter(|l| !l.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_LANG.to_string());
        let stations = merged.sta.map(|s| s.to_vec()).unwrap_or_default();
        let line = non_blank(merged.line);
        let area = non_blank(merged.area);
        let stops = merged.stops.unwrap_or_default();

        for requirement in requirements {
            match requirement {
                Requirement::Station if stations.is_empty() => {
                    return Err(ConfigError::MissingField("sta"));
                }
                Requirement::Line if line.is_none() => {
                    return Err(ConfigError::MissingField("line"));
                }
                Requirement::Area if area.is_none() => {
                    return Err(ConfigError::MissingField("area"));
                }
                Requirement::StopsOrStation if stops.is_empty() && stations.is_empty() => {
                    return Err(ConfigError::MissingField("stops or sta"));
                }
                _ => {}
            }
        }

        let api_base = non_blank(merged.api_base)
            .map(|url| url.trim().trim_end_matches('/').to_string())
            .ok_or(ConfigError::MissingField("api_base"))?;

        let timeout_secs = merged.request_timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS);
        if timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "request_timeout_secs",
                message: "must be greater than zero".to_string(),
            });
        }

        let max_concurrent = merged.max_concurrent.unwrap_or(DEFAULT_MAX_CONCURRENT);
        if max_concurrent == 0 || max_concurrent > Semaphore::MAX_PERMITS {
            return Err(ConfigError::Invalid {
                field: "max_concurrent",
                message: format!("must be between 1 and {}", Semaphore::MAX_PERMITS),
            });
        }

        let reload_secs = merged
            .reload_interval_secs
            .unwrap_or(DEFAULT_RELOAD_INTERVAL_SECS);
        if reload_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "reload_interval_secs",
                message: "must be greater than zero".to_string(),
            });
        }

        Ok(Self {
            name: non_blank(merged.name),
            language: Language::from_tag(&lang),
            lang,
            stations,
            line,
            area,
            stops,
            api_base,
            dataset: non_blank(merged.dataset),
            mock_data: merged.mock_data,
            request_timeout: Duration::from_secs(timeout_secs),
            max_concurrent,
            reload_interval: Duration::from_secs(reload_secs),
            initial_load_delay: Duration::from_secs(merged.initial_load_delay_secs.unwrap_or(0)),
        })
    }

    /// The first configured station identifier.
    pub fn station(&self) -> Result<&str, ConfigError> {
        self.stations
            .first()
            .map(String::as_str)
            .ok_or(ConfigError::MissingField("sta"))
    }

    pub fn line(&self) -> Result<&str, ConfigError> {
        self.line.as_deref().ok_or(ConfigError::MissingField("line"))
    }

    pub fn area(&self) -> Result<&str, ConfigError> {
        self.area.as_deref().ok_or(ConfigError::MissingField("area"))
    }

    pub fn dataset(&self) -> Result<&str, ConfigError> {
        self.dataset
            .as_deref()
            .ok_or(ConfigError::MissingField("dataset"))
    }

    /// Whether `candidate` names one of the configured stations.
    pub fn matches_station(&self, candidate: &str) -> bool {
        let candidate = candidate.trim();
        !candidate.is_empty() && self.stations.iter().any(|s| s == candidate)
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// One provider instance as written in the instance file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InstanceConfig {
    /// Registry identifier, case-insensitive (`kmb`, `MTR`, ...).
    pub provider: String,
    #[serde(flatten)]
    pub layer: ConfigLayer,
}

/// Load the list of provider instances from a JSON file.
pub fn load_instances(path: impl AsRef<Path>) -> Result<Vec<InstanceConfig>, ConfigError> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Load {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;

    serde_json::from_str(&contents).map_err(|e| ConfigError::Load {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}
