//! Metadata resolution support.
//!
//! Providers resolve their static identifiers (stop codes, route-stop
//! sequences, station codes) once, before the first arrival request.
//! This module holds the pieces every resolver shares: the resolution
//! error, the per-instance resolution state, and majority voting over
//! ambiguous display names.

use std::collections::HashMap;
use std::hash::Hash;

/// Static identifiers could not be determined.
///
/// Unlike transport failures this is not retried: the provider stays
/// unable to publish until it is re-configured.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MetadataError {
    /// No station or stop matches the configured identifier
    #[error("no stop matching {query:?} found in {source_name}")]
    NoMatchingStop { query: String, source_name: String },

    /// The configured route does not exist upstream
    #[error("route {route:?} not found")]
    NoMatchingRoute { route: String },

    /// A bootstrap dataset contained no usable entries
    #[error("dataset {0} is empty")]
    EmptyDataset(String),

    /// Arrivals were requested before resolution completed
    #[error("metadata not resolved")]
    NotResolved,
}

/// Where a provider instance is in resolving its metadata.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Resolution {
    /// Not yet resolved, or cleared after a transport failure.
    #[default]
    Pending,
    /// Resolved and cached for the rest of the instance's lifetime.
    Resolved,
    /// Resolution found nothing; parked until re-configuration.
    Failed(MetadataError),
}

impl Resolution {
    pub fn is_resolved(&self) -> bool {
        matches!(self, Resolution::Resolved)
    }
}

/// Pick the most frequent value.
///
/// Ties go to the value seen first, so the result is stable for a given
/// input order.
pub fn majority_vote<T, I>(values: I) -> Option<T>
where
    T: Hash + Eq + Clone,
    I: IntoIterator<Item = T>,
{
    let mut counts: HashMap<T, (usize, usize)> = HashMap::new();
    for (position, value) in values.into_iter().enumerate() {
        counts
            .entry(value)
            .and_modify(|(count, _)| *count += 1)
            .or_insert((1, position));
    }

    counts
        .into_iter()
        .max_by(|(_, (count_a, first_a)), (_, (count_b, first_b))| {
            count_a.cmp(count_b).then(first_b.cmp(first_a))
        })
        .map(|(value, _)| value)
}
