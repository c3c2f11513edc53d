//! Normalization helpers shared by the operator adapters.
//!
//! Operators disagree on payload shape but not on what a display needs:
//! arrivals grouped by line and destination, sorted, with duplicates from
//! overlapping requests removed.

use std::hash::Hash;

use indexmap::IndexMap;
use indexmap::map::Entry;

/// Group `items` by `key`.
///
/// Groups iterate in order of first occurrence in `items`, and items keep
/// their relative order within a group.
pub fn group_by_key<T, K, F>(items: impl IntoIterator<Item = T>, key: F) -> IndexMap<K, Vec<T>>
where
    K: Hash + Eq,
    F: Fn(&T) -> K,
{
    let mut groups: IndexMap<K, Vec<T>> = IndexMap::new();
    for item in items {
        groups.entry(key(&item)).or_default().push(item);
    }
    groups
}

/// Collapse duplicate arrival entries.
///
/// Entries sharing `key` (route, direction or destination, timestamp) are
/// the same arrival reported by two upstream queries. The survivor keeps
/// the position of the first occurrence and the lowest `service_type`.
pub fn dedup_by_service_type<T, K, FK, FS>(entries: Vec<T>, key: FK, service_type: FS) -> Vec<T>
where
    K: Hash + Eq,
    FK: Fn(&T) -> K,
    FS: Fn(&T) -> u32,
{
    let mut kept: IndexMap<K, T> = IndexMap::new();
    for entry in entries {
        match kept.entry(key(&entry)) {
            Entry::Occupied(mut slot) => {
                if service_type(&entry) < service_type(slot.get()) {
                    slot.insert(entry);
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(entry);
            }
        }
    }
    kept.into_values().collect()
}

/// Parse an upstream service-type marker, treating junk as lowest priority.
pub fn service_type_rank(raw: &str) -> u32 {
    raw.trim().parse().unwrap_or(u32::MAX)
}
