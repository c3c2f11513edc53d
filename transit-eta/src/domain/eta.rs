//! Normalized ETA records.
//!
//! Every operator adapter produces these, whatever its upstream payload
//! looks like. Groups keep their timestamps sorted ascending, so a reader
//! of a published record never has to re-sort.

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone};
use serde::Serialize;

/// Seconds east of UTC for Hong Kong time.
const HK_OFFSET_SECS: i32 = 8 * 60 * 60;

/// An arrival timestamp, always carried in Hong Kong time.
pub type EtaTime = DateTime<FixedOffset>;

/// The fixed UTC+8 offset used for every timestamp.
pub fn hk_offset() -> FixedOffset {
    FixedOffset::east_opt(HK_OFFSET_SECS).expect("UTC+8 is within the valid offset range")
}

/// Parse an upstream timestamp.
///
/// Accepts RFC 3339 (`2024-03-15T10:05:00+08:00`, used by the bus
/// operators) and naive `YYYY-MM-DD HH:MM:SS` strings, which the rail
/// operators emit in local time.
pub fn parse_timestamp(s: &str) -> Option<EtaTime> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Some(t.with_timezone(&hk_offset()));
    }

    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .ok()
        .and_then(|naive| hk_offset().from_local_datetime(&naive).single())
}

/// Arrivals towards one destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EtaGroup {
    dest: String,
    time: Vec<EtaTime>,
}

impl EtaGroup {
    /// Create a group, sorting the timestamps ascending.
    pub fn new(dest: impl Into<String>, mut time: Vec<EtaTime>) -> Self {
        time.sort();
        Self {
            dest: dest.into(),
            time,
        }
    }

    /// Destination display name.
    pub fn dest(&self) -> &str {
        &self.dest
    }

    /// Arrival timestamps, non-decreasing.
    pub fn times(&self) -> &[EtaTime] {
        &self.time
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }
}

/// One line at one station, as shown on a display row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EtaRecord {
    pub line: String,
    pub station: String,
    pub etas: Vec<EtaGroup>,
}

impl EtaRecord {
    /// Build a record, dropping groups without any arrival.
    ///
    /// A line with no upcoming arrivals still yields a record, just with
    /// an empty `etas` list.
    pub fn new(
        line: impl Into<String>,
        station: impl Into<String>,
        groups: impl IntoIterator<Item = EtaGroup>,
    ) -> Self {
        Self {
            line: line.into(),
            station: station.into(),
            etas: groups.into_iter().filter(|g| !g.is_empty()).collect(),
        }
    }

    /// A record with no arrivals.
    pub fn empty(line: impl Into<String>, station: impl Into<String>) -> Self {
        Self::new(line, station, std::iter::empty())
    }

    pub fn has_arrivals(&self) -> bool {
        !self.etas.is_empty()
    }
}
