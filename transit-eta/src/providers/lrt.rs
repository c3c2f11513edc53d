//! MTR Light Rail.
//!
//! Stations are looked up in a static dataset. The schedule endpoint
//! reports countdowns ("3 min", "Arriving") per platform, which are
//! anchored to the response's own `system_time` when it carries one.

use async_trait::async_trait;
use chrono::TimeDelta;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::ConfigLayer;
use crate::domain::{Clock, EtaGroup, EtaRecord, EtaTime, Language, parse_timestamp};
use crate::fetch::Request;
use crate::metadata::MetadataError;
use crate::normalize::group_by_key;

use super::serde_util::{opt_string_or_number, string_or_number};
use super::{FetchContext, OperatorAdapter, ProviderError};

pub(super) fn defaults() -> ConfigLayer {
    ConfigLayer {
        api_base: Some(
            "https://rt.data.gov.hk/v1/transport/mtr/lrt/getSchedule".to_string(),
        ),
        dataset: Some("data/station-lrt.json".to_string()),
        ..Default::default()
    }
}

#[derive(Debug, Deserialize)]
struct LrtZone {
    #[serde(default)]
    stations: Vec<LrtStation>,
}

#[derive(Debug, Clone, Deserialize)]
struct LrtStation {
    #[serde(deserialize_with = "string_or_number")]
    station_id: String,
    #[serde(default)]
    eng_name: String,
    #[serde(default)]
    chi_name: String,
}

#[derive(Debug, Deserialize)]
struct ScheduleResponse {
    #[serde(default)]
    system_time: Option<String>,
    #[serde(default)]
    platform_list: Vec<LrtPlatform>,
}

#[derive(Debug, Deserialize)]
struct LrtPlatform {
    #[serde(default, deserialize_with = "opt_string_or_number")]
    platform_id: Option<String>,
    #[serde(default)]
    route_list: Vec<LrtTrain>,
}

#[derive(Debug, Deserialize)]
struct LrtTrain {
    #[serde(deserialize_with = "string_or_number")]
    route_no: String,
    #[serde(default)]
    dest_en: String,
    #[serde(default)]
    dest_ch: String,
    #[serde(default)]
    time_en: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct LrtMetadata {
    station_id: String,
    station: String,
}

#[derive(Debug, Default)]
pub struct Lrt {
    meta: Option<LrtMetadata>,
}

#[async_trait]
impl OperatorAdapter for Lrt {
    async fn resolve(&mut self, ctx: &FetchContext<'_>) -> Result<(), ProviderError> {
        let source = ctx.config.dataset()?;
        let zones: Vec<LrtZone> = ctx.fetcher.dataset(source).await?;

        let mut stations = zones.into_iter().flat_map(|z| z.stations).peekable();
        if stations.peek().is_none() {
            return Err(MetadataError::EmptyDataset(source.to_string()).into());
        }

        let found = stations
            .find(|s| {
                ctx.config.matches_station(&s.eng_name)
                    || ctx.config.matches_station(&s.chi_name)
                    || ctx.config.matches_station(&s.station_id)
            })
            .ok_or_else(|| MetadataError::NoMatchingStop {
                query: ctx.config.stations.join(","),
                source_name: source.to_string(),
            })?;

        let meta = LrtMetadata {
            station: ctx.language().pick(&found.chi_name, &found.eng_name).to_string(),
            station_id: found.station_id,
        };
        info!(station_id = %meta.station_id, station = %meta.station, "Resolved LRT station");
        self.meta = Some(meta);
        Ok(())
    }

    async fn fetch(&self, ctx: &FetchContext<'_>) -> Result<Vec<EtaRecord>, ProviderError> {
        let meta = self.meta.as_ref().ok_or(MetadataError::NotResolved)?;
        let url = format!("{}?station_id={}", ctx.api_base(), meta.station_id);

        let resp: ScheduleResponse = ctx.fetcher.fetch(Request::arrivals(url)).await?;
        Ok(normalize(resp, &meta.station, ctx.language(), ctx.clock))
    }

    fn invalidate(&mut self) {
        self.meta = None;
    }

    fn header(&self) -> Option<String> {
        self.meta.as_ref().map(|m| m.station.clone())
    }
}

/// Minutes until departure, from an English countdown label.
fn minutes_until(label: &str) -> Option<i64> {
    let label = label.trim();
    if label.eq_ignore_ascii_case("arriving") || label.eq_ignore_ascii_case("departing") {
        return Some(0);
    }
    label.split_whitespace().next()?.parse().ok()
}

/// One record per (route, destination) on each platform.
fn normalize(
    resp: ScheduleResponse,
    station: &str,
    language: Language,
    clock: Clock,
) -> Vec<EtaRecord> {
    let base: EtaTime = resp
        .system_time
        .as_deref()
        .and_then(parse_timestamp)
        .unwrap_or_else(|| clock.now());

    let mut records = Vec::new();
    for platform in resp.platform_list {
        debug!(
            platform = ?platform.platform_id,
            trains = platform.route_list.len(),
            "LRT platform"
        );
        let by_route = group_by_key(platform.route_list, |t| {
            (t.route_no.clone(), t.dest_en.clone())
        });

        for ((route_no, _), trains) in by_route {
            let dest = trains
                .first()
                .map(|t| language.pick(&t.dest_ch, &t.dest_en).to_string())
                .unwrap_or_default();
            let times = trains
                .iter()
                .filter_map(|t| minutes_until(&t.time_en))
                .filter_map(|m| {
                    let at = base.checked_add_signed(TimeDelta::try_minutes(m)?);
                    if at.is_none() {
                        warn!(
                            route = %route_no,
                            minutes = m,
                            "Countdown out of range, skipping"
                        );
                    }
                    at
                })
                .collect();
            records.push(EtaRecord::new(
                route_no,
                station,
                [EtaGroup::new(dest, times)],
            ));
        }
    }
    records
}
