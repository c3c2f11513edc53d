//! MTR feeder bus.
//!
//! The schedule endpoint is a POST keyed by route name and answers with
//! every stop on the route, each carrying countdowns in seconds. Stops
//! serving the configured station come from a static route dataset.

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::config::ConfigLayer;
use crate::domain::{Clock, EtaGroup, EtaRecord};
use crate::fetch::{Request, Settled};
use crate::metadata::MetadataError;

use super::serde_util::opt_string_or_number;
use super::{FetchContext, OperatorAdapter, ProviderError};

pub(super) fn defaults() -> ConfigLayer {
    ConfigLayer {
        api_base: Some(
            "https://rt.data.gov.hk/v1/transport/mtr/bus/getSchedule".to_string(),
        ),
        dataset: Some("data/routes-mtr.json".to_string()),
        ..Default::default()
    }
}

#[derive(Debug, Deserialize)]
struct BusRoute {
    route_number: String,
    #[serde(default)]
    lines: Vec<BusLine>,
}

#[derive(Debug, Deserialize)]
struct BusLine {
    #[serde(default, deserialize_with = "opt_string_or_number")]
    direction: Option<String>,
    #[serde(default)]
    description_en: String,
    #[serde(default)]
    description_zh: String,
    #[serde(default)]
    stops: Vec<BusStop>,
}

#[derive(Debug, Deserialize)]
struct BusStop {
    #[serde(rename = "ref_ID")]
    ref_id: String,
    #[serde(default)]
    name_en: String,
    #[serde(default)]
    name_ch: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScheduleResponse {
    #[serde(default)]
    bus_stop: Option<Vec<BusStopEta>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BusStopEta {
    bus_stop_id: String,
    #[serde(default)]
    bus: Option<Vec<BusEta>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BusEta {
    #[serde(default, deserialize_with = "opt_string_or_number")]
    arrival_time_in_second: Option<String>,
    #[serde(default)]
    arrival_time_text: String,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    departure_time_in_second: Option<String>,
}

impl BusEta {
    /// Countdown in seconds; departure time once the bus is at the stop.
    fn countdown(&self) -> Option<i64> {
        let raw = if self.arrival_time_text.is_empty() {
            self.departure_time_in_second.as_deref()
        } else {
            self.arrival_time_in_second.as_deref()
        };
        let raw = raw?.trim();
        raw.parse::<i64>().ok().or_else(|| {
            raw.parse::<f64>()
                .ok()
                .filter(|s| s.is_finite() && s.abs() < i64::MAX as f64)
                .map(|s| s.round() as i64)
        })
    }
}

/// A stop of one direction of the route at the configured station.
#[derive(Debug, Clone, PartialEq, Eq)]
struct GroupStop {
    ref_id: String,
    direction: Option<String>,
    dest: String,
}

/// Every stop one route has at the configured station.
#[derive(Debug, Clone, PartialEq, Eq)]
struct RouteGroup {
    route: String,
    station: String,
    stops: Vec<GroupStop>,
}

#[derive(Debug, Default)]
pub struct MtrBus {
    routes: Option<Vec<RouteGroup>>,
}

#[async_trait]
impl OperatorAdapter for MtrBus {
    async fn resolve(&mut self, ctx: &FetchContext<'_>) -> Result<(), ProviderError> {
        let source = ctx.config.dataset()?;
        let dataset: Vec<BusRoute> = ctx.fetcher.dataset(source).await?;
        if dataset.is_empty() {
            return Err(MetadataError::EmptyDataset(source.to_string()).into());
        }

        let language = ctx.language();
        let mut groups: IndexMap<String, RouteGroup> = IndexMap::new();
        for route in &dataset {
            for line in &route.lines {
                // The last stop names the direction better than the description.
                let dest = match line.stops.last() {
                    Some(last) => language.pick(&last.name_ch, &last.name_en),
                    None => language.pick(&line.description_zh, &line.description_en),
                };

                for stop in &line.stops {
                    let matches = ctx.config.matches_station(&stop.ref_id)
                        || ctx.config.matches_station(&stop.name_en)
                        || ctx.config.matches_station(&stop.name_ch);
                    if !matches {
                        continue;
                    }

                    groups
                        .entry(route.route_number.clone())
                        .or_insert_with(|| RouteGroup {
                            route: route.route_number.clone(),
                            station: language.pick(&stop.name_ch, &stop.name_en).to_string(),
                            stops: Vec::new(),
                        })
                        .stops
                        .push(GroupStop {
                            ref_id: stop.ref_id.clone(),
                            direction: line.direction.clone(),
                            dest: dest.to_string(),
                        });
                }
            }
        }

        if groups.is_empty() {
            return Err(MetadataError::NoMatchingStop {
                query: ctx.config.stations.join(","),
                source_name: source.to_string(),
            }
            .into());
        }

        info!(routes = ?groups.keys().collect::<Vec<_>>(), "Resolved MTR Bus routes");
        self.routes = Some(groups.into_values().collect());
        Ok(())
    }

    async fn fetch(&self, ctx: &FetchContext<'_>) -> Result<Vec<EtaRecord>, ProviderError> {
        let routes = self.routes.as_ref().ok_or(MetadataError::NotResolved)?;

        let requests = routes
            .iter()
            .enumerate()
            .map(|(i, group)| {
                let body = json!({ "language": "en", "routeName": group.route });
                (i, Request::arrivals_post(ctx.api_base(), body))
            })
            .collect();
        let settled: Settled<usize, ScheduleResponse> = ctx.fetcher.fetch_all(requests).await;

        let records = settled
            .require_any()?
            .into_iter()
            .map(|(i, resp)| normalize(&routes[i], resp, ctx.clock))
            .collect();
        Ok(records)
    }

    fn invalidate(&mut self) {
        self.routes = None;
    }

    fn header(&self) -> Option<String> {
        self.routes.as_ref()?.first().map(|g| g.station.clone())
    }
}

/// One record per route with a group per stop at the station.
fn normalize(group: &RouteGroup, resp: ScheduleResponse, clock: Clock) -> EtaRecord {
    let Some(bus_stops) = resp.bus_stop else {
        warn!(route = %group.route, "Schedule has no busStop list");
        return EtaRecord::empty(&group.route, &group.station);
    };

    let etas = group.stops.iter().map(|stop| {
        let times = bus_stops
            .iter()
            .find(|b| b.bus_stop_id == stop.ref_id)
            .and_then(|b| b.bus.as_ref())
            .map(|buses| {
                buses
                    .iter()
                    .filter_map(BusEta::countdown)
                    .filter_map(|secs| {
                        let at = clock.after_secs(secs);
                        if at.is_none() {
                            warn!(route = %group.route, secs, "Countdown out of range, skipping");
                        }
                        at
                    })
                    .collect()
            })
            .unwrap_or_default();
        EtaGroup::new(&stop.dest, times)
    });

    EtaRecord::new(&group.route, &group.station, etas)
}
