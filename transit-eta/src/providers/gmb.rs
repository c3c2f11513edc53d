//! Green minibus.
//!
//! A route code is only unique within an area, so resolution goes area +
//! route code → route id → per-direction stop lists, keeping every
//! direction that calls at the configured stop.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use crate::config::ConfigLayer;
use crate::domain::{EtaGroup, EtaRecord, parse_timestamp};
use crate::fetch::{Request, Settled};
use crate::metadata::MetadataError;

use super::serde_util::{opt_string_or_number, string_or_number};
use super::{FetchContext, OperatorAdapter, ProviderError};

pub(super) fn defaults() -> ConfigLayer {
    ConfigLayer {
        api_base: Some("https://data.etagmb.gov.hk".to_string()),
        ..Default::default()
    }
}

#[derive(Debug, Deserialize)]
struct RouteResponse {
    #[serde(default)]
    data: Vec<GmbRoute>,
}

#[derive(Debug, Deserialize)]
struct GmbRoute {
    #[serde(deserialize_with = "string_or_number")]
    route_id: String,
    #[serde(default)]
    directions: Vec<GmbDirection>,
}

#[derive(Debug, Clone, Deserialize)]
struct GmbDirection {
    #[serde(deserialize_with = "string_or_number")]
    route_seq: String,
    #[serde(default)]
    dest_tc: String,
    #[serde(default)]
    dest_en: String,
}

#[derive(Debug, Deserialize)]
struct RouteStopResponse {
    data: RouteStopData,
}

#[derive(Debug, Deserialize)]
struct RouteStopData {
    #[serde(default)]
    route_stops: Vec<GmbRouteStop>,
}

#[derive(Debug, Deserialize)]
struct GmbRouteStop {
    #[serde(deserialize_with = "string_or_number")]
    stop_id: String,
    #[serde(default)]
    name_tc: String,
    #[serde(default)]
    name_en: String,
}

#[derive(Debug, Deserialize)]
struct EtaResponse {
    #[serde(default)]
    data: Vec<GmbStopEta>,
}

#[derive(Debug, Deserialize)]
struct GmbStopEta {
    #[serde(default, deserialize_with = "opt_string_or_number")]
    route_seq: Option<String>,
    #[serde(default)]
    eta: Option<Vec<GmbEta>>,
}

#[derive(Debug, Deserialize)]
struct GmbEta {
    timestamp: String,
}

/// One direction of the route calling at the configured stop.
#[derive(Debug, Clone, PartialEq, Eq)]
struct GmbStopping {
    route_id: String,
    route_seq: String,
    stop_id: String,
    station: String,
    dest: String,
}

#[derive(Debug, Default)]
pub struct Gmb {
    stoppings: Option<Vec<GmbStopping>>,
}

#[async_trait]
impl OperatorAdapter for Gmb {
    async fn resolve(&mut self, ctx: &FetchContext<'_>) -> Result<(), ProviderError> {
        let api = ctx.api_base();
        let area = ctx.config.area()?;
        let line = ctx.config.line()?;
        let sta = ctx.config.station()?;
        let language = ctx.language();

        let routes: RouteResponse = ctx
            .fetcher
            .fetch(Request::get(format!("{api}/route/{area}/{line}")))
            .await?;
        let route = routes
            .data
            .into_iter()
            .next()
            .ok_or_else(|| MetadataError::NoMatchingRoute {
                route: format!("{area}/{line}"),
            })?;

        let requests = route
            .directions
            .iter()
            .map(|direction| {
                let url = format!("{api}/route-stop/{}/{}", route.route_id, direction.route_seq);
                (direction.clone(), Request::get(url))
            })
            .collect();
        let settled: Settled<GmbDirection, RouteStopResponse> =
            ctx.fetcher.fetch_all(requests).await;

        let mut stoppings = Vec::new();
        for (direction, stops) in settled.require_any()? {
            for stop in stops.data.route_stops {
                if !ctx.config.matches_station(&stop.stop_id) {
                    continue;
                }
                stoppings.push(GmbStopping {
                    route_id: route.route_id.clone(),
                    route_seq: direction.route_seq.clone(),
                    station: language.pick(&stop.name_tc, &stop.name_en).to_string(),
                    dest: language.pick(&direction.dest_tc, &direction.dest_en).to_string(),
                    stop_id: stop.stop_id,
                });
            }
        }

        if stoppings.is_empty() {
            return Err(MetadataError::NoMatchingStop {
                query: sta.to_string(),
                source_name: format!("GMB route {area}/{line}"),
            }
            .into());
        }

        info!(route_id = %route.route_id, directions = stoppings.len(), "Resolved GMB route");
        self.stoppings = Some(stoppings);
        Ok(())
    }

    async fn fetch(&self, ctx: &FetchContext<'_>) -> Result<Vec<EtaRecord>, ProviderError> {
        let stoppings = self.stoppings.as_ref().ok_or(MetadataError::NotResolved)?;
        let api = ctx.api_base();
        let line = ctx.config.line()?;

        let requests = stoppings
            .iter()
            .enumerate()
            .map(|(i, s)| {
                let url = format!("{api}/eta/route-stop/{}/{}", s.route_id, s.stop_id);
                (i, Request::arrivals(url))
            })
            .collect();
        let settled: Settled<usize, EtaResponse> = ctx.fetcher.fetch_all(requests).await;

        let records = settled
            .require_any()?
            .into_iter()
            .map(|(i, resp)| normalize(&stoppings[i], resp, line))
            .collect();
        Ok(records)
    }

    fn invalidate(&mut self) {
        self.stoppings = None;
    }

    fn header(&self) -> Option<String> {
        self.stoppings.as_ref()?.first().map(|s| s.station.clone())
    }
}

fn normalize(stopping: &GmbStopping, resp: EtaResponse, line: &str) -> EtaRecord {
    // The stop may be served by both directions; prefer this one's entry.
    let entry = resp
        .data
        .iter()
        .find(|e| e.route_seq.as_deref() == Some(stopping.route_seq.as_str()))
        .or_else(|| resp.data.first());

    let times = entry
        .and_then(|e| e.eta.as_ref())
        .map(|etas| {
            etas.iter()
                .filter_map(|eta| parse_timestamp(&eta.timestamp))
                .collect()
        })
        .unwrap_or_default();

    debug!(
        stop = %stopping.stop_id,
        route_seq = %stopping.route_seq,
        "Normalized GMB arrivals"
    );
    EtaRecord::new(
        line,
        &stopping.station,
        [EtaGroup::new(&stopping.dest, times)],
    )
}
