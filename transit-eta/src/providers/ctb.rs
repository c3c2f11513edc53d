//! Citybus.
//!
//! One stop, one route. The stop name is looked up once; arrivals come
//! back as a flat list that is split by direction.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::ConfigLayer;
use crate::domain::{EtaGroup, EtaRecord, Language, parse_timestamp};
use crate::fetch::Request;
use crate::metadata::MetadataError;
use crate::normalize::group_by_key;

use super::{FetchContext, OperatorAdapter, ProviderError};

pub(super) fn defaults() -> ConfigLayer {
    ConfigLayer {
        api_base: Some("https://rt.data.gov.hk/v1.1".to_string()),
        ..Default::default()
    }
}

#[derive(Debug, Deserialize)]
struct StopResponse {
    data: CtbStop,
}

#[derive(Debug, Deserialize)]
struct CtbStop {
    #[serde(default)]
    name_tc: String,
    #[serde(default)]
    name_en: String,
}

#[derive(Debug, Deserialize)]
struct EtaResponse {
    #[serde(default)]
    data: Vec<CtbEta>,
}

#[derive(Debug, Clone, Deserialize)]
struct CtbEta {
    route: String,
    #[serde(default)]
    dir: String,
    #[serde(default)]
    dest_tc: String,
    #[serde(default)]
    dest_en: String,
    #[serde(default)]
    eta: Option<String>,
}

#[derive(Debug, Default)]
pub struct Ctb {
    /// Display name of the configured stop, once resolved.
    station: Option<String>,
}

#[async_trait]
impl OperatorAdapter for Ctb {
    async fn resolve(&mut self, ctx: &FetchContext<'_>) -> Result<(), ProviderError> {
        let sta = ctx.config.station()?;
        let url = format!("{}/transport/citybus-nwfb/stop/{}", ctx.api_base(), sta);

        let station = match ctx.fetcher.fetch::<StopResponse>(Request::get(url)).await {
            Ok(resp) => {
                let name = ctx.language().pick(&resp.data.name_tc, &resp.data.name_en);
                if name.is_empty() { sta.to_string() } else { name.to_string() }
            }
            // A stop we cannot name is still worth polling.
            Err(e) if e.is_parse() => {
                warn!(stop = %sta, error = %e, "Stop lookup returned no stop, showing the stop id");
                sta.to_string()
            }
            Err(e) => return Err(e.into()),
        };

        debug!(stop = %sta, station = %station, "Resolved CTB stop");
        self.station = Some(station);
        Ok(())
    }

    async fn fetch(&self, ctx: &FetchContext<'_>) -> Result<Vec<EtaRecord>, ProviderError> {
        let station = self.station.as_deref().ok_or(MetadataError::NotResolved)?;
        let url = format!(
            "{}/transport/citybus-nwfb/eta/CTB/{}/{}",
            ctx.api_base(),
            ctx.config.station()?,
            ctx.config.line()?
        );

        let resp: EtaResponse = ctx.fetcher.fetch(Request::arrivals(url)).await?;
        Ok(normalize(
            resp.data,
            station,
            ctx.config.line()?,
            ctx.language(),
        ))
    }

    fn invalidate(&mut self) {
        self.station = None;
    }

    fn header(&self) -> Option<String> {
        self.station.clone()
    }
}

/// One record per direction, in order of first appearance.
fn normalize(
    entries: Vec<CtbEta>,
    station: &str,
    line: &str,
    language: Language,
) -> Vec<EtaRecord> {
    let by_direction = group_by_key(entries, |e| e.dir.clone());
    if by_direction.is_empty() {
        return vec![EtaRecord::empty(line, station)];
    }

    by_direction
        .into_values()
        .filter_map(|entries| {
            let first = entries.first()?;
            let dest = language.pick(&first.dest_tc, &first.dest_en).to_string();
            let route = first.route.clone();
            let times = entries
                .iter()
                .filter_map(|e| e.eta.as_deref().and_then(parse_timestamp))
                .collect();
            Some(EtaRecord::new(route, station, [EtaGroup::new(dest, times)]))
        })
        .collect()
}
