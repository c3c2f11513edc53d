//! Kowloon Motor Bus.
//!
//! KMB publishes arrivals per stop, not per route, so resolution turns
//! the configured routes (or station ids) into a set of stop ids. Each
//! poll asks every stop for its arrivals and then picks out the routes
//! that were asked for. Nearby stops report the same bus, and a route
//! variant is reported under every service type it runs as, so the
//! merged payload is de-duplicated before grouping.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use indexmap::IndexSet;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::cache::LookupCache;
use crate::config::{Bound, ConfigLayer, RouteStopping};
use crate::domain::{EtaGroup, EtaRecord, EtaTime, Language, parse_timestamp};
use crate::fetch::{FetchError, Request, Settled};
use crate::metadata::{MetadataError, majority_vote};
use crate::normalize::{dedup_by_service_type, group_by_key, service_type_rank};

use super::serde_util::string_or_number;
use super::{FetchContext, OperatorAdapter, ProviderError};

/// Sequence number standing for the last stop of a route.
const TERMINUS_SEQ: u32 = 999;

pub(super) fn defaults() -> ConfigLayer {
    ConfigLayer {
        api_base: Some("https://data.etabus.gov.hk/v1/transport/kmb".to_string()),
        ..Default::default()
    }
}

#[derive(Debug, Deserialize)]
struct RouteStopResponse {
    #[serde(default)]
    data: Vec<KmbRouteStop>,
}

#[derive(Debug, Clone, Deserialize)]
struct KmbRouteStop {
    route: String,
    bound: String,
    #[serde(deserialize_with = "string_or_number")]
    service_type: String,
    #[serde(deserialize_with = "string_or_number")]
    seq: String,
    stop: String,
}

impl KmbRouteStop {
    fn seq(&self) -> Option<u32> {
        self.seq.trim().parse().ok()
    }
}

#[derive(Debug, Deserialize)]
struct StopResponse {
    data: KmbStop,
}

#[derive(Debug, Clone, Deserialize)]
struct KmbStop {
    #[serde(default)]
    name_en: String,
    #[serde(default)]
    name_tc: String,
}

#[derive(Debug, Deserialize)]
struct StopEtaResponse {
    #[serde(default)]
    data: Vec<KmbEta>,
}

#[derive(Debug, Clone, Deserialize)]
struct KmbEta {
    route: String,
    dir: String,
    #[serde(deserialize_with = "string_or_number")]
    service_type: String,
    #[serde(default)]
    dest_tc: String,
    #[serde(default)]
    dest_en: String,
    #[serde(default)]
    eta_seq: Option<u32>,
    #[serde(default)]
    eta: Option<String>,
}

impl KmbEta {
    fn time(&self) -> Option<EtaTime> {
        self.eta.as_deref().and_then(parse_timestamp)
    }
}

/// Route, direction and service type: one variant of a route.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RouteKey {
    route: String,
    bound: Bound,
    service_type: String,
}

impl From<&RouteStopping> for RouteKey {
    fn from(stopping: &RouteStopping) -> Self {
        Self {
            route: stopping.route.clone(),
            bound: stopping.bound,
            service_type: stopping.service_type.clone(),
        }
    }
}

/// A route variant calling at a resolved stop.
#[derive(Debug, Clone)]
struct KmbStopping {
    key: RouteKey,
    stop_id: String,
    seq: u32,
}

#[derive(Debug)]
struct KmbMetadata {
    station: String,
    stoppings: Vec<KmbStopping>,
    stop_ids: Vec<String>,
}

#[derive(Default)]
pub struct Kmb {
    route_stops: LookupCache<RouteKey, Vec<KmbRouteStop>>,
    stop_names: LookupCache<String, KmbStop>,
    meta: Option<KmbMetadata>,
}

impl Kmb {
    async fn route_stop_list(
        &self,
        ctx: &FetchContext<'_>,
        key: &RouteKey,
    ) -> Result<Arc<Vec<KmbRouteStop>>, FetchError> {
        let url = format!(
            "{}/route-stop/{}/{}/{}",
            ctx.api_base(),
            key.route,
            key.bound.path_segment(),
            key.service_type
        );
        self.route_stops
            .get_or_fetch(key.clone(), || async move {
                let resp: RouteStopResponse = ctx.fetcher.fetch(Request::get(url)).await?;
                Ok(resp.data)
            })
            .await
    }

    async fn stop_name(
        &self,
        ctx: &FetchContext<'_>,
        stop_id: &str,
    ) -> Result<Arc<KmbStop>, FetchError> {
        let url = format!("{}/stop/{}", ctx.api_base(), stop_id);
        self.stop_names
            .get_or_fetch(stop_id.to_string(), || async move {
                let resp: StopResponse = ctx.fetcher.fetch(Request::get(url)).await?;
                Ok(resp.data)
            })
            .await
    }

    /// Locate each configured route object's stop in its route's stop list.
    async fn stoppings_from_routes(
        &self,
        ctx: &FetchContext<'_>,
    ) -> Result<Vec<KmbStopping>, ProviderError> {
        let configured = &ctx.config.stops;
        let keys: IndexSet<RouteKey> = configured.iter().map(RouteKey::from).collect();

        let lookups = keys.iter().map(|key| async move {
            let result = self.route_stop_list(ctx, key).await;
            (key, result)
        });

        let mut lists: HashMap<&RouteKey, Arc<Vec<KmbRouteStop>>> = HashMap::new();
        let mut failed = 0;
        for (key, result) in join_all(lookups).await {
            match result {
                Ok(list) => {
                    lists.insert(key, list);
                }
                Err(e) => {
                    failed += 1;
                    warn!(
                        route = %key.route,
                        bound = ?key.bound,
                        error = %e,
                        "Route-stop lookup failed"
                    );
                }
            }
        }
        if lists.is_empty() && failed > 0 {
            return Err(FetchError::BatchFailed { failed }.into());
        }

        let mut stoppings = Vec::new();
        for stopping in configured {
            let key = RouteKey::from(stopping);
            let Some(list) = lists.get(&key) else {
                continue;
            };

            let target = if stopping.seq == TERMINUS_SEQ {
                list.iter().filter_map(KmbRouteStop::seq).max()
            } else {
                Some(stopping.seq.saturating_add(1))
            };

            let found = target.and_then(|seq| {
                list.iter()
                    .find(|s| s.seq() == Some(seq))
                    .map(|s| (seq, s))
            });
            match found {
                Some((seq, stop)) => stoppings.push(KmbStopping {
                    key,
                    stop_id: stop.stop.clone(),
                    seq,
                }),
                None => warn!(
                    route = %stopping.route,
                    seq = stopping.seq,
                    "Route has no stop at the configured sequence"
                ),
            }
        }
        Ok(stoppings)
    }

    /// Every route variant calling at one of the configured stop ids.
    async fn stoppings_from_stations(
        &self,
        ctx: &FetchContext<'_>,
    ) -> Result<Vec<KmbStopping>, ProviderError> {
        let url = format!("{}/route-stop", ctx.api_base());
        let resp: RouteStopResponse = ctx.fetcher.fetch(Request::get(url)).await?;

        let stoppings = resp
            .data
            .into_iter()
            .filter(|s| ctx.config.matches_station(&s.stop))
            .filter_map(|s| {
                let bound = Bound::from_code(&s.bound)?;
                let seq = s.seq()?;
                Some(KmbStopping {
                    key: RouteKey {
                        route: s.route,
                        bound,
                        service_type: s.service_type,
                    },
                    stop_id: s.stop,
                    seq,
                })
            })
            .collect();
        Ok(stoppings)
    }

    /// Display name for the resolved stops.
    ///
    /// Stops sharing a station usually share a name, but not always; the
    /// most common name wins. Stops whose name cannot be fetched are left
    /// out of the vote.
    async fn station_name(&self, ctx: &FetchContext<'_>, stop_ids: &[String]) -> String {
        let language = ctx.language();
        let lookups = stop_ids.iter().map(|id| async move {
            let result = self.stop_name(ctx, id).await;
            (id, result)
        });

        let mut names = Vec::new();
        for (id, result) in join_all(lookups).await {
            match result {
                Ok(stop) => {
                    names.push(language.pick(&stop.name_tc, &stop.name_en).to_string())
                }
                Err(e) => warn!(
                    stop = %id,
                    error = %e,
                    "Stop name lookup failed, keeping the stop id"
                ),
            }
        }

        majority_vote(names.into_iter().filter(|n| !n.is_empty()))
            .or_else(|| stop_ids.first().cloned())
            .unwrap_or_default()
    }
}

#[async_trait]
impl OperatorAdapter for Kmb {
    async fn resolve(&mut self, ctx: &FetchContext<'_>) -> Result<(), ProviderError> {
        let mut stoppings = if ctx.config.stops.is_empty() {
            self.stoppings_from_stations(ctx).await?
        } else {
            self.stoppings_from_routes(ctx).await?
        };

        stoppings.sort_by(|a, b| {
            a.stop_id
                .cmp(&b.stop_id)
                .then_with(|| a.key.route.cmp(&b.key.route))
                .then(a.seq.cmp(&b.seq))
        });
        let mut seen = HashSet::new();
        stoppings.retain(|s| seen.insert((s.key.clone(), s.stop_id.clone())));

        if stoppings.is_empty() {
            return Err(MetadataError::NoMatchingStop {
                query: describe_query(ctx),
                source_name: "KMB route-stop list".to_string(),
            }
            .into());
        }

        let stop_ids: Vec<String> = stoppings
            .iter()
            .map(|s| s.stop_id.clone())
            .collect::<IndexSet<_>>()
            .into_iter()
            .collect();
        let station = self.station_name(ctx, &stop_ids).await;

        info!(
            station = %station,
            stops = stop_ids.len(),
            routes = stoppings.len(),
            "Resolved KMB stops"
        );
        self.meta = Some(KmbMetadata {
            station,
            stoppings,
            stop_ids,
        });
        Ok(())
    }

    async fn fetch(&self, ctx: &FetchContext<'_>) -> Result<Vec<EtaRecord>, ProviderError> {
        let meta = self.meta.as_ref().ok_or(MetadataError::NotResolved)?;

        let requests = meta
            .stop_ids
            .iter()
            .map(|id| {
                let url = format!("{}/stop-eta/{}", ctx.api_base(), id);
                (id.clone(), Request::arrivals(url))
            })
            .collect();
        let settled: Settled<String, StopEtaResponse> = ctx.fetcher.fetch_all(requests).await;

        let entries: Vec<KmbEta> = settled
            .require_any()?
            .into_iter()
            .flat_map(|(_, resp)| resp.data)
            .collect();
        debug!(entries = entries.len(), "Fetched KMB arrivals");

        Ok(normalize(entries, meta, ctx.language()))
    }

    fn invalidate(&mut self) {
        self.meta = None;
        self.route_stops.invalidate_all();
        self.stop_names.invalidate_all();
    }

    fn header(&self) -> Option<String> {
        self.meta.as_ref().map(|m| m.station.clone())
    }
}

fn describe_query(ctx: &FetchContext<'_>) -> String {
    if ctx.config.stops.is_empty() {
        ctx.config.stations.join(",")
    } else {
        ctx.config
            .stops
            .iter()
            .map(|s| format!("{}/{}/{}", s.route, s.bound.code(), s.service_type))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// One record per resolved route and direction, in resolution order.
///
/// Service-type variants of a route share a row: the same bus is reported
/// once per variant and collapses to the lowest service type, so a route
/// object naming any variant still receives it.
fn normalize(entries: Vec<KmbEta>, meta: &KmbMetadata, language: Language) -> Vec<EtaRecord> {
    let entries: Vec<KmbEta> = entries.into_iter().filter(|e| e.time().is_some()).collect();
    let entries = dedup_by_service_type(
        entries,
        |e| (e.route.clone(), e.dir.clone(), e.eta.clone()),
        |e| service_type_rank(&e.service_type),
    );
    let by_route = group_by_key(entries, |e| (e.route.clone(), e.dir.clone()));

    let mut emitted = HashSet::new();
    meta.stoppings
        .iter()
        .map(|s| (s.key.route.clone(), s.key.bound.code().to_string()))
        .filter(|route_dir| emitted.insert(route_dir.clone()))
        .map(|route_dir| {
            let Some(found) = by_route.get(&route_dir) else {
                return EtaRecord::empty(&route_dir.0, &meta.station);
            };

            let mut found: Vec<&KmbEta> = found.iter().collect();
            found.sort_by_key(|e| (e.time(), e.eta_seq.unwrap_or(u32::MAX)));

            let dest = found
                .first()
                .map(|e| language.pick(&e.dest_tc, &e.dest_en))
                .unwrap_or_default();
            let times = found.iter().filter_map(|e| e.time()).collect();
            EtaRecord::new(&route_dir.0, &meta.station, [EtaGroup::new(dest, times)])
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Clock;
    use crate::providers::ProviderKind;
    use crate::testing::{StubTransport, adapter_fixture};

    const API: &str = "https://data.etabus.gov.hk/v1/transport/kmb";

    const ALL_ROUTE_STOPS: &str = r#"{"type":"RouteStopList","data":[
        {"route":"274","bound":"O","service_type":"1","seq":"4","stop":"STOP_A"},
        {"route":"43X","bound":"I","service_type":"1","seq":"12","stop":"STOP_B"},
        {"route":"1A","bound":"O","service_type":"1","seq":"3","stop":"STOP_Z"}
    ]}"#;

    const MOCK_ETA: &str = r#"{"type":"StopETA","data":[
        {"co":"KMB","route":"43X","dir":"I","service_type":1,"seq":12,"dest_tc":"長青","dest_en":"CHEUNG CHING","eta_seq":1,"eta":"2024-03-15T10:04:00+08:00"},
        {"co":"KMB","route":"274","dir":"O","service_type":1,"seq":4,"dest_tc":"沙田","dest_en":"SHA TIN","eta_seq":2,"eta":"2024-03-15T10:15:00+08:00"},
        {"co":"KMB","route":"274","dir":"O","service_type":1,"seq":4,"dest_tc":"沙田","dest_en":"SHA TIN","eta_seq":1,"eta":"2024-03-15T10:05:00+08:00"},
        {"co":"KMB","route":"274","dir":"O","service_type":1,"seq":4,"dest_tc":"沙田","dest_en":"SHA TIN","eta_seq":3,"eta":null}
    ]}"#;

    fn stop(name_en: &str, name_tc: &str) -> String {
        format!(r#"{{"type":"Stop","data":{{"stop":"X","name_en":"{name_en}","name_tc":"{name_tc}"}}}}"#)
    }

    fn two_stop_layer(lang: &str) -> ConfigLayer {
        ConfigLayer {
            sta: Some(crate::config::Identifiers::Many(vec![
                "STOP_A".to_string(),
                "STOP_B".to_string(),
            ])),
            ..Default::default()
        }
        .with_lang(lang)
        .with_mock_data(MOCK_ETA)
    }

    fn two_stop_stub() -> StubTransport {
        StubTransport::new()
            .with(&format!("{API}/route-stop"), ALL_ROUTE_STOPS)
            .with(&format!("{API}/stop/STOP_A"), &stop("TAI PO MARKET", "大埔墟"))
            .with(&format!("{API}/stop/STOP_B"), &stop("TAI PO MARKET", "大埔墟"))
    }

    async fn resolve_and_fetch(kmb: &mut Kmb, ctx: &FetchContext<'_>) -> Vec<EtaRecord> {
        kmb.resolve(ctx).await.unwrap();
        kmb.fetch(ctx).await.unwrap()
    }

    #[tokio::test]
    async fn two_stops_two_routes_english() {
        let stub = Arc::new(two_stop_stub());
        let (config, fetcher) = adapter_fixture(ProviderKind::Kmb, two_stop_layer("en"), &stub);
        let ctx = FetchContext {
            config: &config,
            fetcher: &fetcher,
            clock: Clock::System,
        };

        let records = resolve_and_fetch(&mut Kmb::default(), &ctx).await;

        let lines: Vec<&str> = records.iter().map(|r| r.line.as_str()).collect();
        assert_eq!(lines, vec!["274", "43X"]);
        assert!(records.iter().all(|r| r.station == "TAI PO MARKET"));
        assert_eq!(records[0].etas[0].dest(), "SHA TIN");
        assert_eq!(records[1].etas[0].dest(), "CHEUNG CHING");

        // Both stops answered with the same payload; duplicates collapse.
        let times: Vec<String> = records[0].etas[0]
            .times()
            .iter()
            .map(|t| t.to_rfc3339())
            .collect();
        assert_eq!(times, vec!["2024-03-15T10:05:00+08:00", "2024-03-15T10:15:00+08:00"]);
    }

    #[tokio::test]
    async fn two_stops_two_routes_chinese() {
        let stub = Arc::new(two_stop_stub());
        let (config, fetcher) = adapter_fixture(ProviderKind::Kmb, two_stop_layer("zh-tw"), &stub);
        let ctx = FetchContext {
            config: &config,
            fetcher: &fetcher,
            clock: Clock::System,
        };

        let mut kmb = Kmb::default();
        let records = resolve_and_fetch(&mut kmb, &ctx).await;

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].station, "大埔墟");
        assert_eq!(records[0].etas[0].dest(), "沙田");
        assert_eq!(records[1].etas[0].dest(), "長青");
        assert_eq!(kmb.header().as_deref(), Some("大埔墟"));
    }

    #[tokio::test]
    async fn same_payload_normalizes_identically() {
        let stub = Arc::new(two_stop_stub());
        let (config, fetcher) = adapter_fixture(ProviderKind::Kmb, two_stop_layer("en"), &stub);
        let ctx = FetchContext {
            config: &config,
            fetcher: &fetcher,
            clock: Clock::System,
        };

        let mut kmb = Kmb::default();
        let first = resolve_and_fetch(&mut kmb, &ctx).await;
        let second = kmb.fetch(&ctx).await.unwrap();

        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[tokio::test]
    async fn duplicates_keep_lower_service_type() {
        let payload = r#"{"data":[
            {"route":"274","dir":"O","service_type":2,"dest_tc":"沙田 (特別班)","dest_en":"SHA TIN (SPECIAL)","eta_seq":1,"eta":"2024-03-15T10:05:00+08:00"},
            {"route":"274","dir":"O","service_type":1,"dest_tc":"沙田","dest_en":"SHA TIN","eta_seq":1,"eta":"2024-03-15T10:05:00+08:00"}
        ]}"#;
        let stub = Arc::new(two_stop_stub());
        let layer = two_stop_layer("en").with_mock_data(payload);
        let (config, fetcher) = adapter_fixture(ProviderKind::Kmb, layer, &stub);
        let ctx = FetchContext {
            config: &config,
            fetcher: &fetcher,
            clock: Clock::System,
        };

        let records = resolve_and_fetch(&mut Kmb::default(), &ctx).await;

        assert_eq!(records[0].line, "274");
        assert_eq!(records[0].etas.len(), 1);
        assert_eq!(records[0].etas[0].dest(), "SHA TIN");
        assert_eq!(records[0].etas[0].times().len(), 1);
        // 43X has nothing in this payload but keeps its row.
        assert_eq!(records[1].line, "43X");
        assert!(!records[1].has_arrivals());
    }

    #[tokio::test]
    async fn one_failing_stop_keeps_the_other_four() {
        let ids = ["S1", "S2", "S3", "S4", "S5"];
        let routes = ["1", "2", "3", "4", "5"];

        let route_stops: Vec<String> = ids
            .iter()
            .zip(routes)
            .map(|(id, route)| {
                format!(r#"{{"route":"{route}","bound":"O","service_type":"1","seq":"1","stop":"{id}"}}"#)
            })
            .collect();
        let mut stub = StubTransport::new().with(
            &format!("{API}/route-stop"),
            &format!(r#"{{"data":[{}]}}"#, route_stops.join(",")),
        );
        for (id, route) in ids.iter().zip(routes) {
            stub = stub.with(
                &format!("{API}/stop/{id}"),
                &stop("SHATIN CENTRAL", "沙田中心"),
            );
            let url = format!("{API}/stop-eta/{id}");
            stub = if *id == "S3" {
                stub.failing(&url)
            } else {
                stub.with(
                    &url,
                    &format!(
                        r#"{{"data":[{{"route":"{route}","dir":"O","service_type":"1","dest_tc":"x","dest_en":"X","eta_seq":1,"eta":"2024-03-15T10:0{route}:00+08:00"}}]}}"#
                    ),
                )
            };
        }
        let stub = Arc::new(stub);

        let layer = ConfigLayer {
            sta: Some(crate::config::Identifiers::Many(
                ids.iter().map(|s| s.to_string()).collect(),
            )),
            ..Default::default()
        };
        let (config, fetcher) = adapter_fixture(ProviderKind::Kmb, layer, &stub);
        let ctx = FetchContext {
            config: &config,
            fetcher: &fetcher,
            clock: Clock::System,
        };

        let records = resolve_and_fetch(&mut Kmb::default(), &ctx).await;

        assert_eq!(records.len(), 5);
        let with_arrivals: Vec<&str> = records
            .iter()
            .filter(|r| r.has_arrivals())
            .map(|r| r.line.as_str())
            .collect();
        assert_eq!(with_arrivals, vec!["1", "2", "4", "5"]);
    }

    #[tokio::test]
    async fn explicit_routes_with_terminus() {
        let list = r#"{"data":[
            {"route":"1A","bound":"O","service_type":"1","seq":"1","stop":"FIRST"},
            {"route":"1A","bound":"O","service_type":"1","seq":"2","stop":"MIDDLE"},
            {"route":"1A","bound":"O","service_type":"1","seq":"3","stop":"LAST"}
        ]}"#;
        let stub = Arc::new(
            StubTransport::new()
                .with(&format!("{API}/route-stop/1A/outbound/1"), list)
                .with(&format!("{API}/stop/MIDDLE"), &stop("MONG KOK", "旺角"))
                .with(&format!("{API}/stop/LAST"), &stop("STAR FERRY", "尖沙咀碼頭")),
        );
        let layer = ConfigLayer {
            stops: Some(vec![
                RouteStopping {
                    route: "1A".to_string(),
                    bound: Bound::Outbound,
                    service_type: "1".to_string(),
                    seq: 1,
                },
                RouteStopping {
                    route: "1A".to_string(),
                    bound: Bound::Outbound,
                    service_type: "1".to_string(),
                    seq: TERMINUS_SEQ,
                },
            ]),
            ..Default::default()
        };
        let (config, fetcher) = adapter_fixture(ProviderKind::Kmb, layer, &stub);
        let ctx = FetchContext {
            config: &config,
            fetcher: &fetcher,
            clock: Clock::System,
        };

        let mut kmb = Kmb::default();
        kmb.resolve(&ctx).await.unwrap();

        let meta = kmb.meta.as_ref().unwrap();
        assert_eq!(meta.stop_ids, vec!["LAST".to_string(), "MIDDLE".to_string()]);

        // The shared route-stop list is fetched once.
        let list_fetches = stub
            .requested_urls()
            .iter()
            .filter(|u| u.ends_with("/route-stop/1A/outbound/1"))
            .count();
        assert_eq!(list_fetches, 1);
    }

    #[tokio::test]
    async fn special_service_row_receives_collapsed_arrival() {
        let list = r#"{"data":[
            {"route":"74X","bound":"O","service_type":"2","seq":"1","stop":"A"},
            {"route":"74X","bound":"O","service_type":"2","seq":"2","stop":"B"}
        ]}"#;
        let payload = r#"{"data":[
            {"route":"74X","dir":"O","service_type":1,"dest_tc":"九龍灣","dest_en":"KOWLOON BAY","eta_seq":1,"eta":"2024-03-15T10:05:00+08:00"},
            {"route":"74X","dir":"O","service_type":2,"dest_tc":"九龍灣","dest_en":"KOWLOON BAY","eta_seq":1,"eta":"2024-03-15T10:05:00+08:00"},
            {"route":"74X","dir":"O","service_type":2,"dest_tc":"九龍灣","dest_en":"KOWLOON BAY","eta_seq":2,"eta":"2024-03-15T10:20:00+08:00"}
        ]}"#;
        let stub = Arc::new(
            StubTransport::new()
                .with(&format!("{API}/route-stop/74X/outbound/2"), list)
                .with(&format!("{API}/stop/B"), &stop("TAI PO CENTRAL", "大埔中心")),
        );
        let layer = ConfigLayer {
            stops: Some(vec![RouteStopping {
                route: "74X".to_string(),
                bound: Bound::Outbound,
                service_type: "2".to_string(),
                seq: 1,
            }]),
            ..Default::default()
        }
        .with_mock_data(payload);
        let (config, fetcher) = adapter_fixture(ProviderKind::Kmb, layer, &stub);
        let ctx = FetchContext {
            config: &config,
            fetcher: &fetcher,
            clock: Clock::System,
        };

        let records = resolve_and_fetch(&mut Kmb::default(), &ctx).await;

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].line, "74X");
        assert_eq!(records[0].station, "TAI PO CENTRAL");
        let times: Vec<String> = records[0].etas[0]
            .times()
            .iter()
            .map(|t| t.to_rfc3339())
            .collect();
        assert_eq!(
            times,
            vec!["2024-03-15T10:05:00+08:00", "2024-03-15T10:20:00+08:00"]
        );
    }

    #[tokio::test]
    async fn stop_name_failure_keeps_the_id() {
        let stub = Arc::new(
            StubTransport::new()
                .with(&format!("{API}/route-stop"), ALL_ROUTE_STOPS)
                .failing(&format!("{API}/stop/STOP_A")),
        );
        let layer = ConfigLayer::default()
            .with_station("STOP_A")
            .with_mock_data(MOCK_ETA);
        let (config, fetcher) = adapter_fixture(ProviderKind::Kmb, layer, &stub);
        let ctx = FetchContext {
            config: &config,
            fetcher: &fetcher,
            clock: Clock::System,
        };

        let records = resolve_and_fetch(&mut Kmb::default(), &ctx).await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].station, "STOP_A");
        assert!(records[0].has_arrivals());
    }

    #[tokio::test]
    async fn majority_name_wins() {
        let stub = Arc::new(
            StubTransport::new()
                .with(
                    &format!("{API}/route-stop"),
                    r#"{"data":[
                        {"route":"1","bound":"O","service_type":"1","seq":"1","stop":"A"},
                        {"route":"2","bound":"O","service_type":"1","seq":"1","stop":"B"},
                        {"route":"3","bound":"O","service_type":"1","seq":"1","stop":"C"}
                    ]}"#,
                )
                .with(&format!("{API}/stop/A"), &stop("MONG KOK STATION", "旺角站"))
                .with(&format!("{API}/stop/B"), &stop("MONG KOK", "旺角"))
                .with(&format!("{API}/stop/C"), &stop("MONG KOK", "旺角")),
        );
        let layer = ConfigLayer {
            sta: Some(crate::config::Identifiers::Many(vec![
                "A".to_string(),
                "B".to_string(),
                "C".to_string(),
            ])),
            ..Default::default()
        };
        let (config, fetcher) = adapter_fixture(ProviderKind::Kmb, layer, &stub);
        let ctx = FetchContext {
            config: &config,
            fetcher: &fetcher,
            clock: Clock::System,
        };

        let mut kmb = Kmb::default();
        kmb.resolve(&ctx).await.unwrap();
        assert_eq!(kmb.header().as_deref(), Some("MONG KOK"));
    }

    #[tokio::test]
    async fn no_matching_stop() {
        let stub = Arc::new(
            StubTransport::new().with(&format!("{API}/route-stop"), ALL_ROUTE_STOPS),
        );
        let layer = ConfigLayer::default().with_station("NOWHERE");
        let (config, fetcher) = adapter_fixture(ProviderKind::Kmb, layer, &stub);
        let ctx = FetchContext {
            config: &config,
            fetcher: &fetcher,
            clock: Clock::System,
        };

        let err = Kmb::default().resolve(&ctx).await.unwrap_err();
        assert!(matches!(
            err,
            ProviderError::Metadata(MetadataError::NoMatchingStop { .. })
        ));
    }

    #[tokio::test]
    async fn invalidate_clears_cached_lookups() {
        let stub = Arc::new(two_stop_stub());
        let (config, fetcher) = adapter_fixture(ProviderKind::Kmb, two_stop_layer("en"), &stub);
        let ctx = FetchContext {
            config: &config,
            fetcher: &fetcher,
            clock: Clock::System,
        };

        let mut kmb = Kmb::default();
        kmb.resolve(&ctx).await.unwrap();
        let calls = stub.calls();

        kmb.invalidate();
        assert!(kmb.header().is_none());
        kmb.resolve(&ctx).await.unwrap();
        assert_eq!(stub.calls(), calls * 2);
    }
}
