//! MTR heavy rail.
//!
//! Interchange stations sit on several lines, and the schedule endpoint
//! answers one (line, station) pair at a time, so a single configured
//! station can fan out into several requests.

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::Deserialize;
use tracing::{debug, info};

use crate::config::ConfigLayer;
use crate::domain::{EtaGroup, EtaRecord, Language, parse_timestamp};
use crate::fetch::{Request, Settled};
use crate::metadata::MetadataError;
use crate::normalize::group_by_key;

use super::serde_util::opt_string_or_number;
use super::{FetchContext, OperatorAdapter, ProviderError};

pub(super) fn defaults() -> ConfigLayer {
    ConfigLayer {
        api_base: Some(
            "https://rt.data.gov.hk/v1/transport/mtr/getSchedule.php".to_string(),
        ),
        dataset: Some("data/mtr-lines.json".to_string()),
        ..Default::default()
    }
}

#[derive(Debug, Clone, Deserialize)]
struct MtrLine {
    #[serde(default)]
    en: String,
    #[serde(default)]
    tc: String,
    #[serde(default)]
    stations: Vec<MtrStation>,
}

#[derive(Debug, Clone, Deserialize)]
struct MtrStation {
    code: String,
    #[serde(default)]
    en: String,
    #[serde(default)]
    tc: String,
}

#[derive(Debug, Deserialize)]
struct ScheduleResponse {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: IndexMap<String, StationSchedule>,
}

#[derive(Debug, Default, Deserialize)]
struct StationSchedule {
    #[serde(rename = "UP", default)]
    up: Vec<MtrTrain>,
    #[serde(rename = "DOWN", default)]
    down: Vec<MtrTrain>,
}

#[derive(Debug, Deserialize)]
struct MtrTrain {
    dest: String,
    time: String,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    plat: Option<String>,
}

/// One line serving the configured station.
#[derive(Debug, Clone, PartialEq, Eq)]
struct LineStop {
    line_code: String,
    station_code: String,
    line: String,
    station: String,
}

#[derive(Debug)]
struct MtrMetadata {
    /// Dataset, kept for translating destination codes.
    lines: IndexMap<String, MtrLine>,
    stops: Vec<LineStop>,
}

impl MtrMetadata {
    fn station_name(&self, line_code: &str, code: &str, language: Language) -> String {
        self.lines
            .get(line_code)
            .and_then(|line| line.stations.iter().find(|s| s.code == code))
            .map(|s| language.pick(&s.tc, &s.en).to_string())
            .unwrap_or_else(|| code.to_string())
    }
}

#[derive(Debug, Default)]
pub struct Mtr {
    meta: Option<MtrMetadata>,
}

#[async_trait]
impl OperatorAdapter for Mtr {
    async fn resolve(&mut self, ctx: &FetchContext<'_>) -> Result<(), ProviderError> {
        let source = ctx.config.dataset()?;
        let lines: IndexMap<String, MtrLine> = ctx.fetcher.dataset(source).await?;
        if lines.is_empty() {
            return Err(MetadataError::EmptyDataset(source.to_string()).into());
        }

        let language = ctx.language();
        let stops: Vec<LineStop> = lines
            .iter()
            .flat_map(|(line_code, line)| {
                line.stations
                    .iter()
                    .filter(move |s| {
                        ctx.config.matches_station(&s.en)
                            || ctx.config.matches_station(&s.tc)
                            || ctx.config.matches_station(&s.code)
                    })
                    .map(move |s| LineStop {
                        line_code: line_code.clone(),
                        station_code: s.code.clone(),
                        line: language.pick(&line.tc, &line.en).to_string(),
                        station: language.pick(&s.tc, &s.en).to_string(),
                    })
            })
            .collect();

        if stops.is_empty() {
            return Err(MetadataError::NoMatchingStop {
                query: ctx.config.stations.join(","),
                source_name: source.to_string(),
            }
            .into());
        }

        info!(
            lines = ?stops.iter().map(|s| s.line_code.as_str()).collect::<Vec<_>>(),
            "Resolved MTR station"
        );
        self.meta = Some(MtrMetadata { lines, stops });
        Ok(())
    }

    async fn fetch(&self, ctx: &FetchContext<'_>) -> Result<Vec<EtaRecord>, ProviderError> {
        let meta = self.meta.as_ref().ok_or(MetadataError::NotResolved)?;

        let requests = meta
            .stops
            .iter()
            .enumerate()
            .map(|(i, stop)| {
                let url = format!(
                    "{}?line={}&sta={}",
                    ctx.api_base(),
                    stop.line_code,
                    stop.station_code
                );
                (i, Request::arrivals(url))
            })
            .collect();
        let settled: Settled<usize, ScheduleResponse> = ctx.fetcher.fetch_all(requests).await;

        let records = settled
            .require_any()?
            .into_iter()
            .map(|(i, resp)| {
                normalize(meta, &meta.stops[i], resp, ctx.language())
            })
            .collect();
        Ok(records)
    }

    fn invalidate(&mut self) {
        self.meta = None;
    }

    fn header(&self) -> Option<String> {
        self.meta.as_ref()?.stops.first().map(|s| s.station.clone())
    }
}

/// One record for the line, with a group per direction and destination.
fn normalize(
    meta: &MtrMetadata,
    stop: &LineStop,
    mut resp: ScheduleResponse,
    language: Language,
) -> EtaRecord {
    let key = format!("{}-{}", stop.line_code, stop.station_code);
    let schedule = match resp.data.shift_remove(&key) {
        Some(schedule) => schedule,
        None => {
            // Some answers are keyed differently; fall back to the only entry.
            match resp.data.shift_remove_index(0) {
                Some((_, schedule)) => schedule,
                None => {
                    debug!(key = %key, message = ?resp.message, "No MTR schedule in response");
                    StationSchedule::default()
                }
            }
        }
    };

    let mut groups = Vec::new();
    for trains in [schedule.up, schedule.down] {
        for (dest, trains) in group_by_key(trains, |t| t.dest.clone()) {
            let platforms: Vec<_> = trains.iter().map(|t| t.plat.as_deref()).collect();
            debug!(dest = %dest, platforms = ?platforms, "MTR trains");
            let times = trains
                .iter()
                .filter_map(|t| parse_timestamp(&t.time))
                .collect();
            groups.push(EtaGroup::new(
                meta.station_name(&stop.line_code, &dest, language),
                times,
            ));
        }
    }

    EtaRecord::new(&stop.line, &stop.station, groups)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Clock;
    use crate::providers::ProviderKind;
    use crate::testing::{StubTransport, adapter_fixture};
    use std::sync::Arc;

    const API: &str = "https://rt.data.gov.hk/v1/transport/mtr/getSchedule.php";

    const DATASET: &str = r#"{
        "TKL": {"en": "Tseung Kwan O Line", "tc": "將軍澳綫", "stations": [
            {"code": "NOP", "en": "North Point", "tc": "北角"},
            {"code": "TIK", "en": "Tiu Keng Leng", "tc": "調景嶺"},
            {"code": "POA", "en": "Po Lam", "tc": "寶琳"},
            {"code": "LHP", "en": "LOHAS Park", "tc": "康城"}
        ]},
        "KTL": {"en": "Kwun Tong Line", "tc": "觀塘綫", "stations": [
            {"code": "WHA", "en": "Whampoa", "tc": "黃埔"},
            {"code": "TIK", "en": "Tiu Keng Leng", "tc": "調景嶺"}
        ]}
    }"#;

    const TKL: &str = r#"{"status":1,"message":"successful","sys_time":"2024-03-15 10:00:00","curr_time":"2024-03-15 10:00:00",
        "data":{"TKL-TIK":{"curr_time":"2024-03-15 10:00:00","sys_time":"2024-03-15 10:00:00",
            "UP":[
                {"ttnt":"6","valid":"Y","plat":"2","time":"2024-03-15 10:06:00","source":"-","dest":"POA","seq":"2"},
                {"ttnt":"1","valid":"Y","plat":"2","time":"2024-03-15 10:01:00","source":"-","dest":"POA","seq":"1"},
                {"ttnt":"3","valid":"Y","plat":"2","time":"2024-03-15 10:03:00","source":"-","dest":"LHP","seq":"3"}
            ],
            "DOWN":[
                {"ttnt":"2","valid":"Y","plat":"1","time":"2024-03-15 10:02:00","source":"-","dest":"NOP","seq":"1"}
            ]}},"isdelay":"N"}"#;

    const KTL: &str = r#"{"status":1,"message":"successful","data":{"KTL-TIK":{
            "UP":[],
            "DOWN":[{"ttnt":"4","valid":"Y","plat":"4","time":"2024-03-15 10:04:00","source":"-","dest":"WHA","seq":"1"}]
        }},"isdelay":"N"}"#;

    fn setup(station: &str, lang: &str) -> (Arc<StubTransport>, tempfile::TempDir, ConfigLayer) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mtr-lines.json");
        std::fs::write(&path, DATASET).unwrap();

        let stub = Arc::new(
            StubTransport::new()
                .with(&format!("{API}?line=TKL&sta=TIK"), TKL)
                .with(&format!("{API}?line=KTL&sta=TIK"), KTL),
        );
        let layer = ConfigLayer {
            dataset: Some(path.to_str().unwrap().to_string()),
            ..ConfigLayer::default().with_station(station).with_lang(lang)
        };
        (stub, dir, layer)
    }

    #[tokio::test]
    async fn interchange_yields_one_record_per_line() {
        let (stub, _dir, layer) = setup("Tiu Keng Leng", "en");
        let (config, fetcher) = adapter_fixture(ProviderKind::Mtr, layer, &stub);
        let ctx = FetchContext {
            config: &config,
            fetcher: &fetcher,
            clock: Clock::System,
        };

        let mut mtr = Mtr::default();
        mtr.resolve(&ctx).await.unwrap();
        let records = mtr.fetch(&ctx).await.unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].line, "Tseung Kwan O Line");
        assert_eq!(records[0].station, "Tiu Keng Leng");

        let dests: Vec<&str> = records[0].etas.iter().map(|g| g.dest()).collect();
        assert_eq!(dests, vec!["Po Lam", "LOHAS Park", "North Point"]);
        let po_lam: Vec<String> = records[0].etas[0]
            .times()
            .iter()
            .map(|t| t.to_rfc3339())
            .collect();
        assert_eq!(po_lam, vec!["2024-03-15T10:01:00+08:00", "2024-03-15T10:06:00+08:00"]);

        assert_eq!(records[1].line, "Kwun Tong Line");
        assert_eq!(records[1].etas.len(), 1);
        assert_eq!(records[1].etas[0].dest(), "Whampoa");
    }

    #[tokio::test]
    async fn chinese_names_and_station_code() {
        let (stub, _dir, layer) = setup("TIK", "zh-HK");
        let (config, fetcher) = adapter_fixture(ProviderKind::Mtr, layer, &stub);
        let ctx = FetchContext {
            config: &config,
            fetcher: &fetcher,
            clock: Clock::System,
        };

        let mut mtr = Mtr::default();
        mtr.resolve(&ctx).await.unwrap();
        let records = mtr.fetch(&ctx).await.unwrap();

        assert_eq!(records[0].line, "將軍澳綫");
        assert_eq!(records[0].station, "調景嶺");
        assert_eq!(records[0].etas[0].dest(), "寶琳");
        assert_eq!(mtr.header().as_deref(), Some("調景嶺"));
    }

    #[tokio::test]
    async fn one_line_failing_keeps_the_other() {
        let (_, _dir, layer) = setup("Tiu Keng Leng", "en");
        let stub = Arc::new(
            StubTransport::new()
                .with(&format!("{API}?line=TKL&sta=TIK"), TKL)
                .failing(&format!("{API}?line=KTL&sta=TIK")),
        );
        let (config, fetcher) = adapter_fixture(ProviderKind::Mtr, layer, &stub);
        let ctx = FetchContext {
            config: &config,
            fetcher: &fetcher,
            clock: Clock::System,
        };

        let mut mtr = Mtr::default();
        mtr.resolve(&ctx).await.unwrap();
        let records = mtr.fetch(&ctx).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].line, "Tseung Kwan O Line");
    }

    #[tokio::test]
    async fn empty_schedule_keeps_the_row() {
        let (_, _dir, layer) = setup("Whampoa", "en");
        let stub = Arc::new(StubTransport::new().with(
            &format!("{API}?line=KTL&sta=WHA"),
            r#"{"status":0,"message":"The contents are empty!","data":{}}"#,
        ));
        let (config, fetcher) = adapter_fixture(ProviderKind::Mtr, layer, &stub);
        let ctx = FetchContext {
            config: &config,
            fetcher: &fetcher,
            clock: Clock::System,
        };

        let mut mtr = Mtr::default();
        mtr.resolve(&ctx).await.unwrap();
        let records = mtr.fetch(&ctx).await.unwrap();
        assert_eq!(records, vec![EtaRecord::empty("Kwun Tong Line", "Whampoa")]);
    }

    #[tokio::test]
    async fn empty_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mtr-lines.json");
        std::fs::write(&path, "{}").unwrap();

        let stub = Arc::new(StubTransport::new());
        let layer = ConfigLayer {
            dataset: Some(path.to_str().unwrap().to_string()),
            ..ConfigLayer::default().with_station("Central")
        };
        let (config, fetcher) = adapter_fixture(ProviderKind::Mtr, layer, &stub);
        let ctx = FetchContext {
            config: &config,
            fetcher: &fetcher,
            clock: Clock::System,
        };

        let err = Mtr::default().resolve(&ctx).await.unwrap_err();
        assert!(matches!(
            err,
            ProviderError::Metadata(MetadataError::EmptyDataset(_))
        ));
    }
}
