/// Integration tests for the reconciliation pipeline
///
/// Replays recorded KiWIS and Hydstra payloads through the public parsers,
/// so one test covers the whole path: timestamp decoding, quality
/// filtering, unit conversion, trend, freshness-gated fallback, status
/// classification, extended attribute merge and the warnings summary.
/// The HTTP fetch is the only part replaced.
///
/// Reference instant: 2024-05-01 12:00 AEST (02:00 UTC).

use chrono::{DateTime, Duration, TimeZone, Utc};
use hydrowatch_service::alert::warnings::derive_warnings;
use hydrowatch_service::cache::{CacheGateway, MemoryCacheStore};
use hydrowatch_service::clock::{Clock, ManualClock};
use hydrowatch_service::config::{parse_stations, CacheSection, OrchestratorSection};
use hydrowatch_service::daemon::Daemon;
use hydrowatch_service::endpoint;
use hydrowatch_service::ingest::bom::parse_values_response;
use hydrowatch_service::ingest::wmip::parse_traces_response;
use hydrowatch_service::ingest::{into_history, latest_reading, level_reading, Provider};
use hydrowatch_service::model::{
    FloodStatus, HistoryPoint, Location, ProviderError, Reading, ReadingKind, Source, Trend,
};
use hydrowatch_service::orchestrator::{Orchestrator, ProviderSet};
use hydrowatch_service::ratelimit::RateLimiter;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Recorded payloads
// ---------------------------------------------------------------------------

const STATIONS: &str = r#"
    [[station]]
    id = "143107A"
    name = "Bremer River at Walloon"
    latitude = -27.6053
    longitude = 152.6706
    river_system = "brisbane"
    stream = "Bremer River"
    extended = ["discharge"]
    [station.thresholds]
    minor = 5.0
    moderate = 7.0
    major = 9.0

    [[station]]
    id = "143001C"
    name = "Brisbane River at Savages Crossing"
    latitude = -27.4411
    longitude = 152.6694
    river_system = "brisbane"
    stream = "Brisbane River"

    [[station]]
    id = "145014A"
    name = "Logan River at Yarrahappini"
    latitude = -27.8261
    longitude = 153.0169
    river_system = "logan"
    stream = "Logan River"
"#;

/// Rising at 0.2 m/h, with a trailing no-data row and a null row.
const BOM_BREMER: &str = r#"[{
    "ts_id": "208669010",
    "columns": "Timestamp,Value,Quality Code",
    "data": [
      ["2024-05-01T10:00:00.000+10:00", 4.812, 10],
      ["2024-05-01T10:15:00.000+10:00", 4.861, 10],
      ["2024-05-01T10:30:00.000+10:00", 4.905, 10],
      ["2024-05-01T10:45:00.000+10:00", 4.957, 10],
      ["2024-05-01T11:00:00.000+10:00", 5.012, 10],
      ["2024-05-01T11:15:00.000+10:00", 0.0, 255],
      ["2024-05-01T11:30:00.000+10:00", null, 10]
    ]
}]"#;

/// Three days behind: outside the freshness window.
const BOM_SAVAGES_STALE: &str = r#"[{
    "ts_id": "208671010",
    "columns": "Timestamp,Value,Quality Code",
    "data": [
      ["2024-04-28T10:00:00.000+10:00", 2.1, 10],
      ["2024-04-28T11:00:00.000+10:00", 2.2, 10]
    ]
}]"#;

const BOM_EMPTY: &str = r#"[{ "ts_id": "208672010", "columns": "Timestamp,Value,Quality Code", "data": [] }]"#;

const WMIP_SAVAGES_LEVEL: &str = r#"{
  "error_num": 0,
  "return": { "traces": [ {
    "error_num": 0,
    "site": "143001C",
    "varto_details": { "variable": "100.00", "units": "Metres" },
    "trace": [
      { "v": "4.50", "t": "20240501100000", "q": 9 },
      { "v": "4.75", "t": "20240501103000", "q": 9 },
      { "v": "5.00", "t": "20240501110000", "q": 9 }
    ]
  } ] }
}"#;

const WMIP_BREMER_DISCHARGE: &str = r#"{
  "error_num": 0,
  "return": { "traces": [ {
    "error_num": 0,
    "site": "143107A",
    "varto_details": { "variable": "140.00", "units": "Megalitres/Day" },
    "trace": [
      { "v": 777.6, "t": 20240501104500, "q": 9 },
      { "v": 864.0, "t": 20240501110000, "q": 9 },
      { "v": 0, "t": 20240501111500, "q": 255 }
    ]
  } ] }
}"#;

const WMIP_UNKNOWN_SITE: &str = r#"{ "error_num": 126, "error_msg": "Site 145014A not in archive" }"#;

// ---------------------------------------------------------------------------
// Replay providers
// ---------------------------------------------------------------------------

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 2, 0, 0).unwrap()
}

struct ReplayBom {
    payloads: HashMap<&'static str, &'static str>,
}

impl Provider for ReplayBom {
    fn source(&self) -> Source {
        Source::Bom
    }

    fn supports(&self, kind: ReadingKind) -> bool {
        kind == ReadingKind::Level
    }

    fn fetch_one(&self, location: &Location, _kind: ReadingKind) -> Result<Reading, ProviderError> {
        let history = self.fetch_history(location, 6)?;
        level_reading(&location.id, Source::Bom, &history)
    }

    fn fetch_history(&self, location: &Location, _: u32) -> Result<Vec<HistoryPoint>, ProviderError> {
        let body = self
            .payloads
            .get(location.id.as_str())
            .ok_or(ProviderError::HttpError(503))?;
        Ok(into_history(parse_values_response(body, ReadingKind::Level, now())?))
    }
}

struct ReplayWmip {
    payloads: HashMap<(&'static str, ReadingKind), &'static str>,
}

impl Provider for ReplayWmip {
    fn source(&self) -> Source {
        Source::Wmip
    }

    fn supports(&self, kind: ReadingKind) -> bool {
        matches!(kind, ReadingKind::Level | ReadingKind::Discharge)
    }

    fn fetch_one(&self, location: &Location, kind: ReadingKind) -> Result<Reading, ProviderError> {
        let body = self
            .payloads
            .get(&(location.id.as_str(), kind))
            .or_else(|| self.payloads.get(&(location.id.as_str(), ReadingKind::Level)))
            .ok_or(ProviderError::Timeout(12))?;
        let samples = parse_traces_response(body, kind, now())?;
        match kind {
            ReadingKind::Level => level_reading(&location.id, Source::Wmip, &into_history(samples)),
            other => latest_reading(&location.id, other, Source::Wmip, &samples),
        }
    }

    fn fetch_history(&self, _: &Location, _: u32) -> Result<Vec<HistoryPoint>, ProviderError> {
        Ok(vec![])
    }
}

fn orchestrator(clock: Arc<dyn Clock>) -> Orchestrator {
    let registry = parse_stations(STATIONS, Path::new("inline.toml")).expect("inline stations parse");

    let bom: Arc<dyn Provider> = Arc::new(ReplayBom {
        payloads: HashMap::from([
            ("143107A", BOM_BREMER),
            ("143001C", BOM_SAVAGES_STALE),
            ("145014A", BOM_EMPTY),
        ]),
    });
    let wmip: Arc<dyn Provider> = Arc::new(ReplayWmip {
        payloads: HashMap::from([
            (("143001C", ReadingKind::Level), WMIP_SAVAGES_LEVEL),
            (("143107A", ReadingKind::Discharge), WMIP_BREMER_DISCHARGE),
            (("145014A", ReadingKind::Level), WMIP_UNKNOWN_SITE),
        ]),
    });

    Orchestrator::new(
        Arc::new(registry),
        ProviderSet {
            level: vec![bom, wmip],
            rainfall: vec![],
            weather: None,
        },
        clock,
        &OrchestratorSection::default(),
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn test_level_aggregate_from_recorded_payloads() {
    let o = orchestrator(Arc::new(ManualClock::new(now())));
    let result = o.aggregate_all();

    // BOM primary, quality-filtered: 5.012 rounds to 5.0, 0.2 m/h over the
    // last hour, exactly at the Bremer minor level.
    let bremer = result.reading("143107A").expect("Bremer from BOM");
    assert_eq!(bremer.source, Source::Bom);
    assert_eq!(bremer.value, 5.0);
    assert_eq!(bremer.trend, Some(Trend::Rising));
    assert_eq!(bremer.change_rate, Some(0.2));
    assert_eq!(bremer.status, Some(FloodStatus::Watch));
    assert_eq!(bremer.timestamp, Utc.with_ymd_and_hms(2024, 5, 1, 1, 0, 0).unwrap());

    // BOM stale, WMIP fresh; default thresholds apply.
    let savages = result.reading("143001C").expect("Savages Crossing from WMIP");
    assert_eq!(savages.source, Source::Wmip);
    assert_eq!(savages.value, 5.0);
    assert_eq!(savages.change_rate, Some(0.5));
    assert_eq!(savages.status, Some(FloodStatus::Watch));

    // Nothing usable anywhere: present with no reading.
    let logan = result.station("145014A").expect("Logan entry present");
    assert!(logan.reading.is_none());

    assert_eq!(result.sources, vec![Source::Bom, Source::Wmip]);
    assert_eq!(result.errors.len(), 3, "errors: {:?}", result.errors);
    assert!(result.errors.iter().any(|e| e.starts_with("143001C: bom level: stale data")));
    assert!(result.errors.iter().any(|e| e.starts_with("145014A: bom level: no data available")));
    assert!(result.errors.iter().any(|e| e.contains("Hydstra error 126")));
}

#[test]
fn test_extended_discharge_converted_and_merged() {
    let o = orchestrator(Arc::new(ManualClock::new(now())));
    let result = o.aggregate_all();

    let bremer = result.station("143107A").expect("Bremer entry");
    let discharge = bremer.extended.discharge.as_ref().expect("discharge merged");
    // 864 ML/d is exactly 10 m3/s; the no-data row is ignored
    assert_eq!(discharge.value, 10.0);
    assert_eq!(discharge.unit, "m3/s");
    assert_eq!(discharge.source, Source::Wmip);
    assert_eq!(bremer.reading.as_ref().map(|r| r.source), Some(Source::Bom));

    // stations without extended attributes carry none
    assert!(result.station("143001C").unwrap().extended.is_empty());
}

#[test]
fn test_everything_stale_after_two_days() {
    let clock = Arc::new(ManualClock::new(now()));
    let o = orchestrator(clock.clone());
    clock.advance(Duration::hours(49));

    let result = o.aggregate_all();
    assert!(result.is_unavailable());
    assert_eq!(result.fresh_count(), 0);
    assert_eq!(result.stations.len(), 3);
}

#[test]
fn test_warnings_sorted_by_severity_then_id() {
    let o = orchestrator(Arc::new(ManualClock::new(now())));
    let result = o.aggregate_all();
    let warnings = derive_warnings(&result, o.registry());

    let ids: Vec<&str> = warnings.iter().map(|w| w.station_id.as_str()).collect();
    assert_eq!(ids, vec!["143001C", "143107A"]);
    assert!(warnings.iter().all(|w| w.status == FloodStatus::Watch));
}

#[test]
fn test_endpoint_json_shape() {
    let clock: Arc<ManualClock> = Arc::new(ManualClock::new(now()));
    let daemon = Daemon::new(
        orchestrator(clock.clone()),
        CacheGateway::new(Arc::new(MemoryCacheStore::new()), clock.clone()),
        RateLimiter::new(100, Duration::seconds(60), clock),
        &CacheSection::default(),
    );

    let reply = endpoint::respond(&daemon, "10.1.1.1", "/station/143107A");
    assert_eq!(reply.status, 200);
    let reading = &reply.body["stations"][0]["reading"];
    assert_eq!(reading["value"], 5.0);
    assert_eq!(reading["trend"], "rising");
    assert_eq!(reading["change_rate"], 0.2);
    assert_eq!(reading["status"], "watch");
    assert_eq!(reading["source"], "bom");
    assert_eq!(reply.body["stations"][0]["extended"]["discharge"]["unit"], "m3/s");

    let missing = endpoint::respond(&daemon, "10.1.1.1", "/station/145014A");
    assert_eq!(missing.status, 200);
    assert!(missing.body["stations"][0]["reading"].is_null());

    let warnings = endpoint::respond(&daemon, "10.1.1.1", "/warnings");
    assert_eq!(warnings.body["warnings"].as_array().map(Vec::len), Some(2));
    assert_eq!(warnings.body["sources"], serde_json::json!(["bom", "wmip"]));
}
