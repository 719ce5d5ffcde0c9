/// Queensland Water Monitoring Information Portal client (Hydstra).
///
/// Calls the Hydstra `get_ts_traces` web service:
///   https://water-monitoring.information.qld.gov.au/cgi/webservice.pl?{json request}
///
/// The request is a JSON document url-encoded into the query string. Its
/// time window and every `t` in the response are 14-digit compact
/// timestamps in AEST (UTC+10, no daylight saving). Values arrive as
/// strings.
///
/// Hydstra variable numbers:
///   100  stream water level (m)
///   140  discharge (cumecs)
///   10   rainfall (mm)
///   136  storage volume (ML)

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::clock::Clock;
use crate::config::{ProviderSection, MAX_LOOKBACK_HOURS};
use crate::ingest::{
    get_text, http_client, into_history, latest_reading, level_reading, rainfall_total,
    to_canonical, Provider, Sample, QUALITY_NO_DATA, RAINFALL_WINDOW_HOURS,
};
use crate::model::{HistoryPoint, Location, ProviderError, Reading, ReadingKind, Source};
use crate::timecodec::{TimeEncoding, TimestampAnomaly};

/// Window searched for the latest discharge / storage value. These are
/// reported less often than level.
const EXTENDED_WINDOW_HOURS: i64 = 24;

pub fn variable_for(kind: ReadingKind) -> Option<&'static str> {
    match kind {
        ReadingKind::Level => Some("100"),
        ReadingKind::Discharge => Some("140"),
        ReadingKind::Rainfall => Some("10"),
        ReadingKind::Storage => Some("136"),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct TraceRequest<'a> {
    function: &'static str,
    version: &'static str,
    params: TraceParams<'a>,
}

#[derive(Serialize)]
struct TraceParams<'a> {
    site_list: &'a str,
    datasource: &'static str,
    varfrom: &'static str,
    varto: &'static str,
    start_time: String,
    end_time: String,
    data_type: &'static str,
    interval: &'static str,
    multiplier: &'static str,
}

/// Builds a `get_ts_traces` URL for one station and kind over `[from, to]`.
///
/// Level, discharge and storage are sampled as 15-minute points; rainfall
/// as hourly totals.
pub fn build_traces_url(
    base_url: &str,
    station_id: &str,
    kind: ReadingKind,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Result<String, ProviderError> {
    let var = variable_for(kind).ok_or(ProviderError::Unsupported(Source::Wmip, kind))?;
    let codec = TimeEncoding::wmip();
    let encode = |t: DateTime<Utc>| {
        codec
            .encode(t)
            .map_err(|e| ProviderError::ParseError(format!("cannot encode request window: {}", e)))
    };

    let (data_type, interval, multiplier) = match kind {
        ReadingKind::Rainfall => ("tot", "hour", "1"),
        _ => ("point", "minute", "15"),
    };

    let request = TraceRequest {
        function: "get_ts_traces",
        version: "2",
        params: TraceParams {
            site_list: station_id,
            datasource: "AT",
            varfrom: var,
            varto: var,
            start_time: encode(from)?,
            end_time: encode(to)?,
            data_type,
            interval,
            multiplier,
        },
    };
    let json = serde_json::to_string(&request)
        .map_err(|e| ProviderError::ParseError(format!("cannot serialize request: {}", e)))?;

    Ok(format!("{}?{}", base_url, urlencoding::encode(&json)))
}

// ---------------------------------------------------------------------------
// Serde structures for the response
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct TraceResponse {
    #[serde(default)]
    error_num: i64,
    #[serde(default)]
    error_msg: Option<String>,
    #[serde(rename = "return")]
    ret: Option<TraceReturn>,
}

#[derive(Deserialize)]
struct TraceReturn {
    #[serde(default)]
    traces: Vec<Trace>,
}

#[derive(Deserialize)]
struct Trace {
    #[serde(default)]
    error_num: i64,
    #[serde(default)]
    error_msg: Option<String>,
    #[serde(default)]
    site: String,
    varto_details: Option<VarDetails>,
    #[serde(default)]
    trace: Vec<TracePoint>,
}

#[derive(Deserialize)]
struct VarDetails {
    #[serde(default)]
    units: String,
}

#[derive(Deserialize)]
struct TracePoint {
    v: Loose,
    t: Loose,
    q: Option<Loose>,
}

/// Hydstra is inconsistent about quoting numbers.
#[derive(Deserialize)]
#[serde(untagged)]
enum Loose {
    Int(i64),
    Float(f64),
    Text(String),
}

impl Loose {
    fn as_text(&self) -> String {
        match self {
            Loose::Int(i) => i.to_string(),
            Loose::Float(f) => f.to_string(),
            Loose::Text(s) => s.trim().to_string(),
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Loose::Int(i) => Some(*i as f64),
            Loose::Float(f) => Some(*f),
            Loose::Text(s) => s.trim().parse().ok(),
        }
    }
}

// ---------------------------------------------------------------------------
// Response parsing
// ---------------------------------------------------------------------------

/// Parses a `get_ts_traces` body into quality-filtered samples converted to
/// the canonical unit of `kind`.
///
/// # Errors
/// - `ParseError`: malformed JSON, unknown unit, or a Hydstra error.
/// - `NoDataAvailable`: no traces, or no usable points.
pub fn parse_traces_response(
    json: &str,
    kind: ReadingKind,
    now: DateTime<Utc>,
) -> Result<Vec<Sample>, ProviderError> {
    let response: TraceResponse = serde_json::from_str(json)
        .map_err(|e| ProviderError::ParseError(format!("JSON deserialization failed: {}", e)))?;

    if response.error_num != 0 {
        return Err(ProviderError::ParseError(format!(
            "Hydstra error {}: {}",
            response.error_num,
            response.error_msg.unwrap_or_default()
        )));
    }

    let traces = response.ret.map(|r| r.traces).unwrap_or_default();
    if traces.is_empty() {
        return Err(ProviderError::NoDataAvailable("no traces in response".to_string()));
    }

    let codec = TimeEncoding::wmip();
    let mut samples = Vec::new();
    for trace in traces {
        if trace.error_num != 0 {
            debug!(
                site = %trace.site,
                error = trace.error_msg.as_deref().unwrap_or(""),
                "skipping Hydstra trace with error"
            );
            continue;
        }
        let units = trace.varto_details.map(|d| d.units).unwrap_or_default();

        for point in trace.trace {
            let quality = point.q.as_ref().and_then(Loose::as_f64).map(|q| q as i64);
            if quality == Some(QUALITY_NO_DATA) {
                continue;
            }
            let Some(raw_value) = point.v.as_f64().filter(|v| v.is_finite()) else {
                continue;
            };
            let raw_time = point.t.as_text();
            let decoded = codec.decode(&raw_time, now);
            if matches!(decoded.anomaly, Some(TimestampAnomaly::Malformed(_))) {
                debug!(raw = %raw_time, "dropping Hydstra point with undecodable timestamp");
                continue;
            }
            samples.push(Sample {
                timestamp: decoded.instant,
                value: to_canonical(kind, raw_value, &units)?,
            });
        }
    }

    if samples.is_empty() {
        return Err(ProviderError::NoDataAvailable(
            "trace empty or every point flagged no-data".to_string(),
        ));
    }
    Ok(samples)
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct WmipClient {
    client: reqwest::blocking::Client,
    base_url: String,
    timeout_secs: u64,
    lookback_hours: u32,
    clock: Arc<dyn Clock>,
}

impl WmipClient {
    pub fn new(config: &ProviderSection, clock: Arc<dyn Clock>) -> Result<Self, ProviderError> {
        Ok(Self {
            client: http_client(config.request_timeout_secs)?,
            base_url: config.wmip_base_url.clone(),
            timeout_secs: config.request_timeout_secs,
            lookback_hours: config.history_lookback_hours.min(MAX_LOOKBACK_HOURS),
            clock,
        })
    }

    fn fetch_samples(
        &self,
        station_id: &str,
        kind: ReadingKind,
        window: Duration,
    ) -> Result<Vec<Sample>, ProviderError> {
        let now = self.clock.now();
        let url = build_traces_url(&self.base_url, station_id, kind, now - window, now)?;
        debug!(station = station_id, %kind, "WMIP request");
        let body = get_text(&self.client, &url, self.timeout_secs)?;
        parse_traces_response(&body, kind, now)
    }
}

impl Provider for WmipClient {
    fn source(&self) -> Source {
        Source::Wmip
    }

    fn supports(&self, kind: ReadingKind) -> bool {
        variable_for(kind).is_some()
    }

    fn fetch_one(&self, location: &Location, kind: ReadingKind) -> Result<Reading, ProviderError> {
        match kind {
            ReadingKind::Level => {
                let history = self.fetch_history(location, self.lookback_hours)?;
                level_reading(&location.id, Source::Wmip, &history)
            }
            ReadingKind::Rainfall => {
                let samples = self.fetch_samples(
                    &location.id,
                    kind,
                    Duration::hours(RAINFALL_WINDOW_HOURS),
                )?;
                rainfall_total(&location.id, Source::Wmip, &samples, self.clock.now())
            }
            ReadingKind::Discharge | ReadingKind::Storage => {
                let samples = self.fetch_samples(
                    &location.id,
                    kind,
                    Duration::hours(EXTENDED_WINDOW_HOURS),
                )?;
                latest_reading(&location.id, kind, Source::Wmip, &samples)
            }
            other => Err(ProviderError::Unsupported(Source::Wmip, other)),
        }
    }

    fn fetch_history(
        &self,
        location: &Location,
        lookback_hours: u32,
    ) -> Result<Vec<HistoryPoint>, ProviderError> {
        let samples = self.fetch_samples(
            &location.id,
            ReadingKind::Level,
            Duration::hours(i64::from(lookback_hours.min(MAX_LOOKBACK_HOURS))),
        )?;
        Ok(into_history(samples))
    }
}
