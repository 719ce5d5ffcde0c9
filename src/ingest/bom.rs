/// Bureau of Meteorology Water Data Online client (KiWIS).
///
/// Uses the Kisters `getTimeseriesValues` query service:
///   http://www.bom.gov.au/waterdata/services?service=kisters&type=queryServices&request=getTimeseriesValues
///
/// Series are addressed by `ts_path` (`1/<station>/<parameter>/<ts name>`),
/// so no separate `getTimeseriesList` lookup is needed. Timestamps are
/// RFC 3339 with offset. The series unit comes back as metadata
/// (`ts_unitsymbol`) and every value is converted to the canonical unit
/// while parsing. See `fixtures.rs` for the response shape.

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

use crate::clock::Clock;
use crate::config::{ProviderSection, MAX_LOOKBACK_HOURS};
use crate::ingest::{
    get_text, http_client, into_history, level_reading, rainfall_total, to_canonical, Provider,
    Sample, QUALITY_NO_DATA, RAINFALL_WINDOW_HOURS,
};
use crate::model::{HistoryPoint, Location, ProviderError, Reading, ReadingKind, Source};
use crate::timecodec::{TimeEncoding, TimestampAnomaly};

// ---------------------------------------------------------------------------
// Serde structures
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct KiwisSeries {
    /// Present when the request asks for `md_returnfields=ts_unitsymbol`.
    #[serde(default)]
    ts_unitsymbol: String,
    #[serde(default)]
    data: Vec<(String, Option<f64>, Option<i64>)>,
}

#[derive(Deserialize)]
struct KiwisErrorEnvelope {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

// ---------------------------------------------------------------------------
// URL construction
// ---------------------------------------------------------------------------

/// KiWIS parameter and time series names for a reading kind.
fn ts_path_parts(kind: ReadingKind) -> Option<(&'static str, &'static str)> {
    match kind {
        ReadingKind::Level => Some(("Water Course Level", "DMQaQc.Merged.AsStored.1")),
        ReadingKind::Rainfall => Some(("Rainfall", "DMQaQc.Merged.HourlyTotal.1")),
        _ => None,
    }
}

/// Builds a `getTimeseriesValues` URL for one station and kind over
/// `[from, to]`.
pub fn build_values_url(
    base_url: &str,
    station_id: &str,
    kind: ReadingKind,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Result<String, ProviderError> {
    let (parameter, ts_name) =
        ts_path_parts(kind).ok_or(ProviderError::Unsupported(Source::Bom, kind))?;
    let ts_path = format!("1/{}/{}/{}", station_id, parameter, ts_name);
    let encode = |t: DateTime<Utc>| {
        TimeEncoding::Iso8601
            .encode(t)
            .map_err(|e| ProviderError::ParseError(e.to_string()))
    };

    Ok(format!(
        "{}?service=kisters&type=queryServices&request=getTimeseriesValues&datasource=0&format=json&ts_path={}&from={}&to={}&returnfields={}&metadata=true&md_returnfields=ts_unitsymbol",
        base_url,
        urlencoding::encode(&ts_path),
        urlencoding::encode(&encode(from)?),
        urlencoding::encode(&encode(to)?),
        urlencoding::encode("Timestamp,Value,Quality Code"),
    ))
}

// ---------------------------------------------------------------------------
// Response parsing
// ---------------------------------------------------------------------------

/// Parses a KiWIS JSON body into quality-filtered samples in the canonical
/// unit of `kind`.
///
/// Rows with quality 255, null values or undecodable timestamps are
/// dropped. Order is as returned.
///
/// # Errors
/// - `ParseError`: malformed JSON, unknown unit, or a KiWIS error envelope.
/// - `NoDataAvailable`: no series, or no usable rows.
pub fn parse_values_response(
    json: &str,
    kind: ReadingKind,
    now: DateTime<Utc>,
) -> Result<Vec<Sample>, ProviderError> {
    let series: Vec<KiwisSeries> = match serde_json::from_str(json) {
        Ok(series) => series,
        Err(e) => {
            if let Ok(envelope) = serde_json::from_str::<KiwisErrorEnvelope>(json) {
                if !envelope.code.is_empty() || !envelope.message.is_empty() {
                    return Err(ProviderError::ParseError(format!(
                        "KiWIS error {}: {}",
                        envelope.code, envelope.message
                    )));
                }
            }
            return Err(ProviderError::ParseError(format!("JSON deserialization failed: {}", e)));
        }
    };

    if series.is_empty() {
        return Err(ProviderError::NoDataAvailable("no time series in response".to_string()));
    }

    let mut samples = Vec::new();
    for s in series {
        for (raw_time, value, quality) in s.data {
            if quality == Some(QUALITY_NO_DATA) {
                continue;
            }
            let Some(value) = value.filter(|v| v.is_finite()) else {
                continue;
            };
            let decoded = TimeEncoding::Iso8601.decode(&raw_time, now);
            if matches!(decoded.anomaly, Some(TimestampAnomaly::Malformed(_))) {
                debug!(raw = %raw_time, "dropping KiWIS row with undecodable timestamp");
                continue;
            }
            samples.push(Sample {
                timestamp: decoded.instant,
                value: to_canonical(kind, value, &s.ts_unitsymbol)?,
            });
        }
    }

    if samples.is_empty() {
        return Err(ProviderError::NoDataAvailable(
            "time series empty or every row flagged no-data".to_string(),
        ));
    }
    Ok(samples)
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct BomClient {
    client: reqwest::blocking::Client,
    base_url: String,
    timeout_secs: u64,
    lookback_hours: u32,
    clock: Arc<dyn Clock>,
}

impl BomClient {
    pub fn new(config: &ProviderSection, clock: Arc<dyn Clock>) -> Result<Self, ProviderError> {
        Ok(Self {
            client: http_client(config.request_timeout_secs)?,
            base_url: config.bom_base_url.clone(),
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
        let url = build_values_url(&self.base_url, station_id, kind, now - window, now)?;
        debug!(station = station_id, %kind, "BOM request");
        let body = get_text(&self.client, &url, self.timeout_secs)?;
        parse_values_response(&body, kind, now)
    }
}

impl Provider for BomClient {
    fn source(&self) -> Source {
        Source::Bom
    }

    fn supports(&self, kind: ReadingKind) -> bool {
        ts_path_parts(kind).is_some()
    }

    fn fetch_one(&self, location: &Location, kind: ReadingKind) -> Result<Reading, ProviderError> {
        match kind {
            ReadingKind::Level => {
                let history = self.fetch_history(location, self.lookback_hours)?;
                level_reading(&location.id, Source::Bom, &history)
            }
            ReadingKind::Rainfall => {
                let samples = self.fetch_samples(
                    &location.id,
                    kind,
                    Duration::hours(RAINFALL_WINDOW_HOURS),
                )?;
                rainfall_total(&location.id, Source::Bom, &samples, self.clock.now())
            }
            other => Err(ProviderError::Unsupported(Source::Bom, other)),
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
