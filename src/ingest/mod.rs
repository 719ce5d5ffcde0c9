/// Provider clients.
///
/// One module per upstream. Each knows its own URL scheme, wire format,
/// quality codes and time encoding, and hands back canonical `Reading`s;
/// none knows the others exist. Fallback between them is the
/// orchestrator's job.
///
/// Wire parsing is kept in pure `parse_*` functions so it can be tested
/// against the payloads in `fixtures` without a network.

pub mod bom;
pub mod demo;
pub mod open_meteo;
pub mod wmip;

#[cfg(test)]
pub(crate) mod fixtures;

use chrono::{DateTime, Duration, Utc};
use std::time::Duration as StdDuration;

use crate::analysis::trend::compute_trend;
use crate::model::{HistoryPoint, Location, ProviderError, Reading, ReadingKind, Source, WeatherObservation};

/// Quality code both KiWIS and Hydstra use for "no data".
pub const QUALITY_NO_DATA: i64 = 255;

/// Rainfall readings are 24-hour totals.
pub const RAINFALL_WINDOW_HOURS: i64 = 24;

// ---------------------------------------------------------------------------
// Provider seams
// ---------------------------------------------------------------------------

/// A source of station readings.
///
/// Implementations must return every failure as a `ProviderError` value;
/// the orchestrator still guards against panics, but a panic costs the
/// whole station its answer from this provider.
pub trait Provider: Send + Sync {
    fn source(&self) -> Source;

    fn supports(&self, kind: ReadingKind) -> bool;

    /// Latest canonical reading of `kind` at `location`. Level readings
    /// carry trend and change rate.
    fn fetch_one(&self, location: &Location, kind: ReadingKind) -> Result<Reading, ProviderError>;

    /// Quality-filtered level series, ascending, at provider precision.
    fn fetch_history(
        &self,
        location: &Location,
        lookback_hours: u32,
    ) -> Result<Vec<HistoryPoint>, ProviderError>;
}

/// Current weather at an arbitrary coordinate.
pub trait WeatherProvider: Send + Sync {
    fn source(&self) -> Source;

    fn current_weather(&self, location: &Location) -> Result<WeatherObservation, ProviderError>;
}

// ---------------------------------------------------------------------------
// HTTP
// ---------------------------------------------------------------------------

/// Blocking client with the per-request timeout every provider call uses.
pub fn http_client(timeout_secs: u64) -> Result<reqwest::blocking::Client, ProviderError> {
    reqwest::blocking::Client::builder()
        .timeout(StdDuration::from_secs(timeout_secs))
        .user_agent(concat!("hydrowatch/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| ProviderError::Transport(format!("failed to build HTTP client: {}", e)))
}

/// GETs `url` and returns the body. Timeouts, non-2xx statuses and
/// connection failures come back as distinct `ProviderError`s.
pub fn get_text(
    client: &reqwest::blocking::Client,
    url: &str,
    timeout_secs: u64,
) -> Result<String, ProviderError> {
    let response = client
        .get(url)
        .header("Accept", "application/json")
        .send()
        .map_err(|e| map_transport_error(e, timeout_secs))?;

    let status = response.status();
    if !status.is_success() {
        return Err(ProviderError::HttpError(status.as_u16()));
    }

    response
        .text()
        .map_err(|e| map_transport_error(e, timeout_secs))
}

fn map_transport_error(err: reqwest::Error, timeout_secs: u64) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout(timeout_secs)
    } else {
        ProviderError::Transport(err.to_string())
    }
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

/// One quality-filtered upstream value at provider precision, in the
/// provider's unit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// Converts `value` from a provider unit label to the kind's canonical
/// unit. Labels are matched case-insensitively; an empty label means the
/// value is already canonical.
pub fn to_canonical(kind: ReadingKind, value: f64, unit: &str) -> Result<f64, ProviderError> {
    let unit = unit.trim().to_ascii_lowercase();
    let factor = match (kind, unit.as_str()) {
        (_, "") => 1.0,
        (ReadingKind::Level, "m" | "metres" | "meters" | "metre") => 1.0,
        (ReadingKind::Level, "cm" | "centimetres") => 0.01,
        (ReadingKind::Level, "mm" | "millimetres") => 0.001,
        (ReadingKind::Discharge, "m3/s" | "cumec" | "cumecs" | "m^3/s") => 1.0,
        (ReadingKind::Discharge, "ml/d" | "ml/day" | "megalitres/day") => 1.0 / 86.4,
        (ReadingKind::Rainfall, "mm" | "millimetres") => 1.0,
        (ReadingKind::Storage, "ml" | "megalitres") => 1.0,
        (ReadingKind::Storage, "gl" | "gigalitres") => 1000.0,
        (ReadingKind::Storage, "m3" | "m^3") => 0.001,
        (ReadingKind::Temperature, "°c" | "c" | "degc") => 1.0,
        (ReadingKind::WindSpeed, "km/h" | "kmh") => 1.0,
        (ReadingKind::WindSpeed, "m/s") => 3.6,
        (ReadingKind::Pressure, "hpa" | "mb") => 1.0,
        (_, other) => {
            return Err(ProviderError::ParseError(format!(
                "unknown unit '{}' for {} readings",
                other, kind
            )))
        }
    };
    Ok(value * factor)
}

/// Latest level reading from an ascending, quality-filtered series, with
/// trend computed over the raw series.
pub fn level_reading(
    station_id: &str,
    source: Source,
    series: &[HistoryPoint],
) -> Result<Reading, ProviderError> {
    let latest = series.last().ok_or_else(|| {
        ProviderError::NoDataAvailable(format!("no valid level samples for {}", station_id))
    })?;
    let trend = compute_trend(series);
    Ok(
        Reading::new(station_id, ReadingKind::Level, latest.level, latest.timestamp, source)
            .with_trend(trend.trend, trend.change_rate),
    )
}

/// Latest value of `kind`, already converted to canonical units.
pub fn latest_reading(
    station_id: &str,
    kind: ReadingKind,
    source: Source,
    samples: &[Sample],
) -> Result<Reading, ProviderError> {
    let latest = samples.iter().max_by_key(|s| s.timestamp).ok_or_else(|| {
        ProviderError::NoDataAvailable(format!("no valid {} samples for {}", kind, station_id))
    })?;
    Ok(Reading::new(station_id, kind, latest.value, latest.timestamp, source))
}

/// Sum of rainfall samples in the 24 hours ending at `now`, stamped at the
/// latest contributing sample.
pub fn rainfall_total(
    station_id: &str,
    source: Source,
    samples: &[Sample],
    now: DateTime<Utc>,
) -> Result<Reading, ProviderError> {
    let since = now - Duration::hours(RAINFALL_WINDOW_HOURS);
    let window: Vec<&Sample> = samples
        .iter()
        .filter(|s| s.timestamp > since && s.timestamp <= now)
        .collect();
    let latest = window.iter().map(|s| s.timestamp).max().ok_or_else(|| {
        ProviderError::NoDataAvailable(format!("no rainfall in the last 24h window for {}", station_id))
    })?;
    let total: f64 = window.iter().map(|s| s.value).sum();
    Ok(Reading::new(station_id, ReadingKind::Rainfall, total, latest, source))
}

/// Sorts ascending and converts samples into level history points.
pub fn into_history(mut samples: Vec<Sample>) -> Vec<HistoryPoint> {
    samples.sort_by_key(|s| s.timestamp);
    samples
        .into_iter()
        .map(|s| HistoryPoint {
            timestamp: s.timestamp,
            level: s.value,
        })
        .collect()
}
