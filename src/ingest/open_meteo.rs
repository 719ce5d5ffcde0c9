/// Open-Meteo forecast API client.
///
/// One `/v1/forecast` call per coordinate returns both the current
/// conditions block and an hourly precipitation series covering the past
/// day. Times are local wall-clock strings without offset; the offset comes
/// separately as `utc_offset_seconds` (requested with `timezone=auto`).
///
/// Serves rainfall as the statewide fallback and current weather for
/// coordinate queries. Has no river gauges, so level is unsupported.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

use crate::clock::Clock;
use crate::config::ProviderSection;
use crate::ingest::{get_text, http_client, rainfall_total, Provider, Sample, WeatherProvider};
use crate::model::{
    HistoryPoint, Location, ProviderError, Reading, ReadingKind, Source, WeatherObservation,
};
use crate::timecodec::{TimeEncoding, TimestampAnomaly};

// ---------------------------------------------------------------------------
// Serde structures
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct ForecastResponse {
    #[serde(default)]
    utc_offset_seconds: i32,
    current: Option<CurrentBlock>,
    hourly: Option<HourlyBlock>,
}

#[derive(Deserialize)]
struct CurrentBlock {
    time: String,
    temperature_2m: Option<f64>,
    wind_speed_10m: Option<f64>,
    surface_pressure: Option<f64>,
    precipitation: Option<f64>,
}

#[derive(Deserialize)]
struct HourlyBlock {
    #[serde(default)]
    time: Vec<String>,
    #[serde(default)]
    precipitation: Vec<Option<f64>>,
}

/// Parsed forecast payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Forecast {
    pub weather: WeatherObservation,
    /// Hourly precipitation (mm), nulls dropped, ascending.
    pub hourly_precipitation: Vec<Sample>,
}

// ---------------------------------------------------------------------------
// URL construction
// ---------------------------------------------------------------------------

pub fn build_forecast_url(base_url: &str, latitude: f64, longitude: f64) -> String {
    format!(
        "{}?latitude={:.4}&longitude={:.4}&current={}&hourly=precipitation&past_days=1&forecast_days=1&timezone=auto&wind_speed_unit=kmh",
        base_url,
        latitude,
        longitude,
        urlencoding::encode("temperature_2m,wind_speed_10m,surface_pressure,precipitation"),
    )
}

// ---------------------------------------------------------------------------
// Response parsing
// ---------------------------------------------------------------------------

/// Parses a forecast body. Weather values are rounded to their canonical
/// precision; hourly precipitation keeps provider precision.
pub fn parse_forecast(
    json: &str,
    location_id: &str,
    now: DateTime<Utc>,
) -> Result<Forecast, ProviderError> {
    let response: ForecastResponse = serde_json::from_str(json)
        .map_err(|e| ProviderError::ParseError(format!("JSON deserialization failed: {}", e)))?;

    let codec = TimeEncoding::NaiveIso {
        offset_seconds: response.utc_offset_seconds,
    };

    let current = response
        .current
        .ok_or_else(|| ProviderError::NoDataAvailable("no current block in response".to_string()))?;
    let observed = codec.decode(&current.time, now);
    if let Some(TimestampAnomaly::Malformed(reason)) = observed.anomaly {
        return Err(ProviderError::ParseError(format!(
            "undecodable current.time '{}': {}",
            current.time, reason
        )));
    }
    let weather = WeatherObservation {
        location_id: location_id.to_string(),
        timestamp: observed.instant,
        temperature_c: current.temperature_2m.map(|v| ReadingKind::Temperature.normalize(v)),
        wind_speed_kmh: current.wind_speed_10m.map(|v| ReadingKind::WindSpeed.normalize(v)),
        pressure_hpa: current.surface_pressure.map(|v| ReadingKind::Pressure.normalize(v)),
        precipitation_mm: current.precipitation.map(|v| ReadingKind::Rainfall.normalize(v)),
        source: Source::OpenMeteo,
    };

    let mut hourly_precipitation = Vec::new();
    if let Some(hourly) = response.hourly {
        for (raw_time, value) in hourly.time.iter().zip(hourly.precipitation) {
            let Some(value) = value.filter(|v| v.is_finite()) else {
                continue;
            };
            let decoded = codec.decode(raw_time, now);
            if matches!(decoded.anomaly, Some(TimestampAnomaly::Malformed(_))) {
                continue;
            }
            hourly_precipitation.push(Sample {
                timestamp: decoded.instant,
                value,
            });
        }
    }
    hourly_precipitation.sort_by_key(|s| s.timestamp);

    Ok(Forecast {
        weather,
        hourly_precipitation,
    })
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct OpenMeteoClient {
    client: reqwest::blocking::Client,
    base_url: String,
    timeout_secs: u64,
    clock: Arc<dyn Clock>,
}

impl OpenMeteoClient {
    pub fn new(config: &ProviderSection, clock: Arc<dyn Clock>) -> Result<Self, ProviderError> {
        Ok(Self {
            client: http_client(config.request_timeout_secs)?,
            base_url: config.open_meteo_base_url.clone(),
            timeout_secs: config.request_timeout_secs,
            clock,
        })
    }

    fn fetch_forecast(&self, location: &Location) -> Result<Forecast, ProviderError> {
        let url = build_forecast_url(&self.base_url, location.latitude, location.longitude);
        debug!(location = %location.id, "Open-Meteo request");
        let body = get_text(&self.client, &url, self.timeout_secs)?;
        parse_forecast(&body, &location.id, self.clock.now())
    }
}

/// Reading of `kind` from an already-parsed forecast.
pub fn reading_from_forecast(
    forecast: &Forecast,
    kind: ReadingKind,
    now: DateTime<Utc>,
) -> Result<Reading, ProviderError> {
    let weather = &forecast.weather;
    let current = |value: Option<f64>| {
        value
            .map(|v| Reading::new(weather.location_id.clone(), kind, v, weather.timestamp, Source::OpenMeteo))
            .ok_or_else(|| {
                ProviderError::NoDataAvailable(format!("no current {} for {}", kind, weather.location_id))
            })
    };

    match kind {
        ReadingKind::Rainfall => rainfall_total(
            &weather.location_id,
            Source::OpenMeteo,
            &forecast.hourly_precipitation,
            now,
        ),
        ReadingKind::Temperature => current(weather.temperature_c),
        ReadingKind::WindSpeed => current(weather.wind_speed_kmh),
        ReadingKind::Pressure => current(weather.pressure_hpa),
        other => Err(ProviderError::Unsupported(Source::OpenMeteo, other)),
    }
}

impl Provider for OpenMeteoClient {
    fn source(&self) -> Source {
        Source::OpenMeteo
    }

    fn supports(&self, kind: ReadingKind) -> bool {
        matches!(
            kind,
            ReadingKind::Rainfall
                | ReadingKind::Temperature
                | ReadingKind::WindSpeed
                | ReadingKind::Pressure
        )
    }

    fn fetch_one(&self, location: &Location, kind: ReadingKind) -> Result<Reading, ProviderError> {
        if !self.supports(kind) {
            return Err(ProviderError::Unsupported(Source::OpenMeteo, kind));
        }
        let forecast = self.fetch_forecast(location)?;
        reading_from_forecast(&forecast, kind, self.clock.now())
    }

    fn fetch_history(
        &self,
        _location: &Location,
        _lookback_hours: u32,
    ) -> Result<Vec<HistoryPoint>, ProviderError> {
        Err(ProviderError::Unsupported(Source::OpenMeteo, ReadingKind::Level))
    }
}

impl WeatherProvider for OpenMeteoClient {
    fn source(&self) -> Source {
        Source::OpenMeteo
    }

    fn current_weather(&self, location: &Location) -> Result<WeatherObservation, ProviderError> {
        self.fetch_forecast(location).map(|f| f.weather)
    }
}
