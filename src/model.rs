/// Core data types for the hydrowatch aggregation service.
///
/// This module defines the shared domain model imported by all other modules:
/// canonical readings, flood thresholds, aggregate results and the error
/// taxonomy. It contains no I/O, only types and the small amount of
/// arithmetic that belongs to the types themselves (unit precision).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Provider tags
// ---------------------------------------------------------------------------

/// Upstream data provider a reading came from.
///
/// `Unavailable` never tags a reading. It is the marker recorded in
/// `AggregateResult::sources` when no provider contributed anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Source {
    Bom,
    Wmip,
    OpenMeteo,
    Demo,
    Unavailable,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Bom => write!(f, "bom"),
            Source::Wmip => write!(f, "wmip"),
            Source::OpenMeteo => write!(f, "open-meteo"),
            Source::Demo => write!(f, "demo"),
            Source::Unavailable => write!(f, "unavailable"),
        }
    }
}

// ---------------------------------------------------------------------------
// Reading kinds and canonical units
// ---------------------------------------------------------------------------

/// What a reading measures. Each kind has exactly one canonical unit and a
/// fixed rounding precision applied at the provider normalization boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadingKind {
    Level,
    Discharge,
    Rainfall,
    Storage,
    Temperature,
    WindSpeed,
    Pressure,
}

impl ReadingKind {
    /// Attributes fetched after level reconciliation and merged by station id.
    pub const EXTENDED: [ReadingKind; 3] =
        [ReadingKind::Discharge, ReadingKind::Rainfall, ReadingKind::Storage];

    pub fn canonical_unit(self) -> &'static str {
        match self {
            ReadingKind::Level => "m",
            ReadingKind::Discharge => "m3/s",
            ReadingKind::Rainfall => "mm",
            ReadingKind::Storage => "ML",
            ReadingKind::Temperature => "°C",
            ReadingKind::WindSpeed => "km/h",
            ReadingKind::Pressure => "hPa",
        }
    }

    /// Decimal places kept after normalization.
    pub fn precision(self) -> u32 {
        match self {
            ReadingKind::Level
            | ReadingKind::Discharge
            | ReadingKind::Rainfall
            | ReadingKind::Temperature => 1,
            ReadingKind::Storage | ReadingKind::WindSpeed | ReadingKind::Pressure => 0,
        }
    }

    pub fn normalize(self, value: f64) -> f64 {
        round_dp(value, self.precision())
    }
}

impl fmt::Display for ReadingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReadingKind::Level => "level",
            ReadingKind::Discharge => "discharge",
            ReadingKind::Rainfall => "rainfall",
            ReadingKind::Storage => "storage",
            ReadingKind::Temperature => "temperature",
            ReadingKind::WindSpeed => "wind_speed",
            ReadingKind::Pressure => "pressure",
        };
        write!(f, "{}", name)
    }
}

/// Rounds half away from zero to `decimals` places.
pub fn round_dp(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

// ---------------------------------------------------------------------------
// Classification enums
// ---------------------------------------------------------------------------

/// Tri-state classification of recent rate of change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Rising,
    Falling,
    Stable,
}

/// Flood severity, in ascending order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FloodStatus {
    Safe,
    Watch,
    Warning,
    Danger,
}

impl fmt::Display for FloodStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FloodStatus::Safe => write!(f, "safe"),
            FloodStatus::Watch => write!(f, "watch"),
            FloodStatus::Warning => write!(f, "warning"),
            FloodStatus::Danger => write!(f, "danger"),
        }
    }
}

// ---------------------------------------------------------------------------
// Reading types
// ---------------------------------------------------------------------------

/// A single canonical measurement produced by a provider client.
///
/// Values are already converted to the kind's canonical unit and rounded.
/// `trend`, `change_rate` and `status` are only populated for level readings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub station_id: String,
    pub kind: ReadingKind,
    pub value: f64,
    pub unit: String,
    pub timestamp: DateTime<Utc>,
    pub source: Source,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trend: Option<Trend>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<FloodStatus>,
}

impl Reading {
    /// Builds a reading in canonical units. `value` must already be in the
    /// kind's canonical unit; it is rounded here.
    pub fn new(
        station_id: impl Into<String>,
        kind: ReadingKind,
        value: f64,
        timestamp: DateTime<Utc>,
        source: Source,
    ) -> Self {
        Self {
            station_id: station_id.into(),
            kind,
            value: kind.normalize(value),
            unit: kind.canonical_unit().to_string(),
            timestamp,
            source,
            trend: None,
            change_rate: None,
            status: None,
        }
    }

    pub fn with_trend(self, trend: Trend, change_rate: f64) -> Self {
        Self {
            trend: Some(trend),
            change_rate: Some(change_rate),
            ..self
        }
    }

    pub fn with_status(self, status: FloodStatus) -> Self {
        Self {
            status: Some(status),
            ..self
        }
    }
}

/// One sample of a level time series. Sequences are ordered ascending by time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    pub timestamp: DateTime<Utc>,
    pub level: f64,
}

/// Current conditions at a coordinate (Open-Meteo).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherObservation {
    pub location_id: String,
    pub timestamp: DateTime<Utc>,
    pub temperature_c: Option<f64>,
    pub wind_speed_kmh: Option<f64>,
    pub pressure_hpa: Option<f64>,
    pub precipitation_mm: Option<f64>,
    pub source: Source,
}

// ---------------------------------------------------------------------------
// Threshold types
// ---------------------------------------------------------------------------

/// Flood classification levels for a station, in the station's level unit.
///
/// Levels in ascending order: minor < moderate < major
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FloodThresholds {
    pub minor: f64,
    pub moderate: f64,
    pub major: f64,
}

impl FloodThresholds {
    /// Used for any station without a configured triple.
    pub const DEFAULT: FloodThresholds = FloodThresholds {
        minor: 4.0,
        moderate: 6.0,
        major: 8.0,
    };
}

impl Default for FloodThresholds {
    fn default() -> Self {
        Self::DEFAULT
    }
}

// ---------------------------------------------------------------------------
// Locations
// ---------------------------------------------------------------------------

/// What a provider client needs to address one location. Built from a
/// configured station or from caller-supplied coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct Location {
    pub id: String,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// A validated WGS84 coordinate pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    /// Validates ranges: latitude in [-90, 90], longitude in [-180, 180].
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, ServiceError> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(ServiceError::Validation(format!(
                "latitude must be a number between -90 and 90, got {}",
                latitude
            )));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(ServiceError::Validation(format!(
                "longitude must be a number between -180 and 180, got {}",
                longitude
            )));
        }
        Ok(Self { latitude, longitude })
    }

    /// Parses raw query-string values, rejecting anything non-numeric.
    pub fn parse(latitude: &str, longitude: &str) -> Result<Self, ServiceError> {
        let lat = latitude.trim().parse::<f64>().map_err(|_| {
            ServiceError::Validation(format!("latitude is not numeric: '{}'", latitude))
        })?;
        let lon = longitude.trim().parse::<f64>().map_err(|_| {
            ServiceError::Validation(format!("longitude is not numeric: '{}'", longitude))
        })?;
        Self::new(lat, lon)
    }

    /// Identifier used as `location_id` for coordinate queries.
    pub fn key(&self) -> String {
        format!("{:.4},{:.4}", self.latitude, self.longitude)
    }
}

// ---------------------------------------------------------------------------
// Aggregate results
// ---------------------------------------------------------------------------

/// Discharge, rainfall and storage merged onto a station after level
/// reconciliation. Any field may be absent without affecting the level.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtendedAttributes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discharge: Option<Reading>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rainfall: Option<Reading>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<Reading>,
}

impl ExtendedAttributes {
    pub fn is_empty(&self) -> bool {
        self.discharge.is_none() && self.rainfall.is_none() && self.storage.is_none()
    }

    /// Routes a reading to its slot by kind; other kinds are ignored.
    pub fn insert(&mut self, reading: Reading) {
        match reading.kind {
            ReadingKind::Discharge => self.discharge = Some(reading),
            ReadingKind::Rainfall => self.rainfall = Some(reading),
            ReadingKind::Storage => self.storage = Some(reading),
            _ => {}
        }
    }
}

/// One station's entry in an aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationResult {
    pub station_id: String,
    pub name: String,
    pub reading: Option<Reading>,
    #[serde(default, skip_serializing_if = "ExtendedAttributes::is_empty")]
    pub extended: ExtendedAttributes,
}

/// Multi-station response assembled by the orchestrator.
///
/// Every requested station appears exactly once in `stations`, in the
/// caller's order, with `reading: None` when no source produced fresh data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateResult {
    pub stations: Vec<StationResult>,
    pub sources: Vec<Source>,
    pub errors: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

impl AggregateResult {
    pub fn station(&self, station_id: &str) -> Option<&StationResult> {
        self.stations.iter().find(|s| s.station_id == station_id)
    }

    pub fn reading(&self, station_id: &str) -> Option<&Reading> {
        self.station(station_id).and_then(|s| s.reading.as_ref())
    }

    pub fn fresh_count(&self) -> usize {
        self.stations.iter().filter(|s| s.reading.is_some()).count()
    }

    /// True when no provider contributed a single accepted reading.
    pub fn is_unavailable(&self) -> bool {
        self.sources == [Source::Unavailable]
    }
}

/// Response for a coordinate query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationReport {
    pub lat_lng: Coordinates,
    pub name: Option<String>,
    pub weather: Option<WeatherObservation>,
    pub nearest_station: Option<StationResult>,
    pub nearest_distance_km: Option<f64>,
    pub sources: Vec<Source>,
    pub errors: Vec<String>,
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can arise when fetching or normalizing provider data.
///
/// `HttpError`, `Transport` and `ParseError` together form the upstream
/// failure class. None of these reach a caller directly: the orchestrator
/// records them as per-station error strings and moves on.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProviderError {
    /// The request exceeded its timeout.
    #[error("request timed out after {0}s")]
    Timeout(u64),
    /// Non-2xx HTTP response.
    #[error("HTTP error: {0}")]
    HttpError(u16),
    /// Connection-level failure before a response arrived.
    #[error("transport error: {0}")]
    Transport(String),
    /// The response body could not be decoded.
    #[error("parse error: {0}")]
    ParseError(String),
    /// Upstream succeeded but returned nothing usable (empty series, or every
    /// point carried the no-data quality code).
    #[error("no data available: {0}")]
    NoDataAvailable(String),
    /// A reading exists but falls outside the freshness window.
    #[error("stale data for {station}: {age_minutes} minutes old")]
    StaleData { station: String, age_minutes: i64 },
    /// The provider does not report this kind of reading.
    #[error("{0} does not provide {1} readings")]
    Unsupported(Source, ReadingKind),
}

/// Caller-visible failures of the service façade.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ServiceError {
    /// Caller-supplied input was malformed.
    #[error("invalid request: {0}")]
    Validation(String),
    /// The requested station id is not configured.
    #[error("unknown station: {0}")]
    UnknownStation(String),
    /// The caller exceeded its request quota.
    #[error("rate limited, retry after {}s", .retry_after.as_secs())]
    RateLimited { retry_after: Duration },
    /// Anything unexpected inside the pipeline.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// HTTP status code for this outcome.
    pub fn http_status(&self) -> u16 {
        match self {
            ServiceError::Validation(_) => 400,
            ServiceError::UnknownStation(_) => 404,
            ServiceError::RateLimited { .. } => 429,
            ServiceError::Internal(_) => 500,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
