/// Synthetic provider for local development.
///
/// Produces deterministic, plausible readings derived from the station id
/// and the clock, so a dashboard can be exercised without network access.
/// Only wired in when `demo_mode` is switched on explicitly; it is never a
/// fallback for failing upstreams.

use chrono::{DateTime, Duration, DurationRound, Utc};
use std::sync::Arc;

use crate::clock::Clock;
use crate::ingest::{level_reading, Provider, WeatherProvider};
use crate::model::{HistoryPoint, Location, ProviderError, Reading, ReadingKind, Source, WeatherObservation};

const SAMPLE_MINUTES: i64 = 15;

pub struct DemoProvider {
    clock: Arc<dyn Clock>,
}

impl DemoProvider {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    fn latest_sample_time(&self) -> DateTime<Utc> {
        let now = self.clock.now();
        now.duration_trunc(Duration::minutes(SAMPLE_MINUTES)).unwrap_or(now)
    }
}

/// Stable per-station seed in [0, 1).
fn seed(id: &str) -> f64 {
    let hash = id
        .bytes()
        .fold(2166136261u32, |h, b| (h ^ u32::from(b)).wrapping_mul(16777619));
    f64::from(hash % 10_000) / 10_000.0
}

/// Smooth diurnal-ish wave so successive samples produce a real trend.
fn synthetic_level(id: &str, at: DateTime<Utc>) -> f64 {
    let s = seed(id);
    let hours = at.timestamp() as f64 / 3600.0;
    1.0 + 4.0 * s + 0.8 * (hours / 6.0 + s * std::f64::consts::TAU).sin()
}

impl Provider for DemoProvider {
    fn source(&self) -> Source {
        Source::Demo
    }

    fn supports(&self, kind: ReadingKind) -> bool {
        matches!(
            kind,
            ReadingKind::Level | ReadingKind::Discharge | ReadingKind::Rainfall | ReadingKind::Storage
        )
    }

    fn fetch_one(&self, location: &Location, kind: ReadingKind) -> Result<Reading, ProviderError> {
        let id = location.id.as_str();
        let at = self.latest_sample_time();
        let s = seed(id);
        match kind {
            ReadingKind::Level => {
                let history = self.fetch_history(location, 6)?;
                level_reading(id, Source::Demo, &history)
            }
            ReadingKind::Discharge => {
                let value = 20.0 * synthetic_level(id, at);
                Ok(Reading::new(id, kind, value, at, Source::Demo))
            }
            ReadingKind::Rainfall => Ok(Reading::new(id, kind, 40.0 * s * s, at, Source::Demo)),
            ReadingKind::Storage => Ok(Reading::new(id, kind, 500_000.0 + 700_000.0 * s, at, Source::Demo)),
            other => Err(ProviderError::Unsupported(Source::Demo, other)),
        }
    }

    fn fetch_history(
        &self,
        location: &Location,
        lookback_hours: u32,
    ) -> Result<Vec<HistoryPoint>, ProviderError> {
        let latest = self.latest_sample_time();
        let count = i64::from(lookback_hours) * 60 / SAMPLE_MINUTES;
        Ok((0..=count)
            .rev()
            .map(|i| {
                let timestamp = latest - Duration::minutes(i * SAMPLE_MINUTES);
                HistoryPoint {
                    timestamp,
                    level: synthetic_level(&location.id, timestamp),
                }
            })
            .collect())
    }
}

impl WeatherProvider for DemoProvider {
    fn source(&self) -> Source {
        Source::Demo
    }

    fn current_weather(&self, location: &Location) -> Result<WeatherObservation, ProviderError> {
        let s = seed(&location.id);
        Ok(WeatherObservation {
            location_id: location.id.clone(),
            timestamp: self.latest_sample_time(),
            temperature_c: Some(ReadingKind::Temperature.normalize(18.0 + 12.0 * s)),
            wind_speed_kmh: Some(ReadingKind::WindSpeed.normalize(5.0 + 25.0 * s)),
            pressure_hpa: Some(ReadingKind::Pressure.normalize(1005.0 + 15.0 * s)),
            precipitation_mm: Some(ReadingKind::Rainfall.normalize(2.0 * s)),
            source: Source::Demo,
        })
    }
}
