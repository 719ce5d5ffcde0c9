/// Source orchestration and reconciliation.
///
/// For a set of stations, asks providers in priority order and keeps the
/// first fresh answer per station:
///
/// 1. Sweep the primary provider over every station, `BATCH_SIZE` at a
///    time. Each batch runs in parallel on the worker pool and is awaited
///    in full before the next starts.
/// 2. Accept a reading only if it is no older than the freshness window and
///    not stamped in the future.
/// 3. Sweep the next provider over the stations still missing, same rule.
///    A later sweep never starts before the previous one has completed,
///    and never revisits a station that already has a fresh reading.
/// 4. Attach flood status to accepted level readings.
///
/// Nothing a single station does can abort a sweep: errors, stale data and
/// panicking provider calls all become entries in `errors`.
///
/// Extended attributes (discharge, rainfall, storage) are reconciled the
/// same way in their own sweeps after the level result is settled, and
/// merged by station id. They never affect the level reading or `sources`.

use chrono::Duration;
use std::any::Any;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc;
use std::sync::Arc;
use threadpool::ThreadPool;
use tracing::{debug, info};

use crate::alert::staleness::check_fresh_at;
use crate::alert::thresholds::classify_status;
use crate::analysis::groupings::group_by_station;
use crate::clock::Clock;
use crate::config::{OrchestratorSection, MAX_FRESHNESS_HOURS};
use crate::ingest::{Provider, WeatherProvider};
use crate::logging::log_provider_failure;
use crate::model::{
    AggregateResult, Coordinates, ExtendedAttributes, Location, LocationReport, ProviderError,
    Reading, ReadingKind, Source, StationResult,
};
use crate::stations::{Station, StationRegistry};

/// Concurrent provider calls per batch.
pub const BATCH_SIZE: usize = 5;

/// Providers wired into the pipeline, each list in priority order.
#[derive(Clone)]
pub struct ProviderSet {
    /// Level providers. Also serve extended attributes they support.
    pub level: Vec<Arc<dyn Provider>>,
    /// Rainfall providers for the statewide aggregate.
    pub rainfall: Vec<Arc<dyn Provider>>,
    /// Current conditions for coordinate queries.
    pub weather: Option<Arc<dyn WeatherProvider>>,
}

/// Outcome of reconciling one kind across a provider list.
struct Reconciled {
    readings: HashMap<String, Reading>,
    sources: Vec<Source>,
    errors: Vec<String>,
}

pub struct Orchestrator {
    registry: Arc<StationRegistry>,
    providers: ProviderSet,
    clock: Arc<dyn Clock>,
    freshness: Duration,
    nearest_station_max_km: f64,
}

impl Orchestrator {
    pub fn new(
        registry: Arc<StationRegistry>,
        providers: ProviderSet,
        clock: Arc<dyn Clock>,
        settings: &OrchestratorSection,
    ) -> Self {
        Self {
            registry,
            providers,
            clock,
            freshness: Duration::hours(settings.freshness_hours.clamp(0, MAX_FRESHNESS_HOURS)),
            nearest_station_max_km: settings.nearest_station_max_km,
        }
    }

    pub fn registry(&self) -> &StationRegistry {
        &self.registry
    }

    /// Level aggregate for every configured station.
    pub fn aggregate_all(&self) -> AggregateResult {
        self.aggregate(&self.registry.all_ids())
    }

    /// Level aggregate for `station_ids`, in that order, with extended
    /// attributes merged in. Ids not in the registry are reported in
    /// `errors` and omitted.
    pub fn aggregate(&self, station_ids: &[String]) -> AggregateResult {
        let (stations, mut errors) = self.resolve(station_ids);
        let pool = new_pool();

        let levels = self.reconcile(&pool, &self.providers.level, ReadingKind::Level, &stations);
        errors.extend(levels.errors);

        let mut readings = levels.readings;
        for station in &stations {
            if let Some(reading) = readings.remove(&station.id) {
                let status = classify_status(reading.value, station.thresholds.as_ref());
                readings.insert(station.id.clone(), reading.with_status(status));
            }
        }

        let (mut extended, extended_errors) = self.extended_attributes(&pool, &stations);
        errors.extend(extended_errors);

        let entries = stations
            .iter()
            .map(|station| StationResult {
                station_id: station.id.clone(),
                name: station.name.clone(),
                reading: readings.remove(&station.id),
                extended: extended.remove(&station.id).unwrap_or_default(),
            })
            .collect();

        let result = finish(entries, levels.sources, errors, self.clock.as_ref());
        info!(
            requested = station_ids.len(),
            fresh = result.fresh_count(),
            sources = ?result.sources,
            errors = result.errors.len(),
            "level aggregate complete"
        );
        result
    }

    /// 24-hour rainfall for every configured station, from the rainfall
    /// providers in priority order.
    pub fn statewide_rainfall(&self) -> AggregateResult {
        let stations: Vec<&Station> = self.registry.all().iter().collect();
        let pool = new_pool();
        let mut rainfall =
            self.reconcile(&pool, &self.providers.rainfall, ReadingKind::Rainfall, &stations);

        let entries = stations
            .iter()
            .map(|station| StationResult {
                station_id: station.id.clone(),
                name: station.name.clone(),
                reading: rainfall.readings.remove(&station.id),
                extended: ExtendedAttributes::default(),
            })
            .collect();

        let result = finish(entries, rainfall.sources, rainfall.errors, self.clock.as_ref());
        info!(
            fresh = result.fresh_count(),
            sources = ?result.sources,
            "statewide rainfall aggregate complete"
        );
        result
    }

    /// Current weather at `coordinates` plus the level result of the
    /// nearest configured station, if one lies within range.
    pub fn location_report(&self, coordinates: Coordinates, name: Option<String>) -> LocationReport {
        let mut sources = Vec::new();
        let mut errors = Vec::new();

        let location = Location {
            id: coordinates.key(),
            name: name.clone().unwrap_or_else(|| coordinates.key()),
            latitude: coordinates.latitude,
            longitude: coordinates.longitude,
        };

        let weather = match &self.providers.weather {
            Some(provider) => {
                let outcome = catch_unwind(AssertUnwindSafe(|| provider.current_weather(&location)))
                    .unwrap_or_else(|panic| Err(panicked(panic)));
                match outcome {
                    Ok(observation) => {
                        sources.push(provider.source());
                        Some(observation)
                    }
                    Err(e) => {
                        log_provider_failure(provider.source(), &location.id, ReadingKind::Temperature, &e);
                        errors.push(format!("{}: {} weather: {}", location.id, provider.source(), e));
                        None
                    }
                }
            }
            None => None,
        };

        let nearby = self
            .registry
            .nearest(coordinates)
            .filter(|(_, km)| *km <= self.nearest_station_max_km);

        let (nearest_station, nearest_distance_km) = match nearby {
            Some((station, km)) => {
                let mut aggregate = self.aggregate(std::slice::from_ref(&station.id));
                errors.append(&mut aggregate.errors);
                for source in aggregate.sources.iter().filter(|s| **s != Source::Unavailable) {
                    if !sources.contains(source) {
                        sources.push(*source);
                    }
                }
                (aggregate.stations.pop(), Some(crate::model::round_dp(km, 1)))
            }
            None => {
                debug!(location = %location.id, "no station within range");
                (None, None)
            }
        };

        if sources.is_empty() {
            sources.push(Source::Unavailable);
        }

        LocationReport {
            lat_lng: coordinates,
            name,
            weather,
            nearest_station,
            nearest_distance_km,
            sources,
            errors,
        }
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn resolve(&self, station_ids: &[String]) -> (Vec<&Station>, Vec<String>) {
        let mut stations = Vec::with_capacity(station_ids.len());
        let mut errors = Vec::new();
        for id in station_ids {
            match self.registry.find(id) {
                Some(station) if !stations.iter().any(|s: &&Station| s.id == station.id) => {
                    stations.push(station)
                }
                Some(_) => {}
                None => errors.push(format!("{}: unknown station", id)),
            }
        }
        (stations, errors)
    }

    /// Primary-then-fallback reconciliation of one kind.
    fn reconcile(
        &self,
        pool: &ThreadPool,
        providers: &[Arc<dyn Provider>],
        kind: ReadingKind,
        stations: &[&Station],
    ) -> Reconciled {
        let mut readings: HashMap<String, Reading> = HashMap::new();
        let mut sources = Vec::new();
        let mut errors = Vec::new();

        for provider in providers {
            let source = provider.source();
            if !provider.supports(kind) {
                debug!(%source, %kind, "provider skipped, kind unsupported");
                continue;
            }

            let remaining: Vec<Location> = stations
                .iter()
                .filter(|s| !readings.contains_key(&s.id))
                .map(|s| s.location())
                .collect();
            if remaining.is_empty() {
                break;
            }

            let mut contributed = false;
            for (station_id, outcome) in sweep(pool, provider, kind, &remaining) {
                let accepted = outcome.and_then(|reading| {
                    check_fresh_at(&reading, self.freshness, self.clock.now()).map(|_| reading)
                });
                match accepted {
                    Ok(reading) => {
                        contributed = true;
                        readings.insert(station_id, reading);
                    }
                    Err(e) => {
                        log_provider_failure(source, &station_id, kind, &e);
                        errors.push(format!("{}: {} {}: {}", station_id, source, kind, e));
                    }
                }
            }
            if contributed && !sources.contains(&source) {
                sources.push(source);
            }
        }

        Reconciled {
            readings,
            sources,
            errors,
        }
    }

    fn extended_attributes(
        &self,
        pool: &ThreadPool,
        stations: &[&Station],
    ) -> (HashMap<String, ExtendedAttributes>, Vec<String>) {
        let mut collected = Vec::new();
        let mut errors = Vec::new();

        for kind in ReadingKind::EXTENDED {
            let reporting: Vec<&Station> =
                stations.iter().copied().filter(|s| s.extended.contains(&kind)).collect();
            if reporting.is_empty() {
                continue;
            }
            let reconciled = self.reconcile(pool, &self.providers.level, kind, &reporting);
            collected.extend(reconciled.readings.into_values());
            errors.extend(reconciled.errors);
        }

        (group_by_station(collected), errors)
    }
}

fn new_pool() -> ThreadPool {
    threadpool::Builder::new()
        .num_threads(BATCH_SIZE)
        .thread_name("provider-sweep".to_string())
        .build()
}

/// Runs `provider.fetch_one` for every location, one batch of
/// `BATCH_SIZE` at a time. Returns one outcome per location, in input
/// order.
fn sweep(
    pool: &ThreadPool,
    provider: &Arc<dyn Provider>,
    kind: ReadingKind,
    locations: &[Location],
) -> Vec<(String, Result<Reading, ProviderError>)> {
    let mut outcomes = Vec::with_capacity(locations.len());

    for batch in locations.chunks(BATCH_SIZE) {
        let (tx, rx) = mpsc::channel();
        for location in batch {
            let tx = tx.clone();
            let provider = Arc::clone(provider);
            let location = location.clone();
            pool.execute(move || {
                let outcome = catch_unwind(AssertUnwindSafe(|| provider.fetch_one(&location, kind)))
                    .unwrap_or_else(|panic| Err(panicked(panic)));
                let _ = tx.send((location.id, outcome));
            });
        }
        drop(tx);

        // Completes once every job in the batch has sent or died.
        let mut batch_results: HashMap<String, Result<Reading, ProviderError>> = rx.iter().collect();
        for location in batch {
            let outcome = batch_results.remove(&location.id).unwrap_or_else(|| {
                Err(ProviderError::Transport("worker exited without a result".to_string()))
            });
            outcomes.push((location.id.clone(), outcome));
        }
    }

    outcomes
}

fn panicked(payload: Box<dyn Any + Send>) -> ProviderError {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    ProviderError::Transport(format!("provider panicked: {}", message))
}

fn finish(
    stations: Vec<StationResult>,
    mut sources: Vec<Source>,
    errors: Vec<String>,
    clock: &dyn Clock,
) -> AggregateResult {
    if sources.is_empty() {
        sources.push(Source::Unavailable);
    }
    AggregateResult {
        stations,
        sources,
        errors,
        generated_at: clock.now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::model::{FloodStatus, FloodThresholds, HistoryPoint, Trend, WeatherObservation};
    use crate::stations::tests::station;
    use chrono::{DateTime, TimeZone, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 2, 0, 0).unwrap()
    }

    /// What a scripted provider does for one station.
    #[derive(Clone)]
    enum Script {
        Level(f64, i64), // value, age in minutes
        Fail(ProviderError),
        Panic,
    }

    struct Scripted {
        source: Source,
        kinds: Vec<ReadingKind>,
        script: HashMap<String, Script>,
        calls: Mutex<Vec<String>>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl Scripted {
        fn new(source: Source, kinds: &[ReadingKind], script: &[(&str, Script)]) -> Arc<Self> {
            Arc::new(Self {
                source,
                kinds: kinds.to_vec(),
                script: script.iter().map(|(id, s)| (id.to_string(), s.clone())).collect(),
                calls: Mutex::new(Vec::new()),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> Vec<String> {
            let mut calls = self.calls.lock().unwrap().clone();
            calls.sort();
            calls
        }
    }

    impl Provider for Scripted {
        fn source(&self) -> Source {
            self.source
        }

        fn supports(&self, kind: ReadingKind) -> bool {
            self.kinds.contains(&kind)
        }

        fn fetch_one(&self, location: &Location, kind: ReadingKind) -> Result<Reading, ProviderError> {
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(current, Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(5));
            self.calls.lock().unwrap().push(location.id.clone());
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            match self.script.get(&location.id) {
                Some(Script::Level(value, age)) => Ok(Reading::new(
                    location.id.clone(),
                    kind,
                    *value,
                    now() - Duration::minutes(*age),
                    self.source,
                )
                .with_trend(Trend::Stable, 0.0)),
                Some(Script::Fail(e)) => Err(e.clone()),
                Some(Script::Panic) => panic!("scripted panic for {}", location.id),
                None => Err(ProviderError::NoDataAvailable(location.id.clone())),
            }
        }

        fn fetch_history(&self, _: &Location, _: u32) -> Result<Vec<HistoryPoint>, ProviderError> {
            Ok(vec![])
        }
    }

    struct FixedWeather;

    impl WeatherProvider for FixedWeather {
        fn source(&self) -> Source {
            Source::OpenMeteo
        }

        fn current_weather(&self, location: &Location) -> Result<WeatherObservation, ProviderError> {
            Ok(WeatherObservation {
                location_id: location.id.clone(),
                timestamp: now(),
                temperature_c: Some(22.5),
                wind_speed_kmh: Some(12.0),
                pressure_hpa: Some(1013.0),
                precipitation_mm: Some(0.0),
                source: Source::OpenMeteo,
            })
        }
    }

    fn dyn_provider(p: &Arc<Scripted>) -> Arc<dyn Provider> {
        p.clone()
    }

    fn registry(ids: &[&str]) -> Arc<StationRegistry> {
        let stations = ids
            .iter()
            .enumerate()
            .map(|(i, id)| station(id, -27.0 - i as f64 * 0.1, 153.0, None))
            .collect();
        Arc::new(StationRegistry::new(stations).expect("valid registry"))
    }

    fn orchestrator(registry: Arc<StationRegistry>, providers: ProviderSet) -> Orchestrator {
        Orchestrator::new(
            registry,
            providers,
            Arc::new(ManualClock::new(now())),
            &OrchestratorSection::default(),
        )
    }

    fn levels(level: Vec<Arc<dyn Provider>>) -> ProviderSet {
        ProviderSet {
            level,
            rainfall: vec![],
            weather: None,
        }
    }

    const LEVEL: &[ReadingKind] = &[ReadingKind::Level];

    #[test]
    fn test_primary_fresh_fallback_never_asked() {
        let bom = Scripted::new(Source::Bom, LEVEL, &[("A", Script::Level(3.0, 10))]);
        let wmip = Scripted::new(Source::Wmip, LEVEL, &[("A", Script::Level(9.0, 5))]);
        let o = orchestrator(registry(&["A"]), levels(vec![dyn_provider(&bom), dyn_provider(&wmip)]));

        let result = o.aggregate_all();
        assert_eq!(result.reading("A").map(|r| r.source), Some(Source::Bom));
        assert_eq!(result.sources, vec![Source::Bom]);
        assert!(wmip.calls().is_empty());
    }

    #[test]
    fn test_partial_failure_mixes_sources() {
        let bom = Scripted::new(
            Source::Bom,
            LEVEL,
            &[
                ("A", Script::Level(3.0, 10)),
                ("B", Script::Fail(ProviderError::Timeout(12))),
            ],
        );
        let wmip = Scripted::new(
            Source::Wmip,
            LEVEL,
            &[("A", Script::Level(9.0, 5)), ("B", Script::Level(4.5, 20))],
        );
        let o = orchestrator(registry(&["A", "B"]), levels(vec![dyn_provider(&bom), dyn_provider(&wmip)]));

        let result = o.aggregate_all();
        assert_eq!(result.reading("A").map(|r| r.source), Some(Source::Bom));
        assert_eq!(result.reading("B").map(|r| r.source), Some(Source::Wmip));
        assert_eq!(result.sources, vec![Source::Bom, Source::Wmip]);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].starts_with("B: bom level"));
        assert_eq!(wmip.calls(), vec!["B".to_string()]);
    }

    #[test]
    fn test_stale_primary_falls_back() {
        let bom = Scripted::new(Source::Bom, LEVEL, &[("A", Script::Level(3.0, 48 * 60 + 1))]);
        let wmip = Scripted::new(Source::Wmip, LEVEL, &[("A", Script::Level(3.2, 47 * 60 + 59))]);
        let o = orchestrator(registry(&["A"]), levels(vec![dyn_provider(&bom), dyn_provider(&wmip)]));

        let result = o.aggregate_all();
        assert_eq!(result.reading("A").map(|r| r.source), Some(Source::Wmip));
        assert_eq!(result.sources, vec![Source::Wmip]);
        assert!(result.errors[0].contains("stale data"));
    }

    #[test]
    fn test_future_reading_rejected() {
        let bom = Scripted::new(Source::Bom, LEVEL, &[("A", Script::Level(3.0, -10))]);
        let o = orchestrator(registry(&["A"]), levels(vec![dyn_provider(&bom)]));
        let result = o.aggregate_all();
        assert!(result.reading("A").is_none());
    }

    #[test]
    fn test_oversized_freshness_window_is_clamped_not_panicking() {
        let bom = Scripted::new(Source::Bom, LEVEL, &[("A", Script::Level(3.0, 100 * 24 * 60))]);
        let o = Orchestrator::new(
            registry(&["A"]),
            levels(vec![dyn_provider(&bom)]),
            Arc::new(ManualClock::new(now())),
            &OrchestratorSection {
                freshness_hours: i64::MAX,
                ..OrchestratorSection::default()
            },
        );
        let result = o.aggregate_all();
        assert_eq!(result.reading("A").map(|r| r.source), Some(Source::Bom));
    }

    #[test]
    fn test_all_fail_is_unavailable_with_every_station_present() {
        let bom = Scripted::new(Source::Bom, LEVEL, &[("A", Script::Fail(ProviderError::HttpError(503)))]);
        let wmip = Scripted::new(Source::Wmip, LEVEL, &[]);
        let o = orchestrator(registry(&["A", "B"]), levels(vec![dyn_provider(&bom), dyn_provider(&wmip)]));

        let result = o.aggregate_all();
        assert!(result.is_unavailable());
        assert_eq!(result.stations.len(), 2);
        assert!(result.stations.iter().all(|s| s.reading.is_none()));
        // two stations x two providers
        assert_eq!(result.errors.len(), 4);
    }

    #[test]
    fn test_panicking_provider_is_a_station_error() {
        let bom = Scripted::new(
            Source::Bom,
            LEVEL,
            &[("A", Script::Panic), ("B", Script::Level(2.0, 5))],
        );
        let o = orchestrator(registry(&["A", "B"]), levels(vec![dyn_provider(&bom)]));

        let result = o.aggregate_all();
        assert!(result.reading("A").is_none());
        assert!(result.reading("B").is_some());
        assert!(result.errors.iter().any(|e| e.contains("panicked")));
    }

    #[test]
    fn test_status_attached_from_station_thresholds() {
        let custom = FloodThresholds { minor: 1.0, moderate: 2.0, major: 3.0 };
        let registry = Arc::new(
            StationRegistry::new(vec![
                station("A", -27.0, 153.0, Some(custom)),
                station("B", -27.1, 153.0, None),
            ])
            .unwrap(),
        );
        let bom = Scripted::new(
            Source::Bom,
            LEVEL,
            &[("A", Script::Level(2.5, 5)), ("B", Script::Level(2.5, 5))],
        );
        let o = orchestrator(registry, levels(vec![dyn_provider(&bom)]));

        let result = o.aggregate_all();
        assert_eq!(result.reading("A").and_then(|r| r.status), Some(FloodStatus::Warning));
        assert_eq!(result.reading("B").and_then(|r| r.status), Some(FloodStatus::Safe));
    }

    #[test]
    fn test_batches_are_bounded_and_order_preserved() {
        let ids: Vec<String> = (0..12).map(|i| format!("S{:02}", i)).collect();
        let id_refs: Vec<&str> = ids.iter().map(String::as_str).collect();
        let script: Vec<(&str, Script)> = id_refs.iter().map(|id| (*id, Script::Level(1.0, 1))).collect();
        let bom = Scripted::new(Source::Bom, LEVEL, &script);
        let o = orchestrator(registry(&id_refs), levels(vec![dyn_provider(&bom)]));

        let mut requested = ids.clone();
        requested.reverse();
        let result = o.aggregate(&requested);

        let order: Vec<_> = result.stations.iter().map(|s| s.station_id.clone()).collect();
        assert_eq!(order, requested);
        assert_eq!(bom.calls().len(), 12);
        assert!(bom.max_in_flight.load(Ordering::SeqCst) <= BATCH_SIZE);
    }

    #[test]
    fn test_unknown_ids_reported_not_included() {
        let bom = Scripted::new(Source::Bom, LEVEL, &[("A", Script::Level(1.0, 1))]);
        let o = orchestrator(registry(&["A"]), levels(vec![dyn_provider(&bom)]));
        let result = o.aggregate(&["A".to_string(), "ZZZ".to_string()]);
        assert_eq!(result.stations.len(), 1);
        assert!(result.errors.iter().any(|e| e == "ZZZ: unknown station"));
    }

    #[test]
    fn test_extended_merged_without_touching_level() {
        let mut with_storage = station("A", -27.0, 153.0, None);
        with_storage.extended = vec![ReadingKind::Storage, ReadingKind::Discharge];
        let registry = Arc::new(StationRegistry::new(vec![with_storage]).unwrap());

        let bom = Scripted::new(Source::Bom, LEVEL, &[("A", Script::Level(3.0, 5))]);
        let wmip = Scripted::new(
            Source::Wmip,
            &[ReadingKind::Level, ReadingKind::Storage, ReadingKind::Discharge],
            &[("A", Script::Level(1200.0, 30))],
        );
        let o = orchestrator(registry, levels(vec![dyn_provider(&bom), dyn_provider(&wmip)]));

        let result = o.aggregate_all();
        let entry = result.station("A").unwrap();
        assert_eq!(entry.reading.as_ref().map(|r| r.source), Some(Source::Bom));
        assert_eq!(entry.extended.storage.as_ref().map(|r| r.value), Some(1200.0));
        assert_eq!(entry.extended.discharge.as_ref().map(|r| r.unit.as_str()), Some("m3/s"));
        assert_eq!(result.sources, vec![Source::Bom]);
    }

    #[test]
    fn test_extended_failure_leaves_level_intact() {
        let mut s = station("A", -27.0, 153.0, None);
        s.extended = vec![ReadingKind::Discharge];
        let registry = Arc::new(StationRegistry::new(vec![s]).unwrap());
        let bom = Scripted::new(Source::Bom, LEVEL, &[("A", Script::Level(3.0, 5))]);
        let wmip = Scripted::new(
            Source::Wmip,
            &[ReadingKind::Discharge],
            &[("A", Script::Fail(ProviderError::HttpError(500)))],
        );
        let o = orchestrator(registry, levels(vec![dyn_provider(&bom), dyn_provider(&wmip)]));

        let result = o.aggregate_all();
        let entry = result.station("A").unwrap();
        assert!(entry.reading.is_some());
        assert!(entry.extended.is_empty());
        assert_eq!(result.errors.len(), 1);
    }

    #[test]
    fn test_statewide_rainfall_uses_rainfall_priority() {
        let wmip = Scripted::new(Source::Wmip, &[ReadingKind::Rainfall], &[("A", Script::Level(12.0, 30))]);
        let meteo = Scripted::new(
            Source::OpenMeteo,
            &[ReadingKind::Rainfall],
            &[("A", Script::Level(99.0, 30)), ("B", Script::Level(4.0, 30))],
        );
        let providers = ProviderSet {
            level: vec![],
            rainfall: vec![dyn_provider(&wmip), dyn_provider(&meteo)],
            weather: None,
        };
        let o = orchestrator(registry(&["A", "B"]), providers);

        let result = o.statewide_rainfall();
        assert_eq!(result.reading("A").map(|r| (r.value, r.source)), Some((12.0, Source::Wmip)));
        assert_eq!(result.reading("B").map(|r| r.source), Some(Source::OpenMeteo));
        assert_eq!(result.reading("A").and_then(|r| r.status), None);
        assert_eq!(result.sources, vec![Source::Wmip, Source::OpenMeteo]);
    }

    #[test]
    fn test_location_report_with_nearby_station() {
        let bom = Scripted::new(Source::Bom, LEVEL, &[("A", Script::Level(3.0, 5))]);
        let providers = ProviderSet {
            level: vec![dyn_provider(&bom)],
            rainfall: vec![],
            weather: Some(Arc::new(FixedWeather) as Arc<dyn WeatherProvider>),
        };
        let o = orchestrator(registry(&["A"]), providers);

        let coords = Coordinates::new(-27.05, 153.0).unwrap();
        let report = o.location_report(coords, Some("Home".to_string()));
        assert_eq!(report.name.as_deref(), Some("Home"));
        assert_eq!(report.weather.as_ref().and_then(|w| w.temperature_c), Some(22.5));
        assert_eq!(report.nearest_station.as_ref().map(|s| s.station_id.as_str()), Some("A"));
        assert!(report.nearest_distance_km.unwrap() < 10.0);
        assert_eq!(report.sources, vec![Source::OpenMeteo, Source::Bom]);
    }

    #[test]
    fn test_location_report_far_from_stations() {
        let providers = ProviderSet {
            level: vec![],
            rainfall: vec![],
            weather: None,
        };
        let o = orchestrator(registry(&["A"]), providers);
        let report = o.location_report(Coordinates::new(-12.46, 130.84).unwrap(), None);
        assert!(report.nearest_station.is_none());
        assert!(report.weather.is_none());
        assert_eq!(report.sources, vec![Source::Unavailable]);
    }
}
