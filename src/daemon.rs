/// Service façade and composition root.
///
/// Every inbound query goes through `Daemon::handle`:
/// 1. Rate limit the caller before any upstream work
/// 2. Validate input (coordinate ranges, station ids)
/// 3. Dispatch to the orchestrator, via the cache for the statewide rainfall
///    aggregate
///
/// Dispatch runs inside `catch_unwind`, so a bug anywhere in the pipeline
/// becomes `ServiceError::Internal` for that one request instead of taking
/// the endpoint thread down.
///
/// The daemon also owns the background cache refresh: an optional warm-up of
/// the statewide snapshot at start, then a periodic refresh.

use chrono::Duration;
use serde::Serialize;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{error, info, warn};

use crate::alert::warnings::WarningsSummary;
use crate::cache::{CacheGateway, CacheStore, MemoryCacheStore, PostgresCacheStore, STATEWIDE_RAINFALL_KEY};
use crate::clock::{Clock, SystemClock};
use crate::config::{self, CacheBackend, CacheSection, ConfigError, ServiceConfig, MAX_CACHE_AGE_SECS};
use crate::db::{self, DbConfigError};
use crate::ingest::bom::BomClient;
use crate::ingest::demo::DemoProvider;
use crate::ingest::open_meteo::OpenMeteoClient;
use crate::ingest::wmip::WmipClient;
use crate::ingest::{Provider, WeatherProvider};
use crate::model::{AggregateResult, Coordinates, LocationReport, ProviderError, ServiceError, Source};
use crate::orchestrator::{Orchestrator, ProviderSet};
use crate::ratelimit::RateLimiter;
use crate::stations::StationRegistry;

/// Longest location name echoed back to the caller.
pub const MAX_NAME_CHARS: usize = 100;

#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("{0}")]
    Database(#[from] DbConfigError),
    #[error("failed to build provider client: {0}")]
    Provider(#[from] ProviderError),
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// What a caller can ask for.
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    Station(String),
    Location {
        latitude: f64,
        longitude: f64,
        name: Option<String>,
    },
    Aggregate,
    StatewideRainfall,
    Warnings,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QueryResponse {
    Station(AggregateResult),
    Location(LocationReport),
    Aggregate(AggregateResult),
    Rainfall(AggregateResult),
    Warnings(WarningsSummary),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    pub stations: usize,
    pub demo_mode: bool,
}

/// A query that passed validation.
enum Validated {
    Station(String),
    Location(Coordinates, Option<String>),
    Aggregate,
    StatewideRainfall,
    Warnings,
}

// ---------------------------------------------------------------------------
// Daemon
// ---------------------------------------------------------------------------

pub struct Daemon {
    orchestrator: Orchestrator,
    cache: CacheGateway,
    limiter: RateLimiter,
    statewide_max_age: Duration,
    refresh_interval: Option<std::time::Duration>,
    warm_on_start: bool,
    demo_mode: bool,
}

impl Daemon {
    pub fn new(
        orchestrator: Orchestrator,
        cache: CacheGateway,
        limiter: RateLimiter,
        settings: &CacheSection,
    ) -> Self {
        Self {
            orchestrator,
            cache,
            limiter,
            statewide_max_age: Duration::seconds(settings.statewide_max_age_secs.min(MAX_CACHE_AGE_SECS) as i64),
            refresh_interval: (settings.refresh_interval_secs > 0)
                .then(|| std::time::Duration::from_secs(settings.refresh_interval_secs)),
            warm_on_start: settings.warm_on_start,
            demo_mode: false,
        }
    }

    /// Wires the full service from configuration: station registry,
    /// provider clients (or the demo provider), cache backend, rate limiter.
    pub fn from_config(config: &ServiceConfig) -> Result<Self, DaemonError> {
        let registry = Arc::new(config::load_stations(&config.service.stations_file)?);
        info!(
            stations = registry.len(),
            file = %config.service.stations_file.display(),
            "station registry loaded"
        );

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let providers = build_providers(config, Arc::clone(&clock))?;

        let store: Arc<dyn CacheStore> = match config.cache.backend {
            CacheBackend::Memory => Arc::new(MemoryCacheStore::new()),
            CacheBackend::Postgres => Arc::new(PostgresCacheStore::new(db::connect_and_prepare()?)),
        };
        info!(backend = ?config.cache.backend, "cache store ready");

        let orchestrator =
            Orchestrator::new(registry, providers, Arc::clone(&clock), &config.orchestrator);
        let cache = CacheGateway::new(store, Arc::clone(&clock));
        let limiter = RateLimiter::from_config(&config.rate_limit, clock);

        let mut daemon = Self::new(orchestrator, cache, limiter, &config.cache);
        daemon.demo_mode = config.service.demo_mode;
        Ok(daemon)
    }

    pub fn registry(&self) -> &StationRegistry {
        self.orchestrator.registry()
    }

    pub fn health(&self) -> HealthStatus {
        HealthStatus {
            status: "ok",
            service: env!("CARGO_PKG_NAME"),
            version: env!("CARGO_PKG_VERSION"),
            stations: self.registry().len(),
            demo_mode: self.demo_mode,
        }
    }

    /// Entry point for every caller query.
    pub fn handle(&self, identity: &str, query: Query) -> Result<QueryResponse, ServiceError> {
        let decision = self.limiter.check(identity);
        if !decision.allowed {
            return Err(ServiceError::RateLimited {
                retry_after: decision.retry_after.unwrap_or_default(),
            });
        }

        let validated = self.validate(query)?;

        catch_unwind(AssertUnwindSafe(|| self.dispatch(validated))).map_err(|panic| {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_default();
            error!(identity, panic = %message, "request handler panicked");
            ServiceError::Internal("unexpected failure while handling request".to_string())
        })
    }

    fn validate(&self, query: Query) -> Result<Validated, ServiceError> {
        match query {
            Query::Station(id) => {
                let id = id.trim();
                if id.is_empty() {
                    return Err(ServiceError::Validation("station id is required".to_string()));
                }
                match self.registry().find(id) {
                    Some(station) => Ok(Validated::Station(station.id.clone())),
                    None => Err(ServiceError::UnknownStation(id.to_string())),
                }
            }
            Query::Location {
                latitude,
                longitude,
                name,
            } => {
                let coordinates = Coordinates::new(latitude, longitude)?;
                let name = name
                    .map(|n| n.trim().chars().take(MAX_NAME_CHARS).collect::<String>())
                    .filter(|n| !n.is_empty());
                Ok(Validated::Location(coordinates, name))
            }
            Query::Aggregate => Ok(Validated::Aggregate),
            Query::StatewideRainfall => Ok(Validated::StatewideRainfall),
            Query::Warnings => Ok(Validated::Warnings),
        }
    }

    fn dispatch(&self, query: Validated) -> QueryResponse {
        match query {
            Validated::Station(id) => QueryResponse::Station(self.orchestrator.aggregate(&[id])),
            Validated::Location(coordinates, name) => {
                QueryResponse::Location(self.orchestrator.location_report(coordinates, name))
            }
            Validated::Aggregate => QueryResponse::Aggregate(self.orchestrator.aggregate_all()),
            Validated::StatewideRainfall => QueryResponse::Rainfall(self.statewide_rainfall()),
            Validated::Warnings => {
                let result = self.orchestrator.aggregate_all();
                QueryResponse::Warnings(WarningsSummary::from_aggregate(&result, self.registry()))
            }
        }
    }

    /// Statewide rainfall, served from the cache while the snapshot is
    /// younger than `statewide_max_age_secs`.
    pub fn statewide_rainfall(&self) -> AggregateResult {
        if let Some(entry) = self
            .cache
            .get::<AggregateResult>(STATEWIDE_RAINFALL_KEY, self.statewide_max_age)
        {
            return entry.data;
        }
        self.refresh_statewide_rainfall()
    }

    /// Runs the full statewide pipeline and stores the result. A result no
    /// provider contributed to is returned but not cached.
    pub fn refresh_statewide_rainfall(&self) -> AggregateResult {
        let result = self.orchestrator.statewide_rainfall();
        if result.is_unavailable() {
            warn!("statewide rainfall unavailable from every provider, not caching");
            return result;
        }
        if let Err(e) = self.cache.set(STATEWIDE_RAINFALL_KEY, &result) {
            warn!(error = %e, "failed to store statewide rainfall snapshot");
        }
        result
    }

    /// Spawns the background refresh thread: one refresh at start if
    /// `warm_on_start`, then one every `refresh_interval_secs`. Returns
    /// `None` when neither is configured.
    pub fn warm_cache_in_background(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        if !self.warm_on_start && self.refresh_interval.is_none() {
            return None;
        }

        let daemon = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name("cache-refresh".to_string())
            .spawn(move || {
                if daemon.warm_on_start {
                    daemon.refresh_logged("warm-up");
                }
                if let Some(interval) = daemon.refresh_interval {
                    loop {
                        thread::sleep(interval);
                        daemon.refresh_logged("periodic");
                    }
                }
            });

        match spawned {
            Ok(handle) => Some(handle),
            Err(e) => {
                error!(error = %e, "failed to spawn cache refresh thread");
                None
            }
        }
    }

    fn refresh_logged(&self, reason: &str) {
        let outcome = catch_unwind(AssertUnwindSafe(|| self.refresh_statewide_rainfall()));
        match outcome {
            Ok(result) => info!(
                reason,
                fresh = result.fresh_count(),
                sources = ?result.sources,
                "statewide rainfall snapshot refreshed"
            ),
            Err(_) => error!(reason, "statewide rainfall refresh panicked"),
        }
    }
}

/// Instantiates each configured provider once and arranges them by the
/// configured priority lists. Demo mode replaces every upstream with the
/// synthetic provider.
pub fn build_providers(config: &ServiceConfig, clock: Arc<dyn Clock>) -> Result<ProviderSet, DaemonError> {
    if config.service.demo_mode {
        warn!("demo mode enabled, serving synthetic readings");
        let demo = Arc::new(DemoProvider::new(clock));
        let provider: Arc<dyn Provider> = demo.clone();
        let weather: Arc<dyn WeatherProvider> = demo;
        return Ok(ProviderSet {
            level: vec![Arc::clone(&provider)],
            rainfall: vec![provider],
            weather: Some(weather),
        });
    }

    let section = &config.providers;
    let bom: Arc<dyn Provider> = Arc::new(BomClient::new(section, Arc::clone(&clock))?);
    let wmip: Arc<dyn Provider> = Arc::new(WmipClient::new(section, Arc::clone(&clock))?);
    let open_meteo = Arc::new(OpenMeteoClient::new(section, clock)?);
    let open_meteo_provider: Arc<dyn Provider> = open_meteo.clone();
    let weather: Arc<dyn WeatherProvider> = open_meteo;

    let pick = |order: &[Source]| -> Result<Vec<Arc<dyn Provider>>, DaemonError> {
        order
            .iter()
            .map(|source| match source {
                Source::Bom => Ok(Arc::clone(&bom)),
                Source::Wmip => Ok(Arc::clone(&wmip)),
                Source::OpenMeteo => Ok(Arc::clone(&open_meteo_provider)),
                other => Err(DaemonError::Config(ConfigError::Invalid(format!(
                    "'{}' cannot appear in a provider priority list",
                    other
                )))),
            })
            .collect()
    };

    let providers = ProviderSet {
        level: pick(&section.level_priority)?,
        rainfall: pick(&section.rainfall_priority)?,
        weather: Some(weather),
    };
    info!(
        level = ?section.level_priority,
        rainfall = ?section.rainfall_priority,
        "provider clients ready"
    );
    Ok(providers)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
