/// Configuration loader: service settings (hydrowatch.toml) and the station
/// registry (stations.toml).
///
/// Keeps provider endpoints, priority order, freshness and quota settings
/// and station metadata out of code so they can be adjusted without
/// recompiling. Every service setting has a default, so a missing
/// hydrowatch.toml runs with stock behaviour; stations.toml is required.

use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::model::{FloodThresholds, ReadingKind, Source};
use crate::stations::{RiverSystem, Station, StationRegistry};

/// Default service configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "hydrowatch.toml";

/// Environment variable naming an alternative configuration file.
pub const CONFIG_PATH_ENV: &str = "HYDROWATCH_CONFIG";

/// Environment variable that forces demo mode on ("1" or "true").
pub const DEMO_MODE_ENV: &str = "HYDROWATCH_DEMO";

// Upper bounds for time settings. Larger values overflow chrono's
// duration and date arithmetic.
pub const MAX_FRESHNESS_HOURS: i64 = 24 * 365;
pub const MAX_LOOKBACK_HOURS: u32 = 24 * 31;
pub const MAX_CACHE_AGE_SECS: u64 = 365 * 86_400;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

// ---------------------------------------------------------------------------
// Service settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub service: ServiceSection,
    pub providers: ProviderSection,
    pub orchestrator: OrchestratorSection,
    pub rate_limit: RateLimitSection,
    pub cache: CacheSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceSection {
    pub port: u16,
    pub stations_file: PathBuf,
    /// Serve synthetic readings instead of calling upstreams. Opt-in only.
    pub demo_mode: bool,
    /// `tracing` filter used when `RUST_LOG` is unset.
    pub log_level: String,
    /// Worker threads answering HTTP requests.
    pub http_workers: usize,
}

impl Default for ServiceSection {
    fn default() -> Self {
        Self {
            port: 8080,
            stations_file: PathBuf::from("stations.toml"),
            demo_mode: false,
            log_level: "info".to_string(),
            http_workers: 8,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProviderSection {
    pub request_timeout_secs: u64,
    /// Window fetched for level series (trend input).
    pub history_lookback_hours: u32,
    pub bom_base_url: String,
    pub wmip_base_url: String,
    pub open_meteo_base_url: String,
    /// Level providers, primary first.
    pub level_priority: Vec<Source>,
    /// Rainfall providers for the statewide aggregate, primary first.
    pub rainfall_priority: Vec<Source>,
}

impl Default for ProviderSection {
    fn default() -> Self {
        Self {
            request_timeout_secs: 12,
            history_lookback_hours: 6,
            bom_base_url: "http://www.bom.gov.au/waterdata/services".to_string(),
            wmip_base_url: "https://water-monitoring.information.qld.gov.au/cgi/webservice.pl"
                .to_string(),
            open_meteo_base_url: "https://api.open-meteo.com/v1/forecast".to_string(),
            level_priority: vec![Source::Bom, Source::Wmip],
            rainfall_priority: vec![Source::Wmip, Source::OpenMeteo],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OrchestratorSection {
    pub freshness_hours: i64,
    /// Coordinate queries attach the nearest station within this radius.
    pub nearest_station_max_km: f64,
}

impl Default for OrchestratorSection {
    fn default() -> Self {
        Self {
            freshness_hours: 48,
            nearest_station_max_km: 50.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitSection {
    pub max_requests: usize,
    pub window_secs: u64,
}

impl Default for RateLimitSection {
    fn default() -> Self {
        Self {
            max_requests: 60,
            window_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    Memory,
    Postgres,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheSection {
    pub backend: CacheBackend,
    pub statewide_max_age_secs: u64,
    /// Populate the statewide snapshot in the background at start.
    pub warm_on_start: bool,
    /// Background refresh period; 0 disables periodic refresh.
    pub refresh_interval_secs: u64,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            backend: CacheBackend::Memory,
            statewide_max_age_secs: 900,
            warm_on_start: true,
            refresh_interval_secs: 600,
        }
    }
}

impl ServiceConfig {
    pub fn from_toml_str(contents: &str, origin: &Path) -> Result<Self, ConfigError> {
        let config: ServiceConfig = toml::from_str(contents).map_err(|e| ConfigError::Parse {
            path: origin.to_path_buf(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml_str(&contents, path)
    }

    /// Resolves configuration the way the binary does: `.env` first, then an
    /// explicit path, then `HYDROWATCH_CONFIG`, then `hydrowatch.toml` if it
    /// exists, otherwise defaults. `HYDROWATCH_DEMO` can switch demo mode on.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let from_env = env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from);
        let mut config = match explicit.map(Path::to_path_buf).or(from_env) {
            Some(path) => Self::load(&path)?,
            None => {
                let default = Path::new(DEFAULT_CONFIG_PATH);
                if default.exists() {
                    Self::load(default)?
                } else {
                    info!("no {} found, using built-in defaults", DEFAULT_CONFIG_PATH);
                    Self::default()
                }
            }
        };

        if let Ok(flag) = env::var(DEMO_MODE_ENV) {
            if flag == "1" || flag.eq_ignore_ascii_case("true") {
                warn!("{} set, serving synthetic demo data", DEMO_MODE_ENV);
                config.service.demo_mode = true;
            }
        }
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.providers.level_priority.is_empty() {
            return Err(ConfigError::Invalid("providers.level_priority is empty".into()));
        }
        if self.providers.rainfall_priority.is_empty() {
            return Err(ConfigError::Invalid("providers.rainfall_priority is empty".into()));
        }
        if self.providers.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid("providers.request_timeout_secs must be > 0".into()));
        }
        if !(1..=MAX_LOOKBACK_HOURS).contains(&self.providers.history_lookback_hours) {
            return Err(ConfigError::Invalid(format!(
                "providers.history_lookback_hours must be within 1..={}",
                MAX_LOOKBACK_HOURS
            )));
        }
        if !(1..=MAX_FRESHNESS_HOURS).contains(&self.orchestrator.freshness_hours) {
            return Err(ConfigError::Invalid(format!(
                "orchestrator.freshness_hours must be within 1..={}",
                MAX_FRESHNESS_HOURS
            )));
        }
        if self.cache.statewide_max_age_secs > MAX_CACHE_AGE_SECS {
            return Err(ConfigError::Invalid(format!(
                "cache.statewide_max_age_secs must be at most {}",
                MAX_CACHE_AGE_SECS
            )));
        }
        if self.service.http_workers == 0 {
            return Err(ConfigError::Invalid("service.http_workers must be > 0".into()));
        }
        if self.rate_limit.max_requests == 0 || self.rate_limit.window_secs == 0 {
            return Err(ConfigError::Invalid("rate_limit values must be > 0".into()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Station registry file
// ---------------------------------------------------------------------------

/// Station metadata as written in stations.toml.
#[derive(Debug, Clone, Deserialize)]
pub struct StationConfig {
    pub id: String,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub river_system: RiverSystem,
    pub stream: String,

    // Flood classification levels (optional - default triple applies when absent)
    pub thresholds: Option<ThresholdConfig>,

    // Attributes beyond level that this gauge reports
    #[serde(default)]
    pub extended: Vec<ReadingKind>,
}

/// Flood classification levels in metres.
#[derive(Debug, Clone, Deserialize)]
pub struct ThresholdConfig {
    pub minor: f64,
    pub moderate: f64,
    pub major: f64,
}

/// Root structure for TOML parsing
#[derive(Debug, Deserialize)]
struct StationFile {
    station: Vec<StationConfig>,
}

impl From<&ThresholdConfig> for FloodThresholds {
    fn from(config: &ThresholdConfig) -> Self {
        FloodThresholds {
            minor: config.minor,
            moderate: config.moderate,
            major: config.major,
        }
    }
}

impl From<StationConfig> for Station {
    fn from(config: StationConfig) -> Self {
        Station {
            thresholds: config.thresholds.as_ref().map(FloodThresholds::from),
            id: config.id,
            name: config.name,
            latitude: config.latitude,
            longitude: config.longitude,
            river_system: config.river_system,
            stream: config.stream,
            extended: config
                .extended
                .into_iter()
                .filter(|k| ReadingKind::EXTENDED.contains(k))
                .collect(),
        }
    }
}

pub fn parse_stations(contents: &str, origin: &Path) -> Result<StationRegistry, ConfigError> {
    let file: StationFile = toml::from_str(contents).map_err(|e| ConfigError::Parse {
        path: origin.to_path_buf(),
        message: e.to_string(),
    })?;
    StationRegistry::new(file.station.into_iter().map(Station::from).collect())
}

/// Loads the station registry. The service cannot operate without it, so
/// any error here is fatal at startup.
pub fn load_stations(path: &Path) -> Result<StationRegistry, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.to_path_buf(),
        source: e,
    })?;
    parse_stations(&contents, path)
}
