/// hydrowatch_service: Queensland river telemetry aggregation and flood
/// status service.
///
/// # Module structure
///
/// ```text
/// hydrowatch_service
/// ├── model        - shared data types (Reading, FloodThresholds, ProviderError, …)
/// ├── clock        - injectable time source
/// ├── config       - service settings (hydrowatch.toml) and station file loader
/// ├── stations     - station registry, river systems, nearest-station lookup
/// ├── timecodec    - provider timestamp encodings ↔ UTC instants
/// ├── ingest
/// │   ├── bom        - BOM KiWIS: URL construction + JSON parsing
/// │   ├── wmip       - WMIP Hydstra get_ts_traces
/// │   ├── open_meteo - Open-Meteo forecast: rainfall and current weather
/// │   ├── demo       - synthetic provider (explicit opt-in)
/// │   └── fixtures (test only) - representative API response payloads
/// ├── analysis
/// │   ├── trend      - rate of change from a level series
/// │   └── groupings  - merges extended attributes by station
/// ├── alert
/// │   ├── thresholds - flood status classification
/// │   ├── staleness  - reading freshness gate
/// │   └── warnings   - stations at watch or above
/// ├── orchestrator - batched primary/fallback reconciliation
/// ├── ratelimit    - per-caller sliding-window quota
/// ├── cache        - snapshot cache (in-memory or PostgreSQL)
/// ├── db           - PostgreSQL connection for the cache
/// ├── logging      - tracing setup, provider failure classification
/// ├── daemon       - service façade and background refresh
/// └── endpoint     - HTTP API
/// ```

/// Public modules
pub mod alert;
pub mod analysis;
pub mod cache;
pub mod clock;
pub mod config;
pub mod daemon;
pub mod db;
pub mod endpoint;
pub mod ingest;
pub mod logging;
pub mod model;
pub mod orchestrator;
pub mod ratelimit;
pub mod stations;
pub mod timecodec;
