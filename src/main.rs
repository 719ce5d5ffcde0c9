//! Hydrowatch Service - Main Daemon
//!
//! Serves reconciled Queensland river levels, rainfall and flood warnings
//! over HTTP:
//! 1. Loads service settings (hydrowatch.toml) and the station registry
//! 2. Builds the BOM, WMIP and Open-Meteo clients (or the demo provider)
//! 3. Warms and periodically refreshes the statewide rainfall snapshot
//! 4. Answers queries on the HTTP endpoint
//!
//! Usage:
//!   cargo run --release                        # Port and settings from hydrowatch.toml
//!   cargo run --release -- --port 9090         # Override the listening port
//!   cargo run --release -- --demo              # Synthetic data, no upstream calls
//!
//! Environment:
//!   RUST_LOG            - tracing filter, overrides the configured level
//!   HYDROWATCH_CONFIG   - alternative configuration file
//!   HYDROWATCH_DEMO     - "1" or "true" forces demo mode
//!   DATABASE_URL        - PostgreSQL connection string (postgres cache backend)

use clap::Parser;
use hydrowatch_service::config::ServiceConfig;
use hydrowatch_service::daemon::Daemon;
use hydrowatch_service::endpoint;
use hydrowatch_service::logging::init_logging;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

/// Hydrological telemetry aggregation and flood status service
#[derive(Parser, Debug)]
#[command(name = "hydrowatch")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Service configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// HTTP port, overrides [service] port
    #[arg(short, long)]
    port: Option<u16>,

    /// Serve synthetic demo readings instead of calling upstream providers
    #[arg(long, default_value = "false")]
    demo: bool,

    /// Log level (trace, debug, info, warn, error), overrides [service] log_level
    #[arg(long)]
    log_level: Option<String>,
}

fn main() {
    let args = Args::parse();

    let mut config = match ServiceConfig::resolve(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };
    if let Some(port) = args.port {
        config.service.port = port;
    }
    if args.demo {
        config.service.demo_mode = true;
    }

    init_logging(args.log_level.as_deref().unwrap_or(&config.service.log_level));
    info!(version = env!("CARGO_PKG_VERSION"), "starting hydrowatch service");

    let daemon = match Daemon::from_config(&config) {
        Ok(daemon) => Arc::new(daemon),
        Err(e) => {
            error!("initialization failed: {}", e);
            std::process::exit(1);
        }
    };

    if daemon.warm_cache_in_background().is_some() {
        info!(
            warm_on_start = config.cache.warm_on_start,
            refresh_interval_secs = config.cache.refresh_interval_secs,
            "statewide rainfall refresh running"
        );
    }

    let workers = config.service.http_workers;
    if let Err(e) = endpoint::start_endpoint_server(config.service.port, workers, daemon) {
        error!("endpoint server error: {}", e);
        std::process::exit(1);
    }
}
