/// Logging setup and provider failure classification.
///
/// The library logs through `tracing` macros with structured fields
/// (`station`, `source`, `kind`). The binary installs a `fmt` subscriber
/// once at startup; `RUST_LOG` overrides the configured level.
///
/// Provider failures are common and mostly uninteresting (a gauge goes
/// quiet over a weekend), so they are classified before logging to keep
/// real degradation visible at `error` while routine gaps stay at `debug`.

use std::fmt;
use tracing::{debug, error, warn};
use tracing_subscriber::EnvFilter;

use crate::model::{ProviderError, ReadingKind, Source};

/// Installs the global subscriber. Falls back to `default_level` when
/// `RUST_LOG` is unset or unparseable. Safe to call more than once; later
/// calls are ignored.
pub fn init_logging(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

// ---------------------------------------------------------------------------
// Failure Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// Gauge offline, seasonal or simply behind: routine.
    Expected,
    /// Service degradation or an upstream format change.
    Unexpected,
    /// Cannot tell which.
    Unknown,
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureType::Expected => write!(f, "EXPECTED"),
            FailureType::Unexpected => write!(f, "UNEXPECTED"),
            FailureType::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

pub fn classify_failure(err: &ProviderError) -> FailureType {
    match err {
        ProviderError::StaleData { .. } | ProviderError::Unsupported(..) => FailureType::Expected,
        ProviderError::NoDataAvailable(_) => FailureType::Unknown,
        ProviderError::Timeout(_) => FailureType::Unknown,
        ProviderError::HttpError(status) if *status == 404 => FailureType::Unknown,
        ProviderError::HttpError(_) | ProviderError::Transport(_) | ProviderError::ParseError(_) => {
            FailureType::Unexpected
        }
    }
}

/// Logs a provider failure at the level its classification warrants.
pub fn log_provider_failure(source: Source, station: &str, kind: ReadingKind, err: &ProviderError) {
    let failure = classify_failure(err);
    match failure {
        FailureType::Expected => debug!(%source, station, %kind, %failure, "{}", err),
        FailureType::Unknown => warn!(%source, station, %kind, %failure, "{}", err),
        FailureType::Unexpected => error!(%source, station, %kind, %failure, "{}", err),
    }
}
