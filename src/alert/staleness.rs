/// Reading freshness gate.
///
/// Providers lag, especially over weekends and public holidays, so the
/// orchestrator accepts readings up to 48 hours old by default. Anything
/// older, or stamped after "now", is rejected and the station is handed to
/// the next provider.
///
/// # Clock injection
/// Every function takes `now` rather than calling `Utc::now()`, which keeps
/// freshness deterministic in tests.

use chrono::{DateTime, Duration, Utc};

use crate::model::{ProviderError, Reading};

/// Default freshness window.
pub const DEFAULT_FRESHNESS_HOURS: i64 = 48;

/// Returns `Ok(())` when `reading` is usable at `now`.
///
/// Age equal to the window is still fresh; one second past it is stale.
/// A reading timestamped after `now` is rejected as well.
pub fn check_fresh_at(
    reading: &Reading,
    window: Duration,
    now: DateTime<Utc>,
) -> Result<(), ProviderError> {
    let age = now - reading.timestamp;
    if age < Duration::zero() || age > window {
        return Err(ProviderError::StaleData {
            station: reading.station_id.clone(),
            age_minutes: age.num_minutes(),
        });
    }
    Ok(())
}

pub fn is_fresh_at(reading: &Reading, window: Duration, now: DateTime<Utc>) -> bool {
    check_fresh_at(reading, window, now).is_ok()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
