/// Rate-of-change and trend classification for level series.
///
/// Shared by every level provider so that trend labels from BOM and WMIP
/// remain directly comparable. Input must already be quality-filtered and
/// ordered ascending by time.

use crate::model::{round_dp, HistoryPoint, Trend};

/// How many samples back the baseline sits. At the usual 15-minute gauge
/// cadence this approximates a one-hour baseline.
pub const LOOKBACK_SAMPLES: usize = 4;

/// Baselines closer than this (in hours) to the latest sample are treated
/// as no change: guards duplicate timestamps and near-zero divisors.
pub const MIN_DELTA_HOURS: f64 = 0.1;

/// Rates whose magnitude is below this (units/hour) are noise.
pub const NOISE_FLOOR_PER_HOUR: f64 = 0.01;

/// Result of a trend computation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrendResult {
    pub trend: Trend,
    /// Units per hour, rounded to 2 decimals.
    pub change_rate: f64,
}

impl TrendResult {
    pub const STABLE: TrendResult = TrendResult {
        trend: Trend::Stable,
        change_rate: 0.0,
    };
}

/// Computes trend and change rate from the latest sample against the
/// baseline `LOOKBACK_SAMPLES` positions earlier (or the first sample when
/// the series is shorter).
pub fn compute_trend(samples: &[HistoryPoint]) -> TrendResult {
    if samples.len() < 2 {
        return TrendResult::STABLE;
    }

    let latest = samples[samples.len() - 1];
    let previous = samples[samples.len().saturating_sub(1 + LOOKBACK_SAMPLES)];

    let delta_hours = (latest.timestamp - previous.timestamp).num_milliseconds() as f64 / 3_600_000.0;
    if delta_hours <= MIN_DELTA_HOURS {
        return TrendResult::STABLE;
    }

    let change_rate = round_dp((latest.level - previous.level) / delta_hours, 2);
    if !change_rate.is_finite() || change_rate.abs() < NOISE_FLOOR_PER_HOUR {
        return TrendResult::STABLE;
    }

    let trend = if change_rate > 0.0 {
        Trend::Rising
    } else {
        Trend::Falling
    };
    TrendResult { trend, change_rate }
}
