//! Flood status classification.
//!
//! Maps a level against a station's `{minor, moderate, major}` triple.
//! Boundary values belong to the higher tier.

use crate::model::{FloodStatus, FloodThresholds};

/// Classifies `level` against `thresholds`, falling back to
/// `FloodThresholds::DEFAULT` when the station has none.
///
/// Total over every finite level, negative included. A non-finite level
/// compares false everywhere and lands on `Safe`.
pub fn classify_status(level: f64, thresholds: Option<&FloodThresholds>) -> FloodStatus {
    let t = thresholds.unwrap_or(&FloodThresholds::DEFAULT);

    if level >= t.major {
        FloodStatus::Danger
    } else if level >= t.moderate {
        FloodStatus::Warning
    } else if level >= t.minor {
        FloodStatus::Watch
    } else {
        FloodStatus::Safe
    }
}
