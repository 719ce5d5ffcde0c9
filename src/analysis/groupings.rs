/// Station grouping for extended attributes.
///
/// The extended sweeps (discharge, rainfall, storage) each produce a flat
/// list of readings. `group_by_station` folds them into one
/// `ExtendedAttributes` per station so the orchestrator can merge them onto
/// the reconciled level by station id.
///
/// The pipeline test at the bottom exercises parse → trend → classify →
/// group end to end against the fixtures, and lives here because grouping
/// is the final step in that chain.

use std::collections::HashMap;

use crate::model::{ExtendedAttributes, Reading, ReadingKind};

/// Groups readings by station id. Level and weather kinds are ignored.
/// If a station has more than one reading of a kind, the newest wins.
pub fn group_by_station(readings: Vec<Reading>) -> HashMap<String, ExtendedAttributes> {
    let mut grouped: HashMap<String, ExtendedAttributes> = HashMap::new();

    for reading in readings {
        let attrs = grouped.entry(reading.station_id.clone()).or_default();
        let existing = match reading.kind {
            ReadingKind::Discharge => &attrs.discharge,
            ReadingKind::Rainfall => &attrs.rainfall,
            ReadingKind::Storage => &attrs.storage,
            _ => continue,
        };
        if existing.as_ref().is_some_and(|e| e.timestamp > reading.timestamp) {
            continue;
        }
        attrs.insert(reading);
    }

    grouped.retain(|_, attrs| !attrs.is_empty());
    grouped
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
