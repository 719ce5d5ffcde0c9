/// Flood warnings summary.
///
/// Derived from an aggregate, never fetched: every station whose reconciled
/// level classifies at `watch` or above, most severe first. The summary
/// carries the aggregate's `sources` so "no warnings" (sources present,
/// list empty) is distinguishable from "could not determine"
/// (`[unavailable]`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{AggregateResult, FloodStatus, Source, Trend};
use crate::stations::{RiverSystem, StationRegistry};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FloodWarning {
    pub station_id: String,
    pub name: String,
    pub river_system: RiverSystem,
    pub status: FloodStatus,
    pub level: f64,
    pub trend: Option<Trend>,
    pub timestamp: DateTime<Utc>,
    pub source: Source,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarningsSummary {
    pub warnings: Vec<FloodWarning>,
    pub sources: Vec<Source>,
    pub generated_at: DateTime<Utc>,
}

impl WarningsSummary {
    pub fn from_aggregate(result: &AggregateResult, registry: &StationRegistry) -> Self {
        Self {
            warnings: derive_warnings(result, registry),
            sources: result.sources.clone(),
            generated_at: result.generated_at,
        }
    }
}

/// Stations at `watch` or above, sorted by severity descending then id.
/// Stations missing from the registry are skipped.
pub fn derive_warnings(result: &AggregateResult, registry: &StationRegistry) -> Vec<FloodWarning> {
    let mut warnings: Vec<FloodWarning> = result
        .stations
        .iter()
        .filter_map(|entry| {
            let reading = entry.reading.as_ref()?;
            let status = reading.status?;
            if status < FloodStatus::Watch {
                return None;
            }
            let station = registry.find(&entry.station_id)?;
            Some(FloodWarning {
                station_id: station.id.clone(),
                name: station.name.clone(),
                river_system: station.river_system,
                status,
                level: reading.value,
                trend: reading.trend,
                timestamp: reading.timestamp,
                source: reading.source,
            })
        })
        .collect();

    warnings.sort_by(|a, b| b.status.cmp(&a.status).then_with(|| a.station_id.cmp(&b.station_id)));
    warnings
}
