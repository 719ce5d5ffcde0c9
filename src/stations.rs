/// Station registry for the Queensland flood monitoring service.
///
/// Holds the canonical list of gauge stations, their river systems and
/// flood classification thresholds. Loaded once from stations.toml at
/// startup and never modified afterwards; all other modules look stations
/// up here rather than hardcoding gauge numbers.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::config::ConfigError;
use crate::model::{Coordinates, FloodThresholds, Location, ReadingKind};

// ---------------------------------------------------------------------------
// River systems
// ---------------------------------------------------------------------------

/// Named Queensland river systems (drainage basins).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiverSystem {
    JackyJacky,
    OlivePascoe,
    Lockhart,
    Stewart,
    Normanby,
    Jeannie,
    Endeavour,
    Daintree,
    Mossman,
    Barron,
    MulgraveRussell,
    Johnstone,
    Tully,
    Murray,
    Herbert,
    Black,
    Ross,
    Haughton,
    Burdekin,
    Don,
    Proserpine,
    OConnell,
    Pioneer,
    Plane,
    Styx,
    Shoalwater,
    Waterpark,
    Fitzroy,
    Calliope,
    Boyne,
    Baffle,
    Kolan,
    Burnett,
    Burrum,
    Mary,
    Noosa,
    Maroochy,
    Pine,
    Brisbane,
    Logan,
    Albert,
    Condamine,
    Balonne,
    Flinders,
    Mitchell,
}

impl RiverSystem {
    pub fn display_name(self) -> &'static str {
        match self {
            RiverSystem::JackyJacky => "Jacky Jacky Creek",
            RiverSystem::OlivePascoe => "Olive-Pascoe",
            RiverSystem::Lockhart => "Lockhart",
            RiverSystem::Stewart => "Stewart",
            RiverSystem::Normanby => "Normanby",
            RiverSystem::Jeannie => "Jeannie",
            RiverSystem::Endeavour => "Endeavour",
            RiverSystem::Daintree => "Daintree",
            RiverSystem::Mossman => "Mossman",
            RiverSystem::Barron => "Barron",
            RiverSystem::MulgraveRussell => "Mulgrave-Russell",
            RiverSystem::Johnstone => "Johnstone",
            RiverSystem::Tully => "Tully",
            RiverSystem::Murray => "Murray",
            RiverSystem::Herbert => "Herbert",
            RiverSystem::Black => "Black",
            RiverSystem::Ross => "Ross",
            RiverSystem::Haughton => "Haughton",
            RiverSystem::Burdekin => "Burdekin",
            RiverSystem::Don => "Don",
            RiverSystem::Proserpine => "Proserpine",
            RiverSystem::OConnell => "O'Connell",
            RiverSystem::Pioneer => "Pioneer",
            RiverSystem::Plane => "Plane Creek",
            RiverSystem::Styx => "Styx",
            RiverSystem::Shoalwater => "Shoalwater",
            RiverSystem::Waterpark => "Waterpark",
            RiverSystem::Fitzroy => "Fitzroy",
            RiverSystem::Calliope => "Calliope",
            RiverSystem::Boyne => "Boyne",
            RiverSystem::Baffle => "Baffle",
            RiverSystem::Kolan => "Kolan",
            RiverSystem::Burnett => "Burnett",
            RiverSystem::Burrum => "Burrum",
            RiverSystem::Mary => "Mary",
            RiverSystem::Noosa => "Noosa",
            RiverSystem::Maroochy => "Maroochy",
            RiverSystem::Pine => "Pine",
            RiverSystem::Brisbane => "Brisbane",
            RiverSystem::Logan => "Logan",
            RiverSystem::Albert => "Albert",
            RiverSystem::Condamine => "Condamine",
            RiverSystem::Balonne => "Balonne",
            RiverSystem::Flinders => "Flinders",
            RiverSystem::Mitchell => "Mitchell",
        }
    }
}

impl fmt::Display for RiverSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

// ---------------------------------------------------------------------------
// Station metadata
// ---------------------------------------------------------------------------

/// Metadata for a single gauge station.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Station {
    /// Gauge number shared by BOM and WMIP, e.g. "143107A".
    pub id: String,
    pub name: String,
    /// WGS84 latitude.
    pub latitude: f64,
    /// WGS84 longitude.
    pub longitude: f64,
    pub river_system: RiverSystem,
    /// Stream label, e.g. "Bremer River".
    pub stream: String,
    /// Classification levels, if defined for this station.
    pub thresholds: Option<FloodThresholds>,
    /// Extended attributes this gauge reports besides level.
    pub extended: Vec<ReadingKind>,
}

impl Station {
    /// Configured thresholds, or the documented default triple.
    pub fn thresholds_or_default(&self) -> FloodThresholds {
        self.thresholds.unwrap_or(FloodThresholds::DEFAULT)
    }

    pub fn location(&self) -> Location {
        Location {
            id: self.id.clone(),
            name: self.name.clone(),
            latitude: self.latitude,
            longitude: self.longitude,
        }
    }

    pub fn reports(&self, kind: ReadingKind) -> bool {
        kind == ReadingKind::Level || self.extended.contains(&kind)
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Immutable, validated set of stations with O(1) lookup by id.
#[derive(Debug, Clone)]
pub struct StationRegistry {
    stations: Vec<Station>,
    index: HashMap<String, usize>,
}

impl StationRegistry {
    /// Validates and indexes `stations`: ids must be unique and non-empty,
    /// coordinates in range, thresholds strictly ascending.
    pub fn new(stations: Vec<Station>) -> Result<Self, ConfigError> {
        if stations.is_empty() {
            return Err(ConfigError::Invalid("no stations configured".into()));
        }

        let mut index = HashMap::with_capacity(stations.len());
        for (i, station) in stations.iter().enumerate() {
            if station.id.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("station '{}' has an empty id", station.name)));
            }
            if Coordinates::new(station.latitude, station.longitude).is_err() {
                return Err(ConfigError::Invalid(format!(
                    "station {} has out-of-range coordinates",
                    station.id
                )));
            }
            if let Some(t) = &station.thresholds {
                if !(t.minor < t.moderate && t.moderate < t.major) {
                    return Err(ConfigError::Invalid(format!(
                        "station {} thresholds must ascend minor < moderate < major",
                        station.id
                    )));
                }
            }
            if index.insert(station.id.clone(), i).is_some() {
                return Err(ConfigError::Invalid(format!("duplicate station id {}", station.id)));
            }
        }

        Ok(Self { stations, index })
    }

    pub fn all(&self) -> &[Station] {
        &self.stations
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }

    /// Station ids in configuration order.
    pub fn all_ids(&self) -> Vec<String> {
        self.stations.iter().map(|s| s.id.clone()).collect()
    }

    pub fn find(&self, id: &str) -> Option<&Station> {
        self.index.get(id).map(|&i| &self.stations[i])
    }

    /// Thresholds for `id`, or the default triple for unknown / unconfigured
    /// stations.
    pub fn thresholds_for(&self, id: &str) -> FloodThresholds {
        self.find(id)
            .map(Station::thresholds_or_default)
            .unwrap_or(FloodThresholds::DEFAULT)
    }

    /// Nearest station to `point` and its great-circle distance in km.
    pub fn nearest(&self, point: Coordinates) -> Option<(&Station, f64)> {
        self.stations
            .iter()
            .map(|s| (s, haversine_km(point.latitude, point.longitude, s.latitude, s.longitude)))
            .min_by(|a, b| a.1.total_cmp(&b.1))
    }
}

const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance between two WGS84 points.
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
