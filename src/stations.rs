/// Location registry for the snowfall teleconnection service.
///
/// Defines the default observing network: the northern Wisconsin target
/// stations, regional Upper-Midwest and Great Lakes stations, and remote
/// stations whose snow events may precede Wisconsin snowfall by days.
/// This is the single source of truth for location ids; a TOML file can
/// replace the default network at startup.

use crate::model::{Location, SnowlagError};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

const EARTH_RADIUS_KM: f64 = 6371.0;

// ---------------------------------------------------------------------------
// Static default network
// ---------------------------------------------------------------------------

/// Compile-time description of a location.
pub struct StationSpec {
    pub id: &'static str,
    pub name: &'static str,
    pub latitude: f64,
    pub longitude: f64,
    pub region: &'static str,
    pub elevation_m: f64,
    pub lake_adjacent: bool,
}

impl StationSpec {
    pub fn to_location(&self) -> Location {
        Location {
            id: self.id.to_string(),
            name: self.name.to_string(),
            latitude: self.latitude,
            longitude: self.longitude,
            region: self.region.to_string(),
            elevation_m: self.elevation_m,
            lake_adjacent: self.lake_adjacent,
        }
    }
}

/// Default network, target stations first, then regional, then remote.
pub static DEFAULT_NETWORK: &[StationSpec] = &[
    StationSpec {
        id: "phelps_wi",
        name: "Phelps, WI",
        latitude: 46.0655,
        longitude: -89.0818,
        region: "northern_wisconsin",
        elevation_m: 515.0,
        lake_adjacent: false,
    },
    StationSpec {
        id: "land_o_lakes_wi",
        name: "Land O'Lakes, WI",
        latitude: 46.1563,
        longitude: -89.2187,
        region: "northern_wisconsin",
        elevation_m: 520.0,
        lake_adjacent: false,
    },
    StationSpec {
        id: "eagle_river_wi",
        name: "Eagle River, WI",
        latitude: 45.9172,
        longitude: -89.2443,
        region: "northern_wisconsin",
        elevation_m: 498.0,
        lake_adjacent: false,
    },
    // Upper Midwest / Great Lakes
    StationSpec {
        id: "thunder_bay_on",
        name: "Thunder Bay, ON",
        latitude: 48.3809,
        longitude: -89.2477,
        region: "great_lakes",
        elevation_m: 199.0,
        lake_adjacent: false,
    },
    StationSpec {
        id: "marquette_mi",
        name: "Marquette, MI",
        latitude: 46.5436,
        longitude: -87.3954,
        region: "great_lakes",
        elevation_m: 200.0,
        lake_adjacent: true,
    },
    StationSpec {
        id: "iron_mountain_mi",
        name: "Iron Mountain, MI",
        latitude: 45.8202,
        longitude: -88.0660,
        region: "great_lakes",
        elevation_m: 335.0,
        lake_adjacent: true,
    },
    StationSpec {
        id: "duluth_mn",
        name: "Duluth, MN",
        latitude: 46.7867,
        longitude: -92.1005,
        region: "great_lakes",
        elevation_m: 186.0,
        lake_adjacent: true,
    },
    StationSpec {
        id: "green_bay_wi",
        name: "Green Bay, WI",
        latitude: 44.5133,
        longitude: -88.0133,
        region: "upper_midwest",
        elevation_m: 177.0,
        lake_adjacent: false,
    },
    StationSpec {
        id: "minneapolis_mn",
        name: "Minneapolis, MN",
        latitude: 44.9778,
        longitude: -93.2650,
        region: "upper_midwest",
        elevation_m: 264.0,
        lake_adjacent: false,
    },
    StationSpec {
        id: "winnipeg_mb",
        name: "Winnipeg, MB",
        latitude: 49.8951,
        longitude: -97.1384,
        region: "canadian_prairie",
        elevation_m: 239.0,
        lake_adjacent: false,
    },
    // Remote
    StationSpec {
        id: "sapporo_japan",
        name: "Sapporo, Japan",
        latitude: 43.0618,
        longitude: 141.3545,
        region: "japan",
        elevation_m: 17.0,
        lake_adjacent: false,
    },
    StationSpec {
        id: "niigata_japan",
        name: "Niigata, Japan",
        latitude: 37.9161,
        longitude: 139.0364,
        region: "japan",
        elevation_m: 5.0,
        lake_adjacent: false,
    },
    StationSpec {
        id: "irkutsk_russia",
        name: "Irkutsk, Russia",
        latitude: 52.2870,
        longitude: 104.3050,
        region: "siberia",
        elevation_m: 440.0,
        lake_adjacent: false,
    },
    StationSpec {
        id: "chamonix_france",
        name: "Chamonix, France",
        latitude: 45.9237,
        longitude: 6.8694,
        region: "alps",
        elevation_m: 1035.0,
        lake_adjacent: false,
    },
    StationSpec {
        id: "zermatt_switzerland",
        name: "Zermatt, Switzerland",
        latitude: 46.0207,
        longitude: 7.7491,
        region: "alps",
        elevation_m: 1608.0,
        lake_adjacent: false,
    },
    StationSpec {
        id: "mammoth_mountain_ca",
        name: "Mammoth Mountain, CA",
        latitude: 37.6308,
        longitude: -119.0326,
        region: "western_us",
        elevation_m: 2424.0,
        lake_adjacent: false,
    },
    StationSpec {
        id: "denver_co",
        name: "Denver, CO",
        latitude: 39.7392,
        longitude: -104.9903,
        region: "western_us",
        elevation_m: 1609.0,
        lake_adjacent: false,
    },
];

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Immutable id → location lookup.
#[derive(Debug, Clone, Default)]
pub struct LocationRegistry {
    locations: BTreeMap<String, Location>,
}

#[derive(Debug, Deserialize)]
struct LocationFile {
    #[serde(rename = "location")]
    locations: Vec<Location>,
}

impl LocationRegistry {
    /// Builds a registry, rejecting duplicate ids.
    pub fn new(locations: Vec<Location>) -> Result<Self, SnowlagError> {
        let mut map = BTreeMap::new();
        for location in locations {
            if map.contains_key(&location.id) {
                return Err(SnowlagError::Configuration(format!(
                    "location {} registered twice",
                    location.id
                )));
            }
            map.insert(location.id.clone(), location);
        }
        Ok(Self { locations: map })
    }

    /// The compiled-in default network.
    pub fn default_network() -> Self {
        let locations = DEFAULT_NETWORK
            .iter()
            .map(|s| (s.id.to_string(), s.to_location()))
            .collect();
        Self { locations }
    }

    /// Loads `[[location]]` tables from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SnowlagError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            SnowlagError::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, SnowlagError> {
        let file: LocationFile = toml::from_str(text)
            .map_err(|e| SnowlagError::Configuration(format!("location file: {}", e)))?;
        Self::new(file.locations)
    }

    pub fn find(&self, id: &str) -> Option<&Location> {
        self.locations.get(id)
    }

    pub fn all(&self) -> impl Iterator<Item = &Location> {
        self.locations.values()
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    /// Every location except `target_id`, ordered by id.
    pub fn candidates_for(&self, target_id: &str) -> Vec<Location> {
        self.locations
            .values()
            .filter(|l| l.id != target_id)
            .cloned()
            .collect()
    }

    pub fn in_region(&self, region: &str) -> Vec<&Location> {
        self.locations.values().filter(|l| l.region == region).collect()
    }
}

// ---------------------------------------------------------------------------
// Geometry
// ---------------------------------------------------------------------------

/// Great-circle distance between two locations (haversine), kilometres.
pub fn distance_km(a: &Location, b: &Location) -> f64 {
    let (lat1, lat2) = (a.latitude.to_radians(), b.latitude.to_radians());
    let d_lat = lat2 - lat1;
    let d_lon = (b.longitude - a.longitude).to_radians();
    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().min(1.0).asin()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
