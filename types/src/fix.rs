//! Raw location fixes as delivered by a location feed.

use serde::{Deserialize, Serialize};

/// Mean earth radius in meters (IUGG).
const EARTH_RADIUS_METERS: f64 = 6_371_008.8;

/// A single raw fix from the location feed.
///
/// Numeric fields mirror what platform location services report: a fix always
/// carries coordinates, while the remaining channels default to `0.0` when the
/// source cannot measure them. A *negative* `horizontal_accuracy` marks an
/// invalid reading and such fixes are never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationFix {
    pub latitude: f64,
    pub longitude: f64,
    /// Uncertainty radius in meters. Negative means the reading is invalid.
    #[serde(default)]
    pub horizontal_accuracy: f64,
    #[serde(default)]
    pub vertical_accuracy: f64,
    /// Meters above sea level.
    #[serde(default)]
    pub altitude: f64,
    /// Meters per second over ground.
    #[serde(default)]
    pub speed: f64,
    /// Heading in degrees from true north.
    #[serde(default)]
    pub course: f64,
    /// Capture time, seconds since the Unix epoch.
    #[serde(default)]
    pub timestamp: i64,
}

impl LocationFix {
    /// A reading with a negative uncertainty radius is invalid and must be
    /// rejected before it reaches the store.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.horizontal_accuracy >= 0.0
    }

    /// Great-circle distance in meters from this fix to `(latitude, longitude)`.
    #[must_use]
    pub fn distance_from(&self, latitude: f64, longitude: f64) -> f64 {
        haversine_meters(self.latitude, self.longitude, latitude, longitude)
    }
}

/// Great-circle (haversine) distance in meters between two coordinates.
#[must_use]
pub fn haversine_meters(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_METERS * c
}
