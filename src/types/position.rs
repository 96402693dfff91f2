use geo::{HaversineDistance, Point};
use serde::{Deserialize, Serialize};

pub const FEET_PER_METER: f64 = 3.280_84;
pub const METERS_PER_SECOND_PER_KNOT: f64 = 0.514_444;
pub const KNOTS_PER_FOOT_PER_SECOND: f64 = 0.592_484;

/// Latitude/longitude pair in degrees
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GeoPosition {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPosition {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Great-circle distance in meters
    pub fn distance_m(&self, other: &GeoPosition) -> f64 {
        let a = Point::new(self.longitude, self.latitude);
        let b = Point::new(other.longitude, other.latitude);
        a.haversine_distance(&b)
    }

    /// Sentinel (0,0) positions come from zero-value snapshots
    pub fn is_null_island(&self) -> bool {
        self.latitude == 0.0 && self.longitude == 0.0
    }
}

pub fn knots_to_mps(knots: f64) -> f64 {
    knots * METERS_PER_SECOND_PER_KNOT
}

pub fn feet_to_meters(feet: f64) -> f64 {
    feet / FEET_PER_METER
}

/// Signed shortest rotation from `from` to `to`, in (-180, 180]
pub fn heading_delta(from: f64, to: f64) -> f64 {
    let mut delta = (to - from) % 360.0;
    if delta > 180.0 {
        delta -= 360.0;
    } else if delta <= -180.0 {
        delta += 360.0;
    }
    delta
}
