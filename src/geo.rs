use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Mean earth radius used for great-circle distances, in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A single position fix as delivered by a location provider.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
    pub timestamp: DateTime<Utc>,
}

impl Position {
    pub fn new(latitude: f64, longitude: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            latitude,
            longitude,
            timestamp,
        }
    }

    /// True when both coordinates are finite and inside their valid ranges.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }

    /// Great-circle distance to `other` in meters (haversine).
    pub fn distance_to(&self, other: &Position) -> f64 {
        haversine_distance(self.latitude, self.longitude, other.latitude, other.longitude)
    }

    /// Position reached by moving `distance_m` meters along `bearing_deg`
    /// (clockwise from north), keeping this fix's timestamp.
    pub fn offset(&self, distance_m: f64, bearing_deg: f64) -> Position {
        let angular = distance_m / EARTH_RADIUS_M;
        let bearing = bearing_deg.to_radians();
        let lat1 = self.latitude.to_radians();
        let lon1 = self.longitude.to_radians();

        let lat2 = (lat1.sin() * angular.cos() + lat1.cos() * angular.sin() * bearing.cos()).asin();
        let lon2 = lon1
            + (bearing.sin() * angular.sin() * lat1.cos())
                .atan2(angular.cos() - lat1.sin() * lat2.sin());

        Position::new(lat2.to_degrees(), lon2.to_degrees(), self.timestamp)
    }
}

pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let to_rad = |deg: f64| deg.to_radians();
    let dlat = to_rad(lat2 - lat1);
    let dlon = to_rad(lon2 - lon1);
    let a = (dlat / 2.0).sin().powi(2)
        + to_rad(lat1).cos() * to_rad(lat2).cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_M * c
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(lat: f64, lon: f64) -> Position {
        Position::new(lat, lon, Utc::now())
    }

    #[test]
    fn test_distance_to_self_is_zero() {
        let p = at(51.5, -0.12);
        assert_eq!(p.distance_to(&p), 0.0);
    }

    #[test]
    fn test_one_degree_of_latitude() {
        let d = at(0.0, 0.0).distance_to(&at(1.0, 0.0));
        // 2 * pi * R / 360
        assert!((d - 111_194.93).abs() < 1.0, "got {d}");
    }

    #[test]
    fn test_distance_is_symmetric() {
        let a = at(48.8566, 2.3522);
        let b = at(48.8570, 2.3530);
        assert!((a.distance_to(&b) - b.distance_to(&a)).abs() < 1e-9);
    }

    #[test]
    fn test_offset_matches_distance() {
        let origin = at(59.33, 18.06);
        for bearing in [0.0, 45.0, 90.0, 200.0] {
            let moved = origin.offset(25.0, bearing);
            assert!((origin.distance_to(&moved) - 25.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_is_valid() {
        assert!(at(10.0, 20.0).is_valid());
        assert!(!at(f64::NAN, 20.0).is_valid());
        assert!(!at(10.0, f64::INFINITY).is_valid());
        assert!(!at(91.0, 0.0).is_valid());
        assert!(!at(0.0, -181.0).is_valid());
    }
}
