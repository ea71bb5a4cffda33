//! Great-circle distance and geofence membership.
//!
//! Pure math, no I/O and no failure modes. Distances use the haversine
//! formula on a spherical Earth; good to well under a meter at geofence
//! scale, which is far below GPS accuracy anyway.

use serde::{Deserialize, Serialize};

/// Mean Earth radius in meters (IUGG spherical approximation).
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A WGS84 coordinate in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Great-circle distance to `other` in meters.
    pub fn distance_m(&self, other: &GeoPoint) -> f64 {
        distance_meters(*self, *other)
    }
}

/// A geofence: a target coordinate plus a radius in meters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub location: GeoPoint,
    pub radius_m: f64,
}

impl Target {
    pub fn new(location: GeoPoint, radius_m: f64) -> Self {
        Self { location, radius_m }
    }

    /// Distance from `point` to the target center in meters.
    pub fn distance_to(&self, point: GeoPoint) -> f64 {
        distance_meters(self.location, point)
    }

    /// Whether `point` lies inside the geofence. Boundary is inclusive.
    pub fn contains(&self, point: GeoPoint) -> bool {
        within_radius(self.location, point, self.radius_m)
    }
}

/// Haversine great-circle distance between two points, in meters.
pub fn distance_meters(a: GeoPoint, b: GeoPoint) -> f64 {
    let dlat = (b.lat - a.lat).to_radians();
    let dlng = (b.lng - a.lng).to_radians();
    let h = (dlat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (dlng / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_M * c
}

/// In-radius test. A point exactly at `radius_m` counts as inside.
pub fn within_radius(a: GeoPoint, b: GeoPoint, radius_m: f64) -> bool {
    distance_meters(a, b) <= radius_m
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const TOKYO_STATION: GeoPoint = GeoPoint {
        lat: 35.681236,
        lng: 139.767125,
    };

    #[test]
    fn zero_distance_to_self() {
        assert_eq!(distance_meters(TOKYO_STATION, TOKYO_STATION), 0.0);
    }

    #[test]
    fn one_degree_of_longitude_at_equator() {
        let a = GeoPoint::new(0.0, 0.0);
        let b = GeoPoint::new(0.0, 1.0);
        let d = distance_meters(a, b);
        // 1 degree of arc on a 6,371 km sphere is about 111.195 km.
        assert!((d - 111_195.0).abs() < 200.0, "got {d}");
    }

    #[test]
    fn short_distance_is_plausible() {
        // Two points ~15 m apart along a Tokyo street.
        let a = GeoPoint::new(35.681236, 139.767125);
        let b = GeoPoint::new(35.681236, 139.767290);
        let d = distance_meters(a, b);
        assert!(d > 10.0 && d < 20.0, "got {d}");
    }

    #[test]
    fn boundary_is_inclusive() {
        let a = GeoPoint::new(0.0, 0.0);
        let b = GeoPoint::new(0.0, 1.0);
        let d = distance_meters(a, b);
        assert!(within_radius(a, b, d));
        assert!(within_radius(a, b, d + 0.001));
        assert!(!within_radius(a, b, d - 0.001));
    }

    #[test]
    fn target_contains_uses_its_radius() {
        let gym = Target::new(TOKYO_STATION, 10.0);
        assert!(gym.contains(TOKYO_STATION));
        let across_town = GeoPoint::new(35.6586, 139.7454);
        assert!(!gym.contains(across_town));
        assert!(gym.distance_to(across_town) > 2_000.0);
    }

    proptest! {
        #[test]
        fn distance_is_symmetric(
            lat1 in -89.0f64..89.0, lng1 in -179.0f64..179.0,
            lat2 in -89.0f64..89.0, lng2 in -179.0f64..179.0,
        ) {
            let a = GeoPoint::new(lat1, lng1);
            let b = GeoPoint::new(lat2, lng2);
            let ab = distance_meters(a, b);
            let ba = distance_meters(b, a);
            prop_assert!((ab - ba).abs() < 1e-6);
        }

        #[test]
        fn distance_to_self_is_zero(lat in -89.0f64..89.0, lng in -179.0f64..179.0) {
            let p = GeoPoint::new(lat, lng);
            prop_assert_eq!(distance_meters(p, p), 0.0);
        }

        #[test]
        fn widening_the_radius_never_excludes(
            lat in -89.0f64..89.0, lng in -179.0f64..179.0,
            radius in 0.0f64..100_000.0, extra in 0.0f64..100_000.0,
        ) {
            let center = GeoPoint::new(35.0, 139.0);
            let p = GeoPoint::new(lat, lng);
            if within_radius(center, p, radius) {
                prop_assert!(within_radius(center, p, radius + extra));
            }
        }
    }
}
