//! # Navigation primitives
//!
//! This module provides the geodetic location type shared by the guidance
//! and navigation modules, together with the small-displacement operations
//! (NE/NED distance, bearing, offset) the tracking laws are built on. The
//! flat-earth approximations here are valid for the leg lengths flown by a
//! small fixed-wing aircraft and keep the cyclic path free of iterative
//! geodesic solutions.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use nalgebra::{Vector2, Vector3};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Mean radius of the Earth in meters.
pub const RADIUS_OF_EARTH_M: f64 = 6_371_000.0;

/// Floor on the longitude scale factor, to keep offsets finite at the poles.
const LON_SCALE_MIN: f64 = 0.01;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A geodetic location.
///
/// Altitude is positive up, relative to the same datum for every location
/// handled by the guidance module.
#[derive(Debug, Copy, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// Latitude in degrees, positive north
    pub lat_deg: f64,

    /// Longitude in degrees, positive east
    pub lon_deg: f64,

    /// Altitude in meters, positive up
    pub alt_m: f64
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Location {
    /// Create a new location from latitude, longitude and altitude.
    pub fn new(lat_deg: f64, lon_deg: f64, alt_m: f64) -> Self {
        Self { lat_deg, lon_deg, alt_m }
    }

    /// Scale factor between a degree of longitude and a degree of latitude
    /// at this location.
    fn lon_scale(&self) -> f64 {
        self.lat_deg.to_radians().cos().max(LON_SCALE_MIN)
    }

    /// Get the north/east displacement in meters from this location to
    /// `other`.
    pub fn distance_ne(&self, other: &Location) -> Vector2<f64> {
        Vector2::new(
            (other.lat_deg - self.lat_deg).to_radians() * RADIUS_OF_EARTH_M,
            (other.lon_deg - self.lon_deg).to_radians()
                * self.lon_scale()
                * RADIUS_OF_EARTH_M
        )
    }

    /// Get the north/east/down displacement in meters from this location to
    /// `other`.
    pub fn distance_ned(&self, other: &Location) -> Vector3<f64> {
        let ne = self.distance_ne(other);
        Vector3::new(ne[0], ne[1], self.alt_m - other.alt_m)
    }

    /// Get the bearing in radians from this location to `other`.
    ///
    /// The bearing is measured clockwise from true north and is returned in
    /// the range (-pi, pi].
    pub fn bearing_to(&self, other: &Location) -> f64 {
        let ne = self.distance_ne(other);
        ne[1].atan2(ne[0])
    }

    /// Move this location by the given north/east displacement in meters.
    pub fn offset(&mut self, north_m: f64, east_m: f64) {
        // scale at the pre-offset latitude, the exact inverse of
        // `distance_ne` from the original location
        let lon_scale = self.lon_scale();
        self.lat_deg += (north_m / RADIUS_OF_EARTH_M).to_degrees();
        self.lon_deg +=
            (east_m / (RADIUS_OF_EARTH_M * lon_scale)).to_degrees();
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_offset_distance_round_trip() {
        let origin = Location::new(52.0, -1.2, 120.0);

        let mut moved = origin;
        moved.offset(1000.0, -250.0);

        let ne = origin.distance_ne(&moved);
        assert!((ne[0] - 1000.0).abs() < 1e-6);
        assert!((ne[1] + 250.0).abs() < 1e-6);
    }

    #[test]
    fn test_bearing() {
        let origin = Location::new(0.0, 0.0, 0.0);

        let mut north = origin;
        north.offset(100.0, 0.0);
        assert!(origin.bearing_to(&north).abs() < 1e-9);

        let mut east = origin;
        east.offset(0.0, 100.0);
        assert!(
            (origin.bearing_to(&east) - std::f64::consts::FRAC_PI_2).abs()
                < 1e-9
        );
    }

    #[test]
    fn test_distance_ned_down_positive() {
        let origin = Location::new(10.0, 10.0, 100.0);
        let above = Location::new(10.0, 10.0, 150.0);

        // NED frame: a location above this one has a negative down component
        assert!((origin.distance_ned(&above)[2] + 50.0).abs() < 1e-9);
    }
}
