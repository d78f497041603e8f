//! Coordinate primitives and great-circle distance.
use serde::{Deserialize, Serialize};

/// Mean Earth radius in meters used by the haversine formula.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A WGS-84 coordinate in decimal degrees.
///
/// Values are taken as-is; no range validation is performed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinate {
    #[must_use]
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Great-circle distance to another coordinate, in meters.
    #[must_use]
    pub fn distance_m(&self, other: &Self) -> f64 {
        distance_m(*self, *other)
    }
}

/// Haversine great-circle distance between two coordinates, in meters.
///
/// Deterministic and symmetric; returns a finite value for finite inputs.
#[must_use]
pub fn distance_m(a: Coordinate, b: Coordinate) -> f64 {
    let phi_a = a.lat.to_radians();
    let phi_b = b.lat.to_radians();
    let d_phi = (b.lat - a.lat).to_radians();
    let d_lambda = (b.lng - a.lng).to_radians();

    let h = (d_phi / 2.0).sin().powi(2) + phi_a.cos() * phi_b.cos() * (d_lambda / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_M * c
}
