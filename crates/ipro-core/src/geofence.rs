//! Office geofence: great-circle distance and radius check.

use std::fmt;

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A WGS84 position in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Haversine distance to `other` in meters.
    pub fn distance_to(&self, other: &Coordinates) -> f64 {
        let phi1 = self.latitude.to_radians();
        let phi2 = other.latitude.to_radians();
        let d_phi = (other.latitude - self.latitude).to_radians();
        let d_lambda = (other.longitude - self.longitude).to_radians();

        let a = (d_phi / 2.0).sin().powi(2)
            + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
        EARTH_RADIUS_M * c
    }
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}, {:.6}", self.latitude, self.longitude)
    }
}

/// Circular boundary around a fixed coordinate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Geofence {
    pub center: Coordinates,
    pub radius_m: f64,
}

/// The office geofence compiled into this build.
pub const OFFICE_GEOFENCE: Geofence = Geofence {
    center: Coordinates::new(13.056_962_959_094_266, 80.257_247_010_789_64),
    radius_m: 150.0,
};

impl Geofence {
    pub fn distance_from(&self, position: &Coordinates) -> f64 {
        self.center.distance_to(position)
    }

    /// Whether `position` lies on or inside the boundary.
    pub fn contains(&self, position: &Coordinates) -> bool {
        self.distance_from(position) <= self.radius_m
    }
}

/// Returns true iff the haversine distance between the two points is at most
/// `radius_m` meters.
pub fn evaluate(
    current_lat: f64,
    current_lon: f64,
    office_lat: f64,
    office_lon: f64,
    radius_m: f64,
) -> bool {
    Geofence {
        center: Coordinates::new(office_lat, office_lon),
        radius_m,
    }
    .contains(&Coordinates::new(current_lat, current_lon))
}

/// Direction of the rejected Office-mode action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeofenceViolation {
    CheckIn { distance_m: u32 },
    CheckOut { distance_m: u32 },
}

impl GeofenceViolation {
    pub fn distance_m(&self) -> u32 {
        match self {
            GeofenceViolation::CheckIn { distance_m }
            | GeofenceViolation::CheckOut { distance_m } => *distance_m,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            GeofenceViolation::CheckIn { .. } => {
                "You must be at the office location to check in as Office."
            }
            GeofenceViolation::CheckOut { .. } => {
                "Office check-out is not allowed outside the office location."
            }
        }
    }
}

impl fmt::Display for GeofenceViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}
