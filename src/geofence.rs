//! Geofence sizing policy
//!
//! The idle-state geofence must sit outside the fix's own error ellipse and
//! leave a fast-moving device enough margin that it has not already left a
//! naively-sized fence by the time monitoring starts.

/// Floor that keeps noisy fixes from thrashing the fence
pub const MIN_RADIUS_M: f64 = 20.0;

/// Multiplier applied to the fix accuracy
const ACCURACY_FACTOR: f64 = 1.5;

/// Seconds of travel margin granted to a moving device
const SPEED_MARGIN_SECS: f64 = 10.0;

/// Identifier of the single active monitoring region
pub const REGION_ID: &str = "waymesh.idle-fence";

/// Compute the monitoring radius for a fix accuracy and last known speed.
///
/// Total over non-negative reals; callers clamp inputs to >= 0.
pub fn monitoring_radius(fix_accuracy_m: f64, last_speed_mps: f64) -> f64 {
    MIN_RADIUS_M
        .max(fix_accuracy_m * ACCURACY_FACTOR)
        .max(last_speed_mps * SPEED_MARGIN_SECS)
}

/// Circular monitoring region installed while idle
#[derive(Debug, Clone, PartialEq)]
pub struct GeofenceRegion {
    /// Center latitude in degrees
    pub latitude: f64,
    /// Center longitude in degrees
    pub longitude: f64,
    /// Radius in meters
    pub radius_m: f64,
    /// Region identifier; constant, at most one region exists at a time
    pub identifier: &'static str,
}

impl GeofenceRegion {
    /// Create a region centered on a fix
    pub fn new(latitude: f64, longitude: f64, radius_m: f64) -> Self {
        Self {
            latitude,
            longitude,
            radius_m,
            identifier: REGION_ID,
        }
    }
}

/// Great-circle distance between two WGS84 coordinates in meters
pub fn haversine_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    const EARTH_RADIUS_M: f64 = 6_371_000.0;

    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * a.sqrt().asin()
}
