//! Inbound sensor event types

use chrono::{DateTime, Utc};
use waymesh_shared::LocationPoint;

/// A single GPS reading as delivered by the platform location service
#[derive(Debug, Clone, PartialEq)]
pub struct LocationFix {
    /// Latitude in degrees (WGS84)
    pub latitude: f64,
    /// Longitude in degrees (WGS84)
    pub longitude: f64,
    /// Altitude in meters, if reported
    pub altitude: Option<f64>,
    /// Horizontal accuracy in meters; negative values mark an invalid reading
    pub horizontal_accuracy: Option<f64>,
    /// Vertical accuracy in meters
    pub vertical_accuracy: Option<f64>,
    /// Ground speed in m/s
    pub speed: Option<f64>,
    /// Course over ground in degrees
    pub course: Option<f64>,
    /// Reading timestamp (UTC)
    pub timestamp: DateTime<Utc>,
}

impl LocationFix {
    /// Whether this reading is usable at all.
    ///
    /// Platform services report invalid fixes with a negative accuracy;
    /// those are dropped before reaching the state machine.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
            && self.horizontal_accuracy.map_or(true, |a| a >= 0.0)
    }

    /// Ground speed clamped to non-negative, if present
    pub fn speed_mps(&self) -> Option<f64> {
        self.speed.filter(|s| *s >= 0.0)
    }

    /// Convert into the wire sample shape
    pub fn to_point(&self) -> LocationPoint {
        LocationPoint {
            latitude: self.latitude,
            longitude: self.longitude,
            altitude: self.altitude,
            horizontal_accuracy: self.horizontal_accuracy,
            vertical_accuracy: self.vertical_accuracy,
            speed: self.speed_mps(),
            course: self.course,
            timestamp: self.timestamp,
            notes: None,
        }
    }
}

/// Coarse motion detector output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionState {
    Stationary,
    Moving,
}

/// Events delivered to the tracking supervisor
#[derive(Debug, Clone, PartialEq)]
pub enum SensorEvent {
    /// A new GPS reading
    Fix(LocationFix),
    /// The device left the installed monitoring region
    GeofenceExit,
    /// External power connected
    ChargerConnected,
    /// External power disconnected
    ChargerDisconnected,
    /// The motion detector changed state
    MotionChanged(MotionState),
    /// The platform is about to suspend the process
    AppSuspending,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fix() -> LocationFix {
        LocationFix {
            latitude: 59.91,
            longitude: 10.75,
            altitude: None,
            horizontal_accuracy: Some(12.0),
            vertical_accuracy: None,
            speed: Some(1.5),
            course: None,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_negative_accuracy_is_invalid() {
        let mut f = fix();
        f.horizontal_accuracy = Some(-1.0);
        assert!(!f.is_valid());
    }

    #[test]
    fn test_missing_accuracy_is_still_valid() {
        let mut f = fix();
        f.horizontal_accuracy = None;
        assert!(f.is_valid());
    }

    #[test]
    fn test_out_of_range_coordinates_invalid() {
        let mut f = fix();
        f.latitude = 91.0;
        assert!(!f.is_valid());
    }

    #[test]
    fn test_negative_speed_dropped_on_conversion() {
        let mut f = fix();
        f.speed = Some(-2.0);
        assert_eq!(f.to_point().speed, None);
    }
}
