//! HTTP contract types for the collection server
//!
//! Field names follow the server's JSON schema exactly: batches go to
//! `POST /locations`, a single live position to `POST /positions`, and
//! forwarded peer positions to `POST /positions/relay`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single recorded location sample
///
/// Immutable once created. Samples move from the point buffer into an
/// in-flight upload batch and are either discarded on success or returned
/// to the front of the buffer on failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationPoint {
    /// Latitude in degrees (WGS84)
    pub latitude: f64,
    /// Longitude in degrees (WGS84)
    pub longitude: f64,
    /// Altitude in meters, if the fix carried one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
    /// Horizontal accuracy in meters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub horizontal_accuracy: Option<f64>,
    /// Vertical accuracy in meters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vertical_accuracy: Option<f64>,
    /// Ground speed in m/s, non-negative when present
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    /// Course over ground in degrees
    #[serde(skip_serializing_if = "Option::is_none")]
    pub course: Option<f64>,
    /// Sample timestamp (UTC, sub-second precision)
    pub timestamp: DateTime<Utc>,
    /// Free-text note, used for mode-transition markers
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Upload batch body for `POST /locations`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationBatch {
    pub device_id: u64,
    pub locations: Vec<LocationPoint>,
}

/// Server response to a location batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResponse {
    pub received: usize,
    pub batch_id: String,
    #[serde(default)]
    pub visits_detected: usize,
}

/// Live position body for `POST /positions`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionReport {
    pub device_id: u64,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

/// A peer position forwarded on behalf of a device without connectivity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayedPosition {
    pub device_id: u64,
    pub user_id: u64,
    pub display_name: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

/// Relay body for `POST /positions/relay`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayBatch {
    pub relay_device_id: u64,
    pub positions: Vec<RelayedPosition>,
}

impl LocationPoint {
    /// Create a bare sample from coordinates and a timestamp
    pub fn new(latitude: f64, longitude: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            latitude,
            longitude,
            altitude: None,
            horizontal_accuracy: None,
            vertical_accuracy: None,
            speed: None,
            course: None,
            timestamp,
            notes: None,
        }
    }

    /// Attach a marker note to this sample
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes = Some(note.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_point_serializes_server_field_names() {
        let ts = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let pt = LocationPoint {
            horizontal_accuracy: Some(12.5),
            speed: Some(1.2),
            ..LocationPoint::new(59.91, 10.75, ts)
        };
        let json = serde_json::to_value(&pt).unwrap();
        assert_eq!(json["latitude"], 59.91);
        assert_eq!(json["horizontal_accuracy"], 12.5);
        // absent optionals are omitted, not null
        assert!(json.get("altitude").is_none());
        assert!(json.get("notes").is_none());
    }

    #[test]
    fn test_batch_response_tolerates_missing_visits() {
        let resp: BatchResponse =
            serde_json::from_str(r#"{"received": 3, "batch_id": "abc123"}"#).unwrap();
        assert_eq!(resp.received, 3);
        assert_eq!(resp.visits_detected, 0);
    }

    #[test]
    fn test_marker_note_roundtrip() {
        let ts = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let pt = LocationPoint::new(0.0, 0.0, ts).with_note("geofence exit");
        let json = serde_json::to_string(&pt).unwrap();
        let back: LocationPoint = serde_json::from_str(&json).unwrap();
        assert_eq!(back.notes.as_deref(), Some("geofence exit"));
    }
}
