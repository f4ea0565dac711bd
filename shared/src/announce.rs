//! Over-the-air beacon payload
//!
//! A `PeerAnnounce` is the position a device exposes to nearby peers over
//! short-range radio. It is deliberately compact: the whole encoded message
//! must fit a single GATT characteristic read.

use chrono::{DateTime, TimeZone, Utc};
use prost::Message;

use crate::wire::RelayedPosition;

/// Position beacon read by nearby peers
#[derive(Clone, PartialEq, Message)]
pub struct PeerAnnounce {
    /// Device identifier of the announcing device
    #[prost(uint64, tag = "1")]
    pub device_id: u64,

    /// Owning user identifier
    #[prost(uint64, tag = "2")]
    pub user_id: u64,

    /// Human-readable device name
    #[prost(string, tag = "3")]
    pub display_name: String,

    /// Latitude in degrees (WGS84)
    #[prost(double, tag = "4")]
    pub latitude: f64,

    /// Longitude in degrees (WGS84)
    #[prost(double, tag = "5")]
    pub longitude: f64,

    /// Altitude in meters, if known
    #[prost(double, optional, tag = "6")]
    pub altitude: Option<f64>,

    /// Horizontal accuracy in meters, if known
    #[prost(double, optional, tag = "7")]
    pub accuracy: Option<f64>,

    /// Ground speed in m/s, if known
    #[prost(double, optional, tag = "8")]
    pub speed: Option<f64>,

    /// Sample timestamp, milliseconds since Unix epoch
    #[prost(uint64, tag = "9")]
    pub timestamp_ms: u64,
}

impl PeerAnnounce {
    /// Sample timestamp as UTC datetime
    pub fn timestamp(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.timestamp_ms as i64)
            .single()
            .unwrap_or_default()
    }

    /// Convert into the JSON shape the server accepts on the relay endpoint
    pub fn to_relayed(&self) -> RelayedPosition {
        RelayedPosition {
            device_id: self.device_id,
            user_id: self.user_id,
            display_name: self.display_name.clone(),
            latitude: self.latitude,
            longitude: self.longitude,
            altitude: self.altitude,
            accuracy: self.accuracy,
            speed: self.speed,
            timestamp: self.timestamp(),
        }
    }
}
