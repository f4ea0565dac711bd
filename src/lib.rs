//! Waymesh tracking client
//!
//! Records a device's position continuously, adapts its sampling strategy to
//! conserve battery, and uploads buffered points with resilience against
//! transient network failure. Nearby devices running the same tracker
//! exchange positions over short-range radio and relay them through
//! whichever device has connectivity.
//!
//! The pieces are wired explicitly: sensor events feed the
//! [`tracker::TrackingSupervisor`], which buffers samples into the
//! [`buffer::PointBuffer`]; the [`upload::UploadCoordinator`] drains the
//! buffer to the server; and each successful upload triggers the
//! [`mesh::PeerMeshRelay`] to forward cached peer positions.

pub mod buffer;
pub mod config;
pub mod geofence;
pub mod mesh;
pub mod sensors;
pub mod tracker;
pub mod upload;
