//! Outbound commands to the platform location service

use anyhow::Result;
use async_trait::async_trait;

use crate::geofence::GeofenceRegion;

/// Control surface the tracking supervisor drives.
///
/// Implemented by the platform glue (or the simulated source in development).
/// Commands replace one another: starting distance-filtered updates while
/// high-accuracy updates are active switches modes, it does not stack them.
#[async_trait]
pub trait LocationCommands: Send + Sync {
    /// Start continuous high-accuracy location updates
    async fn start_high_accuracy(&self) -> Result<()>;

    /// Start location updates with a minimum-distance filter
    async fn start_distance_filtered(&self, min_distance_m: f64) -> Result<()>;

    /// Stop all location updates
    async fn stop_updates(&self) -> Result<()>;

    /// Install the monitoring region, replacing any previous one
    async fn install_geofence(&self, region: &GeofenceRegion) -> Result<()>;

    /// Remove the monitoring region if one is installed
    async fn remove_geofence(&self) -> Result<()>;
}
