//! Short-range radio abstraction
//!
//! The relay drives whatever radio backend is wired in through this trait;
//! the BLE implementation lives in [`super::ble`], and tests substitute an
//! in-memory fake.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;

/// A peer found during one scan cycle
#[derive(Debug, Clone)]
pub struct DiscoveredPeer {
    /// Radio-level address, unique per physical device
    pub address: String,
    /// The beacon payload read from the peer
    pub payload: Bytes,
}

/// Radio operations the mesh relay issues
#[async_trait]
pub trait MeshRadio: Send + Sync {
    /// Replace the beacon payload nearby peers read from this device
    async fn set_beacon(&self, payload: Bytes) -> Result<()>;

    /// Scan for peers for up to `window`, reading each discovered device's
    /// payload once. Re-discoveries within the same cycle are ignored.
    async fn scan(&self, window: Duration) -> Result<Vec<DiscoveredPeer>>;
}
