//! Waymesh Shared Wire Types
//!
//! This crate provides the wire types shared between tracker clients and the
//! collection server: the HTTP upload contract, the over-the-air beacon
//! payload exchanged between nearby peers, and its codec.

pub mod announce;
pub mod codec;
pub mod wire;

use std::time::{SystemTime, UNIX_EPOCH};

pub use announce::PeerAnnounce;
pub use wire::{BatchResponse, LocationBatch, LocationPoint, PositionReport, RelayBatch};

/// Get current timestamp in milliseconds since Unix epoch
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Protocol limits shared by all Waymesh devices
pub mod limits {
    /// Maximum beacon payload size in bytes (bounded by a single GATT read)
    pub const MAX_ANNOUNCE_SIZE: usize = 512;

    /// Peer cache entries older than this are stale and never relayed
    pub const PEER_STALE_SECS: u64 = 300;

    /// Batch uploads larger than this are rejected by the server
    pub const MAX_BATCH_POINTS: usize = 1000;
}
