//! Peer mesh
//!
//! Nearby devices running the tracker exchange positions over short-range
//! radio; whichever device has connectivity forwards its peer cache to the
//! server after each successful upload. Radio failures degrade the mesh
//! only, never core tracking.

mod ble;
mod cache;
mod radio;
mod relay;

pub use ble::{BleRadio, POSITION_CHAR_UUID, WAYMESH_SERVICE_UUID};
pub use cache::{PeerCache, PeerPosition};
pub use radio::{DiscoveredPeer, MeshRadio};
pub use relay::{MeshIdentity, PeerMeshRelay};
