//! Peer mesh relay
//!
//! Keeps the beacon fresh, runs periodic scan cycles into the peer cache,
//! and forwards cached peers to the server whenever an upload succeeds.
//! Everything here is best-effort: a missed relay window is recovered on
//! the next successful upload.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use waymesh_shared::{codec, now_ms, PeerAnnounce, PositionReport, RelayBatch};

use crate::config::MeshConfig;
use crate::mesh::cache::PeerCache;
use crate::mesh::radio::MeshRadio;
use crate::sensors::LocationFix;
use crate::upload::LocationApi;

/// Identity carried in this device's beacon
#[derive(Debug, Clone)]
pub struct MeshIdentity {
    pub device_id: u64,
    pub user_id: u64,
    pub display_name: String,
}

/// Maintains the peer cache and relays it through this device's uplink
pub struct PeerMeshRelay {
    cfg: MeshConfig,
    identity: MeshIdentity,
    radio: Arc<dyn MeshRadio>,
    api: Arc<dyn LocationApi>,
    cache: Mutex<PeerCache>,
    foreground: AtomicBool,
    position_rx: watch::Receiver<Option<LocationFix>>,
}

impl PeerMeshRelay {
    pub fn new(
        cfg: MeshConfig,
        identity: MeshIdentity,
        radio: Arc<dyn MeshRadio>,
        api: Arc<dyn LocationApi>,
        position_rx: watch::Receiver<Option<LocationFix>>,
    ) -> Arc<Self> {
        let stale_after = cfg.stale_after;
        Arc::new(Self {
            cfg,
            identity,
            radio,
            api,
            cache: Mutex::new(PeerCache::new(stale_after)),
            foreground: AtomicBool::new(true),
            position_rx,
        })
    }

    /// Flip the scan cadence between foreground and background
    pub fn set_foreground(&self, foreground: bool) {
        self.foreground.store(foreground, Ordering::Relaxed);
    }

    /// Cached peer count, stale entries included
    pub fn peer_count(&self) -> usize {
        self.lock_cache().len()
    }

    fn scan_interval(&self) -> Duration {
        if self.foreground.load(Ordering::Relaxed) {
            self.cfg.scan_interval_foreground
        } else {
            self.cfg.scan_interval_background
        }
    }

    /// Run scan cycles and relay-on-upload until the upload notification
    /// channel closes
    pub fn spawn(self: &Arc<Self>, mut upload_rx: mpsc::UnboundedReceiver<()>) -> JoinHandle<()> {
        let relay = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = sleep(relay.scan_interval()) => {
                        relay.run_scan_cycle().await;
                    }
                    maybe_notice = upload_rx.recv() => match maybe_notice {
                        Some(()) => relay.relay_to_server().await,
                        None => break,
                    },
                }
            }
            info!("Mesh relay stopped");
        })
    }

    /// One cycle: refresh the beacon, scan, merge discoveries, prune
    pub async fn run_scan_cycle(&self) {
        self.advertise_current().await;

        match self.radio.scan(self.cfg.scan_window).await {
            Ok(peers) => {
                let now = Instant::now();
                for peer in peers {
                    match codec::decode_announce(&peer.payload) {
                        Ok(announce) if announce.device_id == self.identity.device_id => {
                            // Our own reflection
                        }
                        Ok(announce) if announce.device_id != 0 => {
                            debug!(
                                "Cached peer {} ({}) via {}",
                                announce.device_id, announce.display_name, peer.address
                            );
                            self.lock_cache().insert(announce, now);
                        }
                        Ok(_) => debug!("Ignoring announce without a device id"),
                        Err(e) => debug!("Undecodable beacon from {}: {e}", peer.address),
                    }
                }
            }
            Err(e) => {
                warn!("Peer scan failed, mesh degraded: {e}");
            }
        }

        let removed = self.lock_cache().prune(Instant::now());
        if removed > 0 {
            debug!("Pruned {removed} stale peer entries");
        }
    }

    /// Push the current position into the beacon peers read
    async fn advertise_current(&self) {
        let Some(fix) = self.position_rx.borrow().clone() else {
            return;
        };

        let announce = PeerAnnounce {
            device_id: self.identity.device_id,
            user_id: self.identity.user_id,
            display_name: self.identity.display_name.clone(),
            latitude: fix.latitude,
            longitude: fix.longitude,
            altitude: fix.altitude,
            accuracy: fix.horizontal_accuracy,
            speed: fix.speed_mps(),
            timestamp_ms: now_ms(),
        };

        let payload = match codec::encode_announce(&announce) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Beacon encoding failed: {e}");
                return;
            }
        };

        if let Err(e) = self.radio.set_beacon(payload).await {
            warn!("Beacon update failed, mesh degraded: {e}");
        }
    }

    /// Forward the live position and all fresh cached peers to the server.
    /// Called after each successful upload; never blocks uploads, never
    /// retries.
    pub async fn relay_to_server(&self) {
        let current_fix = self.position_rx.borrow().clone();
        if let Some(fix) = current_fix {
            let report = PositionReport {
                device_id: self.identity.device_id,
                latitude: fix.latitude,
                longitude: fix.longitude,
                altitude: fix.altitude,
                accuracy: fix.horizontal_accuracy,
                speed: fix.speed_mps(),
                timestamp: fix.timestamp,
            };
            if let Err(e) = self.api.post_position(&report).await {
                debug!("Live position post failed: {e}");
            }
        }

        let positions = self
            .lock_cache()
            .fresh_positions(Instant::now(), self.identity.device_id);
        if positions.is_empty() {
            return;
        }

        let count = positions.len();
        let batch = RelayBatch {
            relay_device_id: self.identity.device_id,
            positions,
        };
        match self.api.post_relay(&batch).await {
            Ok(()) => info!("Relayed {count} peer positions"),
            Err(e) => warn!("Peer relay failed, will retry on next upload: {e}"),
        }
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, PeerCache> {
        self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }
}
