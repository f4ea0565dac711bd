//! Runtime configuration for the tracker client

use std::path::PathBuf;
use std::time::Duration;

use waymesh_shared::limits;

/// How the machine wakes from its low-power state
///
/// Historical builds shipped two policies for the same slot: geofence-exit
/// wake and motion-detector wake. The surrounding buffer/upload/relay
/// components are policy-independent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WakePolicy {
    /// Install a geofence around the settled fix; wake on region exit
    #[default]
    Geofence,
    /// No geofence; wake when the motion detector reports movement
    Motion,
}

/// Thresholds driving the tracking state machine
#[derive(Debug, Clone)]
pub struct TrackingConfig {
    /// Fixes at or below this accuracy transition immediately
    pub excellent_accuracy_m: f64,
    /// Fixes at or below this accuracy open a settling window
    pub good_accuracy_m: f64,
    /// How long to wait for a better fix after the first acceptable one
    pub settling_duration: Duration,
    /// Hard ceiling on time spent acquiring before transitioning anyway
    pub max_fix_wait: Duration,
    /// Minimum time between buffered fixes
    pub min_buffer_interval: Duration,
    /// Fixes farther than this from the last buffered one bypass the time gate
    pub min_buffer_distance_m: f64,
    /// Distance filter requested while tracking continuously
    pub continuous_distance_filter_m: f64,
    /// Accuracy assumed when the fix wait expires with nothing usable
    pub fallback_accuracy_m: f64,
    /// Wake source for the low-power state
    pub wake_policy: WakePolicy,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            excellent_accuracy_m: 15.0,
            good_accuracy_m: 50.0,
            settling_duration: Duration::from_secs(15),
            max_fix_wait: Duration::from_secs(30),
            min_buffer_interval: Duration::from_secs(3),
            min_buffer_distance_m: 5.0,
            continuous_distance_filter_m: 10.0,
            fallback_accuracy_m: 100.0,
            wake_policy: WakePolicy::Geofence,
        }
    }
}

/// Upload batching configuration
#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Buffer length that triggers an immediate flush
    pub batch_size: usize,
    /// Maximum time samples sit in the buffer; also the periodic flush interval
    pub max_buffer_age: Duration,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            max_buffer_age: Duration::from_secs(300),
        }
    }
}

impl UploadConfig {
    /// Near-real-time profile: every sample ships as soon as it is recorded
    pub fn aggressive() -> Self {
        Self {
            batch_size: 1,
            max_buffer_age: Duration::from_secs(30),
        }
    }
}

/// Peer mesh configuration
#[derive(Debug, Clone)]
pub struct MeshConfig {
    /// Scan cadence while the app is foregrounded
    pub scan_interval_foreground: Duration,
    /// Scan cadence while backgrounded, where radio time is more expensive
    pub scan_interval_background: Duration,
    /// How long a single discovery scan runs
    pub scan_window: Duration,
    /// Peer cache entries older than this are stale
    pub stale_after: Duration,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            scan_interval_foreground: Duration::from_secs(30),
            scan_interval_background: Duration::from_secs(120),
            scan_window: Duration::from_secs(10),
            stale_after: Duration::from_secs(limits::PEER_STALE_SECS),
        }
    }
}

/// Top-level configuration for the tracker daemon
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Server-assigned device identifier; must be non-zero to start tracking
    pub device_id: u64,
    /// Owning user identifier, carried in the peer beacon
    pub user_id: u64,
    /// Human-readable device name, carried in the peer beacon
    pub display_name: String,
    /// Where the pending buffer is persisted between runs
    pub buffer_path: PathBuf,
    pub tracking: TrackingConfig,
    pub upload: UploadConfig,
    pub mesh: MeshConfig,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            device_id: 0,
            user_id: 0,
            display_name: "waymesh-device".into(),
            buffer_path: PathBuf::from("pending_points.json"),
            tracking: TrackingConfig::default(),
            upload: UploadConfig::default(),
            mesh: MeshConfig::default(),
        }
    }
}
