//! Peer position cache
//!
//! Keyed by device identifier, last-write-wins. An entry is stale once its
//! local discovery timestamp is older than the configured threshold; stale
//! entries are never relayed and are purged after each scan cycle.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use waymesh_shared::wire::RelayedPosition;
use waymesh_shared::PeerAnnounce;

/// A peer position plus when this device discovered it
#[derive(Debug, Clone)]
pub struct PeerPosition {
    pub announce: PeerAnnounce,
    pub discovered_at: Instant,
}

/// Time-bounded cache of nearby peer positions
#[derive(Debug)]
pub struct PeerCache {
    entries: HashMap<u64, PeerPosition>,
    stale_after: Duration,
}

impl PeerCache {
    pub fn new(stale_after: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            stale_after,
        }
    }

    /// Insert or replace the entry for the announcing device
    pub fn insert(&mut self, announce: PeerAnnounce, now: Instant) {
        self.entries.insert(
            announce.device_id,
            PeerPosition {
                announce,
                discovered_at: now,
            },
        );
    }

    /// Number of cached entries, stale ones included
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove stale entries, returning how many were dropped
    pub fn prune(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        let stale_after = self.stale_after;
        self.entries
            .retain(|_, p| now.duration_since(p.discovered_at) <= stale_after);
        before - self.entries.len()
    }

    /// Non-stale positions ready for relay, excluding the relaying device
    pub fn fresh_positions(&self, now: Instant, exclude_device: u64) -> Vec<RelayedPosition> {
        self.entries
            .values()
            .filter(|p| p.announce.device_id != exclude_device)
            .filter(|p| now.duration_since(p.discovered_at) <= self.stale_after)
            .map(|p| p.announce.to_relayed())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn announce(device_id: u64) -> PeerAnnounce {
        PeerAnnounce {
            device_id,
            user_id: 1,
            display_name: format!("peer-{device_id}"),
            latitude: 59.91,
            longitude: 10.75,
            timestamp_ms: 1_717_243_200_000,
            ..Default::default()
        }
    }

    #[test]
    fn test_fresh_at_250s_stale_at_301s() {
        let t0 = Instant::now();
        let mut cache = PeerCache::new(Duration::from_secs(300));
        cache.insert(announce(9), t0);

        let at_250 = cache.fresh_positions(t0 + Duration::from_secs(250), 0);
        assert_eq!(at_250.len(), 1);

        let at_301 = cache.fresh_positions(t0 + Duration::from_secs(301), 0);
        assert!(at_301.is_empty());
    }

    #[test]
    fn test_prune_drops_only_stale_entries() {
        let t0 = Instant::now();
        let mut cache = PeerCache::new(Duration::from_secs(300));
        cache.insert(announce(1), t0);
        cache.insert(announce(2), t0 + Duration::from_secs(200));

        let removed = cache.prune(t0 + Duration::from_secs(301));
        assert_eq!(removed, 1);
        assert_eq!(cache.len(), 1);
        let fresh = cache.fresh_positions(t0 + Duration::from_secs(301), 0);
        assert_eq!(fresh[0].device_id, 2);
    }

    #[test]
    fn test_rediscovery_replaces_entry() {
        let t0 = Instant::now();
        let mut cache = PeerCache::new(Duration::from_secs(300));

        let mut first = announce(5);
        first.latitude = 59.0;
        cache.insert(first, t0);

        let mut second = announce(5);
        second.latitude = 60.0;
        cache.insert(second, t0 + Duration::from_secs(10));

        assert_eq!(cache.len(), 1);
        let fresh = cache.fresh_positions(t0 + Duration::from_secs(10), 0);
        assert_eq!(fresh[0].latitude, 60.0);
    }

    #[test]
    fn test_relaying_device_excluded() {
        let t0 = Instant::now();
        let mut cache = PeerCache::new(Duration::from_secs(300));
        cache.insert(announce(7), t0);
        cache.insert(announce(8), t0);

        let fresh = cache.fresh_positions(t0, 7);
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].device_id, 8);
    }
}
