//! Simulated location source
//!
//! Drives the full pipeline without GPS hardware: a random-walk position
//! advanced at 1 Hz, with accuracy warming up after updates start. The walk
//! continues while updates are stopped (the device keeps moving even when we
//! are not listening), which is what makes geofence-exit wakes observable.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration};
use tracing::{debug, info};

use crate::geofence::{haversine_m, GeofenceRegion};
use crate::sensors::{LocationCommands, LocationFix, SensorEvent};

/// Accuracy of the first fix after updates start
const COLD_ACCURACY_M: f64 = 80.0;

/// Accuracy the simulated receiver converges to
const WARM_ACCURACY_M: f64 = 8.0;

/// Walking speed in m/s
const WALK_SPEED_MPS: f64 = 1.4;

#[derive(Debug, Clone, Copy, PartialEq)]
enum UpdateMode {
    Off,
    HighAccuracy,
    DistanceFiltered(f64),
}

#[derive(Debug)]
struct SimState {
    mode: UpdateMode,
    latitude: f64,
    longitude: f64,
    heading_deg: f64,
    accuracy_m: f64,
    geofence: Option<GeofenceRegion>,
    /// Position of the last emitted fix, for the distance filter
    last_emitted: Option<(f64, f64)>,
}

/// Simulated GPS receiver and geofence monitor
pub struct SimulatedLocationSource {
    state: Arc<RwLock<SimState>>,
    event_tx: mpsc::Sender<SensorEvent>,
}

impl SimulatedLocationSource {
    /// Create a source starting at the given coordinates
    pub fn new(event_tx: mpsc::Sender<SensorEvent>, latitude: f64, longitude: f64) -> Arc<Self> {
        Arc::new(Self {
            state: Arc::new(RwLock::new(SimState {
                mode: UpdateMode::Off,
                latitude,
                longitude,
                heading_deg: 0.0,
                accuracy_m: COLD_ACCURACY_M,
                geofence: None,
                last_emitted: None,
            })),
            event_tx,
        })
    }

    /// Start the 1 Hz simulation task
    pub fn spawn(self: &Arc<Self>) -> JoinHandle<()> {
        let state = self.state.clone();
        let event_tx = self.event_tx.clone();

        tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(1));
            loop {
                ticker.tick().await;
                if let Some(event) = step(&state).await {
                    if event_tx.send(event).await.is_err() {
                        debug!("[SIM] Event channel closed, stopping simulation");
                        break;
                    }
                }
            }
        })
    }
}

/// Advance the walk one second and return the event to deliver, if any
async fn step(state: &Arc<RwLock<SimState>>) -> Option<SensorEvent> {
    let mut s = state.write().await;

    // Wander: small heading changes, constant walking speed
    let mut rng = rand::thread_rng();
    s.heading_deg += rng.gen_range(-20.0..20.0);
    let heading = s.heading_deg.to_radians();
    let d_north = WALK_SPEED_MPS * heading.cos();
    let d_east = WALK_SPEED_MPS * heading.sin();
    s.latitude += d_north / 111_320.0;
    s.longitude += d_east / (111_320.0 * s.latitude.to_radians().cos().max(0.01));

    // Geofence is monitored regardless of update mode
    if let Some(region) = &s.geofence {
        let dist = haversine_m(s.latitude, s.longitude, region.latitude, region.longitude);
        if dist > region.radius_m {
            info!("[SIM] Left monitoring region ({dist:.0} m from center)");
            s.geofence = None;
            return Some(SensorEvent::GeofenceExit);
        }
    }

    match s.mode {
        UpdateMode::Off => None,
        UpdateMode::HighAccuracy => {
            // Receiver warms up toward its floor
            s.accuracy_m = (s.accuracy_m * 0.7).max(WARM_ACCURACY_M) + rng.gen_range(0.0..2.0);
            s.last_emitted = Some((s.latitude, s.longitude));
            Some(SensorEvent::Fix(make_fix(&s, &mut rng)))
        }
        UpdateMode::DistanceFiltered(min_distance) => {
            s.accuracy_m = (s.accuracy_m * 0.7).max(WARM_ACCURACY_M) + rng.gen_range(0.0..2.0);
            let moved = match s.last_emitted {
                Some((lat, lon)) => haversine_m(s.latitude, s.longitude, lat, lon),
                None => f64::INFINITY,
            };
            if moved >= min_distance {
                s.last_emitted = Some((s.latitude, s.longitude));
                Some(SensorEvent::Fix(make_fix(&s, &mut rng)))
            } else {
                None
            }
        }
    }
}

fn make_fix(s: &SimState, rng: &mut impl Rng) -> LocationFix {
    LocationFix {
        latitude: s.latitude,
        longitude: s.longitude,
        altitude: Some(420.0 + rng.gen_range(-2.0..2.0)),
        horizontal_accuracy: Some(s.accuracy_m),
        vertical_accuracy: Some(s.accuracy_m * 1.5),
        speed: Some(WALK_SPEED_MPS),
        course: Some(s.heading_deg.rem_euclid(360.0)),
        timestamp: Utc::now(),
    }
}

#[async_trait]
impl LocationCommands for SimulatedLocationSource {
    async fn start_high_accuracy(&self) -> Result<()> {
        let mut s = self.state.write().await;
        s.mode = UpdateMode::HighAccuracy;
        s.accuracy_m = COLD_ACCURACY_M;
        debug!("[SIM] High-accuracy updates started");
        Ok(())
    }

    async fn start_distance_filtered(&self, min_distance_m: f64) -> Result<()> {
        let mut s = self.state.write().await;
        s.mode = UpdateMode::DistanceFiltered(min_distance_m);
        debug!("[SIM] Distance-filtered updates started ({min_distance_m} m)");
        Ok(())
    }

    async fn stop_updates(&self) -> Result<()> {
        self.state.write().await.mode = UpdateMode::Off;
        debug!("[SIM] Updates stopped");
        Ok(())
    }

    async fn install_geofence(&self, region: &GeofenceRegion) -> Result<()> {
        debug!(
            "[SIM] Geofence installed at ({:.5}, {:.5}) r={:.0} m",
            region.latitude, region.longitude, region.radius_m
        );
        self.state.write().await.geofence = Some(region.clone());
        Ok(())
    }

    async fn remove_geofence(&self) -> Result<()> {
        self.state.write().await.geofence = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_no_fixes_while_off() {
        let (tx, _rx) = mpsc::channel(16);
        let source = SimulatedLocationSource::new(tx, 59.91, 10.75);
        assert!(step(&source.state).await.is_none());
    }

    #[tokio::test]
    async fn test_fix_emitted_when_high_accuracy() {
        let (tx, _rx) = mpsc::channel(16);
        let source = SimulatedLocationSource::new(tx, 59.91, 10.75);
        source.start_high_accuracy().await.unwrap();
        match step(&source.state).await {
            Some(SensorEvent::Fix(fix)) => assert!(fix.is_valid()),
            other => panic!("expected fix, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_accuracy_warms_up() {
        let (tx, _rx) = mpsc::channel(16);
        let source = SimulatedLocationSource::new(tx, 59.91, 10.75);
        source.start_high_accuracy().await.unwrap();
        for _ in 0..10 {
            step(&source.state).await;
        }
        let acc = source.state.read().await.accuracy_m;
        assert!(acc < 15.0, "accuracy did not converge: {acc}");
    }

    #[tokio::test]
    async fn test_geofence_exit_fires_once() {
        let (tx, _rx) = mpsc::channel(16);
        let source = SimulatedLocationSource::new(tx, 59.91, 10.75);
        // Tiny fence the first step always leaves
        source
            .install_geofence(&GeofenceRegion::new(59.91, 10.75, 0.5))
            .await
            .unwrap();
        let mut exits = 0;
        for _ in 0..5 {
            if let Some(SensorEvent::GeofenceExit) = step(&source.state).await {
                exits += 1;
            }
        }
        assert_eq!(exits, 1);
    }
}
