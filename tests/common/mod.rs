//! Shared test doubles for the integration tests
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;

use waymesh_shared::{BatchResponse, LocationBatch, PositionReport, RelayBatch};
use waymesh_tracker::geofence::GeofenceRegion;
use waymesh_tracker::sensors::{LocationCommands, LocationFix};
use waymesh_tracker::upload::{ApiError, LocationApi};

/// API double: records uploads, fails while `fail` is set
pub struct ScriptedApi {
    pub fail: AtomicBool,
    pub attempts: AtomicUsize,
    pub uploads: Mutex<Vec<LocationBatch>>,
    pub relays: Mutex<Vec<RelayBatch>>,
    pub positions: Mutex<Vec<PositionReport>>,
}

impl ScriptedApi {
    pub fn new(fail: bool) -> Arc<Self> {
        Arc::new(Self {
            fail: AtomicBool::new(fail),
            attempts: AtomicUsize::new(0),
            uploads: Mutex::new(Vec::new()),
            relays: Mutex::new(Vec::new()),
            positions: Mutex::new(Vec::new()),
        })
    }

    pub fn upload_count(&self) -> usize {
        self.uploads.lock().unwrap().len()
    }
}

#[async_trait]
impl LocationApi for ScriptedApi {
    async fn upload_locations(&self, batch: &LocationBatch) -> Result<BatchResponse, ApiError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(ApiError::Status(reqwest::StatusCode::SERVICE_UNAVAILABLE));
        }
        self.uploads.lock().unwrap().push(batch.clone());
        Ok(BatchResponse {
            received: batch.locations.len(),
            batch_id: "it-batch".into(),
            visits_detected: 0,
        })
    }

    async fn post_position(&self, report: &PositionReport) -> Result<(), ApiError> {
        self.positions.lock().unwrap().push(report.clone());
        Ok(())
    }

    async fn post_relay(&self, batch: &RelayBatch) -> Result<(), ApiError> {
        self.relays.lock().unwrap().push(batch.clone());
        Ok(())
    }
}

/// Location command double recording every call
#[derive(Default)]
pub struct RecordingCommands {
    pub calls: Mutex<Vec<String>>,
    pub geofence: Mutex<Option<GeofenceRegion>>,
}

impl RecordingCommands {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn saw(&self, call: &str) -> bool {
        self.calls.lock().unwrap().iter().any(|c| c == call)
    }
}

#[async_trait]
impl LocationCommands for RecordingCommands {
    async fn start_high_accuracy(&self) -> Result<()> {
        self.calls.lock().unwrap().push("start_high_accuracy".into());
        Ok(())
    }

    async fn start_distance_filtered(&self, _min_distance_m: f64) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push("start_distance_filtered".into());
        Ok(())
    }

    async fn stop_updates(&self) -> Result<()> {
        self.calls.lock().unwrap().push("stop_updates".into());
        Ok(())
    }

    async fn install_geofence(&self, region: &GeofenceRegion) -> Result<()> {
        self.calls.lock().unwrap().push("install_geofence".into());
        *self.geofence.lock().unwrap() = Some(region.clone());
        Ok(())
    }

    async fn remove_geofence(&self) -> Result<()> {
        self.calls.lock().unwrap().push("remove_geofence".into());
        *self.geofence.lock().unwrap() = None;
        Ok(())
    }
}

/// A valid fix at the given coordinates
pub fn fix_at(latitude: f64, longitude: f64, accuracy: f64) -> LocationFix {
    LocationFix {
        latitude,
        longitude,
        altitude: Some(10.0),
        horizontal_accuracy: Some(accuracy),
        vertical_accuracy: None,
        speed: Some(0.0),
        course: None,
        timestamp: Utc::now(),
    }
}

/// Poll `cond` until it holds or the test times out
pub async fn eventually(cond: impl Fn() -> bool, what: &str) {
    for _ in 0..250 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("timed out waiting for {what}");
}
