//! End-to-end tracking behavior: acquisition scenarios against the machine,
//! and the supervisor driving real command/buffer collaborators.

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, watch};

use common::{eventually, fix_at, RecordingCommands, ScriptedApi};
use waymesh_tracker::buffer::PointBuffer;
use waymesh_tracker::config::TrackerConfig;
use waymesh_tracker::sensors::SensorEvent;
use waymesh_tracker::tracker::{TrackerCommand, TrackerMachine, TrackingMode, TrackingSupervisor};
use waymesh_tracker::upload::UploadCoordinator;

fn installed_region(cmds: &[TrackerCommand]) -> Option<&waymesh_tracker::geofence::GeofenceRegion> {
    cmds.iter().find_map(|c| match c {
        TrackerCommand::InstallGeofence(region) => Some(region),
        _ => None,
    })
}

/// Cold start with noisy-then-decent fixes: two 80 m readings, then 40 m
/// readings. The machine settles 15 s after the first acceptable fix using
/// the best accuracy observed, and fences with radius max(20, 40 * 1.5, 0).
#[test]
fn settling_scenario_cold_start() {
    let t0 = Instant::now();
    let mut machine = TrackerMachine::new(TrackerConfig::default().tracking);
    machine.start(t0);

    let readings = [(0, 80.0), (4, 80.0), (8, 40.0), (12, 40.0), (16, 40.0)];
    for (secs, accuracy) in readings {
        let cmds = machine.handle_event(
            SensorEvent::Fix(fix_at(59.91, 10.75, accuracy)),
            t0 + Duration::from_secs(secs),
        );
        assert!(
            installed_region(&cmds).is_none(),
            "transitioned early at t+{secs}s"
        );
    }
    assert_eq!(machine.mode(), TrackingMode::AcquiringFix);

    // First acceptable fix was at t+8; settling ends at t+23
    assert!(machine.poll(t0 + Duration::from_secs(22)).is_empty());
    let cmds = machine.poll(t0 + Duration::from_secs(23));

    assert_eq!(machine.mode(), TrackingMode::Idle);
    let region = installed_region(&cmds).expect("no geofence installed");
    assert_eq!(region.radius_m, 60.0);
    assert_eq!(region.latitude, 59.91);
}

/// Idle / wake sawtooth: settle, leave the fence, settle again
#[test]
fn geofence_wake_cycle() {
    let t0 = Instant::now();
    let mut machine = TrackerMachine::new(TrackerConfig::default().tracking);
    machine.start(t0);

    let cmds = machine.handle_event(
        SensorEvent::Fix(fix_at(59.91, 10.75, 10.0)),
        t0 + Duration::from_secs(1),
    );
    let first = installed_region(&cmds).unwrap().clone();
    assert_eq!(machine.mode(), TrackingMode::Idle);

    machine.handle_event(SensorEvent::GeofenceExit, t0 + Duration::from_secs(300));
    assert_eq!(machine.mode(), TrackingMode::AcquiringFix);

    let cmds = machine.handle_event(
        SensorEvent::Fix(fix_at(59.92, 10.76, 10.0)),
        t0 + Duration::from_secs(301),
    );
    let second = installed_region(&cmds).unwrap();
    assert_eq!(machine.mode(), TrackingMode::Idle);
    assert_ne!(first.latitude, second.latitude);
}

struct Rig {
    config: TrackerConfig,
    api: Arc<ScriptedApi>,
    commands: Arc<RecordingCommands>,
    buffer: Arc<PointBuffer>,
    coordinator: Arc<UploadCoordinator>,
    event_tx: mpsc::Sender<SensorEvent>,
    _dir: tempfile::TempDir,
}

impl Rig {
    fn new(device_id: u64, batch_size: usize, api_fails: bool) -> (Self, mpsc::Receiver<SensorEvent>) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = TrackerConfig {
            device_id,
            ..Default::default()
        };
        config.upload.batch_size = batch_size;
        config.buffer_path = dir.path().join("pending.json");

        let api = ScriptedApi::new(api_fails);
        let buffer = Arc::new(PointBuffer::new(config.buffer_path.clone()));
        let (coordinator, _relay_rx, _status) =
            UploadCoordinator::new(buffer.clone(), api.clone(), device_id);
        let (event_tx, event_rx) = mpsc::channel(64);

        (
            Self {
                config,
                api,
                commands: RecordingCommands::new(),
                buffer,
                coordinator,
                event_tx,
                _dir: dir,
            },
            event_rx,
        )
    }

    fn start(&self, event_rx: mpsc::Receiver<SensorEvent>) -> anyhow::Result<TrackingSupervisor> {
        let (flush_tx, flush_rx) = mpsc::channel(8);
        // Long period: only explicit triggers flush during tests
        self.coordinator
            .spawn(flush_rx, Duration::from_secs(3600));
        let (position_tx, _position_rx) = watch::channel(None);

        TrackingSupervisor::start(
            &self.config,
            self.commands.clone(),
            self.buffer.clone(),
            self.coordinator.clone(),
            flush_tx,
            position_tx,
            event_rx,
        )
    }
}

#[tokio::test]
async fn start_requires_device_identifier() {
    let (rig, event_rx) = Rig::new(0, 10, false);
    let err = rig.start(event_rx).unwrap_err();
    assert!(err.to_string().contains("device identifier"));
}

#[tokio::test]
async fn supervisor_issues_platform_commands() {
    let (rig, event_rx) = Rig::new(7, 100, false);
    let supervisor = rig.start(event_rx).unwrap();

    eventually(
        || rig.commands.saw("start_high_accuracy"),
        "high-accuracy start command",
    )
    .await;

    // An excellent fix settles straight into idle
    rig.event_tx
        .send(SensorEvent::Fix(fix_at(59.91, 10.75, 10.0)))
        .await
        .unwrap();

    eventually(|| rig.commands.saw("stop_updates"), "updates stopped").await;
    eventually(|| rig.commands.saw("install_geofence"), "geofence installed").await;
    let region = rig.commands.geofence.lock().unwrap().clone().unwrap();
    assert_eq!(region.radius_m, 20.0);

    supervisor.stop().await.unwrap();
}

#[tokio::test]
async fn invalid_fixes_never_reach_the_buffer() {
    let (rig, event_rx) = Rig::new(7, 100, false);
    let supervisor = rig.start(event_rx).unwrap();

    rig.event_tx
        .send(SensorEvent::Fix(fix_at(59.91, 10.75, -5.0)))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(rig.buffer.is_empty());

    supervisor.stop().await.unwrap();
    // Nothing was ever recorded, so nothing was uploaded
    assert_eq!(rig.api.upload_count(), 0);
}

#[tokio::test]
async fn snapshots_reflect_mode_changes() {
    let (rig, event_rx) = Rig::new(7, 100, false);
    let supervisor = rig.start(event_rx).unwrap();
    let snapshots = supervisor.snapshots();

    rig.event_tx
        .send(SensorEvent::Fix(fix_at(59.91, 10.75, 10.0)))
        .await
        .unwrap();

    eventually(
        || snapshots.borrow().mode == TrackingMode::Idle,
        "idle snapshot",
    )
    .await;
    assert!(snapshots.borrow().geofence.is_some());
    assert!(snapshots.borrow().last_fix.is_some());

    supervisor.stop().await.unwrap();
}
