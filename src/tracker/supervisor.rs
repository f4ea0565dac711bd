//! Tracking supervisor
//!
//! Runs the single-writer loop that owns the state machine. Sensor producers
//! push onto one event channel; a 1 s tick re-evaluates deadlines so windows
//! expire even when no events arrive (and immediately after a suspend,
//! since checks compare wall-clock instants). Observers read snapshots over
//! a watch channel instead of sharing mutable state.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{ensure, Context, Result};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration};
use tracing::{info, warn};

use crate::buffer::PointBuffer;
use crate::config::TrackerConfig;
use crate::geofence::GeofenceRegion;
use crate::sensors::{LocationCommands, LocationFix, SensorEvent};
use crate::tracker::machine::{TrackerCommand, TrackerMachine, TrackingMode};
use crate::upload::{FlushReason, UploadCoordinator};

/// Read-only view of the tracking state for UI and logging observers
#[derive(Debug, Clone)]
pub struct TrackingSnapshot {
    pub running: bool,
    pub mode: TrackingMode,
    pub charging: bool,
    pub last_fix: Option<LocationFix>,
    pub geofence: Option<GeofenceRegion>,
    pub buffered: usize,
}

impl Default for TrackingSnapshot {
    fn default() -> Self {
        Self {
            running: false,
            mode: TrackingMode::Idle,
            charging: false,
            last_fix: None,
            geofence: None,
            buffered: 0,
        }
    }
}

enum Control {
    Stop(oneshot::Sender<()>),
}

/// Owns the tracking loop for one device
pub struct TrackingSupervisor {
    control_tx: mpsc::Sender<Control>,
    snapshot_rx: watch::Receiver<TrackingSnapshot>,
    coordinator: Arc<UploadCoordinator>,
    task: JoinHandle<()>,
}

impl std::fmt::Debug for TrackingSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackingSupervisor").finish_non_exhaustive()
    }
}

impl TrackingSupervisor {
    /// Start tracking. Fails without a registered device identifier.
    pub fn start(
        config: &TrackerConfig,
        commands: Arc<dyn LocationCommands>,
        buffer: Arc<PointBuffer>,
        coordinator: Arc<UploadCoordinator>,
        flush_tx: mpsc::Sender<FlushReason>,
        position_tx: watch::Sender<Option<LocationFix>>,
        event_rx: mpsc::Receiver<SensorEvent>,
    ) -> Result<Self> {
        ensure!(
            config.device_id != 0,
            "tracking requires a registered device identifier"
        );

        let (control_tx, control_rx) = mpsc::channel(4);
        let (snapshot_tx, snapshot_rx) = watch::channel(TrackingSnapshot::default());

        let ctx = LoopCtx {
            machine: TrackerMachine::new(config.tracking.clone()),
            batch_size: config.upload.batch_size,
            commands,
            buffer,
            flush_tx,
            position_tx,
            snapshot_tx,
            event_rx,
            control_rx,
        };

        info!("Starting tracking for device {}", config.device_id);
        let task = tokio::spawn(run_loop(ctx));

        Ok(Self {
            control_tx,
            snapshot_rx,
            coordinator,
            task,
        })
    }

    /// Subscribe to state snapshots
    pub fn snapshots(&self) -> watch::Receiver<TrackingSnapshot> {
        self.snapshot_rx.clone()
    }

    /// Stop tracking: retract location and geofence commands, halt the
    /// loop, then flush buffered samples once before returning.
    pub async fn stop(self) -> Result<()> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.control_tx
            .send(Control::Stop(ack_tx))
            .await
            .context("tracking loop already gone")?;
        ack_rx.await.context("tracking loop dropped stop ack")?;
        self.task.await.context("tracking loop panicked")?;

        // One shutdown flush; a failure leaves the batch requeued and
        // persisted for the next run, not lost.
        if let Err(e) = self.coordinator.flush(FlushReason::Shutdown).await {
            warn!("Shutdown flush failed, samples remain spooled: {e}");
        }
        Ok(())
    }
}

struct LoopCtx {
    machine: TrackerMachine,
    batch_size: usize,
    commands: Arc<dyn LocationCommands>,
    buffer: Arc<PointBuffer>,
    flush_tx: mpsc::Sender<FlushReason>,
    position_tx: watch::Sender<Option<LocationFix>>,
    snapshot_tx: watch::Sender<TrackingSnapshot>,
    event_rx: mpsc::Receiver<SensorEvent>,
    control_rx: mpsc::Receiver<Control>,
}

async fn run_loop(mut ctx: LoopCtx) {
    let start_cmds = ctx.machine.start(Instant::now());
    apply(&mut ctx, start_cmds).await;
    publish(&ctx);

    let mut ticker = interval(Duration::from_secs(1));

    loop {
        tokio::select! {
            maybe_event = ctx.event_rx.recv() => match maybe_event {
                Some(SensorEvent::Fix(fix)) if !fix.is_valid() => {
                    warn!(
                        "Dropping invalid fix (accuracy {:?})",
                        fix.horizontal_accuracy
                    );
                }
                Some(event) => {
                    if let SensorEvent::Fix(fix) = &event {
                        let _ = ctx.position_tx.send(Some(fix.clone()));
                    }
                    let cmds = ctx.machine.handle_event(event, Instant::now());
                    apply(&mut ctx, cmds).await;
                }
                None => {
                    warn!("Sensor event channel closed, stopping tracking loop");
                    break;
                }
            },
            _ = ticker.tick() => {
                let cmds = ctx.machine.poll(Instant::now());
                apply(&mut ctx, cmds).await;
            }
            maybe_ctl = ctx.control_rx.recv() => match maybe_ctl {
                Some(Control::Stop(ack)) => {
                    let cmds = ctx.machine.stop();
                    apply(&mut ctx, cmds).await;
                    publish(&ctx);
                    let _ = ack.send(());
                    break;
                }
                None => break,
            },
        }

        publish(&ctx);
    }

    info!("Tracking loop stopped");
}

/// Carry out machine commands. Platform command failures degrade tracking
/// but never stop the loop.
async fn apply(ctx: &mut LoopCtx, cmds: Vec<TrackerCommand>) {
    for cmd in cmds {
        match cmd {
            TrackerCommand::StartHighAccuracyUpdates => {
                if let Err(e) = ctx.commands.start_high_accuracy().await {
                    warn!("Failed to start high-accuracy updates: {e}");
                }
            }
            TrackerCommand::StartDistanceFilteredUpdates { min_distance_m } => {
                if let Err(e) = ctx.commands.start_distance_filtered(min_distance_m).await {
                    warn!("Failed to start distance-filtered updates: {e}");
                }
            }
            TrackerCommand::StopLocationUpdates => {
                if let Err(e) = ctx.commands.stop_updates().await {
                    warn!("Failed to stop updates: {e}");
                }
            }
            TrackerCommand::InstallGeofence(region) => {
                info!(
                    "Installing monitoring region at ({:.5}, {:.5}) r={:.0} m",
                    region.latitude, region.longitude, region.radius_m
                );
                if let Err(e) = ctx.commands.install_geofence(&region).await {
                    warn!("Failed to install geofence: {e}");
                }
            }
            TrackerCommand::RemoveGeofence => {
                if let Err(e) = ctx.commands.remove_geofence().await {
                    warn!("Failed to remove geofence: {e}");
                }
            }
            TrackerCommand::Buffer(point) => {
                ctx.buffer.add(point);
                if ctx.buffer.len() >= ctx.batch_size {
                    // A full channel means a flush request is already pending
                    let _ = ctx.flush_tx.try_send(FlushReason::BatchSize);
                }
            }
            TrackerCommand::CheckpointBuffer => {
                if let Err(e) = ctx.buffer.persist().await {
                    warn!("Buffer checkpoint failed, contents remain in memory: {e}");
                }
            }
            TrackerCommand::RequestFlush => {
                let _ = ctx.flush_tx.try_send(FlushReason::Suspend);
            }
            TrackerCommand::ModeChanged { from, to, reason } => {
                info!("Mode changed: {from} -> {to} ({reason})");
            }
        }
    }
}

fn publish(ctx: &LoopCtx) {
    let snapshot = TrackingSnapshot {
        running: ctx.machine.is_running(),
        mode: ctx.machine.mode(),
        charging: ctx.machine.is_charging(),
        last_fix: ctx.machine.last_fix().cloned(),
        geofence: ctx.machine.geofence().cloned(),
        buffered: ctx.buffer.len(),
    };
    let _ = ctx.snapshot_tx.send(snapshot);
}
