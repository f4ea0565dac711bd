//! Tracking State Machine
//!
//! Pure decision logic for adaptive tracking: consumes sensor events with an
//! explicit `now` and returns the commands the supervisor must carry out.
//! All deadline checks compare wall-clock instants, so a timer that never
//! fired while the process was suspended is treated as already elapsed on
//! the next event or tick.

use std::fmt;
use std::time::Instant;

use chrono::Utc;
use waymesh_shared::LocationPoint;

use crate::config::{TrackingConfig, WakePolicy};
use crate::geofence::{haversine_m, monitoring_radius, GeofenceRegion};
use crate::sensors::{LocationFix, MotionState, SensorEvent};

/// Active tracking mode. Exactly one at a time; owned by the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingMode {
    /// Waiting for a usable fix before choosing a power state
    AcquiringFix,
    /// Low-power: updates stopped, waiting on the wake source
    Idle,
    /// Charging: continuous distance-filtered updates
    Continuous,
}

impl fmt::Display for TrackingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackingMode::AcquiringFix => write!(f, "acquiring"),
            TrackingMode::Idle => write!(f, "idle"),
            TrackingMode::Continuous => write!(f, "continuous"),
        }
    }
}

/// Why a mode transition happened; recorded in the marker sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionReason {
    TrackingStarted,
    ExcellentFix,
    Settled,
    FixTimeout,
    GeofenceExit,
    ChargerConnected,
    ChargerDisconnected,
    MotionResumed,
    TrackingStopped,
}

impl fmt::Display for TransitionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransitionReason::TrackingStarted => "tracking started",
            TransitionReason::ExcellentFix => "excellent fix",
            TransitionReason::Settled => "settling complete",
            TransitionReason::FixTimeout => "fix wait timeout",
            TransitionReason::GeofenceExit => "geofence exit",
            TransitionReason::ChargerConnected => "charger connected",
            TransitionReason::ChargerDisconnected => "charger disconnected",
            TransitionReason::MotionResumed => "motion resumed",
            TransitionReason::TrackingStopped => "tracking stopped",
        };
        write!(f, "{s}")
    }
}

/// Commands the supervisor carries out on behalf of the machine
#[derive(Debug, Clone, PartialEq)]
pub enum TrackerCommand {
    /// Start continuous high-accuracy location updates
    StartHighAccuracyUpdates,
    /// Start location updates with a minimum-distance filter
    StartDistanceFilteredUpdates { min_distance_m: f64 },
    /// Stop all location updates
    StopLocationUpdates,
    /// Install the monitoring region
    InstallGeofence(GeofenceRegion),
    /// Remove the monitoring region
    RemoveGeofence,
    /// Append a sample to the point buffer
    Buffer(LocationPoint),
    /// Persist the buffer to disk
    CheckpointBuffer,
    /// Ask the upload coordinator to flush now
    RequestFlush,
    /// The active mode changed
    ModeChanged {
        from: TrackingMode,
        to: TrackingMode,
        reason: TransitionReason,
    },
}

/// Settling window bookkeeping
#[derive(Debug, Clone, Copy)]
struct Settling {
    /// When the first acceptable fix arrived
    first_acceptable_at: Instant,
    /// Lowest accuracy seen since then
    best_accuracy_m: f64,
}

/// Per-acquisition bookkeeping
#[derive(Debug, Clone, Copy)]
struct Acquiring {
    entered_at: Instant,
    settling: Option<Settling>,
}

impl Acquiring {
    fn new(now: Instant) -> Self {
        Self {
            entered_at: now,
            settling: None,
        }
    }
}

/// Gate state for sample admission
#[derive(Debug, Clone, Copy)]
struct BufferedMark {
    at: Instant,
    latitude: f64,
    longitude: f64,
}

enum AcquisitionOutcome {
    Pending,
    Finish { accuracy_m: f64, reason: TransitionReason },
}

/// The adaptive tracking state machine
#[derive(Debug)]
pub struct TrackerMachine {
    cfg: TrackingConfig,
    mode: TrackingMode,
    running: bool,
    charging: bool,
    acquiring: Option<Acquiring>,
    last_fix: Option<LocationFix>,
    last_speed_mps: f64,
    last_buffered: Option<BufferedMark>,
    geofence: Option<GeofenceRegion>,
}

impl TrackerMachine {
    /// Create a machine in the inactive idle state
    pub fn new(cfg: TrackingConfig) -> Self {
        Self {
            cfg,
            mode: TrackingMode::Idle,
            running: false,
            charging: false,
            acquiring: None,
            last_fix: None,
            last_speed_mps: 0.0,
            last_buffered: None,
            geofence: None,
        }
    }

    /// Current mode
    pub fn mode(&self) -> TrackingMode {
        self.mode
    }

    /// Whether tracking is active
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Whether external power is connected, as far as the machine knows
    pub fn is_charging(&self) -> bool {
        self.charging
    }

    /// Most recent fix seen, in any mode
    pub fn last_fix(&self) -> Option<&LocationFix> {
        self.last_fix.as_ref()
    }

    /// Currently installed monitoring region
    pub fn geofence(&self) -> Option<&GeofenceRegion> {
        self.geofence.as_ref()
    }

    /// Begin tracking. Idempotent against a duplicate start.
    pub fn start(&mut self, now: Instant) -> Vec<TrackerCommand> {
        if self.running {
            return Vec::new();
        }
        self.running = true;

        let from = self.mode;
        self.mode = TrackingMode::AcquiringFix;
        self.acquiring = Some(Acquiring::new(now));
        self.geofence = None;

        let mut cmds = Vec::new();
        if let Some(marker) = self.marker(from, TrackingMode::AcquiringFix, TransitionReason::TrackingStarted) {
            cmds.push(marker);
        }
        // A region from a previous run may still be registered with the OS
        cmds.push(TrackerCommand::RemoveGeofence);
        cmds.push(TrackerCommand::StartHighAccuracyUpdates);
        cmds.push(TrackerCommand::ModeChanged {
            from,
            to: TrackingMode::AcquiringFix,
            reason: TransitionReason::TrackingStarted,
        });
        cmds
    }

    /// End tracking: retract commands and record a final marker.
    ///
    /// The supervisor performs the final flush after the machine has stopped.
    pub fn stop(&mut self) -> Vec<TrackerCommand> {
        if !self.running {
            return Vec::new();
        }
        self.running = false;

        let from = self.mode;
        self.mode = TrackingMode::Idle;
        self.acquiring = None;

        let mut cmds = Vec::new();
        if let Some(marker) = self.marker(from, TrackingMode::Idle, TransitionReason::TrackingStopped) {
            cmds.push(marker);
        }
        cmds.push(TrackerCommand::StopLocationUpdates);
        if self.geofence.take().is_some() {
            cmds.push(TrackerCommand::RemoveGeofence);
        }
        cmds.push(TrackerCommand::ModeChanged {
            from,
            to: TrackingMode::Idle,
            reason: TransitionReason::TrackingStopped,
        });
        cmds
    }

    /// Process a sensor event. Events that match no transition in the
    /// current state are no-ops.
    pub fn handle_event(&mut self, event: SensorEvent, now: Instant) -> Vec<TrackerCommand> {
        if !self.running {
            return Vec::new();
        }

        match event {
            SensorEvent::Fix(fix) => self.handle_fix(fix, now),
            SensorEvent::GeofenceExit => {
                if self.mode == TrackingMode::Idle && self.cfg.wake_policy == WakePolicy::Geofence {
                    self.reacquire(TransitionReason::GeofenceExit, now)
                } else {
                    Vec::new()
                }
            }
            SensorEvent::MotionChanged(MotionState::Moving) => {
                if self.mode == TrackingMode::Idle && self.cfg.wake_policy == WakePolicy::Motion {
                    self.reacquire(TransitionReason::MotionResumed, now)
                } else {
                    Vec::new()
                }
            }
            SensorEvent::MotionChanged(MotionState::Stationary) => Vec::new(),
            SensorEvent::ChargerConnected => {
                self.charging = true;
                if self.mode == TrackingMode::Idle {
                    // Power is free now, no re-fix needed
                    self.enter_continuous(TransitionReason::ChargerConnected)
                } else {
                    // While acquiring this only biases the eventual destination
                    Vec::new()
                }
            }
            SensorEvent::ChargerDisconnected => {
                self.charging = false;
                if self.mode == TrackingMode::Continuous {
                    self.reacquire(TransitionReason::ChargerDisconnected, now)
                } else {
                    Vec::new()
                }
            }
            SensorEvent::AppSuspending => {
                vec![TrackerCommand::RequestFlush, TrackerCommand::CheckpointBuffer]
            }
        }
    }

    /// Re-evaluate deadlines. Called on a periodic tick so settling and
    /// fix-wait windows expire even when no further events arrive.
    pub fn poll(&mut self, now: Instant) -> Vec<TrackerCommand> {
        if !self.running || self.mode != TrackingMode::AcquiringFix {
            return Vec::new();
        }
        match self.check_deadlines(now) {
            AcquisitionOutcome::Pending => Vec::new(),
            AcquisitionOutcome::Finish { accuracy_m, reason } => {
                self.finish_acquisition(accuracy_m, reason, now)
            }
        }
    }

    fn handle_fix(&mut self, fix: LocationFix, now: Instant) -> Vec<TrackerCommand> {
        if !fix.is_valid() {
            return Vec::new();
        }

        if let Some(speed) = fix.speed_mps() {
            self.last_speed_mps = speed;
        }
        let accuracy = fix.horizontal_accuracy;
        self.last_fix = Some(fix.clone());

        let mut cmds = Vec::new();

        // Sample admission applies wherever updates are flowing
        if matches!(self.mode, TrackingMode::AcquiringFix | TrackingMode::Continuous)
            && self.admit(&fix, now)
        {
            self.last_buffered = Some(BufferedMark {
                at: now,
                latitude: fix.latitude,
                longitude: fix.longitude,
            });
            cmds.push(TrackerCommand::Buffer(fix.to_point()));
        }

        if self.mode == TrackingMode::AcquiringFix {
            if let Some(accuracy_m) = accuracy {
                if accuracy_m <= self.cfg.excellent_accuracy_m {
                    // Good enough to skip settling entirely
                    cmds.extend(self.finish_acquisition(
                        accuracy_m,
                        TransitionReason::ExcellentFix,
                        now,
                    ));
                    return cmds;
                }
                if accuracy_m <= self.cfg.good_accuracy_m {
                    if let Some(acq) = self.acquiring.as_mut() {
                        match acq.settling.as_mut() {
                            None => {
                                acq.settling = Some(Settling {
                                    first_acceptable_at: now,
                                    best_accuracy_m: accuracy_m,
                                });
                            }
                            Some(settling) => {
                                settling.best_accuracy_m = settling.best_accuracy_m.min(accuracy_m);
                            }
                        }
                    }
                }
            }

            match self.check_deadlines(now) {
                AcquisitionOutcome::Pending => {}
                AcquisitionOutcome::Finish { accuracy_m, reason } => {
                    cmds.extend(self.finish_acquisition(accuracy_m, reason, now));
                }
            }
        }

        cmds
    }

    /// Whether a fix passes the time/distance admission gates
    fn admit(&self, fix: &LocationFix, now: Instant) -> bool {
        match &self.last_buffered {
            None => true,
            Some(mark) => {
                now.duration_since(mark.at) >= self.cfg.min_buffer_interval
                    || haversine_m(fix.latitude, fix.longitude, mark.latitude, mark.longitude)
                        > self.cfg.min_buffer_distance_m
            }
        }
    }

    fn check_deadlines(&self, now: Instant) -> AcquisitionOutcome {
        let Some(acq) = &self.acquiring else {
            return AcquisitionOutcome::Pending;
        };

        if let Some(settling) = &acq.settling {
            if now.duration_since(settling.first_acceptable_at) >= self.cfg.settling_duration {
                return AcquisitionOutcome::Finish {
                    accuracy_m: settling.best_accuracy_m,
                    reason: TransitionReason::Settled,
                };
            }
        }

        if now.duration_since(acq.entered_at) >= self.cfg.max_fix_wait {
            let accuracy_m = acq
                .settling
                .map(|s| s.best_accuracy_m)
                .or_else(|| self.last_fix.as_ref().and_then(|f| f.horizontal_accuracy))
                .unwrap_or(self.cfg.fallback_accuracy_m);
            return AcquisitionOutcome::Finish {
                accuracy_m,
                reason: TransitionReason::FixTimeout,
            };
        }

        AcquisitionOutcome::Pending
    }

    /// Leave `AcquiringFix` for the charging-dependent terminal state
    fn finish_acquisition(
        &mut self,
        accuracy_m: f64,
        reason: TransitionReason,
        now: Instant,
    ) -> Vec<TrackerCommand> {
        if self.last_fix.is_none() {
            // Nothing to anchor a region on; start the wait over
            self.acquiring = Some(Acquiring::new(now));
            return Vec::new();
        }
        self.acquiring = None;

        if self.charging {
            self.enter_continuous(reason)
        } else {
            self.enter_idle(accuracy_m, reason)
        }
    }

    fn enter_continuous(&mut self, reason: TransitionReason) -> Vec<TrackerCommand> {
        let from = self.mode;
        self.mode = TrackingMode::Continuous;

        let mut cmds = Vec::new();
        if self.geofence.take().is_some() {
            cmds.push(TrackerCommand::RemoveGeofence);
        }
        cmds.push(TrackerCommand::StartDistanceFilteredUpdates {
            min_distance_m: self.cfg.continuous_distance_filter_m,
        });
        if let Some(marker) = self.marker(from, TrackingMode::Continuous, reason) {
            cmds.push(marker);
        }
        cmds.push(TrackerCommand::ModeChanged {
            from,
            to: TrackingMode::Continuous,
            reason,
        });
        cmds
    }

    fn enter_idle(&mut self, accuracy_m: f64, reason: TransitionReason) -> Vec<TrackerCommand> {
        let from = self.mode;
        self.mode = TrackingMode::Idle;

        let mut cmds = vec![TrackerCommand::StopLocationUpdates];

        if self.cfg.wake_policy == WakePolicy::Geofence {
            // last_fix is present: finish_acquisition checked before entry
            if let Some(fix) = &self.last_fix {
                let radius =
                    monitoring_radius(accuracy_m.max(0.0), self.last_speed_mps.max(0.0));
                let region = GeofenceRegion::new(fix.latitude, fix.longitude, radius);
                self.geofence = Some(region.clone());
                cmds.push(TrackerCommand::InstallGeofence(region));
            }
        }

        if let Some(marker) = self.marker(from, TrackingMode::Idle, reason) {
            cmds.push(marker);
        }
        cmds.push(TrackerCommand::CheckpointBuffer);
        cmds.push(TrackerCommand::ModeChanged {
            from,
            to: TrackingMode::Idle,
            reason,
        });
        cmds
    }

    /// Abandon the current state and reacquire a fix
    fn reacquire(&mut self, reason: TransitionReason, now: Instant) -> Vec<TrackerCommand> {
        let from = self.mode;
        self.mode = TrackingMode::AcquiringFix;
        self.acquiring = Some(Acquiring::new(now));

        let mut cmds = Vec::new();
        if self.geofence.take().is_some() {
            cmds.push(TrackerCommand::RemoveGeofence);
        }
        if let Some(marker) = self.marker(from, TrackingMode::AcquiringFix, reason) {
            cmds.push(marker);
        }
        cmds.push(TrackerCommand::StartHighAccuracyUpdates);
        cmds.push(TrackerCommand::ModeChanged {
            from,
            to: TrackingMode::AcquiringFix,
            reason,
        });
        cmds
    }

    /// Marker sample for a transition, anchored on the last known fix.
    ///
    /// Markers record transitions, not movement: they bypass the admission
    /// gates and do not advance them.
    fn marker(
        &self,
        from: TrackingMode,
        to: TrackingMode,
        reason: TransitionReason,
    ) -> Option<TrackerCommand> {
        self.last_fix.as_ref().map(|fix| {
            let mut point = fix.to_point();
            point.timestamp = Utc::now();
            point.notes = Some(format!("{from} -> {to} ({reason})"));
            TrackerCommand::Buffer(point)
        })
    }
}
