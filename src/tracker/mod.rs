//! Adaptive tracking core
//!
//! [`TrackerMachine`] holds the pure transition logic; [`TrackingSupervisor`]
//! is the single writer that feeds it events, carries out its commands, and
//! publishes state snapshots for observers.

mod machine;
mod supervisor;

pub use machine::{TrackerCommand, TrackerMachine, TrackingMode, TransitionReason};
pub use supervisor::{TrackingSnapshot, TrackingSupervisor};
