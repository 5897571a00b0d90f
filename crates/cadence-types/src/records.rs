//! Serializable records emitted while a simulation runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::RunId;

/// A single crossing of a phase boundary.
///
/// When one step crosses several boundaries, one record is produced per
/// boundary, in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseTransition {
    /// Index of the phase being exited.
    pub from_index: usize,
    /// Name of the phase being exited.
    pub from_name: String,
    /// Index of the phase being entered.
    pub to_index: usize,
    /// Name of the phase being entered.
    pub to_name: String,
    /// Simulation time at which the crossing was observed.
    pub elapsed: f64,
}

/// Fire count of one periodic task at the end of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFireCount {
    /// Task label.
    pub name: String,
    /// Number of times the task fired.
    pub fires: u64,
}

/// Counter message published by a pub/sub ticking task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickMessage {
    /// Run that produced the message.
    pub run_id: RunId,
    /// Monotonic counter, starting at 0.
    pub ticker: u64,
    /// Simulation time when the message was produced.
    pub sim_time: f64,
    /// Wall-clock time when the message was produced.
    pub produced_at: DateTime<Utc>,
}
