//! Per-cycle observation types.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::{SerialNumber, TypesError};

/// Whether the disruption step of a cycle did what it was asked to.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ActionStatus {
    /// The action completed (or was fire-and-forget).
    #[default]
    Ok,
    /// The action reported a failure; the cycle's data is still recorded.
    Failed(String),
}

impl ActionStatus {
    /// Returns true if the action completed.
    pub fn is_ok(&self) -> bool {
        matches!(self, ActionStatus::Ok)
    }
}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionStatus::Ok => write!(f, "ok"),
            ActionStatus::Failed(detail) => write!(f, "failed: {}", detail),
        }
    }
}

impl FromStr for ActionStatus {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s == "ok" || s.is_empty() {
            return Ok(ActionStatus::Ok);
        }
        match s.strip_prefix("failed:") {
            Some(detail) => Ok(ActionStatus::Failed(detail.trim().to_string())),
            None => Err(TypesError::InvalidActionStatus(s.to_string())),
        }
    }
}

/// Observations for one disrupt-then-observe cycle.
///
/// Created once by the cycle observer and immutable after it has been
/// appended to the result file.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CycleRecord {
    /// 1-based, gap-free within a run.
    pub cycle_index: u32,
    /// Modules that answered the liveness probe.
    pub reachable: BTreeSet<SerialNumber>,
    /// Modules that did not answer.
    pub unreachable: BTreeSet<SerialNumber>,
    /// Interfaces reported down on the far switch.
    pub down_ports_far: Vec<String>,
    /// Interfaces reported down on the near switch, when that side is checked.
    pub down_ports_near: Option<Vec<String>>,
    /// Outcome of the disruption that preceded the observation.
    pub action: ActionStatus,
}

impl CycleRecord {
    /// Create an empty record for a cycle.
    pub fn new(cycle_index: u32) -> Self {
        Self {
            cycle_index,
            ..Default::default()
        }
    }

    /// Attach the outcome of the cycle's disruption.
    pub fn with_action(mut self, action: ActionStatus) -> Self {
        self.action = action;
        self
    }
}

/// Clock counters read from one module after one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockSample {
    /// Module the counters came from.
    pub serial_number: SerialNumber,
    /// Cycle the sample belongs to.
    pub cycle_index: u32,
    /// `CNT 0` counter.
    pub counter_a: u64,
    /// `CNT 1` counter.
    pub counter_b: u64,
}

/// Verdict for one device in one cycle of the correlated table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CellStatus {
    /// Probe answered and no link-down was reported.
    Reachable,
    /// Probe did not answer.
    Unreachable,
    /// Link state reported the device's port down; overrides reachability.
    Down,
    /// Device absent from both probe sets for this cycle.
    Unknown,
}

impl fmt::Display for CellStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellStatus::Reachable => write!(f, "reachable"),
            CellStatus::Unreachable => write!(f, "unreachable"),
            CellStatus::Down => write!(f, "down"),
            CellStatus::Unknown => Ok(()),
        }
    }
}
