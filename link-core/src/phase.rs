//! Run state machine.
//!
//! A pure, side-effect-free state machine for one test run. It takes events
//! as input and produces a new phase plus the actions the orchestrator must
//! carry out. The orchestrator in `link-client` performs the actual I/O.

use crate::plan::CyclePlan;

/// Where a run is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    /// Nothing has happened yet.
    Idle,
    /// Executing a cycle (1-based).
    Running {
        /// The cycle being executed.
        cycle: u32,
    },
    /// Building the correlated table.
    Finalizing,
    /// Run completed.
    Done,
    /// Initial reachability check failed; no cycle ran.
    Aborted,
}

/// Inputs to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseEvent {
    /// Every device answered the initial probe.
    PreconditionPassed,
    /// At least one device did not answer the initial probe.
    PreconditionFailed,
    /// The current cycle's record has been appended.
    CycleCompleted,
    /// The operator signalled end of run.
    OperatorEnded,
    /// The correlated table has been written.
    FinalizeCompleted,
}

/// What the orchestrator must do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseAction {
    /// Disrupt, observe and append cycle N.
    RunCycle(u32),
    /// Run the correlation pass.
    Finalize,
    /// Stop the run with a hard failure.
    Abort,
    /// Report completion.
    Finish,
}

impl RunPhase {
    /// Create a state machine in the Idle phase.
    pub fn new() -> Self {
        Self::Idle
    }

    /// Process an event and return the new phase plus actions to execute.
    ///
    /// Events that do not apply to the current phase leave it unchanged and
    /// produce no actions.
    pub fn on_event(self, event: PhaseEvent, plan: CyclePlan) -> (Self, Vec<PhaseAction>) {
        match (self, event) {
            (Self::Idle, PhaseEvent::PreconditionPassed) => match plan {
                CyclePlan::Fixed(0) => (Self::Finalizing, vec![PhaseAction::Finalize]),
                _ => (Self::Running { cycle: 1 }, vec![PhaseAction::RunCycle(1)]),
            },
            (Self::Idle, PhaseEvent::PreconditionFailed) => {
                (Self::Aborted, vec![PhaseAction::Abort])
            }

            (Self::Running { cycle }, PhaseEvent::CycleCompleted) => match plan {
                CyclePlan::Fixed(total) if cycle >= total => {
                    (Self::Finalizing, vec![PhaseAction::Finalize])
                }
                _ => {
                    let next = cycle.saturating_add(1);
                    (Self::Running { cycle: next }, vec![PhaseAction::RunCycle(next)])
                }
            },
            (Self::Running { .. }, PhaseEvent::OperatorEnded) => {
                (Self::Finalizing, vec![PhaseAction::Finalize])
            }

            (Self::Finalizing, PhaseEvent::FinalizeCompleted) => {
                (Self::Done, vec![PhaseAction::Finish])
            }

            (state, _) => (state, vec![]),
        }
    }

    /// Returns true once the run can make no further progress.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Aborted)
    }
}

impl Default for RunPhase {
    fn default() -> Self {
        Self::new()
    }
}
