//! Test variants and the cycle plan they produce.

use std::fmt;

/// Which power test is being run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PowerTest {
    /// Power-cycle the far switch, check port B only.
    One,
    /// Power-cycle the far switch, check ports A and B.
    Two,
    /// Power-cycle the near switch, check ports A and B, snapshot clocks per cycle.
    Three,
}

/// Test variant selected on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Variant {
    /// Reload the far switch every cycle.
    Reboot,
    /// Shut and re-enable the far switch's interface bank every cycle.
    Shutdown,
    /// Power-cycle a switch through the network relay.
    Power(PowerTest),
    /// Operator re-seats the modules by hand.
    Manual,
}

/// Which relay output a power test toggles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelaySide {
    /// Relay feeding the far switch.
    Far,
    /// Relay feeding the near switch.
    Near,
}

/// How clock counters are collected during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockMode {
    /// No clock collection.
    None,
    /// Modules log counters themselves from a boot script; files are fetched at the end.
    OnDeviceLog,
    /// The orchestrator queries each module after every cycle.
    Snapshot,
}

/// How many cycles a run executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePlan {
    /// Exactly this many cycles.
    Fixed(u32),
    /// Until the operator signals end of run.
    UntilOperatorEnds,
}

/// Static behaviour of a variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VariantProfile {
    /// Nominal minutes per cycle; `None` for operator-paced runs.
    pub cycle_minutes: Option<u32>,
    /// Query far-switch link state after each disruption.
    pub query_far: bool,
    /// Query near-switch link state after each disruption.
    pub query_near: bool,
    /// Clock collection mode.
    pub clock_mode: ClockMode,
    /// Relay output toggled by power tests.
    pub relay: Option<RelaySide>,
    /// Seconds to let modules boot after on-device setup.
    pub setup_boot_secs: u64,
    /// Worker pool size for per-device side operations.
    pub pool_size: usize,
}

impl Variant {
    /// Behaviour table for this variant.
    pub fn profile(&self) -> VariantProfile {
        match self {
            Variant::Reboot => VariantProfile {
                cycle_minutes: Some(4),
                query_far: false,
                query_near: false,
                clock_mode: ClockMode::None,
                relay: None,
                setup_boot_secs: 0,
                pool_size: 5,
            },
            Variant::Shutdown => VariantProfile {
                cycle_minutes: Some(3),
                query_far: true,
                query_near: false,
                clock_mode: ClockMode::None,
                relay: None,
                setup_boot_secs: 0,
                pool_size: 5,
            },
            Variant::Power(test) => VariantProfile {
                cycle_minutes: Some(4),
                query_far: true,
                query_near: !matches!(test, PowerTest::One),
                clock_mode: match test {
                    PowerTest::Three => ClockMode::Snapshot,
                    _ => ClockMode::OnDeviceLog,
                },
                relay: Some(match test {
                    PowerTest::Three => RelaySide::Near,
                    _ => RelaySide::Far,
                }),
                setup_boot_secs: 60,
                pool_size: 5,
            },
            Variant::Manual => VariantProfile {
                cycle_minutes: None,
                query_far: true,
                query_near: true,
                clock_mode: ClockMode::OnDeviceLog,
                relay: None,
                setup_boot_secs: 30,
                pool_size: 2,
            },
        }
    }

    /// Cycle plan for a run of `total_minutes`.
    pub fn plan(&self, total_minutes: u32) -> CyclePlan {
        match self.profile().cycle_minutes {
            Some(per_cycle) => CyclePlan::Fixed(cycle_count(total_minutes, per_cycle)),
            None => CyclePlan::UntilOperatorEnds,
        }
    }

    /// Short name used in result file names.
    pub fn file_label(&self) -> &'static str {
        match self {
            Variant::Reboot => "reboot",
            Variant::Shutdown => "shutdown",
            Variant::Power(_) => "power",
            Variant::Manual => "manual",
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::Power(PowerTest::One) => write!(f, "power 1"),
            Variant::Power(PowerTest::Two) => write!(f, "power 2"),
            Variant::Power(PowerTest::Three) => write!(f, "power 3"),
            other => f.write_str(other.file_label()),
        }
    }
}

/// Number of whole cycles that fit in the test duration.
///
/// A remainder shorter than one cycle is not run. A zero cycle length
/// yields no cycles.
pub fn cycle_count(total_minutes: u32, per_cycle_minutes: u32) -> u32 {
    total_minutes.checked_div(per_cycle_minutes).unwrap_or(0)
}
