//! # link-core
//!
//! Pure logic for M720 link-recovery runs (no I/O, instant tests).
//!
//! This crate implements the decisions a run makes without touching the
//! network or the disk, so every rule can be unit-tested directly.
//!
//! ## Design Philosophy
//!
//! All modules in this crate are **pure** - they take input and produce output
//! without side effects:
//! - [`directory`] resolves addresses and ports back to serial numbers
//! - [`plan`] turns a test variant and duration into a cycle plan
//! - [`phase`] is the run state machine (Idle → Running → Finalizing → Done)
//! - [`codec`] reads and writes `;`-separated result and clock rows
//! - [`parse`] extracts link state and clock counters from shell output
//! - [`correlate`] joins cycle rows and clock samples into the wide table
//!
//! The actual I/O (ping, SSH, HTTP, files) is performed by `link-client`,
//! which interprets the outputs of these modules.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod codec;
pub mod correlate;
pub mod directory;
pub mod parse;
pub mod phase;
pub mod plan;

pub use codec::{CodecError, ResultLayout};
pub use correlate::{correlate, Cell, ClockIndex, CorrelatedRow, CorrelatedTable};
pub use directory::{Directory, DirectoryError, Resolved};
pub use parse::LinkReport;
pub use phase::{PhaseAction, PhaseEvent, RunPhase};
pub use plan::{cycle_count, ClockMode, CyclePlan, PowerTest, RelaySide, Variant, VariantProfile};
