//! # link-types
//!
//! Data model for M720 link-recovery test runs.
//!
//! This crate provides the foundational types used across all link crates:
//! - [`SerialNumber`], [`Device`], [`DeviceFamily`], [`ModuleKind`] - Fleet identity
//! - [`CycleRecord`], [`ActionStatus`] - One row of a run's result file
//! - [`ClockSample`] - On-device clock counters for one cycle
//! - [`CellStatus`] - Per-device, per-cycle verdict in the correlated table
//! - [`RunId`] - Explicit run identifier embedded in every file name
//! - [`TypesError`] - Error types

#![warn(missing_docs)]
#![warn(clippy::all)]

mod cycle;
mod device;
mod error;
mod run;

pub use cycle::{ActionStatus, CellStatus, ClockSample, CycleRecord};
pub use device::{Device, DeviceFamily, FamilyGroup, ModuleKind, SerialNumber};
pub use error::TypesError;
pub use run::RunId;
