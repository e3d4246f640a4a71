//! # link-client
//!
//! Runs M720 link-recovery tests against real hardware.
//!
//! A run repeatedly disrupts a fleet of network modules (switch reload,
//! interface-bank shutdown, relay power cut, or operator-driven), then
//! records which modules came back and which switch ports stayed down.
//!
//! ## Features
//!
//! - **Probing**: concurrent ICMP checks over the whole fleet
//! - **Remote shells**: switch CLI and module shell sessions over `ssh`
//! - **Relay control**: HTTP-driven power relay for power-cycle tests
//! - **Durable results**: one flushed row per cycle, then a correlated table
//! - **Pure state machine**: run phases come from `link-core`
//!
//! ## Example
//!
//! ```ignore
//! use link_client::{Orchestrator, RunContext, RunSettings};
//!
//! let action = link_client::actions::for_variant(variant, deps)?;
//! let report = Orchestrator::new(settings, context, action).run().await?;
//! println!("results in {}", report.total_file.display());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod accumulator;
pub mod actions;
pub mod channel;
pub mod collect;
pub mod observer;
pub mod orchestrator;
pub mod probe;
pub mod relay;

pub use accumulator::{finalize, read_results, AccumulatorError, ClockLog, Finalized, ResultWriter};
pub use actions::{
    for_variant, ActionDeps, ActionError, ActionOutcome, Disruption, Manual, OperatorSignal,
    PowerCycle, Reboot, Shutdown, ShutdownSettings,
};
pub use channel::{
    ChannelError, ChannelKind, ChannelSettings, Connector, Endpoint, MockConnector,
    ReconnectOnce, Shell, SshConnector,
};
pub use collect::{CollectSummary, Collector, CollectorHost, ModuleCredentials, POOL_BOUNDS};
pub use observer::{CycleObserver, LinkQuery};
pub use orchestrator::{Orchestrator, RunContext, RunError, RunReport, RunSettings};
pub use probe::{MockProber, PingProber, ProbeOutcome, Prober};
pub use relay::{RelayClient, RelayConfig, RelayError};
