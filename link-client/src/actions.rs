//! Disruption actions.
//!
//! One implementation per mechanism, selected once at start-up with
//! [`for_variant`]. Each owns its own completion wait, since "the devices
//! have reacted" means something different for each of them.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use link_core::parse::{self, LinkReport};
use link_core::{RelaySide, Variant};
use tokio::sync::{mpsc, Mutex};

use crate::channel::{commands, exchange, ChannelError, Connector, Endpoint};
use crate::relay::{RelayClient, RelayConfig};

/// Result of one disruption.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionOutcome {
    /// Whether the action did what it was asked to.
    pub ok: bool,
    /// Why it did not, or anything worth recording.
    pub detail: Option<String>,
    /// The operator ended the run instead of confirming a cycle.
    pub end_of_run: bool,
}

impl ActionOutcome {
    /// Successful outcome.
    pub fn ok() -> Self {
        Self {
            ok: true,
            ..Default::default()
        }
    }

    /// Failed outcome with a reason.
    pub fn failed(detail: impl Into<String>) -> Self {
        Self {
            ok: false,
            detail: Some(detail.into()),
            end_of_run: false,
        }
    }

    /// Operator asked to stop.
    pub fn end_of_run() -> Self {
        Self {
            ok: true,
            detail: None,
            end_of_run: true,
        }
    }
}

/// A disruptive operation performed once per cycle.
#[async_trait]
pub trait Disruption: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Perform the disruption for `cycle` and wait until devices should
    /// have reacted.
    async fn execute(&self, cycle: u32) -> ActionOutcome;
}

/// Operator input for the manual variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorSignal {
    /// Modules have been re-seated and have booted.
    Continue,
    /// Stop the run.
    End,
}

/// Reload the far switch.
///
/// Returns as soon as the commands are sent; the following probe detects
/// whatever state the switch and modules are in.
pub struct Reboot {
    connector: Arc<dyn Connector>,
    switch: Endpoint,
}

impl Reboot {
    /// Reboot action against `switch`.
    pub fn new(connector: Arc<dyn Connector>, switch: Endpoint) -> Self {
        Self { connector, switch }
    }
}

#[async_trait]
impl Disruption for Reboot {
    fn name(&self) -> &'static str {
        "reboot"
    }

    async fn execute(&self, cycle: u32) -> ActionOutcome {
        tracing::info!("cycle {}: reloading {}", cycle, self.switch.host);
        let reload = commands(["reload", "yes"]);
        match exchange(self.connector.as_ref(), &self.switch, &reload).await {
            Ok(_) => ActionOutcome::ok(),
            Err(e) => {
                tracing::warn!("cycle {}: reload not sent: {}", cycle, e);
                ActionOutcome::failed(e.to_string())
            }
        }
    }
}

/// Interface-bank shutdown settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownSettings {
    /// Interface range in switch syntax, e.g. `1/0/1-28`.
    pub interface_range: String,
    /// Wait after re-enabling the interfaces.
    pub settle: Duration,
}

impl Default for ShutdownSettings {
    fn default() -> Self {
        Self {
            interface_range: "1/0/1-28".into(),
            settle: Duration::from_secs(60),
        }
    }
}

/// Shut a bank of far-switch interfaces, verify they went down, re-enable.
///
/// The interfaces are re-enabled even when verification fails, so a failed
/// cycle never leaves the rack dark.
pub struct Shutdown {
    connector: Arc<dyn Connector>,
    switch: Endpoint,
    settings: ShutdownSettings,
}

impl Shutdown {
    /// Shutdown action against `switch`.
    pub fn new(
        connector: Arc<dyn Connector>,
        switch: Endpoint,
        settings: ShutdownSettings,
    ) -> Self {
        Self {
            connector,
            switch,
            settings,
        }
    }

    /// Shut the bank, read back the state of `targets`, re-enable the bank.
    async fn cycle_interfaces(&self, targets: &[String]) -> Result<LinkReport, ChannelError> {
        let range = format!("int eth {}", self.settings.interface_range);
        let mut shell = self.connector.open(&self.switch).await?;

        let result = async {
            shell
                .run(&commands([
                    "terminal length 0",
                    "conf t",
                    range.as_str(),
                    "shutdown",
                    "exit",
                ]))
                .await?;
            let status = shell
                .run(&commands(["show interface ethernet status"]))
                .await?;
            let report = parse::link_states(&status, targets);
            shell
                .run(&commands([range.as_str(), "no shutdown", "end"]))
                .await?;
            Ok::<_, ChannelError>(report)
        }
        .await;

        shell.close().await;
        result
    }
}

#[async_trait]
impl Disruption for Shutdown {
    fn name(&self) -> &'static str {
        "shutdown"
    }

    async fn execute(&self, cycle: u32) -> ActionOutcome {
        tracing::info!(
            "cycle {}: shutting down {} on {}",
            cycle,
            self.settings.interface_range,
            self.switch.host
        );

        let outcome = match parse::expand_interface_range(&self.settings.interface_range) {
            Some(targets) => match self.cycle_interfaces(&targets).await {
                Ok(report) => verify_down(&targets, &report),
                Err(e) => ActionOutcome::failed(e.to_string()),
            },
            None => ActionOutcome::failed(format!(
                "invalid interface range {:?}",
                self.settings.interface_range
            )),
        };
        if let Some(detail) = &outcome.detail {
            tracing::warn!("cycle {}: shutdown not verified: {}", cycle, detail);
        }

        tokio::time::sleep(self.settings.settle).await;
        outcome
    }
}

/// Every target must read as down; a target absent from the listing
/// counts as unverified.
fn verify_down(targets: &[String], report: &LinkReport) -> ActionOutcome {
    let still_up: Vec<&str> = targets
        .iter()
        .filter(|t| !report.down.contains(t) && !report.missing.contains(t))
        .map(String::as_str)
        .collect();
    if !still_up.is_empty() {
        ActionOutcome::failed(format!("still up: {}", still_up.join(", ")))
    } else if !report.is_complete() {
        ActionOutcome::failed(format!(
            "not in interface status: {}",
            report.missing.join(", ")
        ))
    } else {
        ActionOutcome::ok()
    }
}

/// Power-cycle a switch through the relay.
///
/// Relay errors are logged and swallowed: a missed power cycle degrades the
/// cycle's data instead of ending the run.
pub struct PowerCycle {
    relay: RelayClient,
    relay_number: u8,
    off_duration: Duration,
    boot_settle: Duration,
}

impl PowerCycle {
    /// Power-cycle action on relay output `relay_number`.
    pub fn new(
        relay: RelayClient,
        relay_number: u8,
        off_duration: Duration,
        boot_settle: Duration,
    ) -> Self {
        Self {
            relay,
            relay_number,
            off_duration,
            boot_settle,
        }
    }
}

#[async_trait]
impl Disruption for PowerCycle {
    fn name(&self) -> &'static str {
        "power"
    }

    async fn execute(&self, cycle: u32) -> ActionOutcome {
        tracing::info!("cycle {}: power-cycling relay {}", cycle, self.relay_number);

        let result = async {
            self.relay.set(self.relay_number, false).await?;
            tokio::time::sleep(self.off_duration).await;
            self.relay.set(self.relay_number, true).await?;
            tokio::time::sleep(self.boot_settle).await;
            Ok::<_, crate::relay::RelayError>(())
        }
        .await;

        match result {
            Ok(()) => ActionOutcome::ok(),
            Err(e) => {
                tracing::warn!("cycle {}: relay {}: {}", cycle, self.relay_number, e);
                ActionOutcome::failed(e.to_string())
            }
        }
    }
}

/// Wait for the operator to re-seat modules by hand.
pub struct Manual {
    signals: Mutex<mpsc::Receiver<OperatorSignal>>,
}

impl Manual {
    /// Manual action fed by `signals`. A closed channel ends the run.
    pub fn new(signals: mpsc::Receiver<OperatorSignal>) -> Self {
        Self {
            signals: Mutex::new(signals),
        }
    }
}

#[async_trait]
impl Disruption for Manual {
    fn name(&self) -> &'static str {
        "manual"
    }

    async fn execute(&self, cycle: u32) -> ActionOutcome {
        tracing::info!(
            "cycle {}: re-insert the modules, wait for them to boot, then press enter (type 'end' to finish)",
            cycle
        );
        match self.signals.lock().await.recv().await {
            Some(OperatorSignal::Continue) => ActionOutcome::ok(),
            Some(OperatorSignal::End) | None => {
                tracing::info!("cycle {}: operator ended the run", cycle);
                ActionOutcome::end_of_run()
            }
        }
    }
}

/// Everything the actions may need.
pub struct ActionDeps {
    /// Opens switch sessions.
    pub connector: Arc<dyn Connector>,
    /// The far switch.
    pub far_switch: Endpoint,
    /// Relay settings.
    pub relay: RelayConfig,
    /// Interface-bank settings.
    pub shutdown: ShutdownSettings,
    /// Operator input, for the manual variant.
    pub operator: Option<mpsc::Receiver<OperatorSignal>>,
}

/// Errors selecting an action.
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    /// The relay client could not be built.
    #[error("relay client: {0}")]
    Relay(#[from] crate::relay::RelayError),
}

/// Build the action for `variant`.
pub fn for_variant(
    variant: Variant,
    deps: ActionDeps,
) -> Result<Box<dyn Disruption>, ActionError> {
    let action: Box<dyn Disruption> = match variant {
        Variant::Reboot => Box::new(Reboot::new(deps.connector, deps.far_switch)),
        Variant::Shutdown => Box::new(Shutdown::new(
            deps.connector,
            deps.far_switch,
            deps.shutdown,
        )),
        Variant::Power(_) => {
            let relay_number = match variant.profile().relay.unwrap_or(RelaySide::Far) {
                RelaySide::Far => deps.relay.far_relay,
                RelaySide::Near => deps.relay.near_relay,
            };
            let client = RelayClient::new(&deps.relay.base_url, deps.relay.request_timeout)?;
            Box::new(PowerCycle::new(
                client,
                relay_number,
                deps.relay.off_duration,
                deps.relay.boot_settle,
            ))
        }
        Variant::Manual => {
            let signals = deps.operator.unwrap_or_else(|| mpsc::channel(1).1);
            Box::new(Manual::new(signals))
        }
    };
    Ok(action)
}
