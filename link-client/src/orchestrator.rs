//! Test driver.
//!
//! Interprets the [`RunPhase`] state machine from `link-core`: checks the
//! precondition, runs cycles strictly one after another, then runs the
//! correlation pass once. Only an unreachable fleet at start or an
//! unusable ResultFile end a run early.

use std::collections::VecDeque;
use std::fmt;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use link_core::codec::{self, ResultLayout};
use link_core::{ClockMode, CyclePlan, Directory, PhaseAction, PhaseEvent, RunPhase, Variant};
use link_types::{ActionStatus, ModuleKind, RunId};
use thiserror::Error;

use crate::accumulator::{self, AccumulatorError, ClockLog, ResultWriter};
use crate::actions::Disruption;
use crate::channel::{Connector, Endpoint};
use crate::collect::{Collector, CollectorHost, ModuleCredentials};
use crate::observer::{CycleObserver, LinkQuery};
use crate::probe::Prober;

/// Errors that end a run.
#[derive(Debug, Error)]
pub enum RunError {
    /// Devices did not answer the initial probe; no cycle ran.
    #[error("unreachable before the first cycle: {}", AddressList(.0))]
    Unreachable(Vec<IpAddr>),

    /// No configured device belongs to the module kind under test.
    #[error("no {0} devices configured")]
    NoDevices(ModuleKind),

    /// The ResultFile could not be created, written or read back.
    #[error(transparent)]
    Accumulator(#[from] AccumulatorError),
}

struct AddressList<'a>(&'a [IpAddr]);

impl fmt::Display for AddressList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, ip) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{ip}")?;
        }
        Ok(())
    }
}

/// What to run.
#[derive(Debug, Clone)]
pub struct RunSettings {
    /// Test variant.
    pub variant: Variant,
    /// Module kind under test.
    pub kind: ModuleKind,
    /// Total test duration.
    pub total_minutes: u32,
    /// Where result and clock files go.
    pub output_dir: PathBuf,
    /// Far switch name used in the result file name.
    pub switch_name: String,
    /// Run identifier embedded in every file name.
    pub run_id: RunId,
    /// Wait after installing boot scripts on the modules.
    pub setup_boot_wait: Duration,
    /// Worker pool size; defaults to the variant's.
    pub pool_size: Option<usize>,
}

impl RunSettings {
    /// Settings with a fresh run id and the variant's default waits.
    pub fn new(
        variant: Variant,
        kind: ModuleKind,
        total_minutes: u32,
        output_dir: impl Into<PathBuf>,
        switch_name: impl Into<String>,
    ) -> Self {
        Self {
            variant,
            kind,
            total_minutes,
            output_dir: output_dir.into(),
            switch_name: switch_name.into(),
            run_id: RunId::generate(),
            setup_boot_wait: Duration::from_secs(variant.profile().setup_boot_secs),
            pool_size: None,
        }
    }

    /// Path of this run's ResultFile.
    pub fn result_path(&self) -> PathBuf {
        self.output_dir.join(codec::result_file_name(
            self.variant.file_label(),
            &self.switch_name,
            &self.run_id,
        ))
    }
}

/// Collaborators a run needs.
pub struct RunContext {
    /// Every configured device; filtered to the kind under test.
    pub directory: Directory,
    /// Liveness checks.
    pub prober: Arc<dyn Prober>,
    /// Remote shells to switches and modules.
    pub connector: Arc<dyn Connector>,
    /// Switch facing module port B.
    pub far_switch: Endpoint,
    /// Switch facing module port A.
    pub near_switch: Option<Endpoint>,
    /// Module logins, for clock collection.
    pub modules: ModuleCredentials,
    /// Host the modules copy their files to.
    pub collector_host: CollectorHost,
}

/// Summary of a finished run.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Run identifier.
    pub run_id: RunId,
    /// Per-cycle rows.
    pub result_file: PathBuf,
    /// Correlated table.
    pub total_file: PathBuf,
    /// Cycles recorded.
    pub cycles: u32,
    /// Cycles whose disruption reported a failure.
    pub failed_actions: u32,
}

enum CycleEnd {
    Completed { action_ok: bool },
    OperatorEnded,
}

/// Runs one test from precondition to correlated table.
pub struct Orchestrator {
    settings: RunSettings,
    directory: Arc<Directory>,
    prober: Arc<dyn Prober>,
    observer: CycleObserver,
    action: Box<dyn Disruption>,
    collector: Collector,
}

impl Orchestrator {
    /// Wire a run together. `action` is the disruption selected for the
    /// variant.
    pub fn new(settings: RunSettings, context: RunContext, action: Box<dyn Disruption>) -> Self {
        let profile = settings.variant.profile();
        let directory = Arc::new(context.directory.for_kind(settings.kind));

        let observer = CycleObserver::new(
            Arc::clone(&directory),
            Arc::clone(&context.prober),
            Arc::clone(&context.connector),
            context.far_switch,
            context.near_switch,
            LinkQuery {
                far: profile.query_far,
                near: profile.query_near,
            },
        );
        let collector = Collector::new(
            context.connector,
            Arc::clone(&directory),
            context.modules,
            context.collector_host,
            ClockLog::new(&settings.output_dir, settings.run_id.clone()),
            settings.pool_size.unwrap_or(profile.pool_size),
        );

        Self {
            settings,
            directory,
            prober: context.prober,
            observer,
            action,
            collector,
        }
    }

    /// Devices under test.
    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    /// Execute the run.
    pub async fn run(&self) -> Result<RunReport, RunError> {
        let variant = self.settings.variant;
        let profile = variant.profile();
        let plan = variant.plan(self.settings.total_minutes);

        if self.directory.is_empty() {
            return Err(RunError::NoDevices(self.settings.kind));
        }
        tracing::info!(
            "run {}: {} test, {} modules, {} devices, {}",
            self.settings.run_id,
            variant,
            self.settings.kind,
            self.directory.len(),
            match plan {
                CyclePlan::Fixed(n) => format!("{n} cycles"),
                CyclePlan::UntilOperatorEnds => "until the operator ends it".to_string(),
            }
        );

        let outcome = self.prober.probe(&self.directory.ips()).await;
        let unreachable: Vec<IpAddr> = outcome.unreachable.iter().copied().collect();
        let event = if outcome.all_reachable() {
            PhaseEvent::PreconditionPassed
        } else {
            PhaseEvent::PreconditionFailed
        };
        let (mut phase, first) = RunPhase::new().on_event(event, plan);
        if phase == RunPhase::Aborted {
            tracing::error!("unreachable before the first cycle: {}", AddressList(&unreachable));
            return Err(RunError::Unreachable(unreachable));
        }

        let layout = ResultLayout::new(self.settings.kind, self.observer.queries_near());
        let mut writer = ResultWriter::create(
            self.settings.result_path(),
            layout,
            Arc::clone(&self.directory),
        )
        .await?;
        self.prepare_clocks(profile.clock_mode).await;

        let mut queue: VecDeque<PhaseAction> = first.into();
        let mut failed_actions = 0;
        let mut total_file = None;

        while let Some(action) = queue.pop_front() {
            let event = match action {
                PhaseAction::Abort => return Err(RunError::Unreachable(unreachable)),
                PhaseAction::RunCycle(cycle) => match self.run_cycle(cycle, &mut writer).await? {
                    CycleEnd::Completed { action_ok } => {
                        if !action_ok {
                            failed_actions += 1;
                        }
                        if profile.clock_mode == ClockMode::Snapshot {
                            self.collector.snapshot_clocks(cycle).await;
                        }
                        PhaseEvent::CycleCompleted
                    }
                    CycleEnd::OperatorEnded => PhaseEvent::OperatorEnded,
                },
                PhaseAction::Finalize => {
                    if profile.clock_mode == ClockMode::OnDeviceLog {
                        self.collector.retrieve_files().await;
                    }
                    let clocks = match profile.clock_mode {
                        ClockMode::None => None,
                        _ => Some(self.collector.clocks()),
                    };
                    let finalized =
                        accumulator::finalize(&self.directory, writer.path(), clocks).await?;
                    total_file = Some(finalized.path);
                    PhaseEvent::FinalizeCompleted
                }
                PhaseAction::Finish => break,
            };

            let (next, actions) = phase.on_event(event, plan);
            phase = next;
            queue.extend(actions);
        }

        let report = RunReport {
            run_id: self.settings.run_id.clone(),
            result_file: writer.path().to_path_buf(),
            total_file: total_file.unwrap_or_default(),
            cycles: writer.rows_written(),
            failed_actions,
        };
        tracing::info!(
            "run {} done: {} cycles ({} with a failed action)",
            report.run_id,
            report.cycles,
            report.failed_actions
        );
        Ok(report)
    }

    async fn prepare_clocks(&self, mode: ClockMode) {
        match mode {
            ClockMode::None => {}
            ClockMode::Snapshot => {
                self.collector.create_clock_files().await;
            }
            ClockMode::OnDeviceLog => {
                self.collector.prepare_modules().await;
                tracing::info!(
                    "waiting {}s for modules to boot",
                    self.settings.setup_boot_wait.as_secs()
                );
                tokio::time::sleep(self.settings.setup_boot_wait).await;
            }
        }
    }

    async fn run_cycle(
        &self,
        cycle: u32,
        writer: &mut ResultWriter,
    ) -> Result<CycleEnd, AccumulatorError> {
        let outcome = self.action.execute(cycle).await;
        if outcome.end_of_run {
            return Ok(CycleEnd::OperatorEnded);
        }

        let mut record = self.observer.observe(cycle).await;
        if !outcome.ok {
            let detail = outcome
                .detail
                .unwrap_or_else(|| format!("{} failed", self.action.name()));
            tracing::warn!("cycle {}: recording failed {}: {}", cycle, self.action.name(), detail);
            record.action = ActionStatus::Failed(detail);
        }

        writer.append(&record).await?;
        Ok(CycleEnd::Completed {
            action_ok: outcome.ok,
        })
    }
}
