//! Per-device side collection over a bounded worker pool.
//!
//! Three fan-outs, each joined before the caller moves on:
//! - [`Collector::prepare_modules`] installs a boot script so each module
//!   logs its own clock counters, then reboots it
//! - [`Collector::snapshot_clocks`] queries every module after a cycle and
//!   appends to that module's clock file
//! - [`Collector::retrieve_files`] has every module copy its CSV files to
//!   the collector host
//!
//! The pool never runs two tasks for the same device at once, so each clock
//! file has a single writer.

use std::sync::Arc;

use futures_util::stream::{self, StreamExt};
use link_core::{parse, Directory};
use link_types::{ClockSample, Device, SerialNumber};
use thiserror::Error;

use crate::accumulator::{AccumulatorError, ClockLog};
use crate::channel::{commands, exchange, ChannelError, ChannelKind, Connector, Endpoint};

/// Smallest and largest worker pool.
pub const POOL_BOUNDS: (usize, usize) = (2, 5);

/// Clamp a requested pool size into [`POOL_BOUNDS`].
pub fn clamp_pool_size(requested: usize) -> usize {
    requested.clamp(POOL_BOUNDS.0, POOL_BOUNDS.1)
}

/// Errors from one device's side task.
#[derive(Debug, Error)]
pub enum CollectError {
    /// The module could not be reached or misbehaved.
    #[error(transparent)]
    Channel(#[from] ChannelError),

    /// Clock tool output had no counters.
    #[error("no clock counters in module output")]
    NoCounters,

    /// The device's clock file could not be written.
    #[error(transparent)]
    Clock(#[from] AccumulatorError),
}

/// Module login details.
#[derive(Clone, PartialEq, Eq)]
pub struct ModuleCredentials {
    /// Login name.
    pub login: String,
    /// Login password.
    pub password: String,
    /// Root password for `su`.
    pub root_password: Option<String>,
}

impl std::fmt::Debug for ModuleCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleCredentials")
            .field("login", &self.login)
            .finish_non_exhaustive()
    }
}

/// Host the modules copy their files to.
#[derive(Clone, PartialEq, Eq)]
pub struct CollectorHost {
    /// Login on the collector.
    pub login: String,
    /// Password on the collector.
    pub password: String,
    /// Address as seen from the modules.
    pub host: String,
    /// Destination directory.
    pub path: String,
}

impl std::fmt::Debug for CollectorHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectorHost")
            .field("login", &self.login)
            .field("host", &self.host)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

/// Which devices a fan-out reached.
#[derive(Debug, Default)]
pub struct CollectSummary {
    /// Devices whose task succeeded.
    pub succeeded: Vec<SerialNumber>,
    /// Devices whose task failed, with the reason.
    pub failed: Vec<(SerialNumber, CollectError)>,
}

impl CollectSummary {
    fn from_results(results: Vec<(SerialNumber, Result<(), CollectError>)>) -> Self {
        let mut summary = Self::default();
        for (serial, result) in results {
            match result {
                Ok(()) => summary.succeeded.push(serial),
                Err(e) => summary.failed.push((serial, e)),
            }
        }
        summary.succeeded.sort();
        summary
    }
}

/// Fans per-device side tasks out across the fleet.
pub struct Collector {
    connector: Arc<dyn Connector>,
    directory: Arc<Directory>,
    credentials: ModuleCredentials,
    collector_host: CollectorHost,
    clocks: ClockLog,
    pool_size: usize,
}

impl Collector {
    /// Create a collector. `pool_size` is clamped to [`POOL_BOUNDS`].
    pub fn new(
        connector: Arc<dyn Connector>,
        directory: Arc<Directory>,
        credentials: ModuleCredentials,
        collector_host: CollectorHost,
        clocks: ClockLog,
        pool_size: usize,
    ) -> Self {
        Self {
            connector,
            directory,
            credentials,
            collector_host,
            clocks,
            pool_size: clamp_pool_size(pool_size),
        }
    }

    /// Effective pool size.
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Clock files this collector writes.
    pub fn clocks(&self) -> &ClockLog {
        &self.clocks
    }

    fn endpoint(&self, device: &Device) -> Endpoint {
        Endpoint {
            host: device.ip_address.to_string(),
            login: self.credentials.login.clone(),
            password: self.credentials.password.clone(),
            elevation_secret: self.credentials.root_password.clone(),
            kind: ChannelKind::ModuleShell,
        }
    }

    async fn fan_out<'a, F, Fut>(&'a self, what: &str, task: F) -> CollectSummary
    where
        F: Fn(&'a Device) -> Fut,
        Fut: std::future::Future<Output = Result<(), CollectError>> + 'a,
    {
        let results: Vec<_> = stream::iter(self.directory.devices())
            .map(|device| {
                let fut = task(device);
                async move { (device.serial_number, fut.await) }
            })
            .buffer_unordered(self.pool_size)
            .collect()
            .await;

        let summary = CollectSummary::from_results(results);
        for (serial, e) in &summary.failed {
            tracing::warn!("{}: {} failed: {}", serial, what, e);
        }
        tracing::info!(
            "{}: {}/{} modules done",
            what,
            summary.succeeded.len(),
            self.directory.len()
        );
        summary
    }

    /// Install the clock-logging boot script on every module and reboot it.
    pub async fn prepare_modules(&self) -> CollectSummary {
        self.fan_out("module setup", |device| async move {
            let file_name = self.clocks.file_name(device.serial_number);
            exchange(
                self.connector.as_ref(),
                &self.endpoint(device),
                &setup_commands(&file_name),
            )
            .await?;
            Ok::<(), CollectError>(())
        })
        .await
    }

    /// Create an empty clock file per device.
    pub async fn create_clock_files(&self) -> CollectSummary {
        self.fan_out("clock file setup", |device| async move {
            self.clocks.create(device.serial_number).await?;
            Ok::<(), CollectError>(())
        })
        .await
    }

    /// Read counters from every module and append them for `cycle_index`.
    pub async fn snapshot_clocks(&self, cycle_index: u32) -> CollectSummary {
        self.fan_out("clock snapshot", |device| async move {
            let output = exchange(
                self.connector.as_ref(),
                &self.endpoint(device),
                &commands(["clk_ctl.py -t 1"]),
            )
            .await?;
            let (counter_a, counter_b) =
                parse::clock_counters(&output).ok_or(CollectError::NoCounters)?;
            self.clocks
                .append(&ClockSample {
                    serial_number: device.serial_number,
                    cycle_index,
                    counter_a,
                    counter_b,
                })
                .await?;
            Ok::<(), CollectError>(())
        })
        .await
    }

    /// Have every module copy its CSV files to the collector host.
    pub async fn retrieve_files(&self) -> CollectSummary {
        self.fan_out("file retrieval", |device| async move {
            let target = &self.collector_host;
            let mut shell = self.connector.open(&self.endpoint(device)).await?;
            let result = async {
                let output = shell
                    .run(&[format!(
                        "scp /home/user/*.csv {}@{}:{}",
                        target.login, target.host, target.path
                    )])
                    .await?;
                let answer = if output.contains("(yes/no)") {
                    vec!["yes".to_string(), target.password.clone()]
                } else {
                    vec![target.password.clone()]
                };
                shell.run(&answer).await?;
                Ok::<_, ChannelError>(())
            }
            .await;
            shell.close().await;
            result.map_err(CollectError::from)
        })
        .await
    }
}

/// Commands that make a module log clock counters to `file_name` on boot.
pub fn setup_commands(file_name: &str) -> Vec<String> {
    let script = format!(
        "#!/bin/sh -e\\nmount -o rw,remount /\\nclk_ctl.py -f {file_name}\\nexit 0\\n"
    );
    vec![
        String::new(),
        "mount -o rw,remount /".into(),
        "rm /etc/rc.local".into(),
        format!("printf '{script}' >> /etc/rc.local"),
        "chmod +x /etc/rc.local".into(),
        "cd /home/user/".into(),
        "rm *.csv".into(),
        "reboot".into(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::MockConnector;
    use link_types::{DeviceFamily, RunId};

    fn directory() -> Arc<Directory> {
        let device = |serial: u32, ip: &str| Device {
            serial_number: SerialNumber::new(serial),
            ip_address: ip.parse().unwrap(),
            switch_port: format!("1/0/{}", serial % 100),
            near_port: None,
            family: DeviceFamily::OpticNew,
        };
        Arc::new(
            Directory::new(vec![
                device(2967, "10.0.0.1"),
                device(2968, "10.0.0.2"),
                device(2969, "10.0.0.3"),
            ])
            .unwrap(),
        )
    }

    fn collector(connector: &MockConnector, dir: &std::path::Path) -> Collector {
        let run_id: RunId = "20261016_101500_abc123".parse().unwrap();
        Collector::new(
            Arc::new(connector.clone()),
            directory(),
            ModuleCredentials {
                login: "user".into(),
                password: "pw".into(),
                root_password: Some("root".into()),
            },
            CollectorHost {
                login: "pi".into(),
                password: "raspberry".into(),
                host: "192.168.90.102".into(),
                path: "/home/pi/link_test".into(),
            },
            ClockLog::new(dir, run_id),
            9,
        )
    }

    #[test]
    fn pool_size_is_clamped() {
        assert_eq!(clamp_pool_size(0), 2);
        assert_eq!(clamp_pool_size(3), 3);
        assert_eq!(clamp_pool_size(64), 5);
    }

    #[test]
    fn setup_script_names_run_file() {
        let cmds = setup_commands("2967_clock_x.csv");
        assert!(cmds[3].starts_with("printf '#!/bin/sh -e\\nmount -o rw,remount /\\n"));
        assert!(cmds[3].contains("clk_ctl.py -f 2967_clock_x.csv"));
        assert!(cmds[3].ends_with(">> /etc/rc.local"));
        assert_eq!(cmds.last().unwrap(), "reboot");
    }

    #[tokio::test]
    async fn prepare_reaches_every_module() {
        let dir = tempfile::tempdir().unwrap();
        let mock = MockConnector::new();
        mock.fail_next_open("10.0.0.2", ChannelError::Auth { host: "10.0.0.2".into() });
        let collector = collector(&mock, dir.path());
        assert_eq!(collector.pool_size(), 5);

        let summary = collector.prepare_modules().await;

        assert_eq!(
            summary.succeeded,
            vec![SerialNumber::new(2967), SerialNumber::new(2969)]
        );
        assert_eq!(summary.failed.len(), 1);
        assert!(mock
            .sent("10.0.0.1")
            .iter()
            .any(|c| c.contains("2967_clock_20261016_101500_abc123.csv")));
    }

    #[tokio::test]
    async fn snapshot_appends_to_each_device_file() {
        let dir = tempfile::tempdir().unwrap();
        let mock = MockConnector::new();
        mock.queue_output("10.0.0.1", "CNT 0: 11\nCNT 1: 12\n");
        mock.queue_output("10.0.0.2", "CNT 0: 21\nCNT 1: 22\n");
        mock.queue_output("10.0.0.3", "clk_ctl.py: not found\n");
        let collector = collector(&mock, dir.path());

        collector.create_clock_files().await;
        let summary = collector.snapshot_clocks(1).await;

        assert_eq!(summary.succeeded.len(), 2);
        assert!(matches!(summary.failed[0].1, CollectError::NoCounters));

        let samples = collector.clocks().read(SerialNumber::new(2968)).await.unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!((samples[0].counter_a, samples[0].counter_b), (21, 22));
        assert!(collector
            .clocks()
            .read(SerialNumber::new(2969))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn retrieval_answers_host_key_prompt() {
        let dir = tempfile::tempdir().unwrap();
        let mock = MockConnector::new();
        mock.queue_output("10.0.0.1", "Are you sure you want to continue connecting (yes/no)?");
        let collector = collector(&mock, dir.path());

        let summary = collector.retrieve_files().await;

        assert_eq!(summary.succeeded.len(), 3);
        assert_eq!(
            mock.sent("10.0.0.1"),
            vec![
                "scp /home/user/*.csv pi@192.168.90.102:/home/pi/link_test",
                "yes",
                "raspberry"
            ]
        );
        assert_eq!(mock.sent("10.0.0.2")[1], "raspberry");
        assert_eq!(mock.closed_sessions("10.0.0.3"), 1);
    }

    #[tokio::test]
    async fn retrieval_closes_session_when_scp_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mock = MockConnector::new();
        mock.fail_next_run(
            "10.0.0.2",
            ChannelError::Io {
                host: "10.0.0.2".into(),
                detail: "broken pipe".into(),
            },
        );
        let collector = collector(&mock, dir.path());

        let summary = collector.retrieve_files().await;

        assert_eq!(summary.succeeded.len(), 2);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].0, SerialNumber::new(2968));
        assert_eq!(mock.opened_sessions("10.0.0.2"), 1);
        assert_eq!(mock.closed_sessions("10.0.0.2"), 1);
    }
}
