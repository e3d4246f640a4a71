//! # m720-link
//!
//! Runs one M720 link-recovery test against the lab rack.
//!
//! ## Example
//!
//! ```bash
//! # Shut the far switch's interface bank down every 3 minutes for 2 hours
//! m720-link --type optic --shutdown --duration-minutes 120
//!
//! # Power-cycle the near switch; modules snapshot their clocks each cycle
//! m720-link --config rack-b.toml --type copper --power 3
//!
//! # Re-seat modules by hand; press enter per cycle, type `end` to finish
//! m720-link --type optic --manual
//! ```

use anyhow::{Context, Result};
use clap::{ArgGroup, Parser, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use link_client::{
    for_variant, ActionDeps, Connector, OperatorSignal, Orchestrator, PingProber, ReconnectOnce,
    RunContext, RunSettings, SshConnector,
};
use link_core::{PowerTest, Variant};
use link_types::ModuleKind;

mod config;

use config::Config;

/// Run an M720 link-recovery test.
#[derive(Parser, Debug)]
#[command(name = "m720-link")]
#[command(version, about, long_about = None)]
#[command(group(
    ArgGroup::new("variant")
        .required(true)
        .args(["reboot", "shutdown", "power", "manual"])
))]
struct Cli {
    /// Configuration file
    #[arg(long, short, default_value = "link-test.toml")]
    config: PathBuf,

    /// Module kind under test
    #[arg(long = "type", value_enum)]
    kind: KindArg,

    /// Reload the far switch every cycle
    #[arg(long)]
    reboot: bool,

    /// Shut the far switch's interface bank down every cycle
    #[arg(long)]
    shutdown: bool,

    /// Power-cycle a switch through the relay (1: far, 2: far + near query, 3: near)
    #[arg(long, value_name = "TEST", value_parser = clap::value_parser!(u8).range(1..=3))]
    power: Option<u8>,

    /// Operator re-seats the modules by hand each cycle
    #[arg(long)]
    manual: bool,

    /// Total test duration, overriding the config file
    #[arg(long)]
    duration_minutes: Option<u32>,

    /// Output directory, overriding the config file
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Log level used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum KindArg {
    Optic,
    Copper,
}

impl From<KindArg> for ModuleKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Optic => ModuleKind::Optic,
            KindArg::Copper => ModuleKind::Copper,
        }
    }
}

impl Cli {
    fn variant(&self) -> Result<Variant> {
        let variant = match (self.reboot, self.shutdown, self.power, self.manual) {
            (true, _, _, _) => Variant::Reboot,
            (_, true, _, _) => Variant::Shutdown,
            (_, _, Some(1), _) => Variant::Power(PowerTest::One),
            (_, _, Some(2), _) => Variant::Power(PowerTest::Two),
            (_, _, Some(3), _) => Variant::Power(PowerTest::Three),
            (_, _, _, true) => Variant::Manual,
            _ => anyhow::bail!("Must select exactly one test variant"),
        };
        Ok(variant)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let config = Config::from_file(&cli.config)?;
    let variant = cli.variant()?;
    let kind = ModuleKind::from(cli.kind);

    let output_dir = prepare_output_dir(
        cli.output_dir
            .as_deref()
            .unwrap_or(config.run.output_dir.as_path()),
    )
    .await?;

    let directory = config
        .directory()
        .context("Invalid device list in config")?;
    let connector: Arc<dyn Connector> = Arc::new(ReconnectOnce::new(SshConnector::new(
        config.channel_settings(),
    )));

    let operator = match variant {
        Variant::Manual => Some(spawn_operator()),
        _ => None,
    };
    let action = for_variant(
        variant,
        ActionDeps {
            connector: Arc::clone(&connector),
            far_switch: config.far_switch(),
            relay: config.relay_config(),
            shutdown: config.shutdown_settings(),
            operator,
        },
    )
    .context("Failed to set up the test action")?;

    let mut settings = RunSettings::new(
        variant,
        kind,
        cli.duration_minutes.unwrap_or(config.run.duration_minutes),
        &output_dir,
        config.run.switch_name.clone(),
    );
    settings.pool_size = config.pool_size();

    let context = RunContext {
        directory,
        prober: Arc::new(PingProber::new(config.probe.count)),
        connector,
        far_switch: config.far_switch(),
        near_switch: config.near_switch(),
        modules: config.module_credentials(),
        collector_host: config.collector_host(&output_dir),
    };

    let report = Orchestrator::new(settings, context, action)
        .run()
        .await
        .context("Link test failed")?;

    println!("Run {}: {} cycles", report.run_id, report.cycles);
    if report.failed_actions > 0 {
        println!("  {} cycles with a failed action", report.failed_actions);
    }
    println!("  results:    {}", report.result_file.display());
    println!("  correlated: {}", report.total_file.display());
    Ok(())
}

/// Create the output directory and return its absolute path.
async fn prepare_output_dir(dir: &Path) -> Result<PathBuf> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Failed to create output directory {}", dir.display()))?;
    tokio::fs::canonicalize(dir)
        .await
        .with_context(|| format!("Failed to resolve output directory {}", dir.display()))
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Map one line of operator input to a signal.
///
/// An empty line confirms the modules are back; `end` stops the run.
/// Anything else is ignored.
fn operator_signal(line: &str) -> Option<OperatorSignal> {
    let line = line.trim();
    if line.is_empty() {
        Some(OperatorSignal::Continue)
    } else if line.eq_ignore_ascii_case("end") {
        Some(OperatorSignal::End)
    } else {
        None
    }
}

/// Forward stdin lines to the manual action. EOF ends the run.
fn spawn_operator() -> mpsc::Receiver<OperatorSignal> {
    let (tx, rx) = mpsc::channel(1);
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            let signal = match lines.next_line().await {
                Ok(Some(line)) => match operator_signal(&line) {
                    Some(signal) => signal,
                    None => {
                        tracing::warn!("ignoring {:?}: press enter to continue or type 'end'", line);
                        continue;
                    }
                },
                Ok(None) => OperatorSignal::End,
                Err(e) => {
                    tracing::warn!("stdin: {}", e);
                    OperatorSignal::End
                }
            };
            if tx.send(signal).await.is_err() || signal == OperatorSignal::End {
                break;
            }
        }
    });
    rx
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("m720-link").chain(args.iter().copied()))
    }

    #[test]
    fn selects_each_variant() {
        let cases = [
            (vec!["--reboot"], Variant::Reboot),
            (vec!["--shutdown"], Variant::Shutdown),
            (vec!["--power", "1"], Variant::Power(PowerTest::One)),
            (vec!["--power", "3"], Variant::Power(PowerTest::Three)),
            (vec!["--manual"], Variant::Manual),
        ];
        for (flags, expected) in cases {
            let mut args = vec!["--type", "optic"];
            args.extend(flags);
            let cli = parse(&args).unwrap();
            assert_eq!(cli.variant().unwrap(), expected);
        }
    }

    #[test]
    fn variant_and_kind_are_required() {
        assert!(parse(&["--type", "copper"]).is_err());
        assert!(parse(&["--reboot"]).is_err());
    }

    #[test]
    fn variants_are_exclusive() {
        assert!(parse(&["--type", "optic", "--reboot", "--shutdown"]).is_err());
        assert!(parse(&["--type", "optic", "--manual", "--power", "2"]).is_err());
    }

    #[test]
    fn power_test_number_is_bounded() {
        assert!(parse(&["--type", "optic", "--power", "0"]).is_err());
        assert!(parse(&["--type", "optic", "--power", "4"]).is_err());
    }

    #[test]
    fn overrides_parse() {
        let cli = parse(&[
            "--type",
            "copper",
            "--shutdown",
            "--duration-minutes",
            "90",
            "--output-dir",
            "/tmp/out",
            "-c",
            "rack.toml",
        ])
        .unwrap();
        assert_eq!(ModuleKind::from(cli.kind), ModuleKind::Copper);
        assert_eq!(cli.duration_minutes, Some(90));
        assert_eq!(cli.output_dir, Some(PathBuf::from("/tmp/out")));
        assert_eq!(cli.config, PathBuf::from("rack.toml"));
    }

    #[tokio::test]
    async fn output_dir_is_created_and_made_absolute() {
        let scratch = tempfile::tempdir_in(".").unwrap();
        let relative = scratch
            .path()
            .strip_prefix(std::env::current_dir().unwrap())
            .unwrap_or(scratch.path())
            .join("results");

        let resolved = prepare_output_dir(&relative).await.unwrap();

        assert!(resolved.is_absolute());
        assert!(resolved.is_dir());
        assert!(resolved.ends_with("results"));
    }

    #[test]
    fn operator_input() {
        assert_eq!(operator_signal(""), Some(OperatorSignal::Continue));
        assert_eq!(operator_signal("  \r"), Some(OperatorSignal::Continue));
        assert_eq!(operator_signal("end"), Some(OperatorSignal::End));
        assert_eq!(operator_signal("END\n"), Some(OperatorSignal::End));
        assert_eq!(operator_signal("next"), None);
    }
}
