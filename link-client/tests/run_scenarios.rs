//! End-to-end runs against mocked switches, modules and probes.
//!
//! Every wait is zero and the relay points at a closed port, so these run
//! in milliseconds without hardware.

use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use m720_link_client as link_client;
use link_client::{
    ChannelKind, CollectorHost, Disruption, Endpoint, Manual, MockConnector, MockProber,
    ModuleCredentials, OperatorSignal, Orchestrator, PowerCycle, Reboot, RelayClient, RunContext,
    RunError, RunSettings, Shutdown, ShutdownSettings,
};
use link_core::{Directory, PowerTest, Variant};
use link_types::{Device, DeviceFamily, ModuleKind, SerialNumber};
use tempfile::TempDir;
use tokio::sync::mpsc;

const IP: &str = "10.0.0.1";

fn switch(host: &str) -> Endpoint {
    Endpoint {
        host: host.into(),
        login: "admin".into(),
        password: "pw".into(),
        elevation_secret: None,
        kind: ChannelKind::SwitchCli,
    }
}

fn fleet() -> Directory {
    Directory::new(vec![Device {
        serial_number: SerialNumber::new(101),
        ip_address: IP.parse().unwrap(),
        switch_port: "1/0/1".into(),
        near_port: Some("1/0/11".into()),
        family: DeviceFamily::OpticNew,
    }])
    .unwrap()
}

fn context(prober: &MockProber, connector: &MockConnector, dir: &Path) -> RunContext {
    RunContext {
        directory: fleet(),
        prober: Arc::new(prober.clone()),
        connector: Arc::new(connector.clone()),
        far_switch: switch("far"),
        near_switch: Some(switch("near")),
        modules: ModuleCredentials {
            login: "user".into(),
            password: "user".into(),
            root_password: Some("root".into()),
        },
        collector_host: CollectorHost {
            login: "lab".into(),
            password: "lab".into(),
            host: "10.0.0.250".into(),
            path: dir.display().to_string(),
        },
    }
}

fn settings(variant: Variant, minutes: u32, dir: &Path) -> RunSettings {
    let mut settings = RunSettings::new(variant, ModuleKind::Optic, minutes, dir, "sw_far");
    settings.setup_boot_wait = Duration::ZERO;
    settings
}

fn quick_shutdown(connector: &MockConnector) -> Box<dyn Disruption> {
    Box::new(Shutdown::new(
        Arc::new(connector.clone()),
        switch("far"),
        ShutdownSettings {
            interface_range: "1/0/1".into(),
            settle: Duration::ZERO,
        },
    ))
}

fn dead_relay(relay_number: u8) -> Box<dyn Disruption> {
    let client = RelayClient::new("http://127.0.0.1:1", Duration::from_secs(2)).unwrap();
    Box::new(PowerCycle::new(
        client,
        relay_number,
        Duration::ZERO,
        Duration::ZERO,
    ))
}

/// Terminated rows of a file, split into fields.
fn rows(path: &Path) -> Vec<Vec<String>> {
    let text = std::fs::read_to_string(path).unwrap();
    text.split('\r')
        .filter(|row| !row.is_empty())
        .map(|row| row.split(';').map(str::to_string).collect())
        .collect()
}

/// Queue the switch exchanges of one verified shutdown cycle, followed by
/// the observer's link-state query.
fn queue_shutdown_cycle(connector: &MockConnector, observed: &str) {
    connector.queue_output("far", "");
    connector.queue_output("far", "1/0/1  Down\n");
    connector.queue_output("far", "");
    connector.queue_output("far", observed);
}

#[tokio::test]
async fn down_port_overrides_reachability() {
    let dir = TempDir::new().unwrap();
    let prober = MockProber::new();
    let connector = MockConnector::new();
    queue_shutdown_cycle(&connector, "1/0/1  Up\n");
    queue_shutdown_cycle(&connector, "1/0/1  Down\n");

    let orchestrator = Orchestrator::new(
        settings(Variant::Shutdown, 6, dir.path()),
        context(&prober, &connector, dir.path()),
        quick_shutdown(&connector),
    );
    let report = orchestrator.run().await.unwrap();

    assert_eq!(report.cycles, 2);
    assert_eq!(report.failed_actions, 0);

    let results = rows(&report.result_file);
    assert_eq!(results.len(), 3);
    assert_eq!(results[1][0], "1");
    assert_eq!(results[1][1], "101");
    assert_eq!(results[1][5], "");
    assert_eq!(results[1][6], "ok");
    assert_eq!(results[2][5], "1/0/1");

    let total = rows(&report.total_file);
    assert_eq!(total.len(), 4);
    assert_eq!(total[0][1], "101");
    assert_eq!(total[2][0], "1");
    assert_eq!(total[2][5], "reachable");
    assert_eq!(total[3][0], "2");
    assert_eq!(total[3][4], "1/0/1");
    assert_eq!(total[3][5], "down");
}

#[tokio::test]
async fn unverified_shutdown_is_annotated_and_run_continues() {
    let dir = TempDir::new().unwrap();
    let prober = MockProber::new();
    let connector = MockConnector::new();
    connector.queue_output("far", "");
    connector.queue_output("far", "1/0/1  Up\n");
    connector.queue_output("far", "");
    connector.queue_output("far", "1/0/1  Up\n");
    queue_shutdown_cycle(&connector, "1/0/1  Up\n");

    let report = Orchestrator::new(
        settings(Variant::Shutdown, 6, dir.path()),
        context(&prober, &connector, dir.path()),
        quick_shutdown(&connector),
    )
    .run()
    .await
    .unwrap();

    assert_eq!(report.cycles, 2);
    assert_eq!(report.failed_actions, 1);

    let results = rows(&report.result_file);
    assert_eq!(results[1][6], "failed: still up: 1/0/1");
    assert_eq!(results[2][6], "ok");

    let sent = connector.sent("far");
    assert!(sent.iter().filter(|c| *c == "no shutdown").count() == 2);
}

#[tokio::test]
async fn cycles_are_recorded_without_gaps() {
    let dir = TempDir::new().unwrap();
    let prober = MockProber::new();
    let ip: IpAddr = IP.parse().unwrap();
    prober.queue_down([]);
    prober.queue_down([]);
    prober.queue_down([ip]);
    let connector = MockConnector::new();

    let report = Orchestrator::new(
        settings(Variant::Reboot, 20, dir.path()),
        context(&prober, &connector, dir.path()),
        Box::new(Reboot::new(Arc::new(connector.clone()), switch("far"))),
    )
    .run()
    .await
    .unwrap();

    assert_eq!(report.cycles, 5);
    let indices: Vec<String> = rows(&report.result_file)
        .into_iter()
        .skip(1)
        .map(|row| row[0].clone())
        .collect();
    assert_eq!(indices, ["1", "2", "3", "4", "5"]);

    let total = rows(&report.total_file);
    assert_eq!(total[3][5], "unreachable");
    assert_eq!(total[4][5], "reachable");

    assert_eq!(connector.opened_sessions("far"), 5);
    assert_eq!(connector.opened_sessions("near"), 0);
    assert_eq!(prober.call_count(), 6);
}

#[tokio::test]
async fn unreachable_fleet_aborts_before_first_cycle() {
    let dir = TempDir::new().unwrap();
    let prober = MockProber::new();
    let ip: IpAddr = IP.parse().unwrap();
    prober.set_down(ip);
    let connector = MockConnector::new();

    let err = Orchestrator::new(
        settings(Variant::Reboot, 20, dir.path()),
        context(&prober, &connector, dir.path()),
        Box::new(Reboot::new(Arc::new(connector.clone()), switch("far"))),
    )
    .run()
    .await
    .unwrap_err();

    match err {
        RunError::Unreachable(ips) => assert_eq!(ips, vec![ip]),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(connector.opened_sessions("far"), 0);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn short_duration_still_produces_both_files() {
    let dir = TempDir::new().unwrap();
    let prober = MockProber::new();
    let connector = MockConnector::new();

    let report = Orchestrator::new(
        settings(Variant::Shutdown, 2, dir.path()),
        context(&prober, &connector, dir.path()),
        quick_shutdown(&connector),
    )
    .run()
    .await
    .unwrap();

    assert_eq!(report.cycles, 0);
    assert_eq!(rows(&report.result_file).len(), 1);
    assert_eq!(rows(&report.total_file).len(), 2);
    assert!(connector.sent("far").is_empty());
}

#[tokio::test]
async fn dead_relay_is_recorded_per_cycle() {
    let dir = TempDir::new().unwrap();
    let prober = MockProber::new();
    let connector = MockConnector::new();

    let report = Orchestrator::new(
        settings(Variant::Power(PowerTest::One), 8, dir.path()),
        context(&prober, &connector, dir.path()),
        dead_relay(1),
    )
    .run()
    .await
    .unwrap();

    assert_eq!(report.cycles, 2);
    assert_eq!(report.failed_actions, 2);
    for row in rows(&report.result_file).iter().skip(1) {
        assert!(row[6].starts_with("failed: "), "action field: {}", row[6]);
    }

    let module = connector.sent(IP);
    assert!(module.iter().any(|c| c.starts_with("printf")));
    assert!(module.iter().any(|c| c.starts_with("scp /home/user/*.csv")));

    // No clock file was copied back, so the counter cells stay blank.
    let total = rows(&report.total_file);
    assert_eq!(total[2][2], "");
    assert_eq!(total[2][3], "");
    assert_eq!(total[2][5], "reachable");
}

#[tokio::test]
async fn clock_snapshots_join_the_correlated_table() {
    let dir = TempDir::new().unwrap();
    let prober = MockProber::new();
    let connector = MockConnector::new();
    connector.queue_output("far", "1/0/1  Up\n");
    connector.queue_output("near", "1/0/11  Down\n");
    connector.queue_output(IP, "CNT 0: 11\nCNT 1: 12\n");

    let report = Orchestrator::new(
        settings(Variant::Power(PowerTest::Three), 4, dir.path()),
        context(&prober, &connector, dir.path()),
        dead_relay(2),
    )
    .run()
    .await
    .unwrap();

    assert_eq!(report.cycles, 1);
    let total = rows(&report.total_file);
    let titles = &total[1];
    assert_eq!(titles.len(), 7);
    assert_eq!(titles[5], "Down intf port a");

    let row = &total[2];
    assert_eq!(row[2], "11");
    assert_eq!(row[3], "12");
    assert_eq!(row[4], "");
    assert_eq!(row[5], "1/0/11");
    assert_eq!(row[6], "down");
}

#[tokio::test]
async fn operator_ends_manual_run() {
    let dir = TempDir::new().unwrap();
    let prober = MockProber::new();
    let connector = MockConnector::new();
    let (tx, rx) = mpsc::channel(4);
    tx.send(OperatorSignal::Continue).await.unwrap();
    tx.send(OperatorSignal::Continue).await.unwrap();
    tx.send(OperatorSignal::End).await.unwrap();

    let report = Orchestrator::new(
        settings(Variant::Manual, 0, dir.path()),
        context(&prober, &connector, dir.path()),
        Box::new(Manual::new(rx)),
    )
    .run()
    .await
    .unwrap();

    assert_eq!(report.cycles, 2);
    assert_eq!(rows(&report.result_file).len(), 3);
    assert_eq!(rows(&report.total_file).len(), 4);
    assert_eq!(connector.opened_sessions("far"), 2);
    assert_eq!(connector.opened_sessions("near"), 2);
}
