//! Usage and exit-code contract of the `m720-link` binary.

use assert_cmd::Command;
use predicates::prelude::*;

fn m720_link() -> Command {
    Command::cargo_bin("m720-link").unwrap()
}

#[test]
fn help_lists_variants() {
    m720_link()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--shutdown"))
        .stdout(predicate::str::contains("--power"));
}

#[test]
fn no_arguments_prints_usage() {
    m720_link()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn missing_variant_is_a_usage_error() {
    m720_link()
        .args(["--type", "optic"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("required"));
}

#[test]
fn two_variants_are_rejected() {
    m720_link()
        .args(["--type", "optic", "--reboot", "--manual"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot be used with"));
}

#[test]
fn unknown_module_kind_is_rejected() {
    m720_link()
        .args(["--type", "fiber", "--reboot"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid value"));
}

#[test]
fn missing_config_fails_before_running() {
    let dir = tempfile::tempdir().unwrap();
    m720_link()
        .current_dir(dir.path())
        .args(["--type", "copper", "--shutdown"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to read config file"));
}

#[test]
fn empty_fleet_fails_with_message() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("link-test.toml");
    std::fs::write(
        &config,
        "[switches.far]\nhost = \"127.0.0.1\"\nlogin = \"admin\"\npassword = \"admin\"\n",
    )
    .unwrap();

    m720_link()
        .args(["--type", "optic", "--reboot", "--config"])
        .arg(&config)
        .arg("--output-dir")
        .arg(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("no optic devices configured"));
}
