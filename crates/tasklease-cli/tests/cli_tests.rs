//! Integration tests for the tasklease CLI

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use tempfile::TempDir;

type TestResult = Result<(), Box<dyn std::error::Error>>;

const FIRMWARE_REPORT: &str = "\
Task watchdog got triggered. The following tasks/users did not reset the watchdog in time:
 -
test_user
 (CPU 0)
";

fn tasklease() -> Result<Command, Box<dyn std::error::Error>> {
    Ok(Command::cargo_bin("tasklease")?)
}

fn write_file(dir: &TempDir, name: &str, contents: &str) -> Result<std::path::PathBuf, Box<dyn std::error::Error>> {
    let path = dir.path().join(name);
    fs::write(&path, contents)?;
    Ok(path)
}

#[test]
fn test_attribute_human_output() -> TestResult {
    let dir = TempDir::new()?;
    let report = write_file(&dir, "report.txt", FIRMWARE_REPORT)?;

    tasklease()?
        .arg("attribute")
        .arg(&report)
        .assert()
        .success()
        .stdout(predicate::str::contains("Attributed:"))
        .stdout(predicate::str::contains("test_user"));
    Ok(())
}

#[test]
fn test_attribute_json_output() -> TestResult {
    let dir = TempDir::new()?;
    let report = write_file(
        &dir,
        "report.txt",
        "E (5000) task_wdt: Task watchdog got triggered.\n - test_user (CPU 0)\n - test_2_user (CPU 1)\n",
    )?;

    let output = tasklease()?
        .args(["attribute", "--json"])
        .arg(&report)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let json: Value = serde_json::from_slice(&output)?;
    assert_eq!(json["success"], true);
    assert_eq!(json["attribution"]["captured"], true);
    assert_eq!(json["attribution"]["name"], "test_2_user");
    assert_eq!(
        json["attribution"]["names"],
        serde_json::json!(["test_user", "test_2_user"])
    );
    Ok(())
}

#[test]
fn test_attribute_report_without_units() -> TestResult {
    let dir = TempDir::new()?;
    let report = write_file(&dir, "report.txt", "CPU 0: IDLE\nCPU 1: IDLE\n")?;

    tasklease()?
        .arg("attribute")
        .arg(&report)
        .assert()
        .success()
        .stdout(predicate::str::contains("No unit could be attributed"));
    Ok(())
}

#[test]
fn test_attribute_missing_file_fails() -> TestResult {
    let dir = TempDir::new()?;

    tasklease()?
        .arg("attribute")
        .arg(dir.path().join("absent.txt"))
        .assert()
        .failure()
        .code(3)
        .stderr(predicate::str::contains("Error:"));
    Ok(())
}

#[test]
fn test_missing_file_json_error() -> TestResult {
    let dir = TempDir::new()?;

    let output = tasklease()?
        .args(["--json", "attribute"])
        .arg(dir.path().join("absent.txt"))
        .assert()
        .failure()
        .get_output()
        .stdout
        .clone();

    let json: Value = serde_json::from_slice(&output)?;
    assert_eq!(json["success"], false);
    assert_eq!(json["error"]["type"], "IoError");
    Ok(())
}

#[test]
fn test_config_prints_loadable_demo() -> TestResult {
    let output = tasklease()?
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("test_2_user"))
        .get_output()
        .stdout
        .clone();

    let yaml: serde_yaml::Value = serde_yaml::from_slice(&output)?;
    assert!(yaml.get("supervisor").is_some());
    assert!(yaml.get("units").is_some());
    Ok(())
}

#[test]
fn test_run_rejects_panic_on_expiry() -> TestResult {
    let dir = TempDir::new()?;
    let config = write_file(&dir, "demo.yaml", "supervisor:\n  panic_on_expiry: true\n")?;

    tasklease()?
        .args(["run", "--duration-secs", "1", "--config"])
        .arg(&config)
        .assert()
        .failure()
        .code(4);
    Ok(())
}

#[test]
fn test_run_rejects_malformed_yaml() -> TestResult {
    let dir = TempDir::new()?;
    let config = write_file(&dir, "demo.yaml", "units: [unterminated\n")?;

    tasklease()?
        .args(["run", "--config"])
        .arg(&config)
        .assert()
        .failure()
        .code(4);
    Ok(())
}

#[test]
fn test_run_recovers_stalled_unit() -> TestResult {
    let dir = TempDir::new()?;
    let config = write_file(
        &dir,
        "demo.yaml",
        "\
supervisor:
  timeout_ms: 200
  timer_tick_ms: 20
  cores: 1
recovery:
  actions:
    - unit: stalled
      sink: 4
      toggles: 2
      interval_ms: 10
units:
  - name: stalled
    tick_ms: 50
    schedule: R
    repeat: false
",
    )?;

    let output = tasklease()?
        .args(["--json", "run", "--duration-secs", "1", "--config"])
        .arg(&config)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let json: Value = serde_json::from_slice(&output)?;
    assert_eq!(json["success"], true);
    let cycles = json["metrics"]["cycles"].as_u64().ok_or("missing cycle count")?;
    assert!(cycles >= 1, "expected at least one recovery cycle, got {cycles}");
    assert_eq!(json["metrics"]["action_failures"], 0);
    Ok(())
}
