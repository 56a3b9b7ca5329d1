use assert_cmd::prelude::*;
use predicates::prelude::*;
use rstest::rstest;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::{TempDir, tempdir};

const WAVE: &str = r#"{
  "name": "wave",
  "description": "two short moves",
  "speed": 1,
  "steps": [
    { "angles": [100, 90, 90, 90], "label": "out" },
    { "angles": [90, 90, 90, 90], "label": "back" }
  ]
}"#;

// Config pointing the store at the temp dir; the simulated arm needs nothing else
fn write_config(dir: &TempDir) -> PathBuf {
    let bundled = dir.path().join("bundled");
    let custom = dir.path().join("custom");
    fs::create_dir_all(&bundled).unwrap();
    fs::write(bundled.join("wave.json"), WAVE).unwrap();
    let toml = format!(
        r#"
[bridge]
mode = "simulated"

[store]
bundled_dir = "{}"
custom_dir = "{}"
"#,
        bundled.display().to_string().replace('\\', "/"),
        custom.display().to_string().replace('\\', "/"),
    );
    let path = dir.path().join("arm.toml");
    fs::write(&path, toml).unwrap();
    path
}

fn armctl(cfg: &Path) -> Command {
    let mut cmd = Command::cargo_bin("armctl").unwrap();
    cmd.arg("--config").arg(cfg).env_remove("RUST_LOG");
    cmd
}

fn json_lines(stdout: &[u8]) -> Vec<serde_json::Value> {
    String::from_utf8_lossy(stdout)
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l).unwrap())
        .collect()
}

#[rstest]
#[case(&["--help"], 0, "Usage:", "stdout")]
#[case(&["list"], 0, "wave", "stdout")]
#[case(&["show", "wave"], 0, "\"label\": \"out\"", "stdout")]
#[case(&["show", "nope"], 1, "armctl list", "stderr")]
#[case(&["jog", "1,2,3"], 5, "Invalid pose", "stderr")]
#[case(&["predict", "--to", "100,90,90,90", "--at", "75"], 0, "[95, 90, 90, 90]", "stdout")]
#[case(&["health"], 0, "bridge=simulated", "stdout")]
fn cli_table_cases(
    #[case] args: &[&str],
    #[case] exit_code: i32,
    #[case] needle: &str,
    #[case] stream: &str,
) {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir);
    let out = armctl(&cfg).args(args).output().unwrap();

    assert_eq!(out.status.code(), Some(exit_code), "args {args:?}: {out:?}");
    let text = if stream == "stdout" {
        String::from_utf8_lossy(&out.stdout).to_string()
    } else {
        String::from_utf8_lossy(&out.stderr).to_string()
    };
    assert!(text.contains(needle), "missing {needle:?} in {stream}: {text}");
}

#[test]
fn run_streams_json_events_and_completes() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir);
    let out = armctl(&cfg)
        .args(["--json", "run", "wave", "--simulated"])
        .output()
        .unwrap();
    assert!(out.status.success(), "{out:?}");

    let lines = json_lines(&out.stdout);
    assert_eq!(lines[0]["type"], "state");
    assert_eq!(lines[0]["state"], "running");
    assert_eq!(lines[0]["test"], "wave");
    assert!(lines.iter().any(|l| l["type"] == "predicted_angles"));
    assert_eq!(
        lines.iter().filter(|l| l["type"] == "step_complete").count(),
        2
    );

    let last = lines.last().unwrap();
    assert_eq!(last["type"], "test_complete");
    assert_eq!(last["state"], "complete");
    let result = &last["results"][0];
    assert_eq!(result["test_name"], "wave");
    assert_eq!(result["steps"][0]["actual_end_angles"], serde_json::json!([100, 90, 90, 90]));
    assert_eq!(result["steps"][0]["planned_duration_ms"], 30);
    assert_eq!(result["range_coverage"]["servo1"], 5.6);
}

#[test]
fn run_repeat_override_records_each_repeat() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir);
    let out = armctl(&cfg)
        .args(["--json", "run", "wave", "--repeat", "2"])
        .output()
        .unwrap();
    assert!(out.status.success(), "{out:?}");
    let lines = json_lines(&out.stdout);
    let last = lines.last().unwrap();
    let results = last["results"].as_array().unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[1]["repeat_index"], 1);
    assert_eq!(results[0]["repeatability"], 0.0);
}

#[test]
fn zero_speed_override_is_invalid_input() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir);
    armctl(&cfg)
        .args(["--json", "run", "wave", "--speed", "0"])
        .assert()
        .code(5)
        .stdout(predicate::str::contains("\"reason\":\"InvalidDefinition\""));
}

#[test]
fn import_then_list_shows_custom_test() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir);
    let src = dir.path().join("reach.json");
    fs::write(
        &src,
        r#"{"name":"reach","steps":[{"angles":[90,120,60,90],"hold_ms":100}]}"#,
    )
    .unwrap();

    armctl(&cfg)
        .arg("import")
        .arg(&src)
        .assert()
        .success()
        .stdout(predicate::str::contains("imported reach"));
    assert!(dir.path().join("custom").join("reach.json").is_file());

    let out = armctl(&cfg).args(["--json", "list"]).output().unwrap();
    let listed: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    let ids: Vec<&str> = listed
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, ["wave", "reach"]);
    assert_eq!(listed[1]["source"], "custom");
}

#[test]
fn import_rejects_wrong_arity() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir);
    let src = dir.path().join("bad.json");
    fs::write(&src, r#"{"name":"bad","steps":[{"angles":[90,120,60]}]}"#).unwrap();

    armctl(&cfg).arg("import").arg(&src).assert().code(5);
    assert!(!dir.path().join("custom").join("bad.json").exists());
}

#[test]
fn predict_json_reports_duration() {
    let out = Command::cargo_bin("armctl")
        .unwrap()
        .args([
            "--config",
            "does-not-exist.toml",
            "--json",
            "predict",
            "--from",
            "90,90,90,90",
            "--to",
            "100,90,90,90",
            "--speed",
            "15",
        ])
        .output()
        .unwrap();
    assert!(out.status.success(), "{out:?}");
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(v["type"], "prediction");
    assert_eq!(v["total_ms"], 450);
    assert!(v["angles"].is_null());
}

#[test]
fn jog_moves_simulated_arm() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir);
    let out = armctl(&cfg)
        .args(["--json", "jog", "100,90,90,200", "--speed", "1"])
        .output()
        .unwrap();
    assert!(out.status.success(), "{out:?}");
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(v["before"], serde_json::json!([90, 90, 90, 90]));
    assert_eq!(v["after"], serde_json::json!([100, 90, 90, 170]));
}

#[test]
fn invalid_config_is_reported() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bad.toml");
    fs::write(&path, "[serial]\nbaud = 0\n").unwrap();
    armctl(&path)
        .arg("list")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Configuration is invalid"));
}

#[test]
fn malformed_config_is_reported() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bad.toml");
    fs::write(&path, "[serial\nport = ").unwrap();
    armctl(&path)
        .arg("list")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("could not be parsed"));
}
