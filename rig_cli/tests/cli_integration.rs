use assert_cmd::prelude::*;
use predicates::prelude::*;
use rstest::rstest;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::process::Command;
use tempfile::tempdir;

const VALID: &str = r#"
[[motor]]
primary_pin = 12
primary_channel = 0
topology = "brushless"

[[motor]]
primary_pin = 13
primary_channel = 1
topology = "brushless"

[server]
bind = "127.0.0.1:0"
"#;

fn write_config(dir: &tempfile::TempDir, body: &str) -> PathBuf {
    let path = dir.path().join("cfg.toml");
    fs::write(&path, body).unwrap();
    path
}

#[rstest]
#[case(&["--help"], 0, "Usage:", "stdout")]
#[case(&["self-check"], 0, "self-check ok", "stdout")]
#[case(&["serve", "--bind"], 2, "value is required", "stderr")]
#[case(&["frobnicate"], 2, "unrecognized subcommand", "stderr")]
fn cli_table_cases(
    #[case] args: &[&str],
    #[case] exit_code: i32,
    #[case] needle: &str,
    #[case] stream: &str,
) {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, VALID);

    let mut cmd = Command::cargo_bin("rig_cli").unwrap();
    // Always include a valid config to avoid relying on default path
    cmd.arg("--config").arg(&cfg);
    for a in args {
        cmd.arg(a);
    }

    let assert = cmd.assert().code(exit_code);
    match stream {
        "stdout" => {
            assert.stdout(predicate::str::contains(needle));
        }
        "stderr" => {
            assert.stderr(predicate::str::contains(needle));
        }
        other => panic!("unknown stream: {other}"),
    }
}

#[rstest]
fn self_check_json_reports_idle_bus() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, VALID);

    let out = Command::cargo_bin("rig_cli")
        .unwrap()
        .args(["--json", "--log-level", "error", "--config"])
        .arg(&cfg)
        .arg("self-check")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let stdout = String::from_utf8_lossy(&out);
    let line = stdout.lines().last().unwrap_or("");
    let v: serde_json::Value = serde_json::from_str(line).expect("valid JSON");
    assert_eq!(v["ok"], true);
    let voltage = v["voltage"].as_f64().unwrap();
    assert!((voltage - 12.0).abs() < 0.05, "voltage {voltage}");
    assert!(v["force"].as_f64().is_some());
}

#[rstest]
#[case(
    "[[motor]]\nprimary_pin = 12\nprimary_channel = 0\ntopology = \"brushless\"\n".to_string(),
    "exactly two"
)]
#[case(VALID.replacen("\"brushless\"", "\"stepper\"", 1), "not recognized")]
#[case(format!("{VALID}\n[batch]\ncapacity = 0\n"), "capacity must be >= 1")]
fn invalid_config_is_explained(#[case] body: String, #[case] needle: &str) {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, &body);

    Command::cargo_bin("rig_cli")
        .unwrap()
        .arg("--config")
        .arg(&cfg)
        .arg("self-check")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Configuration is invalid"))
        .stderr(predicate::str::contains(needle));
}

#[rstest]
fn missing_config_file_fails() {
    let dir = tempdir().unwrap();
    Command::cargo_bin("rig_cli")
        .unwrap()
        .arg("--config")
        .arg(dir.path().join("nope.toml"))
        .arg("self-check")
        .assert()
        .failure()
        .stderr(predicate::str::contains("read config file"));
}

#[rstest]
fn cli_reports_bad_calibration_header() {
    let dir = tempdir().unwrap();

    let bad_csv = dir.path().join("calib.csv");
    let mut f = fs::File::create(&bad_csv).unwrap();
    writeln!(f, "raw,value").unwrap();
    writeln!(f, "100,0.0").unwrap();
    writeln!(f, "200,1.0").unwrap();

    let body = format!(
        "{VALID}\n[load_cell]\ncalibration_csv = {:?}\n",
        bad_csv.display().to_string()
    );
    let cfg = write_config(&dir, &body);

    Command::cargo_bin("rig_cli")
        .unwrap()
        .arg("--config")
        .arg(&cfg)
        .arg("self-check")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid headers"));
}

#[rstest]
fn json_errors_are_structured() {
    let dir = tempdir().unwrap();
    let cfg = write_config(
        &dir,
        "[[motor]]\nprimary_pin = 1\nprimary_channel = 0\ntopology = \"dc\"\n",
    );

    let out = Command::cargo_bin("rig_cli")
        .unwrap()
        .arg("--json")
        .arg("--config")
        .arg(&cfg)
        .arg("self-check")
        .assert()
        .failure()
        .get_output()
        .stderr
        .clone();
    let stderr = String::from_utf8_lossy(&out);
    let line = stderr.lines().last().unwrap_or("");
    let v: serde_json::Value = serde_json::from_str(line).expect("valid JSON error");
    assert_eq!(v["reason"], "Error");
    assert!(v["message"].as_str().unwrap().contains("exactly two"));
}
