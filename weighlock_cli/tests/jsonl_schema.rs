use assert_cmd::prelude::*;
use rstest::rstest;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use tempfile::tempdir;

fn write_valid_config(dir: &tempfile::TempDir) -> PathBuf {
    let toml = r#"
[pins]
hx711_dt = 5
hx711_sck = 6
led_red = 12
led_green = 13
led_blue = 19
button = 17
latch = 27

[scale]
window = 3
tare_samples = 5
target_samples = 5
burst_samples = 2
not_ready_backoff_ms = 1

[animation]
period_ms = 20
frame_ms = 2

[latch]
pulse_ms = 5
rerelease_interval_ms = 0

[reject]
flashes = 1
on_ms = 1
off_ms = 1

[session]
wait_timeout_ms = 500
"#;
    let path = dir.path().join("cfg.toml");
    fs::write(&path, toml).unwrap();
    path
}

fn run_json(cfg: &PathBuf, args: &[&str]) -> (Option<i32>, serde_json::Value) {
    let mut cmd = Command::cargo_bin("weighlock").unwrap();
    cmd.arg("--json")
        .arg("--log-level")
        .arg("error")
        .arg("--config")
        .arg(cfg)
        .args(args);
    let out = cmd.output().unwrap();
    let stdout = String::from_utf8_lossy(&out.stdout);
    let line = stdout
        .lines()
        .find(|l| l.starts_with('{'))
        .unwrap_or_else(|| panic!("no JSON line on stdout: {stdout}"));
    (out.status.code(), serde_json::from_str(line).expect("valid JSON"))
}

/// Validate the JSON schema of an unlocked session.
#[rstest]
fn json_unlocked_schema() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    let (code, v) = run_json(&cfg, &["run", "--rereleases", "2"]);
    assert_eq!(code, Some(0));

    assert!(v.get("timestamp").and_then(|x| x.as_u64()).is_some());
    assert!(v.get("duration_ms").and_then(|x| x.as_u64()).is_some());
    assert_eq!(v["backend"], "sim");
    assert_eq!(v["outcome"], "unlocked");
    assert_eq!(v["matched"], true);
    for key in ["measured", "target", "tolerance"] {
        assert!(v.get(key).and_then(|x| x.as_f64()).is_some(), "{key} should be a number");
    }
    assert_eq!(v["rejections"], 0);
    // First release plus two re-releases (no rate limit configured)
    assert_eq!(v["latch_releases"], 3);
}

/// A rejection under the terminate policy is a normal outcome with its own exit code.
#[rstest]
fn json_rejected_schema() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    let (code, v) = run_json(
        &cfg,
        &["run", "--sim-weight", "50", "--retry-policy", "terminate"],
    );
    assert_eq!(code, Some(5));
    assert_eq!(v["outcome"], "rejected");
    assert_eq!(v["matched"], false);
    assert_eq!(v["rejections"], 1);
    assert_eq!(v["latch_releases"], 0);
    let measured = v["measured"].as_f64().unwrap();
    assert!((measured - 50.0).abs() < 1e-9);
}

/// Errors in JSON mode carry a reason, details for timeouts, and the human message.
#[rstest]
fn json_timeout_error_schema() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    let (code, v) = run_json(&cfg, &["run", "--sim-weight", "50", "--wait-timeout-ms", "50"]);
    assert_eq!(code, Some(3));
    assert_eq!(v["reason"], "Timeout");
    assert_eq!(v["details"]["waiting_for"], "object on scale");
    let msg = v["message"].as_str().unwrap_or("");
    assert!(msg.starts_with("What happened:"), "{msg}");
}
