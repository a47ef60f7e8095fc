use assert_cmd::prelude::*;
use predicates::prelude::*;
use rstest::rstest;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::process::Command;
use tempfile::tempdir;

// Minimal valid config for the sim backend, with short timings so a run takes milliseconds
fn write_valid_config(dir: &tempfile::TempDir) -> PathBuf {
    let toml = r#"
[pins]
# pins are unused in sim backend but must be present
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
idle_threshold = 5.0
not_ready_backoff_ms = 1

[animation]
period_ms = 20
frame_ms = 2

[latch]
pulse_ms = 5
rerelease_interval_ms = 0

[reject]
flashes = 2
on_ms = 1
off_ms = 1

[session]
wait_timeout_ms = 500
"#;
    let path = dir.path().join("cfg.toml");
    fs::write(&path, toml).unwrap();
    path
}

#[rstest]
#[case(&["--help"], 0, "Usage:", "stdout")]
#[case(&["run"], 0, "Unlocked", "stdout")]
#[case(&["run", "--sim-weight", "104"], 0, "Unlocked", "stdout")]
#[case(&["run", "--sim-weight", "40", "--retry-policy", "terminate"], 5, "Rejected", "stdout")]
#[case(&["run", "--sim-weight", "40", "--sim-weight", "100"], 0, "Unlocked", "stdout")]
#[case(&["run", "--sim-weight", "40"], 3, "object on scale", "stderr")]
#[case(&["run", "--retry-policy", "sometimes"], 2, "invalid value", "stderr")]
#[case(&["self-check"], 0, "self-check ok", "stdout")]
#[case(&["health"], 0, "\"status\":\"ok\"", "stdout")]
fn cli_table_cases(
    #[case] args: &[&str],
    #[case] exit_code: i32,
    #[case] needle: &str,
    #[case] stream: &str,
) {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    let mut cmd = Command::cargo_bin("weighlock").unwrap();

    // Always include a valid config to avoid relying on default path
    cmd.arg("--config").arg(&cfg).arg("--log-level").arg("warn");
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
fn cli_reports_bad_calibration_header() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    let bad_csv = dir.path().join("calib.csv");
    let mut f = fs::File::create(&bad_csv).unwrap();
    writeln!(f, "raw,grams").unwrap();
    writeln!(f, "100,0.0").unwrap();
    writeln!(f, "200,1.0").unwrap();

    let mut cmd = Command::cargo_bin("weighlock").unwrap();
    cmd.arg("--config")
        .arg(&cfg)
        .arg("--calibration")
        .arg(&bad_csv)
        .arg("self-check");

    cmd.assert()
        .code(1)
        .stderr(predicate::str::contains("Invalid headers"));
}

#[rstest]
fn calibration_csv_rescales_the_session() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    let csv = dir.path().join("calib.csv");
    fs::write(&csv, "weight,raw\n0,1000\n100,1250\n200,1500\n").unwrap();

    let mut cmd = Command::cargo_bin("weighlock").unwrap();
    cmd.arg("--json")
        .arg("--log-level")
        .arg("error")
        .arg("--config")
        .arg(&cfg)
        .arg("--calibration")
        .arg(&csv)
        .args(["run", "--sim-target", "30"]);

    let out = cmd.assert().success().get_output().stdout.clone();
    let v: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(v["outcome"], "unlocked");
    let measured = v["measured"].as_f64().unwrap();
    assert!((measured - 30.0).abs() < 0.5, "measured {measured}");
}

#[rstest]
#[case("window = 0", "scale.window must be >= 1")]
#[case("scale_factor = 0.0", "scale.scale_factor must be finite and non-zero")]
fn invalid_config_exits_1(#[case] line: &str, #[case] needle: &str) {
    let dir = tempdir().unwrap();
    let toml = format!(
        "[pins]\nhx711_dt = 5\nhx711_sck = 6\nled_red = 12\nled_green = 13\nled_blue = 19\n\
         button = 17\nlatch = 27\n\n[scale]\n{line}\n"
    );
    let cfg = dir.path().join("cfg.toml");
    fs::write(&cfg, toml).unwrap();

    let mut cmd = Command::cargo_bin("weighlock").unwrap();
    cmd.arg("--config").arg(&cfg).arg("run");
    cmd.assert()
        .code(1)
        .stderr(predicate::str::contains(needle));
}

#[rstest]
fn missing_pins_are_explained() {
    let dir = tempdir().unwrap();
    let cfg = dir.path().join("cfg.toml");
    fs::write(&cfg, "[scale]\nwindow = 3\n").unwrap();

    let mut cmd = Command::cargo_bin("weighlock").unwrap();
    cmd.arg("--config").arg(&cfg).arg("health");
    cmd.assert()
        .code(1)
        .stderr(predicate::str::contains("Configuration is invalid or incomplete"));
}
