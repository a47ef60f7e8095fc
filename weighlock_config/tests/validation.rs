use rstest::rstest;
use weighlock_config::{Pacing, RetryPolicy, load_toml};

const PINS: &str = r#"
[pins]
hx711_dt = 2
hx711_sck = 3
led_red = 17
led_green = 27
led_blue = 22
button = 5
latch = 6
"#;

fn with_pins(extra: &str) -> String {
    format!("{PINS}\n{extra}")
}

#[test]
fn minimal_config_uses_defaults() {
    let cfg = load_toml(&with_pins("")).expect("parse TOML");
    cfg.validate().expect("defaults should validate");
    assert!(cfg.pins.led_common_anode);
    assert_eq!(cfg.scale.window, 10);
    assert_eq!(cfg.scale.tare_samples, 50);
    assert_eq!(cfg.latch.max_pulse_ms, 100);
    assert_eq!(cfg.session.retry_policy, RetryPolicy::Rearm);
    assert_eq!(cfg.session.wait_timeout_ms, None);
    assert_eq!(cfg.animation.pacing, Pacing::WallClock);
}

#[test]
fn full_config_parses() {
    let toml = with_pins(
        r#"
[scale]
scale_factor = 5895.655
window = 5
tare_samples = 80
target_samples = 80
burst_samples = 4
idle_threshold = 20.0

[stability]
equilibrium = 0.5
changing = 2.0
tolerance = 15.0
settle_timeout_ms = 30000

[animation]
period_ms = 2000
frame_ms = 20
max_brightness = 60
pacing = "frames"

[latch]
pulse_ms = 90
rerelease_interval_ms = 5000

[reject]
flashes = 5

[colors]
rejected = [200, 10, 10]

[session]
retry_policy = "terminate"
wait_timeout_ms = 60000
button_active_high = false
"#,
    );
    let cfg = load_toml(&toml).expect("parse TOML");
    cfg.validate().expect("valid config should pass");
    assert_eq!(cfg.session.retry_policy, RetryPolicy::Terminate);
    assert_eq!(cfg.animation.pacing, Pacing::Frames);
    assert_eq!(cfg.colors.rejected, [200, 10, 10]);
    assert_eq!(cfg.colors.unlocked, [0, 255, 0]);
    assert_eq!(cfg.reject.on_ms, 250);
}

#[test]
fn missing_pins_is_a_parse_error() {
    assert!(load_toml("[scale]\nwindow = 3\n").is_err());
}

#[test]
fn unknown_retry_policy_is_a_parse_error() {
    assert!(load_toml(&with_pins("[session]\nretry_policy = \"sometimes\"\n")).is_err());
}

#[rstest]
#[case("[scale]\nscale_factor = 0.0\n", "scale_factor")]
#[case("[scale]\nwindow = 0\n", "scale.window must be >= 1")]
#[case("[scale]\nburst_samples = 0\n", "scale.burst_samples")]
#[case("[scale]\ngain_pulses = 4\n", "gain_pulses")]
#[case("[scale]\nidle_threshold = -1.0\n", "idle_threshold")]
#[case("[stability]\nequilibrium = 1.0\nchanging = 1.0\n", "greater than")]
#[case("[stability]\ntolerance = -0.1\n", "tolerance")]
#[case("[animation]\nperiod_ms = 0\n", "period_ms")]
#[case("[animation]\nmax_brightness = 101\n", "max_brightness")]
#[case("[latch]\nmax_pulse_ms = 150\n", "max_pulse_ms")]
#[case("[latch]\npulse_ms = 100\nmax_pulse_ms = 50\n", "pulse_ms")]
#[case("[session]\nwait_timeout_ms = 0\n", "wait_timeout_ms")]
#[case("[logging]\nrotation = \"weekly\"\n", "rotation")]
fn rejects_invalid_values(#[case] section: &str, #[case] needle: &str) {
    let cfg = load_toml(&with_pins(section)).expect("parse TOML");
    let err = cfg.validate().expect_err("should be rejected");
    let msg = format!("{err}");
    assert!(msg.contains(needle), "message {msg:?} lacks {needle:?}");
}
