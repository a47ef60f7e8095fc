//! Human-readable error descriptions, exit codes and structured JSON error formatting.

use weighlock_core::{BuildError, LockError};

/// Exit status of a session that ended with a rejected weight.
pub const EXIT_REJECTED: i32 = 5;
pub const EXIT_TIMEOUT: i32 = 3;
pub const EXIT_ABORTED: i32 = 4;

fn explain(what: &str, causes: &str, fix: &str) -> String {
    format!("What happened: {what}\nLikely causes: {causes}\nHow to fix: {fix}")
}

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    // Typed matches first
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingSampleSource => explain(
                "No load cell was provided to the puzzle box.",
                "The HX711 failed to initialize or was not wired into the builder.",
                "Ensure the load cell is created and passed via with_sample_source(...).",
            ),
            BuildError::MissingIndicator => explain(
                "No indicator LED was provided to the puzzle box.",
                "The RGB LED failed to initialize or was not wired into the builder.",
                "Ensure the LED is created and passed via with_indicator(...).",
            ),
            BuildError::MissingTrigger => explain(
                "No button was provided to the puzzle box.",
                "The button pin failed to initialize or was not wired into the builder.",
                "Ensure the button is created and passed via with_trigger(...).",
            ),
            BuildError::MissingLatch => explain(
                "No latch line was provided to the puzzle box.",
                "The solenoid pin failed to initialize or was not wired into the builder.",
                "Ensure the latch line is created and passed via with_latch_line(...).",
            ),
            BuildError::InvalidConfig(msg) => explain(
                &format!("Invalid configuration ({msg})."),
                "Missing or out-of-range values in the TOML.",
                "Edit the config file, then rerun.",
            ),
        };
    }

    if let Some(le) = err.downcast_ref::<LockError>() {
        return match le {
            LockError::Timeout(what) if what.contains("load cell") => explain(
                &format!("Timed out waiting for {what}."),
                "HX711 not wired correctly, no power/ground, or timeout too low.",
                "Verify the DT/SCK pins and power; consider raising \
                 scale.data_ready_timeout_ms or session.wait_timeout_ms.",
            ),
            LockError::Timeout(what) => explain(
                &format!("Timed out waiting for {what}."),
                "Nobody pressed the button or placed an object before session.wait_timeout_ms.",
                "Raise session.wait_timeout_ms or remove it to wait indefinitely.",
            ),
            LockError::Aborted => explain(
                "The session was aborted.",
                "Ctrl-C or a supervisor requested shutdown.",
                "Start a new run; the latch was left de-energized.",
            ),
            LockError::HardwareFault(msg) | LockError::Hardware(msg) => explain(
                &format!("Hardware error ({msg})."),
                "Loose wiring, wrong pin numbers, or missing GPIO permissions.",
                "Check the [pins] section and the wiring, then rerun.",
            ),
            other => explain(
                &format!("{other}."),
                "See logs.",
                "Re-run with --log-level=debug or set RUST_LOG for more detail.",
            ),
        };
    }

    // String-based heuristics over the whole context chain (init, config, calibration)
    let msg = err
        .chain()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(": ");
    let lower = msg.to_ascii_lowercase();

    let opening_pins = ["open hx711", "open indicator", "open button", "open latch"];
    if opening_pins.iter().any(|p| lower.contains(p)) {
        return explain(
            "Failed to initialize hardware pins.",
            "Incorrect pin numbers or insufficient GPIO permissions.",
            "Fix the [pins] values in the config; ensure the process may access GPIO.",
        );
    }

    if lower.contains("parsing config") || lower.contains("missing field") {
        return explain(
            "Configuration is invalid or incomplete.",
            "Missing [pins] (hx711_dt, hx711_sck, led_*, button, latch) or malformed TOML.",
            "Edit the TOML config and try again.",
        );
    }

    // Calibration CSV header special-case
    if lower.contains("calibration csv must have headers") {
        return "Invalid headers in calibration CSV. Expected 'weight,raw'.".to_string();
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. \
         Original: {msg}"
    )
}

/// Stable exit codes: timeout 3, aborted 4, anything else 1 (rejection is 5, see main).
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    match err.downcast_ref::<LockError>() {
        Some(LockError::Timeout(_)) => EXIT_TIMEOUT,
        Some(LockError::Aborted) => EXIT_ABORTED,
        _ => 1,
    }
}

fn reason_name(err: &eyre::Report) -> &'static str {
    if err.downcast_ref::<BuildError>().is_some() {
        return "Build";
    }
    match err.downcast_ref::<LockError>() {
        Some(LockError::Hardware(_)) => "Hardware",
        Some(LockError::HardwareFault(_)) => "HardwareFault",
        Some(LockError::Config(_)) => "Config",
        Some(LockError::Timeout(_)) => "Timeout",
        Some(LockError::Aborted) => "Aborted",
        Some(LockError::State(_)) => "State",
        None => "Error",
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;

    let msg = humanize(err);
    let obj = match err.downcast_ref::<LockError>() {
        Some(LockError::Timeout(what)) => json!({
            "reason": reason_name(err),
            "details": { "waiting_for": what },
            "message": msg,
        }),
        _ => json!({ "reason": reason_name(err), "message": msg }),
    };
    obj.to_string()
}
