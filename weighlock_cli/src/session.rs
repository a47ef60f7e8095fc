//! Session assembly and execution: config mapping, backend wiring, outcome reporting.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::{Duration, Instant};

use eyre::WrapErr;
use weighlock_config::Config;
use weighlock_core::{
    AnimationCfg, Deadline, LatchCfg, Palette, PuzzleBox, PuzzleBoxBuilder, RejectCfg, Result,
    ScaleCfg, SessionCfg, SessionOutcome, StabilityCfg,
};
use weighlock_traits::{Clock, MonotonicClock, SampleSource};

/// Raw counts the simulated load cell reports with nothing on it.
#[cfg_attr(all(feature = "hardware", target_os = "linux"), allow(dead_code))]
const SIM_OFFSET: i32 = 8_000_000;
/// Gap between readiness polls during the self-check.
const READY_POLL: Duration = Duration::from_millis(1);

#[cfg(all(feature = "hardware", target_os = "linux"))]
pub const BACKEND: &str = "hardware";
#[cfg(not(all(feature = "hardware", target_os = "linux")))]
pub const BACKEND: &str = "sim";

/// Weights the simulator puts on the scale, in weight units.
#[derive(Debug, Clone)]
pub struct SimPlan {
    pub target: f64,
    /// One entry per verification attempt; the object is lifted after each.
    pub attempts: Vec<f64>,
    /// First load cell read fails with a data-ready timeout.
    pub fail_first_read: bool,
}

#[cfg_attr(all(feature = "hardware", target_os = "linux"), allow(dead_code))]
impl SimPlan {
    pub fn new(target: f64, attempts: Vec<f64>) -> Self {
        let attempts = if attempts.is_empty() {
            vec![target]
        } else {
            attempts
        };
        Self {
            target,
            attempts,
            fail_first_read: std::env::var_os("WEIGHLOCK_TEST_SIM_TIMEOUT").is_some(),
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn raw(weight: f64, scale_factor: f64) -> i32 {
        SIM_OFFSET.saturating_add((weight * scale_factor).round() as i32)
    }

    /// Raw sequence for one full session: tare, target, then per attempt one
    /// settled window followed by a lift. Afterwards the scale stays empty.
    pub fn raw_trace(&self, scale: &weighlock_config::ScaleCfg) -> Vec<i32> {
        let per_attempt = scale.burst_samples * scale.window;
        let mut trace = Vec::with_capacity(
            scale.tare_samples
                + scale.target_samples
                + self.attempts.len() * (per_attempt + scale.burst_samples),
        );
        trace.extend(std::iter::repeat_n(SIM_OFFSET, scale.tare_samples));
        trace.extend(std::iter::repeat_n(
            Self::raw(self.target, scale.scale_factor),
            scale.target_samples,
        ));
        for &w in &self.attempts {
            trace.extend(std::iter::repeat_n(Self::raw(w, scale.scale_factor), per_attempt));
            trace.extend(std::iter::repeat_n(SIM_OFFSET, scale.burst_samples));
        }
        trace
    }
}

#[derive(Debug, Clone)]
pub struct RunParams {
    pub rereleases: u32,
    pub sim: SimPlan,
}

/// Result of a completed session.
#[derive(Debug, Clone, Copy)]
pub struct SessionReport {
    pub outcome: SessionOutcome,
    pub rejections: u32,
    pub latch_releases: u32,
    pub duration: Duration,
}

impl SessionReport {
    pub fn is_rejected(&self) -> bool {
        matches!(self.outcome, SessionOutcome::Rejected(_))
    }

    pub fn to_json(&self) -> serde_json::Value {
        let (name, v) = match self.outcome {
            SessionOutcome::Unlocked(v) => ("unlocked", v),
            SessionOutcome::Rejected(v) => ("rejected", v),
        };
        let timestamp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        serde_json::json!({
            "timestamp": timestamp,
            "backend": BACKEND,
            "outcome": name,
            "measured": v.measured,
            "target": v.target,
            "tolerance": v.tolerance,
            "matched": v.matched,
            "rejections": self.rejections,
            "latch_releases": self.latch_releases,
            "duration_ms": u64::try_from(self.duration.as_millis()).unwrap_or(u64::MAX),
        })
    }

    pub fn to_human(&self) -> String {
        match self.outcome {
            SessionOutcome::Unlocked(v) => format!(
                "Unlocked: measured {:.2} (target {:.2} ± {:.2}); latch released {} time(s)",
                v.measured, v.target, v.tolerance, self.latch_releases
            ),
            SessionOutcome::Rejected(v) => format!(
                "Rejected: measured {:.2} (target {:.2} ± {:.2}); box stays locked",
                v.measured, v.target, v.tolerance
            ),
        }
    }
}

/// Builder pre-loaded with every config section; collaborators are added by the backend.
fn configured_builder(cfg: &Config) -> PuzzleBoxBuilder {
    PuzzleBox::builder()
        .with_scale(ScaleCfg::from(&cfg.scale))
        .with_stability(StabilityCfg::from(&cfg.stability))
        .with_animation(AnimationCfg::from(&cfg.animation))
        .with_latch(LatchCfg::from(&cfg.latch))
        .with_reject(RejectCfg::from(&cfg.reject))
        .with_palette(Palette::from(&cfg.colors))
        .with_session(SessionCfg::from(&cfg.session))
}

#[cfg(not(all(feature = "hardware", target_os = "linux")))]
fn assemble(
    cfg: &Config,
    sim: &SimPlan,
    clock: Arc<dyn Clock + Send + Sync>,
) -> PuzzleBoxBuilder {
    use weighlock_hardware::{
        SimulatedButton, SimulatedIndicator, SimulatedLatchLine, SimulatedLoadCell,
    };

    let cell = SimulatedLoadCell::from_plan(sim.raw_trace(&cfg.scale));
    if sim.fail_first_read {
        cell.fail_next_read();
    }
    tracing::debug!(sim_target = sim.target, attempts = ?sim.attempts, "simulated session plan");
    configured_builder(cfg)
        .with_sample_source(cell)
        .with_indicator(SimulatedIndicator::new())
        .with_trigger(SimulatedButton::toggling())
        .with_latch_line(SimulatedLatchLine::new(clock.clone()))
        .with_clock(clock)
}

#[cfg(all(feature = "hardware", target_os = "linux"))]
fn assemble(
    cfg: &Config,
    _sim: &SimPlan,
    clock: Arc<dyn Clock + Send + Sync>,
) -> Result<PuzzleBoxBuilder> {
    use weighlock_hardware::gpio::{GpioButton, GpioLatchLine, PwmRgbLed};

    let p = &cfg.pins;
    let led = PwmRgbLed::new(p.led_red, p.led_green, p.led_blue, p.led_common_anode)
        .wrap_err("open indicator led")?;
    let button = GpioButton::new(
        p.button,
        Duration::from_millis(cfg.session.button_debounce_ms),
    )
    .wrap_err("open button")?;
    let latch = GpioLatchLine::new(p.latch).wrap_err("open latch line")?;
    tracing::info!(
        dt = p.hx711_dt,
        sck = p.hx711_sck,
        button = p.button,
        latch = p.latch,
        "hardware backend ready"
    );
    Ok(configured_builder(cfg)
        .with_sample_source(open_load_cell(cfg)?)
        .with_indicator(led)
        .with_trigger(button)
        .with_latch_line(latch)
        .with_clock(clock))
}

#[cfg(all(feature = "hardware", target_os = "linux"))]
fn open_load_cell(cfg: &Config) -> Result<weighlock_hardware::hx711::Hx711> {
    weighlock_hardware::hx711::Hx711::new(
        cfg.pins.hx711_dt,
        cfg.pins.hx711_sck,
        cfg.scale.gain_pulses,
        Duration::from_millis(cfg.scale.data_ready_timeout_ms),
    )
    .wrap_err("open hx711")
}

#[cfg(not(all(feature = "hardware", target_os = "linux")))]
fn open_load_cell(cfg: &Config) -> Result<weighlock_hardware::SimulatedLoadCell> {
    let cell = weighlock_hardware::SimulatedLoadCell::from_plan([SIM_OFFSET]);
    if std::env::var_os("WEIGHLOCK_TEST_SIM_TIMEOUT").is_some() {
        cell.fail_next_read();
    }
    tracing::debug!(gain_pulses = cfg.scale.gain_pulses, "simulated load cell");
    Ok(cell)
}

fn build(cfg: &Config, sim: &SimPlan, shutdown: Arc<AtomicBool>) -> Result<PuzzleBox> {
    let clock: Arc<dyn Clock + Send + Sync> = Arc::new(MonotonicClock::new());
    #[cfg(all(feature = "hardware", target_os = "linux"))]
    let builder = assemble(cfg, sim, clock)?;
    #[cfg(not(all(feature = "hardware", target_os = "linux")))]
    let builder = assemble(cfg, sim, clock);
    builder.with_shutdown(shutdown).try_build()
}

/// Run one session to its outcome, then serve re-releases if unlocked.
pub fn run_session(
    cfg: &Config,
    params: &RunParams,
    shutdown: Arc<AtomicBool>,
) -> Result<SessionReport> {
    let started = Instant::now();
    let mut pb = build(cfg, &params.sim, shutdown)?;
    tracing::info!(
        backend = BACKEND,
        retry_policy = ?cfg.session.retry_policy,
        wait_timeout_ms = ?cfg.session.wait_timeout_ms,
        "session start"
    );

    let outcome = match pb.run() {
        Ok(o) => o,
        Err(e) => {
            pb.park();
            tracing::error!(state = %pb.state(), error = %e, "session failed");
            return Err(e);
        }
    };

    if matches!(outcome, SessionOutcome::Unlocked(_)) {
        for n in 0..params.rereleases {
            match pb.serve_rerelease() {
                Ok(fired) => tracing::info!(request = n + 1, fired, "re-release request"),
                Err(e) => {
                    pb.park();
                    return Err(e);
                }
            }
        }
    }
    pb.park();

    let report = SessionReport {
        outcome,
        rejections: pb.rejections(),
        latch_releases: pb.latch_releases(),
        duration: started.elapsed(),
    };
    tracing::info!(
        rejections = report.rejections,
        latch_releases = report.latch_releases,
        duration_ms = report.duration.as_millis(),
        "session complete"
    );
    Ok(report)
}

/// Open the load cell, wait for one conversion and check the full assembly builds.
pub fn self_check(cfg: &Config) -> Result<i32> {
    let clock = MonotonicClock::new();
    let mut cell = open_load_cell(cfg)?;
    cell.power_up()
        .map_err(|e| eyre::Report::new(weighlock_core::map_hw_error(&*e)))
        .wrap_err("powering up load cell")?;
    let deadline = Deadline::after(
        clock.now(),
        Some(Duration::from_millis(cfg.scale.data_ready_timeout_ms)),
    );
    while !cell.is_ready() {
        deadline.check(clock.now(), "load cell ready")?;
        clock.sleep(READY_POLL);
    }
    let raw = cell
        .read_raw()
        .map_err(|e| eyre::Report::new(weighlock_core::map_hw_error(&*e)))
        .wrap_err("reading load cell")?;
    drop(cell);

    // The real drivers own their pins, so the full assembly is only exercised in sim.
    #[cfg(not(all(feature = "hardware", target_os = "linux")))]
    build(cfg, &SimPlan::new(0.0, Vec::new()), Arc::new(AtomicBool::new(false)))?;
    tracing::info!(raw, backend = BACKEND, "self-check read");
    Ok(raw)
}
