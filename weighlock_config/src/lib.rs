#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema and scale calibration parsing for the puzzle box.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - The scale-factor CSV loader enforces headers and fits raw counts against
//!   known reference weights, with one robust refit to drop outliers.
use serde::Deserialize;

/// Hardware ceiling for a single solenoid pulse. The lock heats up and can be
/// damaged when powered longer than this.
pub const SAFETY_MAX_PULSE_MS: u64 = 100;
/// Brightness scale of the indicator.
pub const MAX_BRIGHTNESS: u8 = 100;

/// Scale calibration CSV schema.
///
/// Expected headers:
/// weight,raw
///
/// Example:
/// weight,raw
/// 0.0,50682624
/// 1000.0,56578279
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct CalibrationRow {
    pub weight: f64,
    pub raw: i64,
}

#[derive(Debug, Deserialize)]
pub struct Pins {
    pub hx711_dt: u8,
    pub hx711_sck: u8,
    pub led_red: u8,
    pub led_green: u8,
    pub led_blue: u8,
    /// The stock board uses a common-anode LED.
    #[serde(default = "default_true")]
    pub led_common_anode: bool,
    pub button: u8,
    pub latch: u8,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ScaleCfg {
    /// Raw counts per weight unit.
    pub scale_factor: f64,
    /// HX711 gain/channel pulses after each conversion (1 = A/128, 2 = B/32, 3 = A/64).
    pub gain_pulses: u8,
    /// Rolling window of readings used for the stability check.
    pub window: usize,
    pub tare_samples: usize,
    pub target_samples: usize,
    /// Raw samples averaged into one weighing reading.
    pub burst_samples: usize,
    /// Net readings strictly below this (weight units) count as an empty scale.
    pub idle_threshold: f64,
    pub not_ready_backoff_ms: u64,
    /// Max time the HX711 driver waits for DRDY once a read has started.
    pub data_ready_timeout_ms: u64,
}

impl Default for ScaleCfg {
    fn default() -> Self {
        Self {
            scale_factor: 1.0,
            gain_pulses: 1,
            window: 10,
            tare_samples: 50,
            target_samples: 50,
            burst_samples: 10,
            idle_threshold: 5.0,
            not_ready_backoff_ms: 50,
            data_ready_timeout_ms: 150,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct StabilityCfg {
    /// Variance at or under which a reading is settled.
    pub equilibrium: f64,
    /// Variance strictly above which a settled reading is disturbed again.
    pub changing: f64,
    /// Accepted |mean - target| in weight units.
    pub tolerance: f64,
    /// Give up on a weighing that never settles (0 disables).
    pub settle_timeout_ms: u64,
}

impl Default for StabilityCfg {
    fn default() -> Self {
        Self {
            equilibrium: 1e-4,
            changing: 1e-3,
            tolerance: 10.0,
            settle_timeout_ms: 0,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Pacing {
    /// Brightness follows elapsed wall time.
    #[default]
    WallClock,
    /// Brightness follows a frame counter.
    Frames,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AnimationCfg {
    /// One full pulse of the fade.
    pub period_ms: u64,
    /// Minimum time between two frames.
    pub frame_ms: u64,
    pub max_brightness: u8,
    pub pacing: Pacing,
}

impl Default for AnimationCfg {
    fn default() -> Self {
        Self {
            period_ms: 1000,
            frame_ms: 10,
            max_brightness: MAX_BRIGHTNESS,
            pacing: Pacing::WallClock,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LatchCfg {
    pub pulse_ms: u64,
    pub max_pulse_ms: u64,
    /// Minimum gap between manual re-releases once unlocked.
    pub rerelease_interval_ms: u64,
}

impl Default for LatchCfg {
    fn default() -> Self {
        Self {
            pulse_ms: 80,
            max_pulse_ms: SAFETY_MAX_PULSE_MS,
            rerelease_interval_ms: 2000,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RejectCfg {
    pub flashes: u32,
    pub on_ms: u64,
    pub off_ms: u64,
}

impl Default for RejectCfg {
    fn default() -> Self {
        Self {
            flashes: 3,
            on_ms: 250,
            off_ms: 250,
        }
    }
}

/// Indicator colors per phase, as `[r, g, b]`.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ColorsCfg {
    pub taring: [u8; 3],
    pub learning: [u8; 3],
    pub weighing: [u8; 3],
    pub unlocked: [u8; 3],
    pub rejected: [u8; 3],
}

impl Default for ColorsCfg {
    fn default() -> Self {
        Self {
            taring: [0, 0, 255],
            learning: [160, 0, 255],
            weighing: [255, 140, 0],
            unlocked: [0, 255, 0],
            rejected: [255, 0, 0],
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RetryPolicy {
    /// Go back to waiting for an object after a wrong weight.
    #[default]
    Rearm,
    /// End the session after the first wrong weight.
    Terminate,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SessionCfg {
    pub retry_policy: RetryPolicy,
    /// Bound every wait (button, sensor) to this many ms. Absent = wait forever.
    pub wait_timeout_ms: Option<u64>,
    pub button_active_high: bool,
    pub button_debounce_ms: u64,
}

impl Default for SessionCfg {
    fn default() -> Self {
        Self {
            retry_policy: RetryPolicy::Rearm,
            wait_timeout_ms: None,
            button_active_high: true,
            button_debounce_ms: 5,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Config {
    pub pins: Pins,
    #[serde(default)]
    pub scale: ScaleCfg,
    #[serde(default)]
    pub stability: StabilityCfg,
    #[serde(default)]
    pub animation: AnimationCfg,
    #[serde(default)]
    pub latch: LatchCfg,
    #[serde(default)]
    pub reject: RejectCfg,
    #[serde(default)]
    pub colors: ColorsCfg,
    #[serde(default)]
    pub session: SessionCfg,
    #[serde(default)]
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

/// Linear load-cell model: raw = scale_factor * weight + zero_counts.
#[derive(Debug, Clone, Copy)]
pub struct ScaleCalibration {
    pub scale_factor: f64,
    pub zero_counts: i32,
}

/// Ordinary least squares of raw (y) on weight (x). Returns (slope, intercept).
fn fit_line(pts: &[(f64, f64)]) -> eyre::Result<(f64, f64)> {
    let n = pts.len() as f64;
    let mean_w = pts.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_r = pts.iter().map(|p| p.1).sum::<f64>() / n;
    let (mut sww, mut swr) = (0.0f64, 0.0f64);
    for (w, r) in pts {
        sww += (w - mean_w) * (w - mean_w);
        swr += (w - mean_w) * (r - mean_r);
    }
    if !sww.is_finite() || sww == 0.0 {
        eyre::bail!("calibration cannot determine slope (all reference weights are equal)");
    }
    let slope = swr / sww;
    if !slope.is_finite() || slope == 0.0 {
        eyre::bail!("calibration produced an unusable scale factor ({slope})");
    }
    Ok((slope, mean_r - slope * mean_w))
}

impl ScaleCalibration {
    /// Fit the scale factor from reference rows. Points whose residual exceeds
    /// 2x the RMS residual are dropped once and the line is refitted, as long as
    /// at least two points survive.
    pub fn from_rows(rows: &[CalibrationRow]) -> eyre::Result<Self> {
        if rows.len() < 2 {
            eyre::bail!("calibration requires at least two rows, got {}", rows.len());
        }
        for (i, pair) in rows.windows(2).enumerate() {
            if pair[0].weight == pair[1].weight {
                eyre::bail!(
                    "calibration rows have duplicate weight values at index {} and {}",
                    i,
                    i + 1
                );
            }
        }
        if rows.iter().any(|r| !r.weight.is_finite()) {
            eyre::bail!("calibration weights must be finite");
        }

        let pts: Vec<(f64, f64)> = rows.iter().map(|r| (r.weight, r.raw as f64)).collect();
        let (a0, b0) = fit_line(&pts)?;
        let residual = |&(w, r): &(f64, f64)| r - (a0 * w + b0);
        let rms = (pts.iter().map(|p| residual(p).powi(2)).sum::<f64>() / pts.len() as f64).sqrt();

        let inliers: Vec<(f64, f64)> = pts
            .iter()
            .copied()
            .filter(|p| residual(p).abs() <= 2.0 * rms)
            .collect();
        let (a, b) = if rms > 0.0 && inliers.len() >= 2 && inliers.len() < pts.len() {
            fit_line(&inliers).unwrap_or((a0, b0))
        } else {
            (a0, b0)
        };

        let zero = b.round();
        if !zero.is_finite() || zero < f64::from(i32::MIN) || zero > f64::from(i32::MAX) {
            eyre::bail!("calibration produced an invalid zero point");
        }
        Ok(Self {
            scale_factor: a,
            zero_counts: zero as i32,
        })
    }
}

impl TryFrom<&[CalibrationRow]> for ScaleCalibration {
    type Error = eyre::Report;
    fn try_from(rows: &[CalibrationRow]) -> Result<Self, Self::Error> {
        Self::from_rows(rows)
    }
}

pub fn load_calibration_csv(path: &std::path::Path) -> eyre::Result<ScaleCalibration> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| eyre::eyre!("open calibration CSV {:?}: {}", path, e))?;

    let headers = rdr
        .headers()
        .map_err(|e| eyre::eyre!("read CSV headers {:?}: {}", path, e))?
        .clone();
    let actual: Vec<&str> = headers.iter().collect();
    if actual != ["weight", "raw"] {
        eyre::bail!(
            "calibration CSV must have headers 'weight,raw', got: {}",
            actual.join(",")
        );
    }

    let mut rows = Vec::new();
    for (idx, rec) in rdr.deserialize::<CalibrationRow>().enumerate() {
        match rec {
            Ok(row) => rows.push(row),
            Err(e) => eyre::bail!("invalid CSV row {}: {}", idx + 2, e),
        }
    }

    ScaleCalibration::try_from(rows.as_slice())
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Scale
        if !self.scale.scale_factor.is_finite() || self.scale.scale_factor == 0.0 {
            eyre::bail!("scale.scale_factor must be finite and non-zero");
        }
        if !(1..=3).contains(&self.scale.gain_pulses) {
            eyre::bail!("scale.gain_pulses must be 1, 2 or 3");
        }
        if self.scale.window == 0 {
            eyre::bail!("scale.window must be >= 1");
        }
        if self.scale.tare_samples == 0 {
            eyre::bail!("scale.tare_samples must be >= 1");
        }
        if self.scale.target_samples == 0 {
            eyre::bail!("scale.target_samples must be >= 1");
        }
        if self.scale.burst_samples == 0 {
            eyre::bail!("scale.burst_samples must be >= 1");
        }
        if !self.scale.idle_threshold.is_finite() || self.scale.idle_threshold < 0.0 {
            eyre::bail!("scale.idle_threshold must be >= 0");
        }
        if self.scale.data_ready_timeout_ms == 0 {
            eyre::bail!("scale.data_ready_timeout_ms must be >= 1");
        }

        // Stability
        if !(self.stability.equilibrium >= 0.0) {
            eyre::bail!("stability.equilibrium must be >= 0");
        }
        if !(self.stability.changing > self.stability.equilibrium) {
            eyre::bail!("stability.changing must be greater than stability.equilibrium");
        }
        if !(self.stability.tolerance >= 0.0) {
            eyre::bail!("stability.tolerance must be >= 0");
        }

        // Animation
        if self.animation.period_ms == 0 {
            eyre::bail!("animation.period_ms must be >= 1");
        }
        if self.animation.frame_ms == 0 {
            eyre::bail!("animation.frame_ms must be >= 1");
        }
        if self.animation.max_brightness > MAX_BRIGHTNESS {
            eyre::bail!("animation.max_brightness must be <= {MAX_BRIGHTNESS}");
        }

        // Latch
        if self.latch.max_pulse_ms == 0 || self.latch.max_pulse_ms > SAFETY_MAX_PULSE_MS {
            eyre::bail!("latch.max_pulse_ms must be in 1..={SAFETY_MAX_PULSE_MS}");
        }
        if self.latch.pulse_ms == 0 || self.latch.pulse_ms > self.latch.max_pulse_ms {
            eyre::bail!("latch.pulse_ms must be in 1..=latch.max_pulse_ms");
        }

        // Session
        if self.session.wait_timeout_ms == Some(0) {
            eyre::bail!("session.wait_timeout_ms must be >= 1 when set");
        }

        // Logging
        if let Some(rot) = self.logging.rotation.as_deref()
            && !matches!(rot, "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never, daily, hourly");
        }

        Ok(())
    }
}
