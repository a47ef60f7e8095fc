//! Configuration types for the puzzle-box controller.
//!
//! These are the runtime configuration structs used by `PuzzleBox`.
//! They are separate from the TOML-deserialized config in `weighlock_config`.

use std::time::Duration;

use weighlock_traits::{Level, Rgb};

use crate::animation::{FadeCurve, Pacing};

/// Load-cell sampling and conversion.
#[derive(Debug, Clone)]
pub struct ScaleCfg {
    /// Raw counts per weight unit.
    pub scale_factor: f64,
    /// Rolling window used for the stability check.
    pub window: usize,
    pub tare_samples: usize,
    pub target_samples: usize,
    /// Raw reads averaged into one armed/weighing reading.
    pub burst_samples: usize,
    /// Net readings strictly below this count as an empty scale.
    pub idle_threshold: f64,
    /// Pause between "not ready" polls.
    pub not_ready_backoff_ms: u64,
}

impl Default for ScaleCfg {
    fn default() -> Self {
        Self {
            scale_factor: 1.0,
            window: 10,
            tare_samples: 50,
            target_samples: 50,
            burst_samples: 10,
            idle_threshold: 5.0,
            not_ready_backoff_ms: 50,
        }
    }
}

/// Variance thresholds and the match tolerance.
#[derive(Debug, Clone)]
pub struct StabilityCfg {
    pub equilibrium: f64,
    pub changing: f64,
    pub tolerance: f64,
    /// 0 disables the settle timeout.
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

impl StabilityCfg {
    pub fn settle_timeout(&self) -> Option<Duration> {
        (self.settle_timeout_ms > 0).then(|| Duration::from_millis(self.settle_timeout_ms))
    }
}

#[derive(Debug, Clone)]
pub struct AnimationCfg {
    pub period_ms: u64,
    pub frame_ms: u64,
    pub max_brightness: u8,
    pub pacing: Pacing,
}

impl Default for AnimationCfg {
    fn default() -> Self {
        Self {
            period_ms: 1000,
            frame_ms: 10,
            max_brightness: 100,
            pacing: Pacing::WallClock,
        }
    }
}

impl AnimationCfg {
    pub fn curve(&self) -> FadeCurve {
        FadeCurve::new(Duration::from_millis(self.period_ms), self.max_brightness)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_ms)
    }
}

#[derive(Debug, Clone)]
pub struct LatchCfg {
    pub pulse_ms: u64,
    pub max_pulse_ms: u64,
    pub rerelease_interval_ms: u64,
}

impl Default for LatchCfg {
    fn default() -> Self {
        Self {
            pulse_ms: 80,
            max_pulse_ms: 100,
            rerelease_interval_ms: 2000,
        }
    }
}

/// Rejection flash pattern.
#[derive(Debug, Clone)]
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

/// Indicator color per phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    pub taring: Rgb,
    pub learning: Rgb,
    pub weighing: Rgb,
    pub unlocked: Rgb,
    pub rejected: Rgb,
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            taring: Rgb::BLUE,
            learning: Rgb::PURPLE,
            weighing: Rgb::AMBER,
            unlocked: Rgb::GREEN,
            rejected: Rgb::RED,
        }
    }
}

/// What happens after a wrong weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryPolicy {
    #[default]
    Rearm,
    Terminate,
}

#[derive(Debug, Clone)]
pub struct SessionCfg {
    pub retry_policy: RetryPolicy,
    /// Bound on every button/sensor wait. `None` waits forever.
    pub wait_timeout_ms: Option<u64>,
    /// Level the button reads while pressed.
    pub pressed: Level,
}

impl Default for SessionCfg {
    fn default() -> Self {
        Self {
            retry_policy: RetryPolicy::Rearm,
            wait_timeout_ms: None,
            pressed: Level::High,
        }
    }
}

impl SessionCfg {
    pub fn wait_timeout(&self) -> Option<Duration> {
        self.wait_timeout_ms.map(Duration::from_millis)
    }
}
