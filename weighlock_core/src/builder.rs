//! Builder for `PuzzleBox`.
//!
//! The four collaborators are required; every config section falls back to its
//! default. `try_build()` validates the combination and reports the first
//! problem as a `BuildError`.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use weighlock_traits::clock::{Clock, MonotonicClock};
use weighlock_traits::{Indicator, LatchLine, SampleSource, Trigger};

use crate::aggregate::RunningAggregate;
use crate::calibration::Calibration;
use crate::config::{
    AnimationCfg, LatchCfg, Palette, RejectCfg, ScaleCfg, SessionCfg, StabilityCfg,
};
use crate::error::{BuildError, Result};
use crate::latch::SpringLatch;
use crate::machine::PuzzleBox;
use crate::stability::StabilityDetector;
use crate::status::State;

impl PuzzleBox {
    /// Start building a PuzzleBox.
    pub fn builder() -> PuzzleBoxBuilder {
        PuzzleBoxBuilder::default()
    }
}

#[derive(Default)]
pub struct PuzzleBoxBuilder {
    source: Option<Box<dyn SampleSource>>,
    indicator: Option<Box<dyn Indicator>>,
    trigger: Option<Box<dyn Trigger>>,
    latch_line: Option<Box<dyn LatchLine>>,
    scale: Option<ScaleCfg>,
    stability: Option<StabilityCfg>,
    animation: Option<AnimationCfg>,
    latch: Option<LatchCfg>,
    reject: Option<RejectCfg>,
    palette: Option<Palette>,
    session: Option<SessionCfg>,
    clock: Option<Arc<dyn Clock + Send + Sync>>,
    shutdown: Option<Arc<AtomicBool>>,
}

fn invalid(msg: &'static str) -> eyre::Report {
    eyre::Report::new(BuildError::InvalidConfig(msg))
}

impl PuzzleBoxBuilder {
    pub fn with_sample_source(mut self, source: impl SampleSource + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }
    pub fn with_indicator(mut self, indicator: impl Indicator + 'static) -> Self {
        self.indicator = Some(Box::new(indicator));
        self
    }
    pub fn with_trigger(mut self, trigger: impl Trigger + 'static) -> Self {
        self.trigger = Some(Box::new(trigger));
        self
    }
    pub fn with_latch_line(mut self, line: impl LatchLine + 'static) -> Self {
        self.latch_line = Some(Box::new(line));
        self
    }
    pub fn with_scale(mut self, scale: ScaleCfg) -> Self {
        self.scale = Some(scale);
        self
    }
    pub fn with_stability(mut self, stability: StabilityCfg) -> Self {
        self.stability = Some(stability);
        self
    }
    pub fn with_animation(mut self, animation: AnimationCfg) -> Self {
        self.animation = Some(animation);
        self
    }
    pub fn with_latch(mut self, latch: LatchCfg) -> Self {
        self.latch = Some(latch);
        self
    }
    pub fn with_reject(mut self, reject: RejectCfg) -> Self {
        self.reject = Some(reject);
        self
    }
    pub fn with_palette(mut self, palette: Palette) -> Self {
        self.palette = Some(palette);
        self
    }
    pub fn with_session(mut self, session: SessionCfg) -> Self {
        self.session = Some(session);
        self
    }
    /// Provide a custom clock implementation; defaults to `MonotonicClock`.
    pub fn with_clock(mut self, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        self.clock = Some(clock);
        self
    }
    /// Flag that ends every wait with `LockError::Aborted` once raised.
    pub fn with_shutdown(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown = Some(flag);
        self
    }

    pub fn try_build(self) -> Result<PuzzleBox> {
        let source = self
            .source
            .ok_or_else(|| eyre::Report::new(BuildError::MissingSampleSource))?;
        let indicator = self
            .indicator
            .ok_or_else(|| eyre::Report::new(BuildError::MissingIndicator))?;
        let trigger = self
            .trigger
            .ok_or_else(|| eyre::Report::new(BuildError::MissingTrigger))?;
        let latch_line = self
            .latch_line
            .ok_or_else(|| eyre::Report::new(BuildError::MissingLatch))?;

        let scale = self.scale.unwrap_or_default();
        let stability = self.stability.unwrap_or_default();
        let animation = self.animation.unwrap_or_default();
        let latch = self.latch.unwrap_or_default();
        let session = self.session.unwrap_or_default();

        // ── Validation ───────────────────────────────────────────────────────
        if !scale.scale_factor.is_finite() || scale.scale_factor == 0.0 {
            return Err(invalid("scale_factor must be finite and non-zero"));
        }
        if scale.window == 0 {
            return Err(invalid("window must be >= 1"));
        }
        if scale.tare_samples == 0 || scale.target_samples == 0 || scale.burst_samples == 0 {
            return Err(invalid("sample counts must be >= 1"));
        }
        if !scale.idle_threshold.is_finite() {
            return Err(invalid("idle_threshold must be finite"));
        }
        if stability.equilibrium.is_nan() || stability.equilibrium < 0.0 {
            return Err(invalid("equilibrium must be >= 0"));
        }
        if stability.changing.is_nan() || stability.changing <= stability.equilibrium {
            return Err(invalid("changing must be greater than equilibrium"));
        }
        if stability.tolerance.is_nan() || stability.tolerance < 0.0 {
            return Err(invalid("tolerance must be >= 0"));
        }
        if animation.frame_ms == 0 || animation.period_ms == 0 {
            return Err(invalid("animation period and frame interval must be >= 1 ms"));
        }
        if animation.max_brightness > 100 {
            return Err(invalid("max_brightness must be <= 100"));
        }
        if session.wait_timeout_ms == Some(0) {
            return Err(invalid("wait_timeout_ms must be >= 1 when set"));
        }

        let clock: Arc<dyn Clock + Send + Sync> = match self.clock {
            Some(c) => c,
            None => Arc::new(MonotonicClock::new()),
        };

        Ok(PuzzleBox {
            source,
            indicator,
            trigger,
            latch: SpringLatch::new(latch_line, clock.clone(), &latch),
            clock,
            shutdown: self.shutdown,
            readings: RunningAggregate::new(scale.window),
            detector: StabilityDetector::new(stability.equilibrium, stability.changing),
            calibration: Calibration::new(0.0, scale.scale_factor),
            scale,
            stability,
            animation,
            reject: self.reject.unwrap_or_default(),
            palette: self.palette.unwrap_or_default(),
            session,
            state: State::Idle,
            target: None,
            armed_since: None,
            awaiting_clear: false,
            last_verdict: None,
            rejections: 0,
        })
    }
}
