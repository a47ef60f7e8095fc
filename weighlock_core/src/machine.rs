//! The puzzle-box controller.
//!
//! `PuzzleBox` sequences tare, target learning, arming, weighing and the
//! unlock/reject verdict. It is single-threaded: while it waits on the load
//! cell it resumes a `FadeTask` between reads, so the indicator keeps pulsing
//! without any scheduler.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use eyre::WrapErr;
use weighlock_traits::{Clock, Indicator, LatchLine, Level, Rgb, SampleSource, Trigger};

use crate::aggregate::RunningAggregate;
use crate::animation::FadeTask;
use crate::calibration::Calibration;
use crate::config::{
    AnimationCfg, Palette, RejectCfg, RetryPolicy, ScaleCfg, SessionCfg, StabilityCfg,
};
use crate::error::{LockError, Result};
use crate::hw_error::hw_report;
use crate::latch::SpringLatch;
use crate::stability::{Stability, StabilityDetector};
use crate::status::{SessionOutcome, State, Verdict};
use crate::task::{Cooperative, Deadline, DoneFlag};

/// Gap between two button polls.
const TRIGGER_POLL: Duration = Duration::from_millis(1);

type Fade = Cooperative<FadeTask>;

enum WeighOutcome {
    Settled(f64),
    Lifted,
    TimedOut,
}

pub struct PuzzleBox {
    pub(crate) source: Box<dyn SampleSource>,
    pub(crate) indicator: Box<dyn Indicator>,
    pub(crate) trigger: Box<dyn Trigger>,
    pub(crate) latch: SpringLatch<Box<dyn LatchLine>>,
    pub(crate) clock: Arc<dyn Clock + Send + Sync>,
    pub(crate) shutdown: Option<Arc<AtomicBool>>,
    pub(crate) scale: ScaleCfg,
    pub(crate) stability: StabilityCfg,
    pub(crate) animation: AnimationCfg,
    pub(crate) reject: RejectCfg,
    pub(crate) palette: Palette,
    pub(crate) session: SessionCfg,
    pub(crate) state: State,
    pub(crate) calibration: Calibration,
    pub(crate) target: Option<f64>,
    pub(crate) readings: RunningAggregate<f64>,
    pub(crate) detector: StabilityDetector,
    pub(crate) armed_since: Option<Instant>,
    /// Set by a rejection: the scale must read empty before arming again.
    pub(crate) awaiting_clear: bool,
    pub(crate) last_verdict: Option<Verdict>,
    pub(crate) rejections: u32,
}

impl core::fmt::Debug for PuzzleBox {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PuzzleBox")
            .field("state", &self.state)
            .field("calibration", &self.calibration)
            .field("target", &self.target)
            .field("last_verdict", &self.last_verdict)
            .finish()
    }
}

impl PuzzleBox {
    pub fn state(&self) -> State {
        self.state
    }

    pub fn calibration(&self) -> Calibration {
        self.calibration
    }

    /// Learned target weight, once `LearningTarget` has run.
    pub fn target(&self) -> Option<f64> {
        self.target
    }

    pub fn last_verdict(&self) -> Option<Verdict> {
        self.last_verdict
    }

    /// Wrong-weight verdicts so far.
    pub fn rejections(&self) -> u32 {
        self.rejections
    }

    pub fn latch_releases(&self) -> u32 {
        self.latch.releases()
    }

    /// Readings of the current (or last) weighing window.
    pub fn readings(&self) -> &RunningAggregate<f64> {
        &self.readings
    }

    /// Whether `run` would return instead of stepping again.
    pub fn is_finished(&self) -> bool {
        match self.state {
            State::Unlocked => true,
            State::Rejected => self.session.retry_policy == RetryPolicy::Terminate,
            _ => false,
        }
    }

    /// Advance by one state. Blocking states (button waits, sampling) return
    /// once their work is done or a wait fails.
    pub fn step(&mut self) -> Result<State> {
        self.check_shutdown()?;
        let from = self.state;
        let to = match from {
            State::Idle => {
                self.source
                    .power_up()
                    .map_err(|e| hw_report(&*e))
                    .wrap_err("powering up load cell")?;
                self.indicator.reset();
                self.indicator.apply();
                State::WaitTareSignal
            }
            State::WaitTareSignal => {
                self.wait_for_gesture("tare signal")?;
                State::Taring
            }
            State::Taring => {
                let mean = self.sample_mean(self.scale.tare_samples, self.palette.taring)?;
                self.calibration.offset = mean;
                tracing::info!(offset = mean, "tare complete");
                State::WaitTargetSignal
            }
            State::WaitTargetSignal => {
                self.wait_for_gesture("target signal")?;
                State::LearningTarget
            }
            State::LearningTarget => {
                let mean = self.sample_mean(self.scale.target_samples, self.palette.learning)?;
                let target = self.calibration.to_weight(mean);
                self.target = Some(target);
                tracing::info!(target, raw_mean = mean, "target learned");
                State::ArmedWaiting
            }
            State::ArmedWaiting => self.arm()?,
            State::Weighing => self.weigh()?,
            State::Rejected => match self.session.retry_policy {
                RetryPolicy::Rearm => {
                    self.rearm();
                    self.awaiting_clear = true;
                    State::ArmedWaiting
                }
                RetryPolicy::Terminate => {
                    return Err(eyre::Report::new(LockError::State(
                        "session ended after a rejected weight".into(),
                    )));
                }
            },
            State::Unlocked => {
                return Err(eyre::Report::new(LockError::State(
                    "already unlocked; only re-releases are serviced".into(),
                )));
            }
        };
        if to == State::ArmedWaiting && from != State::ArmedWaiting {
            self.armed_since = Some(self.clock.now());
        }
        if to != from {
            tracing::info!(from = %from, to = %to, "state transition");
        }
        self.state = to;
        Ok(to)
    }

    /// Step until unlocked, or rejected under `RetryPolicy::Terminate`.
    pub fn run(&mut self) -> Result<SessionOutcome> {
        loop {
            if self.is_finished()
                && let Some(verdict) = self.last_verdict
            {
                return Ok(if verdict.matched {
                    SessionOutcome::Unlocked(verdict)
                } else {
                    SessionOutcome::Rejected(verdict)
                });
            }
            self.step()?;
        }
    }

    /// Wait for one button gesture, then fire the latch again unless the last
    /// release was too recent. Only valid once unlocked.
    pub fn serve_rerelease(&mut self) -> Result<bool> {
        if self.state != State::Unlocked {
            return Err(eyre::Report::new(LockError::State(format!(
                "re-release requested while {}",
                self.state
            ))));
        }
        self.wait_for_gesture("re-release signal")?;
        self.latch.try_rerelease()
    }

    /// Force the latch off, blank the indicator and power the load cell down
    /// (best-effort).
    pub fn park(&mut self) {
        if let Err(e) = self.latch.force_off() {
            tracing::warn!(error = %e, "latch still energized while parking");
        }
        self.indicator.reset();
        self.indicator.apply();
        if let Err(e) = self.source.power_down() {
            tracing::warn!(error = %hw_report(&*e), "load cell power-down failed while parking");
        }
    }

    /// Poll the button until it reads `level`.
    pub fn wait_for(&mut self, level: Level, what: &'static str) -> Result<()> {
        let deadline = self.wait_deadline();
        loop {
            self.check_shutdown()?;
            let now = self
                .trigger
                .level()
                .map_err(|e| hw_report(&*e))
                .wrap_err("reading button")?;
            if now == level {
                return Ok(());
            }
            deadline.check(self.clock.now(), what)?;
            self.clock.sleep(TRIGGER_POLL);
        }
    }

    // ── Private: phases ──────────────────────────────────────────────────────

    fn wait_for_gesture(&mut self, what: &'static str) -> Result<()> {
        let pressed = self.session.pressed;
        self.wait_for(pressed, what)?;
        self.wait_for(!pressed, what)?;
        tracing::debug!(what, "button gesture");
        Ok(())
    }

    fn arm(&mut self) -> Result<State> {
        let reading = self.read_weight(None)?;
        let idle = reading < self.scale.idle_threshold;
        if idle && self.awaiting_clear {
            tracing::debug!("scale cleared, armed");
            self.awaiting_clear = false;
        }
        if idle || self.awaiting_clear {
            tracing::trace!(reading, awaiting_clear = self.awaiting_clear, "scale idle");
            let since = self.armed_since.unwrap_or_else(|| self.clock.now());
            Deadline::after(since, self.session.wait_timeout())
                .check(self.clock.now(), "object on scale")?;
            return Ok(State::ArmedWaiting);
        }
        tracing::debug!(reading, "object detected");
        self.rearm();
        self.readings.add(reading);
        Ok(State::Weighing)
    }

    fn weigh(&mut self) -> Result<State> {
        let target = self.target.ok_or_else(|| {
            eyre::Report::new(LockError::State("weighing before a target was learned".into()))
        })?;
        let done = DoneFlag::new();
        let mut fade = self.fade(self.palette.weighing, done.clone());
        let outcome = self.weigh_until_settled(&mut fade);
        done.raise();
        let drained = self.finish_fade(&mut fade);
        let outcome = outcome?;
        drained?;

        match outcome {
            WeighOutcome::Lifted => {
                tracing::info!("object lifted before settling");
                self.rearm();
                Ok(State::ArmedWaiting)
            }
            WeighOutcome::TimedOut => {
                tracing::warn!(
                    settle_timeout_ms = self.stability.settle_timeout_ms,
                    "weighing did not settle, re-arming"
                );
                self.rearm();
                Ok(State::ArmedWaiting)
            }
            WeighOutcome::Settled(measured) => {
                let tolerance = self.stability.tolerance;
                let matched = self.readings.is_within_tolerance(target, tolerance);
                let verdict = Verdict {
                    measured,
                    target,
                    tolerance,
                    matched,
                };
                self.last_verdict = Some(verdict);
                tracing::info!(measured, target, tolerance, matched, "weighing finalized");
                if matched {
                    self.unlock()?;
                    Ok(State::Unlocked)
                } else {
                    self.flash_rejection();
                    Ok(State::Rejected)
                }
            }
        }
    }

    fn weigh_until_settled(&mut self, fade: &mut Fade) -> Result<WeighOutcome> {
        let started = self.clock.now();
        let timeout = self.stability.settle_timeout();
        loop {
            if self.readings.is_full() {
                let variance = self.readings.variance();
                let mean = self.readings.mean();
                tracing::debug!(mean, variance, "weighing window");
                match self.detector.observe(variance) {
                    Stability::Settled => return Ok(WeighOutcome::Settled(mean)),
                    Stability::Disturbed => tracing::debug!(variance, "reading disturbed"),
                    Stability::Unsettled | Stability::Holding => {}
                }
            }
            if let Some(limit) = timeout
                && self.clock.elapsed_since(started) >= limit
            {
                return Ok(WeighOutcome::TimedOut);
            }
            let reading = self.read_weight(Some(&mut *fade))?;
            if reading < self.scale.idle_threshold {
                return Ok(WeighOutcome::Lifted);
            }
            self.readings.add(reading);
        }
    }

    fn unlock(&mut self) -> Result<()> {
        if let Err(e) = self.source.power_down() {
            tracing::warn!(error = %hw_report(&*e), "load cell power-down failed on unlock");
        }
        self.indicator
            .set(self.palette.unlocked, self.animation.max_brightness);
        self.indicator.apply();
        self.latch.release().wrap_err("releasing latch")
    }

    fn flash_rejection(&mut self) {
        self.rejections += 1;
        let on = Duration::from_millis(self.reject.on_ms);
        let off = Duration::from_millis(self.reject.off_ms);
        for _ in 0..self.reject.flashes {
            self.indicator
                .set(self.palette.rejected, self.animation.max_brightness);
            self.indicator.apply();
            self.clock.sleep(on);
            self.indicator.reset();
            self.indicator.apply();
            self.clock.sleep(off);
        }
    }

    fn rearm(&mut self) {
        self.readings.clear();
        self.detector.reset();
    }

    // ── Private: sampling ────────────────────────────────────────────────────

    fn fade(&self, color: Rgb, done: DoneFlag) -> Fade {
        Cooperative::new(FadeTask::new(
            color,
            self.animation.curve(),
            self.animation.pacing,
            self.animation.frame_interval(),
            done,
        ))
    }

    fn finish_fade(&mut self, fade: &mut Fade) -> Result<()> {
        let deadline = self.wait_deadline();
        fade.drain(&*self.clock, &mut *self.indicator, deadline)
            .map_err(eyre::Report::new)
    }

    /// Mean raw counts over `n` reads while pulsing `color`.
    fn sample_mean(&mut self, n: usize, color: Rgb) -> Result<f64> {
        let done = DoneFlag::new();
        let mut fade = self.fade(color, done.clone());
        let mut agg = RunningAggregate::<i32>::new(n);
        let sampled = self.fill(&mut agg, &mut fade);
        done.raise();
        let drained = self.finish_fade(&mut fade);
        sampled?;
        drained?;
        Ok(agg.mean())
    }

    fn fill(&mut self, agg: &mut RunningAggregate<i32>, fade: &mut Fade) -> Result<()> {
        for _ in 0..agg.capacity() {
            let raw = self.read_raw(Some(&mut *fade))?;
            agg.add(raw);
        }
        Ok(())
    }

    /// One reading: `burst_samples` raw reads averaged, in weight units.
    fn read_weight(&mut self, mut fade: Option<&mut Fade>) -> Result<f64> {
        let mut burst = RunningAggregate::<i32>::new(self.scale.burst_samples);
        for _ in 0..burst.capacity() {
            let raw = self.read_raw(fade.as_deref_mut())?;
            burst.add(raw);
        }
        Ok(self.calibration.to_weight(burst.mean()))
    }

    /// Wait for the load cell, then read it. "Not ready" backs off while the
    /// fade keeps running.
    fn read_raw(&mut self, mut fade: Option<&mut Fade>) -> Result<i32> {
        let deadline = self.wait_deadline();
        let backoff = Duration::from_millis(self.scale.not_ready_backoff_ms);
        while !self.source.is_ready() {
            self.check_shutdown()?;
            deadline.check(self.clock.now(), "load cell ready")?;
            tracing::trace!("load cell not ready");
            self.pause(fade.as_deref_mut(), backoff);
        }
        let raw = self
            .source
            .read_raw()
            .map_err(|e| hw_report(&*e))
            .wrap_err("reading load cell")?;
        tracing::trace!(raw, "sample");
        if let Some(f) = fade {
            f.poll(self.clock.now(), &mut *self.indicator);
        }
        Ok(raw)
    }

    /// Sleep for `d`, waking for every frame the fade asks for.
    fn pause(&mut self, mut fade: Option<&mut Fade>, d: Duration) {
        let until = self.clock.now() + d;
        loop {
            let now = self.clock.now();
            if now >= until {
                return;
            }
            let mut next = until;
            if let Some(f) = fade.as_deref_mut() {
                f.poll(now, &mut *self.indicator);
                if let Some(wake) = f.wake_at().filter(|w| *w > now) {
                    next = next.min(wake);
                }
            }
            self.clock.sleep_until(next);
        }
    }

    fn wait_deadline(&self) -> Deadline {
        Deadline::after(self.clock.now(), self.session.wait_timeout())
    }

    fn check_shutdown(&self) -> std::result::Result<(), LockError> {
        match &self.shutdown {
            Some(flag) if flag.load(Ordering::Relaxed) => Err(LockError::Aborted),
            _ => Ok(()),
        }
    }
}
