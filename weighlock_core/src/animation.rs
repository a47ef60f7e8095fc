//! Fading indicator: a cooperative task pulsing one color while the control
//! loop samples the load cell.

use std::f64::consts::PI;
use std::time::{Duration, Instant};

use weighlock_traits::{Indicator, Rgb};

use crate::task::{DoneFlag, Step, Task};

/// Brightness as a function of elapsed time: one full |sin| pulse per `period`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FadeCurve {
    period: Duration,
    max_brightness: u8,
}

impl FadeCurve {
    /// A zero period is raised to one millisecond.
    pub fn new(period: Duration, max_brightness: u8) -> Self {
        Self {
            period: period.max(Duration::from_millis(1)),
            max_brightness,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn max_brightness(&self) -> u8 {
        self.max_brightness
    }

    pub fn brightness(&self, elapsed: Duration) -> u8 {
        let phase = elapsed.as_secs_f64() * PI / self.period.as_secs_f64();
        let max = f64::from(self.max_brightness);
        let level = (max * phase.sin().abs()).round();
        level.clamp(0.0, max) as u8
    }

    /// Step-locked variant: time is `frame * frame_len`.
    pub fn brightness_at_frame(&self, frame: u64, frame_len: Duration) -> u8 {
        let nanos = frame_len.as_nanos().saturating_mul(u128::from(frame));
        self.brightness(Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX)))
    }
}

/// How a fade derives the current position on its curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Pacing {
    /// From elapsed wall time; sampling jitter does not change the speed.
    #[default]
    WallClock,
    /// From a frame counter; every resume advances exactly one frame.
    Frames,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resume {
    Start,
    Frame,
    Finish,
}

#[derive(Debug, Default)]
struct FadeLocals {
    started: Option<Instant>,
    frame: u64,
}

/// Emits one frame per resume until its `DoneFlag` is raised, then blanks the
/// indicator and completes.
#[derive(Debug)]
pub struct FadeTask {
    color: Rgb,
    curve: FadeCurve,
    pacing: Pacing,
    frame_interval: Duration,
    done: DoneFlag,
    at: Resume,
    locals: FadeLocals,
}

impl FadeTask {
    pub fn new(
        color: Rgb,
        curve: FadeCurve,
        pacing: Pacing,
        frame_interval: Duration,
        done: DoneFlag,
    ) -> Self {
        Self {
            color,
            curve,
            pacing,
            frame_interval,
            done,
            at: Resume::Start,
            locals: FadeLocals::default(),
        }
    }

    /// Frames emitted so far.
    pub fn frames(&self) -> u64 {
        self.locals.frame
    }

    fn level(&self, now: Instant) -> u8 {
        match self.pacing {
            Pacing::WallClock => {
                let started = self.locals.started.unwrap_or(now);
                self.curve.brightness(now.saturating_duration_since(started))
            }
            Pacing::Frames => self
                .curve
                .brightness_at_frame(self.locals.frame, self.frame_interval),
        }
    }
}

impl<I: Indicator + ?Sized> Task<I> for FadeTask {
    fn resume(&mut self, now: Instant, led: &mut I) -> Step {
        loop {
            match self.at {
                Resume::Start => {
                    self.locals.started = Some(now);
                    self.locals.frame = 0;
                    self.at = Resume::Frame;
                }
                Resume::Frame => {
                    if self.done.is_raised() {
                        self.at = Resume::Finish;
                        continue;
                    }
                    let level = self.level(now);
                    tracing::trace!(frame = self.locals.frame, level, "fade frame");
                    led.set(self.color, level);
                    led.apply();
                    self.locals.frame += 1;
                    return Step::Yield(self.frame_interval);
                }
                Resume::Finish => {
                    led.reset();
                    led.apply();
                    return Step::Complete;
                }
            }
        }
    }
}
