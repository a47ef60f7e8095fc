//! Simulated collaborators for host runs and tests.
//!
//! Every simulator is a cheap handle over shared state (`Rc<RefCell<_>>`), so a
//! test can keep one clone for scripting/inspection while the control loop owns
//! another.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use weighlock_traits::{Clock, Indicator, LatchLine, Level, Rgb, SampleSource, Trigger};

use crate::error::HwError;

#[derive(Default)]
struct LoadCellState {
    plan: VecDeque<i32>,
    last: i32,
    not_ready_polls: u32,
    powered: bool,
    reads: usize,
    fail_next: bool,
    conversion: Option<(Arc<dyn Clock + Send + Sync>, Duration)>,
}

/// Scripted load cell: returns planned raw values in order, then keeps
/// repeating the last one.
#[derive(Clone)]
pub struct SimulatedLoadCell {
    state: Rc<RefCell<LoadCellState>>,
}

impl Default for SimulatedLoadCell {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedLoadCell {
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(LoadCellState {
                powered: true,
                ..LoadCellState::default()
            })),
        }
    }

    pub fn from_plan(plan: impl IntoIterator<Item = i32>) -> Self {
        let cell = Self::new();
        cell.state.borrow_mut().plan.extend(plan);
        cell
    }

    /// Each read costs `period` on `clock`, like a real conversion.
    pub fn with_conversion_time(
        self,
        clock: Arc<dyn Clock + Send + Sync>,
        period: Duration,
    ) -> Self {
        self.state.borrow_mut().conversion = Some((clock, period));
        self
    }

    pub fn push(&self, raw: i32) {
        self.state.borrow_mut().plan.push_back(raw);
    }

    pub fn push_repeat(&self, raw: i32, n: usize) {
        self.state
            .borrow_mut()
            .plan
            .extend(std::iter::repeat_n(raw, n));
    }

    /// The next `polls` calls to `is_ready` report "not ready".
    pub fn set_not_ready_for(&self, polls: u32) {
        self.state.borrow_mut().not_ready_polls = polls;
    }

    /// The next read fails with a data-ready timeout.
    pub fn fail_next_read(&self) {
        self.state.borrow_mut().fail_next = true;
    }

    pub fn reads(&self) -> usize {
        self.state.borrow().reads
    }

    pub fn is_powered(&self) -> bool {
        self.state.borrow().powered
    }
}

impl SampleSource for SimulatedLoadCell {
    fn is_ready(&mut self) -> bool {
        let mut st = self.state.borrow_mut();
        if !st.powered {
            return false;
        }
        if st.not_ready_polls > 0 {
            st.not_ready_polls -= 1;
            return false;
        }
        true
    }

    fn read_raw(&mut self) -> Result<i32, Box<dyn std::error::Error + Send + Sync>> {
        let mut st = self.state.borrow_mut();
        if !st.powered {
            return Err(Box::new(HwError::PoweredDown));
        }
        if let Some((clock, period)) = &st.conversion {
            clock.sleep(*period);
        }
        if st.fail_next {
            st.fail_next = false;
            return Err(Box::new(HwError::DataReadyTimeout));
        }
        if let Some(v) = st.plan.pop_front() {
            st.last = v;
        }
        st.reads += 1;
        tracing::trace!(raw = st.last, "simulated load cell read");
        Ok(st.last)
    }

    fn power_up(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.state.borrow_mut().powered = true;
        Ok(())
    }

    fn power_down(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.state.borrow_mut().powered = false;
        Ok(())
    }
}

#[derive(Default)]
struct IndicatorState {
    staged: (Rgb, u8),
    applied: Vec<(Rgb, u8)>,
    resets: usize,
}

/// Indicator that records every committed frame.
#[derive(Clone, Default)]
pub struct SimulatedIndicator {
    state: Rc<RefCell<IndicatorState>>,
}

impl SimulatedIndicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// All committed (color, brightness) frames, oldest first.
    pub fn frames(&self) -> Vec<(Rgb, u8)> {
        self.state.borrow().applied.clone()
    }

    pub fn last_applied(&self) -> Option<(Rgb, u8)> {
        self.state.borrow().applied.last().copied()
    }

    pub fn resets(&self) -> usize {
        self.state.borrow().resets
    }
}

impl Indicator for SimulatedIndicator {
    fn set(&mut self, color: Rgb, brightness: u8) {
        self.state.borrow_mut().staged = (color, brightness);
    }

    fn apply(&mut self) {
        let mut st = self.state.borrow_mut();
        let frame = st.staged;
        st.applied.push(frame);
    }

    fn reset(&mut self) {
        let mut st = self.state.borrow_mut();
        st.staged = (Rgb::OFF, 0);
        st.resets += 1;
    }
}

enum ButtonMode {
    /// Planned levels, then `idle` forever.
    Scripted { plan: VecDeque<Level>, idle: Level },
    /// Flips on every poll, so any wait resolves within two polls.
    Toggling { next: Level },
}

struct ButtonState {
    mode: ButtonMode,
    polls: usize,
}

/// Scripted pushbutton.
#[derive(Clone)]
pub struct SimulatedButton {
    state: Rc<RefCell<ButtonState>>,
}

impl SimulatedButton {
    pub fn scripted(plan: impl IntoIterator<Item = Level>, idle: Level) -> Self {
        Self::with_mode(ButtonMode::Scripted {
            plan: plan.into_iter().collect(),
            idle,
        })
    }

    /// `n` full press-then-release gestures for a button pressed at `active`.
    pub fn gestures(n: usize, active: Level) -> Self {
        let plan = (0..n).flat_map(|_| [active, !active]);
        Self::scripted(plan, !active)
    }

    pub fn toggling() -> Self {
        Self::with_mode(ButtonMode::Toggling { next: Level::High })
    }

    fn with_mode(mode: ButtonMode) -> Self {
        Self {
            state: Rc::new(RefCell::new(ButtonState { mode, polls: 0 })),
        }
    }

    pub fn polls(&self) -> usize {
        self.state.borrow().polls
    }
}

impl Trigger for SimulatedButton {
    fn level(&mut self) -> Result<Level, Box<dyn std::error::Error + Send + Sync>> {
        let mut st = self.state.borrow_mut();
        st.polls += 1;
        let level = match &mut st.mode {
            ButtonMode::Scripted { plan, idle } => plan.pop_front().unwrap_or(*idle),
            ButtonMode::Toggling { next } => {
                let level = *next;
                *next = !level;
                level
            }
        };
        Ok(level)
    }
}

struct LatchState {
    clock: Arc<dyn Clock + Send + Sync>,
    energized_at: Option<Instant>,
    pulses: Vec<Duration>,
    fail_energize: bool,
    failing_offs: u32,
}

/// Latch line that measures how long each pulse kept the solenoid energized.
#[derive(Clone)]
pub struct SimulatedLatchLine {
    state: Rc<RefCell<LatchState>>,
}

impl SimulatedLatchLine {
    pub fn new(clock: Arc<dyn Clock + Send + Sync>) -> Self {
        Self {
            state: Rc::new(RefCell::new(LatchState {
                clock,
                energized_at: None,
                pulses: Vec::new(),
                fail_energize: false,
                failing_offs: 0,
            })),
        }
    }

    /// Energizing reports an error (after driving the line, like a flaky driver ack).
    pub fn fail_energize(&self) {
        self.state.borrow_mut().fail_energize = true;
    }

    /// The next `count` off-switches report an error and leave the line energized.
    pub fn fail_deenergize(&self, count: u32) {
        self.state.borrow_mut().failing_offs = count;
    }

    pub fn pulses(&self) -> Vec<Duration> {
        self.state.borrow().pulses.clone()
    }

    pub fn is_energized(&self) -> bool {
        self.state.borrow().energized_at.is_some()
    }
}

impl LatchLine for SimulatedLatchLine {
    fn set_energized(
        &mut self,
        on: bool,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let mut st = self.state.borrow_mut();
        let now = st.clock.now();
        if on {
            if st.energized_at.is_none() {
                st.energized_at = Some(now);
            }
            if st.fail_energize {
                return Err(Box::new(HwError::Gpio("latch driver did not ack".into())));
            }
        } else if st.failing_offs > 0 {
            st.failing_offs -= 1;
            return Err(Box::new(HwError::Gpio("latch line stuck high".into())));
        } else if let Some(since) = st.energized_at.take() {
            let held = now.saturating_duration_since(since);
            st.pulses.push(held);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weighlock_traits::clock::test_clock::TestClock;

    #[test]
    fn load_cell_repeats_last_planned_value() {
        let mut cell = SimulatedLoadCell::from_plan([1, 2]);
        let reads: Vec<i32> = (0..4).map(|_| cell.read_raw().unwrap()).collect();
        assert_eq!(reads, vec![1, 2, 2, 2]);
        assert_eq!(cell.reads(), 4);
    }

    #[test]
    fn load_cell_not_ready_then_ready() {
        let mut cell = SimulatedLoadCell::new();
        cell.set_not_ready_for(2);
        assert!(!cell.is_ready());
        assert!(!cell.is_ready());
        assert!(cell.is_ready());
    }

    #[test]
    fn powered_down_load_cell_is_never_ready() {
        let mut cell = SimulatedLoadCell::new();
        cell.power_down().unwrap();
        assert!(!cell.is_ready());
        assert!(cell.read_raw().is_err());
        cell.power_up().unwrap();
        assert!(cell.is_ready());
    }

    #[test]
    fn conversion_time_advances_clock() {
        let clock = TestClock::new();
        let mut cell = SimulatedLoadCell::from_plan([5])
            .with_conversion_time(Arc::new(clock.clone()), Duration::from_millis(12));
        cell.read_raw().unwrap();
        cell.read_raw().unwrap();
        assert_eq!(clock.elapsed(), Duration::from_millis(24));
    }

    #[test]
    fn indicator_records_only_applied_frames() {
        let mut led = SimulatedIndicator::new();
        led.set(Rgb::BLUE, 40);
        led.set(Rgb::RED, 10);
        led.apply();
        led.reset();
        led.apply();
        assert_eq!(led.frames(), vec![(Rgb::RED, 10), (Rgb::OFF, 0)]);
        assert_eq!(led.resets(), 1);
    }

    #[test]
    fn button_gestures_then_idle() {
        let mut button = SimulatedButton::gestures(1, Level::High);
        assert_eq!(button.level().unwrap(), Level::High);
        assert_eq!(button.level().unwrap(), Level::Low);
        assert_eq!(button.level().unwrap(), Level::Low);
        assert_eq!(button.polls(), 3);
    }

    #[test]
    fn toggling_button_alternates() {
        let mut button = SimulatedButton::toggling();
        let levels: Vec<Level> = (0..3).map(|_| button.level().unwrap()).collect();
        assert_eq!(levels, vec![Level::High, Level::Low, Level::High]);
    }

    #[test]
    fn latch_line_measures_pulse() {
        let clock = TestClock::new();
        let mut line = SimulatedLatchLine::new(Arc::new(clock.clone()));
        line.set_energized(true).unwrap();
        assert!(line.is_energized());
        clock.advance(Duration::from_millis(80));
        line.set_energized(false).unwrap();
        assert!(!line.is_energized());
        assert_eq!(line.pulses(), vec![Duration::from_millis(80)]);
    }

    #[test]
    fn stuck_latch_line_stays_energized_until_released() {
        let clock = TestClock::new();
        let mut line = SimulatedLatchLine::new(Arc::new(clock.clone()));
        line.fail_deenergize(1);
        line.set_energized(true).unwrap();
        assert!(line.set_energized(false).is_err());
        assert!(line.is_energized());
        clock.advance(Duration::from_millis(5));
        line.set_energized(false).unwrap();
        assert!(!line.is_energized());
        assert_eq!(line.pulses(), vec![Duration::from_millis(5)]);
    }
}
