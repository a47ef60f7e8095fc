//! Controller states and session outcomes.

use std::fmt;

/// Position of the puzzle box in its calibrate → arm → verify → unlock cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    WaitTareSignal,
    Taring,
    WaitTargetSignal,
    LearningTarget,
    ArmedWaiting,
    Weighing,
    Unlocked,
    Rejected,
}

impl State {
    pub fn as_str(self) -> &'static str {
        match self {
            State::Idle => "idle",
            State::WaitTareSignal => "wait_tare_signal",
            State::Taring => "taring",
            State::WaitTargetSignal => "wait_target_signal",
            State::LearningTarget => "learning_target",
            State::ArmedWaiting => "armed_waiting",
            State::Weighing => "weighing",
            State::Unlocked => "unlocked",
            State::Rejected => "rejected",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A finalized weighing: the settled mean against the learned target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Verdict {
    pub measured: f64,
    pub target: f64,
    pub tolerance: f64,
    pub matched: bool,
}

/// How `PuzzleBox::run` ended.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SessionOutcome {
    /// Latch released.
    Unlocked(Verdict),
    /// Wrong weight under the `Terminate` retry policy.
    Rejected(Verdict),
}
