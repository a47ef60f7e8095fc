#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Core puzzle-box logic (hardware-agnostic).
//!
//! All hardware interactions go through the `weighlock_traits` collaborators:
//! `SampleSource` (load cell), `Indicator` (RGB LED), `Trigger` (button) and
//! `LatchLine` (solenoid).
//!
//! ## Architecture
//!
//! - **Aggregation**: fixed-capacity running mean/variance (`aggregate`)
//! - **Cooperation**: resumable tasks polled between hardware reads (`task`)
//! - **Feedback**: the fading indicator as one such task (`animation`)
//! - **Stability**: two-threshold variance hysteresis (`stability`)
//! - **Actuation**: the bounded solenoid pulse (`latch`)
//! - **Control**: the calibrate → arm → verify → unlock machine (`machine`)
//!
//! Everything runs on the caller's thread; the only suspension is a task
//! yielding back to the loop that polls it.

pub mod aggregate;
pub mod animation;
pub mod builder;
pub mod calibration;
pub mod config;
pub mod conversions;
pub mod error;
pub mod hw_error;
pub mod latch;
pub mod machine;
pub mod stability;
pub mod status;
pub mod task;

pub use aggregate::RunningAggregate;
pub use animation::{FadeCurve, FadeTask, Pacing};
pub use builder::PuzzleBoxBuilder;
pub use calibration::Calibration;
pub use config::{
    AnimationCfg, LatchCfg, Palette, RejectCfg, RetryPolicy, ScaleCfg, SessionCfg, StabilityCfg,
};
pub use error::{BuildError, LockError, Report, Result};
pub use hw_error::map_hw_error;
pub use latch::{SAFETY_MAX_PULSE, SpringLatch};
pub use machine::PuzzleBox;
pub use stability::{Stability, StabilityDetector};
pub use status::{SessionOutcome, State, Verdict};
pub use task::{Cooperative, Deadline, DoneFlag, Poll, Step, Task};
