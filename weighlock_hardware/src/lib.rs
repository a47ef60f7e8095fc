//! Hardware wrappers for the puzzle box: rppal GPIO drivers behind the
//! `hardware` feature and scripted simulators that are always available.

pub mod error;
pub mod sim;
pub mod util;

#[cfg(all(feature = "hardware", target_os = "linux"))]
pub mod gpio;
#[cfg(all(feature = "hardware", target_os = "linux"))]
pub mod hx711;

pub use error::HwError;
pub use sim::{SimulatedButton, SimulatedIndicator, SimulatedLatchLine, SimulatedLoadCell};
