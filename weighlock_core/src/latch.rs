//! Spring latch driven by a solenoid: every release is one bounded pulse.

use std::sync::Arc;
use std::time::{Duration, Instant};

use eyre::WrapErr;
use weighlock_traits::{Clock, LatchLine};

use crate::config::LatchCfg;
use crate::error::Result;
use crate::hw_error::hw_report;

/// The solenoid overheats past this; no configuration can exceed it.
pub const SAFETY_MAX_PULSE: Duration = Duration::from_millis(100);

/// Off-switch attempts before a stuck line is reported.
const OFF_ATTEMPTS: u32 = 3;

type LineError = Box<dyn std::error::Error + Send + Sync>;

pub struct SpringLatch<L> {
    line: L,
    clock: Arc<dyn Clock + Send + Sync>,
    pulse: Duration,
    rerelease_interval: Duration,
    last_release: Option<Instant>,
    releases: u32,
}

impl<L: LatchLine> SpringLatch<L> {
    /// `pulse` is clamped to `max_pulse`, itself clamped to `SAFETY_MAX_PULSE`.
    pub fn new(line: L, clock: Arc<dyn Clock + Send + Sync>, cfg: &LatchCfg) -> Self {
        let max = Duration::from_millis(cfg.max_pulse_ms).min(SAFETY_MAX_PULSE);
        Self {
            line,
            clock,
            pulse: Duration::from_millis(cfg.pulse_ms).min(max),
            rerelease_interval: Duration::from_millis(cfg.rerelease_interval_ms),
            last_release: None,
            releases: 0,
        }
    }

    /// Effective energize time of one release.
    pub fn pulse(&self) -> Duration {
        self.pulse
    }

    pub fn releases(&self) -> u32 {
        self.releases
    }

    /// Energize, hold for the pulse, de-energize. The line is always switched
    /// off again, even when switching it on reported an error, and a failing
    /// off-switch is retried up to `OFF_ATTEMPTS` times.
    pub fn release(&mut self) -> Result<()> {
        let energized = self.line.set_energized(true);
        if energized.is_ok() {
            self.clock.sleep(self.pulse);
        }
        let released = self.switch_off();
        self.last_release = Some(self.clock.now());
        self.releases += 1;
        tracing::info!(pulse_ms = self.pulse.as_millis() as u64, "latch released");

        energized
            .map_err(|e| hw_report(&*e))
            .wrap_err("energizing latch solenoid")?;
        released
            .map_err(|e| hw_report(&*e))
            .wrap_err("de-energizing latch solenoid")?;
        Ok(())
    }

    /// Drive the line low whatever state it is believed to be in.
    pub fn force_off(&mut self) -> Result<()> {
        self.switch_off()
            .map_err(|e| hw_report(&*e))
            .wrap_err("forcing latch solenoid off")
    }

    fn switch_off(&mut self) -> std::result::Result<(), LineError> {
        let mut attempt = 1;
        loop {
            match self.line.set_energized(false) {
                Ok(()) => return Ok(()),
                Err(e) if attempt < OFF_ATTEMPTS => {
                    tracing::warn!(attempt, error = %e, "latch off-switch failed, retrying");
                    attempt += 1;
                }
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "latch off-switch failed, giving up");
                    return Err(e);
                }
            }
        }
    }

    /// Release again unless the previous release was under
    /// `rerelease_interval` ago. Returns whether a pulse was fired.
    pub fn try_rerelease(&mut self) -> Result<bool> {
        if let Some(last) = self.last_release {
            let since = self.clock.elapsed_since(last);
            if since < self.rerelease_interval {
                tracing::debug!(
                    since_ms = since.as_millis() as u64,
                    "re-release ignored, too soon"
                );
                return Ok(false);
            }
        }
        self.release()?;
        Ok(true)
    }
}
