//! Two-threshold settle detector over the variance of recent readings.

/// What a single variance observation did to the detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stability {
    /// Still moving.
    Unsettled,
    /// Just crossed down to `equilibrium`.
    Settled,
    /// Was settled and still is.
    Holding,
    /// Was settled, variance rose above `changing`.
    Disturbed,
}

/// Hysteresis between an `equilibrium` and a `changing` variance.
///
/// Settles at or under `equilibrium`; once settled, only a variance strictly
/// above `changing` unsettles it. Anything in between keeps the previous state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StabilityDetector {
    equilibrium: f64,
    changing: f64,
    settled: bool,
}

impl StabilityDetector {
    pub fn new(equilibrium: f64, changing: f64) -> Self {
        Self {
            equilibrium,
            changing,
            settled: false,
        }
    }

    pub fn observe(&mut self, variance: f64) -> Stability {
        if self.settled {
            if variance > self.changing {
                self.settled = false;
                Stability::Disturbed
            } else {
                Stability::Holding
            }
        } else if variance <= self.equilibrium {
            self.settled = true;
            Stability::Settled
        } else {
            Stability::Unsettled
        }
    }

    pub fn is_settled(&self) -> bool {
        self.settled
    }

    pub fn reset(&mut self) {
        self.settled = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settles_at_equilibrium_inclusive() {
        let mut d = StabilityDetector::new(1e-4, 1e-3);
        assert_eq!(d.observe(5e-4), Stability::Unsettled);
        assert_eq!(d.observe(1e-4), Stability::Settled);
        assert!(d.is_settled());
    }

    #[test]
    fn between_thresholds_holds_previous_state() {
        let mut d = StabilityDetector::new(1e-4, 1e-3);
        assert_eq!(d.observe(5e-4), Stability::Unsettled);
        assert_eq!(d.observe(0.0), Stability::Settled);
        assert_eq!(d.observe(5e-4), Stability::Holding);
        assert_eq!(d.observe(1e-3), Stability::Holding);
        assert_eq!(d.observe(1.1e-3), Stability::Disturbed);
        assert_eq!(d.observe(5e-4), Stability::Unsettled);
    }

    #[test]
    fn reset_unsettles() {
        let mut d = StabilityDetector::new(1.0, 2.0);
        d.observe(0.0);
        d.reset();
        assert!(!d.is_settled());
        assert_eq!(d.observe(0.5), Stability::Settled);
    }
}
