//! Time source for the puzzle box.
//!
//! Three things read it: the latch holds the solenoid for one pulse, the fade
//! task places each frame on its curve by elapsed time, and button and scale
//! waits compare against their deadlines. Tests swap in [`test_clock::TestClock`]
//! so none of those waits cost real time.

use std::time::{Duration, Instant};

pub trait Clock {
    fn now(&self) -> Instant;

    /// Block for `d`. The latch pulse is held with this, so an implementation
    /// must not return early on a real line.
    fn sleep(&self, d: Duration);

    /// Time since `epoch`; zero if `epoch` lies ahead.
    fn elapsed_since(&self, epoch: Instant) -> Duration {
        self.now().saturating_duration_since(epoch)
    }

    /// Sleep until `at`. Returns at once when `at` has already passed, which
    /// happens when a sample read overruns a fade frame.
    fn sleep_until(&self, at: Instant) {
        let left = at.saturating_duration_since(self.now());
        if !left.is_zero() {
            self.sleep(left);
        }
    }
}

/// Wall time from `Instant::now` and `thread::sleep`.
#[derive(Debug, Default, Clone, Copy)]
pub struct MonotonicClock;

impl MonotonicClock {
    pub fn new() -> Self {
        Self
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, d: Duration) {
        if !d.is_zero() {
            std::thread::sleep(d);
        }
    }
}

#[cfg(any(test, feature = "testing"))]
pub mod test_clock {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Virtual time. `sleep` moves the clock forward instead of blocking, so a
    /// latch pulse lasts exactly its configured length and a fade period or a
    /// wait timeout elapses instantly. Clones share one timeline.
    #[derive(Debug, Clone)]
    pub struct TestClock {
        origin: Instant,
        offset: Arc<Mutex<Duration>>,
    }

    impl Default for TestClock {
        fn default() -> Self {
            Self::new()
        }
    }

    impl TestClock {
        pub fn new() -> Self {
            Self {
                origin: Instant::now(),
                offset: Arc::new(Mutex::new(Duration::ZERO)),
            }
        }

        /// Step time forward, e.g. past a re-release interval.
        pub fn advance(&self, d: Duration) {
            if let Ok(mut off) = self.offset.lock() {
                *off = off.saturating_add(d);
            }
        }

        /// Virtual time since construction.
        pub fn elapsed(&self) -> Duration {
            self.offset.lock().map(|g| *g).unwrap_or(Duration::ZERO)
        }
    }

    impl Clock for TestClock {
        fn now(&self) -> Instant {
            self.origin + self.elapsed()
        }

        fn sleep(&self, d: Duration) {
            self.advance(d);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_clock::TestClock;
    use super::*;

    #[test]
    fn sleeping_advances_virtual_time() {
        let clock = TestClock::new();
        let epoch = clock.now();
        clock.sleep(Duration::from_millis(80));
        assert_eq!(clock.elapsed_since(epoch), Duration::from_millis(80));
        clock.advance(Duration::from_millis(5));
        assert_eq!(clock.elapsed(), Duration::from_millis(85));
    }

    #[test]
    fn elapsed_since_a_future_instant_is_zero() {
        let clock = TestClock::new();
        let ahead = clock.now() + Duration::from_secs(1);
        assert_eq!(clock.elapsed_since(ahead), Duration::ZERO);
    }

    #[test]
    fn sleep_until_a_passed_instant_does_not_move_time() {
        let clock = TestClock::new();
        let frame_due = clock.now() + Duration::from_millis(20);
        clock.advance(Duration::from_millis(35));
        clock.sleep_until(frame_due);
        assert_eq!(clock.elapsed(), Duration::from_millis(35));
        clock.sleep_until(clock.now() + Duration::from_millis(15));
        assert_eq!(clock.elapsed(), Duration::from_millis(50));
    }
}
