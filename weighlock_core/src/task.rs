//! Cooperative tasks: resumable state machines driven by a polling loop.
//!
//! A task is a struct holding an explicit resume label plus its own locals.
//! Every `resume` runs to the next yield point and reports how long it wants
//! to sleep. `Cooperative` remembers that wake-up instant so the caller can
//! poll it between hardware reads without ever blocking on it.

use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use weighlock_traits::Clock;

use crate::error::LockError;

/// Outcome of one resume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Resume again no sooner than this long from now.
    Yield(Duration),
    Complete,
}

/// A resumable computation borrowing `R` while it runs.
pub trait Task<R: ?Sized> {
    fn resume(&mut self, now: Instant, res: &mut R) -> Step;
}

/// Result of polling a `Cooperative`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Poll {
    /// The task ran once and yielded.
    Resumed,
    /// Its requested delay has not elapsed; nothing ran.
    Sleeping,
    Complete,
}

/// Point in time after which a wait gives up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Deadline {
    #[default]
    Never,
    At(Instant),
}

impl Deadline {
    /// `Never` when `timeout` is `None`.
    pub fn after(now: Instant, timeout: Option<Duration>) -> Self {
        match timeout {
            Some(t) => Deadline::At(now + t),
            None => Deadline::Never,
        }
    }

    pub fn expired(&self, now: Instant) -> bool {
        match self {
            Deadline::Never => false,
            Deadline::At(at) => now >= *at,
        }
    }

    /// `Err(Timeout(what))` once expired.
    pub fn check(&self, now: Instant, what: &'static str) -> Result<(), LockError> {
        if self.expired(now) {
            Err(LockError::Timeout(what))
        } else {
            Ok(())
        }
    }
}

/// Shared "please finish" flag between a sequencer and the task it drives.
#[derive(Debug, Clone, Default)]
pub struct DoneFlag(Rc<Cell<bool>>);

impl DoneFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.set(true);
    }

    pub fn is_raised(&self) -> bool {
        self.0.get()
    }

    pub fn clear(&self) {
        self.0.set(false);
    }
}

/// Drives a task, honoring the delay it asked for on each yield.
#[derive(Debug)]
pub struct Cooperative<T> {
    task: T,
    wake_at: Option<Instant>,
    complete: bool,
    resumes: u64,
}

impl<T> Cooperative<T> {
    pub fn new(task: T) -> Self {
        Self {
            task,
            wake_at: None,
            complete: false,
            resumes: 0,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Number of times the task has actually been resumed.
    pub fn resumes(&self) -> u64 {
        self.resumes
    }

    /// Earliest instant the next resume may happen, if one is pending.
    pub fn wake_at(&self) -> Option<Instant> {
        if self.complete { None } else { self.wake_at }
    }

    pub fn task(&self) -> &T {
        &self.task
    }

    /// Resume the task once if it is due. Never blocks.
    pub fn poll<R: ?Sized>(&mut self, now: Instant, res: &mut R) -> Poll
    where
        T: Task<R>,
    {
        if self.complete {
            return Poll::Complete;
        }
        match self.wake_at {
            Some(at) if now < at => return Poll::Sleeping,
            _ => {}
        }
        self.resumes += 1;
        match self.task.resume(now, res) {
            Step::Yield(delay) => {
                self.wake_at = Some(now + delay);
                Poll::Resumed
            }
            Step::Complete => {
                self.complete = true;
                self.wake_at = None;
                Poll::Complete
            }
        }
    }

    /// Run the task to completion, sleeping on `clock` until each wake-up.
    pub fn drain<R, C>(
        &mut self,
        clock: &C,
        res: &mut R,
        deadline: Deadline,
    ) -> Result<(), LockError>
    where
        R: ?Sized,
        C: Clock + ?Sized,
        T: Task<R>,
    {
        loop {
            let now = clock.now();
            if self.poll(now, res) == Poll::Complete {
                return Ok(());
            }
            deadline.check(now, "task to finish")?;
            if let Some(at) = self.wake_at {
                clock.sleep_until(at);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weighlock_traits::clock::test_clock::TestClock;

    /// Counts up to `limit`, one step per resume, yielding `every` between steps.
    struct Counter {
        limit: u32,
        every: Duration,
    }

    impl Task<u32> for Counter {
        fn resume(&mut self, _now: Instant, res: &mut u32) -> Step {
            if *res >= self.limit {
                return Step::Complete;
            }
            *res += 1;
            Step::Yield(self.every)
        }
    }

    #[test]
    fn poll_respects_requested_delay() {
        let clock = TestClock::new();
        let mut total = 0u32;
        let mut co = Cooperative::new(Counter {
            limit: 10,
            every: Duration::from_millis(10),
        });

        assert_eq!(co.poll(clock.now(), &mut total), Poll::Resumed);
        assert_eq!(co.poll(clock.now(), &mut total), Poll::Sleeping);
        clock.advance(Duration::from_millis(9));
        assert_eq!(co.poll(clock.now(), &mut total), Poll::Sleeping);
        clock.advance(Duration::from_millis(1));
        assert_eq!(co.poll(clock.now(), &mut total), Poll::Resumed);
        assert_eq!(total, 2);
        assert_eq!(co.resumes(), 2);
    }

    #[test]
    fn completed_task_is_never_resumed() {
        let clock = TestClock::new();
        let mut total = 0u32;
        let mut co = Cooperative::new(Counter {
            limit: 1,
            every: Duration::ZERO,
        });
        assert_eq!(co.poll(clock.now(), &mut total), Poll::Resumed);
        assert_eq!(co.poll(clock.now(), &mut total), Poll::Complete);
        let resumes = co.resumes();
        assert_eq!(co.poll(clock.now(), &mut total), Poll::Complete);
        assert_eq!(co.resumes(), resumes);
        assert!(co.wake_at().is_none());
    }

    #[test]
    fn drain_sleeps_until_each_wake() {
        let clock = TestClock::new();
        let mut total = 0u32;
        let mut co = Cooperative::new(Counter {
            limit: 5,
            every: Duration::from_millis(20),
        });
        co.drain(&clock, &mut total, Deadline::Never).unwrap();
        assert_eq!(total, 5);
        assert!(co.is_complete());
        assert_eq!(clock.elapsed(), Duration::from_millis(100));
    }

    #[test]
    fn drain_honors_deadline() {
        let clock = TestClock::new();
        let mut total = 0u32;
        let mut co = Cooperative::new(Counter {
            limit: u32::MAX,
            every: Duration::from_millis(20),
        });
        let deadline = Deadline::after(clock.now(), Some(Duration::from_millis(50)));
        let err = co.drain(&clock, &mut total, deadline).unwrap_err();
        assert_eq!(err, LockError::Timeout("task to finish"));
        assert!(total >= 3);
    }

    #[test]
    fn done_flag_is_shared() {
        let flag = DoneFlag::new();
        let other = flag.clone();
        assert!(!other.is_raised());
        flag.raise();
        assert!(other.is_raised());
        other.clear();
        assert!(!flag.is_raised());
    }

    #[test]
    fn deadline_never_does_not_expire() {
        let clock = TestClock::new();
        let d = Deadline::after(clock.now(), None);
        clock.advance(Duration::from_secs(3600));
        assert!(!d.expired(clock.now()));
        assert!(d.check(clock.now(), "x").is_ok());
    }
}
