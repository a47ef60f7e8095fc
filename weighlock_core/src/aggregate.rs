//! Fixed-capacity running statistics over the most recent readings.
//!
//! `RunningAggregate` keeps the last `capacity` values in a bounded deque and
//! answers mean, population variance and "is the mean within tolerance of a
//! target" over whatever it currently holds. Pushing past capacity evicts the
//! oldest value.

use std::collections::VecDeque;

#[inline]
fn as_f64<T: Into<f64>>(v: T) -> f64 {
    v.into()
}

/// Window over the last `capacity` samples, oldest first.
#[derive(Debug, Clone)]
pub struct RunningAggregate<T> {
    buf: VecDeque<T>,
    cap: usize,
}

impl<T: Copy + Into<f64>> RunningAggregate<T> {
    /// A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let cap = capacity.max(1);
        Self {
            buf: VecDeque::with_capacity(cap),
            cap,
        }
    }

    /// Append a value, evicting the oldest when full.
    pub fn add(&mut self, value: T) {
        if self.buf.len() == self.cap {
            self.buf.pop_front();
        }
        self.buf.push_back(value);
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn capacity(&self) -> usize {
        self.cap
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.buf.len() == self.cap
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Stored values, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        self.buf.iter().copied()
    }

    /// Arithmetic mean of the stored values.
    ///
    /// # Panics
    /// Panics when empty; callers check `is_empty` first.
    pub fn mean(&self) -> f64 {
        assert!(!self.buf.is_empty(), "mean of an empty aggregate");
        let n = self.buf.len() as f64;
        self.buf.iter().map(|&v| as_f64(v)).sum::<f64>() / n
    }

    /// Population variance (divides by n). Zero when empty.
    ///
    /// Values are shifted by the first sample before squaring so that
    /// large raw counts with a small spread keep their precision and a
    /// constant stream gives exactly zero.
    pub fn variance(&self) -> f64 {
        let Some(&first) = self.buf.front() else {
            return 0.0;
        };
        let shift: f64 = first.into();
        let n = self.buf.len() as f64;
        let mean = self.buf.iter().map(|&v| as_f64(v) - shift).sum::<f64>() / n;
        self.buf
            .iter()
            .map(|&v| {
                let d = as_f64(v) - shift - mean;
                d * d
            })
            .sum::<f64>()
            / n
    }

    /// `|mean - target| <= tolerance`.
    ///
    /// # Panics
    /// Panics when empty, like `mean`.
    pub fn is_within_tolerance(&self, target: f64, tolerance: f64) -> bool {
        (self.mean() - target).abs() <= tolerance
    }
}
