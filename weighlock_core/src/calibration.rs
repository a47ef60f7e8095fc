//! Raw-count to weight conversion learned during a session.

/// Linear model `weight = (raw - offset) / scale_factor`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    /// Tare reading in raw counts (empty scale).
    pub offset: f64,
    /// Raw counts per weight unit; never zero.
    pub scale_factor: f64,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            offset: 0.0,
            scale_factor: 1.0,
        }
    }
}

impl Calibration {
    pub fn new(offset: f64, scale_factor: f64) -> Self {
        Self {
            offset,
            scale_factor,
        }
    }

    /// Net weight of a raw (or averaged raw) reading.
    #[inline]
    pub fn to_weight(&self, raw: f64) -> f64 {
        (raw - self.offset) / self.scale_factor
    }

    /// Raw counts that read as `weight`. Inverse of `to_weight`.
    #[inline]
    pub fn to_raw(&self, weight: f64) -> f64 {
        weight * self.scale_factor + self.offset
    }
}
