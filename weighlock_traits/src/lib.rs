pub mod clock;

pub use clock::{Clock, MonotonicClock};

/// 8-bit RGB color as driven onto the indicator LED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const OFF: Rgb = Rgb::new(0, 0, 0);
    pub const RED: Rgb = Rgb::new(255, 0, 0);
    pub const GREEN: Rgb = Rgb::new(0, 255, 0);
    pub const BLUE: Rgb = Rgb::new(0, 0, 255);
    pub const AMBER: Rgb = Rgb::new(255, 140, 0);
    pub const PURPLE: Rgb = Rgb::new(160, 0, 255);
    pub const WHITE: Rgb = Rgb::new(255, 255, 255);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// Logic level of a discrete input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Low,
    High,
}

impl std::ops::Not for Level {
    type Output = Level;

    fn not(self) -> Level {
        match self {
            Level::Low => Level::High,
            Level::High => Level::Low,
        }
    }
}

impl From<bool> for Level {
    fn from(high: bool) -> Self {
        if high { Level::High } else { Level::Low }
    }
}

/// Load-cell amplifier (HX711 or simulation).
///
/// `is_ready` is polled before every read; "not ready" is a transient
/// condition for the caller to retry, never an error.
pub trait SampleSource {
    fn is_ready(&mut self) -> bool;
    fn read_raw(&mut self) -> Result<i32, Box<dyn std::error::Error + Send + Sync>>;
    fn power_up(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
    fn power_down(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// RGB indicator. Calls are fire-and-forget.
pub trait Indicator {
    /// Stage a color and a brightness in `0..=100`.
    fn set(&mut self, color: Rgb, brightness: u8);
    /// Commit the staged values to the hardware.
    fn apply(&mut self);
    /// Zero the staged color and brightness (does not commit).
    fn reset(&mut self);
}

/// Discrete input such as the front-panel pushbutton. Debouncing is the
/// implementation's job.
pub trait Trigger {
    fn level(&mut self) -> Result<Level, Box<dyn std::error::Error + Send + Sync>>;
}

/// On/off output driving the latch solenoid.
pub trait LatchLine {
    fn set_energized(
        &mut self,
        on: bool,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

impl<T: SampleSource + ?Sized> SampleSource for Box<T> {
    fn is_ready(&mut self) -> bool {
        (**self).is_ready()
    }
    fn read_raw(&mut self) -> Result<i32, Box<dyn std::error::Error + Send + Sync>> {
        (**self).read_raw()
    }
    fn power_up(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).power_up()
    }
    fn power_down(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).power_down()
    }
}

impl<T: Indicator + ?Sized> Indicator for Box<T> {
    fn set(&mut self, color: Rgb, brightness: u8) {
        (**self).set(color, brightness);
    }
    fn apply(&mut self) {
        (**self).apply();
    }
    fn reset(&mut self) {
        (**self).reset();
    }
}

impl<T: Trigger + ?Sized> Trigger for Box<T> {
    fn level(&mut self) -> Result<Level, Box<dyn std::error::Error + Send + Sync>> {
        (**self).level()
    }
}

impl<T: LatchLine + ?Sized> LatchLine for Box<T> {
    fn set_energized(
        &mut self,
        on: bool,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).set_energized(on)
    }
}
