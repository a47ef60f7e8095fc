//! rppal-backed drivers for the indicator LED, the pushbutton and the latch line.

use std::time::Duration;

use rppal::gpio::{Gpio, InputPin, OutputPin};
use weighlock_traits::{Indicator, LatchLine, Level, Rgb, Trigger};

use crate::error::{HwError, Result};

/// Software PWM carrier for the LED channels.
const PWM_FREQUENCY_HZ: f64 = 500.0;
/// Brightness scale used by `Indicator::set`.
pub const MAX_BRIGHTNESS: u8 = 100;

fn output_pin(gpio: &Gpio, pin: u8, what: &str) -> Result<OutputPin> {
    Ok(gpio
        .get(pin)
        .map_err(|e| HwError::Gpio(format!("open {what} pin {pin}: {e}")))?
        .into_output())
}

/// Three-channel RGB LED on software PWM.
///
/// Common-anode parts sink current, so their duty cycle is inverted.
pub struct PwmRgbLed {
    red: OutputPin,
    green: OutputPin,
    blue: OutputPin,
    common_anode: bool,
    color: Rgb,
    brightness: u8,
}

impl PwmRgbLed {
    pub fn new(red_pin: u8, green_pin: u8, blue_pin: u8, common_anode: bool) -> Result<Self> {
        let gpio = Gpio::new().map_err(|e| HwError::Gpio(format!("open gpio: {e}")))?;
        let mut led = Self {
            red: output_pin(&gpio, red_pin, "led red")?,
            green: output_pin(&gpio, green_pin, "led green")?,
            blue: output_pin(&gpio, blue_pin, "led blue")?,
            common_anode,
            color: Rgb::OFF,
            brightness: 0,
        };
        led.write()?;
        Ok(led)
    }

    fn duty(&self, channel: u8) -> f64 {
        let scaled = f64::from(channel) * f64::from(self.brightness) / f64::from(MAX_BRIGHTNESS);
        let duty = (scaled / 255.0).clamp(0.0, 1.0);
        if self.common_anode { 1.0 - duty } else { duty }
    }

    fn write(&mut self) -> Result<()> {
        let (r, g, b) = (
            self.duty(self.color.r),
            self.duty(self.color.g),
            self.duty(self.color.b),
        );
        for (pin, duty) in [(&mut self.red, r), (&mut self.green, g), (&mut self.blue, b)] {
            pin.set_pwm_frequency(PWM_FREQUENCY_HZ, duty)
                .map_err(|e| HwError::Pwm(e.to_string()))?;
        }
        Ok(())
    }
}

impl Indicator for PwmRgbLed {
    fn set(&mut self, color: Rgb, brightness: u8) {
        self.color = color;
        self.brightness = brightness.min(MAX_BRIGHTNESS);
    }

    fn apply(&mut self) {
        if let Err(e) = self.write() {
            tracing::warn!(error = %e, "indicator apply failed");
        }
    }

    fn reset(&mut self) {
        self.color = Rgb::OFF;
        self.brightness = 0;
    }
}

/// Pushbutton input with a settle-and-confirm debounce.
pub struct GpioButton {
    pin: InputPin,
    debounce: Duration,
}

impl GpioButton {
    pub fn new(pin: u8, debounce: Duration) -> Result<Self> {
        let gpio = Gpio::new().map_err(|e| HwError::Gpio(format!("open gpio: {e}")))?;
        let pin = gpio
            .get(pin)
            .map_err(|e| HwError::Gpio(format!("open button pin {pin}: {e}")))?
            .into_input_pulldown();
        Ok(Self { pin, debounce })
    }
}

impl Trigger for GpioButton {
    fn level(&mut self) -> std::result::Result<Level, Box<dyn std::error::Error + Send + Sync>> {
        // A level only counts once it reads the same on both sides of the window.
        loop {
            let first = self.pin.is_high();
            std::thread::sleep(self.debounce);
            if self.pin.is_high() == first {
                return Ok(Level::from(first));
            }
        }
    }
}

/// Solenoid driver input. Idles de-energized (the lock is closed without power).
pub struct GpioLatchLine {
    pin: OutputPin,
}

impl GpioLatchLine {
    pub fn new(pin: u8) -> Result<Self> {
        let gpio = Gpio::new().map_err(|e| HwError::Gpio(format!("open gpio: {e}")))?;
        let mut pin = output_pin(&gpio, pin, "latch")?;
        pin.set_low();
        Ok(Self { pin })
    }
}

impl LatchLine for GpioLatchLine {
    fn set_energized(
        &mut self,
        on: bool,
    ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if on {
            self.pin.set_high();
        } else {
            self.pin.set_low();
        }
        Ok(())
    }
}
