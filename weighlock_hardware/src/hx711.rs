use std::time::Duration;
use tracing::trace;

use rppal::gpio::{Gpio, InputPin, OutputPin};
use weighlock_traits::{Level, SampleSource};

use crate::error::{HwError, Result};
use crate::util::{sign_extend_24, wait_for_level_with_timeout};

/// SCK must stay high for at least 60 µs to enter power-down.
const POWER_DOWN_HOLD: Duration = Duration::from_micros(100);

pub struct Hx711 {
    dt: InputPin,
    sck: OutputPin,
    gain_pulses: u8, // 1 = A/128, 2 = B/32, 3 = A/64
    data_ready_timeout: Duration,
    powered: bool,
}

impl Hx711 {
    pub fn new(
        dt_pin: u8,
        sck_pin: u8,
        gain_pulses: u8,
        data_ready_timeout: Duration,
    ) -> Result<Self> {
        let gpio = Gpio::new().map_err(|e| HwError::Gpio(format!("open gpio: {e}")))?;
        let dt = gpio
            .get(dt_pin)
            .map_err(|e| HwError::Gpio(format!("open hx711 dt pin {dt_pin}: {e}")))?
            .into_input();
        let mut sck = gpio
            .get(sck_pin)
            .map_err(|e| HwError::Gpio(format!("open hx711 sck pin {sck_pin}: {e}")))?
            .into_output();
        sck.set_low(); // clock idle low keeps the chip powered
        Ok(Self {
            dt,
            sck,
            gain_pulses: gain_pulses.clamp(1, 3),
            data_ready_timeout,
            powered: true,
        })
    }

    fn data_ready(&self) -> bool {
        self.dt.is_low()
    }

    fn read_conversion(&mut self) -> Result<i32> {
        if !self.powered {
            return Err(HwError::PoweredDown);
        }
        let dt = &self.dt;
        wait_for_level_with_timeout(
            || Level::from(dt.is_high()),
            Level::Low,
            self.data_ready_timeout,
            Duration::from_micros(200),
        )?;

        // Clock out 24 bits, MSB first
        let mut value: u32 = 0;
        for _ in 0..24 {
            self.sck.set_high();
            spin_delay_100ns();
            value = (value << 1) | u32::from(self.dt.is_high());
            self.sck.set_low();
            spin_delay_100ns();
        }

        // Extra pulses select channel/gain for the next conversion
        for _ in 0..self.gain_pulses {
            self.sck.set_high();
            spin_delay_100ns();
            self.sck.set_low();
            spin_delay_100ns();
        }

        let raw = sign_extend_24(value);
        trace!(raw, "hx711 raw read");
        Ok(raw)
    }
}

impl SampleSource for Hx711 {
    fn is_ready(&mut self) -> bool {
        self.powered && self.data_ready()
    }

    fn read_raw(&mut self) -> std::result::Result<i32, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.read_conversion()?)
    }

    fn power_up(&mut self) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.sck.set_low();
        self.powered = true;
        tracing::debug!("hx711 powered up");
        Ok(())
    }

    fn power_down(&mut self) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.sck.set_low();
        self.sck.set_high();
        std::thread::sleep(POWER_DOWN_HOLD);
        self.powered = false;
        tracing::debug!("hx711 powered down");
        Ok(())
    }
}

#[inline(always)]
fn spin_delay_100ns() {
    std::hint::spin_loop();
}
