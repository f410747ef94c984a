use std::time::Duration;

use rppal::gpio::{Gpio, InputPin, OutputPin};
use rig_traits::{BoxError, ForceSensor};
use tracing::{debug, trace};

use crate::error::{HwError, Result};
use crate::util::poll_until;

/// SCK must stay high at least 60 µs for the HX711 to enter power-down.
const POWER_DOWN_HOLD: Duration = Duration::from_micros(80);

pub struct Hx711 {
    dt: InputPin,
    sck: OutputPin,
    gain_pulses: u8, // 25, 26, 27 based on gain/channel
    powered: bool,
}

impl Hx711 {
    pub fn new(dt_pin: u8, sck_pin: u8, gain_pulses: u8) -> Result<Self> {
        let gpio = Gpio::new().map_err(|e| HwError::Gpio(e.to_string()))?;
        let dt = gpio
            .get(dt_pin)
            .map_err(|e| HwError::Gpio(format!("open hx711 dout pin {dt_pin}: {e}")))?
            .into_input();
        let mut sck = gpio
            .get(sck_pin)
            .map_err(|e| HwError::Gpio(format!("open hx711 sck pin {sck_pin}: {e}")))?
            .into_output();
        sck.set_low(); // clock idle low == powered
        Ok(Self {
            dt,
            sck,
            gain_pulses,
            powered: true,
        })
    }

    pub fn read_with_timeout(&mut self, timeout: Duration) -> Result<i32> {
        if !self.powered {
            return Err(HwError::PoweredDown);
        }
        poll_until(|| self.dt.is_low(), timeout, Duration::from_micros(200))?;

        let mut value: i32 = 0;
        for _ in 0..24 {
            self.sck.set_high();
            std::hint::spin_loop();
            value = (value << 1) | i32::from(self.dt.is_high());
            self.sck.set_low();
            std::hint::spin_loop();
        }
        // Extra pulses select gain/channel for the next conversion
        for _ in 0..self.gain_pulses.saturating_sub(24) {
            self.sck.set_high();
            std::hint::spin_loop();
            self.sck.set_low();
            std::hint::spin_loop();
        }

        // Sign extend 24-bit two's complement
        if (value & 0x80_0000) != 0 {
            value |= !0xFF_FFFF;
        }
        trace!(raw = value, "hx711 raw read");
        Ok(value)
    }

    pub fn power_down(&mut self) {
        self.sck.set_low();
        self.sck.set_high();
        std::thread::sleep(POWER_DOWN_HOLD);
        self.powered = false;
    }

    pub fn power_up(&mut self) {
        self.sck.set_low();
        self.powered = true;
    }
}

/// HX711 plus tare and scale: `units = (raw - tare_counts) / counts_per_unit`.
pub struct LoadCell {
    hx711: Hx711,
    tare_counts: i32,
    counts_per_unit: f32,
    timeout: Duration,
}

impl LoadCell {
    pub fn new(hx711: Hx711, counts_per_unit: f32, timeout: Duration) -> Self {
        Self {
            hx711,
            tare_counts: 0,
            counts_per_unit,
            timeout,
        }
    }

    pub fn with_tare(mut self, tare_counts: i32) -> Self {
        self.tare_counts = tare_counts;
        self
    }

    /// Average `samples` reads and store the result as the zero point.
    pub fn tare(&mut self, samples: u32) -> Result<i32> {
        let n = samples.max(1);
        let mut sum: i64 = 0;
        for _ in 0..n {
            sum += i64::from(self.hx711.read_with_timeout(self.timeout)?);
        }
        self.tare_counts = (sum / i64::from(n)) as i32;
        debug!(tare_counts = self.tare_counts, "load cell tared");
        Ok(self.tare_counts)
    }
}

impl ForceSensor for LoadCell {
    fn get_reading(&mut self) -> std::result::Result<f32, BoxError> {
        let raw = self.hx711.read_with_timeout(self.timeout)?;
        Ok(raw.saturating_sub(self.tare_counts) as f32 / self.counts_per_unit)
    }

    fn power_down(&mut self) -> std::result::Result<(), BoxError> {
        self.hx711.power_down();
        Ok(())
    }

    fn power_up(&mut self) -> std::result::Result<(), BoxError> {
        self.hx711.power_up();
        Ok(())
    }
}
