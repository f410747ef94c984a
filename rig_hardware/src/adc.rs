//! ADS1015 12-bit ADC on the Pi's I2C bus, read in single-shot mode.
//!
//! Two single-ended inputs carry the bus voltage and current-sense signals;
//! counts are handed to the caller uncalibrated.

use std::thread;
use std::time::Duration;

use rig_traits::{BoxError, PowerSensor, RawPowerSample};
use rppal::i2c::I2c;
use tracing::{debug, trace};

use crate::error::{HwError, Result};
use crate::util::poll_until;

pub const DEFAULT_ADDRESS: u8 = 0x48;

const REG_CONVERSION: u8 = 0x00;
const REG_CONFIG: u8 = 0x01;

const OS_START: u16 = 1 << 15;
/// Single-ended AINx against GND is mux 0b100 + x.
const MUX_SINGLE_BASE: u16 = 0b100;
/// +/-4.096 V full scale.
const PGA_4V096: u16 = 0b001 << 9;
const MODE_SINGLE: u16 = 1 << 8;
/// 1600 samples/s.
const DR_1600: u16 = 0b100 << 5;
const COMP_DISABLE: u16 = 0b11;

/// One conversion takes ~625 µs at 1600 SPS.
const CONVERSION_TIMEOUT: Duration = Duration::from_millis(5);

pub struct Ads1015 {
    bus: I2c,
    voltage_channel: u8,
    current_channel: u8,
}

impl Ads1015 {
    pub fn new(address: u8, voltage_channel: u8, current_channel: u8) -> Result<Self> {
        for ch in [voltage_channel, current_channel] {
            if ch > 3 {
                return Err(HwError::I2c(format!("ads1015 has no input AIN{ch}")));
            }
        }
        let mut bus = I2c::new().map_err(|e| HwError::I2c(format!("open i2c bus: {e}")))?;
        bus.set_slave_address(u16::from(address))
            .map_err(|e| HwError::I2c(format!("select ads1015 at {address:#04x}: {e}")))?;
        debug!(address, voltage_channel, current_channel, "ads1015 ready");
        Ok(Self {
            bus,
            voltage_channel,
            current_channel,
        })
    }

    fn read_register(&mut self, register: u8) -> Result<u16> {
        let mut buffer = [0u8; 2];
        self.bus
            .write_read(&[register], &mut buffer)
            .map_err(|e| HwError::I2c(format!("read register {register:#04x}: {e}")))?;
        Ok(u16::from_be_bytes(buffer))
    }

    fn write_register(&mut self, register: u8, value: u16) -> Result<()> {
        let [hi, lo] = value.to_be_bytes();
        self.bus
            .write(&[register, hi, lo])
            .map_err(|e| HwError::I2c(format!("write register {register:#04x}: {e}")))?;
        Ok(())
    }

    /// Start a conversion on `channel` and return its 12-bit result.
    pub fn read_channel(&mut self, channel: u8) -> Result<u16> {
        let mux = (MUX_SINGLE_BASE + u16::from(channel)) << 12;
        self.write_register(
            REG_CONFIG,
            OS_START | mux | PGA_4V096 | MODE_SINGLE | DR_1600 | COMP_DISABLE,
        )?;
        thread::sleep(Duration::from_micros(700));
        poll_until(
            || matches!(self.read_register(REG_CONFIG), Ok(cfg) if cfg & OS_START != 0),
            CONVERSION_TIMEOUT,
            Duration::from_micros(100),
        )
        .map_err(|_| HwError::I2c(format!("ads1015 conversion on AIN{channel} timed out")))?;
        // Left-justified two's complement; single-ended inputs never go below zero
        let raw = (self.read_register(REG_CONVERSION)? as i16) >> 4;
        let counts = raw.max(0) as u16;
        trace!(channel, counts, "ads1015 conversion");
        Ok(counts)
    }
}

impl PowerSensor for Ads1015 {
    fn read_raw(&mut self) -> std::result::Result<RawPowerSample, BoxError> {
        let voltage = self.read_channel(self.voltage_channel)?;
        let current = self.read_channel(self.current_channel)?;
        Ok(RawPowerSample { voltage, current })
    }
}
