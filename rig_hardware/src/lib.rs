//! Hardware backends for the rig.
//!
//! The simulated rig is always available: a PWM output, a power sensor and a
//! load cell that share one plant model, so commanded duty shows up as drawn
//! current and measured thrust. Real drivers (HX711, ADS1015, Raspberry Pi
//! PWM) sit behind the `hardware` feature.
#[cfg(feature = "hardware")]
pub mod adc;
pub mod error;
#[cfg(feature = "hardware")]
pub mod hx711;
#[cfg(feature = "hardware")]
pub mod pwm;
pub mod util;

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use rig_traits::{BoxError, ForceSensor, PowerSensor, PwmOutput, RawPowerSample};

use crate::error::HwError;

/// Frequencies at or below this are treated as servo-style frames (1–2 ms pulse).
const SERVO_MAX_FREQ_HZ: u32 = 400;
/// 12-bit ADC full scale.
const ADC_MAX: f32 = 4095.0;

/// Linear ADC transfer `value = raw * gain + offset`, inverted by the simulator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdcTransfer {
    pub gain: f32,
    pub offset: f32,
}

impl AdcTransfer {
    fn to_raw(self, value: f32) -> u16 {
        if self.gain == 0.0 {
            return 0;
        }
        ((value - self.offset) / self.gain).round().clamp(0.0, ADC_MAX) as u16
    }
}

/// Plant parameters of the simulated rig.
#[derive(Debug, Clone, Copy)]
pub struct RigModel {
    /// Open-circuit supply voltage (V).
    pub supply_v: f32,
    /// Source resistance causing voltage sag under load (Ω).
    pub source_ohm: f32,
    /// Current drawn by one channel at full drive (A).
    pub full_current_a: f32,
    /// Thrust produced by one channel at full drive (weight units).
    pub full_thrust: f32,
    pub voltage_adc: AdcTransfer,
    pub current_adc: AdcTransfer,
}

impl Default for RigModel {
    fn default() -> Self {
        Self {
            supply_v: 12.0,
            source_ohm: 0.05,
            full_current_a: 20.0,
            full_thrust: 900.0,
            voltage_adc: AdcTransfer {
                gain: 0.0148,
                offset: 0.922,
            },
            current_adc: AdcTransfer {
                gain: 0.0289,
                offset: 2.7182,
            },
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct ChannelState {
    pin: u8,
    frequency_hz: u32,
    resolution_bits: u8,
    duty: u32,
}

impl ChannelState {
    /// Fraction of full drive in [0, 1] implied by the current duty.
    fn drive(&self) -> f32 {
        let full_scale = (1u64 << self.resolution_bits.min(31)) as f32;
        if self.frequency_hz == 0 {
            return 0.0;
        }
        if self.frequency_hz <= SERVO_MAX_FREQ_HZ {
            // Duty counts of a 1 ms pulse at this frame rate
            let one_ms = full_scale * self.frequency_hz as f32 / 1000.0;
            ((self.duty as f32 - one_ms) / one_ms).clamp(0.0, 1.0)
        } else {
            (self.duty as f32 / full_scale).clamp(0.0, 1.0)
        }
    }
}

#[derive(Debug, Default)]
struct SimState {
    channels: BTreeMap<u8, ChannelState>,
    writes: Vec<(u8, u32)>,
    load_cell_powered: bool,
    power_cycles: u32,
}

/// Shared handle to a simulated rig. Clones observe the same plant.
#[derive(Debug, Clone)]
pub struct SimulatedRig {
    model: RigModel,
    state: Arc<Mutex<SimState>>,
}

impl Default for SimulatedRig {
    fn default() -> Self {
        Self::new(RigModel::default())
    }
}

impl SimulatedRig {
    pub fn new(model: RigModel) -> Self {
        Self {
            model,
            state: Arc::new(Mutex::new(SimState::default())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        // A panicked holder cannot leave the plant half-updated; keep going.
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn pwm(&self) -> SimulatedPwm {
        SimulatedPwm { rig: self.clone() }
    }

    pub fn power_sensor(&self) -> SimulatedPowerSensor {
        SimulatedPowerSensor { rig: self.clone() }
    }

    pub fn load_cell(&self) -> SimulatedLoadCell {
        SimulatedLoadCell { rig: self.clone() }
    }

    /// Last duty written to `channel`, if it was attached.
    pub fn duty(&self, channel: u8) -> Option<u32> {
        self.lock().channels.get(&channel).map(|c| c.duty)
    }

    /// Pin a channel was attached to.
    pub fn pin(&self, channel: u8) -> Option<u8> {
        self.lock().channels.get(&channel).map(|c| c.pin)
    }

    /// Every `(channel, duty)` write in order.
    pub fn writes(&self) -> Vec<(u8, u32)> {
        self.lock().writes.clone()
    }

    pub fn clear_writes(&self) {
        self.lock().writes.clear();
    }

    pub fn load_cell_powered(&self) -> bool {
        self.lock().load_cell_powered
    }

    /// Number of power-up transitions seen by the load cell.
    pub fn power_cycles(&self) -> u32 {
        self.lock().power_cycles
    }

    fn total_drive(&self) -> f32 {
        self.lock().channels.values().map(ChannelState::drive).sum()
    }

    /// Physical bus voltage and current implied by the present drive.
    pub fn bus(&self) -> (f32, f32) {
        let current = self.total_drive() * self.model.full_current_a;
        let voltage = (self.model.supply_v - current * self.model.source_ohm).max(0.0);
        (voltage, current)
    }
}

/// PWM peripheral that records every write into the shared plant.
pub struct SimulatedPwm {
    rig: SimulatedRig,
}

impl PwmOutput for SimulatedPwm {
    fn attach(
        &mut self,
        pin: u8,
        channel: u8,
        frequency_hz: u32,
        resolution_bits: u8,
    ) -> Result<(), BoxError> {
        tracing::debug!(pin, channel, frequency_hz, resolution_bits, "sim pwm attach");
        self.rig.lock().channels.insert(
            channel,
            ChannelState {
                pin,
                frequency_hz,
                resolution_bits,
                duty: 0,
            },
        );
        Ok(())
    }

    fn write(&mut self, channel: u8, duty: u32) -> Result<(), BoxError> {
        let mut st = self.rig.lock();
        let ch = st
            .channels
            .get_mut(&channel)
            .ok_or(HwError::ChannelNotAttached(channel))?;
        ch.duty = duty;
        st.writes.push((channel, duty));
        Ok(())
    }
}

/// ADC pair reporting the plant's bus voltage and current as raw counts.
pub struct SimulatedPowerSensor {
    rig: SimulatedRig,
}

impl PowerSensor for SimulatedPowerSensor {
    fn read_raw(&mut self) -> Result<RawPowerSample, BoxError> {
        let (voltage, current) = self.rig.bus();
        Ok(RawPowerSample {
            voltage: self.rig.model.voltage_adc.to_raw(voltage),
            current: self.rig.model.current_adc.to_raw(current),
        })
    }
}

/// Load cell reporting thrust proportional to total drive. Starts powered down.
pub struct SimulatedLoadCell {
    rig: SimulatedRig,
}

impl ForceSensor for SimulatedLoadCell {
    fn get_reading(&mut self) -> Result<f32, BoxError> {
        if !self.rig.load_cell_powered() {
            return Err(Box::new(HwError::PoweredDown));
        }
        Ok(self.rig.total_drive() * self.rig.model.full_thrust)
    }

    fn power_down(&mut self) -> Result<(), BoxError> {
        self.rig.lock().load_cell_powered = false;
        Ok(())
    }

    fn power_up(&mut self) -> Result<(), BoxError> {
        let mut st = self.rig.lock();
        if !st.load_cell_powered {
            st.power_cycles += 1;
        }
        st.load_cell_powered = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn servo_rig() -> (SimulatedRig, SimulatedPwm) {
        let rig = SimulatedRig::default();
        let mut pwm = rig.pwm();
        pwm.attach(6, 1, 50, 10).unwrap();
        (rig, pwm)
    }

    #[test]
    fn idle_servo_pulse_draws_nothing() {
        let (rig, mut pwm) = servo_rig();
        pwm.write(1, 51).unwrap();
        let (v, i) = rig.bus();
        assert_eq!(i, 0.0);
        assert_eq!(v, 12.0);
    }

    #[test]
    fn full_servo_pulse_draws_full_current_and_sags() {
        let (rig, mut pwm) = servo_rig();
        pwm.write(1, 102).unwrap();
        let (v, i) = rig.bus();
        assert!(i > 19.0 && i <= 20.0, "current {i}");
        assert!(v < 12.0);
    }

    #[test]
    fn write_to_unattached_channel_fails() {
        let rig = SimulatedRig::default();
        let mut pwm = rig.pwm();
        let err = pwm.write(3, 10).unwrap_err();
        assert!(err.to_string().contains("not attached"));
    }

    #[test]
    fn power_sensor_reports_raw_counts_through_transfer() {
        let (rig, mut pwm) = servo_rig();
        pwm.write(1, 51).unwrap();
        let raw = rig.power_sensor().read_raw().unwrap();
        // 12 V through gain 0.0148 / offset 0.922
        assert_eq!(raw.voltage, ((12.0 - 0.922) / 0.0148_f32).round() as u16);
        // Below the current offset clamps at zero counts
        assert_eq!(raw.current, 0);
    }

    #[test]
    fn load_cell_requires_power_up() {
        let (rig, mut pwm) = servo_rig();
        pwm.write(1, 102).unwrap();
        let mut cell = rig.load_cell();
        assert!(cell.get_reading().is_err());
        cell.power_up().unwrap();
        let f = cell.get_reading().unwrap();
        assert!(f > 800.0, "force {f}");
        cell.power_down().unwrap();
        assert!(!rig.load_cell_powered());
        assert_eq!(rig.power_cycles(), 1);
    }

    #[test]
    fn dc_channel_drive_is_duty_fraction() {
        let rig = SimulatedRig::default();
        let mut pwm = rig.pwm();
        pwm.attach(8, 4, 20_000, 10).unwrap();
        pwm.write(4, 512).unwrap();
        let (_, i) = rig.bus();
        assert!((i - 10.0).abs() < 0.01, "current {i}");
    }
}
