//! Raspberry Pi hardware PWM behind the `PwmOutput` boundary.
//!
//! The Pi exposes two PWM channels; channel 0 is routed to GPIO 12/18 and
//! channel 1 to GPIO 13/19 by the device tree overlay. Duty counts are
//! converted to a fraction of the configured resolution.

use std::collections::HashMap;

use rig_traits::{BoxError, PwmOutput};
use rppal::pwm::{Channel, Polarity, Pwm};
use tracing::{debug, warn};

use crate::error::HwError;

struct Attached {
    pwm: Pwm,
    full_scale: f64,
}

#[derive(Default)]
pub struct HardwarePwm {
    channels: HashMap<u8, Attached>,
}

impl HardwarePwm {
    pub fn new() -> Self {
        Self::default()
    }
}

fn rppal_channel(channel: u8) -> Result<Channel, HwError> {
    match channel {
        0 => Ok(Channel::Pwm0),
        1 => Ok(Channel::Pwm1),
        other => Err(HwError::Pwm(format!(
            "channel {other} has no hardware PWM on this board"
        ))),
    }
}

fn expected_pins(channel: u8) -> &'static [u8] {
    match channel {
        0 => &[12, 18],
        1 => &[13, 19],
        _ => &[],
    }
}

impl PwmOutput for HardwarePwm {
    fn attach(
        &mut self,
        pin: u8,
        channel: u8,
        frequency_hz: u32,
        resolution_bits: u8,
    ) -> Result<(), BoxError> {
        if !expected_pins(channel).contains(&pin) {
            warn!(pin, channel, "pin is not routed to this PWM channel; check the overlay");
        }
        let pwm = Pwm::with_frequency(
            rppal_channel(channel)?,
            f64::from(frequency_hz),
            0.0,
            Polarity::Normal,
            true,
        )
        .map_err(|e| HwError::Pwm(format!("open pwm channel {channel}: {e}")))?;
        let full_scale = f64::from(1u32 << resolution_bits.min(31));
        debug!(pin, channel, frequency_hz, resolution_bits, "pwm attached");
        self.channels.insert(channel, Attached { pwm, full_scale });
        Ok(())
    }

    fn write(&mut self, channel: u8, duty: u32) -> Result<(), BoxError> {
        let attached = self
            .channels
            .get(&channel)
            .ok_or(HwError::ChannelNotAttached(channel))?;
        let fraction = (f64::from(duty) / attached.full_scale).clamp(0.0, 1.0);
        attached
            .pwm
            .set_duty_cycle(fraction)
            .map_err(|e| HwError::Pwm(format!("write pwm channel {channel}: {e}")))?;
        Ok(())
    }
}
