//! Raw ADC counts to volts and amps.

use rig_traits::RawPowerSample;

/// `value = raw * gain + offset`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearCal {
    pub gain: f32,
    pub offset: f32,
}

impl LinearCal {
    #[inline]
    pub fn apply(&self, raw: u16) -> f32 {
        f32::from(raw) * self.gain + self.offset
    }
}

/// Fixed calibration of the voltage and current channels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PowerTracker {
    pub voltage: LinearCal,
    pub current: LinearCal,
}

impl Default for PowerTracker {
    fn default() -> Self {
        Self {
            voltage: LinearCal {
                gain: 0.0148,
                offset: 0.922,
            },
            current: LinearCal {
                gain: 0.0289,
                offset: 2.7182,
            },
        }
    }
}

impl PowerTracker {
    pub fn convert(&self, raw: RawPowerSample) -> PowerSample {
        PowerSample {
            voltage: self.voltage.apply(raw.voltage),
            current: self.current.apply(raw.current),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PowerSample {
    pub voltage: f32,
    pub current: f32,
}

impl PowerSample {
    #[inline]
    pub fn power(&self) -> f32 {
        self.voltage * self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_counts_yield_offsets() {
        let s = PowerTracker::default().convert(RawPowerSample::default());
        assert!((s.voltage - 0.922).abs() < 1e-6);
        assert!((s.current - 2.7182).abs() < 1e-6);
    }

    #[test]
    fn converts_typical_counts() {
        let s = PowerTracker::default().convert(RawPowerSample {
            voltage: 1000,
            current: 100,
        });
        assert!((s.voltage - 15.722).abs() < 1e-3);
        assert!((s.current - 5.6082).abs() < 1e-3);
        assert!((s.power() - 15.722 * 5.6082).abs() < 1e-2);
    }
}
