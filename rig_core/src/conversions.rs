//! Conversions from `rig_config` types to `rig_core` types.

use std::num::NonZeroUsize;
use std::time::Duration;

use crate::bench::BenchSettings;
use crate::controller::WattageController;
use crate::error::MotorError;
use crate::motor::{MotorConfig, PwmLine, Topology};
use crate::power::{LinearCal, PowerTracker};

// ── Motors ───────────────────────────────────────────────────────────────────

impl TryFrom<&rig_config::MotorCfg> for MotorConfig {
    type Error = MotorError;

    fn try_from(c: &rig_config::MotorCfg) -> Result<Self, Self::Error> {
        let topology: Topology = c.topology.parse()?;
        let secondary = match (c.secondary_pin, c.secondary_channel) {
            (Some(pin), Some(channel)) => Some(PwmLine { pin, channel }),
            _ => None,
        };
        if topology == Topology::BrushedDc && secondary.is_none() {
            return Err(MotorError::InvalidMotorTopology(format!(
                "brushed_dc motor on channel {} has no secondary line",
                c.primary_channel
            )));
        }
        Ok(Self {
            primary: PwmLine {
                pin: c.primary_pin,
                channel: c.primary_channel,
            },
            secondary,
            frequency_hz: c.frequency_hz,
            topology,
        })
    }
}

// ── Power calibration ────────────────────────────────────────────────────────

impl From<&rig_config::PowerCalibrationCfg> for PowerTracker {
    fn from(c: &rig_config::PowerCalibrationCfg) -> Self {
        Self {
            voltage: LinearCal {
                gain: c.voltage_gain,
                offset: c.voltage_offset,
            },
            current: LinearCal {
                gain: c.current_gain,
                offset: c.current_offset,
            },
        }
    }
}

// ── Control ──────────────────────────────────────────────────────────────────

impl From<&rig_config::ControlCfg> for WattageController {
    fn from(c: &rig_config::ControlCfg) -> Self {
        Self::new(c.upper_band, c.lower_band)
    }
}

// ── Whole config ─────────────────────────────────────────────────────────────

impl TryFrom<&rig_config::Config> for BenchSettings {
    type Error = eyre::Report;

    fn try_from(c: &rig_config::Config) -> Result<Self, Self::Error> {
        let [m0, m1] = c.motors.as_slice() else {
            eyre::bail!(
                "exactly two [[motor]] entries are required, got {}",
                c.motors.len()
            );
        };
        let batch_capacity = NonZeroUsize::new(c.batch.capacity)
            .ok_or_else(|| eyre::eyre!("batch.capacity must be >= 1"))?;
        Ok(Self {
            motors: [MotorConfig::try_from(m0)?, MotorConfig::try_from(m1)?],
            tracker: PowerTracker::from(&c.calibration),
            controller: WattageController::from(&c.control),
            batch_capacity,
            seed_speed: c.control.seed_speed,
            idle_interval: Duration::from_millis(c.telemetry.idle_interval_ms),
            tick_period: Duration::from_millis(c.control.tick_ms),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOML: &str = r#"
[[motor]]
primary_pin = 12
primary_channel = 0
topology = "brushless"

[[motor]]
primary_pin = 13
primary_channel = 1
secondary_pin = 19
secondary_channel = 3
frequency_hz = 20000
topology = "brushed_dc"

[batch]
capacity = 4

[control]
tick_ms = 20
"#;

    #[test]
    fn converts_full_config() {
        let cfg = rig_config::load_toml(TOML).unwrap();
        let s = BenchSettings::try_from(&cfg).unwrap();
        assert_eq!(s.motors[0], MotorConfig::brushless(12, 0, 50));
        assert_eq!(s.motors[1].topology, Topology::BrushedDc);
        assert_eq!(s.motors[1].secondary, Some(PwmLine { pin: 19, channel: 3 }));
        assert_eq!(s.batch_capacity.get(), 4);
        assert_eq!(s.tick_period, Duration::from_millis(20));
        assert_eq!(s.idle_interval, Duration::from_secs(1));
        assert_eq!(s.seed_speed, -50);
        assert_eq!(s.tracker, PowerTracker::default());
        assert_eq!(s.controller, WattageController::default());
    }

    #[test]
    fn dc_motor_without_secondary_is_rejected() {
        let cfg = rig_config::MotorCfg {
            primary_pin: 12,
            primary_channel: 0,
            secondary_pin: None,
            secondary_channel: None,
            frequency_hz: 1000,
            topology: "dc".into(),
        };
        assert!(matches!(
            MotorConfig::try_from(&cfg),
            Err(MotorError::InvalidMotorTopology(_))
        ));
    }
}
