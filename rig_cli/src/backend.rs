//! Hardware assembly: real peripherals with the `hardware` feature, the
//! simulated rig otherwise. Both expose the same three capabilities.

use std::path::Path;

use eyre::WrapErr;
use rig_config::{Config, LoadCellCalibration};

/// Load the optional calibration CSV named in `[load_cell]`.
pub fn load_cell_calibration(cfg: &Config) -> eyre::Result<Option<LoadCellCalibration>> {
    let Some(path) = cfg.load_cell.calibration_csv.as_deref() else {
        return Ok(None);
    };
    let cal = rig_config::load_calibration_csv(Path::new(path))
        .wrap_err_with(|| format!("load calibration CSV {path}"))?;
    tracing::info!(
        tare_counts = cal.tare_counts,
        counts_per_unit = cal.counts_per_unit,
        "load cell calibration loaded"
    );
    Ok(Some(cal))
}

#[cfg(feature = "hardware")]
mod imp {
    use std::time::Duration;

    use eyre::WrapErr;
    use rig_config::Config;
    use rig_hardware::adc::Ads1015;
    use rig_hardware::hx711::{Hx711, LoadCell};
    use rig_hardware::pwm::HardwarePwm;

    /// HX711 gain 128 on channel A.
    const HX711_GAIN_PULSES: u8 = 25;

    pub type Pwm = HardwarePwm;
    pub type Force = LoadCell;
    pub type Power = Ads1015;

    pub fn open(cfg: &Config) -> eyre::Result<(Pwm, Force, Power)> {
        let lc = &cfg.load_cell;
        let hx = Hx711::new(lc.dout_pin, lc.sck_pin, HX711_GAIN_PULSES)
            .wrap_err("open hx711")?;
        let timeout = Duration::from_millis(lc.read_timeout_ms);
        let force = match super::load_cell_calibration(cfg)? {
            Some(cal) => LoadCell::new(hx, cal.counts_per_unit, timeout).with_tare(cal.tare_counts),
            None => {
                let mut cell = LoadCell::new(hx, lc.scale, timeout);
                let tare = cell.tare(lc.tare_samples).wrap_err("tare load cell")?;
                tracing::info!(tare_counts = tare, "load cell tared");
                cell
            }
        };
        let power = Ads1015::new(
            cfg.adc.i2c_address,
            cfg.adc.voltage_channel,
            cfg.adc.current_channel,
        )
        .wrap_err("open power ADC")?;
        tracing::info!(backend = "hardware", "peripherals ready");
        Ok((HardwarePwm::new(), force, power))
    }
}

#[cfg(not(feature = "hardware"))]
mod imp {
    use rig_config::Config;
    use rig_hardware::{
        AdcTransfer, RigModel, SimulatedLoadCell, SimulatedPowerSensor, SimulatedPwm, SimulatedRig,
    };

    pub type Pwm = SimulatedPwm;
    pub type Force = SimulatedLoadCell;
    pub type Power = SimulatedPowerSensor;

    pub fn open(cfg: &Config) -> eyre::Result<(Pwm, Force, Power)> {
        // Parsed for validation only; the simulated cell reports calibrated units
        let _ = super::load_cell_calibration(cfg)?;
        let cal = &cfg.calibration;
        let rig = SimulatedRig::new(RigModel {
            voltage_adc: AdcTransfer {
                gain: cal.voltage_gain,
                offset: cal.voltage_offset,
            },
            current_adc: AdcTransfer {
                gain: cal.current_gain,
                offset: cal.current_offset,
            },
            ..RigModel::default()
        });
        tracing::info!(backend = "sim", "peripherals ready");
        Ok((rig.pwm(), rig.load_cell(), rig.power_sensor()))
    }
}

pub use imp::open;
