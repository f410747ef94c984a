#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema and load-cell calibration parsing for the rig.
//!
//! - `Config` and its sections are deserialized from TOML and checked by `validate()`.
//! - The load-cell calibration CSV loader enforces headers and fits tare and scale
//!   by least squares.
use serde::Deserialize;

/// Topology tags accepted in `[[motor]] topology = "..."` (case-insensitive).
pub const BRUSHLESS_TAGS: &[&str] = &["brushless", "bldc"];
pub const BRUSHED_DC_TAGS: &[&str] = &["brushed_dc", "brushed-dc", "dc"];

/// Highest PWM channel index a PWM backend may expose. The Raspberry Pi
/// hardware backend only drives channels 0 and 1 and rejects the rest at
/// motor setup.
pub const MAX_PWM_CHANNEL: u8 = 15;

/// Load-cell calibration CSV schema.
///
/// Expected headers:
/// raw,force
///
/// Example:
/// raw,force
/// 842913,0.0
/// 818000,100.0
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct CalibrationRow {
    pub raw: i64,
    pub force: f32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MotorCfg {
    pub primary_pin: u8,
    pub primary_channel: u8,
    /// Second direction line; required for brushed DC motors.
    #[serde(default)]
    pub secondary_pin: Option<u8>,
    #[serde(default)]
    pub secondary_channel: Option<u8>,
    #[serde(default = "default_frequency_hz")]
    pub frequency_hz: u32,
    pub topology: String,
}

fn default_frequency_hz() -> u32 {
    50
}

impl MotorCfg {
    pub fn is_brushless(&self) -> bool {
        tag_in(&self.topology, BRUSHLESS_TAGS)
    }

    pub fn is_brushed_dc(&self) -> bool {
        tag_in(&self.topology, BRUSHED_DC_TAGS)
    }
}

fn tag_in(tag: &str, tags: &[&str]) -> bool {
    let t = tag.trim();
    tags.iter().any(|k| k.eq_ignore_ascii_case(t))
}

/// Fixed ADC calibration: `value = raw * gain + offset` per channel.
#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct PowerCalibrationCfg {
    pub voltage_gain: f32,
    pub voltage_offset: f32,
    pub current_gain: f32,
    pub current_offset: f32,
}

impl Default for PowerCalibrationCfg {
    fn default() -> Self {
        Self {
            voltage_gain: 0.0148,
            voltage_offset: 0.922,
            current_gain: 0.0289,
            current_offset: 2.7182,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoadCellCfg {
    pub dout_pin: u8,
    pub sck_pin: u8,
    /// Raw counts per weight unit (HX711 "scale"). Negative when the cell is
    /// mounted in compression.
    pub scale: f32,
    /// Max time to wait for HX711 data-ready before a read fails.
    pub read_timeout_ms: u64,
    /// Reads averaged when taring at startup.
    pub tare_samples: u32,
    /// Optional `raw,force` CSV; overrides `scale` and the startup tare.
    pub calibration_csv: Option<String>,
}

impl Default for LoadCellCfg {
    fn default() -> Self {
        Self {
            dout_pin: 4,
            sck_pin: 5,
            scale: -1_249_022.0 / 5000.0,
            read_timeout_ms: 150,
            tare_samples: 10,
            calibration_csv: None,
        }
    }
}

/// Power-sense ADC (ADS1015 on I2C). Only used by the hardware backend.
#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct AdcCfg {
    pub i2c_address: u8,
    pub voltage_channel: u8,
    pub current_channel: u8,
}

impl Default for AdcCfg {
    fn default() -> Self {
        Self {
            i2c_address: 0x48,
            voltage_channel: 0,
            current_channel: 1,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct ControlCfg {
    /// Step speed down while power exceeds `target * upper_band`.
    pub upper_band: f32,
    /// Step speed up while power is below `target * lower_band`.
    pub lower_band: f32,
    /// Speed both motors jump to when a new wattage target arrives.
    pub seed_speed: i32,
    /// Control loop period.
    pub tick_ms: u64,
}

impl Default for ControlCfg {
    fn default() -> Self {
        Self {
            upper_band: 1.02,
            lower_band: 0.98,
            seed_speed: -50,
            tick_ms: 10,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct BatchCfg {
    /// Force samples per outbound batch.
    pub capacity: usize,
}

impl Default for BatchCfg {
    fn default() -> Self {
        Self { capacity: 1 }
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct TelemetryCfg {
    /// Minimum spacing of voltage/current telemetry while idle.
    pub idle_interval_ms: u64,
}

impl Default for TelemetryCfg {
    fn default() -> Self {
        Self {
            idle_interval_ms: 1000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerCfg {
    pub bind: String,
}

impl Default for ServerCfg {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:81".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(rename = "motor")]
    pub motors: Vec<MotorCfg>,
    #[serde(default)]
    pub calibration: PowerCalibrationCfg,
    #[serde(default)]
    pub load_cell: LoadCellCfg,
    #[serde(default)]
    pub adc: AdcCfg,
    #[serde(default)]
    pub control: ControlCfg,
    #[serde(default)]
    pub batch: BatchCfg,
    #[serde(default)]
    pub telemetry: TelemetryCfg,
    #[serde(default)]
    pub server: ServerCfg,
    #[serde(default)]
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Motors
        if self.motors.len() != 2 {
            eyre::bail!(
                "exactly two [[motor]] entries are required, got {}",
                self.motors.len()
            );
        }
        let mut seen_channels: Vec<u8> = Vec::new();
        for (idx, m) in self.motors.iter().enumerate() {
            if !m.is_brushless() && !m.is_brushed_dc() {
                eyre::bail!("motor[{idx}].topology '{}' is not recognized", m.topology);
            }
            if m.frequency_hz == 0 {
                eyre::bail!("motor[{idx}].frequency_hz must be > 0");
            }
            let mut channels = vec![m.primary_channel];
            if m.is_brushed_dc() {
                match (m.secondary_pin, m.secondary_channel) {
                    (Some(_), Some(ch)) => channels.push(ch),
                    _ => eyre::bail!(
                        "motor[{idx}] is brushed_dc and needs secondary_pin and secondary_channel"
                    ),
                }
            }
            for ch in channels {
                if ch > MAX_PWM_CHANNEL {
                    eyre::bail!("motor[{idx}] channel {ch} must be <= {MAX_PWM_CHANNEL}");
                }
                if seen_channels.contains(&ch) {
                    eyre::bail!("motor[{idx}] reuses pwm channel {ch}");
                }
                seen_channels.push(ch);
            }
        }

        // Calibration
        let cal = &self.calibration;
        for (name, v) in [
            ("voltage_gain", cal.voltage_gain),
            ("voltage_offset", cal.voltage_offset),
            ("current_gain", cal.current_gain),
            ("current_offset", cal.current_offset),
        ] {
            if !v.is_finite() {
                eyre::bail!("calibration.{name} must be finite");
            }
        }

        // Load cell
        if !self.load_cell.scale.is_finite() || self.load_cell.scale == 0.0 {
            eyre::bail!("load_cell.scale must be finite and non-zero");
        }
        if self.load_cell.read_timeout_ms == 0 {
            eyre::bail!("load_cell.read_timeout_ms must be >= 1");
        }

        // ADC
        let adc = &self.adc;
        if adc.voltage_channel > 3 || adc.current_channel > 3 {
            eyre::bail!("adc channels must be in 0..=3");
        }
        if adc.voltage_channel == adc.current_channel {
            eyre::bail!("adc.voltage_channel and adc.current_channel must differ");
        }

        // Control
        let c = &self.control;
        if !(c.lower_band.is_finite() && c.upper_band.is_finite()) {
            eyre::bail!("control bands must be finite");
        }
        if c.lower_band <= 0.0 || c.lower_band > 1.0 {
            eyre::bail!("control.lower_band must be in (0.0, 1.0]");
        }
        if c.upper_band < 1.0 {
            eyre::bail!("control.upper_band must be >= 1.0");
        }
        if !(-127..=127).contains(&c.seed_speed) {
            eyre::bail!("control.seed_speed must be in [-127, 127]");
        }
        if c.tick_ms == 0 {
            eyre::bail!("control.tick_ms must be >= 1");
        }
        if c.tick_ms > 60_000 {
            eyre::bail!("control.tick_ms is unreasonably large (>60s)");
        }

        // Batch / telemetry
        if self.batch.capacity == 0 {
            eyre::bail!("batch.capacity must be >= 1");
        }
        if self.telemetry.idle_interval_ms == 0 {
            eyre::bail!("telemetry.idle_interval_ms must be >= 1");
        }

        // Server
        if self.server.bind.trim().is_empty() {
            eyre::bail!("server.bind must not be empty");
        }

        Ok(())
    }
}

/// Fitted load-cell calibration in HX711 terms:
/// `force = (raw - tare_counts) / counts_per_unit`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoadCellCalibration {
    pub tare_counts: i32,
    pub counts_per_unit: f32,
}

impl LoadCellCalibration {
    /// Least-squares fit of `force = a * raw + b` over at least two rows with
    /// strictly monotonic raw values.
    pub fn from_rows(rows: &[CalibrationRow]) -> eyre::Result<Self> {
        if rows.len() < 2 {
            eyre::bail!("calibration requires at least two rows, got {}", rows.len());
        }

        let mut direction = 0i64;
        for (i, pair) in rows.windows(2).enumerate() {
            let d = (pair[1].raw - pair[0].raw).signum();
            if d == 0 {
                eyre::bail!(
                    "calibration rows have duplicate raw values at index {} and {}",
                    i,
                    i + 1
                );
            }
            if direction != 0 && d != direction {
                eyre::bail!(
                    "calibration raw values must be monotonic (strictly increasing or strictly decreasing)"
                );
            }
            direction = d;
        }

        let n = rows.len() as f64;
        let mean_x = rows.iter().map(|r| r.raw as f64).sum::<f64>() / n;
        let mean_y = rows.iter().map(|r| f64::from(r.force)).sum::<f64>() / n;
        let (sxx, sxy) = rows.iter().fold((0.0f64, 0.0f64), |(sxx, sxy), r| {
            let dx = r.raw as f64 - mean_x;
            let dy = f64::from(r.force) - mean_y;
            (sxx + dx * dx, sxy + dx * dy)
        });
        let slope = sxy / sxx;
        if !slope.is_finite() || slope == 0.0 {
            eyre::bail!("calibration produced zero or non-finite slope");
        }
        let intercept = mean_y - slope * mean_x;
        let tare = -intercept / slope;
        if !tare.is_finite() || tare.abs() > f64::from(i32::MAX) {
            eyre::bail!("calibration produced invalid tare baseline");
        }

        Ok(Self {
            tare_counts: tare.round() as i32,
            counts_per_unit: (1.0 / slope) as f32,
        })
    }
}

pub fn load_calibration_csv(path: &std::path::Path) -> eyre::Result<LoadCellCalibration> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| eyre::eyre!("open calibration CSV {:?}: {}", path, e))?;

    let headers = rdr
        .headers()
        .map_err(|e| eyre::eyre!("read CSV headers {:?}: {}", path, e))?
        .clone();
    let actual: Vec<&str> = headers.iter().collect();
    if actual != ["raw", "force"] {
        eyre::bail!(
            "calibration CSV must have headers 'raw,force', got: {}",
            actual.join(",")
        );
    }

    let mut rows = Vec::new();
    for (idx, rec) in rdr.deserialize::<CalibrationRow>().enumerate() {
        match rec {
            Ok(row) => rows.push(row),
            Err(e) => eyre::bail!("invalid CSV row {}: {}", idx + 2, e),
        }
    }

    LoadCellCalibration::from_rows(&rows)
}
