//! Signed speed to PWM duty mapping for the two supported motor topologies.
//!
//! Duty resolution is shared by every channel because the PWM peripheral groups
//! channels onto common timers. All duty constants below are derived from
//! `MOTOR_TIMER_BIT_RES`; changing it rescales every mapping at once.

use std::fmt;
use std::str::FromStr;

use rig_traits::PwmOutput;

use crate::error::MotorError;
use crate::hw_error::map_boxed;

pub const MOTOR_TIMER_BIT_RES: u8 = 10;
pub const MOTOR_TIMER_MAX: u32 = (1 << MOTOR_TIMER_BIT_RES) - 1;

/// Servo frame length at the 50 Hz ESC update rate.
const SERVO_FRAME_US: u32 = 20_000;

const fn pulse_duty(pulse_us: u32) -> u32 {
    pulse_us * (MOTOR_TIMER_MAX + 1) / SERVO_FRAME_US
}

/// Duty of a 1 ms pulse: ESC minimum throttle.
pub const MOTOR_1_MS_PWM: u32 = pulse_duty(1_000);
/// Duty of a 2 ms pulse: ESC maximum throttle.
pub const MOTOR_2_MS_PWM: u32 = pulse_duty(2_000);

pub const MIN_SPEED: i8 = -127;
pub const MAX_SPEED: i8 = 127;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topology {
    /// Single servo-style line read by an external ESC.
    Brushless,
    /// Two PWM lines; which one is active selects direction.
    BrushedDc,
}

impl FromStr for Topology {
    type Err = MotorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let t = s.trim();
        if rig_config::BRUSHLESS_TAGS
            .iter()
            .any(|k| k.eq_ignore_ascii_case(t))
        {
            Ok(Self::Brushless)
        } else if rig_config::BRUSHED_DC_TAGS
            .iter()
            .any(|k| k.eq_ignore_ascii_case(t))
        {
            Ok(Self::BrushedDc)
        } else {
            Err(MotorError::InvalidMotorTopology(s.to_string()))
        }
    }
}

impl fmt::Display for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Brushless => f.write_str("brushless"),
            Self::BrushedDc => f.write_str("brushed_dc"),
        }
    }
}

/// A GPIO pin routed to a PWM channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PwmLine {
    pub pin: u8,
    pub channel: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotorConfig {
    pub primary: PwmLine,
    /// Reverse line of a brushed DC motor; unused for brushless.
    pub secondary: Option<PwmLine>,
    pub frequency_hz: u32,
    pub topology: Topology,
}

impl MotorConfig {
    pub fn brushless(pin: u8, channel: u8, frequency_hz: u32) -> Self {
        Self {
            primary: PwmLine { pin, channel },
            secondary: None,
            frequency_hz,
            topology: Topology::Brushless,
        }
    }

    pub fn brushed_dc(forward: PwmLine, reverse: PwmLine, frequency_hz: u32) -> Self {
        Self {
            primary: forward,
            secondary: Some(reverse),
            frequency_hz,
            topology: Topology::BrushedDc,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelDuty {
    pub channel: u8,
    pub duty: u32,
}

/// Duty values a speed resolves to, in the order they are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DutyCommand {
    Servo(ChannelDuty),
    /// The idle line is written before the driven line so both are never
    /// active at once.
    Bridge {
        idle: ChannelDuty,
        driven: ChannelDuty,
    },
    /// Both lines low.
    Coast(ChannelDuty, ChannelDuty),
}

impl DutyCommand {
    pub fn writes(&self) -> [ChannelDuty; 2] {
        match *self {
            Self::Servo(cd) => [cd, cd],
            Self::Bridge { idle, driven } => [idle, driven],
            Self::Coast(a, b) => [a, b],
        }
    }

    /// Duty on `channel` after this command, if the command touches it.
    pub fn duty_on(&self, channel: u8) -> Option<u32> {
        self.writes()
            .iter()
            .rev()
            .find(|cd| cd.channel == channel)
            .map(|cd| cd.duty)
    }
}

/// Integer linear map with the same truncation as the firmware helper it replaces.
#[inline]
fn map_range(x: i64, in_min: i64, in_max: i64, out_min: i64, out_max: i64) -> i64 {
    (x - in_min) * (out_max - out_min) / (in_max - in_min) + out_min
}

/// Maps signed speeds onto one motor's PWM line(s).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotorDriver {
    config: MotorConfig,
}

impl MotorDriver {
    pub fn new(config: MotorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MotorConfig {
        &self.config
    }

    fn reverse_line(&self) -> Result<PwmLine, MotorError> {
        self.config.secondary.ok_or_else(|| {
            MotorError::InvalidMotorTopology(format!(
                "brushed_dc motor on channel {} has no secondary line",
                self.config.primary.channel
            ))
        })
    }

    /// Resolve `speed` to duty values without touching hardware.
    pub fn duty_for(&self, speed: i8) -> Result<DutyCommand, MotorError> {
        if speed < MIN_SPEED {
            return Err(MotorError::InvalidSpeedRange {
                speed: i32::from(speed),
            });
        }
        let s = i64::from(speed);
        match self.config.topology {
            Topology::Brushless => {
                let duty = map_range(
                    s,
                    i64::from(MIN_SPEED),
                    i64::from(MAX_SPEED),
                    i64::from(MOTOR_1_MS_PWM),
                    i64::from(MOTOR_2_MS_PWM),
                );
                if !(i64::from(MOTOR_1_MS_PWM)..=i64::from(MOTOR_2_MS_PWM)).contains(&duty) {
                    return Err(MotorError::InvalidSpeedRange {
                        speed: i32::from(speed),
                    });
                }
                Ok(DutyCommand::Servo(ChannelDuty {
                    channel: self.config.primary.channel,
                    duty: duty as u32,
                }))
            }
            Topology::BrushedDc => {
                let forward = self.config.primary.channel;
                let reverse = self.reverse_line()?.channel;
                let magnitude = map_range(
                    s.abs(),
                    0,
                    i64::from(MAX_SPEED),
                    0,
                    i64::from(MOTOR_TIMER_MAX),
                ) as u32;
                let cmd = match speed.signum() {
                    1 => DutyCommand::Bridge {
                        idle: ChannelDuty {
                            channel: reverse,
                            duty: 0,
                        },
                        driven: ChannelDuty {
                            channel: forward,
                            duty: magnitude,
                        },
                    },
                    -1 => DutyCommand::Bridge {
                        idle: ChannelDuty {
                            channel: forward,
                            duty: 0,
                        },
                        driven: ChannelDuty {
                            channel: reverse,
                            duty: magnitude,
                        },
                    },
                    _ => DutyCommand::Coast(
                        ChannelDuty {
                            channel: forward,
                            duty: 0,
                        },
                        ChannelDuty {
                            channel: reverse,
                            duty: 0,
                        },
                    ),
                };
                Ok(cmd)
            }
        }
    }

    /// Attach the motor's channel(s) and put a brushless ESC in its safe state.
    pub fn initialize(&self, pwm: &mut impl PwmOutput) -> Result<(), MotorError> {
        let mut lines = vec![self.config.primary];
        if self.config.topology == Topology::BrushedDc {
            lines.push(self.reverse_line()?);
        }
        for line in lines {
            pwm.attach(
                line.pin,
                line.channel,
                self.config.frequency_hz,
                MOTOR_TIMER_BIT_RES,
            )
            .map_err(|e| MotorError::Hardware(map_boxed(&e).to_string()))?;
        }
        if self.config.topology == Topology::Brushless {
            self.set_speed(pwm, MIN_SPEED)?;
        }
        tracing::info!(
            topology = %self.config.topology,
            pin = self.config.primary.pin,
            channel = self.config.primary.channel,
            frequency_hz = self.config.frequency_hz,
            "motor set up"
        );
        Ok(())
    }

    /// Write `speed` to hardware. Nothing is written when the speed is rejected.
    pub fn set_speed(
        &self,
        pwm: &mut impl PwmOutput,
        speed: i8,
    ) -> Result<DutyCommand, MotorError> {
        let cmd = self.duty_for(speed)?;
        match cmd {
            DutyCommand::Servo(cd) => write(pwm, cd)?,
            DutyCommand::Bridge { idle, driven } => {
                write(pwm, idle)?;
                write(pwm, driven)?;
            }
            DutyCommand::Coast(a, b) => {
                write(pwm, a)?;
                write(pwm, b)?;
            }
        }
        Ok(cmd)
    }

    /// `set_speed` for the control loop: failures are logged, never returned.
    pub fn apply(&self, pwm: &mut impl PwmOutput, speed: i8) {
        if let Err(e) = self.set_speed(pwm, speed) {
            tracing::warn!(
                error = %e,
                channel = self.config.primary.channel,
                speed,
                "motor command skipped"
            );
        }
    }
}

fn write(pwm: &mut impl PwmOutput, cd: ChannelDuty) -> Result<(), MotorError> {
    pwm.write(cd.channel, cd.duty)
        .map_err(|e| MotorError::Hardware(map_boxed(&e).to_string()))
}
