use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RigError {
    #[error("hardware error: {0}")]
    Hardware(String),
    #[error("hardware fault: {0}")]
    HardwareFault(String),
    #[error("timeout waiting for sensor")]
    Timeout,
    #[error("invalid state: {0}")]
    State(String),
}

/// Motor actuation failures. None of these are fatal: the caller logs and
/// keeps the loop running.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MotorError {
    #[error("invalid motor speed {speed}, expected [-127, 127]")]
    InvalidSpeedRange { speed: i32 },
    #[error("invalid motor topology: {0}")]
    InvalidMotorTopology(String),
    #[error("pwm write failed: {0}")]
    Hardware(String),
}

/// Message channel failures; the offending message is discarded.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("malformed command: {0}")]
    MalformedCommand(String),
    #[error("unrecognized command value: {0}")]
    UnrecognizedCommandValue(String),
    #[error("encode failed: {0}")]
    Encode(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error("missing pwm output")]
    MissingPwm,
    #[error("missing force sensor")]
    MissingForceSensor,
    #[error("missing clock")]
    MissingClock,
    #[error("missing motor configuration")]
    MissingMotors,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rig_error_variants_render() {
        // Exhaustive so a new variant has to be listed here
        for e in [
            RigError::Hardware("bus".into()),
            RigError::HardwareFault("adc".into()),
            RigError::Timeout,
            RigError::State("powered down".into()),
        ] {
            let text = e.to_string();
            match e {
                RigError::Hardware(_) => assert_eq!(text, "hardware error: bus"),
                RigError::HardwareFault(_) => assert_eq!(text, "hardware fault: adc"),
                RigError::Timeout => assert_eq!(text, "timeout waiting for sensor"),
                RigError::State(_) => assert_eq!(text, "invalid state: powered down"),
            }
        }
    }
}
