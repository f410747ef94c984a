//! Human-readable error descriptions and structured JSON error formatting.

use rig_core::error::{BuildError, MotorError, RigError};

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    // Typed matches first
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingPwm | BuildError::MissingForceSensor | BuildError::MissingClock => {
                format!(
                    "What happened: The benchmark was assembled without a required part ({be}).\nLikely causes: A peripheral failed to initialize before the control loop was built.\nHow to fix: Check the log above for the failing device and rerun."
                )
            }
            BuildError::MissingMotors => {
                "What happened: No motor configuration reached the control loop.\nLikely causes: The [[motor]] entries are missing from the config.\nHow to fix: Add exactly two [[motor]] tables to the TOML.".to_string()
            }
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun. See etc/rig_config.toml for a sample."
            ),
        };
    }

    if let Some(me) = err.downcast_ref::<MotorError>() {
        return match me {
            MotorError::InvalidMotorTopology(t) => format!(
                "What happened: Motor topology '{t}' cannot be driven.\nLikely causes: Unknown topology tag, or a brushed_dc motor without a secondary line.\nHow to fix: Use topology = \"brushless\" or \"brushed_dc\" and give DC motors secondary_pin/secondary_channel."
            ),
            MotorError::Hardware(msg) => format!(
                "What happened: The PWM peripheral rejected the motor setup ({msg}).\nLikely causes: The channel has no hardware PWM on this board, or the PWM overlay is not enabled.\nHow to fix: Use channels 0/1 on GPIO 12/13 or 18/19 and enable the pwm-2chan overlay."
            ),
            MotorError::InvalidSpeedRange { .. } => format!(
                "What happened: {me}.\nLikely causes: A speed outside [-127, 127] reached the motor driver.\nHow to fix: Check control.seed_speed in the config."
            ),
        };
    }

    if let Some(re) = err.downcast_ref::<RigError>() {
        if matches!(re, RigError::Timeout) {
            return "What happened: A sensor read timed out.\nLikely causes: HX711 not wired correctly, no power/ground, or timeout too low.\nHow to fix: Verify DOUT/SCK pins and power, and consider increasing load_cell.read_timeout_ms in the config.".to_string();
        }
        return format!(
            "What happened: {re}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
        );
    }

    // String-based heuristics for errors coming from init or config
    let msg = format!("{err:#}");
    let lower = msg.to_ascii_lowercase();

    if lower.contains("hx711") && lower.contains("timeout") {
        return "What happened: HX711 did not produce data within the configured timeout.\nLikely causes: Wrong DOUT/SCK pins, wiring/power issues, or timeout configured too low.\nHow to fix: Check [load_cell] pins in the config, verify 5V/GND, and raise load_cell.read_timeout_ms.".to_string();
    }

    if lower.contains("open hx711") || lower.contains("open power adc") {
        return "What happened: Failed to initialize sensor hardware.\nLikely causes: Incorrect pin numbers, I2C disabled, or insufficient GPIO permissions.\nHow to fix: Fix [load_cell]/[adc] in the config; ensure the process can access GPIO and I2C.".to_string();
    }

    if lower.contains("calibration csv must have headers") {
        return "Invalid headers in calibration CSV. Expected 'raw,force'.".to_string();
    }

    if lower.contains("address already in use") || lower.contains("bind") {
        return format!(
            "What happened: Could not listen for remote controllers.\nLikely causes: Another process holds the port, or a privileged port needs root.\nHow to fix: Pick another address with --bind or [server].bind. Original: {msg}"
        );
    }

    if lower.contains("invalid configuration") || lower.contains("config") {
        return format!(
            "What happened: Configuration is invalid or incomplete.\nLikely causes: {msg}\nHow to fix: Edit the TOML config and try again."
        );
    }

    // Generic fallback
    format!(
        "Something went wrong.\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes: 2 for config problems, 3 for hardware, 1 otherwise.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    if err.downcast_ref::<BuildError>().is_some() {
        return 2;
    }
    if err.downcast_ref::<MotorError>().is_some() || err.downcast_ref::<RigError>().is_some() {
        return 3;
    }
    1
}

fn reason_name(err: &eyre::Report) -> &'static str {
    if err.downcast_ref::<BuildError>().is_some() {
        "Build"
    } else if err.downcast_ref::<MotorError>().is_some() {
        "Motor"
    } else if err.downcast_ref::<RigError>().is_some() {
        "Hardware"
    } else {
        "Error"
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    serde_json::json!({
        "reason": reason_name(err),
        "message": humanize(err),
        "exit_code": exit_code_for_error(err),
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_errors_get_specific_text_and_codes() {
        let e = eyre::Report::new(BuildError::InvalidConfig("batch capacity must be >= 1"));
        assert!(humanize(&e).contains("batch capacity"));
        assert_eq!(exit_code_for_error(&e), 2);

        let e = eyre::Report::new(RigError::Timeout);
        assert!(humanize(&e).contains("timed out"));
        assert_eq!(exit_code_for_error(&e), 3);
    }

    #[test]
    fn wrapped_motor_error_is_still_found() {
        use eyre::WrapErr;
        let r: Result<(), MotorError> = Err(MotorError::Hardware("channel 5".into()));
        let e = r.wrap_err("initialize motor 0").unwrap_err();
        assert!(humanize(&e).contains("PWM peripheral"));
        assert_eq!(reason_name(&e), "Motor");
    }

    #[test]
    fn json_has_reason_and_message() {
        let e = eyre::eyre!("something odd");
        let v: serde_json::Value = serde_json::from_str(&format_error_json(&e)).unwrap();
        assert_eq!(v["reason"], "Error");
        assert!(v["message"].as_str().unwrap().contains("something odd"));
        assert_eq!(v["exit_code"], 1);
    }
}
