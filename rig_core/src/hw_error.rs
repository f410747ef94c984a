//! Maps `Box<dyn Error>` from trait boundaries to typed `RigError`.
//!
//! The traits in `rig_traits` return `Box<dyn Error + Send + Sync>`; this module
//! converts those to our typed error enum, with an optional feature-gated path
//! for `rig_hardware::HwError` downcasting.

use crate::error::RigError;

/// Map a trait-boundary error to a typed `RigError`.
///
/// Known hardware error types are downcast first, then the message text is
/// inspected as a fallback.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> RigError {
    #[cfg(feature = "hardware-errors")]
    {
        use rig_hardware::error::HwError;
        if let Some(hw) = e.downcast_ref::<HwError>() {
            return match hw {
                HwError::DataReadyTimeout => RigError::Timeout,
                HwError::PoweredDown => RigError::State(hw.to_string()),
                other => RigError::HardwareFault(other.to_string()),
            };
        }
    }

    let s = e.to_string();
    if s.to_lowercase().contains("timeout") {
        RigError::Timeout
    } else {
        RigError::Hardware(s)
    }
}

/// Same as `map_hw_error` for the boxed form returned by capability traits.
pub fn map_boxed(e: &rig_traits::BoxError) -> RigError {
    map_hw_error(e.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(feature = "hardware-errors")]
    #[test]
    fn downcasts_hardware_errors() {
        use rig_hardware::error::HwError;
        let e: rig_traits::BoxError = Box::new(HwError::DataReadyTimeout);
        assert_eq!(map_boxed(&e), RigError::Timeout);
        let e: rig_traits::BoxError = Box::new(HwError::ChannelNotAttached(3));
        assert!(matches!(map_boxed(&e), RigError::HardwareFault(_)));
    }

    #[test]
    fn falls_back_to_message_text() {
        let e: rig_traits::BoxError = Box::new(std::io::Error::other("adc read timeout"));
        assert_eq!(map_boxed(&e), RigError::Timeout);
        let e: rig_traits::BoxError = Box::new(std::io::Error::other("bus fault"));
        assert_eq!(map_boxed(&e), RigError::Hardware("bus fault".into()));
    }
}
