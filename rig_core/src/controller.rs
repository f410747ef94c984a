//! Bang-bang wattage regulation over a lockstep motor pair.

use crate::motor::{MAX_SPEED, MIN_SPEED};

/// Shared speed of the two motors. Both motors always receive the same value,
/// kept inside `[MIN_SPEED, MAX_SPEED]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotorPair {
    speed: i8,
}

impl MotorPair {
    /// Speed both motors sit at while no benchmark is running.
    pub const IDLE: Self = Self { speed: MIN_SPEED };

    /// Clamps `speed` into the valid range.
    pub fn new(speed: i32) -> Self {
        let s = speed.clamp(i32::from(MIN_SPEED), i32::from(MAX_SPEED));
        Self { speed: s as i8 }
    }

    #[inline]
    pub fn speed(&self) -> i8 {
        self.speed
    }

    #[inline]
    pub fn speeds(&self) -> [i8; 2] {
        [self.speed; 2]
    }

    /// Pair after applying `adj`, saturating at the range ends.
    pub fn stepped(self, adj: Adjustment) -> Self {
        Self::new(i32::from(self.speed) + adj.delta())
    }
}

impl Default for MotorPair {
    fn default() -> Self {
        Self::IDLE
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Adjustment {
    Decrease,
    Increase,
    Hold,
}

impl Adjustment {
    fn delta(self) -> i32 {
        match self {
            Self::Decrease => -1,
            Self::Increase => 1,
            Self::Hold => 0,
        }
    }
}

/// Hysteresis bands around the target: above `target * upper_band` steps
/// down, below `target * lower_band` steps up, anything in between holds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WattageController {
    pub upper_band: f32,
    pub lower_band: f32,
}

impl Default for WattageController {
    fn default() -> Self {
        Self {
            upper_band: 1.02,
            lower_band: 0.98,
        }
    }
}

impl WattageController {
    pub fn new(upper_band: f32, lower_band: f32) -> Self {
        Self {
            upper_band,
            lower_band,
        }
    }

    pub fn decide(&self, measured_w: f32, target_w: f32) -> Adjustment {
        if measured_w > target_w * self.upper_band {
            Adjustment::Decrease
        } else if measured_w < target_w * self.lower_band {
            Adjustment::Increase
        } else {
            // NaN lands here too
            Adjustment::Hold
        }
    }

    /// One control step: at most one unit of speed change per call.
    pub fn tick(&self, pair: MotorPair, measured_w: f32, target_w: f32) -> MotorPair {
        pair.stepped(self.decide(measured_w, target_w))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(10.5, 10.0, Adjustment::Decrease)]
    #[case(9.5, 10.0, Adjustment::Increase)]
    #[case(10.0, 10.0, Adjustment::Hold)]
    #[case(10.2, 10.0, Adjustment::Hold)]
    #[case(9.8, 10.0, Adjustment::Hold)]
    #[case(f32::NAN, 10.0, Adjustment::Hold)]
    fn bands(#[case] measured: f32, #[case] target: f32, #[case] want: Adjustment) {
        assert_eq!(WattageController::default().decide(measured, target), want);
    }

    #[test]
    fn saturates_at_range_ends() {
        let c = WattageController::default();
        let top = MotorPair::new(127);
        assert_eq!(c.tick(top, 0.0, 10.0).speed(), 127);
        assert_eq!(c.tick(MotorPair::IDLE, 50.0, 10.0).speed(), -127);
    }

    #[test]
    fn new_clamps() {
        assert_eq!(MotorPair::new(-500).speed(), -127);
        assert_eq!(MotorPair::new(500).speed(), 127);
        assert_eq!(MotorPair::new(-50).speeds(), [-50, -50]);
    }
}
