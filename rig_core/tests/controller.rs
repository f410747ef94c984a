use proptest::prelude::*;
use rig_core::{Adjustment, MotorPair, WattageController};

proptest! {
    #[test]
    fn holds_inside_band(speed in -127i32..=127, target in 1.0f32..500.0, frac in 0.01f32..0.99) {
        let c = WattageController::default();
        let lo = target * c.lower_band;
        let hi = target * c.upper_band;
        let measured = lo + (hi - lo) * frac;
        let pair = MotorPair::new(speed);
        prop_assert_eq!(c.tick(pair, measured, target), pair);
    }

    #[test]
    fn moves_at_most_one_step_and_stays_in_range(
        speed in -127i32..=127,
        target in 0.0f32..500.0,
        measured in 0.0f32..1000.0,
    ) {
        let c = WattageController::default();
        let before = MotorPair::new(speed);
        let after = c.tick(before, measured, target);
        let delta = i32::from(after.speed()) - i32::from(before.speed());
        prop_assert!(delta.abs() <= 1);
        prop_assert!((-127..=127).contains(&after.speed()));
        prop_assert_eq!(after.speeds()[0], after.speeds()[1]);
    }

    #[test]
    fn converges_direction_matches_error(speed in -126i32..=126, target in 1.0f32..500.0) {
        let c = WattageController::default();
        let pair = MotorPair::new(speed);
        prop_assert_eq!(c.tick(pair, target * 1.5, target).speed() as i32, speed - 1);
        prop_assert_eq!(c.tick(pair, target * 0.5, target).speed() as i32, speed + 1);
    }
}

#[test]
fn zero_target_ramps_down_to_idle() {
    let c = WattageController::default();
    let mut pair = MotorPair::new(127);
    for _ in 0..300 {
        pair = c.tick(pair, 0.1, 0.0);
    }
    assert_eq!(pair, MotorPair::IDLE);
}

#[test]
fn custom_bands_widen_hold_region() {
    let c = WattageController::new(1.10, 0.90);
    assert_eq!(c.decide(10.8, 10.0), Adjustment::Hold);
    assert_eq!(c.decide(9.2, 10.0), Adjustment::Hold);
    assert_eq!(c.decide(11.1, 10.0), Adjustment::Decrease);
    assert_eq!(c.decide(8.9, 10.0), Adjustment::Increase);
}
