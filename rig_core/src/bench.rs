//! Benchmark state machine.
//!
//! `Benchmark` owns every piece of mutable rig state: the motor pair, the
//! force sensor, the batcher and the timer. Requests and ticks are fed in
//! from one actor; nothing here locks.
//!
//! Transitions:
//! - start: power up the force sensor and run. The timer is only seeded if
//!   no parameter message has set it already.
//! - stop / peer disconnect / completion: both motors to -127, force sensor
//!   powered down, partial batch dropped, timer cleared.
//! - target_wattage: both motors jump to the seed speed and the timer restarts.
//! - benchmark_duration: stored; the timer restarts as well.

use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use eyre::WrapErr;
use rig_traits::{Clock, ForceSensor, PeerId, PwmOutput, RawPowerSample};

use crate::batch::{BatchOutcome, ForceSample, MeasurementBatcher};
use crate::controller::{MotorPair, WattageController};
use crate::error::{BuildError, Result};
use crate::hw_error::map_boxed;
use crate::motor::{MotorConfig, MotorDriver};
use crate::power::{PowerSample, PowerTracker};
use crate::protocol::{self, BatchReport, ControlCommand, Outbound, Request, Telemetry};

pub const DEFAULT_SEED_SPEED: i32 = -50;
pub const DEFAULT_IDLE_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_TICK_PERIOD: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BenchmarkState {
    pub running: bool,
    pub target_power: f32,
    pub duration_s: u64,
    pub started_at: Option<Instant>,
    pub motors: MotorPair,
}

impl Default for BenchmarkState {
    fn default() -> Self {
        Self {
            running: false,
            target_power: 0.0,
            duration_s: 0,
            started_at: None,
            motors: MotorPair::IDLE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Running,
}

/// Tunables shared by the builder and the config conversion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BenchSettings {
    pub motors: [MotorConfig; 2],
    pub tracker: PowerTracker,
    pub controller: WattageController,
    pub batch_capacity: NonZeroUsize,
    pub seed_speed: i32,
    pub idle_interval: Duration,
    pub tick_period: Duration,
}

pub struct Benchmark<P, F, C> {
    pwm: P,
    force: F,
    clock: C,
    motors: [MotorDriver; 2],
    tracker: PowerTracker,
    controller: WattageController,
    batcher: MeasurementBatcher,
    state: BenchmarkState,
    seed: MotorPair,
    idle_interval: Duration,
    last_idle_emit: Option<Instant>,
    last_power: PowerSample,
}

impl<P, F, C> core::fmt::Debug for Benchmark<P, F, C> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Benchmark")
            .field("state", &self.state)
            .field("batched", &self.batcher.len())
            .field("last_power", &self.last_power)
            .finish_non_exhaustive()
    }
}

impl<P: PwmOutput, F: ForceSensor, C: Clock> Benchmark<P, F, C> {
    pub fn builder() -> BenchmarkBuilder<P, F, C> {
        BenchmarkBuilder::default()
    }

    /// Set up both motors and park the force sensor. Call once before ticking.
    pub fn initialize(&mut self) -> Result<()> {
        for (idx, m) in self.motors.iter().enumerate() {
            m.initialize(&mut self.pwm)
                .wrap_err_with(|| format!("initialize motor {idx}"))?;
        }
        if let Err(e) = self.force.power_down() {
            tracing::warn!(error = %map_boxed(&e), "force sensor power-down failed");
        }
        tracing::info!(
            batch_capacity = self.batcher.capacity(),
            seed_speed = self.seed.speed(),
            "benchmark ready"
        );
        Ok(())
    }

    pub fn phase(&self) -> Phase {
        if self.state.running {
            Phase::Running
        } else {
            Phase::Idle
        }
    }

    pub fn state(&self) -> &BenchmarkState {
        &self.state
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Latest calibrated power sample seen by `step`.
    pub fn last_power(&self) -> PowerSample {
        self.last_power
    }

    /// Samples waiting in the current partial batch.
    pub fn pending_samples(&self) -> usize {
        self.batcher.len()
    }

    /// Decode and apply one inbound message. Undecodable text changes nothing.
    pub fn handle_text(&mut self, text: &str) {
        match protocol::decode(text) {
            Ok(req) => self.handle(&req),
            Err(e) => tracing::warn!(error = %e, "discarding message"),
        }
    }

    pub fn handle(&mut self, req: &Request) {
        if let Some(e) = req.unrecognized_error() {
            tracing::warn!(error = %e, "ignoring command");
        }
        match req.command {
            Some(ControlCommand::Start) => self.start(),
            Some(ControlCommand::Stop) => self.stop(),
            None => {}
        }
        if let Some(target) = req.target_wattage {
            self.state.motors = self.seed;
            self.drive();
            self.state.target_power = target;
            tracing::info!(target_w = target, speed = self.seed.speed(), "target set");
        }
        if let Some(duration_s) = req.benchmark_duration {
            self.state.duration_s = duration_s;
            tracing::info!(duration_s, "duration set");
        }
        if req.carries_parameters() {
            self.state.started_at = Some(self.clock.now());
        }
    }

    pub fn start(&mut self) {
        if let Err(e) = self.force.power_up() {
            tracing::warn!(error = %map_boxed(&e), "force sensor power-up failed");
        }
        self.state.running = true;
        if self.state.started_at.is_none() {
            self.state.started_at = Some(self.clock.now());
        }
        tracing::info!(
            target_w = self.state.target_power,
            duration_s = self.state.duration_s,
            "benchmark started"
        );
    }

    pub fn stop(&mut self) {
        self.go_idle();
        tracing::info!("benchmark stopped");
    }

    /// A vanished peer is treated exactly like a stop command.
    pub fn disconnect(&mut self, peer: PeerId) {
        self.go_idle();
        tracing::info!(peer, "peer disconnected; rig idled");
    }

    /// Calibrate a raw power reading and advance one control step.
    pub fn tick(&mut self, raw: RawPowerSample) -> Option<Outbound> {
        let sample = self.tracker.convert(raw);
        self.step(sample)
    }

    /// Advance one control step with an already calibrated power sample.
    pub fn step(&mut self, sample: PowerSample) -> Option<Outbound> {
        self.last_power = sample;
        if !self.state.running {
            return self.idle_telemetry();
        }

        if let Some(done) = self.check_expiry() {
            return Some(done);
        }
        let elapsed_s = self
            .state
            .started_at
            .map_or(0, |t| self.clock.secs_since(t));

        let next = self
            .controller
            .tick(self.state.motors, sample.power(), self.state.target_power);
        if next != self.state.motors {
            tracing::trace!(speed = next.speed(), power_w = sample.power(), "speed adjusted");
        }
        self.state.motors = next;
        self.drive();

        let force = match self.force.get_reading() {
            Ok(f) => f,
            Err(e) => {
                tracing::warn!(error = %map_boxed(&e), "force read failed; sample skipped");
                return None;
            }
        };
        match self.batcher.append(ForceSample {
            time: elapsed_s,
            force,
        }) {
            BatchOutcome::Accepted => None,
            BatchOutcome::Ready(force_measurements) => Some(Outbound::Batch(BatchReport {
                force_measurements,
                voltage: sample.voltage,
                current: sample.current,
            })),
        }
    }

    /// Finish a running benchmark once its duration has passed. Needs no
    /// power reading, so the loop can call it when the sensor is down.
    pub fn check_expiry(&mut self) -> Option<Outbound> {
        if !self.state.running {
            return None;
        }
        let started = *self.state.started_at.get_or_insert_with(|| self.clock.now());
        let elapsed_s = self.clock.secs_since(started);
        if elapsed_s <= self.state.duration_s {
            return None;
        }
        self.go_idle();
        tracing::info!(elapsed_s, "benchmark finished");
        Some(Outbound::finished())
    }

    fn idle_telemetry(&mut self) -> Option<Outbound> {
        let due = self
            .last_idle_emit
            .is_none_or(|t| self.clock.since(t) >= self.idle_interval);
        if !due {
            return None;
        }
        self.last_idle_emit = Some(self.clock.now());
        Some(Outbound::Telemetry(Telemetry {
            voltage: self.last_power.voltage,
            current: self.last_power.current,
        }))
    }

    fn go_idle(&mut self) {
        self.state.motors = MotorPair::IDLE;
        self.drive();
        if let Err(e) = self.force.power_down() {
            tracing::warn!(error = %map_boxed(&e), "force sensor power-down failed");
        }
        if !self.batcher.is_empty() {
            tracing::debug!(dropped = self.batcher.len(), "partial batch discarded");
        }
        self.batcher.clear();
        self.state.running = false;
        self.state.started_at = None;
    }

    fn drive(&mut self) {
        let speed = self.state.motors.speed();
        for m in &self.motors {
            m.apply(&mut self.pwm, speed);
        }
    }
}

/// Collects the capabilities and tunables for a `Benchmark`.
pub struct BenchmarkBuilder<P, F, C> {
    pwm: Option<P>,
    force: Option<F>,
    clock: Option<C>,
    motors: Option<[MotorConfig; 2]>,
    tracker: PowerTracker,
    controller: WattageController,
    batch_capacity: usize,
    seed_speed: i32,
    idle_interval: Duration,
}

impl<P, F, C> Default for BenchmarkBuilder<P, F, C> {
    fn default() -> Self {
        Self {
            pwm: None,
            force: None,
            clock: None,
            motors: None,
            tracker: PowerTracker::default(),
            controller: WattageController::default(),
            batch_capacity: 1,
            seed_speed: DEFAULT_SEED_SPEED,
            idle_interval: DEFAULT_IDLE_INTERVAL,
        }
    }
}

impl<P: PwmOutput, F: ForceSensor, C: Clock> BenchmarkBuilder<P, F, C> {
    pub fn with_pwm(mut self, pwm: P) -> Self {
        self.pwm = Some(pwm);
        self
    }

    pub fn with_force_sensor(mut self, force: F) -> Self {
        self.force = Some(force);
        self
    }

    pub fn with_clock(mut self, clock: C) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_motors(mut self, motors: [MotorConfig; 2]) -> Self {
        self.motors = Some(motors);
        self
    }

    pub fn with_calibration(mut self, tracker: PowerTracker) -> Self {
        self.tracker = tracker;
        self
    }

    pub fn with_controller(mut self, controller: WattageController) -> Self {
        self.controller = controller;
        self
    }

    pub fn with_batch_capacity(mut self, capacity: usize) -> Self {
        self.batch_capacity = capacity;
        self
    }

    pub fn with_seed_speed(mut self, speed: i32) -> Self {
        self.seed_speed = speed;
        self
    }

    pub fn with_idle_interval(mut self, interval: Duration) -> Self {
        self.idle_interval = interval;
        self
    }

    /// Apply every tunable from `settings`. The tick period belongs to the runner.
    pub fn with_settings(self, settings: &BenchSettings) -> Self {
        self.with_motors(settings.motors)
            .with_calibration(settings.tracker)
            .with_controller(settings.controller)
            .with_batch_capacity(settings.batch_capacity.get())
            .with_seed_speed(settings.seed_speed)
            .with_idle_interval(settings.idle_interval)
    }

    pub fn build(self) -> std::result::Result<Benchmark<P, F, C>, BuildError> {
        let pwm = self.pwm.ok_or(BuildError::MissingPwm)?;
        let force = self.force.ok_or(BuildError::MissingForceSensor)?;
        let clock = self.clock.ok_or(BuildError::MissingClock)?;
        let motors = self.motors.ok_or(BuildError::MissingMotors)?;
        let capacity = NonZeroUsize::new(self.batch_capacity)
            .ok_or(BuildError::InvalidConfig("batch capacity must be >= 1"))?;
        if !(-127..=127).contains(&self.seed_speed) {
            return Err(BuildError::InvalidConfig("seed speed must be in [-127, 127]"));
        }
        let c = self.controller;
        if !(c.lower_band > 0.0 && c.lower_band <= 1.0 && c.upper_band >= 1.0) {
            return Err(BuildError::InvalidConfig(
                "control bands must satisfy 0 < lower <= 1 <= upper",
            ));
        }
        if self.idle_interval.is_zero() {
            return Err(BuildError::InvalidConfig("idle interval must be > 0"));
        }

        Ok(Benchmark {
            pwm,
            force,
            clock,
            motors: motors.map(MotorDriver::new),
            tracker: self.tracker,
            controller: c,
            batcher: MeasurementBatcher::new(capacity),
            state: BenchmarkState::default(),
            seed: MotorPair::new(self.seed_speed),
            idle_interval: self.idle_interval,
            last_idle_emit: None,
            last_power: PowerSample::default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rig_hardware::{SimulatedLoadCell, SimulatedPwm, SimulatedRig};
    use rig_traits::ManualClock;

    fn bench(rig: &SimulatedRig) -> Benchmark<SimulatedPwm, SimulatedLoadCell, ManualClock> {
        let mut b = Benchmark::builder()
            .with_pwm(rig.pwm())
            .with_force_sensor(rig.load_cell())
            .with_clock(ManualClock::new())
            .with_motors([
                MotorConfig::brushless(6, 1, 50),
                MotorConfig::brushless(7, 2, 50),
            ])
            .build()
            .unwrap();
        b.initialize().unwrap();
        b
    }

    #[test]
    fn builder_reports_missing_parts() {
        let rig = SimulatedRig::default();
        let err = Benchmark::<SimulatedPwm, SimulatedLoadCell, ManualClock>::builder()
            .with_pwm(rig.pwm())
            .build()
            .unwrap_err();
        assert_eq!(err, BuildError::MissingForceSensor);
    }

    #[test]
    fn builder_rejects_zero_capacity() {
        let rig = SimulatedRig::default();
        let err = Benchmark::builder()
            .with_pwm(rig.pwm())
            .with_force_sensor(rig.load_cell())
            .with_clock(ManualClock::new())
            .with_motors([
                MotorConfig::brushless(6, 1, 50),
                MotorConfig::brushless(7, 2, 50),
            ])
            .with_batch_capacity(0)
            .build()
            .unwrap_err();
        assert!(matches!(err, BuildError::InvalidConfig(_)));
    }

    #[test]
    fn starts_idle_with_motors_parked() {
        let rig = SimulatedRig::default();
        let b = bench(&rig);
        assert_eq!(b.phase(), Phase::Idle);
        assert_eq!(b.state().motors, MotorPair::IDLE);
        assert_eq!(rig.duty(1), Some(51));
        assert_eq!(rig.duty(2), Some(51));
        assert!(!rig.load_cell_powered());
    }

    #[test]
    fn target_seeds_both_motors() {
        let rig = SimulatedRig::default();
        let mut b = bench(&rig);
        b.handle_text(r#"{"target_wattage":10}"#);
        assert_eq!(b.state().motors.speed(), -50);
        assert_eq!(rig.duty(1), rig.duty(2));
        assert!(b.state().started_at.is_some());
        assert_eq!(b.phase(), Phase::Idle);
    }

    #[test]
    fn malformed_text_changes_nothing() {
        let rig = SimulatedRig::default();
        let mut b = bench(&rig);
        let before = *b.state();
        b.handle_text("{oops");
        assert_eq!(*b.state(), before);
    }
}
