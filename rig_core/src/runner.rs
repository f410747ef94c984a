use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use rig_traits::{Clock, ForceSensor, LinkEvent, MessageLink, PowerSensor, PwmOutput};

use crate::bench::Benchmark;
use crate::hw_error::map_boxed;
use crate::protocol::Outbound;

/// Counters reported when the loop exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub ticks: u64,
    /// Text messages received.
    pub inbound: u64,
    /// Messages broadcast.
    pub outbound: u64,
    /// Ticks skipped because the power sensor failed.
    pub skipped: u64,
}

/// The single control-loop actor: services the link, then ticks the benchmark.
pub struct Runner<P, F, C, S, L> {
    bench: Benchmark<P, F, C>,
    power: S,
    link: L,
    tick_period: Duration,
    stats: RunStats,
}

impl<P, F, C, S, L> Runner<P, F, C, S, L>
where
    P: PwmOutput,
    F: ForceSensor,
    C: Clock,
    S: PowerSensor,
    L: MessageLink,
{
    pub fn new(bench: Benchmark<P, F, C>, power: S, link: L, tick_period: Duration) -> Self {
        Self {
            bench,
            power,
            link,
            tick_period,
            stats: RunStats::default(),
        }
    }

    pub fn bench(&self) -> &Benchmark<P, F, C> {
        &self.bench
    }

    pub fn stats(&self) -> RunStats {
        self.stats
    }

    /// One loop iteration without the trailing sleep.
    pub fn iterate(&mut self) {
        for event in self.link.poll() {
            match event {
                LinkEvent::Connected(peer) => tracing::info!(peer, "peer connected"),
                LinkEvent::Disconnected(peer) => self.bench.disconnect(peer),
                LinkEvent::Text(peer, text) => {
                    self.stats.inbound += 1;
                    tracing::debug!(peer, %text, "message received");
                    self.bench.handle_text(&text);
                }
                LinkEvent::Binary(peer, len) => {
                    tracing::debug!(peer, len, "binary frame ignored");
                }
            }
        }

        self.stats.ticks += 1;
        let raw = match self.power.read_raw() {
            Ok(raw) => raw,
            Err(e) => {
                self.stats.skipped += 1;
                tracing::warn!(error = %map_boxed(&e), "power read failed; tick skipped");
                if let Some(done) = self.bench.check_expiry() {
                    self.send(&done);
                }
                return;
            }
        };
        if let Some(out) = self.bench.tick(raw) {
            self.send(&out);
        }
    }

    fn send(&mut self, out: &Outbound) {
        match out.encode() {
            Ok(text) => {
                self.link.broadcast(&text);
                self.stats.outbound += 1;
            }
            Err(e) => tracing::warn!(error = %e, "outbound message dropped"),
        }
    }

    /// Loop until `shutdown` is raised, then park the rig.
    pub fn run(&mut self, shutdown: &AtomicBool) -> RunStats {
        tracing::info!(tick_ms = self.tick_period.as_millis() as u64, "control loop start");
        while !shutdown.load(Ordering::Relaxed) {
            self.iterate();
            self.bench.clock().sleep(self.tick_period);
        }
        self.bench.stop();
        tracing::info!(
            ticks = self.stats.ticks,
            inbound = self.stats.inbound,
            outbound = self.stats.outbound,
            skipped = self.stats.skipped,
            "control loop exit"
        );
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::channel_link;
    use crate::motor::MotorConfig;
    use rig_hardware::SimulatedRig;
    use rig_traits::{BoxError, ManualClock, RawPowerSample};

    struct FailingPower;

    impl PowerSensor for FailingPower {
        fn read_raw(&mut self) -> Result<RawPowerSample, BoxError> {
            Err(Box::new(std::io::Error::other("adc bus fault")))
        }
    }

    #[test]
    fn power_failure_skips_tick_without_output() {
        let rig = SimulatedRig::default();
        let mut bench = Benchmark::builder()
            .with_pwm(rig.pwm())
            .with_force_sensor(rig.load_cell())
            .with_clock(ManualClock::new())
            .with_motors([
                MotorConfig::brushless(6, 1, 50),
                MotorConfig::brushless(7, 2, 50),
            ])
            .build()
            .unwrap();
        bench.initialize().unwrap();
        let (link, peer) = channel_link(1);
        let mut runner = Runner::new(bench, FailingPower, link, Duration::from_millis(10));
        runner.iterate();
        assert!(peer.received().is_empty());
        assert_eq!(runner.stats().skipped, 1);
    }

    #[test]
    fn timed_run_finishes_while_power_sensor_is_down() {
        let rig = SimulatedRig::default();
        let clock = ManualClock::new();
        let mut bench = Benchmark::builder()
            .with_pwm(rig.pwm())
            .with_force_sensor(rig.load_cell())
            .with_clock(clock.clone())
            .with_motors([
                MotorConfig::brushless(6, 1, 50),
                MotorConfig::brushless(7, 2, 50),
            ])
            .with_seed_speed(100)
            .build()
            .unwrap();
        bench.initialize().unwrap();
        let (link, peer) = channel_link(1);
        let mut runner = Runner::new(bench, FailingPower, link, Duration::from_millis(10));

        peer.connect();
        peer.send_text(r#"{"command":"start","target_wattage":10,"benchmark_duration":2}"#);
        for _ in 0..1000 {
            runner.iterate();
            clock.advance(Duration::from_millis(10));
        }

        assert_eq!(runner.bench().phase(), crate::bench::Phase::Idle);
        assert_eq!(rig.duty(1), Some(51));
        assert_eq!(rig.duty(2), Some(51));
        let finished: Vec<_> = peer
            .received()
            .into_iter()
            .filter(|m| m == crate::protocol::BENCHMARK_FINISHED)
            .collect();
        assert_eq!(finished.len(), 1);
        assert_eq!(runner.stats().skipped, 1000);
    }
}
