#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Core rig logic (hardware-agnostic).
//!
//! All hardware goes through the capability traits in `rig_traits`
//! (`PwmOutput`, `ForceSensor`, `PowerSensor`, `MessageLink`, `Clock`).
//!
//! ## Architecture
//!
//! - **Motors**: signed speed to duty for brushless and brushed DC (`motor`)
//! - **Power**: raw ADC counts to volts/amps (`power`)
//! - **Control**: bang-bang wattage regulation over a lockstep pair (`controller`)
//! - **Batching**: capacity-bounded force sample batches (`batch`)
//! - **Protocol**: JSON requests in, telemetry out (`protocol`)
//! - **State machine**: idle/running/finished benchmark (`bench`)
//! - **Loop**: link servicing and ticking on one actor (`runner`)

pub mod batch;
pub mod bench;
pub mod controller;
pub mod conversions;
pub mod error;
pub mod hw_error;
pub mod link;
pub mod motor;
pub mod power;
pub mod protocol;
pub mod runner;

pub use batch::{BatchOutcome, ForceSample, MeasurementBatcher};
pub use bench::{BenchSettings, Benchmark, BenchmarkBuilder, BenchmarkState, Phase};
pub use controller::{Adjustment, MotorPair, WattageController};
pub use error::{BuildError, MotorError, ProtocolError, Result, RigError};
pub use link::{ChannelLink, RemotePeer, channel_link};
pub use motor::{DutyCommand, MotorConfig, MotorDriver, PwmLine, Topology};
pub use power::{LinearCal, PowerSample, PowerTracker};
pub use protocol::{BENCHMARK_FINISHED, ControlCommand, Outbound, Request};
pub use runner::{RunStats, Runner};
