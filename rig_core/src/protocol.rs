//! Inbound request decoding and outbound message encoding.
//!
//! Inbound text is a JSON object with any combination of `command`,
//! `target_wattage` and `benchmark_duration`. Outbound messages are compact
//! JSON, except the completion notice which goes out as bare text.

use serde::{Deserialize, Serialize};

use crate::batch::ForceSample;
use crate::error::ProtocolError;

pub const BENCHMARK_FINISHED: &str = "Benchmark finished";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    Start,
    Stop,
}

#[derive(Debug, Deserialize)]
struct WireRequest {
    #[serde(default)]
    command: Option<String>,
    #[serde(default)]
    target_wattage: Option<f64>,
    #[serde(default)]
    benchmark_duration: Option<f64>,
}

/// A decoded inbound message. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Request {
    pub command: Option<ControlCommand>,
    pub target_wattage: Option<f32>,
    /// Whole seconds.
    pub benchmark_duration: Option<u64>,
    /// A `command` string that is neither "start" nor "stop".
    pub unrecognized: Option<String>,
}

impl Request {
    /// True when the message carries a field that restarts the benchmark timer.
    pub fn carries_parameters(&self) -> bool {
        self.target_wattage.is_some() || self.benchmark_duration.is_some()
    }

    /// The unrecognized command, as the error it is logged as.
    pub fn unrecognized_error(&self) -> Option<ProtocolError> {
        self.unrecognized
            .as_ref()
            .map(|c| ProtocolError::UnrecognizedCommandValue(c.clone()))
    }
}

pub fn decode(text: &str) -> Result<Request, ProtocolError> {
    let wire: WireRequest = serde_json::from_str(text.trim())
        .map_err(|e| ProtocolError::MalformedCommand(e.to_string()))?;

    let (command, unrecognized) = match wire.command.as_deref() {
        None => (None, None),
        Some("start") => (Some(ControlCommand::Start), None),
        Some("stop") => (Some(ControlCommand::Stop), None),
        Some(other) => (None, Some(other.to_string())),
    };

    let benchmark_duration = match wire.benchmark_duration {
        None => None,
        Some(d) if d.is_finite() && d >= 0.0 => Some(d.trunc() as u64),
        Some(d) => {
            return Err(ProtocolError::MalformedCommand(format!(
                "benchmark_duration must be a non-negative number of seconds, got {d}"
            )));
        }
    };

    Ok(Request {
        command,
        target_wattage: wire.target_wattage.map(|w| w as f32),
        benchmark_duration,
        unrecognized,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Telemetry {
    pub voltage: f32,
    pub current: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchReport {
    pub force_measurements: Vec<ForceSample>,
    pub voltage: f32,
    pub current: f32,
}

/// Everything the rig sends to its peers.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Telemetry(Telemetry),
    Batch(BatchReport),
    Notice(String),
}

impl Outbound {
    pub fn finished() -> Self {
        Self::Notice(BENCHMARK_FINISHED.to_string())
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        let json = match self {
            Self::Telemetry(t) => serde_json::to_string(t),
            Self::Batch(b) => serde_json::to_string(b),
            Self::Notice(text) => return Ok(text.clone()),
        };
        json.map_err(|e| ProtocolError::Encode(e.to_string()))
    }
}
