pub mod clock;

pub use clock::{Clock, ManualClock, MonotonicClock};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// PWM peripheral. Channels are configured once, then written with raw duty counts
/// at the resolution they were configured with.
pub trait PwmOutput {
    fn attach(
        &mut self,
        pin: u8,
        channel: u8,
        frequency_hz: u32,
        resolution_bits: u8,
    ) -> Result<(), BoxError>;
    fn write(&mut self, channel: u8, duty: u32) -> Result<(), BoxError>;
}

/// Calibrated load cell.
pub trait ForceSensor {
    fn get_reading(&mut self) -> Result<f32, BoxError>;
    fn power_down(&mut self) -> Result<(), BoxError>;
    fn power_up(&mut self) -> Result<(), BoxError>;
}

/// One uncalibrated ADC reading per power channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RawPowerSample {
    pub voltage: u16,
    pub current: u16,
}

pub trait PowerSensor {
    fn read_raw(&mut self) -> Result<RawPowerSample, BoxError>;
}

/// Peer identifier assigned by the transport.
pub type PeerId = u32;

/// Something that happened on the message channel since the last poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    Connected(PeerId),
    Disconnected(PeerId),
    Text(PeerId, String),
    Binary(PeerId, usize),
}

/// Bidirectional message channel to the remote controllers.
pub trait MessageLink {
    /// Drain every event received since the previous call. Never blocks.
    fn poll(&mut self) -> Vec<LinkEvent>;
    /// Deliver `text` to every connected peer.
    fn broadcast(&mut self, text: &str);
}
