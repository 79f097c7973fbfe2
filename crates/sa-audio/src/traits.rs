//! Audio output trait and error types.

use sa_engine::Engine;
use sa_ir::ConfigError;
use thiserror::Error;

/// Error type for audio operations.
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("no audio output device available")]
    NoDevice,

    #[error("device query failed: {0}")]
    DeviceQuery(String),

    #[error("device offers no {channels}-channel f32/i16/u16 output{}", rate_hint(.sample_rate))]
    UnsupportedFormat {
        channels: u16,
        sample_rate: Option<u32>,
    },

    #[error("failed to build output stream: {0}")]
    StreamBuild(String),

    #[error("playback error: {0}")]
    Playback(String),

    #[error("output already started")]
    AlreadyStarted,

    #[error(transparent)]
    Config(#[from] ConfigError),
}

fn rate_hint(rate: &Option<u32>) -> String {
    rate.map(|r| format!(" at {r} Hz")).unwrap_or_default()
}

/// Format negotiated with the host device.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HostFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

/// Trait for audio output backends.
pub trait AudioOutput {
    /// Format the device will run at.
    fn host_format(&self) -> HostFormat;

    /// Configure `engine` for the host format and hand it to the device
    /// callback. Playback begins immediately.
    fn start(&mut self, engine: Engine) -> Result<(), AudioError>;

    /// Stop the device and drop the engine.
    fn stop(&mut self) -> Result<(), AudioError>;

    fn is_running(&self) -> bool;
}
