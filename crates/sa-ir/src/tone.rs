//! Tone slot parameters.

use crate::error::ConfigError;
use crate::route::ChannelRoute;
use crate::window::SampleWindow;

/// Waveform produced by a tone slot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "snake_case")
)]
pub enum Waveform {
    /// Pure tone.
    #[default]
    Sine,
    /// Uniform white noise in `[-1, 1)`. Frequency and phase are ignored.
    WhiteNoise,
}

impl Waveform {
    /// Whether the waveform depends on frequency and phase.
    pub fn is_periodic(self) -> bool {
        matches!(self, Waveform::Sine)
    }

    pub fn to_bits(self) -> u8 {
        match self {
            Waveform::Sine => 0,
            Waveform::WhiteNoise => 1,
        }
    }

    pub fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0 => Some(Waveform::Sine),
            1 => Some(Waveform::WhiteNoise),
            _ => None,
        }
    }
}

/// One tone generator's parameter record.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ToneParams {
    /// Active window on the sample clock.
    pub window: SampleWindow,
    /// Frequency in Hz.
    pub frequency: f32,
    /// Linear gain applied after waveform evaluation.
    pub amplitude: f32,
    pub route: ChannelRoute,
    /// Phase in radians at `window.start`.
    pub phase: f32,
    pub waveform: Waveform,
    /// Opaque caller tag, carried but never interpreted.
    pub tag: u32,
}

impl ToneParams {
    /// A sine tone starting at phase zero.
    pub fn sine(window: SampleWindow, frequency: f32, amplitude: f32, route: ChannelRoute) -> Self {
        Self {
            window,
            frequency,
            amplitude,
            route,
            phase: 0.0,
            waveform: Waveform::Sine,
            tag: 0,
        }
    }

    /// White noise over `window`.
    pub fn noise(window: SampleWindow, amplitude: f32, route: ChannelRoute) -> Self {
        Self {
            waveform: Waveform::WhiteNoise,
            ..Self::sine(window, 0.0, amplitude, route)
        }
    }

    pub fn with_phase(mut self, phase: f32) -> Self {
        self.phase = phase;
        self
    }

    pub fn with_tag(mut self, tag: u32) -> Self {
        self.tag = tag;
        self
    }

    /// Validate against a bus of `channels` channels.
    pub fn validate(&self, channels: u16) -> Result<(), ConfigError> {
        self.window.validate()?;
        if self.waveform.is_periodic() && !(self.frequency.is_finite() && self.frequency > 0.0) {
            return Err(ConfigError::InvalidFrequency(self.frequency));
        }
        if !self.amplitude.is_finite() {
            return Err(ConfigError::InvalidAmplitude(self.amplitude));
        }
        if !self.phase.is_finite() {
            return Err(ConfigError::InvalidPhase(self.phase));
        }
        self.route.validate(channels)
    }
}
