//! Session configuration and trial plans, authored in seconds.
//!
//! Seconds are converted to sample indices here and nowhere else.

use std::path::Path;

use serde::{Deserialize, Serialize};

use sa_engine::EngineSettings;
use sa_ir::{secs_to_samples, ChannelRoute, SampleWindow, ToneParams, Waveform};

use crate::error::MasterError;

/// Session-wide audio settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    /// Requested device rate; the host default when absent.
    pub sample_rate_hz: Option<u32>,
    /// Bus width every route is authored against.
    pub channels: u16,
    /// Onset/offset fade and glide length.
    pub ramp_secs: f64,
    pub max_block_frames: usize,
    pub fault_capacity: usize,
    pub noise_seed: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: None,
            channels: 2,
            ramp_secs: 0.005,
            max_block_frames: 1024,
            fault_capacity: 64,
            noise_seed: 0x5EED,
        }
    }
}

impl SessionConfig {
    /// Engine settings at the negotiated sample rate.
    pub fn engine_settings(&self, sample_rate: u32) -> EngineSettings {
        let ramp = secs_to_samples(self.ramp_secs, sample_rate).min(u32::MAX as u64) as u32;
        EngineSettings {
            max_block_frames: self.max_block_frames,
            ramp_samples: ramp,
            fault_capacity: self.fault_capacity,
            noise_seed: self.noise_seed,
        }
    }
}

/// A tone cue.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToneSpec {
    /// Explicit slot; cues without one fill the lowest free slots.
    #[serde(default)]
    pub slot: Option<usize>,
    #[serde(default)]
    pub start_secs: f64,
    pub duration_secs: f64,
    #[serde(default)]
    pub frequency: f32,
    pub amplitude: f32,
    #[serde(default)]
    pub channel: ChannelRoute,
    /// Radians at onset.
    #[serde(default)]
    pub phase: f32,
    #[serde(default)]
    pub waveform: Waveform,
    #[serde(default)]
    pub tag: u32,
}

impl ToneSpec {
    pub fn to_params(&self, sample_rate: u32) -> ToneParams {
        ToneParams {
            window: SampleWindow::from_secs(self.start_secs, self.duration_secs, sample_rate),
            frequency: self.frequency,
            amplitude: self.amplitude,
            route: self.channel,
            phase: self.phase,
            waveform: self.waveform,
            tag: self.tag,
        }
    }
}

/// A buffer cue referring to a named asset.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BufferSpec {
    #[serde(default)]
    pub slot: Option<usize>,
    pub asset: String,
    #[serde(default)]
    pub start_secs: f64,
    /// Defaults to the asset's own length.
    #[serde(default)]
    pub duration_secs: Option<f64>,
    #[serde(default = "unity")]
    pub gain: f32,
    #[serde(default)]
    pub channel: ChannelRoute,
}

fn unity() -> f32 {
    1.0
}

/// A PCM asset loaded from a WAV file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AssetSpec {
    pub name: String,
    pub path: String,
}

/// One trial: the session settings plus every cue, in seconds from the
/// trial's onset.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrialPlan {
    pub session: SessionConfig,
    #[serde(rename = "asset")]
    pub assets: Vec<AssetSpec>,
    #[serde(rename = "tone")]
    pub tones: Vec<ToneSpec>,
    #[serde(rename = "buffer")]
    pub buffers: Vec<BufferSpec>,
    /// Trial length; the end of the last tone cue when absent.
    pub duration_secs: Option<f64>,
}

impl TrialPlan {
    pub fn from_toml_str(text: &str) -> Result<Self, MasterError> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, MasterError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Trial length in seconds, ignoring buffer cues without a duration.
    pub fn length_secs(&self) -> f64 {
        if let Some(d) = self.duration_secs {
            return d;
        }
        let tones = self.tones.iter().map(|t| t.start_secs + t.duration_secs);
        let buffers = self
            .buffers
            .iter()
            .filter_map(|b| b.duration_secs.map(|d| b.start_secs + d));
        tones.chain(buffers).fold(0.0, f64::max)
    }
}
