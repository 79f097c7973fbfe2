//! Pre-rendered PCM buffers and buffer slot parameters.

use alloc::vec::Vec;
use slotmap::{Key, KeyData, SlotMap};

use crate::audio_traits::AudioSource;
use crate::error::ConfigError;
use crate::route::ChannelRoute;
use crate::window::SampleWindow;

slotmap::new_key_type! {
    /// Handle to a buffer in a [`BufferBank`].
    ///
    /// Keys are generational: a handle whose buffer was removed no longer
    /// resolves, which the render path reports as a stale handle.
    pub struct BufferKey;
}

impl BufferKey {
    /// Pack the key into a single word for lock-free publication.
    pub fn to_bits(self) -> u64 {
        self.data().as_ffi()
    }

    pub fn from_bits(bits: u64) -> Self {
        KeyData::from_ffi(bits).into()
    }
}

/// An immutable, fully pre-rendered PCM buffer.
///
/// Samples are stored planar: `channels` contiguous planes of `frames`
/// samples each.
#[derive(Clone, Debug, PartialEq)]
pub struct PcmBuffer {
    data: Vec<f32>,
    channels: u16,
    frames: usize,
}

impl PcmBuffer {
    /// Single-channel buffer.
    pub fn mono(samples: Vec<f32>) -> Result<Self, ConfigError> {
        if samples.is_empty() {
            return Err(ConfigError::EmptyBuffer);
        }
        let frames = samples.len();
        Ok(Self {
            data: samples,
            channels: 1,
            frames,
        })
    }

    /// De-interleave `samples` holding `channels` samples per frame.
    pub fn from_interleaved(samples: &[f32], channels: u16) -> Result<Self, ConfigError> {
        if channels == 0 {
            return Err(ConfigError::InvalidBusLayout(0));
        }
        let ch = channels as usize;
        if samples.len() % ch != 0 {
            return Err(ConfigError::RaggedBuffer {
                samples: samples.len(),
                channels,
            });
        }
        let frames = samples.len() / ch;
        if frames == 0 {
            return Err(ConfigError::EmptyBuffer);
        }
        let mut data = Vec::with_capacity(samples.len());
        for c in 0..ch {
            data.extend(samples.iter().skip(c).step_by(ch).copied());
        }
        Ok(Self { data, channels, frames })
    }

    /// De-interleave 16-bit integer PCM.
    pub fn from_interleaved_i16(samples: &[i16], channels: u16) -> Result<Self, ConfigError> {
        let floats: Vec<f32> = samples.iter().map(|&s| s as f32 / 32768.0).collect();
        Self::from_interleaved(&floats, channels)
    }

    /// One `Vec` per channel; every channel must have the same length.
    pub fn from_planes(planes: Vec<Vec<f32>>) -> Result<Self, ConfigError> {
        let channels = planes.len() as u16;
        let frames = planes.first().map_or(0, Vec::len);
        if channels == 0 || frames == 0 {
            return Err(ConfigError::EmptyBuffer);
        }
        if planes.iter().any(|p| p.len() != frames) {
            return Err(ConfigError::RaggedBuffer {
                samples: planes.iter().map(Vec::len).sum(),
                channels,
            });
        }
        let data = planes.into_iter().flatten().collect();
        Ok(Self { data, channels, frames })
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    /// One channel's samples.
    pub fn channel(&self, ch: u16) -> &[f32] {
        let start = ch as usize * self.frames;
        &self.data[start..start + self.frames]
    }
}

impl AudioSource for PcmBuffer {
    fn channels(&self) -> u16 {
        self.channels
    }

    fn frames(&self) -> usize {
        self.frames
    }

    fn read_f32(&self, ch: u16, frame: usize) -> f32 {
        if ch >= self.channels || frame >= self.frames {
            return 0.0;
        }
        self.data[ch as usize * self.frames + frame]
    }
}

/// Immutable collection of buffers shared by the controller and the engine.
#[derive(Clone, Debug, Default)]
pub struct BufferBank {
    buffers: SlotMap<BufferKey, PcmBuffer>,
}

impl BufferBank {
    pub fn new() -> Self {
        Self {
            buffers: SlotMap::with_key(),
        }
    }

    pub fn insert(&mut self, buffer: PcmBuffer) -> BufferKey {
        self.buffers.insert(buffer)
    }

    pub fn remove(&mut self, key: BufferKey) -> Option<PcmBuffer> {
        self.buffers.remove(key)
    }

    pub fn get(&self, key: BufferKey) -> Option<&PcmBuffer> {
        self.buffers.get(key)
    }

    pub fn contains(&self, key: BufferKey) -> bool {
        self.buffers.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }
}

/// One buffer playback slot's parameter record.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BufferParams {
    pub key: BufferKey,
    /// Playback window; the cursor starts at frame 0 at `window.start`.
    pub window: SampleWindow,
    /// Linear gain applied to every buffer sample.
    pub gain: f32,
    /// Route for mono buffers. Multi-channel buffers map channel `k`
    /// to output channel `k`.
    pub route: ChannelRoute,
}

impl BufferParams {
    pub fn new(key: BufferKey, window: SampleWindow) -> Self {
        Self {
            key,
            window,
            gain: 1.0,
            route: ChannelRoute::default(),
        }
    }

    pub fn with_gain(mut self, gain: f32) -> Self {
        self.gain = gain;
        self
    }

    pub fn with_route(mut self, route: ChannelRoute) -> Self {
        self.route = route;
        self
    }

    /// Validate against a bus of `channels` channels and the bank that
    /// will serve the buffer.
    pub fn validate(&self, channels: u16, bank: &BufferBank) -> Result<(), ConfigError> {
        self.window.validate()?;
        if !self.gain.is_finite() {
            return Err(ConfigError::InvalidAmplitude(self.gain));
        }
        let buffer = bank.get(self.key).ok_or(ConfigError::UnknownBuffer)?;
        if buffer.channels() == 1 {
            self.route.validate(channels)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn interleaved_is_deinterleaved() {
        let buf = PcmBuffer::from_interleaved(&[1.0, -1.0, 2.0, -2.0, 3.0, -3.0], 2).unwrap();
        assert_eq!(buf.frames(), 3);
        assert_eq!(buf.channel(0), &[1.0, 2.0, 3.0]);
        assert_eq!(buf.channel(1), &[-1.0, -2.0, -3.0]);
    }

    #[test]
    fn ragged_interleaved_rejected() {
        assert_eq!(
            PcmBuffer::from_interleaved(&[0.0; 5], 2),
            Err(ConfigError::RaggedBuffer { samples: 5, channels: 2 })
        );
    }

    #[test]
    fn empty_buffers_rejected() {
        assert_eq!(PcmBuffer::mono(vec![]), Err(ConfigError::EmptyBuffer));
        assert_eq!(PcmBuffer::from_interleaved(&[], 1), Err(ConfigError::EmptyBuffer));
        assert_eq!(PcmBuffer::from_planes(vec![]), Err(ConfigError::EmptyBuffer));
    }

    #[test]
    fn planes_must_match() {
        assert!(PcmBuffer::from_planes(vec![vec![0.0; 4], vec![0.0; 3]]).is_err());
        let buf = PcmBuffer::from_planes(vec![vec![0.5; 4], vec![0.25; 4]]).unwrap();
        assert_eq!(buf.channels(), 2);
        assert_eq!(buf.read_f32(1, 3), 0.25);
    }

    #[test]
    fn i16_scaled_to_unit_range() {
        let buf = PcmBuffer::from_interleaved_i16(&[16384, -32768], 1).unwrap();
        assert!((buf.read_f32(0, 0) - 0.5).abs() < 1e-6);
        assert_eq!(buf.read_f32(0, 1), -1.0);
    }

    #[test]
    fn out_of_range_reads_are_silent() {
        let buf = PcmBuffer::mono(vec![1.0]).unwrap();
        assert_eq!(buf.read_f32(0, 1), 0.0);
        assert_eq!(buf.read_f32(1, 0), 0.0);
    }

    #[test]
    fn params_need_a_live_key() {
        let mut bank = BufferBank::new();
        let key = bank.insert(PcmBuffer::mono(vec![0.0; 8]).unwrap());
        let params = BufferParams::new(key, SampleWindow::new(0, 8));
        assert!(params.validate(2, &bank).is_ok());

        bank.remove(key);
        assert_eq!(params.validate(2, &bank), Err(ConfigError::UnknownBuffer));
    }

    #[test]
    fn key_bits_round_trip() {
        let mut bank = BufferBank::new();
        let key = bank.insert(PcmBuffer::mono(vec![0.0; 2]).unwrap());
        assert_eq!(BufferKey::from_bits(key.to_bits()), key);
    }

    #[test]
    fn mono_route_checked_multichannel_ignored() {
        let mut bank = BufferBank::new();
        let mono = bank.insert(PcmBuffer::mono(vec![0.0; 8]).unwrap());
        let stereo = bank.insert(PcmBuffer::from_interleaved(&[0.0; 8], 2).unwrap());
        let route = ChannelRoute::Channel(5);
        let w = SampleWindow::new(0, 8);
        assert!(BufferParams::new(mono, w).with_route(route).validate(2, &bank).is_err());
        assert!(BufferParams::new(stereo, w).with_route(route).validate(2, &bank).is_ok());
    }
}
