//! Multichannel f32 scratch buffer with planar layout.

use alloc::vec;
use alloc::vec::Vec;

/// A multichannel f32 audio buffer in planar layout.
///
/// Data is stored as `channels` contiguous planes of `frames` samples each.
/// `data[ch * frames + frame]` gives the sample for channel `ch` at `frame`.
#[derive(Clone, Debug)]
pub struct AudioBuffer {
    data: Vec<f32>,
    channels: u16,
    frames: usize,
}

impl AudioBuffer {
    /// Create a new silent buffer with the given dimensions.
    pub fn new(channels: u16, frames: usize) -> Self {
        Self {
            data: vec![0.0; channels as usize * frames],
            channels,
            frames,
        }
    }

    /// Fill all samples with zero.
    pub fn silence(&mut self) {
        self.data.fill(0.0);
    }

    /// Zero the first `frames` samples of every channel.
    pub fn silence_frames(&mut self, frames: usize) {
        let n = frames.min(self.frames);
        for ch in 0..self.channels {
            self.channel_mut(ch)[..n].fill(0.0);
        }
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Read-only access to one channel's sample data.
    pub fn channel(&self, ch: u16) -> &[f32] {
        let start = ch as usize * self.frames;
        &self.data[start..start + self.frames]
    }

    /// Mutable access to one channel's sample data.
    pub fn channel_mut(&mut self, ch: u16) -> &mut [f32] {
        let start = ch as usize * self.frames;
        let len = self.frames;
        &mut self.data[start..start + len]
    }

    /// Add `value` to one sample.
    #[inline]
    pub fn accumulate(&mut self, ch: u16, frame: usize, value: f32) {
        self.data[ch as usize * self.frames + frame] += value;
    }

    /// Multiply the first `frames` samples of every channel by a per-frame gain.
    pub fn apply_frame_gains(&mut self, gains: &[f32]) {
        for ch in 0..self.channels {
            for (s, g) in self.channel_mut(ch).iter_mut().zip(gains) {
                *s *= *g;
            }
        }
    }

    /// Write the first `frames` frames into `out` as interleaved samples.
    ///
    /// `out` must hold at least `frames * channels` samples.
    pub fn write_interleaved(&self, frames: usize, out: &mut [f32]) {
        let ch = self.channels as usize;
        for c in 0..self.channels {
            let plane = self.channel(c);
            for (i, s) in plane[..frames].iter().enumerate() {
                out[i * ch + c as usize] = *s;
            }
        }
    }

    /// Copy the first `frames` frames of each channel into `planes`,
    /// starting at `offset` within each plane.
    pub fn write_planar(&self, frames: usize, offset: usize, planes: &mut [&mut [f32]]) {
        for (c, plane) in planes.iter_mut().enumerate().take(self.channels as usize) {
            plane[offset..offset + frames].copy_from_slice(&self.channel(c as u16)[..frames]);
        }
    }
}
