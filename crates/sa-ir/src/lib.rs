//! Core types for the stimuli audio engine.
//!
//! This crate defines the parameter records the experiment controller
//! writes and the render engine reads: tone and buffer slots, sample
//! windows, channel routes, bus layouts and pre-rendered PCM buffers.
//!
//! Designed to be `no_std` compatible with the `alloc` crate.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod audio_buffer;
mod audio_traits;
mod buffer;
mod bus;
mod error;
mod route;
mod tone;
mod window;

pub use audio_buffer::AudioBuffer;
pub use audio_traits::AudioSource;
pub use buffer::{BufferBank, BufferKey, BufferParams, PcmBuffer};
pub use bus::{BusLayout, MAX_CHANNELS};
pub use error::{ConfigError, SlotKind};
pub use route::ChannelRoute;
pub use tone::{ToneParams, Waveform};
pub use window::{secs_to_samples, SampleWindow};

/// Number of tone generator slots.
pub const MAX_TONES: usize = 10;

/// Number of pre-rendered buffer playback slots.
pub const MAX_BUFFERS: usize = 20;
