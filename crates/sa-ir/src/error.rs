//! Configuration errors reported synchronously to the controller.

use thiserror::Error;

/// Which slot arena a slot index refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SlotKind {
    Tone,
    Buffer,
}

impl core::fmt::Display for SlotKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            SlotKind::Tone => f.write_str("tone"),
            SlotKind::Buffer => f.write_str("buffer"),
        }
    }
}

/// Invalid configuration rejected at call time.
///
/// Never produced on the render path; a slot that would have failed
/// validation is treated as inactive there instead.
#[derive(Error, Clone, Debug, PartialEq)]
pub enum ConfigError {
    #[error("{kind} slot {index} out of range (capacity {capacity})")]
    SlotOutOfRange {
        kind: SlotKind,
        index: usize,
        capacity: usize,
    },

    #[error("empty window: end {end} must be greater than start {start}")]
    EmptyWindow { start: u64, end: u64 },

    #[error("invalid frequency {0} Hz")]
    InvalidFrequency(f32),

    #[error("invalid amplitude {0}")]
    InvalidAmplitude(f32),

    #[error("invalid phase {0}")]
    InvalidPhase(f32),

    #[error("invalid balance {0}: must lie within [0, 1]")]
    InvalidBalance(f32),

    #[error("channel mask is empty")]
    EmptyChannelMask,

    #[error("route addresses channel {channel} but the bus has {channels} channels")]
    ChannelOutOfRange { channel: u16, channels: u16 },

    #[error("invalid sample rate {0} Hz")]
    InvalidSampleRate(u32),

    #[error("invalid bus layout: {0} channels")]
    InvalidBusLayout(u16),

    #[error("bus has {actual} channels, expected {expected}")]
    ChannelMismatch { expected: u16, actual: u16 },

    #[error("unknown or stale buffer handle")]
    UnknownBuffer,

    #[error("PCM buffer holds no frames")]
    EmptyBuffer,

    #[error("PCM data of {samples} samples is not a whole number of {channels}-channel frames")]
    RaggedBuffer { samples: usize, channels: u16 },

    #[error("engine is already rendering; configure must happen before the first render call")]
    AlreadyRendering,
}
