//! Output bus description negotiated with the host.

use crate::error::ConfigError;

/// Maximum number of output channels on a bus.
pub const MAX_CHANNELS: u16 = 8;

/// Channel layout of the engine's output bus.
///
/// The render driver always produces 32-bit float samples; the host
/// adapter converts to the device format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BusLayout {
    pub channels: u16,
}

impl BusLayout {
    pub const fn new(channels: u16) -> Self {
        Self { channels }
    }

    pub const fn mono() -> Self {
        Self::new(1)
    }

    pub const fn stereo() -> Self {
        Self::new(2)
    }

    /// Reject layouts the mixer cannot address.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.channels == 0 || self.channels > MAX_CHANNELS {
            return Err(ConfigError::InvalidBusLayout(self.channels));
        }
        Ok(())
    }
}

impl Default for BusLayout {
    fn default() -> Self {
        Self::stereo()
    }
}
