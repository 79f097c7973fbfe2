//! Output channel routing for a slot.

use crate::bus::MAX_CHANNELS;
use crate::error::ConfigError;

/// How a slot's mono signal is distributed over the output bus.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "snake_case")
)]
pub enum ChannelRoute {
    /// A single output channel.
    Channel(u16),
    /// Every channel whose bit is set receives the full signal.
    Mask(u32),
    /// Stereo balance: 0.0 = left only, 1.0 = right only, 0.5 = both.
    /// Channel 0 receives `(1 - b)`, channel 1 receives `b`.
    Balance(f32),
}

impl ChannelRoute {
    pub const LEFT: Self = ChannelRoute::Balance(0.0);
    pub const RIGHT: Self = ChannelRoute::Balance(1.0);
    pub const CENTER: Self = ChannelRoute::Balance(0.5);

    /// Check the route against a bus of `channels` channels.
    pub fn validate(&self, channels: u16) -> Result<(), ConfigError> {
        match *self {
            ChannelRoute::Channel(ch) => {
                if ch >= channels {
                    return Err(ConfigError::ChannelOutOfRange { channel: ch, channels });
                }
            }
            ChannelRoute::Mask(mask) => {
                if mask == 0 {
                    return Err(ConfigError::EmptyChannelMask);
                }
                let highest = (31 - mask.leading_zeros()) as u16;
                if highest >= channels || highest >= MAX_CHANNELS {
                    return Err(ConfigError::ChannelOutOfRange {
                        channel: highest,
                        channels,
                    });
                }
            }
            ChannelRoute::Balance(b) => {
                if !(0.0..=1.0).contains(&b) {
                    return Err(ConfigError::InvalidBalance(b));
                }
            }
        }
        Ok(())
    }
}

impl Default for ChannelRoute {
    fn default() -> Self {
        ChannelRoute::CENTER
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_index_checked_against_bus() {
        assert!(ChannelRoute::Channel(1).validate(2).is_ok());
        assert_eq!(
            ChannelRoute::Channel(2).validate(2),
            Err(ConfigError::ChannelOutOfRange { channel: 2, channels: 2 })
        );
    }

    #[test]
    fn mask_checked_against_bus() {
        assert!(ChannelRoute::Mask(0b11).validate(2).is_ok());
        assert_eq!(ChannelRoute::Mask(0).validate(2), Err(ConfigError::EmptyChannelMask));
        assert!(ChannelRoute::Mask(0b100).validate(2).is_err());
    }

    #[test]
    fn balance_must_be_unit_interval() {
        assert!(ChannelRoute::Balance(0.0).validate(2).is_ok());
        assert!(ChannelRoute::Balance(1.0).validate(1).is_ok());
        assert_eq!(
            ChannelRoute::Balance(1.5).validate(2),
            Err(ConfigError::InvalidBalance(1.5))
        );
        assert!(ChannelRoute::Balance(f32::NAN).validate(2).is_err());
    }
}
