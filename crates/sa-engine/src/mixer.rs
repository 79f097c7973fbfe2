//! Channel routing and output sample conversion.

use arrayvec::ArrayVec;
use sa_ir::{ChannelRoute, MAX_CHANNELS};

/// Per-channel gains a route resolves to on a given bus.
pub type RouteGains = ArrayVec<(u16, f32), { MAX_CHANNELS as usize }>;

/// Resolve `route` on a bus of `channels` channels.
///
/// Returns `None` if the route addresses a channel the bus does not have.
/// On a mono bus a balance route folds both sides onto channel 0.
pub fn route_gains(route: ChannelRoute, channels: u16) -> Option<RouteGains> {
    let mut gains = RouteGains::new();
    match route {
        ChannelRoute::Channel(ch) => {
            if ch >= channels {
                return None;
            }
            gains.push((ch, 1.0));
        }
        ChannelRoute::Mask(mask) => {
            if (mask as u64) >> channels != 0 {
                return None;
            }
            for ch in 0..channels.min(MAX_CHANNELS) {
                if mask & (1 << ch) != 0 {
                    gains.push((ch, 1.0));
                }
            }
        }
        ChannelRoute::Balance(b) => {
            if !(0.0..=1.0).contains(&b) {
                return None;
            }
            if channels == 1 {
                gains.push((0, 1.0));
            } else {
                gains.push((0, 1.0 - b));
                gains.push((1, b));
            }
        }
    }
    Some(gains)
}

/// Convert to signed 16-bit, saturating outside `[-1, 1]`.
#[inline]
pub fn to_i16(sample: f32) -> i16 {
    (sample * 32767.0).clamp(-32768.0, 32767.0) as i16
}

/// Convert to offset-binary unsigned 16-bit, saturating outside `[-1, 1]`.
#[inline]
pub fn to_u16(sample: f32) -> u16 {
    (to_i16(sample) as i32 + 32768) as u16
}
