//! Activation windows measured in sample indices.

use core::ops::Range;

use crate::error::ConfigError;

/// Half-open activation window `[start, end)` on the engine's sample clock.
///
/// All scheduling is done in integer sample indices. Second-based times
/// are converted once, at the controller boundary, via [`SampleWindow::from_secs`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SampleWindow {
    pub start: u64,
    pub end: u64,
}

impl SampleWindow {
    pub const fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    /// Build a window from a start time and a duration in seconds.
    ///
    /// Both edges are rounded to the nearest sample. Negative times clamp
    /// to sample zero.
    pub fn from_secs(start_secs: f64, duration_secs: f64, sample_rate_hz: u32) -> Self {
        let start = secs_to_samples(start_secs, sample_rate_hz);
        let end = secs_to_samples(start_secs + duration_secs, sample_rate_hz);
        Self { start, end }
    }

    /// Reject empty or inverted windows.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.end <= self.start {
            return Err(ConfigError::EmptyWindow {
                start: self.start,
                end: self.end,
            });
        }
        Ok(())
    }

    /// Number of samples in the window.
    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    /// Returns true if the window contains no samples.
    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Whether sample index `index` lies inside the window.
    pub fn contains(&self, index: u64) -> bool {
        index >= self.start && index < self.end
    }

    /// Offsets within a render cycle covering `[cycle_start, cycle_start + frames)`
    /// during which the window is active, additionally cut off at `limit`.
    ///
    /// Returns `None` when the window does not intersect the cycle.
    pub fn span_in(&self, cycle_start: u64, frames: usize, limit: u64) -> Option<Range<usize>> {
        let cycle_end = cycle_start.saturating_add(frames as u64);
        let from = self.start.max(cycle_start);
        let to = self.end.min(cycle_end).min(limit);
        if from >= to {
            return None;
        }
        Some((from - cycle_start) as usize..(to - cycle_start) as usize)
    }
}

/// Convert seconds to the nearest sample index.
pub fn secs_to_samples(secs: f64, sample_rate_hz: u32) -> u64 {
    let samples = secs * sample_rate_hz as f64 + 0.5;
    if samples <= 0.0 {
        0
    } else {
        samples as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_secs_rounds_to_samples() {
        let w = SampleWindow::from_secs(0.5, 1.0, 48000);
        assert_eq!(w, SampleWindow::new(24000, 72000));
    }

    #[test]
    fn negative_start_clamps_to_zero() {
        let w = SampleWindow::from_secs(-1.0, 2.0, 100);
        assert_eq!(w.start, 0);
        assert_eq!(w.end, 100);
    }

    #[test]
    fn inverted_window_rejected() {
        assert_eq!(
            SampleWindow::new(10, 10).validate(),
            Err(ConfigError::EmptyWindow { start: 10, end: 10 })
        );
        assert!(SampleWindow::new(10, 11).validate().is_ok());
    }

    #[test]
    fn contains_is_half_open() {
        let w = SampleWindow::new(1000, 2000);
        assert!(!w.contains(999));
        assert!(w.contains(1000));
        assert!(w.contains(1999));
        assert!(!w.contains(2000));
    }

    #[test]
    fn span_inside_cycle() {
        let w = SampleWindow::new(1010, 1020);
        assert_eq!(w.span_in(1000, 64, u64::MAX), Some(10..20));
    }

    #[test]
    fn span_covers_whole_cycle() {
        let w = SampleWindow::new(0, 10_000);
        assert_eq!(w.span_in(256, 256, u64::MAX), Some(0..256));
    }

    #[test]
    fn span_outside_cycle_is_none() {
        let w = SampleWindow::new(1000, 2000);
        assert_eq!(w.span_in(0, 1000, u64::MAX), None);
        assert_eq!(w.span_in(2000, 64, u64::MAX), None);
    }

    #[test]
    fn span_cut_at_limit() {
        let w = SampleWindow::new(0, 1000);
        assert_eq!(w.span_in(0, 512, 100), Some(0..100));
        assert_eq!(w.span_in(512, 512, 100), None);
    }
}
