//! Linear gain ramps for click-free onsets, offsets and amplitude changes.

use sa_ir::SampleWindow;

/// Fade gain at sample `index` of `window`: a linear rise over the first
/// `ramp` samples and a linear fall over the last `ramp` samples.
///
/// `ramp == 0` gives a hard-edged window.
#[inline]
pub(crate) fn window_gain(window: SampleWindow, index: u64, ramp: u32) -> f32 {
    if ramp == 0 {
        return 1.0;
    }
    let from_start = index.saturating_sub(window.start);
    let to_end = window.end.saturating_sub(index + 1);
    let edge = from_start.min(to_end) + 1;
    if edge >= ramp as u64 {
        1.0
    } else {
        edge as f32 / ramp as f32
    }
}

/// Fade-out gain before an absolute stop bound.
#[inline]
pub(crate) fn stop_gain(stop: u64, index: u64, ramp: u32) -> f32 {
    if ramp == 0 || index >= stop {
        return if index >= stop { 0.0 } else { 1.0 };
    }
    let remaining = stop - index;
    if remaining >= ramp as u64 {
        1.0
    } else {
        remaining as f32 / ramp as f32
    }
}

/// A value that glides linearly to a new target.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct Glide {
    current: f32,
    target: f32,
    step: f32,
    remaining: u32,
}

impl Glide {
    pub fn new(value: f32) -> Self {
        Self {
            current: value,
            target: value,
            step: 0.0,
            remaining: 0,
        }
    }

    /// Jump to `value` immediately.
    pub fn set(&mut self, value: f32) {
        *self = Self::new(value);
    }

    /// Reach `target` after `samples` calls to [`next`](Self::next).
    pub fn glide_to(&mut self, target: f32, samples: u32) {
        if samples == 0 || target == self.current {
            self.set(target);
            return;
        }
        self.target = target;
        self.step = (target - self.current) / samples as f32;
        self.remaining = samples;
    }

    #[inline]
    pub fn next(&mut self) -> f32 {
        if self.remaining > 0 {
            self.remaining -= 1;
            self.current = if self.remaining == 0 {
                self.target
            } else {
                self.current + self.step
            };
        }
        self.current
    }

    pub fn target(&self) -> f32 {
        self.target
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_ramp_is_rectangular() {
        let w = SampleWindow::new(10, 20);
        assert_eq!(window_gain(w, 10, 0), 1.0);
        assert_eq!(window_gain(w, 19, 0), 1.0);
    }

    #[test]
    fn window_fades_both_edges() {
        let w = SampleWindow::new(100, 200);
        assert_eq!(window_gain(w, 100, 4), 0.25);
        assert_eq!(window_gain(w, 101, 4), 0.5);
        assert_eq!(window_gain(w, 103, 4), 1.0);
        assert_eq!(window_gain(w, 150, 4), 1.0);
        assert_eq!(window_gain(w, 198, 4), 0.5);
        assert_eq!(window_gain(w, 199, 4), 0.25);
    }

    #[test]
    fn short_window_never_reaches_full_gain() {
        let w = SampleWindow::new(0, 3);
        assert_eq!(window_gain(w, 1, 10), 0.2);
    }

    #[test]
    fn stop_gain_falls_to_zero() {
        assert_eq!(stop_gain(100, 50, 4), 1.0);
        assert_eq!(stop_gain(100, 96, 4), 1.0);
        assert_eq!(stop_gain(100, 97, 4), 0.75);
        assert_eq!(stop_gain(100, 99, 4), 0.25);
        assert_eq!(stop_gain(100, 100, 4), 0.0);
        assert_eq!(stop_gain(100, 99, 0), 1.0);
    }

    #[test]
    fn glide_reaches_target_exactly() {
        let mut g = Glide::new(0.0);
        g.glide_to(1.0, 4);
        let steps: Vec<f32> = (0..5).map(|_| g.next()).collect();
        assert_eq!(steps, [0.25, 0.5, 0.75, 1.0, 1.0]);
    }

    #[test]
    fn zero_length_glide_steps() {
        let mut g = Glide::new(0.3);
        g.glide_to(0.8, 0);
        assert_eq!(g.next(), 0.8);
        assert_eq!(g.target(), 0.8);
    }
}
