//! Per-sample waveform generation.

use core::f64::consts::TAU;

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;

/// Phase advance per sample in radians: `2π · f / sr`.
#[inline]
pub fn phase_increment(frequency: f32, sample_rate: u32) -> f64 {
    TAU * frequency as f64 / sample_rate as f64
}

/// Wrap a phase into `[0, 2π)`.
#[inline]
pub fn wrap_phase(phase: f64) -> f64 {
    let wrapped = phase % TAU;
    if wrapped < 0.0 {
        wrapped + TAU
    } else {
        wrapped
    }
}

/// Sine oscillator with an f64 phase accumulator.
///
/// The phase stays wrapped so precision does not degrade over long
/// sessions.
#[derive(Clone, Copy, Debug, Default)]
pub struct Oscillator {
    phase: f64,
    increment: f64,
}

impl Oscillator {
    pub fn new(phase: f64, increment: f64) -> Self {
        Self {
            phase: wrap_phase(phase),
            increment,
        }
    }

    pub fn phase(&self) -> f64 {
        self.phase
    }

    pub fn increment(&self) -> f64 {
        self.increment
    }

    /// Jump to `phase`.
    pub fn set_phase(&mut self, phase: f64) {
        self.phase = wrap_phase(phase);
    }

    /// Change frequency without touching the phase.
    pub fn set_increment(&mut self, increment: f64) {
        self.increment = increment;
    }

    /// Current sample; advances the phase by one step.
    #[inline]
    pub fn next_sample(&mut self) -> f32 {
        let out = libm::sin(self.phase) as f32;
        self.phase += self.increment;
        if self.phase >= TAU {
            self.phase = wrap_phase(self.phase);
        }
        out
    }
}

/// Uniform white noise in `[-1, 1)`.
#[derive(Clone, Debug)]
pub struct NoiseSource {
    rng: Pcg32,
}

impl NoiseSource {
    /// `stream` selects an independent sequence for the same seed.
    pub fn new(seed: u64, stream: u64) -> Self {
        Self {
            rng: Pcg32::new(seed, stream),
        }
    }

    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: Pcg32::seed_from_u64(seed),
        }
    }

    #[inline]
    pub fn next_sample(&mut self) -> f32 {
        self.rng.random_range(-1.0f32..1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::f64::consts::PI;

    #[test]
    fn increment_formula() {
        let inc = phase_increment(480.0, 48000);
        assert!((inc - TAU / 100.0).abs() < 1e-12);
    }

    #[test]
    fn wrap_keeps_phase_in_range() {
        assert!((wrap_phase(TAU + 0.5) - 0.5).abs() < 1e-12);
        assert!((wrap_phase(-0.5) - (TAU - 0.5)).abs() < 1e-12);
        assert_eq!(wrap_phase(0.0), 0.0);
        let p = wrap_phase(1e9);
        assert!((0.0..TAU).contains(&p));
    }

    #[test]
    fn quarter_period_steps() {
        let mut osc = Oscillator::new(0.0, PI / 2.0);
        let out: Vec<f32> = (0..5).map(|_| osc.next_sample()).collect();
        let expected = [0.0, 1.0, 0.0, -1.0, 0.0];
        for (o, e) in out.iter().zip(expected) {
            assert!((o - e).abs() < 1e-6, "{out:?}");
        }
    }

    #[test]
    fn phase_never_leaves_range_over_long_runs() {
        let mut osc = Oscillator::new(0.0, phase_increment(997.0, 44100));
        for _ in 0..1_000_000 {
            osc.next_sample();
        }
        assert!((0.0..TAU).contains(&osc.phase()));
    }

    #[test]
    fn initial_phase_offsets_waveform() {
        let mut osc = Oscillator::new(PI / 2.0, 0.0);
        assert!((osc.next_sample() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn noise_is_bounded_and_seeded() {
        let mut a = NoiseSource::new(42, 3);
        let mut b = NoiseSource::new(42, 3);
        let mut c = NoiseSource::new(42, 4);
        let mut differs = false;
        for _ in 0..1000 {
            let (x, y, z) = (a.next_sample(), b.next_sample(), c.next_sample());
            assert!((-1.0..1.0).contains(&x));
            assert_eq!(x, y);
            differs |= x != z;
        }
        assert!(differs);
    }
}
