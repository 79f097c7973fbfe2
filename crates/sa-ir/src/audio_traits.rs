//! Read-only sample access shared by every buffer type.

/// Random access to channel/frame addressed f32 samples.
pub trait AudioSource {
    /// Number of channels in the source.
    fn channels(&self) -> u16;

    /// Number of frames in the source.
    fn frames(&self) -> usize;

    /// Sample at `frame` on `ch`; out-of-range reads return silence.
    fn read_f32(&self, ch: u16, frame: usize) -> f32;

    /// Duration in seconds at the given sample rate.
    fn duration_secs(&self, sample_rate_hz: u32) -> f64 {
        self.frames() as f64 / sample_rate_hz as f64
    }
}
