//! Tone slot scheduling: activation windows, phase handling and retuning.

use sa_ir::{AudioBuffer, SlotKind, ToneParams, Waveform, MAX_TONES};

use crate::fault::{FaultReason, FaultSender, SlotFault};
use crate::mixer::{route_gains, RouteGains};
use crate::oscillator::{phase_increment, NoiseSource, Oscillator};
use crate::ramp::{window_gain, Glide};
use crate::shared::{ParamReader, Snapshot};

/// Version no snapshot can carry (published versions are even).
pub(crate) const STALE_VERSION: u32 = u32::MAX;

/// Sample range `[start, start + frames)` rendered in one block, with
/// output cut off at `limit`.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Block {
    pub start: u64,
    pub frames: usize,
    pub limit: u64,
}

impl Block {
    pub fn end(&self) -> u64 {
        self.start.saturating_add(self.frames as u64)
    }
}

/// Engine-wide values every slot needs while rendering.
#[derive(Clone, Copy, Debug)]
pub(crate) struct RenderCtx {
    pub sample_rate: u32,
    pub channels: u16,
    pub ramp: u32,
}

/// Render-side state of one tone slot.
pub(crate) struct ToneVoice {
    version: u32,
    params: Option<ToneParams>,
    active: bool,
    osc: Oscillator,
    noise: NoiseSource,
    amplitude: Glide,
    gains: RouteGains,
    /// Set by a fault; cleared when the slot is rewritten.
    silenced: bool,
}

impl ToneVoice {
    fn new(noise: NoiseSource) -> Self {
        Self {
            version: STALE_VERSION,
            params: None,
            active: false,
            osc: Oscillator::default(),
            noise,
            amplitude: Glide::default(),
            gains: RouteGains::new(),
            silenced: false,
        }
    }

    /// Whether a new record keeps the running waveform: same onset, same
    /// initial phase, same waveform. Anything else restarts the slot.
    fn is_retune(old: &ToneParams, new: &ToneParams) -> bool {
        old.window.start == new.window.start
            && old.phase.to_bits() == new.phase.to_bits()
            && old.waveform == new.waveform
    }

    fn refresh(&mut self, snap: Snapshot<ToneParams>, ctx: RenderCtx) -> Option<FaultReason> {
        if snap.version == self.version {
            return None;
        }
        self.version = snap.version;
        self.silenced = false;

        let Some(new) = snap.params else {
            self.params = None;
            self.active = false;
            return None;
        };

        self.osc.set_increment(phase_increment(new.frequency, ctx.sample_rate));
        let retune = self.active && self.params.as_ref().is_some_and(|old| Self::is_retune(old, &new));
        if retune {
            self.amplitude.glide_to(new.amplitude, ctx.ramp);
        } else {
            self.active = false;
            self.amplitude.set(new.amplitude);
        }
        self.params = Some(new);

        match route_gains(new.route, ctx.channels) {
            Some(gains) => {
                self.gains = gains;
                None
            }
            None => {
                self.silenced = true;
                self.active = false;
                Some(FaultReason::ChannelOutOfRange)
            }
        }
    }

    fn render(&mut self, block: Block, ctx: RenderCtx, mix: &mut AudioBuffer) -> Option<FaultReason> {
        let p = self.params?;
        if self.silenced {
            return None;
        }
        let Some(span) = p.window.span_in(block.start, block.frames, block.limit) else {
            if block.end() >= p.window.end {
                self.active = false;
            }
            return None;
        };

        if !self.active {
            // Onset: the stored phase belongs to `window.start`; project it
            // to the first sample actually rendered.
            let first = block.start + span.start as u64;
            let elapsed = (first - p.window.start) as f64;
            self.osc.set_phase(p.phase as f64 + self.osc.increment() * elapsed);
            self.active = true;
        }

        for off in span.clone() {
            let index = block.start + off as u64;
            let gain = self.amplitude.next() * window_gain(p.window, index, ctx.ramp);
            let wave = match p.waveform {
                Waveform::Sine => self.osc.next_sample(),
                Waveform::WhiteNoise => self.noise.next_sample(),
            };
            let value = wave * gain;
            if !value.is_finite() {
                self.silenced = true;
                self.active = false;
                return Some(FaultReason::NonFiniteOutput);
            }
            for &(ch, g) in &self.gains {
                mix.accumulate(ch, off, value * g);
            }
        }

        if block.start + span.end as u64 >= p.window.end {
            self.active = false;
        }
        None
    }
}

/// The fixed arena of tone slots.
pub(crate) struct ToneScheduler {
    voices: [ToneVoice; MAX_TONES],
}

impl ToneScheduler {
    pub fn new(noise_seed: u64) -> Self {
        Self {
            voices: core::array::from_fn(|i| ToneVoice::new(NoiseSource::new(noise_seed, i as u64))),
        }
    }

    /// Pick up rewritten slots. Returns `false` if any read was torn; the
    /// torn slot keeps its previous record until the next attempt.
    pub fn refresh(&mut self, reader: &ParamReader, ctx: RenderCtx, faults: &mut FaultSender) -> bool {
        let mut complete = true;
        for (index, voice) in self.voices.iter_mut().enumerate() {
            match reader.read_tone(index) {
                Some(snap) => {
                    if let Some(reason) = voice.refresh(snap, ctx) {
                        faults.report(SlotFault::slot(SlotKind::Tone, index, reason));
                    }
                }
                None => complete = false,
            }
        }
        complete
    }

    /// Force every slot to be re-read, e.g. after the sample rate changed.
    pub fn invalidate(&mut self) {
        for voice in &mut self.voices {
            voice.version = STALE_VERSION;
        }
    }

    /// Drop all running state so every slot restarts at its next onset.
    pub fn rearm(&mut self) {
        for voice in &mut self.voices {
            voice.active = false;
            if let Some(p) = voice.params {
                voice.amplitude.set(p.amplitude);
            }
        }
    }

    pub fn render(&mut self, block: Block, ctx: RenderCtx, mix: &mut AudioBuffer, faults: &mut FaultSender) {
        for (index, voice) in self.voices.iter_mut().enumerate() {
            if let Some(reason) = voice.render(block, ctx, mix) {
                faults.report(SlotFault::slot(SlotKind::Tone, index, reason));
            }
        }
    }
}
