//! Playback of pre-rendered PCM buffers.

use alloc::sync::Arc;

use sa_ir::{AudioBuffer, AudioSource, BufferBank, BufferParams, SlotKind, MAX_BUFFERS};

use crate::fault::{FaultReason, FaultSender, SlotFault};
use crate::mixer::{route_gains, RouteGains};
use crate::ramp::{window_gain, Glide};
use crate::scheduler::{Block, RenderCtx, STALE_VERSION};
use crate::shared::{ParamReader, Snapshot};

/// Render-side state of one buffer slot.
struct BufferVoice {
    version: u32,
    params: Option<BufferParams>,
    active: bool,
    /// Next frame of the buffer to play.
    cursor: usize,
    gain: Glide,
    gains: RouteGains,
    silenced: bool,
    /// A stale handle is reported once per slot version.
    stale_reported: bool,
}

impl BufferVoice {
    fn new() -> Self {
        Self {
            version: STALE_VERSION,
            params: None,
            active: false,
            cursor: 0,
            gain: Glide::default(),
            gains: RouteGains::new(),
            silenced: false,
            stale_reported: false,
        }
    }

    fn refresh(&mut self, snap: Snapshot<BufferParams>, ctx: RenderCtx) -> Option<FaultReason> {
        if snap.version == self.version {
            return None;
        }
        self.version = snap.version;
        self.silenced = false;
        self.stale_reported = false;

        let Some(new) = snap.params else {
            self.params = None;
            self.active = false;
            return None;
        };

        // Same asset from the same onset keeps its cursor; gain, end and
        // route may change under it.
        let retune = self.active
            && self
                .params
                .as_ref()
                .is_some_and(|old| old.key == new.key && old.window.start == new.window.start);
        if retune {
            self.gain.glide_to(new.gain, ctx.ramp);
        } else {
            self.active = false;
            self.gain.set(new.gain);
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

    fn render(
        &mut self,
        block: Block,
        ctx: RenderCtx,
        bank: &BufferBank,
        mix: &mut AudioBuffer,
    ) -> Option<FaultReason> {
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
        let Some(buffer) = bank.get(p.key) else {
            if self.stale_reported {
                return None;
            }
            self.stale_reported = true;
            return Some(FaultReason::StaleBuffer);
        };

        if !self.active {
            let first = block.start + span.start as u64;
            self.cursor = usize::try_from(first - p.window.start).unwrap_or(usize::MAX);
            self.active = true;
        }

        let frames = buffer.frames();
        let mono = buffer.channels() == 1;
        let outputs = buffer.channels().min(ctx.channels);
        for off in span.clone() {
            if self.cursor >= frames {
                break;
            }
            let index = block.start + off as u64;
            let gain = self.gain.next() * window_gain(p.window, index, ctx.ramp);
            if mono {
                let value = buffer.read_f32(0, self.cursor) * gain;
                if !value.is_finite() {
                    return Some(self.fail());
                }
                for &(ch, g) in &self.gains {
                    mix.accumulate(ch, off, value * g);
                }
            } else {
                for ch in 0..outputs {
                    let value = buffer.read_f32(ch, self.cursor) * gain;
                    if !value.is_finite() {
                        return Some(self.fail());
                    }
                    mix.accumulate(ch, off, value);
                }
            }
            self.cursor += 1;
        }

        if block.start + span.end as u64 >= p.window.end {
            self.active = false;
        }
        None
    }

    fn fail(&mut self) -> FaultReason {
        self.silenced = true;
        self.active = false;
        FaultReason::NonFiniteOutput
    }
}

/// The fixed arena of buffer slots over an immutable buffer bank.
pub(crate) struct BufferPlayer {
    bank: Arc<BufferBank>,
    voices: [BufferVoice; MAX_BUFFERS],
}

impl BufferPlayer {
    pub fn new(bank: Arc<BufferBank>) -> Self {
        Self {
            bank,
            voices: core::array::from_fn(|_| BufferVoice::new()),
        }
    }

    /// Pick up rewritten slots. Returns `false` if any read was torn.
    pub fn refresh(&mut self, reader: &ParamReader, ctx: RenderCtx, faults: &mut FaultSender) -> bool {
        let mut complete = true;
        for (index, voice) in self.voices.iter_mut().enumerate() {
            match reader.read_buffer(index) {
                Some(snap) => {
                    if let Some(reason) = voice.refresh(snap, ctx) {
                        faults.report(SlotFault::slot(SlotKind::Buffer, index, reason));
                    }
                }
                None => complete = false,
            }
        }
        complete
    }

    pub fn invalidate(&mut self) {
        for voice in &mut self.voices {
            voice.version = STALE_VERSION;
        }
    }

    pub fn rearm(&mut self) {
        for voice in &mut self.voices {
            voice.active = false;
            if let Some(p) = voice.params {
                voice.gain.set(p.gain);
            }
        }
    }

    pub fn render(&mut self, block: Block, ctx: RenderCtx, mix: &mut AudioBuffer, faults: &mut FaultSender) {
        for (index, voice) in self.voices.iter_mut().enumerate() {
            if let Some(reason) = voice.render(block, ctx, &self.bank, mix) {
                faults.report(SlotFault::slot(SlotKind::Buffer, index, reason));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sa_ir::{ChannelRoute, PcmBuffer, SampleWindow};

    const CTX: RenderCtx = RenderCtx {
        sample_rate: 48000,
        channels: 2,
        ramp: 0,
    };

    fn block(start: u64, frames: usize) -> Block {
        Block {
            start,
            frames,
            limit: u64::MAX,
        }
    }

    fn snap(version: u32, params: BufferParams) -> Snapshot<BufferParams> {
        Snapshot {
            version,
            params: Some(params),
        }
    }

    #[test]
    fn cursor_starts_at_window_offset() {
        let mut bank = BufferBank::new();
        let key = bank.insert(PcmBuffer::mono((0..10).map(|i| i as f32).collect()).unwrap());
        let mut v = BufferVoice::new();
        let p = BufferParams::new(key, SampleWindow::new(4, 100)).with_route(ChannelRoute::Channel(0));
        v.refresh(snap(2, p), CTX);
        let mut mix = AudioBuffer::new(2, 4);
        // Rendering starts two frames after the onset.
        v.render(block(6, 4), CTX, &bank, &mut mix);
        assert_eq!(mix.channel(0), &[2.0, 3.0, 4.0, 5.0]);
        assert_eq!(mix.channel(1), &[0.0; 4]);
    }

    #[test]
    fn short_buffer_runs_out_before_end() {
        let mut bank = BufferBank::new();
        let key = bank.insert(PcmBuffer::mono(vec![1.0; 3]).unwrap());
        let mut v = BufferVoice::new();
        let p = BufferParams::new(key, SampleWindow::new(0, 8)).with_route(ChannelRoute::Mask(0b11));
        v.refresh(snap(2, p), CTX);
        let mut mix = AudioBuffer::new(2, 8);
        v.render(block(0, 8), CTX, &bank, &mut mix);
        assert_eq!(mix.channel(0), &[1.0, 1.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
        assert_eq!(mix.channel(1), mix.channel(0));
    }

    #[test]
    fn multichannel_maps_channel_to_channel() {
        let mut bank = BufferBank::new();
        let key = bank.insert(PcmBuffer::from_interleaved(&[0.1, 0.2, 0.3, 0.4], 2).unwrap());
        let mut v = BufferVoice::new();
        let p = BufferParams::new(key, SampleWindow::new(0, 2)).with_gain(2.0);
        v.refresh(snap(2, p), CTX);
        let mut mix = AudioBuffer::new(2, 2);
        v.render(block(0, 2), CTX, &bank, &mut mix);
        assert_eq!(mix.channel(0), &[0.2, 0.6]);
        assert_eq!(mix.channel(1), &[0.4, 0.8]);
    }

    #[test]
    fn stale_handle_reported_once() {
        let mut bank = BufferBank::new();
        let key = bank.insert(PcmBuffer::mono(vec![1.0; 4]).unwrap());
        let p = BufferParams::new(key, SampleWindow::new(0, 4));
        bank.remove(key);
        let mut v = BufferVoice::new();
        v.refresh(snap(2, p), CTX);
        let mut mix = AudioBuffer::new(2, 4);
        assert_eq!(v.render(block(0, 2), CTX, &bank, &mut mix), Some(FaultReason::StaleBuffer));
        assert_eq!(v.render(block(2, 2), CTX, &bank, &mut mix), None);
        assert!(mix.channel(0).iter().all(|&s| s == 0.0));
    }

    #[test]
    fn non_finite_sample_silences_slot() {
        let mut bank = BufferBank::new();
        let key = bank.insert(PcmBuffer::mono(vec![0.5, f32::NAN, 0.5, 0.5]).unwrap());
        let mut v = BufferVoice::new();
        let p = BufferParams::new(key, SampleWindow::new(0, 4)).with_route(ChannelRoute::Channel(0));
        v.refresh(snap(2, p), CTX);
        let mut mix = AudioBuffer::new(2, 4);
        assert_eq!(v.render(block(0, 4), CTX, &bank, &mut mix), Some(FaultReason::NonFiniteOutput));
        assert_eq!(mix.channel(0), &[0.5, 0.0, 0.0, 0.0]);
        assert_eq!(v.render(block(0, 4), CTX, &bank, &mut mix), None);
    }

    #[test]
    fn gain_change_keeps_cursor() {
        let mut bank = BufferBank::new();
        let key = bank.insert(PcmBuffer::mono((0..8).map(|i| i as f32).collect()).unwrap());
        let mut v = BufferVoice::new();
        let p = BufferParams::new(key, SampleWindow::new(0, 8)).with_route(ChannelRoute::Channel(0));
        v.refresh(snap(2, p), CTX);
        let mut mix = AudioBuffer::new(2, 4);
        v.render(block(0, 4), CTX, &bank, &mut mix);
        v.refresh(snap(4, p.with_gain(0.5)), CTX);
        mix.silence();
        v.render(block(4, 4), CTX, &bank, &mut mix);
        assert_eq!(mix.channel(0), &[2.0, 2.5, 3.0, 3.5]);
    }
}
