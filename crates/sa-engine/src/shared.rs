//! Shared parameter state between the controller and the render thread.
//!
//! Every slot is a small sequence-locked record of plain words. The single
//! writer bumps the slot's sequence to an odd value, stores the words and
//! bumps it to the next even value. The reader copies the words between two
//! sequence loads; if they differ (or the first is odd) the copy is torn and
//! the reader keeps whatever it had, retrying on the next render cycle.
//! Neither side ever waits on the other.
//!
//! Transport fields (clock, stop bound, pause, trial re-arm) are individual
//! atomics; a reader seeing a new value one cycle late only shifts a
//! boundary by that cycle.

use alloc::sync::Arc;
use core::sync::atomic::{fence, AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};

use sa_ir::{
    BufferBank, BufferKey, BufferParams, BusLayout, ChannelRoute, ConfigError, SampleWindow,
    SlotKind, ToneParams, Waveform, MAX_BUFFERS, MAX_TONES,
};

use crate::engine::EngineState;

/// Sentinel for "no value" in the u64 transport atomics.
pub(crate) const NONE: u64 = u64::MAX;

/// Stop lead meaning "one fade-out ramp from now".
pub(crate) const RAMP_LEAD: u64 = u64::MAX - 1;

/// Highest clock value a trial may start at. Leaves headroom so the render
/// clock never wraps.
pub const MAX_TRIAL_COUNTER: u64 = u64::MAX / 2;

const WORDS: usize = 6;
const PRESENT: u64 = 1;

struct SeqSlot {
    seq: AtomicU32,
    words: [AtomicU64; WORDS],
}

impl SeqSlot {
    fn new() -> Self {
        Self {
            seq: AtomicU32::new(0),
            words: core::array::from_fn(|_| AtomicU64::new(0)),
        }
    }

    /// Only called through `&mut ParamWriter`, so there is one writer.
    fn store(&self, words: [u64; WORDS]) {
        let seq = self.seq.load(Ordering::Relaxed);
        self.seq.store(seq.wrapping_add(1), Ordering::Relaxed);
        fence(Ordering::Release);
        for (slot, word) in self.words.iter().zip(words) {
            slot.store(word, Ordering::Relaxed);
        }
        self.seq.store(seq.wrapping_add(2), Ordering::Release);
    }

    /// Consistent copy of the words with its version, or `None` if torn.
    fn load(&self) -> Option<(u32, [u64; WORDS])> {
        let before = self.seq.load(Ordering::Acquire);
        if before & 1 == 1 {
            return None;
        }
        let mut words = [0u64; WORDS];
        for (word, slot) in words.iter_mut().zip(&self.words) {
            *word = slot.load(Ordering::Relaxed);
        }
        fence(Ordering::Acquire);
        let after = self.seq.load(Ordering::Relaxed);
        (before == after).then_some((before, words))
    }
}

/// A consistent read of one slot.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct Snapshot<P> {
    /// Changes every time the controller writes the slot.
    pub version: u32,
    /// `None` when the slot is cleared.
    pub params: Option<P>,
}

fn route_to_bits(route: ChannelRoute) -> (u64, u32) {
    match route {
        ChannelRoute::Channel(ch) => (0, ch as u32),
        ChannelRoute::Mask(mask) => (1, mask),
        ChannelRoute::Balance(b) => (2, b.to_bits()),
    }
}

fn route_from_bits(kind: u64, payload: u32) -> Option<ChannelRoute> {
    match kind {
        0 => Some(ChannelRoute::Channel(payload as u16)),
        1 => Some(ChannelRoute::Mask(payload)),
        2 => Some(ChannelRoute::Balance(f32::from_bits(payload))),
        _ => None,
    }
}

fn pack_tone(p: &ToneParams) -> [u64; WORDS] {
    let (kind, payload) = route_to_bits(p.route);
    [
        PRESENT | (p.waveform.to_bits() as u64) << 8 | (p.tag as u64) << 32,
        p.window.start,
        p.window.end,
        p.frequency.to_bits() as u64 | (p.amplitude.to_bits() as u64) << 32,
        p.phase.to_bits() as u64 | kind << 32,
        payload as u64,
    ]
}

fn unpack_tone(w: &[u64; WORDS]) -> Option<ToneParams> {
    if w[0] & PRESENT == 0 {
        return None;
    }
    Some(ToneParams {
        window: SampleWindow::new(w[1], w[2]),
        frequency: f32::from_bits(w[3] as u32),
        amplitude: f32::from_bits((w[3] >> 32) as u32),
        route: route_from_bits(w[4] >> 32, w[5] as u32)?,
        phase: f32::from_bits(w[4] as u32),
        waveform: Waveform::from_bits((w[0] >> 8) as u8)?,
        tag: (w[0] >> 32) as u32,
    })
}

fn pack_buffer(p: &BufferParams) -> [u64; WORDS] {
    let (kind, payload) = route_to_bits(p.route);
    [
        PRESENT | kind << 32,
        p.window.start,
        p.window.end,
        p.key.to_bits(),
        p.gain.to_bits() as u64 | (payload as u64) << 32,
        0,
    ]
}

fn unpack_buffer(w: &[u64; WORDS]) -> Option<BufferParams> {
    if w[0] & PRESENT == 0 {
        return None;
    }
    Some(BufferParams {
        key: BufferKey::from_bits(w[3]),
        window: SampleWindow::new(w[1], w[2]),
        gain: f32::from_bits(w[4] as u32),
        route: route_from_bits(w[0] >> 32, (w[4] >> 32) as u32)?,
    })
}

/// Transport state shared by the controller, the engine and observers.
///
/// The observers are lock-free and may be called from any thread.
pub struct Transport {
    sample_rate: AtomicU32,
    tone_counter: AtomicU64,
    tone_counter_stop: AtomicU64,
    stop_lead: AtomicU64,
    pending_reset: AtomicU64,
    pub(crate) changing_tones: AtomicBool,
    pub(crate) changing_buffers: AtomicBool,
    number_of_audios: AtomicU32,
    paused: AtomicBool,
    session_ended: AtomicBool,
    state: AtomicU8,
}

impl Transport {
    fn new() -> Self {
        Self {
            sample_rate: AtomicU32::new(0),
            tone_counter: AtomicU64::new(0),
            tone_counter_stop: AtomicU64::new(NONE),
            stop_lead: AtomicU64::new(NONE),
            pending_reset: AtomicU64::new(NONE),
            changing_tones: AtomicBool::new(true),
            changing_buffers: AtomicBool::new(true),
            number_of_audios: AtomicU32::new(0),
            paused: AtomicBool::new(false),
            session_ended: AtomicBool::new(false),
            state: AtomicU8::new(EngineState::Unconfigured as u8),
        }
    }

    /// Sample index of the next frame the engine will render.
    pub fn position(&self) -> u64 {
        self.tone_counter.load(Ordering::Acquire)
    }

    /// Sample rate fixed by `Engine::configure`, if configured.
    pub fn sample_rate(&self) -> Option<u32> {
        match self.sample_rate.load(Ordering::Acquire) {
            0 => None,
            rate => Some(rate),
        }
    }

    /// Absolute sample index at which output goes silent, if set.
    pub fn stop_bound(&self) -> Option<u64> {
        match self.tone_counter_stop.load(Ordering::Acquire) {
            NONE => None,
            stop => Some(stop),
        }
    }

    /// Number of buffer slots currently configured.
    pub fn number_of_audios(&self) -> u32 {
        self.number_of_audios.load(Ordering::Relaxed)
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    pub fn session_ended(&self) -> bool {
        self.session_ended.load(Ordering::Acquire)
    }

    /// Last state published by the engine.
    ///
    /// A stopped engine with a trial re-arm waiting reports `Configured`:
    /// the re-arm is only acknowledged after the engine has published the
    /// state it leads to.
    pub fn state(&self) -> EngineState {
        let published = EngineState::from_u8(self.state.load(Ordering::Acquire));
        if published == EngineState::Stopped && self.pending_reset().is_some() && !self.session_ended() {
            return EngineState::Configured;
        }
        published
    }

    pub(crate) fn publish_sample_rate(&self, rate: u32) {
        self.sample_rate.store(rate, Ordering::Release);
    }

    pub(crate) fn publish_position(&self, counter: u64) {
        self.tone_counter.store(counter, Ordering::Release);
    }

    pub(crate) fn publish_state(&self, state: EngineState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub(crate) fn set_stop_bound(&self, stop: u64) {
        self.tone_counter_stop.store(stop, Ordering::Release);
    }

    pub(crate) fn take_stop_lead(&self) -> Option<u64> {
        match self.stop_lead.swap(NONE, Ordering::AcqRel) {
            NONE => None,
            lead => Some(lead),
        }
    }

    pub(crate) fn pending_reset(&self) -> Option<u64> {
        match self.pending_reset.load(Ordering::Acquire) {
            NONE => None,
            counter => Some(counter),
        }
    }

    /// Clear the re-arm request for `counter`. A newer request written in
    /// the meantime stays pending.
    pub(crate) fn ack_reset(&self, counter: u64) {
        let _ = self
            .pending_reset
            .compare_exchange(counter, NONE, Ordering::AcqRel, Ordering::Relaxed);
    }
}

struct SharedState {
    channels: u16,
    bank: Arc<BufferBank>,
    tones: [SeqSlot; MAX_TONES],
    buffers: [SeqSlot; MAX_BUFFERS],
    transport: Transport,
}

/// Create the shared parameter state for a bus of `channels` channels.
///
/// `bank` is the set of buffers that [`ParamWriter::set_buffer`] validates
/// handles against; the engine must be built over the same bank.
pub fn shared_state(
    channels: u16,
    bank: Arc<BufferBank>,
) -> Result<(ParamWriter, ParamReader), ConfigError> {
    BusLayout::new(channels).validate()?;
    let shared = Arc::new(SharedState {
        channels,
        bank,
        tones: core::array::from_fn(|_| SeqSlot::new()),
        buffers: core::array::from_fn(|_| SeqSlot::new()),
        transport: Transport::new(),
    });
    let writer = ParamWriter {
        shared: Arc::clone(&shared),
        buffer_present: [false; MAX_BUFFERS],
    };
    Ok((writer, ParamReader { shared }))
}

/// The controller's handle. There is exactly one per shared state; its
/// setters take `&mut self`, so concurrent writes cannot be expressed.
pub struct ParamWriter {
    shared: Arc<SharedState>,
    buffer_present: [bool; MAX_BUFFERS],
}

impl ParamWriter {
    /// Authored bus width every route is validated against.
    pub fn channels(&self) -> u16 {
        self.shared.channels
    }

    pub fn bank(&self) -> &Arc<BufferBank> {
        &self.shared.bank
    }

    pub fn transport(&self) -> &Transport {
        &self.shared.transport
    }

    fn check_index(kind: SlotKind, index: usize, capacity: usize) -> Result<(), ConfigError> {
        if index >= capacity {
            return Err(ConfigError::SlotOutOfRange { kind, index, capacity });
        }
        Ok(())
    }

    /// Publish a tone slot. A playing tone whose start, phase and waveform
    /// are unchanged is retuned in place without a phase reset.
    pub fn set_tone(&mut self, index: usize, params: ToneParams) -> Result<(), ConfigError> {
        Self::check_index(SlotKind::Tone, index, MAX_TONES)?;
        params.validate(self.shared.channels)?;
        self.shared.tones[index].store(pack_tone(&params));
        self.shared.transport.changing_tones.store(true, Ordering::Release);
        Ok(())
    }

    pub fn clear_tone(&mut self, index: usize) -> Result<(), ConfigError> {
        Self::check_index(SlotKind::Tone, index, MAX_TONES)?;
        self.shared.tones[index].store([0; WORDS]);
        self.shared.transport.changing_tones.store(true, Ordering::Release);
        Ok(())
    }

    /// Publish a buffer slot.
    pub fn set_buffer(&mut self, index: usize, params: BufferParams) -> Result<(), ConfigError> {
        Self::check_index(SlotKind::Buffer, index, MAX_BUFFERS)?;
        params.validate(self.shared.channels, &self.shared.bank)?;
        self.shared.buffers[index].store(pack_buffer(&params));
        self.buffer_present[index] = true;
        self.publish_buffers();
        Ok(())
    }

    pub fn clear_buffer(&mut self, index: usize) -> Result<(), ConfigError> {
        Self::check_index(SlotKind::Buffer, index, MAX_BUFFERS)?;
        self.shared.buffers[index].store([0; WORDS]);
        self.buffer_present[index] = false;
        self.publish_buffers();
        Ok(())
    }

    fn publish_buffers(&self) {
        let count = self.buffer_present.iter().filter(|p| **p).count() as u32;
        let transport = &self.shared.transport;
        transport.number_of_audios.store(count, Ordering::Relaxed);
        transport.changing_buffers.store(true, Ordering::Release);
    }

    /// Publish a buffer slot without checking its handle.
    #[cfg(test)]
    pub(crate) fn set_buffer_unchecked(&mut self, index: usize, params: BufferParams) {
        self.shared.buffers[index].store(pack_buffer(&params));
        self.buffer_present[index] = true;
        self.publish_buffers();
    }

    /// Disable every tone and buffer slot.
    pub fn reset_slots(&mut self) {
        for slot in &self.shared.tones {
            slot.store([0; WORDS]);
        }
        for slot in &self.shared.buffers {
            slot.store([0; WORDS]);
        }
        self.buffer_present = [false; MAX_BUFFERS];
        self.shared.transport.changing_tones.store(true, Ordering::Release);
        self.publish_buffers();
    }

    /// Fade the whole mix out over one ramp and stop.
    pub fn request_stop(&mut self) {
        self.shared.transport.stop_lead.store(RAMP_LEAD, Ordering::Release);
    }

    /// Stop `lead` samples after the engine next observes the request.
    pub fn request_stop_after(&mut self, lead: u64) {
        self.shared.transport.stop_lead.store(lead.min(RAMP_LEAD - 1), Ordering::Release);
    }

    /// Silence all output from absolute sample index `sample` on.
    pub fn request_stop_at(&mut self, sample: u64) {
        self.shared.transport.set_stop_bound(sample.min(NONE - 1));
    }

    /// Re-arm the engine for a new trial with its clock at `counter`
    /// (clamped to [`MAX_TRIAL_COUNTER`]).
    ///
    /// Clears the stop bound and any pause. From here on the transport
    /// no longer reports `Stopped` for the previous trial.
    pub fn begin_trial(&mut self, counter: u64) {
        let transport = &self.shared.transport;
        transport.stop_lead.store(NONE, Ordering::Release);
        transport.set_stop_bound(NONE);
        transport.pending_reset.store(counter.min(MAX_TRIAL_COUNTER), Ordering::Release);
        // Last: an engine that sees the pause lifted also sees the reset.
        transport.paused.store(false, Ordering::Release);
    }

    /// Render silence and hold the clock until [`resume`](Self::resume).
    pub fn pause(&mut self) {
        self.shared.transport.paused.store(true, Ordering::Release);
    }

    pub fn resume(&mut self) {
        self.shared.transport.paused.store(false, Ordering::Release);
    }

    /// Tear the session down: every slot is cleared and the engine stops
    /// for good.
    pub fn end_session(&mut self) {
        self.reset_slots();
        self.shared.transport.session_ended.store(true, Ordering::Release);
    }
}

/// The render thread's handle.
pub struct ParamReader {
    shared: Arc<SharedState>,
}

impl ParamReader {
    pub fn channels(&self) -> u16 {
        self.shared.channels
    }

    pub fn transport(&self) -> &Transport {
        &self.shared.transport
    }

    /// The buffers every published handle was validated against.
    pub fn bank(&self) -> &Arc<BufferBank> {
        &self.shared.bank
    }

    pub(crate) fn read_tone(&self, index: usize) -> Option<Snapshot<ToneParams>> {
        let (version, words) = self.shared.tones[index].load()?;
        Some(Snapshot {
            version,
            params: unpack_tone(&words),
        })
    }

    pub(crate) fn read_buffer(&self, index: usize) -> Option<Snapshot<BufferParams>> {
        let (version, words) = self.shared.buffers[index].load()?;
        Some(Snapshot {
            version,
            params: unpack_buffer(&words),
        })
    }
}
