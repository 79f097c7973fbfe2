//! The render callback driver.

use alloc::sync::Arc;
use core::sync::atomic::Ordering;
use alloc::vec;
use alloc::vec::Vec;

use sa_ir::{AudioBuffer, BusLayout, ConfigError};

use crate::buffer_player::BufferPlayer;
use crate::fault::{fault_channel, FaultReason, FaultReceiver, FaultSender, SlotFault};
use crate::ramp::stop_gain;
use crate::scheduler::{Block, RenderCtx, ToneScheduler};
use crate::shared::{ParamReader, Transport, RAMP_LEAD};

/// Lifecycle of an engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EngineState {
    Unconfigured = 0,
    Configured = 1,
    Rendering = 2,
    Stopped = 3,
}

impl EngineState {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => EngineState::Configured,
            2 => EngineState::Rendering,
            3 => EngineState::Stopped,
            _ => EngineState::Unconfigured,
        }
    }
}

/// Engine construction parameters, already in samples.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EngineSettings {
    /// Largest block rendered in one pass; longer host buffers are split.
    pub max_block_frames: usize,
    /// Length of onset/offset fades, amplitude glides and the final
    /// fade-out. Zero gives hard edges.
    pub ramp_samples: u32,
    /// Capacity of the fault ring.
    pub fault_capacity: usize,
    /// Seed for the white-noise generators.
    pub noise_seed: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_block_frames: 1024,
            ramp_samples: 0,
            fault_capacity: 64,
            noise_seed: 0x5EED,
        }
    }
}

/// Renders the mix of every active tone and buffer slot.
///
/// Owned by the audio callback. All allocation happens in [`Engine::new`]
/// and [`Engine::configure`]; rendering never allocates, blocks or fails.
pub struct Engine {
    reader: ParamReader,
    tones: ToneScheduler,
    buffers: BufferPlayer,
    faults: FaultSender,
    settings: EngineSettings,
    state: EngineState,
    layout: Option<BusLayout>,
    sample_rate: u32,
    /// The render clock: index of the next sample to render.
    counter: u64,
    mix: AudioBuffer,
    fade: Vec<f32>,
    needs_refresh: bool,
    bad_output: bool,
    unconfigured_reported: bool,
}

impl Engine {
    /// Build an engine reading from `reader`. Buffers are played out of
    /// the bank the shared state was created over. Returns the
    /// controller's end of the fault ring.
    pub fn new(reader: ParamReader, settings: EngineSettings) -> (Self, FaultReceiver) {
        let settings = EngineSettings {
            max_block_frames: settings.max_block_frames.max(1),
            ..settings
        };
        let (faults, receiver) = fault_channel(settings.fault_capacity);
        let bank = Arc::clone(reader.bank());
        let engine = Self {
            reader,
            tones: ToneScheduler::new(settings.noise_seed),
            buffers: BufferPlayer::new(bank),
            faults,
            settings,
            state: EngineState::Unconfigured,
            layout: None,
            sample_rate: 0,
            counter: 0,
            mix: AudioBuffer::new(0, 0),
            fade: Vec::new(),
            needs_refresh: true,
            bad_output: false,
            unconfigured_reported: false,
        };
        (engine, receiver)
    }

    /// Fix the sample rate and host bus layout.
    ///
    /// The layout must have the channel count the parameters were authored
    /// for. Rejected once rendering has begun.
    pub fn configure(&mut self, sample_rate: u32, layout: BusLayout) -> Result<(), ConfigError> {
        if self.state == EngineState::Rendering {
            return Err(ConfigError::AlreadyRendering);
        }
        if sample_rate == 0 {
            return Err(ConfigError::InvalidSampleRate(sample_rate));
        }
        layout.validate()?;
        let expected = self.reader.channels();
        if layout.channels != expected {
            return Err(ConfigError::ChannelMismatch {
                expected,
                actual: layout.channels,
            });
        }

        let frames = self.settings.max_block_frames;
        self.mix = AudioBuffer::new(layout.channels, frames);
        self.fade = vec![1.0; frames];
        self.sample_rate = sample_rate;
        self.layout = Some(layout);
        self.tones.invalidate();
        self.buffers.invalidate();
        self.needs_refresh = true;
        self.state = EngineState::Configured;

        let transport = self.reader.transport();
        transport.publish_sample_rate(sample_rate);
        transport.publish_position(self.counter);
        transport.publish_state(self.state);
        Ok(())
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn bus_layout(&self) -> Option<BusLayout> {
        self.layout
    }

    pub fn sample_rate(&self) -> Option<u32> {
        self.layout.map(|_| self.sample_rate)
    }

    /// Index of the next sample to render.
    pub fn position(&self) -> u64 {
        self.counter
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn transport(&self) -> &Transport {
        self.reader.transport()
    }

    /// Render into an interleaved buffer of `frames * channels` samples.
    pub fn render_interleaved(&mut self, out: &mut [f32]) {
        #[cfg(feature = "alloc_check")]
        assert_no_alloc::assert_no_alloc(|| self.render_interleaved_inner(out));
        #[cfg(not(feature = "alloc_check"))]
        self.render_interleaved_inner(out);
    }

    /// Render into one slice per channel, all of the same length.
    pub fn render_planar(&mut self, out: &mut [&mut [f32]]) {
        #[cfg(feature = "alloc_check")]
        assert_no_alloc::assert_no_alloc(|| self.render_planar_inner(out));
        #[cfg(not(feature = "alloc_check"))]
        self.render_planar_inner(out);
    }

    fn render_interleaved_inner(&mut self, out: &mut [f32]) {
        out.fill(0.0);
        let Some(channels) = self.output_channels() else {
            return;
        };
        if out.len() % channels != 0 {
            self.report_bad_output();
            return;
        }
        self.bad_output = false;

        let frames = out.len() / channels;
        if self.begin_cycle() {
            let mut done = 0;
            while done < frames && self.state != EngineState::Stopped {
                let n = (frames - done).min(self.settings.max_block_frames);
                self.render_block(n);
                self.mix
                    .write_interleaved(n, &mut out[done * channels..(done + n) * channels]);
                done += n;
            }
        }
        self.end_cycle();
    }

    fn render_planar_inner(&mut self, out: &mut [&mut [f32]]) {
        for plane in out.iter_mut() {
            plane.fill(0.0);
        }
        let Some(channels) = self.output_channels() else {
            return;
        };
        let frames = out.first().map_or(0, |p| p.len());
        if out.len() != channels || out.iter().any(|p| p.len() != frames) {
            self.report_bad_output();
            return;
        }
        self.bad_output = false;

        if self.begin_cycle() {
            let mut done = 0;
            while done < frames && self.state != EngineState::Stopped {
                let n = (frames - done).min(self.settings.max_block_frames);
                self.render_block(n);
                self.mix.write_planar(n, done, out);
                done += n;
            }
        }
        self.end_cycle();
    }

    fn output_channels(&mut self) -> Option<usize> {
        match self.layout {
            Some(layout) => Some(layout.channels as usize),
            None => {
                if !self.unconfigured_reported {
                    self.unconfigured_reported = true;
                    self.faults.report(SlotFault::cycle(FaultReason::NotConfigured));
                }
                None
            }
        }
    }

    fn report_bad_output(&mut self) {
        if !self.bad_output {
            self.bad_output = true;
            self.faults.report(SlotFault::cycle(FaultReason::BadOutputLength));
        }
    }

    fn ctx(&self) -> RenderCtx {
        RenderCtx {
            sample_rate: self.sample_rate,
            channels: self.mix.channels(),
            ramp: self.settings.ramp_samples,
        }
    }

    /// Apply controller requests. Returns whether this cycle produces sound.
    fn begin_cycle(&mut self) -> bool {
        let transport = self.reader.transport();
        if transport.session_ended() {
            self.state = EngineState::Stopped;
            return false;
        }
        // A paused controller may be rewriting a whole trial; nothing is
        // applied until the pause is lifted.
        if transport.is_paused() {
            return false;
        }
        if let Some(counter) = transport.pending_reset() {
            self.counter = counter;
            self.tones.rearm();
            self.buffers.rearm();
            self.state = EngineState::Configured;
            transport.publish_state(self.state);
            transport.ack_reset(counter);
        }
        if self.state == EngineState::Stopped {
            return false;
        }
        if let Some(lead) = transport.take_stop_lead() {
            let lead = if lead == RAMP_LEAD {
                self.settings.ramp_samples as u64
            } else {
                lead
            };
            transport.set_stop_bound(self.counter.saturating_add(lead));
        }

        self.refresh_slots();
        self.state = EngineState::Rendering;
        true
    }

    fn refresh_slots(&mut self) {
        let ctx = self.ctx();
        let transport = self.reader.transport();

        let tones_dirty = transport.changing_tones.swap(false, Ordering::AcqRel);
        if (self.needs_refresh || tones_dirty) && !self.tones.refresh(&self.reader, ctx, &mut self.faults) {
            transport.changing_tones.store(true, Ordering::Release);
        }
        let buffers_dirty = transport.changing_buffers.swap(false, Ordering::AcqRel);
        if (self.needs_refresh || buffers_dirty) && !self.buffers.refresh(&self.reader, ctx, &mut self.faults) {
            transport.changing_buffers.store(true, Ordering::Release);
        }
        self.needs_refresh = false;
    }

    fn render_block(&mut self, frames: usize) {
        self.mix.silence_frames(frames);
        let stop = self.reader.transport().stop_bound();
        let limit = stop.unwrap_or(u64::MAX);
        if self.counter >= limit {
            self.state = EngineState::Stopped;
            return;
        }

        let block = Block {
            start: self.counter,
            frames,
            limit,
        };
        let ctx = self.ctx();
        self.tones.render(block, ctx, &mut self.mix, &mut self.faults);
        self.buffers.render(block, ctx, &mut self.mix, &mut self.faults);
        if let Some(stop) = stop {
            self.fade_before(block, stop);
        }

        self.counter = self.counter.saturating_add(frames as u64);
        if self.counter >= limit {
            self.state = EngineState::Stopped;
        }
    }

    /// Fade the whole mix out over the final ramp before `stop`.
    fn fade_before(&mut self, block: Block, stop: u64) {
        let ramp = self.settings.ramp_samples;
        if ramp == 0 || block.end() <= stop.saturating_sub(ramp as u64) {
            return;
        }
        let fade = &mut self.fade[..block.frames];
        for (i, gain) in fade.iter_mut().enumerate() {
            *gain = stop_gain(stop, block.start + i as u64, ramp);
        }
        self.mix.apply_frame_gains(fade);
    }

    fn end_cycle(&mut self) {
        let transport = self.reader.transport();
        transport.publish_position(self.counter);
        transport.publish_state(self.state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::{shared_state, ParamWriter};
    use core::f32::consts::PI;
    use sa_ir::{BufferBank, BufferParams, ChannelRoute, PcmBuffer, SampleWindow, ToneParams};

    fn setup_with(channels: u16, bank: BufferBank, settings: EngineSettings) -> (ParamWriter, Engine, FaultReceiver) {
        let (writer, reader) = shared_state(channels, Arc::new(bank)).unwrap();
        let (mut engine, faults) = Engine::new(reader, settings);
        engine.configure(48000, BusLayout::new(channels)).unwrap();
        (writer, engine, faults)
    }

    fn setup(channels: u16) -> (ParamWriter, Engine, FaultReceiver) {
        setup_with(channels, BufferBank::new(), EngineSettings::default())
    }

    fn render(engine: &mut Engine, frames: usize) -> Vec<f32> {
        let channels = engine.bus_layout().unwrap().channels as usize;
        let mut out = vec![0.0; frames * channels];
        engine.render_interleaved(&mut out);
        out
    }

    fn channel(out: &[f32], channels: usize, ch: usize) -> Vec<f32> {
        out.iter().skip(ch).step_by(channels).copied().collect()
    }

    fn tone(start: u64, end: u64, frequency: f32, amplitude: f32) -> ToneParams {
        ToneParams::sine(SampleWindow::new(start, end), frequency, amplitude, ChannelRoute::Channel(0))
    }

    #[test]
    fn configure_validates() {
        let (_w, reader) = shared_state(2, Arc::new(BufferBank::new())).unwrap();
        let (mut engine, _f) = Engine::new(reader, EngineSettings::default());
        assert_eq!(engine.state(), EngineState::Unconfigured);
        assert_eq!(
            engine.configure(0, BusLayout::stereo()),
            Err(ConfigError::InvalidSampleRate(0))
        );
        assert_eq!(
            engine.configure(48000, BusLayout::new(0)),
            Err(ConfigError::InvalidBusLayout(0))
        );
        assert_eq!(
            engine.configure(48000, BusLayout::mono()),
            Err(ConfigError::ChannelMismatch { expected: 2, actual: 1 })
        );
        engine.configure(44100, BusLayout::stereo()).unwrap();
        assert_eq!(engine.state(), EngineState::Configured);
        assert_eq!(engine.sample_rate(), Some(44100));
        assert_eq!(engine.transport().sample_rate(), Some(44100));
    }

    #[test]
    fn configure_rejected_while_rendering() {
        let (_w, mut engine, _f) = setup(2);
        render(&mut engine, 16);
        assert_eq!(engine.state(), EngineState::Rendering);
        assert_eq!(
            engine.configure(48000, BusLayout::stereo()),
            Err(ConfigError::AlreadyRendering)
        );
    }

    #[test]
    fn unconfigured_render_is_silent() {
        let (_w, reader) = shared_state(2, Arc::new(BufferBank::new())).unwrap();
        let (mut engine, mut faults) = Engine::new(reader, EngineSettings::default());
        let mut out = [1.0; 8];
        engine.render_interleaved(&mut out);
        engine.render_interleaved(&mut out);
        assert_eq!(out, [0.0; 8]);
        assert_eq!(engine.position(), 0);
        assert_eq!(faults.try_recv(), Some(SlotFault::cycle(FaultReason::NotConfigured)));
        assert_eq!(faults.try_recv(), None);
    }

    #[test]
    fn one_second_of_440_hz() {
        let (mut w, mut engine, _f) = setup(2);
        w.set_tone(0, tone(0, 48000, 440.0, 0.5)).unwrap();
        let mut out = Vec::new();
        for _ in 0..100 {
            out.extend(render(&mut engine, 500));
        }
        assert_eq!(engine.position(), 50000);
        let left = channel(&out, 2, 0);
        let right = channel(&out, 2, 1);

        let peak = left[..48000].iter().fold(0.0f32, |m, s| m.max(s.abs()));
        assert!((peak - 0.5).abs() < 1e-3, "peak {peak}");
        let rising = left[..48000].windows(2).filter(|w| w[0] < 0.0 && w[1] >= 0.0).count();
        assert!((439..=441).contains(&rising), "{rising} cycles");
        assert!(left[48000..].iter().all(|&s| s == 0.0));
        assert!(right.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn window_is_exact() {
        let (mut w, mut engine, _f) = setup(1);
        w.set_tone(0, tone(1000, 2000, 441.0, 1.0).with_phase(0.3)).unwrap();
        let out = render(&mut engine, 3000);
        assert!(out[..1000].iter().all(|&s| s == 0.0));
        assert!(out[1000..2000].iter().all(|&s| s != 0.0));
        assert!(out[2000..].iter().all(|&s| s == 0.0));
        assert!((out[1000] - 0.3f32.sin()).abs() < 1e-6);
    }

    #[test]
    fn opposite_phases_cancel() {
        let (mut w, mut engine, _f) = setup(1);
        w.set_tone(0, tone(0, 4800, 300.0, 0.5)).unwrap();
        w.set_tone(1, tone(0, 4800, 300.0, 0.5).with_phase(PI)).unwrap();
        let mixed = render(&mut engine, 4800);

        let (mut w1, mut single, _f1) = setup(1);
        w1.set_tone(0, tone(0, 4800, 300.0, 0.5)).unwrap();
        let alone = render(&mut single, 4800);

        let energy = |s: &[f32]| s.iter().map(|x| x * x).sum::<f32>();
        assert!(energy(&mixed) < energy(&alone) * 1e-6);
        assert!(mixed.iter().all(|s| s.abs() < 1e-4));
    }

    #[test]
    fn silent_tones_leave_buffers_untouched() {
        let mut bank = BufferBank::new();
        let key = bank.insert(PcmBuffer::mono((0..64).map(|i| i as f32 / 64.0).collect()).unwrap());
        let cue = BufferParams::new(key, SampleWindow::new(0, 64)).with_route(ChannelRoute::Channel(0));

        let (mut w, mut engine, _f) = setup_with(1, bank.clone(), EngineSettings::default());
        w.set_buffer(0, cue).unwrap();
        let reference = render(&mut engine, 64);

        let (mut w, mut engine, _f) = setup_with(1, bank, EngineSettings::default());
        w.set_buffer(0, cue).unwrap();
        for i in 0..10 {
            w.set_tone(i, tone(0, 64, 100.0 + i as f32, 0.0)).unwrap();
        }
        assert_eq!(render(&mut engine, 64), reference);
    }

    #[test]
    fn retune_has_no_phase_jump() {
        let (mut w, mut engine, _f) = setup(1);
        let p = tone(0, 48000, 1000.0, 1.0);
        w.set_tone(0, p).unwrap();
        let mut out = render(&mut engine, 1000);
        w.set_tone(0, ToneParams { frequency: 1500.0, ..p }).unwrap();
        out.extend(render(&mut engine, 1000));

        let max_step = core::f32::consts::TAU * 1500.0 / 48000.0;
        for pair in out[990..1010].windows(2) {
            assert!((pair[1] - pair[0]).abs() <= max_step * 1.01, "{pair:?}");
        }
        // A restart would have produced sin(0) = 0 at the boundary.
        assert!(out[1000].abs() > 1e-3);
    }

    #[test]
    fn stop_bound_silences_everything() {
        let (mut w, mut engine, _f) = setup(1);
        w.set_tone(0, tone(0, 10_000, 440.0, 1.0).with_phase(1.0)).unwrap();
        w.request_stop_at(100);
        let out = render(&mut engine, 256);
        assert!(out[..100].iter().all(|&s| s != 0.0));
        assert!(out[100..].iter().all(|&s| s == 0.0));
        assert_eq!(engine.state(), EngineState::Stopped);
        assert_eq!(engine.transport().state(), EngineState::Stopped);

        let position = engine.position();
        assert!(render(&mut engine, 256).iter().all(|&s| s == 0.0));
        assert_eq!(engine.position(), position);
    }

    #[test]
    fn graceful_stop_fades_out() {
        let settings = EngineSettings {
            ramp_samples: 4,
            ..EngineSettings::default()
        };
        let (mut w, mut engine, _f) = setup_with(1, BufferBank::new(), settings);
        let hiss = ToneParams::noise(SampleWindow::new(0, 1000), 1.0, ChannelRoute::Channel(0));
        w.set_tone(0, hiss).unwrap();
        render(&mut engine, 100);
        w.request_stop();
        let out = render(&mut engine, 8);
        assert_eq!(engine.transport().stop_bound(), Some(104));
        assert!(out[4..].iter().all(|&s| s == 0.0));
        assert_eq!(engine.state(), EngineState::Stopped);
    }

    #[test]
    fn pause_holds_the_clock() {
        let (mut w, mut engine, _f) = setup(1);
        w.set_tone(0, tone(0, 10_000, 440.0, 1.0).with_phase(1.0)).unwrap();
        render(&mut engine, 64);
        w.pause();
        assert!(render(&mut engine, 64).iter().all(|&s| s == 0.0));
        assert_eq!(engine.position(), 64);
        w.resume();
        let out = render(&mut engine, 64);
        assert!(out.iter().any(|&s| s != 0.0));
        assert_eq!(engine.transport().position(), 128);
    }

    #[test]
    fn begin_trial_rearms_stopped_engine() {
        let (mut w, mut engine, _f) = setup(1);
        w.set_tone(0, tone(0, 10_000, 440.0, 1.0).with_phase(1.0)).unwrap();
        w.request_stop_at(32);
        render(&mut engine, 64);
        assert_eq!(engine.state(), EngineState::Stopped);

        w.begin_trial(0);
        let out = render(&mut engine, 64);
        assert_eq!(engine.state(), EngineState::Rendering);
        assert!(out.iter().all(|&s| s != 0.0));
        assert!((out[0] - 1.0f32.sin()).abs() < 1e-6);
        assert_eq!(engine.position(), 64);
    }

    #[test]
    fn trial_written_while_paused_starts_at_its_counter() {
        let (mut w, mut engine, _f) = setup(1);
        render(&mut engine, 300);
        w.pause();
        w.reset_slots();
        w.set_tone(0, tone(0, 1000, 440.0, 1.0).with_phase(1.0)).unwrap();
        assert!(render(&mut engine, 64).iter().all(|&s| s == 0.0));
        w.begin_trial(0);
        let out = render(&mut engine, 64);
        assert!((out[0] - 1.0f32.sin()).abs() < 1e-6);
    }

    #[test]
    fn ended_session_stays_stopped() {
        let (mut w, mut engine, _f) = setup(1);
        w.set_tone(0, tone(0, 10_000, 440.0, 1.0)).unwrap();
        w.end_session();
        w.begin_trial(0);
        assert!(render(&mut engine, 64).iter().all(|&s| s == 0.0));
        assert_eq!(engine.state(), EngineState::Stopped);
    }

    #[test]
    fn block_size_does_not_change_output() {
        let small = EngineSettings {
            max_block_frames: 37,
            ..EngineSettings::default()
        };
        let (mut w1, mut a, _f1) = setup_with(2, BufferBank::new(), small);
        let (mut w2, mut b, _f2) = setup(2);
        for w in [&mut w1, &mut w2] {
            w.set_tone(0, tone(10, 900, 523.25, 0.3)).unwrap();
            w.set_tone(1, ToneParams::sine(SampleWindow::new(0, 500), 80.0, 0.2, ChannelRoute::CENTER))
                .unwrap();
        }
        assert_eq!(render(&mut a, 1000), render(&mut b, 1000));
    }

    #[test]
    fn planar_matches_interleaved() {
        let (mut w1, mut a, _f1) = setup(2);
        let (mut w2, mut b, _f2) = setup(2);
        for w in [&mut w1, &mut w2] {
            w.set_tone(0, ToneParams::sine(SampleWindow::new(0, 256), 700.0, 0.4, ChannelRoute::Balance(0.25)))
                .unwrap();
        }
        let interleaved = render(&mut a, 256);
        let mut l = vec![0.0; 256];
        let mut r = vec![0.0; 256];
        {
            let mut planes: [&mut [f32]; 2] = [&mut l, &mut r];
            b.render_planar(&mut planes);
        }
        assert_eq!(l, channel(&interleaved, 2, 0));
        assert_eq!(r, channel(&interleaved, 2, 1));
    }

    #[test]
    fn bad_output_length_is_absorbed() {
        let (mut w, mut engine, mut faults) = setup(2);
        w.set_tone(0, tone(0, 1000, 440.0, 1.0)).unwrap();
        let mut out = [1.0; 5];
        engine.render_interleaved(&mut out);
        assert_eq!(out, [0.0; 5]);
        assert_eq!(engine.position(), 0);
        assert_eq!(faults.try_recv(), Some(SlotFault::cycle(FaultReason::BadOutputLength)));

        let mut short = [0.0; 4];
        let mut long = [0.0; 8];
        let mut planes: [&mut [f32]; 2] = [&mut short, &mut long];
        engine.render_planar(&mut planes);
        assert_eq!(engine.position(), 0);
    }

    #[test]
    fn stale_buffer_is_silenced_and_reported() {
        let mut other = BufferBank::new();
        let foreign = other.insert(PcmBuffer::mono(vec![1.0; 64]).unwrap());
        let (mut w, mut engine, mut faults) = setup(1);
        w.set_buffer_unchecked(0, BufferParams::new(foreign, SampleWindow::new(0, 64)));
        w.set_tone(0, tone(0, 64, 1000.0, 1.0).with_phase(1.0)).unwrap();

        let mut first = [0.0; 32];
        let mut second = [0.0; 32];
        engine.render_interleaved(&mut first);
        engine.render_interleaved(&mut second);
        // The tone keeps playing; only the bad buffer slot is dropped.
        assert!((first[0] - 1.0f32.sin()).abs() < 1e-6);
        assert!(second.iter().any(|&s| s != 0.0));
        let reported: Vec<SlotFault> = faults.drain().collect();
        assert_eq!(
            reported,
            [SlotFault::slot(sa_ir::SlotKind::Buffer, 0, FaultReason::StaleBuffer)]
        );
    }

    #[test]
    fn rearm_is_visible_before_the_next_cycle() {
        let (mut w, mut engine, _f) = setup(1);
        w.set_tone(0, tone(0, 10_000, 440.0, 1.0)).unwrap();
        w.request_stop_at(64);
        render(&mut engine, 128);
        assert_eq!(engine.transport().state(), EngineState::Stopped);

        w.begin_trial(0);
        w.request_stop_at(480);
        assert_eq!(w.transport().state(), EngineState::Configured);
        render(&mut engine, 64);
        assert_eq!(w.transport().state(), EngineState::Rendering);
        render(&mut engine, 512);
        assert_eq!(w.transport().state(), EngineState::Stopped);
    }

    #[test]
    fn clock_near_the_top_does_not_wrap() {
        let (mut w, mut engine, _f) = setup(1);
        w.set_tone(0, tone(0, u64::MAX, 440.0, 1.0)).unwrap();
        w.begin_trial(u64::MAX - 10);
        assert_eq!(w.transport().pending_reset(), Some(crate::MAX_TRIAL_COUNTER));
        render(&mut engine, 64);
        assert_eq!(engine.position(), crate::MAX_TRIAL_COUNTER + 64);
    }

    #[test]
    fn saturated_clock_stops_instead_of_wrapping() {
        let (_w, mut engine, _f) = setup(1);
        engine.counter = u64::MAX - 10;
        let out = render(&mut engine, 64);
        assert!(out.iter().all(|&s| s == 0.0));
        assert_eq!(engine.position(), u64::MAX);
        assert_eq!(engine.state(), EngineState::Stopped);
    }
}
