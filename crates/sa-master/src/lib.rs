//! Headless experiment controller for the stimuli audio engine.
//!
//! Owns the single parameter writer, the asset library and the output
//! device, and gives the CLI and tests one API for live playback and
//! offline rendering.

mod assets;
mod config;
mod error;
mod wav;

use std::path::Path;
use std::time::{Duration, Instant};

use sa_audio::{AudioOutput, CpalOutput};
use sa_engine::{shared_state, Engine, FaultReceiver, ParamWriter};
use sa_ir::{BusLayout, MAX_BUFFERS, MAX_TONES};

pub use assets::AssetLibrary;
pub use config::{AssetSpec, BufferSpec, SessionConfig, ToneSpec, TrialPlan};
pub use error::MasterError;
pub use wav::{read_wav, wav_bytes, write_wav};

// Re-export common types so callers don't need sa-ir/sa-engine directly.
pub use sa_engine::{EngineState, FaultReason, SlotFault};
pub use sa_ir::{
    secs_to_samples, AudioSource, BufferKey, BufferParams, ChannelRoute, ConfigError, PcmBuffer,
    SampleWindow, SlotKind, ToneParams, Waveform,
};

/// Frames per render call when no device is driving the engine.
const OFFLINE_BLOCK_FRAMES: usize = 512;

enum Driver {
    Offline(Box<Engine>),
    Device(CpalOutput),
}

struct Session {
    writer: ParamWriter,
    faults: FaultReceiver,
    sample_rate: u32,
    driver: Driver,
    dropped_seen: u64,
}

/// Headless controller: one audio session at a time.
pub struct Controller {
    config: SessionConfig,
    assets: AssetLibrary,
    session: Option<Session>,
}

impl Controller {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            assets: AssetLibrary::new(),
            session: None,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn assets(&self) -> &AssetLibrary {
        &self.assets
    }

    // --- Assets ---

    pub fn load_asset(&mut self, name: &str, buffer: PcmBuffer) -> Result<BufferKey, MasterError> {
        let key = self.assets.insert_named(name, buffer)?;
        tracing::debug!(name, "asset loaded");
        Ok(key)
    }

    /// Load a WAV file as a named asset. No resampling is done.
    pub fn load_wav_asset(&mut self, name: &str, path: impl AsRef<Path>) -> Result<BufferKey, MasterError> {
        let path = path.as_ref();
        let (buffer, rate) = read_wav(path)?;
        if let Some(session_rate) = self.config.sample_rate_hz {
            if session_rate != rate {
                tracing::warn!(name, file_rate = rate, session_rate, "asset sample rate differs from session");
            }
        }
        tracing::info!(name, path = %path.display(), frames = buffer.frames(), "loading WAV asset");
        self.load_asset(name, buffer)
    }

    /// Load every asset a plan names, resolving paths against `base_dir`.
    pub fn load_plan_assets(&mut self, plan: &TrialPlan, base_dir: impl AsRef<Path>) -> Result<(), MasterError> {
        for asset in &plan.assets {
            self.load_wav_asset(&asset.name, base_dir.as_ref().join(&asset.path))?;
        }
        Ok(())
    }

    // --- Session setup ---

    fn open_session(&mut self, sample_rate: u32) -> Result<(ParamWriter, Engine, FaultReceiver), MasterError> {
        if self.session.is_some() {
            return Err(MasterError::AlreadyConfigured);
        }
        let bank = self.assets.freeze();
        let (writer, reader) = shared_state(self.config.channels, bank)?;
        let (engine, faults) = Engine::new(reader, self.config.engine_settings(sample_rate));
        Ok((writer, engine, faults))
    }

    /// Start a session rendered on demand by [`render_offline`](Self::render_offline).
    pub fn configure_offline(&mut self, sample_rate: u32) -> Result<(), MasterError> {
        let (writer, mut engine, faults) = self.open_session(sample_rate)?;
        engine.configure(sample_rate, BusLayout::new(self.config.channels))?;
        tracing::info!(sample_rate, channels = self.config.channels, "offline session configured");
        self.session = Some(Session {
            writer,
            faults,
            sample_rate,
            driver: Driver::Offline(Box::new(engine)),
            dropped_seen: 0,
        });
        Ok(())
    }

    /// Start a session on the default output device.
    pub fn start_output(&mut self) -> Result<(), MasterError> {
        if self.session.is_some() {
            return Err(MasterError::AlreadyConfigured);
        }
        let mut output = CpalOutput::new(self.config.channels, self.config.sample_rate_hz)?;
        let sample_rate = output.host_format().sample_rate;
        let (writer, engine, faults) = self.open_session(sample_rate)?;
        output.start(engine)?;
        tracing::info!(sample_rate, channels = self.config.channels, "output session started");
        self.session = Some(Session {
            writer,
            faults,
            sample_rate,
            driver: Driver::Device(output),
            dropped_seen: 0,
        });
        Ok(())
    }

    pub fn sample_rate(&self) -> Option<u32> {
        self.session.as_ref().map(|s| s.sample_rate)
    }

    fn session(&self) -> Result<&Session, MasterError> {
        self.session.as_ref().ok_or(MasterError::NotConfigured)
    }

    fn writer(&mut self) -> Result<&mut ParamWriter, MasterError> {
        self.session
            .as_mut()
            .map(|s| &mut s.writer)
            .ok_or(MasterError::NotConfigured)
    }

    // --- Slots ---

    pub fn set_tone(&mut self, index: usize, params: ToneParams) -> Result<(), MasterError> {
        self.writer()?.set_tone(index, params)?;
        tracing::debug!(index, start = params.window.start, end = params.window.end, "tone set");
        Ok(())
    }

    /// Set a tone from a cue in seconds.
    pub fn set_tone_secs(&mut self, index: usize, spec: &ToneSpec) -> Result<(), MasterError> {
        let rate = self.session()?.sample_rate;
        self.set_tone(index, spec.to_params(rate))
    }

    pub fn clear_tone(&mut self, index: usize) -> Result<(), MasterError> {
        self.writer()?.clear_tone(index)?;
        Ok(())
    }

    pub fn set_buffer(&mut self, index: usize, params: BufferParams) -> Result<(), MasterError> {
        self.writer()?.set_buffer(index, params)?;
        tracing::debug!(index, start = params.window.start, end = params.window.end, "buffer set");
        Ok(())
    }

    /// Set a buffer slot from a cue in seconds.
    pub fn set_buffer_secs(&mut self, index: usize, spec: &BufferSpec) -> Result<(), MasterError> {
        let params = self.buffer_params(spec)?;
        self.set_buffer(index, params)
    }

    pub fn clear_buffer(&mut self, index: usize) -> Result<(), MasterError> {
        self.writer()?.clear_buffer(index)?;
        Ok(())
    }

    fn buffer_params(&self, spec: &BufferSpec) -> Result<BufferParams, MasterError> {
        let rate = self.session()?.sample_rate;
        let key = self.assets.key_for(&spec.asset)?;
        let window = match spec.duration_secs {
            Some(duration) => SampleWindow::from_secs(spec.start_secs, duration, rate),
            None => {
                let start = secs_to_samples(spec.start_secs, rate);
                let frames = self.assets.get(key).map_or(0, |b| b.frames()) as u64;
                SampleWindow::new(start, start + frames)
            }
        };
        Ok(BufferParams {
            key,
            window,
            gain: spec.gain,
            route: spec.channel,
        })
    }

    // --- Trials ---

    /// Replace every slot with the plan's cues and restart the clock at
    /// zero. Output stops at the end of the trial.
    ///
    /// All cues are validated before anything is published, so a rejected
    /// plan leaves the running trial untouched. Returns the trial's end
    /// sample.
    pub fn play_trial(&mut self, plan: &TrialPlan) -> Result<u64, MasterError> {
        let session = self.session()?;
        let rate = session.sample_rate;
        let channels = session.writer.channels();

        let tone_slots = assign_slots(plan.tones.iter().map(|t| t.slot), MAX_TONES, SlotKind::Tone)?;
        let buffer_slots = assign_slots(plan.buffers.iter().map(|b| b.slot), MAX_BUFFERS, SlotKind::Buffer)?;

        let mut tones = Vec::with_capacity(plan.tones.len());
        for (spec, slot) in plan.tones.iter().zip(tone_slots) {
            let params = spec.to_params(rate);
            params.validate(channels)?;
            tones.push((slot, params));
        }
        let mut buffers = Vec::with_capacity(plan.buffers.len());
        for (spec, slot) in plan.buffers.iter().zip(buffer_slots) {
            let params = self.buffer_params(spec)?;
            params.validate(channels, session.writer.bank())?;
            buffers.push((slot, params));
        }
        let end = secs_to_samples(plan.length_secs(), rate);

        let writer = self.writer()?;
        writer.pause();
        writer.reset_slots();
        for &(slot, params) in &tones {
            writer.set_tone(slot, params)?;
        }
        for &(slot, params) in &buffers {
            writer.set_buffer(slot, params)?;
        }
        writer.begin_trial(0);
        writer.request_stop_at(end);

        tracing::info!(tones = tones.len(), buffers = buffers.len(), end, "trial started");
        Ok(end)
    }

    /// Fade out over one ramp and stop.
    pub fn stop(&mut self) -> Result<(), MasterError> {
        self.writer()?.request_stop();
        tracing::info!("stop requested");
        Ok(())
    }

    pub fn pause(&mut self) -> Result<(), MasterError> {
        self.writer()?.pause();
        tracing::info!("paused");
        Ok(())
    }

    pub fn resume(&mut self) -> Result<(), MasterError> {
        self.writer()?.resume();
        tracing::info!("resumed");
        Ok(())
    }

    /// Tear the session down. Assets stay frozen.
    pub fn end_session(&mut self) -> Result<(), MasterError> {
        self.writer()?.end_session();
        self.drain_faults();
        if let Some(mut session) = self.session.take() {
            if let Driver::Device(output) = &mut session.driver {
                output.stop()?;
            }
        }
        tracing::info!("session ended");
        Ok(())
    }

    // --- Observation ---

    /// Sample index the engine will render next.
    pub fn position(&self) -> Option<u64> {
        let session = self.session.as_ref()?;
        Some(session.writer.transport().position())
    }

    pub fn position_secs(&self) -> Option<f64> {
        let session = self.session.as_ref()?;
        Some(session.writer.transport().position() as f64 / session.sample_rate as f64)
    }

    pub fn state(&self) -> Option<EngineState> {
        let session = self.session.as_ref()?;
        Some(session.writer.transport().state())
    }

    /// Whether the engine has reached its stop bound or the session ended.
    pub fn is_finished(&self) -> bool {
        self.state().map_or(true, |s| s == EngineState::Stopped)
    }

    /// Buffer slots currently configured.
    pub fn number_of_audios(&self) -> u32 {
        self.session
            .as_ref()
            .map_or(0, |s| s.writer.transport().number_of_audios())
    }

    /// Poll until the engine stops or `timeout` elapses, logging faults as
    /// they arrive. Returns whether the engine finished.
    pub fn wait_until_finished(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while !self.is_finished() {
            self.drain_faults();
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        self.drain_faults();
        true
    }

    /// Collect the faults the render thread reported since the last call.
    pub fn drain_faults(&mut self) -> Vec<SlotFault> {
        let Some(session) = self.session.as_mut() else {
            return Vec::new();
        };
        let faults: Vec<SlotFault> = session.faults.drain().collect();
        for fault in &faults {
            tracing::warn!(%fault, "render fault");
        }
        let dropped = session.faults.dropped();
        if dropped > session.dropped_seen {
            tracing::warn!(lost = dropped - session.dropped_seen, "fault ring overflowed");
            session.dropped_seen = dropped;
        }
        faults
    }

    // --- Offline rendering ---

    /// Render `frames` frames of interleaved output.
    pub fn render_offline(&mut self, frames: usize) -> Result<Vec<f32>, MasterError> {
        let session = self.session.as_mut().ok_or(MasterError::NotConfigured)?;
        let Driver::Offline(engine) = &mut session.driver else {
            return Err(MasterError::NotOffline);
        };
        let channels = self.config.channels as usize;
        let mut out = vec![0.0f32; frames * channels];
        for chunk in out.chunks_mut(OFFLINE_BLOCK_FRAMES * channels) {
            engine.render_interleaved(chunk);
        }
        Ok(out)
    }

    /// Render `frames` frames and write them as a 16-bit WAV file.
    pub fn render_to_wav(&mut self, path: impl AsRef<Path>, frames: usize) -> Result<(), MasterError> {
        let samples = self.render_offline(frames)?;
        let rate = self.session()?.sample_rate;
        write_wav(path.as_ref(), &samples, self.config.channels, rate)?;
        tracing::info!(path = %path.as_ref().display(), frames, "wrote WAV");
        Ok(())
    }
}

impl Default for Controller {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

/// Place cues in slots: explicit slots first, the rest in the lowest
/// free ones.
fn assign_slots(
    requested: impl Iterator<Item = Option<usize>> + Clone,
    capacity: usize,
    kind: SlotKind,
) -> Result<Vec<usize>, MasterError> {
    let mut taken = vec![false; capacity];
    for index in requested.clone().flatten() {
        match taken.get_mut(index) {
            Some(t) => *t = true,
            None => return Err(ConfigError::SlotOutOfRange { kind, index, capacity }.into()),
        }
    }
    let mut free = (0..capacity).filter(|&i| !taken[i]).collect::<Vec<_>>().into_iter();
    requested
        .map(|slot| match slot {
            Some(slot) => Ok(slot),
            None => free.next().ok_or(MasterError::TooManyCues { kind, capacity }),
        })
        .collect()
}
