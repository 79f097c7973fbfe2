//! CPAL-based audio output backend.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, SampleRate, SizedSample, Stream, StreamConfig};
use sa_engine::{to_i16, to_u16, Engine};
use sa_ir::BusLayout;

use crate::traits::{AudioError, AudioOutput, HostFormat};

/// Frames converted per pass for integer device formats.
const CONVERT_FRAMES: usize = 1024;

/// CPAL-based audio output.
pub struct CpalOutput {
    device: Device,
    config: StreamConfig,
    format: SampleFormat,
    stream: Option<Stream>,
}

impl CpalOutput {
    /// Open the default output device with `channels` channels, at
    /// `sample_rate` if given, otherwise at the device's default rate.
    pub fn new(channels: u16, sample_rate: Option<u32>) -> Result<Self, AudioError> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or(AudioError::NoDevice)?;

        let default_rate = device
            .default_output_config()
            .map_err(|e| AudioError::DeviceQuery(e.to_string()))?
            .sample_rate()
            .0;
        let rate = sample_rate.unwrap_or(default_rate);

        let supported = device
            .supported_output_configs()
            .map_err(|e| AudioError::DeviceQuery(e.to_string()))?;
        let rank = |format: SampleFormat| match format {
            SampleFormat::F32 => Some(0),
            SampleFormat::I16 => Some(1),
            SampleFormat::U16 => Some(2),
            _ => None,
        };
        let chosen = supported
            .filter(|range| range.channels() == channels)
            .filter(|range| range.min_sample_rate().0 <= rate && rate <= range.max_sample_rate().0)
            .filter_map(|range| rank(range.sample_format()).map(|r| (r, range)))
            .min_by_key(|(r, _)| *r)
            .map(|(_, range)| range.with_sample_rate(SampleRate(rate)))
            .ok_or(AudioError::UnsupportedFormat {
                channels,
                sample_rate: Some(rate),
            })?;

        let format = chosen.sample_format();
        let config: StreamConfig = chosen.into();
        tracing::info!(
            device = %device.name().unwrap_or_else(|_| "unknown".into()),
            sample_rate = config.sample_rate.0,
            channels = config.channels,
            ?format,
            "opened output device"
        );

        Ok(Self {
            device,
            config,
            format,
            stream: None,
        })
    }

    fn build_f32(&self, mut engine: Engine) -> Result<Stream, AudioError> {
        self.device
            .build_output_stream(
                &self.config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    engine.render_interleaved(data);
                },
                |err| tracing::error!(%err, "audio stream error"),
                None,
            )
            .map_err(|e| AudioError::StreamBuild(e.to_string()))
    }

    /// Render into a preallocated f32 scratch and convert, saturating.
    fn build_converting<T>(&self, mut engine: Engine, convert: fn(f32) -> T) -> Result<Stream, AudioError>
    where
        T: SizedSample + Send + 'static,
    {
        let mut scratch = vec![0.0f32; CONVERT_FRAMES * self.config.channels as usize];
        self.device
            .build_output_stream(
                &self.config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    for chunk in data.chunks_mut(scratch.len()) {
                        let rendered = &mut scratch[..chunk.len()];
                        engine.render_interleaved(rendered);
                        for (out, sample) in chunk.iter_mut().zip(rendered.iter()) {
                            *out = convert(*sample);
                        }
                    }
                },
                |err| tracing::error!(%err, "audio stream error"),
                None,
            )
            .map_err(|e| AudioError::StreamBuild(e.to_string()))
    }
}

impl AudioOutput for CpalOutput {
    fn host_format(&self) -> HostFormat {
        HostFormat {
            sample_rate: self.config.sample_rate.0,
            channels: self.config.channels,
        }
    }

    fn start(&mut self, mut engine: Engine) -> Result<(), AudioError> {
        if self.stream.is_some() {
            return Err(AudioError::AlreadyStarted);
        }
        let format = self.host_format();
        engine.configure(format.sample_rate, BusLayout::new(format.channels))?;

        let stream = match self.format {
            SampleFormat::F32 => self.build_f32(engine)?,
            SampleFormat::I16 => self.build_converting(engine, to_i16)?,
            SampleFormat::U16 => self.build_converting(engine, to_u16)?,
            _ => {
                return Err(AudioError::UnsupportedFormat {
                    channels: format.channels,
                    sample_rate: Some(format.sample_rate),
                })
            }
        };
        stream.play().map_err(|e| AudioError::Playback(e.to_string()))?;
        self.stream = Some(stream);
        tracing::debug!("output stream started");
        Ok(())
    }

    fn stop(&mut self) -> Result<(), AudioError> {
        if let Some(stream) = self.stream.take() {
            stream.pause().map_err(|e| AudioError::Playback(e.to_string()))?;
            tracing::debug!("output stream stopped");
        }
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.stream.is_some()
    }
}
