//! WAV encoding of rendered output and decoding of PCM assets.

use std::io::{Cursor, Seek, Write};
use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use sa_engine::to_i16;
use sa_ir::PcmBuffer;

use crate::error::MasterError;

fn spec(channels: u16, sample_rate: u32) -> WavSpec {
    WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    }
}

fn write_samples<W: Write + Seek>(mut writer: WavWriter<W>, samples: &[f32]) -> Result<(), MasterError> {
    for &s in samples {
        writer.write_sample(to_i16(s))?;
    }
    writer.finalize()?;
    Ok(())
}

/// Write interleaved f32 samples as 16-bit PCM, saturating out-of-range
/// values.
pub fn write_wav(
    path: impl AsRef<Path>,
    samples: &[f32],
    channels: u16,
    sample_rate: u32,
) -> Result<(), MasterError> {
    let writer = WavWriter::create(path, spec(channels, sample_rate))?;
    write_samples(writer, samples)
}

/// Encode interleaved f32 samples as an in-memory 16-bit WAV file.
pub fn wav_bytes(samples: &[f32], channels: u16, sample_rate: u32) -> Result<Vec<u8>, MasterError> {
    let mut bytes = Vec::new();
    let writer = WavWriter::new(Cursor::new(&mut bytes), spec(channels, sample_rate))?;
    write_samples(writer, samples)?;
    Ok(bytes)
}

/// Decode a WAV file into a PCM buffer, returning it with its sample rate.
pub fn read_wav(path: impl AsRef<Path>) -> Result<(PcmBuffer, u32), MasterError> {
    let reader = WavReader::open(path)?;
    decode(reader)
}

fn decode<R: std::io::Read>(reader: WavReader<R>) -> Result<(PcmBuffer, u32), MasterError> {
    let spec = reader.spec();
    let samples: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader.into_samples::<f32>().collect::<Result<_, _>>()?,
        SampleFormat::Int => {
            let scale = (1u64 << (spec.bits_per_sample.clamp(1, 32) - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()?
        }
    };
    Ok((PcmBuffer::from_interleaved(&samples, spec.channels)?, spec.sample_rate))
}
