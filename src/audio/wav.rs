use super::AudioData;
use crate::{PlayerError, Result};
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::path::Path;
use tracing::debug;

/// Write audio samples to a 16-bit PCM WAV file
///
/// # Arguments
/// * `path` - Path to the output WAV file
/// * `audio` - Samples in -1.0..=1.0, interleaved if multi-channel
pub fn write_wav<P: AsRef<Path>>(path: P, audio: &AudioData) -> Result<()> {
    let spec = WavSpec {
        channels: audio.channels,
        sample_rate: audio.sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path.as_ref(), spec)
        .map_err(|e| PlayerError::Io(format!("Failed to create WAV writer: {}", e)))?;

    for &sample in &audio.samples {
        let sample_i16 = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        writer
            .write_sample(sample_i16)
            .map_err(|e| PlayerError::Io(format!("Failed to write sample: {}", e)))?;
    }

    writer
        .finalize()
        .map_err(|e| PlayerError::Io(format!("Failed to finalize WAV file: {}", e)))?;

    debug!(
        "Wrote {} samples to WAV file: {:?}",
        audio.samples.len(),
        path.as_ref()
    );
    Ok(())
}

/// Decode a WAV chunk into f32 samples
pub fn read_wav<P: AsRef<Path>>(path: P) -> Result<AudioData> {
    let mut reader = WavReader::open(path.as_ref()).map_err(|e| {
        PlayerError::Decode(format!("Failed to open {:?}: {}", path.as_ref(), e))
    })?;

    let spec = reader.spec();
    debug!(
        "Reading WAV chunk: {} Hz, {} channels, {} bits",
        spec.sample_rate, spec.channels, spec.bits_per_sample
    );

    let decode_err = |e: hound::Error| PlayerError::Decode(format!("Failed to read sample: {}", e));

    let samples = match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Float, _) => reader
            .samples::<f32>()
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(decode_err)?,
        (SampleFormat::Int, 8 | 16 | 24 | 32) => {
            let scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|sample| sample as f32 / scale))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(decode_err)?
        }
        (SampleFormat::Int, bits) => {
            return Err(PlayerError::Decode(format!("Unsupported bit depth: {}", bits)));
        }
    };

    Ok(AudioData::new(samples, spec.sample_rate, spec.channels))
}

/// Average interleaved channels down to one
pub fn downmix_to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }

    samples
        .chunks(channels as usize)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}
