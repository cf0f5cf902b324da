#[cfg(feature = "audio-io")]
pub mod output;
pub mod resampler;
pub mod wav;

#[cfg(feature = "audio-io")]
pub use output::CpalBackend;
pub use resampler::resample_mono;
pub use wav::{downmix_to_mono, read_wav, write_wav};

/// Decoded PCM audio, interleaved when multi-channel
#[derive(Debug, Clone, PartialEq)]
pub struct AudioData {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioData {
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Self {
        Self {
            samples,
            sample_rate,
            channels,
        }
    }

    pub fn duration_seconds(&self) -> f32 {
        if self.sample_rate == 0 || self.channels == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / (self.sample_rate as f32 * self.channels as f32)
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Mono copy of this audio at `sample_rate`
    pub fn to_mono_at(&self, sample_rate: u32) -> crate::Result<Vec<f32>> {
        let mono = downmix_to_mono(&self.samples, self.channels);
        resample_mono(&mono, self.sample_rate, sample_rate)
    }
}
