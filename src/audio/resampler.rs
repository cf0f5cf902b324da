use crate::{PlayerError, Result};
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use tracing::debug;

/// Frames fed to the resampler per call
const CHUNK_FRAMES: usize = 1024;

/// Convert a mono clip from `from_rate` to `to_rate`
///
/// Chunks are short (one TTS sentence or a relay packet), so the whole clip
/// is converted in one go when it is loaded, not in the output callback.
/// The resampler's delay is trimmed so the output lines up with the input.
pub fn resample_mono(input: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    if from_rate == 0 || to_rate == 0 {
        return Err(PlayerError::Config(
            "Sample rates must be greater than 0".into(),
        ));
    }

    if from_rate == to_rate || input.is_empty() {
        return Ok(input.to_vec());
    }

    let ratio = to_rate as f64 / from_rate as f64;
    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let mut resampler = SincFixedIn::<f32>::new(ratio, 1.1, params, CHUNK_FRAMES, 1)
        .map_err(|e| PlayerError::AudioProcessing(format!("Failed to create resampler: {}", e)))?;

    let expected = (input.len() as f64 * ratio).round() as usize;
    let delay = resampler.output_delay();
    let mut output = Vec::with_capacity(expected + delay + CHUNK_FRAMES);

    let mut chunks = input.chunks_exact(CHUNK_FRAMES);
    for chunk in &mut chunks {
        let out = resampler
            .process(&[chunk][..], None)
            .map_err(|e| PlayerError::AudioProcessing(format!("Resampling failed: {}", e)))?;
        output.extend_from_slice(&out[0]);
    }

    let remainder = chunks.remainder();
    if !remainder.is_empty() {
        let out = resampler
            .process_partial(Some(&[remainder][..]), None)
            .map_err(|e| PlayerError::AudioProcessing(format!("Resampling failed: {}", e)))?;
        output.extend_from_slice(&out[0]);
    }

    // Flush until the delayed tail is out
    while output.len() < expected + delay {
        let out = resampler
            .process_partial(None::<&[&[f32]]>, None)
            .map_err(|e| PlayerError::AudioProcessing(format!("Resampling failed: {}", e)))?;
        if out[0].is_empty() {
            break;
        }
        output.extend_from_slice(&out[0]);
    }

    let resampled: Vec<f32> = output.into_iter().skip(delay).take(expected).collect();
    debug!(
        "Resampled {} frames @ {} Hz -> {} frames @ {} Hz",
        input.len(),
        from_rate,
        resampled.len(),
        to_rate
    );

    Ok(resampled)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_rates() {
        assert!(resample_mono(&[0.0; 16], 0, 48000).is_err());
        assert!(resample_mono(&[0.0; 16], 16000, 0).is_err());
    }

    #[test]
    fn test_same_rate_passthrough() {
        let input = vec![0.1, -0.2, 0.3];
        assert_eq!(resample_mono(&input, 22050, 22050).unwrap(), input);
    }

    #[test]
    fn test_empty_input() {
        assert!(resample_mono(&[], 16000, 48000).unwrap().is_empty());
    }

    #[test]
    fn test_upsampling_length() {
        let input: Vec<f32> = (0..1600).map(|i| (i as f32 * 0.05).sin() * 0.5).collect();
        let output = resample_mono(&input, 16000, 48000).unwrap();
        // Three times as long, give or take edge frames
        assert!(output.len() >= 4700 && output.len() <= 4800, "got {}", output.len());
    }

    #[test]
    fn test_downsampling_length() {
        let input: Vec<f32> = (0..4410).map(|i| (i as f32 * 0.01).sin()).collect();
        let output = resample_mono(&input, 44100, 22050).unwrap();
        assert!(output.len() >= 2150 && output.len() <= 2210, "got {}", output.len());
    }
}
