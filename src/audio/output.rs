//! Device playback through cpal
//!
//! One output stream stays open for the life of the backend. Clips are
//! decoded, downmixed and resampled to the device rate when a handle is
//! created; the output callback then copies the current clip into the
//! device buffer and fires the completion notifier when the clip runs out.

use crate::audio::{read_wav, AudioData};
use crate::integration::PlayerConfig;
use crate::playback::{AudioRef, CompletionNotifier, HandleId, PlaybackBackend};
use crate::{PlayerError, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, Stream, StreamConfig};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Clip currently feeding the output callback
struct NowPlaying {
    handle: HandleId,
    samples: Arc<Vec<f32>>,
    position: usize,
    notifier: Option<CompletionNotifier>,
}

pub struct CpalBackend {
    device: Device,
    config: StreamConfig,
    stream: Option<Stream>,
    volume: f32,
    clips: HashMap<HandleId, Arc<Vec<f32>>>,
    now_playing: Arc<Mutex<Option<NowPlaying>>>,
    next_handle: u64,
}

impl CpalBackend {
    /// Open the configured output device (or the default one)
    pub fn new(config: &PlayerConfig) -> Result<Self> {
        let host = cpal::default_host();

        let device = match &config.device_name {
            Some(name) => host
                .output_devices()
                .map_err(|e| PlayerError::AudioDevice(format!("Failed to list devices: {}", e)))?
                .find(|d| d.name().map(|n| &n == name).unwrap_or(false))
                .ok_or_else(|| {
                    PlayerError::AudioDevice(format!("Output device not found: {}", name))
                })?,
            None => host
                .default_output_device()
                .ok_or_else(|| PlayerError::AudioDevice("No output device available".into()))?,
        };

        info!(
            "Using output device: {}",
            device.name().unwrap_or_else(|_| "Unknown".to_string())
        );

        let mut stream_config: StreamConfig = device
            .default_output_config()
            .map_err(|e| {
                PlayerError::AudioDevice(format!("Failed to get output config: {}", e))
            })?
            .into();

        if let Some(rate) = config.output_sample_rate {
            debug!(
                "Overriding device rate {} Hz with {} Hz",
                stream_config.sample_rate.0, rate
            );
            stream_config.sample_rate = SampleRate(rate);
        }

        Ok(Self {
            device,
            config: stream_config,
            stream: None,
            volume: config.volume,
            clips: HashMap::new(),
            now_playing: Arc::new(Mutex::new(None)),
            next_handle: 0,
        })
    }

    /// Get the sample rate of the output device
    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    /// Get the number of channels
    pub fn channels(&self) -> u16 {
        self.config.channels
    }

    fn decode(&self, audio: &AudioRef) -> Result<Vec<f32>> {
        let decoded: AudioData;
        let data: &AudioData = match audio {
            AudioRef::File(path) => {
                decoded = read_wav(path)?;
                &decoded
            }
            AudioRef::Pcm(data) => data,
            AudioRef::Uri(uri) => return Err(PlayerError::UnsupportedSource(uri.clone())),
        };

        if data.is_empty() {
            return Err(PlayerError::Decode(format!(
                "{} contains no samples",
                audio.describe()
            )));
        }

        data.to_mono_at(self.sample_rate())
    }

    /// Open the output stream on first use
    fn ensure_stream(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let channels = self.config.channels as usize;
        let volume = self.volume;
        let now_playing = Arc::clone(&self.now_playing);
        let now_playing_err = Arc::clone(&self.now_playing);

        let err_fn = move |err: cpal::StreamError| {
            error!("Audio output stream error: {}", err);
            // Fail the current clip so the queue moves on
            if let Some(mut current) = now_playing_err.lock().take() {
                if let Some(notifier) = current.notifier.take() {
                    notifier.failed(format!("output stream error: {}", err));
                }
            }
        };

        let stream = self
            .device
            .build_output_stream(
                &self.config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let mut slot = now_playing.lock();
                    let Some(current) = slot.as_mut() else {
                        data.fill(0.0);
                        return;
                    };

                    for frame in data.chunks_mut(channels) {
                        let sample = match current.samples.get(current.position) {
                            Some(&s) => {
                                current.position += 1;
                                s * volume
                            }
                            None => 0.0,
                        };
                        frame.fill(sample);
                    }

                    if current.position >= current.samples.len() {
                        if let Some(mut done) = slot.take() {
                            if let Some(notifier) = done.notifier.take() {
                                notifier.finished();
                            }
                        }
                    }
                },
                err_fn,
                None,
            )
            .map_err(|e| {
                PlayerError::AudioDevice(format!("Failed to build output stream: {}", e))
            })?;

        stream.play().map_err(|e| {
            PlayerError::AudioDevice(format!("Failed to start output stream: {}", e))
        })?;

        info!(
            "Started output stream: {} Hz, {} channels",
            self.sample_rate(),
            self.channels()
        );
        self.stream = Some(stream);
        Ok(())
    }
}

impl PlaybackBackend for CpalBackend {
    fn create(&mut self, audio: &AudioRef) -> Result<HandleId> {
        let samples = self.decode(audio)?;
        let handle = HandleId(self.next_handle);
        self.next_handle += 1;

        debug!(
            "Loaded {} as {} ({} frames @ {} Hz)",
            audio.describe(),
            handle,
            samples.len(),
            self.sample_rate()
        );
        self.clips.insert(handle, Arc::new(samples));
        Ok(handle)
    }

    fn play(&mut self, handle: HandleId, notifier: CompletionNotifier) -> Result<()> {
        let samples = self
            .clips
            .get(&handle)
            .cloned()
            .ok_or(PlayerError::UnknownHandle(handle.0))?;

        self.ensure_stream()?;

        let previous = self.now_playing.lock().replace(NowPlaying {
            handle,
            samples,
            position: 0,
            notifier: Some(notifier),
        });
        if let Some(previous) = previous {
            warn!("{} replaced {} still in the output slot", handle, previous.handle);
        }
        Ok(())
    }

    fn stop(&mut self, handle: HandleId) -> Result<()> {
        let mut slot = self.now_playing.lock();
        if slot.as_ref().map_or(false, |c| c.handle == handle) {
            // Dropping the notifier reports nothing
            slot.take();
            debug!("Stopped {}", handle);
        }
        Ok(())
    }

    fn unload(&mut self, handle: HandleId) -> Result<()> {
        self.stop(handle)?;
        self.clips.remove(&handle);
        Ok(())
    }
}

impl Drop for CpalBackend {
    fn drop(&mut self) {
        self.now_playing.lock().take();
        if let Some(stream) = self.stream.take() {
            drop(stream);
            info!("Closed output stream");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;
    use std::time::Duration;

    #[test]
    fn test_backend_creation() {
        // This test might fail in CI environments without audio devices
        if let Ok(backend) = CpalBackend::new(&PlayerConfig::default()) {
            assert!(backend.sample_rate() > 0);
            assert!(backend.channels() > 0);
        }
    }

    #[test]
    fn test_unknown_device() {
        let config = PlayerConfig::default().with_device("talkdrill-no-such-device");
        assert!(CpalBackend::new(&config).is_err());
    }

    #[test]
    fn test_play_short_clip() {
        let Ok(mut backend) = CpalBackend::new(&PlayerConfig::default()) else {
            return;
        };

        let clip = AudioRef::pcm(AudioData::new(vec![0.0; 1600], 16000, 1));
        let handle = backend.create(&clip).unwrap();

        let (tx, rx) = unbounded();
        if backend.play(handle, CompletionNotifier::new(handle, tx)).is_ok() {
            // 100 ms of silence; allow generous slack for slow devices
            let _ = rx.recv_timeout(Duration::from_secs(2));
        }
        backend.unload(handle).unwrap();
    }

    #[test]
    fn test_uri_rejected() {
        if let Ok(mut backend) = CpalBackend::new(&PlayerConfig::default()) {
            let result = backend.create(&AudioRef::Uri("relay://peer".into()));
            assert!(matches!(result, Err(PlayerError::UnsupportedSource(_))));
        }
    }
}
