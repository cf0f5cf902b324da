//! Headless playback backend
//!
//! Plays nothing, but keeps real timing: every handle completes after the
//! duration of its clip (optionally scaled). Used when audio output is
//! disabled and in tests.

use super::backend::{CompletionNotifier, HandleId, PlaybackBackend};
use super::chunk::AudioRef;
use crate::{PlayerError, Result};
use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use hound::WavReader;
use std::collections::HashMap;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

struct SilentClip {
    duration: Duration,
    /// Dropping this wakes the timer thread and cancels the completion
    cancel: Option<Sender<()>>,
}

pub struct SilentBackend {
    clips: HashMap<HandleId, SilentClip>,
    next_handle: u64,
    time_scale: f32,
}

impl SilentBackend {
    pub fn new() -> Self {
        Self {
            clips: HashMap::new(),
            next_handle: 0,
            time_scale: 1.0,
        }
    }

    /// Scale simulated durations (0.01 makes a 1 s clip take 10 ms)
    pub fn with_time_scale(mut self, time_scale: f32) -> Self {
        self.time_scale = time_scale.max(0.0);
        self
    }

    /// Number of handles currently loaded
    pub fn loaded(&self) -> usize {
        self.clips.len()
    }

    fn clip_duration(audio: &AudioRef) -> Result<Duration> {
        match audio {
            AudioRef::Pcm(data) => {
                if data.sample_rate == 0 || data.channels == 0 {
                    return Err(PlayerError::Decode("PCM chunk has no sample rate".into()));
                }
                Ok(Duration::from_secs_f32(data.duration_seconds()))
            }
            AudioRef::File(path) => {
                let reader = WavReader::open(path).map_err(|e| {
                    PlayerError::Decode(format!("Failed to open {}: {}", path.display(), e))
                })?;
                let spec = reader.spec();
                if spec.sample_rate == 0 {
                    return Err(PlayerError::Decode(format!(
                        "{} has no sample rate",
                        path.display()
                    )));
                }
                // duration() counts frames, not samples
                Ok(Duration::from_secs_f64(
                    reader.duration() as f64 / spec.sample_rate as f64,
                ))
            }
            AudioRef::Uri(uri) => Err(PlayerError::UnsupportedSource(uri.clone())),
        }
    }
}

impl Default for SilentBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackBackend for SilentBackend {
    fn create(&mut self, audio: &AudioRef) -> Result<HandleId> {
        let duration = Self::clip_duration(audio)?.mul_f32(self.time_scale);
        let handle = HandleId(self.next_handle);
        self.next_handle += 1;

        debug!("Loaded {} ({:?}) as {}", audio.describe(), duration, handle);
        self.clips.insert(
            handle,
            SilentClip {
                duration,
                cancel: None,
            },
        );
        Ok(handle)
    }

    fn play(&mut self, handle: HandleId, notifier: CompletionNotifier) -> Result<()> {
        let clip = self
            .clips
            .get_mut(&handle)
            .ok_or(PlayerError::UnknownHandle(handle.0))?;

        let (cancel_tx, cancel_rx) = bounded::<()>(1);
        let duration = clip.duration;
        clip.cancel = Some(cancel_tx);

        thread::Builder::new()
            .name(format!("silent-{}", handle.0))
            .spawn(move || match cancel_rx.recv_timeout(duration) {
                Err(RecvTimeoutError::Timeout) => notifier.finished(),
                // Cancelled: drop the notifier without reporting
                Ok(()) | Err(RecvTimeoutError::Disconnected) => {}
            })
            .map_err(|e| PlayerError::Playback(format!("Failed to spawn timer: {}", e)))?;

        Ok(())
    }

    fn stop(&mut self, handle: HandleId) -> Result<()> {
        match self.clips.get_mut(&handle) {
            Some(clip) => {
                clip.cancel = None;
                Ok(())
            }
            None => Err(PlayerError::UnknownHandle(handle.0)),
        }
    }

    fn unload(&mut self, handle: HandleId) -> Result<()> {
        if self.clips.remove(&handle).is_none() {
            warn!("Unload of unknown {}", handle);
        }
        Ok(())
    }
}
