//! Configuration for the playback session
//!
//! Can be built in code or loaded from a JSON file; every field has a
//! default so partial files are fine.

use crate::{PlayerError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Play through an audio device; when false a silent, timed backend is
    /// used instead
    pub enable_audio_output: bool,

    /// Output device name (default device when unset)
    pub device_name: Option<String>,

    /// Force an output sample rate instead of the device default
    pub output_sample_rate: Option<u32>,

    /// Linear gain applied to every chunk
    pub volume: f32,

    /// Capacity of the command channel into the worker
    pub command_queue_size: usize,

    /// Capacity of the event channel out of the worker
    pub event_queue_size: usize,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            enable_audio_output: true,
            device_name: None,
            output_sample_rate: None,
            volume: 1.0,
            command_queue_size: 64,
            event_queue_size: 256,
        }
    }
}

impl PlayerConfig {
    /// Load a configuration from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text).map_err(|e| {
            PlayerError::Config(format!("Invalid config {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Select an output device by name
    pub fn with_device(mut self, name: impl Into<String>) -> Self {
        self.device_name = Some(name.into());
        self
    }

    pub fn with_volume(mut self, volume: f32) -> Self {
        self.volume = volume;
        self
    }

    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.output_sample_rate = Some(sample_rate);
        self
    }

    /// Disable audio output (headless mode)
    pub fn without_audio_output(mut self) -> Self {
        self.enable_audio_output = false;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=2.0).contains(&self.volume) {
            return Err(PlayerError::Config(format!(
                "Volume must be within 0.0..=2.0, got {}",
                self.volume
            )));
        }

        if self.output_sample_rate == Some(0) {
            return Err(PlayerError::Config(
                "Output sample rate must be greater than 0".into(),
            ));
        }

        if self.command_queue_size == 0 || self.event_queue_size == 0 {
            return Err(PlayerError::Config(
                "Queue sizes must be greater than 0".into(),
            ));
        }

        Ok(())
    }
}
