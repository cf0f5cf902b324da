pub mod audio;
pub mod integration;
pub mod playback;

use thiserror::Error;

pub use integration::PlayerConfig;
pub use playback::{
    AudioRef, ChunkId, ChunkPlayer, PlaybackBackend, PlayerCommand, PlayerEvent, PlayerHandle,
    PlayerWorker,
};

#[derive(Error, Debug, Clone)]
pub enum PlayerError {
    #[error("Audio device error: {0}")]
    AudioDevice(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Audio processing error: {0}")]
    AudioProcessing(String),

    #[error("Playback error: {0}")]
    Playback(String),

    #[error("Unknown playback handle: {0}")]
    UnknownHandle(u64),

    #[error("Unsupported audio source: {0}")]
    UnsupportedSource(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("IO error: {0}")]
    Io(String),
}

impl From<std::io::Error> for PlayerError {
    fn from(e: std::io::Error) -> Self {
        PlayerError::Io(e.to_string())
    }
}

impl PlayerError {
    /// Check if this error is recoverable
    ///
    /// Per-chunk failures are recoverable: the player drops the chunk and
    /// moves on. Device, configuration and channel failures are not.
    pub fn is_recoverable(&self) -> bool {
        match self {
            PlayerError::AudioDevice(_) => false,
            PlayerError::Decode(_) => true,
            PlayerError::AudioProcessing(_) => true,
            PlayerError::Playback(_) => true,
            PlayerError::UnknownHandle(_) => true,
            PlayerError::UnsupportedSource(_) => true,
            PlayerError::Config(_) => false,
            PlayerError::Channel(_) => false,
            PlayerError::Io(_) => true,
        }
    }
}

pub type Result<T> = std::result::Result<T, PlayerError>;
