//! Chunk types shared by the queue, the player and the backends.

use crate::audio::AudioData;
use chrono::{DateTime, Utc};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Bookkeeping identifier assigned to every enqueued chunk.
///
/// Ids are monotonic per player instance and never used for ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChunkId(pub u64);

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "chunk#{}", self.0)
    }
}

/// Opaque reference to a chunk's audio payload.
///
/// The player never looks inside; only backends resolve it.
#[derive(Debug, Clone)]
pub enum AudioRef {
    /// A WAV file on disk
    File(PathBuf),

    /// A locator only a specific backend knows how to resolve
    Uri(String),

    /// Decoded samples handed over in memory (e.g. straight from TTS)
    Pcm(Arc<AudioData>),
}

impl AudioRef {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        AudioRef::File(path.into())
    }

    pub fn pcm(audio: AudioData) -> Self {
        AudioRef::Pcm(Arc::new(audio))
    }

    /// Short description for log lines
    pub fn describe(&self) -> String {
        match self {
            AudioRef::File(path) => format!("file:{}", path.display()),
            AudioRef::Uri(uri) => uri.clone(),
            AudioRef::Pcm(audio) => format!(
                "pcm:{} samples@{}Hz",
                audio.samples.len(),
                audio.sample_rate
            ),
        }
    }
}

/// One pending audio segment awaiting playback
#[derive(Debug, Clone)]
pub struct QueuedChunk {
    pub id: ChunkId,
    pub sequence_index: u64,
    pub audio: AudioRef,
    pub enqueued_at: DateTime<Utc>,
}

impl QueuedChunk {
    pub fn new(id: ChunkId, sequence_index: u64, audio: AudioRef) -> Self {
        Self {
            id,
            sequence_index,
            audio,
            enqueued_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe() {
        assert_eq!(AudioRef::file("/tmp/a.wav").describe(), "file:/tmp/a.wav");
        assert_eq!(AudioRef::Uri("tts://seg/3".into()).describe(), "tts://seg/3");

        let pcm = AudioRef::pcm(AudioData::new(vec![0.0; 160], 16000, 1));
        assert_eq!(pcm.describe(), "pcm:160 samples@16000Hz");
    }

    #[test]
    fn test_chunk_id_display() {
        assert_eq!(ChunkId(7).to_string(), "chunk#7");
    }
}
