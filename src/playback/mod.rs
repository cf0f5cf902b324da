pub mod backend;
pub mod chunk;
pub mod player;
pub mod queue;
pub mod silent;
pub mod worker;

pub use backend::{Completion, CompletionNotifier, HandleId, PlaybackBackend, PlaybackOutcome};
pub use chunk::{AudioRef, ChunkId, QueuedChunk};
pub use player::{ChunkPlayer, PlaybackStats};
pub use queue::PendingQueue;
pub use silent::SilentBackend;
pub use worker::{PlayerCommand, PlayerEvent, PlayerHandle, PlayerWorker};
