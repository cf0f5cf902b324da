//! Dedicated playback thread
//!
//! The worker owns one [`ChunkPlayer`] and runs its event loop: commands from
//! the session and completions from the backend are multiplexed with
//! `select!` and handled one at a time, so the player never sees two events
//! concurrently.

use super::backend::PlaybackBackend;
use super::chunk::{AudioRef, ChunkId};
use super::player::ChunkPlayer;
use crate::integration::PlayerConfig;
use crate::{PlayerError, Result};
use crossbeam_channel::{bounded, select, Receiver, RecvError, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info};

/// Command sent to the playback worker
#[derive(Debug, Clone)]
pub enum PlayerCommand {
    /// Buffer a chunk for ordered playback
    Enqueue {
        audio: AudioRef,
        sequence_index: u64,
    },

    /// Halt the current chunk, keep the queue
    Stop,

    /// Re-trigger advancement after a stop
    Resume,

    /// Drop everything and rewind to index 0
    Cleanup,

    /// Release resources and end the worker thread
    Shutdown,
}

/// Event emitted by the player
///
/// Failed chunks are reported as finished like any other: consumers only
/// ever see ordered playback or silence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerEvent {
    /// A chunk was buffered
    Enqueued {
        chunk_id: ChunkId,
        sequence_index: u64,
        queue_depth: usize,
    },

    /// A chunk left the queue and started playing
    ChunkStarted {
        chunk_id: ChunkId,
        sequence_index: u64,
        queue_depth: usize,
    },

    /// A chunk was consumed
    ChunkFinished {
        chunk_id: ChunkId,
        sequence_index: u64,
    },

    /// Chunks are buffered but the expected one has not arrived
    Starved {
        next_expected_index: u64,
        queue_depth: usize,
    },

    /// Nothing playing, nothing buffered
    Idle { next_expected_index: u64 },

    /// Playback was halted by request
    Stopped {
        next_expected_index: u64,
        queue_depth: usize,
    },

    /// The session state was reset
    CleanedUp { discarded: usize },

    /// The worker could not run (e.g. no output device)
    Error(String),

    /// The worker has shut down
    Shutdown,
}

/// Session-side handle for a running playback worker
#[derive(Clone)]
pub struct PlayerHandle {
    command_tx: Sender<PlayerCommand>,
    event_rx: Receiver<PlayerEvent>,
    queue_depth: Arc<AtomicUsize>,
    is_playing: Arc<AtomicBool>,
}

impl PlayerHandle {
    /// Send a command to the worker
    pub fn send_command(&self, cmd: PlayerCommand) -> Result<()> {
        self.command_tx
            .send(cmd)
            .map_err(|e| PlayerError::Channel(format!("Failed to send command: {}", e)))
    }

    pub fn enqueue(&self, audio: AudioRef, sequence_index: u64) -> Result<()> {
        self.send_command(PlayerCommand::Enqueue {
            audio,
            sequence_index,
        })
    }

    pub fn stop(&self) -> Result<()> {
        self.send_command(PlayerCommand::Stop)
    }

    pub fn resume(&self) -> Result<()> {
        self.send_command(PlayerCommand::Resume)
    }

    pub fn cleanup(&self) -> Result<()> {
        self.send_command(PlayerCommand::Cleanup)
    }

    pub fn shutdown(&self) -> Result<()> {
        self.send_command(PlayerCommand::Shutdown)
    }

    /// Try to receive an event from the worker
    pub fn try_recv_event(&self) -> Option<PlayerEvent> {
        self.event_rx.try_recv().ok()
    }

    /// Wait up to `timeout` for the next event
    pub fn recv_event_timeout(&self, timeout: Duration) -> Option<PlayerEvent> {
        match self.event_rx.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Get the event receiver for direct access
    pub fn event_receiver(&self) -> Receiver<PlayerEvent> {
        self.event_rx.clone()
    }

    /// Number of buffered chunks, as of the last event the worker handled
    pub fn queue_depth(&self) -> usize {
        self.queue_depth.load(Ordering::SeqCst)
    }

    /// Whether a chunk was playing as of the last event the worker handled
    pub fn is_playing(&self) -> bool {
        self.is_playing.load(Ordering::SeqCst)
    }
}

/// Playback worker, not yet started
pub struct PlayerWorker {
    command_rx: Receiver<PlayerCommand>,
    event_tx: Sender<PlayerEvent>,
    queue_depth: Arc<AtomicUsize>,
    is_playing: Arc<AtomicBool>,
}

impl PlayerWorker {
    /// Create a worker and the handle used to drive it
    pub fn new(config: &PlayerConfig) -> (Self, PlayerHandle) {
        let (command_tx, command_rx) = bounded(config.command_queue_size);
        let (event_tx, event_rx) = bounded(config.event_queue_size);
        let queue_depth = Arc::new(AtomicUsize::new(0));
        let is_playing = Arc::new(AtomicBool::new(false));

        let worker = Self {
            command_rx,
            event_tx,
            queue_depth: Arc::clone(&queue_depth),
            is_playing: Arc::clone(&is_playing),
        };
        let handle = PlayerHandle {
            command_tx,
            event_rx,
            queue_depth,
            is_playing,
        };

        (worker, handle)
    }

    /// Start the worker thread.
    ///
    /// The backend is built on the worker thread by `make_backend`, since
    /// device streams generally cannot move between threads.
    pub fn start<B, F>(self, make_backend: F) -> Result<JoinHandle<()>>
    where
        B: PlaybackBackend + 'static,
        F: FnOnce() -> Result<B> + Send + 'static,
    {
        let Self {
            command_rx,
            event_tx,
            queue_depth,
            is_playing,
        } = self;

        thread::Builder::new()
            .name("talkdrill-playback".into())
            .spawn(move || {
                info!("Playback worker starting");

                let backend = match make_backend() {
                    Ok(backend) => backend,
                    Err(e) => {
                        error!("Failed to initialize playback backend: {}", e);
                        let _ = event_tx.try_send(PlayerEvent::Error(e.to_string()));
                        let _ = event_tx.try_send(PlayerEvent::Shutdown);
                        return;
                    }
                };

                let mut player = ChunkPlayer::new(backend).with_events(event_tx.clone());
                let completion_rx = player.completion_receiver();
                info!("Playback worker ready (session {})", player.session_id());

                loop {
                    let keep_running = select! {
                        recv(command_rx) -> cmd => apply_command(&mut player, cmd),
                        recv(completion_rx) -> completion => {
                            if let Ok(completion) = completion {
                                player.handle_completion(completion);
                            }
                            true
                        }
                    };

                    queue_depth.store(player.queue_depth(), Ordering::SeqCst);
                    is_playing.store(player.is_playing(), Ordering::SeqCst);

                    if !keep_running {
                        break;
                    }
                }

                player.cleanup();
                queue_depth.store(0, Ordering::SeqCst);
                is_playing.store(false, Ordering::SeqCst);

                let stats = player.stats();
                info!(
                    "Playback worker stopped: {} started, {} finished, {} failed, {} dropped",
                    stats.started, stats.finished, stats.failed, stats.dropped
                );
                let _ = event_tx.try_send(PlayerEvent::Shutdown);
            })
            .map_err(|e| PlayerError::Io(format!("Failed to spawn playback worker: {}", e)))
    }
}

/// Apply one command to the player; returns false when the loop should end
fn apply_command<B: PlaybackBackend>(
    player: &mut ChunkPlayer<B>,
    cmd: std::result::Result<PlayerCommand, RecvError>,
) -> bool {
    match cmd {
        Ok(PlayerCommand::Enqueue {
            audio,
            sequence_index,
        }) => {
            player.enqueue(audio, sequence_index);
        }
        Ok(PlayerCommand::Stop) => player.stop(),
        Ok(PlayerCommand::Resume) => player.resume(),
        Ok(PlayerCommand::Cleanup) => player.cleanup(),
        Ok(PlayerCommand::Shutdown) => {
            info!("Playback worker shutting down");
            return false;
        }
        Err(_) => {
            debug!("All player handles dropped");
            return false;
        }
    }
    true
}
