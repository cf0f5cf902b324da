//! Ordered audio chunk player
//!
//! Decouples arrival order from playback order: chunks come in tagged with a
//! sequence index, possibly out of order, and are played one at a time in
//! strict index order. The player never skips ahead; it waits for the exact
//! next index. A chunk whose playback fails counts as played so one bad
//! chunk cannot stall the stream.
//!
//! The player is a single-threaded state machine. Completions arrive as
//! messages on an internal channel and are handled by whoever owns the
//! player, either directly through [`ChunkPlayer::process_completions`] or
//! by the [`PlayerWorker`](super::worker::PlayerWorker) event loop.

use super::backend::{Completion, CompletionNotifier, HandleId, PlaybackBackend, PlaybackOutcome};
use super::chunk::{AudioRef, ChunkId, QueuedChunk};
use super::queue::PendingQueue;
use super::worker::PlayerEvent;
use crate::PlayerError;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Counters describing what the player has done so far
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlaybackStats {
    pub enqueued: u64,
    pub started: u64,
    pub finished: u64,
    pub failed: u64,
    /// Duplicates of an index that was already queued or playing
    pub dropped: u64,
}

/// The chunk currently owning the playback slot
#[derive(Debug)]
struct ActivePlayback {
    chunk: QueuedChunk,
    handle: HandleId,
    started_at: Instant,
}

pub struct ChunkPlayer<B: PlaybackBackend> {
    session_id: Uuid,
    backend: B,
    pending: PendingQueue,
    next_expected_index: u64,
    next_chunk_id: u64,
    active: Option<ActivePlayback>,
    completion_tx: Sender<Completion>,
    completion_rx: Receiver<Completion>,
    event_tx: Option<Sender<PlayerEvent>>,
    stats: PlaybackStats,
}

impl<B: PlaybackBackend> ChunkPlayer<B> {
    /// Create a player for one streaming session
    pub fn new(backend: B) -> Self {
        let (completion_tx, completion_rx) = unbounded();
        let session_id = Uuid::new_v4();

        debug!("Created chunk player for session {}", session_id);

        Self {
            session_id,
            backend,
            pending: PendingQueue::new(),
            next_expected_index: 0,
            next_chunk_id: 0,
            active: None,
            completion_tx,
            completion_rx,
            event_tx: None,
            stats: PlaybackStats::default(),
        }
    }

    /// Publish lifecycle events on `event_tx`
    pub fn with_events(mut self, event_tx: Sender<PlayerEvent>) -> Self {
        self.event_tx = Some(event_tx);
        self
    }

    /// Buffer a chunk and start it right away if it is the one playback is
    /// waiting for.
    pub fn enqueue(&mut self, audio: AudioRef, sequence_index: u64) -> ChunkId {
        let id = ChunkId(self.next_chunk_id);
        self.next_chunk_id += 1;
        self.stats.enqueued += 1;

        if self.active_index() == Some(sequence_index) {
            warn!(
                "Dropping {} ({}): index {} is already playing",
                id,
                audio.describe(),
                sequence_index
            );
            self.stats.dropped += 1;
            return id;
        }

        if sequence_index < self.next_expected_index {
            // Kept, but it can never be selected again
            warn!(
                "Chunk index {} arrived after playback passed it (next is {}); it will not play",
                sequence_index, self.next_expected_index
            );
        }

        let chunk = QueuedChunk::new(id, sequence_index, audio);
        if let Err(duplicate) = self.pending.insert(chunk) {
            warn!(
                "Dropping {} ({}): index {} is already queued",
                duplicate.id,
                duplicate.audio.describe(),
                sequence_index
            );
            self.stats.dropped += 1;
            return id;
        }

        debug!(
            "Enqueued {} at index {} (depth {})",
            id,
            sequence_index,
            self.pending.len()
        );
        self.emit(PlayerEvent::Enqueued {
            chunk_id: id,
            sequence_index,
            queue_depth: self.pending.len(),
        });

        self.try_advance();
        id
    }

    /// Re-trigger advancement after a [`stop`](Self::stop)
    pub fn resume(&mut self) {
        self.try_advance();
    }

    /// Halt the active chunk and release its resource.
    ///
    /// Buffered chunks and the expected index are left alone. The halted
    /// chunk goes back into the queue since it never finished, so the next
    /// advancement plays it again from the start.
    pub fn stop(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };

        info!(
            "Stopping {} at index {} after {:?}",
            active.chunk.id,
            active.chunk.sequence_index,
            active.started_at.elapsed()
        );
        self.release(active.handle);

        let sequence_index = active.chunk.sequence_index;
        if let Err(chunk) = self.pending.insert(active.chunk) {
            warn!("Could not requeue stopped {}: index taken", chunk.id);
        }

        self.emit(PlayerEvent::Stopped {
            next_expected_index: sequence_index,
            queue_depth: self.pending.len(),
        });
    }

    /// Tear down the session: release the active resource, drop every
    /// buffered chunk and rewind the expected index to 0.
    pub fn cleanup(&mut self) {
        if let Some(active) = self.active.take() {
            debug!("Releasing {} during cleanup", active.chunk.id);
            self.release(active.handle);
        }

        let discarded = self.pending.len();
        self.pending.clear();
        self.next_expected_index = 0;

        // Late completions can only belong to released handles
        while self.completion_rx.try_recv().is_ok() {}

        info!(
            "Cleaned up session {} ({} pending chunks discarded)",
            self.session_id, discarded
        );
        self.emit(PlayerEvent::CleanedUp { discarded });
    }

    /// Number of chunks waiting in the queue
    pub fn queue_depth(&self) -> usize {
        self.pending.len()
    }

    /// Sequence index that must play next
    pub fn next_expected_index(&self) -> u64 {
        self.next_expected_index
    }

    pub fn is_playing(&self) -> bool {
        self.active.is_some()
    }

    /// Id and index of the chunk currently playing
    pub fn active_chunk(&self) -> Option<(ChunkId, u64)> {
        self.active
            .as_ref()
            .map(|a| (a.chunk.id, a.chunk.sequence_index))
    }

    pub fn stats(&self) -> PlaybackStats {
        self.stats
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Receiver side of the completion channel, for `select!` loops
    pub fn completion_receiver(&self) -> Receiver<Completion> {
        self.completion_rx.clone()
    }

    /// Handle every completion that has already arrived.
    ///
    /// Returns how many completions were taken off the channel.
    pub fn process_completions(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(completion) = self.completion_rx.try_recv() {
            self.handle_completion(completion);
            handled += 1;
        }
        handled
    }

    /// Block up to `timeout` for one completion, then drain the rest.
    ///
    /// Returns false if nothing arrived in time.
    pub fn wait_for_completion(&mut self, timeout: Duration) -> bool {
        match self.completion_rx.recv_timeout(timeout) {
            Ok(completion) => {
                self.handle_completion(completion);
                self.process_completions();
                true
            }
            Err(RecvTimeoutError::Timeout) => false,
            // We hold a sender ourselves
            Err(RecvTimeoutError::Disconnected) => false,
        }
    }

    /// Apply one completion message.
    ///
    /// Success and failure are handled the same way: the chunk is consumed
    /// and the next one is pulled.
    pub fn handle_completion(&mut self, completion: Completion) {
        let is_current = self
            .active
            .as_ref()
            .map_or(false, |a| a.handle == completion.handle);
        if !is_current {
            debug!("Ignoring completion for released {}", completion.handle);
            return;
        }
        let Some(active) = self.active.take() else {
            return;
        };

        if let Err(e) = self.backend.unload(active.handle) {
            warn!("Failed to unload {}: {}", active.handle, e);
        }

        match completion.outcome {
            PlaybackOutcome::Finished => {
                debug!(
                    "Finished {} (index {}) in {:?}",
                    active.chunk.id,
                    active.chunk.sequence_index,
                    active.started_at.elapsed()
                );
                self.stats.finished += 1;
            }
            PlaybackOutcome::Failed(reason) => {
                warn!(
                    "Playback of {} (index {}) failed, skipping: {}",
                    active.chunk.id, active.chunk.sequence_index, reason
                );
                self.stats.failed += 1;
            }
        }

        self.consume(&active.chunk);
        self.try_advance();
    }

    fn try_advance(&mut self) {
        while self.active.is_none() {
            let Some(chunk) = self.pending.take(self.next_expected_index) else {
                if self.pending.is_empty() {
                    self.emit(PlayerEvent::Idle {
                        next_expected_index: self.next_expected_index,
                    });
                } else {
                    debug!(
                        "Waiting for index {} ({} chunks buffered)",
                        self.next_expected_index,
                        self.pending.len()
                    );
                    self.emit(PlayerEvent::Starved {
                        next_expected_index: self.next_expected_index,
                        queue_depth: self.pending.len(),
                    });
                }
                return;
            };

            if let Err((chunk, e)) = self.start(chunk) {
                warn!(
                    "Could not start {} (index {}), skipping: {}",
                    chunk.id, chunk.sequence_index, e
                );
                self.stats.failed += 1;
                self.consume(&chunk);
            }
        }
    }

    fn start(&mut self, chunk: QueuedChunk) -> std::result::Result<(), (QueuedChunk, PlayerError)> {
        let handle = match self.backend.create(&chunk.audio) {
            Ok(handle) => handle,
            Err(e) => return Err((chunk, e)),
        };

        let notifier = CompletionNotifier::new(handle, self.completion_tx.clone());
        if let Err(e) = self.backend.play(handle, notifier) {
            if let Err(unload_err) = self.backend.unload(handle) {
                warn!("Failed to unload {}: {}", handle, unload_err);
            }
            return Err((chunk, e));
        }

        debug!(
            "Playing {} (index {}, {}) on {}",
            chunk.id,
            chunk.sequence_index,
            chunk.audio.describe(),
            handle
        );
        self.stats.started += 1;
        self.emit(PlayerEvent::ChunkStarted {
            chunk_id: chunk.id,
            sequence_index: chunk.sequence_index,
            queue_depth: self.pending.len(),
        });

        self.active = Some(ActivePlayback {
            chunk,
            handle,
            started_at: Instant::now(),
        });
        Ok(())
    }

    fn consume(&mut self, chunk: &QueuedChunk) {
        self.next_expected_index += 1;
        self.emit(PlayerEvent::ChunkFinished {
            chunk_id: chunk.id,
            sequence_index: chunk.sequence_index,
        });
    }

    fn release(&mut self, handle: HandleId) {
        if let Err(e) = self.backend.stop(handle) {
            warn!("Failed to stop {}: {}", handle, e);
        }
        if let Err(e) = self.backend.unload(handle) {
            warn!("Failed to unload {}: {}", handle, e);
        }
    }

    fn active_index(&self) -> Option<u64> {
        self.active.as_ref().map(|a| a.chunk.sequence_index)
    }

    fn emit(&self, event: PlayerEvent) {
        let Some(tx) = &self.event_tx else {
            return;
        };
        match tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                debug!("Event queue full, dropping {:?}", event);
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}

impl<B: PlaybackBackend> Drop for ChunkPlayer<B> {
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            self.release(active.handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};

    /// Backend that records calls and keeps notifiers until the test fires them
    #[derive(Default)]
    struct ManualBackend {
        next_handle: u64,
        labels: HashMap<HandleId, String>,
        notifiers: HashMap<HandleId, CompletionNotifier>,
        loaded: HashSet<HandleId>,
        played: Vec<String>,
        stopped: Vec<String>,
        fail_create: HashSet<String>,
    }

    impl ManualBackend {
        fn playing(&self) -> Vec<HandleId> {
            self.notifiers.keys().copied().collect()
        }

        fn finish_current(&mut self) {
            let handle = self.playing()[0];
            self.notifiers.remove(&handle).unwrap().finished();
        }

        fn fail_current(&mut self) {
            let handle = self.playing()[0];
            self.notifiers.remove(&handle).unwrap().failed("device stalled");
        }
    }

    fn label(audio: &AudioRef) -> String {
        match audio {
            AudioRef::Uri(uri) => uri.clone(),
            other => other.describe(),
        }
    }

    impl PlaybackBackend for ManualBackend {
        fn create(&mut self, audio: &AudioRef) -> crate::Result<HandleId> {
            let name = label(audio);
            if self.fail_create.contains(&name) {
                return Err(PlayerError::Decode(format!("cannot decode {}", name)));
            }
            let handle = HandleId(self.next_handle);
            self.next_handle += 1;
            self.labels.insert(handle, name);
            self.loaded.insert(handle);
            Ok(handle)
        }

        fn play(&mut self, handle: HandleId, notifier: CompletionNotifier) -> crate::Result<()> {
            self.played.push(self.labels[&handle].clone());
            self.notifiers.insert(handle, notifier);
            Ok(())
        }

        fn stop(&mut self, handle: HandleId) -> crate::Result<()> {
            self.stopped.push(self.labels[&handle].clone());
            self.notifiers.remove(&handle);
            Ok(())
        }

        fn unload(&mut self, handle: HandleId) -> crate::Result<()> {
            self.loaded.remove(&handle);
            Ok(())
        }
    }

    fn uri(name: &str) -> AudioRef {
        AudioRef::Uri(name.to_string())
    }

    /// Fire the active notifier and let the player react
    fn complete(player: &mut ChunkPlayer<ManualBackend>) {
        player.backend_mut().finish_current();
        assert_eq!(player.process_completions(), 1);
    }

    #[test]
    fn test_scenario_out_of_order_pair() {
        let mut player = ChunkPlayer::new(ManualBackend::default());

        player.enqueue(uri("A"), 1);
        assert_eq!(player.queue_depth(), 1);
        assert!(!player.is_playing());

        player.enqueue(uri("B"), 0);
        assert!(player.is_playing());
        assert_eq!(player.queue_depth(), 1);
        assert_eq!(player.backend().played, vec!["B"]);

        complete(&mut player);
        assert_eq!(player.backend().played, vec!["B", "A"]);
        assert_eq!(player.queue_depth(), 0);

        complete(&mut player);
        assert!(!player.is_playing());
        assert_eq!(player.next_expected_index(), 2);
        assert!(player.backend().loaded.is_empty());
    }

    #[test]
    fn test_chunk_ids_are_monotonic() {
        let mut player = ChunkPlayer::new(ManualBackend::default());
        let a = player.enqueue(uri("a"), 4);
        let b = player.enqueue(uri("b"), 2);
        let c = player.enqueue(uri("c"), 9);
        assert!(a < b && b < c);
    }

    #[test]
    fn test_removed_at_start_not_completion() {
        let mut player = ChunkPlayer::new(ManualBackend::default());
        player.enqueue(uri("c2"), 2);
        player.enqueue(uri("c1"), 1);
        assert_eq!(player.queue_depth(), 2);

        player.enqueue(uri("c0"), 0);
        assert_eq!(player.active_chunk().map(|(_, i)| i), Some(0));
        assert_eq!(player.queue_depth(), 2);

        complete(&mut player);
        assert_eq!(player.queue_depth(), 1);
    }

    #[test]
    fn test_failed_completion_does_not_stall() {
        let mut player = ChunkPlayer::new(ManualBackend::default());
        player.enqueue(uri("x0"), 0);
        player.enqueue(uri("x1"), 1);

        player.backend_mut().fail_current();
        player.process_completions();

        assert_eq!(player.backend().played, vec!["x0", "x1"]);
        assert_eq!(player.next_expected_index(), 1);
        assert_eq!(player.stats().failed, 1);
    }

    #[test]
    fn test_create_failure_skips_chunk() {
        let mut backend = ManualBackend::default();
        backend.fail_create.insert("bad".to_string());
        let mut player = ChunkPlayer::new(backend);

        player.enqueue(uri("good1"), 1);
        player.enqueue(uri("bad"), 0);

        // Index 0 is consumed without ever playing, index 1 starts at once
        assert_eq!(player.backend().played, vec!["good1"]);
        assert_eq!(player.next_expected_index(), 1);
        assert_eq!(player.queue_depth(), 0);
    }

    #[test]
    fn test_duplicate_first_wins() {
        let mut player = ChunkPlayer::new(ManualBackend::default());
        player.enqueue(uri("first"), 1);
        player.enqueue(uri("second"), 1);
        assert_eq!(player.queue_depth(), 1);
        assert_eq!(player.stats().dropped, 1);

        player.enqueue(uri("zero"), 0);
        player.enqueue(uri("zero-again"), 0);
        assert_eq!(player.stats().dropped, 2);

        complete(&mut player);
        assert_eq!(player.backend().played, vec!["zero", "first"]);
    }

    #[test]
    fn test_stale_chunk_is_orphaned() {
        let mut player = ChunkPlayer::new(ManualBackend::default());
        player.enqueue(uri("s0"), 0);
        complete(&mut player);
        assert_eq!(player.next_expected_index(), 1);

        player.enqueue(uri("late"), 0);
        assert_eq!(player.queue_depth(), 1);
        assert!(!player.is_playing());

        player.enqueue(uri("s1"), 1);
        complete(&mut player);
        assert_eq!(player.backend().played, vec!["s0", "s1"]);
        assert_eq!(player.queue_depth(), 1);
    }

    #[test]
    fn test_stop_keeps_queue_and_index() {
        let mut player = ChunkPlayer::new(ManualBackend::default());
        player.enqueue(uri("k0"), 0);
        complete(&mut player);

        player.enqueue(uri("k1"), 1);
        player.enqueue(uri("k2"), 2);
        player.enqueue(uri("k3"), 3);
        assert_eq!(player.active_chunk().map(|(_, i)| i), Some(1));

        player.stop();
        assert!(!player.is_playing());
        assert_eq!(player.next_expected_index(), 1);
        assert_eq!(player.backend().stopped, vec!["k1"]);
        assert!(player.backend().loaded.is_empty());
        // k1 went back, k2/k3 untouched
        assert_eq!(player.queue_depth(), 3);

        // No automatic restart
        assert!(player.backend().playing().is_empty());

        player.enqueue(uri("k4"), 4);
        assert_eq!(player.backend().played, vec!["k0", "k1", "k1"]);
        assert_eq!(player.active_chunk().map(|(_, i)| i), Some(1));
    }

    #[test]
    fn test_stale_completion_after_stop_ignored() {
        let mut player = ChunkPlayer::new(ManualBackend::default());
        player.enqueue(uri("p0"), 0);
        let stale = Completion {
            handle: HandleId(0),
            outcome: PlaybackOutcome::Finished,
        };

        player.stop();
        player.handle_completion(stale);
        assert_eq!(player.next_expected_index(), 0);
        assert_eq!(player.stats().finished, 0);
    }

    #[test]
    fn test_cleanup_resets_session() {
        let mut player = ChunkPlayer::new(ManualBackend::default());
        player.enqueue(uri("c3"), 3);
        player.enqueue(uri("c0"), 0);
        complete(&mut player);
        player.enqueue(uri("c1"), 1);
        assert!(player.is_playing());

        player.cleanup();
        assert_eq!(player.queue_depth(), 0);
        assert_eq!(player.next_expected_index(), 0);
        assert!(!player.is_playing());
        assert!(player.backend().loaded.is_empty());

        player.enqueue(uri("fresh"), 0);
        assert_eq!(player.active_chunk().map(|(_, i)| i), Some(0));
        assert_eq!(player.backend().played.last().map(String::as_str), Some("fresh"));
    }

    #[test]
    fn test_events_published() {
        let (tx, rx) = crossbeam_channel::bounded(32);
        let mut player = ChunkPlayer::new(ManualBackend::default()).with_events(tx);

        player.enqueue(uri("e1"), 1);
        player.enqueue(uri("e0"), 0);
        complete(&mut player);
        complete(&mut player);

        let events: Vec<_> = rx.try_iter().collect();
        let started: Vec<u64> = events
            .iter()
            .filter_map(|e| match e {
                PlayerEvent::ChunkStarted { sequence_index, .. } => Some(*sequence_index),
                _ => None,
            })
            .collect();
        assert_eq!(started, vec![0, 1]);
        assert!(events
            .iter()
            .any(|e| matches!(e, PlayerEvent::Starved { next_expected_index: 0, .. })));
        assert!(matches!(
            events.last(),
            Some(PlayerEvent::Idle {
                next_expected_index: 2
            })
        ));
    }

    #[test]
    fn test_drop_releases_active_handle() {
        let mut player = ChunkPlayer::new(ManualBackend::default());
        player.enqueue(uri("d0"), 0);
        assert!(player.is_playing());
        let rx = player.completion_receiver();
        drop(player);
        // Player went away without panicking and nothing completed
        assert!(rx.try_recv().is_err());
    }
}
