//! The host playback seam.
//!
//! A backend owns the actual playback resources (device streams, decoded
//! clips). The player drives it through `create` / `play` / `stop` /
//! `unload`, and learns about the end of a clip through the
//! [`CompletionNotifier`] handed over in `play`.

use super::chunk::AudioRef;
use crate::Result;
use crossbeam_channel::Sender;
use std::fmt;
use tracing::debug;

/// Identifier of one playback resource created by a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandleId(pub u64);

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handle#{}", self.0)
    }
}

/// How a playback resource ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackOutcome {
    /// The clip played to its end
    Finished,

    /// The backend gave up on the clip (decode failure, device stall, ...)
    Failed(String),
}

/// Completion message delivered back into the player's event queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub handle: HandleId,
    pub outcome: PlaybackOutcome,
}

/// One-shot completion callback for a single playback resource.
///
/// Consuming `self` in [`finished`](Self::finished) and
/// [`failed`](Self::failed) guarantees at most one completion per handle.
/// Dropping the notifier without calling either sends nothing, which is what
/// a backend does when the clip is stopped.
#[derive(Debug)]
pub struct CompletionNotifier {
    handle: HandleId,
    tx: Sender<Completion>,
}

impl CompletionNotifier {
    pub fn new(handle: HandleId, tx: Sender<Completion>) -> Self {
        Self { handle, tx }
    }

    pub fn handle(&self) -> HandleId {
        self.handle
    }

    /// Report that the clip played to its end
    pub fn finished(self) {
        self.send(PlaybackOutcome::Finished);
    }

    /// Report that the clip could not be played
    pub fn failed(self, reason: impl Into<String>) {
        self.send(PlaybackOutcome::Failed(reason.into()));
    }

    fn send(self, outcome: PlaybackOutcome) {
        let completion = Completion {
            handle: self.handle,
            outcome,
        };
        if self.tx.send(completion).is_err() {
            debug!("Completion for {} dropped: player is gone", self.handle);
        }
    }
}

/// Platform audio playback capability
pub trait PlaybackBackend {
    /// Acquire a playback resource bound to `audio`
    fn create(&mut self, audio: &AudioRef) -> Result<HandleId>;

    /// Start playing `handle`; `notifier` must be fired exactly once when the
    /// clip ends or fails, unless the handle is stopped first
    fn play(&mut self, handle: HandleId, notifier: CompletionNotifier) -> Result<()>;

    /// Halt playback of `handle` without reporting completion
    fn stop(&mut self, handle: HandleId) -> Result<()>;

    /// Release every resource held for `handle`
    fn unload(&mut self, handle: HandleId) -> Result<()>;
}

impl<B: PlaybackBackend + ?Sized> PlaybackBackend for Box<B> {
    fn create(&mut self, audio: &AudioRef) -> Result<HandleId> {
        (**self).create(audio)
    }

    fn play(&mut self, handle: HandleId, notifier: CompletionNotifier) -> Result<()> {
        (**self).play(handle, notifier)
    }

    fn stop(&mut self, handle: HandleId) -> Result<()> {
        (**self).stop(handle)
    }

    fn unload(&mut self, handle: HandleId) -> Result<()> {
        (**self).unload(handle)
    }
}
