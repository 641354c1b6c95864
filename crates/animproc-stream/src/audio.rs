//! Animation audio client
//!
//! Posts audio keyframe events to an audio backend and tracks which are
//! still playing. Backends report completions from their own threads
//! through an unbounded channel that the client drains once per tick.

use std::collections::HashSet;

use tokio::sync::mpsc;

use crate::keyframe::AudioKeyFrame;

/// Handle for one playing audio event
pub type PlayingId = u32;

/// Event posted to stop all animation audio
pub const ANIM_ABORT_AUDIO_EVENT: u32 = 0x0A11_AB07;

/// Completion report from an audio backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioCompletion {
    Complete(PlayingId),
    Error(PlayingId),
}

pub type CompletionSender = mpsc::UnboundedSender<AudioCompletion>;

/// Audio engine seam
pub trait AudioBackend: Send {
    /// Post `event_id` on the animation game object. The backend reports the
    /// outcome on `done`. `None` means the event was not started.
    fn post_event(&mut self, event_id: u32, volume: f32, done: CompletionSender) -> Option<PlayingId>;

    /// Post a fire-and-forget event
    fn post_event_untracked(&mut self, event_id: u32);
}

/// Backend without audio output
#[derive(Debug, Default)]
pub struct NullAudioBackend;

impl AudioBackend for NullAudioBackend {
    fn post_event(&mut self, _event_id: u32, _volume: f32, _done: CompletionSender) -> Option<PlayingId> {
        None
    }

    fn post_event_untracked(&mut self, _event_id: u32) {}
}

/// Plays animation audio and tracks active events
pub struct AnimationAudioClient {
    backend: Box<dyn AudioBackend>,
    active: HashSet<PlayingId>,
    completion_tx: CompletionSender,
    completion_rx: mpsc::UnboundedReceiver<AudioCompletion>,
}

impl AnimationAudioClient {
    pub fn new(backend: Box<dyn AudioBackend>) -> Self {
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();
        AnimationAudioClient {
            backend,
            active: HashSet::new(),
            completion_tx,
            completion_rx,
        }
    }

    /// Forget events from the previous animation
    pub fn init_animation(&mut self) {
        self.active.clear();
    }

    pub fn play_audio_keyframe(&mut self, keyframe: &AudioKeyFrame) {
        for &event_id in &keyframe.event_ids {
            match self
                .backend
                .post_event(event_id, keyframe.volume, self.completion_tx.clone())
            {
                Some(id) => {
                    self.active.insert(id);
                }
                None => tracing::debug!(event_id, "audio event not started"),
            }
        }
    }

    pub fn abort_animation(&mut self) {
        self.backend.post_event_untracked(ANIM_ABORT_AUDIO_EVENT);
    }

    pub fn has_active_events(&self) -> bool {
        !self.active.is_empty()
    }

    /// Drain completions reported since the last tick
    pub fn update(&mut self) {
        while let Ok(completion) = self.completion_rx.try_recv() {
            match completion {
                AudioCompletion::Complete(id) => {
                    self.active.remove(&id);
                }
                AudioCompletion::Error(id) => {
                    tracing::warn!(playing_id = id, "audio event failed");
                    self.active.remove(&id);
                }
            }
        }
    }
}

impl Default for AnimationAudioClient {
    fn default() -> Self {
        Self::new(Box::new(NullAudioBackend))
    }
}
