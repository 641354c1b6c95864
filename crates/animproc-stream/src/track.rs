//! Track - time-ordered keyframes for one channel, with a playback cursor

use animproc_core::{AnimError, AnimResult, StreamTime};
use animproc_wire::EngineToRobot;

use crate::keyframe::{KeyFrame, StreamingKeyFrame};

/// Most keyframes a single track may hold
pub const MAX_FRAMES_PER_TRACK: usize = 1000;

/// Ordered keyframes plus the index of the current one.
///
/// The cursor only moves forward during playback; frames before it have
/// completed. `cursor == len` means no frames are left.
#[derive(Debug, Clone)]
pub struct Track<F> {
    frames: Vec<F>,
    cursor: usize,
}

impl<F> Default for Track<F> {
    fn default() -> Self {
        Track {
            frames: Vec::new(),
            cursor: 0,
        }
    }
}

impl<F: KeyFrame> Track<F> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a keyframe that triggers no earlier than the last one
    pub fn add_keyframe_to_back(&mut self, frame: F) -> AnimResult<()> {
        if self.frames.len() >= MAX_FRAMES_PER_TRACK {
            tracing::warn!(len = self.frames.len(), "track full, refusing keyframe");
            return Err(AnimError::TooManyKeyFrames(MAX_FRAMES_PER_TRACK));
        }
        if let Some(last) = self.frames.last_mut() {
            if frame.trigger_time() < last.trigger_time() {
                return Err(AnimError::KeyFrameOutOfOrder(frame.trigger_time()));
            }
            last.before_append(&frame);
        }
        self.frames.push(frame);
        Ok(())
    }

    /// Insert a keyframe at its trigger time, rejecting conflicting slots
    pub fn add_keyframe_by_time(&mut self, frame: F) -> AnimResult<()> {
        if self.frames.len() >= MAX_FRAMES_PER_TRACK {
            tracing::warn!(len = self.frames.len(), "track full, refusing keyframe");
            return Err(AnimError::TooManyKeyFrames(MAX_FRAMES_PER_TRACK));
        }
        let trigger = frame.trigger_time();
        if self
            .frames
            .iter()
            .any(|f| f.trigger_time() == trigger && f.conflicts_with(&frame))
        {
            tracing::error!(?trigger, "keyframe already exists at this time");
            return Err(AnimError::DuplicateKeyFrame(trigger));
        }
        let pos = self.frames.partition_point(|f| f.trigger_time() <= trigger);
        if pos > 0 {
            self.frames[pos - 1].before_append(&frame);
        }
        self.frames.insert(pos, frame);
        if pos < self.cursor {
            self.cursor += 1;
        }
        Ok(())
    }

    /// Append all of `other`, shifted by `offset`
    pub fn append_track(&mut self, other: &Track<F>, offset: StreamTime) {
        for frame in &other.frames {
            let mut frame = frame.clone();
            frame.set_trigger_time(frame.trigger_time().saturating_add_ms(offset.as_millis()));
            if let Err(e) = self.add_keyframe_to_back(frame) {
                tracing::error!("append track failed: {}", e);
            }
        }
    }

    #[inline]
    pub fn has_frames_left(&self) -> bool {
        self.cursor < self.frames.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Keyframe under the cursor
    pub fn current_keyframe(&self) -> Option<&F> {
        self.frames.get(self.cursor)
    }

    /// Current keyframe if it is due at `time`
    pub fn current_if_due(&self, time: StreamTime) -> Option<&F> {
        self.current_keyframe().filter(|f| f.is_time_to_play(time))
    }

    pub fn first_keyframe(&self) -> Option<&F> {
        self.frames.first()
    }

    pub fn last_keyframe(&self) -> Option<&F> {
        self.frames.last()
    }

    /// Frames from the cursor on
    pub fn remaining(&self) -> &[F] {
        &self.frames[self.cursor.min(self.frames.len())..]
    }

    pub fn frames(&self) -> &[F] {
        &self.frames
    }

    pub fn move_to_start(&mut self) {
        self.cursor = 0;
    }

    pub fn move_to_end(&mut self) {
        self.cursor = self.frames.len();
    }

    /// Move past every keyframe whose action has completed by `to_time`
    pub fn advance(&mut self, to_time: StreamTime) {
        while let Some(frame) = self.frames.get(self.cursor) {
            if frame.action_complete_time() <= to_time {
                self.cursor += 1;
            } else {
                break;
            }
        }
    }

    /// Drop everything before the cursor
    pub fn clear_up_to_current(&mut self) {
        let cursor = self.cursor.min(self.frames.len());
        self.frames.drain(..cursor);
        self.cursor = 0;
    }

    pub fn clear(&mut self) {
        self.frames.clear();
        self.cursor = 0;
    }
}

impl<F: StreamingKeyFrame> Track<F> {
    /// Command for the current keyframe if it is due at `time`
    pub fn current_streaming_message(&self, time: StreamTime) -> Option<EngineToRobot> {
        self.current_if_due(time)
            .and_then(|frame| frame.stream_message(time))
    }
}
