//! Deferred alterations to the streaming animation
//!
//! The engine can ask for a message to be applied at a stream time of the
//! animation that is currently playing, either just before or just after
//! the tick that extracts that time. Pending alterations belong to one
//! animation and are dropped when the next one starts.

use std::collections::BTreeMap;

use animproc_core::{AnimError, AnimResult, StreamTime};
use animproc_wire::{AlterStreamingAnimationAtTime, EngineToRobot};

/// Whether `msg` may be scheduled as an alteration
pub fn is_supported_alteration(msg: &EngineToRobot) -> bool {
    matches!(
        msg,
        EngineToRobot::SetFullAnimTrackLockState(_)
            | EngineToRobot::PostAudioEvent(_)
            | EngineToRobot::TextToSpeechPlay(_)
    )
}

/// Time-ordered alterations for the current animation
#[derive(Debug, Default)]
pub struct StreamingAnimationModifier {
    alterations: BTreeMap<StreamTime, Vec<EngineToRobot>>,
    /// Animation epoch the pending alterations belong to
    epoch: u64,
}

impl StreamingAnimationModifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule an alteration against the animation of `epoch`
    pub fn handle(&mut self, msg: &AlterStreamingAnimationAtTime, epoch: u64) -> AnimResult<()> {
        let alteration = msg.alteration.as_ref();
        if !is_supported_alteration(alteration) {
            tracing::error!(
                tag = alteration.tag(),
                name = alteration.name(),
                "unsupported streaming animation alteration"
            );
            return Err(AnimError::UnsupportedAlteration(alteration.tag()));
        }
        self.sync_epoch(epoch);

        let mut time = StreamTime(msg.relative_stream_time_ms);
        if !time.is_tick_aligned() {
            let floored = time.floor_to_tick();
            tracing::warn!(
                requested = %time,
                applied = %floored,
                "alteration time is not on a tick boundary"
            );
            time = floored;
        }
        // After-tick entries sort after the tick that extracts `time`
        if !msg.apply_before_tick {
            time = time.saturating_add_ms(1);
        }

        self.alterations
            .entry(time)
            .or_default()
            .push(alteration.clone());
        Ok(())
    }

    /// Apply what is due before the tick that extracts `time`
    pub fn apply_before<F>(&mut self, epoch: u64, time: StreamTime, apply: F) -> usize
    where
        F: FnMut(EngineToRobot),
    {
        self.sync_epoch(epoch);
        self.apply_up_to(time, apply)
    }

    /// Apply what is due after the tick that extracted `extracted_at`
    pub fn apply_after<F>(&mut self, epoch: u64, extracted_at: StreamTime, apply: F) -> usize
    where
        F: FnMut(EngineToRobot),
    {
        self.sync_epoch(epoch);
        self.apply_up_to(extracted_at.saturating_add_ms(1), apply)
    }

    pub fn len(&self) -> usize {
        self.alterations.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.alterations.is_empty()
    }

    pub fn clear(&mut self) {
        self.alterations.clear();
    }

    fn sync_epoch(&mut self, epoch: u64) {
        if epoch == self.epoch {
            return;
        }
        if !self.alterations.is_empty() {
            tracing::debug!(dropped = self.len(), "new animation, dropping pending alterations");
        }
        self.alterations.clear();
        self.epoch = epoch;
    }

    fn apply_up_to<F>(&mut self, limit: StreamTime, mut apply: F) -> usize
    where
        F: FnMut(EngineToRobot),
    {
        let mut applied = 0;
        while let Some(entry) = self.alterations.first_entry() {
            if *entry.key() > limit {
                break;
            }
            for msg in entry.remove() {
                apply(msg);
                applied += 1;
            }
        }
        applied
    }
}
