//! Sampler - the control-context surface of the engine
//!
//! Owns the handle free-lists, the control-side pools, and the deferred
//! reclamation machinery. Everything here runs at arbitrary latency; the
//! only paths shared with the render context are the clip atomics and the
//! command queue.
//!
//! Control operations report failure by returning the invalid handle (or a
//! neutral value) and recording a retrievable last error, so a failed call
//! never takes the process down and can always be retried.
//!
//! # Reclamation protocol
//!
//! `stop` and `destroy_sample` never free anything. They flip the clip
//! state to Complete (immediately observable), record the render epoch at
//! issue time, and park the slot in a pending set. `flush` - called by the
//! application no more than once per render period - reclaims a pending
//! slot only once the published epoch has advanced past its issue epoch,
//! which guarantees the render context has finished any callback that
//! could still have been reading the old state. Clips that completed
//! naturally skip the gate: the mixer writes the cursor back before
//! publishing Complete, so the slot is already quiescent.

use std::sync::Arc;

use basedrop::{Collector, Handle, Shared};

use crate::audio::{AudioConfig, AudioError, AudioResult};

use super::clip::{ClipState, EngineShared};
use super::command::{EngineCommand, COMMAND_QUEUE_CAPACITY};
use super::handle::{ClipHandle, HandleAllocator, SampleHandle};
use super::sample::{SampleData, SampleRef};

/// Control-side view of one sample slot
#[derive(Default)]
struct SampleSlot {
    data: Option<Shared<SampleData>>,
    generation: u32,
    /// Scheduled for reclamation; the handle is dead but not yet recycled
    pending: bool,
}

/// Control-side view of one clip slot
#[derive(Clone, Copy)]
struct ClipSlot {
    /// Bound sample (NONE = slot free)
    sample: SampleHandle,
    /// Cached layout of the bound sample, for position math
    frames: usize,
    samples_per_frame: usize,
    /// Scheduled for reclamation
    pending: bool,
}

impl Default for ClipSlot {
    fn default() -> Self {
        Self {
            sample: SampleHandle::NONE,
            frames: 0,
            samples_per_frame: 1,
            pending: false,
        }
    }
}

/// A slot waiting out the one-period safety margin
#[derive(Debug, Clone, Copy)]
struct PendingReclaim {
    slot: usize,
    /// Render epoch published when the stop/destroy was issued
    epoch: u64,
}

/// The control-context engine surface
pub struct Sampler {
    config: AudioConfig,
    shared: Arc<EngineShared>,
    commands: rtrb::Producer<EngineCommand>,
    /// Deferred-deallocation collector; PCM buffers dropped on either
    /// thread are swept here during flush
    collector: Collector,
    gc_handle: Handle,
    sample_ids: HandleAllocator,
    clip_ids: HandleAllocator,
    samples: Vec<SampleSlot>,
    clips: Vec<ClipSlot>,
    pending_clips: Vec<PendingReclaim>,
    pending_samples: Vec<PendingReclaim>,
    last_error: Option<AudioError>,
}

impl Sampler {
    pub(crate) fn new(
        config: AudioConfig,
        shared: Arc<EngineShared>,
        commands: rtrb::Producer<EngineCommand>,
    ) -> Self {
        let collector = Collector::new();
        let gc_handle = collector.handle();
        let max_samples = config.max_samples;
        let max_clips = config.max_clips;
        Self {
            config,
            shared,
            commands,
            collector,
            gc_handle,
            sample_ids: HandleAllocator::new(max_samples),
            clip_ids: HandleAllocator::new(max_clips),
            samples: (0..=max_samples).map(|_| SampleSlot::default()).collect(),
            clips: (0..=max_clips).map(|_| ClipSlot::default()).collect(),
            pending_clips: Vec::new(),
            pending_samples: Vec::new(),
            last_error: None,
        }
    }

    /// The configuration this engine was built with
    pub fn config(&self) -> &AudioConfig {
        &self.config
    }

    /// The most recent control-operation error, if any
    pub fn last_error(&self) -> Option<&AudioError> {
        self.last_error.as_ref()
    }

    fn record_error(&mut self, err: AudioError) {
        log::error!("{}", err);
        self.last_error = Some(err);
    }

    // --- Samples ---

    /// Accept a decoded PCM buffer into the sample pool
    ///
    /// `pcm` is flat interleaved f32; `sample_rate` must equal the engine
    /// rate (the engine does not resample). Returns `SampleHandle::NONE`
    /// and records the error on failure.
    pub fn create_sample(
        &mut self,
        pcm: Vec<f32>,
        channels: u16,
        sample_rate: u32,
        frames: usize,
    ) -> SampleHandle {
        match self.try_create_sample(pcm, channels, sample_rate, frames) {
            Ok(handle) => handle,
            Err(err) => {
                self.record_error(err);
                SampleHandle::NONE
            }
        }
    }

    fn try_create_sample(
        &mut self,
        pcm: Vec<f32>,
        channels: u16,
        sample_rate: u32,
        frames: usize,
    ) -> AudioResult<SampleHandle> {
        if channels != 1 && channels != 2 {
            return Err(AudioError::UnsupportedChannels(channels));
        }
        if sample_rate != self.config.sample_rate {
            return Err(AudioError::SampleRateMismatch {
                got: sample_rate,
                expected: self.config.sample_rate,
            });
        }
        let expected_len = frames * channels as usize;
        if pcm.len() != expected_len {
            return Err(AudioError::BufferSizeMismatch {
                got: pcm.len(),
                expected: expected_len,
            });
        }

        let id = self.sample_ids.allocate().ok_or(AudioError::Exhausted {
            resource: "sample",
            capacity: self.sample_ids.capacity(),
        })?;
        let slot = id as usize;
        let generation = self.samples[slot].generation;
        let data = Shared::new(&self.gc_handle, SampleData::new(pcm, channels, frames));

        if self
            .commands
            .push(EngineCommand::InstallSample {
                slot,
                generation,
                data: data.clone(),
            })
            .is_err()
        {
            self.sample_ids.release(id);
            return Err(AudioError::Exhausted {
                resource: "command queue",
                capacity: COMMAND_QUEUE_CAPACITY,
            });
        }

        self.samples[slot].data = Some(data);
        self.samples[slot].pending = false;
        log::info!(
            "loaded sample {} ({} frames, {})",
            id,
            frames,
            if channels == 1 { "mono" } else { "stereo" }
        );
        Ok(SampleHandle(id))
    }

    /// Schedule a sample for destruction
    ///
    /// Force-stops every clip bound to it, then hands the slot to the
    /// deferred reclamation protocol; the PCM stays alive until the render
    /// context can no longer be reading it.
    pub fn destroy_sample(&mut self, handle: SampleHandle) {
        let slot = match self.sample_slot(handle) {
            Ok(slot) => slot,
            Err(err) => return self.record_error(err),
        };

        for clip_slot in 1..self.clips.len() {
            if self.clips[clip_slot].sample == handle && !self.clips[clip_slot].pending {
                self.stop_slot(clip_slot);
            }
        }

        self.samples[slot].pending = true;
        self.pending_samples.push(PendingReclaim {
            slot,
            epoch: self.shared.epoch(),
        });
        log::debug!("sample {} scheduled for reclamation", handle.raw());
    }

    /// Resolve a sample handle to a live slot index
    fn sample_slot(&self, handle: SampleHandle) -> AudioResult<usize> {
        let slot = handle.raw() as usize;
        if handle.is_none() || slot >= self.samples.len() {
            return Err(AudioError::InvalidHandle {
                space: "sample",
                id: handle.raw(),
            });
        }
        let entry = &self.samples[slot];
        if entry.data.is_none() || entry.pending {
            return Err(AudioError::InvalidHandle {
                space: "sample",
                id: handle.raw(),
            });
        }
        Ok(slot)
    }

    // --- Clips ---

    /// Create a clip bound to a sample, initially Paused with the cursor
    /// at the start
    ///
    /// Returns `ClipHandle::NONE` and records the error on failure.
    pub fn create_clip(&mut self, sample: SampleHandle) -> ClipHandle {
        match self.try_create_clip(sample) {
            Ok(handle) => handle,
            Err(err) => {
                self.record_error(err);
                ClipHandle::NONE
            }
        }
    }

    fn try_create_clip(&mut self, sample: SampleHandle) -> AudioResult<ClipHandle> {
        let sample_slot = self.sample_slot(sample)?;
        let (frames, samples_per_frame) = match self.samples[sample_slot].data.as_ref() {
            Some(data) => (data.frames(), data.samples_per_frame()),
            None => {
                return Err(AudioError::InvalidHandle {
                    space: "sample",
                    id: sample.raw(),
                })
            }
        };

        let id = self.clip_ids.allocate().ok_or(AudioError::Exhausted {
            resource: "clip",
            capacity: self.clip_ids.capacity(),
        })?;
        let slot = id as usize;

        let sample_ref = SampleRef {
            index: sample_slot,
            generation: self.samples[sample_slot].generation,
        };
        if self
            .commands
            .push(EngineCommand::BindClip {
                slot,
                sample: sample_ref,
            })
            .is_err()
        {
            self.clip_ids.release(id);
            return Err(AudioError::Exhausted {
                resource: "command queue",
                capacity: COMMAND_QUEUE_CAPACITY,
            });
        }

        self.clips[slot] = ClipSlot {
            sample,
            frames,
            samples_per_frame,
            pending: false,
        };
        let atomics = &self.shared.clips[slot];
        atomics.reset();
        atomics.set_state(ClipState::Paused);
        Ok(ClipHandle(id))
    }

    /// Resolve a clip handle to an allocated slot index (pending slots
    /// included - their handles stay valid for queries until flushed)
    fn clip_slot(&self, handle: ClipHandle) -> AudioResult<usize> {
        let slot = handle.raw() as usize;
        if handle.is_none() || slot >= self.clips.len() || self.clips[slot].sample.is_none() {
            return Err(AudioError::InvalidHandle {
                space: "clip",
                id: handle.raw(),
            });
        }
        Ok(slot)
    }

    /// Resolve a clip handle to a slot that still accepts control
    /// operations (allocated and not scheduled for reclamation)
    fn active_clip_slot(&self, handle: ClipHandle) -> AudioResult<usize> {
        let slot = self.clip_slot(handle)?;
        if self.clips[slot].pending {
            return Err(AudioError::InvalidHandle {
                space: "clip",
                id: handle.raw(),
            });
        }
        Ok(slot)
    }

    /// Start or resume playback
    ///
    /// A paused clip resumes from its current cursor; restarting from the
    /// top is `set_position(clip, 0.0)` followed by `play`.
    pub fn play(&mut self, handle: ClipHandle) {
        let slot = match self.active_clip_slot(handle) {
            Ok(slot) => slot,
            Err(err) => return self.record_error(err),
        };
        let atomics = &self.shared.clips[slot];
        match atomics.state() {
            ClipState::Paused => atomics.set_state(ClipState::Playing),
            ClipState::Playing => {}
            // A finished clip cannot be revived; it is awaiting flush
            other => log::debug!("ignoring play on clip {} in state {:?}", handle.raw(), other),
        }
    }

    /// Suspend playback without moving the cursor
    pub fn pause(&mut self, handle: ClipHandle) {
        let slot = match self.active_clip_slot(handle) {
            Ok(slot) => slot,
            Err(err) => return self.record_error(err),
        };
        let atomics = &self.shared.clips[slot];
        if atomics.state() == ClipState::Playing {
            atomics.set_state(ClipState::Paused);
        }
    }

    /// Stop a clip and schedule its slot for reclamation
    ///
    /// `is_playing` is false as soon as this returns; the handle itself is
    /// recycled only by a later `flush`.
    pub fn stop(&mut self, handle: ClipHandle) {
        match self.active_clip_slot(handle) {
            Ok(slot) => self.stop_slot(slot),
            Err(err) => self.record_error(err),
        }
    }

    fn stop_slot(&mut self, slot: usize) {
        self.shared.clips[slot].set_state(ClipState::Complete);
        self.clips[slot].pending = true;
        self.pending_clips.push(PendingReclaim {
            slot,
            epoch: self.shared.epoch(),
        });
    }

    // --- Clip parameters ---

    /// Set linear volume (intended range [0, 1]; not clamped)
    pub fn set_volume(&mut self, handle: ClipHandle, volume: f32) {
        match self.active_clip_slot(handle) {
            Ok(slot) => self.shared.clips[slot].set_volume(volume),
            Err(err) => self.record_error(err),
        }
    }

    /// Get linear volume (0.0 for an invalid handle)
    pub fn volume(&mut self, handle: ClipHandle) -> f32 {
        match self.clip_slot(handle) {
            Ok(slot) => self.shared.clips[slot].volume(),
            Err(err) => {
                self.record_error(err);
                0.0
            }
        }
    }

    /// Set stereo pan (intended range [-1, 1]; not clamped)
    pub fn set_pan(&mut self, handle: ClipHandle, pan: f32) {
        match self.active_clip_slot(handle) {
            Ok(slot) => self.shared.clips[slot].set_pan(pan),
            Err(err) => self.record_error(err),
        }
    }

    /// Get stereo pan (0.0 for an invalid handle)
    pub fn pan(&mut self, handle: ClipHandle) -> f32 {
        match self.clip_slot(handle) {
            Ok(slot) => self.shared.clips[slot].pan(),
            Err(err) => {
                self.record_error(err);
                0.0
            }
        }
    }

    /// Set the remaining loop count (0 = play once, `LOOP_FOREVER` =
    /// infinite, N = N more passes)
    pub fn set_loop_count(&mut self, handle: ClipHandle, count: u32) {
        match self.active_clip_slot(handle) {
            Ok(slot) => self.shared.clips[slot].set_loops(count),
            Err(err) => self.record_error(err),
        }
    }

    /// Get the remaining loop count (0 for an invalid handle)
    pub fn loop_count(&mut self, handle: ClipHandle) -> u32 {
        match self.clip_slot(handle) {
            Ok(slot) => self.shared.clips[slot].loops(),
            Err(err) => {
                self.record_error(err);
                0
            }
        }
    }

    /// Normalized playback position in [0, 1]
    pub fn position(&mut self, handle: ClipHandle) -> f32 {
        let slot = match self.clip_slot(handle) {
            Ok(slot) => slot,
            Err(err) => {
                self.record_error(err);
                return 0.0;
            }
        };
        let clip = &self.clips[slot];
        let length = clip.frames * clip.samples_per_frame;
        if length == 0 {
            return 0.0;
        }
        self.shared.clips[slot].cursor() as f32 / length as f32
    }

    /// Seek to a normalized position in [0, 1], aligned to a frame
    /// boundary
    pub fn set_position(&mut self, handle: ClipHandle, position: f32) {
        let slot = match self.active_clip_slot(handle) {
            Ok(slot) => slot,
            Err(err) => return self.record_error(err),
        };
        let clip = &self.clips[slot];
        let frame = (position.clamp(0.0, 1.0) * clip.frames as f32) as usize;
        let cursor = frame.min(clip.frames) * clip.samples_per_frame;
        self.shared.clips[slot].set_cursor(cursor as u64);
    }

    /// Whether the clip is currently in the Playing state
    pub fn is_playing(&mut self, handle: ClipHandle) -> bool {
        match self.clip_slot(handle) {
            Ok(slot) => self.shared.clips[slot].is_playing(),
            Err(err) => {
                self.record_error(err);
                false
            }
        }
    }

    /// Number of clips currently in the Playing state
    pub fn playing_clip_count(&self) -> usize {
        (1..self.clips.len())
            .filter(|&slot| self.shared.clips[slot].is_playing())
            .count()
    }

    // --- Lifecycle coordination ---

    /// Reclaim finished and stopped slots; returns true while any clip is
    /// still Playing
    ///
    /// Call from the control context, no more often than once per render
    /// period. Slots parked by `stop`/`destroy_sample` are recycled only
    /// after the render epoch has advanced past their issue epoch.
    pub fn flush(&mut self) -> bool {
        let epoch = self.shared.epoch();

        // Naturally completed clips: the mixer quiesced these before
        // publishing Complete, so no safety margin is needed
        for slot in 1..self.clips.len() {
            let clip = &self.clips[slot];
            if !clip.sample.is_none()
                && !clip.pending
                && self.shared.clips[slot].state() == ClipState::Complete
            {
                self.reclaim_clip(slot);
            }
        }

        // Stopped clips: wait out the one-period margin
        let mut i = 0;
        while i < self.pending_clips.len() {
            let entry = self.pending_clips[i];
            if epoch > entry.epoch && self.reclaim_clip(entry.slot) {
                self.pending_clips.swap_remove(i);
            } else {
                i += 1;
            }
        }

        // Destroyed samples, same margin
        let mut i = 0;
        while i < self.pending_samples.len() {
            let entry = self.pending_samples[i];
            if epoch > entry.epoch && self.reclaim_sample(entry.slot) {
                self.pending_samples.swap_remove(i);
            } else {
                i += 1;
            }
        }

        // Sweep PCM buffers whose last reference has dropped
        self.collector.collect();

        self.playing_clip_count() > 0
    }

    /// Detach, reset, and recycle one clip slot
    ///
    /// Returns false if the detach command could not be queued; the slot is
    /// then left for the next flush.
    fn reclaim_clip(&mut self, slot: usize) -> bool {
        if self
            .commands
            .push(EngineCommand::UnbindClip { slot })
            .is_err()
        {
            log::warn!("command queue full; clip {} reclaim deferred", slot);
            return false;
        }
        self.shared.clips[slot].reset();
        self.clips[slot] = ClipSlot::default();
        self.clip_ids.release(slot as u32);
        log::debug!("reclaimed clip slot {}", slot);
        true
    }

    /// Release one sample slot's PCM and recycle its id
    fn reclaim_sample(&mut self, slot: usize) -> bool {
        if self
            .commands
            .push(EngineCommand::RemoveSample { slot })
            .is_err()
        {
            log::warn!("command queue full; sample {} reclaim deferred", slot);
            return false;
        }
        let entry = &mut self.samples[slot];
        entry.data = None;
        entry.generation = entry.generation.wrapping_add(1);
        entry.pending = false;
        self.sample_ids.release(slot as u32);
        log::debug!("reclaimed sample slot {}", slot);
        true
    }

    /// Stop every clip and destroy every sample (all deferred)
    pub fn reset(&mut self) {
        log::info!("resetting sampler: stopping all clips, destroying all samples");
        let epoch = self.shared.epoch();
        for slot in 1..self.clips.len() {
            if !self.clips[slot].sample.is_none() && !self.clips[slot].pending {
                self.stop_slot(slot);
            }
        }
        for slot in 1..self.samples.len() {
            let entry = &mut self.samples[slot];
            if entry.data.is_some() && !entry.pending {
                entry.pending = true;
                self.pending_samples.push(PendingReclaim { slot, epoch });
            }
        }
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        // Final sweep of anything already enqueued for collection
        self.collector.collect();
    }
}
