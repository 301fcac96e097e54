//! Clip state machine and lock-free shared state
//!
//! Each clip slot's mutable scalar fields live in a `ClipAtomics` struct
//! that the control thread writes and the render thread reads once per
//! callback (the render thread writes back the cursor, the loop counter,
//! and the Playing -> Complete transition). All slots plus the render epoch
//! share one `EngineShared` behind an `Arc`.
//!
//! Reads and writes use `Ordering::Relaxed` - a torn-in-time value costs at
//! most one period of stale gain or pan, never memory unsafety. The epoch
//! counter is the exception: it is published with Release and read with
//! Acquire because the lifecycle coordinator's reclamation decisions hang
//! off it.

use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};

/// Loop counter sentinel: loop forever
pub const LOOP_FOREVER: u32 = u32::MAX;

/// The possible states of a clip slot
///
/// Free - unallocated; skipped by the render context.
/// Paused - bound and allocated; may be resumed from the current cursor.
/// Playing - fed to the output by the render context each period.
/// Complete - finished (or stopped); silent, reclaimed on the next flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum ClipState {
    #[default]
    Free = 0,
    Paused = 1,
    Playing = 2,
    Complete = 3,
}

impl ClipState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => ClipState::Paused,
            2 => ClipState::Playing,
            3 => ClipState::Complete,
            _ => ClipState::Free,
        }
    }
}

/// Lock-free per-clip state shared between control and render contexts
pub struct ClipAtomics {
    /// Current state (ClipState as u8)
    state: AtomicU8,
    /// Next sample index to read
    cursor: AtomicU64,
    /// Linear volume (f32 bits, not clamped)
    volume: AtomicU32,
    /// Stereo pan (f32 bits, -1 left .. +1 right, not clamped)
    pan: AtomicU32,
    /// Remaining loop passes (0 = play once, LOOP_FOREVER = infinite)
    loops: AtomicU32,
}

impl ClipAtomics {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(ClipState::Free as u8),
            cursor: AtomicU64::new(0),
            volume: AtomicU32::new(1.0f32.to_bits()),
            pan: AtomicU32::new(0.0f32.to_bits()),
            loops: AtomicU32::new(0),
        }
    }

    #[inline]
    pub fn state(&self) -> ClipState {
        ClipState::from_u8(self.state.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn set_state(&self, state: ClipState) {
        self.state.store(state as u8, Ordering::Relaxed);
    }

    #[inline]
    pub fn is_playing(&self) -> bool {
        self.state() == ClipState::Playing
    }

    #[inline]
    pub fn cursor(&self) -> u64 {
        self.cursor.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn set_cursor(&self, cursor: u64) {
        self.cursor.store(cursor, Ordering::Relaxed);
    }

    #[inline]
    pub fn volume(&self) -> f32 {
        f32::from_bits(self.volume.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn set_volume(&self, volume: f32) {
        self.volume.store(volume.to_bits(), Ordering::Relaxed);
    }

    #[inline]
    pub fn pan(&self) -> f32 {
        f32::from_bits(self.pan.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn set_pan(&self, pan: f32) {
        self.pan.store(pan.to_bits(), Ordering::Relaxed);
    }

    #[inline]
    pub fn loops(&self) -> u32 {
        self.loops.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn set_loops(&self, loops: u32) {
        self.loops.store(loops, Ordering::Relaxed);
    }

    /// Reset every field to the unallocated defaults
    pub fn reset(&self) {
        self.set_state(ClipState::Free);
        self.set_cursor(0);
        self.set_volume(1.0);
        self.set_pan(0.0);
        self.set_loops(0);
    }
}

impl Default for ClipAtomics {
    fn default() -> Self {
        Self::new()
    }
}

/// All clip atomics plus the render epoch, shared between both contexts
pub(crate) struct EngineShared {
    /// One entry per clip slot; slot 0 is reserved and never allocated
    pub clips: Box<[ClipAtomics]>,
    /// Count of completed render callbacks
    epoch: AtomicU64,
}

impl EngineShared {
    pub fn new(max_clips: usize) -> Self {
        Self {
            clips: (0..=max_clips).map(|_| ClipAtomics::new()).collect(),
            epoch: AtomicU64::new(0),
        }
    }

    /// Render context: publish completion of one more callback
    #[inline]
    pub fn publish_epoch(&self) {
        self.epoch.fetch_add(1, Ordering::Release);
    }

    /// Control context: the last published epoch
    #[inline]
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let atomics = ClipAtomics::new();
        assert_eq!(atomics.state(), ClipState::Free);
        assert_eq!(atomics.cursor(), 0);
        assert_eq!(atomics.volume(), 1.0);
        assert_eq!(atomics.pan(), 0.0);
        assert_eq!(atomics.loops(), 0);
        assert!(!atomics.is_playing());
    }

    #[test]
    fn test_float_fields_round_trip() {
        let atomics = ClipAtomics::new();
        atomics.set_volume(0.25);
        atomics.set_pan(-0.75);
        assert_eq!(atomics.volume(), 0.25);
        assert_eq!(atomics.pan(), -0.75);
    }

    #[test]
    fn test_reset_restores_defaults() {
        let atomics = ClipAtomics::new();
        atomics.set_state(ClipState::Playing);
        atomics.set_cursor(123);
        atomics.set_volume(0.5);
        atomics.reset();

        assert_eq!(atomics.state(), ClipState::Free);
        assert_eq!(atomics.cursor(), 0);
        assert_eq!(atomics.volume(), 1.0);
    }

    #[test]
    fn test_epoch_advances() {
        let shared = EngineShared::new(4);
        assert_eq!(shared.epoch(), 0);
        shared.publish_epoch();
        shared.publish_epoch();
        assert_eq!(shared.epoch(), 2);
        assert_eq!(shared.clips.len(), 5);
    }
}
