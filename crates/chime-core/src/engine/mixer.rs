//! Mixer - the render-context half of the engine
//!
//! `render` is the body of the audio callback. It must finish inside the
//! period budget, so it performs no allocation, takes no locks, and never
//! propagates errors: a clip whose sample reference cannot be resolved
//! (unbound slot, stale generation, out-of-range cursor) contributes
//! silence instead of faulting.

use std::f32::consts::FRAC_1_SQRT_2;
use std::sync::Arc;

use basedrop::Shared;

use crate::types::{StereoBuffer, StereoSample};

use super::clip::{ClipState, EngineShared, LOOP_FOREVER};
use super::command::EngineCommand;
use super::sample::{SampleData, SampleRef};

/// Render-side view of one sample slot
struct RenderSample {
    generation: u32,
    data: Option<Shared<SampleData>>,
}

/// Render-side view of one clip slot
struct RenderClip {
    sample: Option<SampleRef>,
}

/// The render-context mixer
///
/// Owned by the audio callback (or driven directly in tests). All
/// structural mutation arrives through the command queue and is applied at
/// the start of `render`, so mid-callback the slot arrays are stable.
pub struct Mixer {
    shared: Arc<EngineShared>,
    commands: rtrb::Consumer<EngineCommand>,
    samples: Vec<RenderSample>,
    clips: Vec<RenderClip>,
}

impl Mixer {
    pub(crate) fn new(
        shared: Arc<EngineShared>,
        commands: rtrb::Consumer<EngineCommand>,
        max_samples: usize,
        max_clips: usize,
    ) -> Self {
        Self {
            shared,
            commands,
            samples: (0..=max_samples)
                .map(|_| RenderSample {
                    generation: 0,
                    data: None,
                })
                .collect(),
            clips: (0..=max_clips).map(|_| RenderClip { sample: None }).collect(),
        }
    }

    /// Render one audio period into `out`
    ///
    /// Drains pending commands, zero-fills the buffer, mixes every Playing
    /// clip, hard-limits the result to [-1, 1], and publishes the epoch.
    pub fn render(&mut self, out: &mut StereoBuffer) {
        self.drain_commands();

        out.fill_silence();
        for slot in 1..self.clips.len() {
            self.mix_clip(slot, out);
        }
        for frame in out.iter_mut() {
            *frame = frame.clamped();
        }

        self.shared.publish_epoch();
    }

    /// Apply queued structural changes at the callback boundary
    fn drain_commands(&mut self) {
        while let Ok(cmd) = self.commands.pop() {
            match cmd {
                EngineCommand::InstallSample {
                    slot,
                    generation,
                    data,
                } => {
                    if let Some(entry) = self.samples.get_mut(slot) {
                        entry.generation = generation;
                        entry.data = Some(data);
                    }
                }
                EngineCommand::RemoveSample { slot } => {
                    if let Some(entry) = self.samples.get_mut(slot) {
                        // Dropping the Shared here only enqueues the buffer
                        // for collection on the control side
                        entry.data = None;
                    }
                }
                EngineCommand::BindClip { slot, sample } => {
                    if let Some(entry) = self.clips.get_mut(slot) {
                        entry.sample = Some(sample);
                    }
                }
                EngineCommand::UnbindClip { slot } => {
                    if let Some(entry) = self.clips.get_mut(slot) {
                        entry.sample = None;
                    }
                }
            }
        }
    }

    /// Mix one clip slot into the output buffer
    fn mix_clip(&self, slot: usize, out: &mut StereoBuffer) {
        let atomics = &self.shared.clips[slot];
        if atomics.state() != ClipState::Playing {
            return;
        }
        let Some(sample_ref) = self.clips[slot].sample else {
            return;
        };
        let Some(entry) = self.samples.get(sample_ref.index) else {
            return;
        };
        // A stale generation means the slot was reclaimed and reused since
        // this clip was bound; the clip must not read the new audio
        if entry.generation != sample_ref.generation {
            return;
        }
        let Some(data) = entry.data.as_ref() else {
            return;
        };

        let volume = atomics.volume();
        let pan = atomics.pan();
        let mut loops = atomics.loops();
        let mut cursor = atomics.cursor() as usize;

        let pcm = data.pcm();
        let length = data.len();
        let step = data.samples_per_frame();
        let mono = data.is_mono();
        let mut completed = false;

        for frame in out.iter_mut() {
            let (src_left, src_right) = if mono {
                let value = pcm.get(cursor).copied().unwrap_or(0.0);
                (value, value)
            } else {
                (
                    pcm.get(cursor).copied().unwrap_or(0.0),
                    pcm.get(cursor + 1).copied().unwrap_or(0.0),
                )
            };

            cursor += step;
            if cursor >= length {
                if loops == LOOP_FOREVER {
                    cursor = 0;
                } else if loops > 0 {
                    cursor = 0;
                    loops -= 1;
                } else {
                    completed = true;
                }
            }

            // Constant-power pan, then volume, then accumulate
            let left = src_left * (1.0 - pan) * FRAC_1_SQRT_2;
            let right = src_right * (1.0 + pan) * FRAC_1_SQRT_2;
            *frame += StereoSample::new(left * volume, right * volume);

            if completed {
                break;
            }
        }

        // Cursor and loop count are written back before the state flips to
        // Complete, so once Complete is visible the slot is quiescent and
        // the coordinator may reclaim it
        atomics.set_cursor(cursor as u64);
        atomics.set_loops(loops);
        if completed {
            atomics.set_state(ClipState::Complete);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioConfig;
    use crate::engine::{build, Sampler};

    const EPS: f32 = 1e-5;

    fn test_engine(max_samples: usize, max_clips: usize) -> (Sampler, Mixer) {
        let config = AudioConfig::new()
            .with_sample_rate(44100)
            .with_buffer_frames(64)
            .with_max_samples(max_samples)
            .with_max_clips(max_clips);
        build(&config).unwrap()
    }

    /// Low-amplitude mono ramp: 0.001, 0.002, ... (stays far from the limiter)
    fn ramp(n: usize) -> Vec<f32> {
        (1..=n).map(|v| v as f32 / 1000.0).collect()
    }

    #[test]
    fn test_silence_with_no_clips() {
        let (_sampler, mut mixer) = test_engine(4, 4);
        let mut out = StereoBuffer::silence(32);
        mixer.render(&mut out);
        assert_eq!(out.peak(), 0.0);
    }

    #[test]
    fn test_mono_clip_completes_after_exact_frame_count() {
        let (mut sampler, mut mixer) = test_engine(4, 4);
        let sample = sampler.create_sample(ramp(10), 1, 44100, 10);
        let clip = sampler.create_clip(sample);
        sampler.set_pan(clip, 0.0);
        sampler.play(clip);

        let mut out = StereoBuffer::silence(10);
        mixer.render(&mut out);

        // All 10 frames contributed, center pan at 1/sqrt(2) each side
        for (i, frame) in out.iter().enumerate() {
            let expected = (i + 1) as f32 / 1000.0 * FRAC_1_SQRT_2;
            assert!((frame.left - expected).abs() < EPS);
            assert!((frame.right - expected).abs() < EPS);
        }
        assert!(!sampler.is_playing(clip));

        // Every subsequent period is exact silence
        mixer.render(&mut out);
        assert_eq!(out.peak(), 0.0);
    }

    #[test]
    fn test_loop_count_plays_sample_n_plus_one_times() {
        let (mut sampler, mut mixer) = test_engine(4, 4);
        let sample = sampler.create_sample(vec![0.1; 8], 1, 44100, 8);
        let clip = sampler.create_clip(sample);
        sampler.set_loop_count(clip, 2);
        sampler.play(clip);

        // 3 passes x 8 frames = 24 frames of audio
        let mut out = StereoBuffer::silence(8);
        for pass in 0..3 {
            mixer.render(&mut out);
            assert!(out.peak() > 0.0, "pass {} should be audible", pass);
        }
        // Both loop repeats consumed, then completion
        assert_eq!(sampler.loop_count(clip), 0);
        assert!(!sampler.is_playing(clip));

        mixer.render(&mut out);
        assert_eq!(out.peak(), 0.0);
    }

    #[test]
    fn test_loop_forever_keeps_playing() {
        let (mut sampler, mut mixer) = test_engine(4, 4);
        let sample = sampler.create_sample(vec![0.2; 4], 1, 44100, 4);
        let clip = sampler.create_clip(sample);
        sampler.set_loop_count(clip, LOOP_FOREVER);
        sampler.play(clip);

        let mut out = StereoBuffer::silence(16);
        for _ in 0..50 {
            mixer.render(&mut out);
            assert!(out.peak() > 0.0);
        }
        assert!(sampler.is_playing(clip));
        assert_eq!(sampler.loop_count(clip), LOOP_FOREVER);
    }

    #[test]
    fn test_hard_pan_isolates_channels() {
        let (mut sampler, mut mixer) = test_engine(4, 4);
        let sample = sampler.create_sample(vec![0.5; 64], 1, 44100, 64);

        // pan = -1: everything left, right channel ~0
        let left_clip = sampler.create_clip(sample);
        sampler.set_pan(left_clip, -1.0);
        sampler.play(left_clip);

        let mut out = StereoBuffer::silence(16);
        mixer.render(&mut out);
        assert!((out[0].left - 0.5 * 2.0 * FRAC_1_SQRT_2).abs() < EPS);
        assert!(out[0].right.abs() < EPS);
        sampler.stop(left_clip);

        // pan = +1: everything right, left channel ~0
        let right_clip = sampler.create_clip(sample);
        sampler.set_pan(right_clip, 1.0);
        sampler.play(right_clip);

        mixer.render(&mut out);
        assert!(out[0].left.abs() < EPS);
        assert!((out[0].right - 0.5 * 2.0 * FRAC_1_SQRT_2).abs() < EPS);
    }

    #[test]
    fn test_center_pan_splits_at_equal_power() {
        let (mut sampler, mut mixer) = test_engine(4, 4);
        let sample = sampler.create_sample(vec![1.0; 64], 1, 44100, 64);
        let clip = sampler.create_clip(sample);
        sampler.set_volume(clip, 0.5);
        sampler.play(clip);

        let mut out = StereoBuffer::silence(8);
        mixer.render(&mut out);
        // 1.0 * 0.5 volume * 1/sqrt(2) on each side
        assert!((out[0].left - 0.5 * FRAC_1_SQRT_2).abs() < EPS);
        assert!((out[0].right - 0.5 * FRAC_1_SQRT_2).abs() < EPS);
    }

    #[test]
    fn test_stereo_sample_keeps_channels_separate() {
        let (mut sampler, mut mixer) = test_engine(4, 4);
        // Interleaved L=0.4, R=-0.2
        let pcm: Vec<f32> = (0..32).flat_map(|_| [0.4, -0.2]).collect();
        let sample = sampler.create_sample(pcm, 2, 44100, 32);
        let clip = sampler.create_clip(sample);
        sampler.play(clip);

        let mut out = StereoBuffer::silence(8);
        mixer.render(&mut out);
        assert!((out[0].left - 0.4 * FRAC_1_SQRT_2).abs() < EPS);
        assert!((out[0].right - -0.2 * FRAC_1_SQRT_2).abs() < EPS);
    }

    #[test]
    fn test_output_is_hard_limited() {
        let (mut sampler, mut mixer) = test_engine(8, 8);
        let sample = sampler.create_sample(vec![1.0; 256], 1, 44100, 256);

        // Six full-scale clips stacked dead center overflow well past 1.0
        for _ in 0..6 {
            let clip = sampler.create_clip(sample);
            sampler.play(clip);
        }

        let mut out = StereoBuffer::silence(32);
        mixer.render(&mut out);
        for frame in out.iter() {
            assert!(frame.left <= 1.0 && frame.left >= -1.0);
            assert!(frame.right <= 1.0 && frame.right >= -1.0);
        }
        assert!((out[0].left - 1.0).abs() < EPS);
    }

    #[test]
    fn test_two_hard_panned_clips_dominate_their_channels() {
        let (mut sampler, mut mixer) = test_engine(4, 4);
        let a = sampler.create_sample(vec![0.6; 44100], 1, 44100, 44100);
        let b = sampler.create_sample(vec![0.3; 44100], 1, 44100, 44100);

        let clip_a = sampler.create_clip(a);
        sampler.set_volume(clip_a, 1.0);
        sampler.set_pan(clip_a, -1.0);
        let clip_b = sampler.create_clip(b);
        sampler.set_volume(clip_b, 1.0);
        sampler.set_pan(clip_b, 1.0);
        sampler.play(clip_a);
        sampler.play(clip_b);

        let mut out = StereoBuffer::silence(64);
        mixer.render(&mut out);
        for frame in out.iter() {
            // Left carries only clip A (0.6 * 2 * 0.707), right only clip B
            assert!((frame.left - 0.6 * 2.0 * FRAC_1_SQRT_2).abs() < EPS);
            assert!((frame.right - 0.3 * 2.0 * FRAC_1_SQRT_2).abs() < EPS);
        }
    }

    #[test]
    fn test_paused_clip_holds_cursor_and_resumes() {
        let (mut sampler, mut mixer) = test_engine(4, 4);
        let sample = sampler.create_sample(ramp(100), 1, 44100, 100);
        let clip = sampler.create_clip(sample);
        sampler.play(clip);

        let mut out = StereoBuffer::silence(10);
        mixer.render(&mut out);

        sampler.pause(clip);
        let held = sampler.position(clip);
        mixer.render(&mut out);
        assert_eq!(out.peak(), 0.0);
        assert!((sampler.position(clip) - held).abs() < EPS);

        // Resume continues from the held cursor, not from zero
        sampler.play(clip);
        mixer.render(&mut out);
        assert!((out[0].left - 11.0 / 1000.0 * FRAC_1_SQRT_2).abs() < EPS);
        assert!(sampler.position(clip) > held);
    }

    #[test]
    fn test_destroyed_sample_renders_silent_not_faulting() {
        let (mut sampler, mut mixer) = test_engine(4, 4);
        let sample = sampler.create_sample(vec![0.5; 1000], 1, 44100, 1000);
        let clip = sampler.create_clip(sample);
        sampler.play(clip);

        let mut out = StereoBuffer::silence(16);
        mixer.render(&mut out);
        assert!(out.peak() > 0.0);

        // Destroy force-stops the clip; subsequent periods are silent
        sampler.destroy_sample(sample);
        mixer.render(&mut out);
        assert_eq!(out.peak(), 0.0);
        assert!(!sampler.is_playing(clip));
    }
}
