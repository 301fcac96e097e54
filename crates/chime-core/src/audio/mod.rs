//! Audio backend for Chime
//!
//! Configuration, error taxonomy, and CPAL stream bring-up. The stream
//! merely invokes the engine's render callback on a fixed cadence; all of
//! the mixing logic lives in [`crate::engine`].
//!
//! # Example
//!
//! ```ignore
//! use chime_core::audio::{start_audio_system, AudioConfig};
//!
//! let config = AudioConfig::new().with_sample_rate(44100);
//! let mut system = start_audio_system(&config)?;
//!
//! let sample = system.sampler.create_sample(pcm, 1, 44100, frames);
//! let clip = system.sampler.create_clip(sample);
//! system.sampler.play(clip);
//!
//! while system.sampler.flush() {
//!     std::thread::sleep(period);
//! }
//! ```

mod config;
mod error;
mod stream;

pub use config::{
    AudioConfig, DEFAULT_BUFFER_FRAMES, DEFAULT_MAX_CLIPS, DEFAULT_MAX_SAMPLES,
    DEFAULT_SAMPLE_RATE, MAX_BUFFER_FRAMES,
};
pub use error::{AudioError, AudioResult};
pub use stream::{start_audio_system, AudioHandle, AudioSystemResult};
