//! Audio engine - pools, state machine, mixer, lifecycle coordination
//!
//! The engine is split along the two execution contexts:
//! - `Sampler`: the control surface (create/destroy/play/stop/parameters
//!   and the deferred-reclamation `flush`)
//! - `Mixer`: the render callback body (command drain, mixing, epoch)
//!
//! The two halves communicate only through lock-free structures: an SPSC
//! command queue for structural changes and shared atomics for scalar clip
//! state. No function call crosses contexts.

mod clip;
mod command;
mod handle;
mod mixer;
mod sample;
mod sampler;

use std::sync::Arc;

use crate::audio::{AudioConfig, AudioResult};

pub use clip::{ClipState, LOOP_FOREVER};
pub use handle::{ClipHandle, SampleHandle};
pub use mixer::Mixer;
pub use sample::SampleData;
pub use sampler::Sampler;

use clip::EngineShared;
use command::command_channel;

/// Build a connected Sampler/Mixer pair
///
/// The pair works without any audio device: the stream backend moves the
/// `Mixer` into its callback, and tests drive `Mixer::render` directly.
pub fn build(config: &AudioConfig) -> AudioResult<(Sampler, Mixer)> {
    config.validate()?;
    let shared = Arc::new(EngineShared::new(config.max_clips));
    let (command_tx, command_rx) = command_channel();
    let mixer = Mixer::new(
        Arc::clone(&shared),
        command_rx,
        config.max_samples,
        config.max_clips,
    );
    let sampler = Sampler::new(config.clone(), shared, command_tx);
    Ok((sampler, mixer))
}
