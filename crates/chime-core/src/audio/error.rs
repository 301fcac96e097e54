//! Audio engine error types

use thiserror::Error;

/// Errors that can occur during audio operations
///
/// Control-context operations record the error in the sampler and return a
/// sentinel handle/value; the render context never surfaces errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AudioError {
    /// Invalid engine configuration at initialization
    #[error("invalid engine configuration: {0}")]
    Config(String),

    /// A fixed-capacity pool (or the command queue) has no free slot
    #[error("no free {resource} slots (capacity {capacity})")]
    Exhausted {
        resource: &'static str,
        capacity: usize,
    },

    /// Handle is zero, out of range, or points at a free slot
    #[error("invalid {space} handle: {id}")]
    InvalidHandle { space: &'static str, id: u32 },

    /// Channel count outside {1, 2}
    #[error("unsupported channel count: {0} (expected 1 or 2)")]
    UnsupportedChannels(u16),

    /// Decoded audio does not match the engine's configured rate
    #[error("sample rate mismatch: got {got}Hz, engine runs at {expected}Hz")]
    SampleRateMismatch { got: u32, expected: u32 },

    /// PCM buffer length does not equal frames x channels
    #[error("sample buffer holds {got} samples, expected {expected} (frames x channels)")]
    BufferSizeMismatch { got: usize, expected: usize },

    /// Underlying stream open/start/stop failure
    #[error("audio device error: {0}")]
    Device(String),
}

/// Result type for audio operations
pub type AudioResult<T> = Result<T, AudioError>;
