//! Audio engine configuration
//!
//! Buffer size, sample rate, and pool capacities are fixed at
//! initialization and never change for the lifetime of the engine.

use super::error::{AudioError, AudioResult};

/// Maximum buffer size to pre-allocate (covers typical configurations)
/// Common values: 64, 128, 256, 512, 1024, 2048, 4096 frames
pub const MAX_BUFFER_FRAMES: usize = 8192;

/// Default buffer size when no preference is specified (frames)
/// 512 frames is a safe default that works on most systems
pub const DEFAULT_BUFFER_FRAMES: u32 = 512;

/// Default sample rate for the audio system
pub const DEFAULT_SAMPLE_RATE: u32 = 44100;

/// Default maximum number of concurrently loaded samples
pub const DEFAULT_MAX_SAMPLES: usize = 256;

/// Default maximum number of concurrently allocated clips
pub const DEFAULT_MAX_CLIPS: usize = 1024;

/// Largest supported pool capacity (slot indexes stay well inside u32)
const MAX_POOL_CAPACITY: usize = 65_536;

/// Configuration for the audio engine
#[derive(Debug, Clone)]
pub struct AudioConfig {
    /// Frames per render callback
    pub buffer_frames: u32,
    /// Engine sample rate in Hz; samples must be decoded at this rate
    pub sample_rate: u32,
    /// Capacity of the sample pool
    pub max_samples: usize,
    /// Capacity of the clip pool
    pub max_clips: usize,
    /// Output device name (None = system default)
    pub device: Option<String>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            buffer_frames: DEFAULT_BUFFER_FRAMES,
            sample_rate: DEFAULT_SAMPLE_RATE,
            max_samples: DEFAULT_MAX_SAMPLES,
            max_clips: DEFAULT_MAX_CLIPS,
            device: None,
        }
    }
}

impl AudioConfig {
    /// Create a configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the render buffer size in frames
    pub fn with_buffer_frames(mut self, frames: u32) -> Self {
        self.buffer_frames = frames;
        self
    }

    /// Set the engine sample rate
    pub fn with_sample_rate(mut self, rate: u32) -> Self {
        self.sample_rate = rate;
        self
    }

    /// Set the sample pool capacity
    pub fn with_max_samples(mut self, max: usize) -> Self {
        self.max_samples = max;
        self
    }

    /// Set the clip pool capacity
    pub fn with_max_clips(mut self, max: usize) -> Self {
        self.max_clips = max;
        self
    }

    /// Select a specific output device by name
    pub fn with_device(mut self, name: impl Into<String>) -> Self {
        self.device = Some(name.into());
        self
    }

    /// Callback period in seconds (the render budget)
    pub fn period_seconds(&self) -> f64 {
        self.buffer_frames as f64 / self.sample_rate as f64
    }

    /// Validate the configuration
    pub fn validate(&self) -> AudioResult<()> {
        if self.buffer_frames == 0 || self.buffer_frames as usize > MAX_BUFFER_FRAMES {
            return Err(AudioError::Config(format!(
                "buffer size must be 1..={} frames, got {}",
                MAX_BUFFER_FRAMES, self.buffer_frames
            )));
        }
        if self.sample_rate == 0 {
            return Err(AudioError::Config("sample rate must be nonzero".into()));
        }
        if self.max_samples == 0 || self.max_samples > MAX_POOL_CAPACITY {
            return Err(AudioError::Config(format!(
                "sample pool capacity must be 1..={}, got {}",
                MAX_POOL_CAPACITY, self.max_samples
            )));
        }
        if self.max_clips == 0 || self.max_clips > MAX_POOL_CAPACITY {
            return Err(AudioError::Config(format!(
                "clip pool capacity must be 1..={}, got {}",
                MAX_POOL_CAPACITY, self.max_clips
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(AudioConfig::default().validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = AudioConfig::new()
            .with_buffer_frames(256)
            .with_sample_rate(48000)
            .with_max_samples(8)
            .with_max_clips(16);

        assert_eq!(config.buffer_frames, 256);
        assert_eq!(config.sample_rate, 48000);
        assert_eq!(config.max_samples, 8);
        assert_eq!(config.max_clips, 16);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_degenerate_values() {
        assert!(AudioConfig::new().with_buffer_frames(0).validate().is_err());
        assert!(AudioConfig::new().with_sample_rate(0).validate().is_err());
        assert!(AudioConfig::new().with_max_samples(0).validate().is_err());
        assert!(AudioConfig::new().with_max_clips(0).validate().is_err());
        assert!(AudioConfig::new()
            .with_buffer_frames(MAX_BUFFER_FRAMES as u32 + 1)
            .validate()
            .is_err());
    }

    #[test]
    fn test_period_seconds() {
        let config = AudioConfig::new()
            .with_buffer_frames(441)
            .with_sample_rate(44100);
        assert!((config.period_seconds() - 0.01).abs() < 1e-9);
    }
}
