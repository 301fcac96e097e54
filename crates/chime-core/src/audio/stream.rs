//! CPAL stream bring-up
//!
//! Opens the output device, negotiates an f32 stereo stream at the
//! configured rate and buffer size, and runs the engine's render callback
//! once per period. The callback owns the `Mixer` exclusively; everything
//! it shares with the control side is lock-free.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, SampleFormat, SampleRate, Stream, StreamConfig};

use crate::engine::{self, Mixer, Sampler};
use crate::types::StereoBuffer;

use super::config::{AudioConfig, MAX_BUFFER_FRAMES};
use super::error::{AudioError, AudioResult};

/// Handle to the running audio stream
///
/// Keeps the stream alive; drop it (or call `stop`) to silence the device.
pub struct AudioHandle {
    _stream: Stream,
    sample_rate: u32,
    buffer_frames: u32,
}

impl AudioHandle {
    /// Sample rate the stream runs at
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Frames per render callback
    pub fn buffer_frames(&self) -> u32 {
        self.buffer_frames
    }

    /// Output latency in milliseconds (one period)
    pub fn latency_ms(&self) -> f32 {
        (self.buffer_frames as f32 / self.sample_rate as f32) * 1000.0
    }

    /// Stop the stream
    ///
    /// After a device failure the engine stays stopped; recovery is a
    /// fresh `start_audio_system`.
    pub fn stop(&self) -> AudioResult<()> {
        self._stream
            .pause()
            .map_err(|e| AudioError::Device(e.to_string()))
    }
}

/// Result of starting the audio system
pub struct AudioSystemResult {
    /// Keeps the stream alive (drop to stop)
    pub handle: AudioHandle,
    /// Control surface for the application
    pub sampler: Sampler,
    /// Negotiated sample rate
    pub sample_rate: u32,
    /// Frames per callback
    pub buffer_frames: u32,
    /// Output latency in milliseconds
    pub latency_ms: f32,
}

/// Start the audio system with the given configuration
///
/// Builds the engine pair, opens the output stream, and starts rendering.
pub fn start_audio_system(config: &AudioConfig) -> AudioResult<AudioSystemResult> {
    let (sampler, mixer) = engine::build(config)?;

    let device = find_output_device(config.device.as_deref())?;
    let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
    log::info!("Using audio device: {}", device_name);

    let stream_config = get_output_config(&device, config)?;
    let latency_ms = (config.buffer_frames as f32 / config.sample_rate as f32) * 1000.0;
    log::info!(
        "Audio config: {} channels, {}Hz, {} frames (~{:.1}ms latency)",
        stream_config.channels,
        config.sample_rate,
        config.buffer_frames,
        latency_ms
    );

    let stream = build_output_stream(&device, &stream_config, mixer)?;
    stream
        .play()
        .map_err(|e| AudioError::Device(format!("failed to start stream: {}", e)))?;

    log::info!("Audio stream started");

    Ok(AudioSystemResult {
        handle: AudioHandle {
            _stream: stream,
            sample_rate: config.sample_rate,
            buffer_frames: config.buffer_frames,
        },
        sampler,
        sample_rate: config.sample_rate,
        buffer_frames: config.buffer_frames,
        latency_ms,
    })
}

/// Look up the requested output device, or the system default
fn find_output_device(name: Option<&str>) -> AudioResult<cpal::Device> {
    let host = cpal::default_host();
    match name {
        Some(name) => host
            .output_devices()
            .map_err(|e| AudioError::Device(e.to_string()))?
            .find(|d| d.name().map(|n| n == name).unwrap_or(false))
            .ok_or_else(|| AudioError::Device(format!("output device not found: {}", name))),
        None => host
            .default_output_device()
            .ok_or_else(|| AudioError::Device("no default output device".into())),
    }
}

/// Negotiate an f32 stereo output configuration at the engine rate
fn get_output_config(device: &cpal::Device, config: &AudioConfig) -> AudioResult<StreamConfig> {
    let supported: Vec<_> = device
        .supported_output_configs()
        .map_err(|e| AudioError::Device(e.to_string()))?
        .collect();

    let best = supported
        .iter()
        .filter(|c| c.sample_format() == SampleFormat::F32)
        .filter(|c| c.channels() >= 2)
        .find(|c| {
            config.sample_rate >= c.min_sample_rate().0
                && config.sample_rate <= c.max_sample_rate().0
        })
        .ok_or_else(|| {
            AudioError::Device(format!(
                "device has no f32 stereo configuration at {}Hz",
                config.sample_rate
            ))
        })?;

    Ok(StreamConfig {
        channels: best.channels(),
        sample_rate: SampleRate(config.sample_rate),
        buffer_size: BufferSize::Fixed(config.buffer_frames),
    })
}

/// Build the output stream around the mixer
fn build_output_stream(
    device: &cpal::Device,
    config: &StreamConfig,
    mut mixer: Mixer,
) -> AudioResult<Stream> {
    let channels = config.channels as usize;
    // Pre-allocated to the maximum size; the callback only adjusts length
    let mut mix_buffer = StereoBuffer::silence(MAX_BUFFER_FRAMES);

    let stream = device
        .build_output_stream(
            config,
            move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                let n_frames = (data.len() / channels).min(MAX_BUFFER_FRAMES);
                mix_buffer.set_len_from_capacity(n_frames);

                mixer.render(&mut mix_buffer);

                let frames = mix_buffer.as_slice();
                for (i, out_frame) in data.chunks_mut(channels).enumerate() {
                    if i < frames.len() {
                        out_frame[0] = frames[i].left;
                        if channels > 1 {
                            out_frame[1] = frames[i].right;
                        }
                        for ch in out_frame.iter_mut().skip(2) {
                            *ch = 0.0;
                        }
                    } else {
                        for ch in out_frame.iter_mut() {
                            *ch = 0.0;
                        }
                    }
                }
            },
            move |err| {
                log::error!("audio stream error: {}", err);
            },
            None,
        )
        .map_err(|e| AudioError::Device(format!("failed to build stream: {}", e)))?;

    Ok(stream)
}
