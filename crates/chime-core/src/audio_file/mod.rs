//! WAV file decoding
//!
//! Decodes a WAV file into the flat interleaved f32 buffer the engine's
//! sample pool accepts. Only decoding happens here; channel-count and
//! sample-rate validation is the engine's job, so a file at the wrong rate
//! decodes fine and is rejected by `create_sample`.

use std::path::Path;

use thiserror::Error;

/// Errors from WAV decoding
#[derive(Error, Debug)]
pub enum AudioFileError {
    /// File could not be opened or parsed
    #[error("wav decode error: {0}")]
    Decode(#[from] hound::Error),

    /// Bit depth the decoder does not handle
    #[error("unsupported bit depth: {0}")]
    UnsupportedBitDepth(u16),
}

/// A decoded audio file, ready for `Sampler::create_sample`
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    /// Flat samples, interleaved if stereo
    pub samples: Vec<f32>,
    /// Channel count as stored in the file
    pub channels: u16,
    /// Sample rate as stored in the file
    pub sample_rate: u32,
    /// Length in frames (samples per channel)
    pub frames: usize,
}

/// Decode a WAV file to interleaved f32
///
/// Handles 16/24/32-bit integer PCM and 32-bit float, normalizing integer
/// samples to [-1, 1].
pub fn load_wav(path: impl AsRef<Path>) -> Result<DecodedAudio, AudioFileError> {
    let reader = hound::WavReader::open(path)?;
    let spec = reader.spec();
    let frames = reader.duration() as usize;

    let samples: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (hound::SampleFormat::Float, 32) => {
            reader.into_samples::<f32>().collect::<Result<_, _>>()?
        }
        (hound::SampleFormat::Int, 16) => reader
            .into_samples::<i16>()
            .map(|s| s.map(|v| v as f32 / 32_768.0))
            .collect::<Result<_, _>>()?,
        (hound::SampleFormat::Int, 24) => reader
            .into_samples::<i32>()
            .map(|s| s.map(|v| v as f32 / 8_388_608.0))
            .collect::<Result<_, _>>()?,
        (hound::SampleFormat::Int, 32) => reader
            .into_samples::<i32>()
            .map(|s| s.map(|v| v as f32 / 2_147_483_648.0))
            .collect::<Result<_, _>>()?,
        (_, bits) => return Err(AudioFileError::UnsupportedBitDepth(bits)),
    };

    log::debug!(
        "decoded wav: {} frames, {} channels, {}Hz",
        frames,
        spec.channels,
        spec.sample_rate
    );

    Ok(DecodedAudio {
        samples,
        channels: spec.channels,
        sample_rate: spec.sample_rate,
        frames,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_wav_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("chime-test-{}-{}.wav", std::process::id(), name))
    }

    #[test]
    fn test_decode_int16_wav() {
        let path = temp_wav_path("i16");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 44100,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for v in [0i16, 16_384, -16_384, 32_767] {
            writer.write_sample(v).unwrap();
        }
        writer.finalize().unwrap();

        let decoded = load_wav(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(decoded.channels, 1);
        assert_eq!(decoded.sample_rate, 44100);
        assert_eq!(decoded.frames, 4);
        assert_eq!(decoded.samples.len(), 4);
        assert!((decoded.samples[0]).abs() < 1e-6);
        assert!((decoded.samples[1] - 0.5).abs() < 1e-4);
        assert!((decoded.samples[2] + 0.5).abs() < 1e-4);
    }

    #[test]
    fn test_decode_float_stereo_wav() {
        let path = temp_wav_path("f32");
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 44100,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for v in [0.25f32, -0.25, 0.5, -0.5] {
            writer.write_sample(v).unwrap();
        }
        writer.finalize().unwrap();

        let decoded = load_wav(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(decoded.channels, 2);
        // 4 interleaved samples = 2 stereo frames
        assert_eq!(decoded.frames, 2);
        assert_eq!(decoded.samples, vec![0.25, -0.25, 0.5, -0.5]);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(load_wav("/nonexistent/chime-missing.wav").is_err());
    }
}
