//! Chime Play - jukebox demo for the Chime mixing engine
//!
//! Decodes the given WAV files, creates one clip per file, spreads the
//! clips across the stereo field, and plays them all simultaneously until
//! every clip has completed.

use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;

use chime_core::audio::{start_audio_system, AudioConfig};
use chime_core::audio_file::load_wav;
use chime_core::engine::{ClipHandle, SampleHandle, Sampler, LOOP_FOREVER};

#[derive(Parser)]
#[command(name = "chime-play", about = "Mix WAV files to the default audio output")]
struct Args {
    /// WAV files to play (must match the engine sample rate)
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Playback volume for every clip (0.0 - 1.0)
    #[arg(long, default_value_t = 1.0)]
    volume: f32,

    /// Extra loop passes per clip
    #[arg(long, default_value_t = 0, conflicts_with = "forever")]
    loops: u32,

    /// Loop every clip until interrupted
    #[arg(long)]
    forever: bool,

    /// Engine sample rate in Hz
    #[arg(long, default_value_t = 44100)]
    sample_rate: u32,

    /// Frames per audio callback
    #[arg(long, default_value_t = 512)]
    buffer_frames: u32,

    /// Output device name (default: system default)
    #[arg(long)]
    device: Option<String>,
}

fn main() -> Result<()> {
    // Set RUST_LOG=debug for verbose output
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = Args::parse();

    let mut config = AudioConfig::new()
        .with_sample_rate(args.sample_rate)
        .with_buffer_frames(args.buffer_frames);
    if let Some(device) = &args.device {
        config = config.with_device(device.clone());
    }

    let mut system =
        start_audio_system(&config).context("failed to start the audio system")?;
    log::info!(
        "audio running: {}Hz, {} frames (~{:.1}ms latency)",
        system.sample_rate,
        system.buffer_frames,
        system.latency_ms
    );

    let loop_count = if args.forever { LOOP_FOREVER } else { args.loops };
    let clip_count = args.files.len();
    let mut samples: Vec<SampleHandle> = Vec::with_capacity(clip_count);
    let mut clips: Vec<ClipHandle> = Vec::with_capacity(clip_count);

    for (i, path) in args.files.iter().enumerate() {
        let decoded =
            load_wav(path).with_context(|| format!("failed to decode {}", path.display()))?;

        let sampler = &mut system.sampler;
        let sample = sampler.create_sample(
            decoded.samples,
            decoded.channels,
            decoded.sample_rate,
            decoded.frames,
        );
        if sample.is_none() {
            bail!("{}: {}", path.display(), last_error(sampler));
        }
        let clip = sampler.create_clip(sample);
        if clip.is_none() {
            bail!("{}: {}", path.display(), last_error(sampler));
        }

        sampler.set_volume(clip, args.volume);
        sampler.set_pan(clip, spread_pan(i, clip_count));
        sampler.set_loop_count(clip, loop_count);
        sampler.play(clip);

        log::info!("playing {} (pan {:+.2})", path.display(), spread_pan(i, clip_count));
        samples.push(sample);
        clips.push(clip);
    }

    // Flush once per render period until every clip has completed
    let period = Duration::from_secs_f64(config.period_seconds());
    while system.sampler.flush() {
        thread::sleep(period);
    }

    for sample in samples {
        system.sampler.destroy_sample(sample);
    }
    thread::sleep(period);
    system.sampler.flush();

    system
        .handle
        .stop()
        .context("failed to stop the audio stream")?;
    log::info!("done");
    Ok(())
}

/// Spread clip n of count evenly across the stereo field
fn spread_pan(index: usize, count: usize) -> f32 {
    if count < 2 {
        0.0
    } else {
        -1.0 + 2.0 * index as f32 / (count - 1) as f32
    }
}

fn last_error(sampler: &Sampler) -> String {
    sampler
        .last_error()
        .map(|e| e.to_string())
        .unwrap_or_else(|| "unknown error".into())
}
