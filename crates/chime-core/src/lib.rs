//! Chime Core - Real-time sample playback and mixing engine

pub mod audio;
pub mod audio_file;
pub mod engine;
pub mod types;

pub use types::*;
