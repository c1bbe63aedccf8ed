//! # mixcore
//!
//! Multi-voice realtime audio mixer core with a lock-free control plane.
//!
//! **Purpose:** Decode audio clips held in memory, mix them sample-accurately
//! on a fixed-deadline audio callback, and let control threads inspect and
//! steer playback without ever stalling the audio thread.
//!
//! **Architecture:** The audio thread runs a single-pass callback — drain
//! commands, decode and accumulate voices through per-callback arena
//! scratch, master gain, peak meter, finished-voice events, clock advance.
//! Cross-thread traffic rides two SPSC rings (commands in, events out), a
//! double-buffered voice snapshot, and a seqlock-protected DSP clock.
//! Decoding uses a hand-rolled WAV/PCM path plus symphonia for Vorbis, MP3,
//! and FLAC; output runs through cpal.

pub mod audio;
pub mod budget;
pub mod config;
pub mod decoder;
pub mod error;
pub mod output;
pub mod playback;

pub use audio::{
    AudioClock, AudioFormat, ClipInfo, CompressionMode, FrameArena, OutputConfig, PlaybackState,
    ResultCode, SourceHandle,
};
pub use budget::{BudgetConfig, MemoryBudget, MemoryUsage};
pub use config::EngineConfig;
pub use error::{Error, Result};
pub use output::AudioOutput;
pub use playback::{AudioEngine, Command, CommandBatch, Event, EventKind};
