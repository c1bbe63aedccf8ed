//! Core audio data types
//!
//! Formats, clip metadata, output configuration, and the enums shared by the
//! control surface and the realtime path.

use serde::{Deserialize, Serialize};

/// Stable handle identifying a loaded source.
///
/// Non-negative while a load is live; `-1` is the sentinel returned for a
/// failed load. Handles are assigned at load and never reused while the
/// source remains loaded.
pub type SourceHandle = i32;

/// Sentinel handle for failed loads.
pub const INVALID_HANDLE: SourceHandle = -1;

/// Audio format description of a decoded stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AudioFormat {
    /// Sample rate in Hz (44100, 48000, 96000)
    pub sample_rate: u32,

    /// Channel count (1 = mono, 2 = stereo)
    pub channels: u16,

    /// Bits per sample in the source data (16, 24, 32)
    pub bits_per_sample: u16,

    /// Bytes per frame: channels * (bits_per_sample / 8)
    pub block_align: u16,
}

impl AudioFormat {
    /// Derive block alignment from channels and bit depth.
    pub fn with_block_align(mut self) -> Self {
        self.block_align = self.channels * (self.bits_per_sample / 8);
        self
    }
}

/// Immutable clip metadata captured at load time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipInfo {
    /// Sample rate in Hz
    pub sample_rate: u32,

    /// Channel count
    pub channels: u16,

    /// Bits per sample in the source data
    pub bits_per_sample: u16,

    /// Clip length in seconds (0.0 if total frames unknown)
    pub length_seconds: f32,

    /// Total frames in the clip (0 if unknown)
    pub total_frames: i64,

    /// How the source data is held in memory
    pub compression_mode: CompressionMode,
}

impl ClipInfo {
    /// Build clip info from a decoder format and frame count.
    pub fn from_format(format: AudioFormat, total_frames: i64, mode: CompressionMode) -> Self {
        let length_seconds = if format.sample_rate > 0 && total_frames > 0 {
            total_frames as f32 / format.sample_rate as f32
        } else {
            0.0
        };

        Self {
            sample_rate: format.sample_rate,
            channels: format.channels,
            bits_per_sample: format.bits_per_sample,
            length_seconds,
            total_frames,
            compression_mode: mode,
        }
    }
}

/// Audio output configuration requested at initialization.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Output sample rate in Hz
    pub sample_rate: u32,

    /// Output channel count (typically 2)
    pub channels: u16,

    /// Frames per buffer (64, 128, 256, 512)
    pub buffer_size: u32,

    /// Double/triple buffering depth (2, 3, 4)
    pub buffer_count: u32,

    /// Request exclusive-mode output where the backend supports it
    pub exclusive_mode: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            channels: 2,
            buffer_size: 512,
            buffer_count: 2,
            exclusive_mode: false,
        }
    }
}

/// How source bytes are held and decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CompressionMode {
    /// Keep compressed bytes in memory, decode during playback
    #[default]
    CompressInMemory = 0,

    /// Decode the whole clip to PCM at load time
    DecompressOnLoad = 1,

    /// Stream from the source incrementally
    Streaming = 2,
}

impl CompressionMode {
    /// Convert from the wire representation used by the control surface.
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(CompressionMode::CompressInMemory),
            1 => Some(CompressionMode::DecompressOnLoad),
            2 => Some(CompressionMode::Streaming),
            _ => None,
        }
    }
}

/// Playback state of a voice as seen by both threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    /// Not producing samples; next play starts from frame 0
    #[default]
    Stopped = 0,

    /// Actively decoding and mixing
    Playing = 1,

    /// Suspended; decoder position preserved
    Paused = 2,
}

impl PlaybackState {
    /// Decode from the atomic byte representation.
    pub fn from_u8(raw: u8) -> Self {
        match raw {
            1 => PlaybackState::Playing,
            2 => PlaybackState::Paused,
            _ => PlaybackState::Stopped,
        }
    }

    /// Encode for atomic storage.
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Result codes exposed on the control surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultCode {
    Ok = 0,
    InvalidParam = -1,
    NotInitialized = -2,
    DecodeFailed = -3,
    OutputFailed = -4,
    OutOfMemory = -5,
    FileNotFound = -6,
    FormatNotSupported = -7,
    AlreadyInitialized = -8,
}

/// Owned source bytes shared between a voice record and its decoder.
///
/// The decoder may reference the bytes for its whole lifetime, so both sides
/// hold the same `Arc<SourceBytes>`.
#[derive(Debug)]
pub struct SourceBytes(Vec<u8>);

impl SourceBytes {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<[u8]> for SourceBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}
